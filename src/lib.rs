//! # wmap
//!
//! Decoder for the legacy MapGIS WMAP text exchange format: line-oriented
//! `.wat` (point), `.wal` (polyline) and `.wap` (polygon) vector layers.
//!
//! ## Features
//!
//! - Streaming, forward-only decode with a rewindable record cursor
//! - CSV-style field tokenizer (quoted fields, doubled quotes, fields
//!   spanning physical lines)
//! - Polygon rings reconstructed by stitching signed arc references
//!   against the file's inline arc table
//! - GBK fallback decoding for pre-UTF-8 label lines
//! - `geo` conversions for the Rust geospatial ecosystem
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! let mut ds = wmap::open(Path::new("rivers.wal"))?;
//! let layer = ds.layer_mut(0).unwrap();
//!
//! while let Some(feature) = layer.next_feature()? {
//!     println!("{:?} ({})", feature.geometry, feature.layer_name());
//! }
//! ```

pub mod datasource;
pub mod error;
pub mod layer;
pub mod line;
pub mod tokenize;
pub mod types;

pub use datasource::{DataSource, FileLayer};
pub use error::WmapError;
pub use layer::Layer;
pub use types::{Feature, Geometry, RecordKind, Vertex, ATTR_LAYER};

use std::path::Path;

/// Opens a WMAP file (`.wat`, `.wal` or `.wap`) as a [`DataSource`].
///
/// # Errors
///
/// Returns [`WmapError`] if the extension is not on the allow-list, the
/// file cannot be read, or its header is not a WMAP magic token.
pub fn open(path: impl AsRef<Path>) -> Result<DataSource, WmapError> {
    DataSource::open(path)
}
