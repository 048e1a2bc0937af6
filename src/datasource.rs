//! Opening WMAP files from disk and exposing their layers
//!
//! A file is accepted only if its extension is on the historical
//! `wat`/`wal`/`wap` allow-list *and* its first line carries one of the
//! WMAP magic tokens. Each file holds exactly one layer.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;

use crate::error::WmapError;
use crate::layer::Layer;
use crate::line::default_encoding;
use crate::types::RecordKind;

/// A layer backed by an open file handle.
pub type FileLayer = Layer<BufReader<File>>;

/// One opened WMAP file and its layers.
pub struct DataSource {
    path: PathBuf,
    layers: Vec<FileLayer>,
}

impl DataSource {
    /// Opens `path` with the default (GBK) fallback encoding.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, WmapError> {
        Self::open_with_encoding(path, default_encoding())
    }

    /// Opens `path`, decoding non-UTF-8 label lines with `encoding`.
    pub fn open_with_encoding(
        path: impl AsRef<Path>,
        encoding: &'static Encoding,
    ) -> Result<Self, WmapError> {
        let path = path.as_ref();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if RecordKind::from_extension(extension).is_none() {
            return Err(WmapError::UnrecognizedExtension(extension.to_string()));
        }

        let file = File::open(path)?;
        let layer = Layer::from_reader_with_encoding(BufReader::new(file), encoding)?;

        Ok(Self {
            path: path.to_path_buf(),
            layers: vec![layer],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, index: usize) -> Option<&FileLayer> {
        self.layers.get(index)
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut FileLayer> {
        self.layers.get_mut(index)
    }

    /// Write path, present for host-catalog compatibility only.
    pub fn create_layer(&mut self, _name: &str) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("layer creation"))
    }

    pub fn delete_layer(&mut self, _index: usize) -> Result<(), WmapError> {
        Err(WmapError::Unsupported("layer deletion"))
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("path", &self.path)
            .field("layer_count", &self.layers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_extension() {
        let err = DataSource::open("roads.shp").unwrap_err();
        assert!(matches!(err, WmapError::UnrecognizedExtension(ext) if ext == "shp"));
    }

    #[test]
    fn test_rejects_missing_extension() {
        let err = DataSource::open("roads").unwrap_err();
        assert!(matches!(err, WmapError::UnrecognizedExtension(ext) if ext.is_empty()));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = DataSource::open("does-not-exist.wat").unwrap_err();
        assert!(matches!(err, WmapError::Io(_)));
    }
}
