//! Error types for the wmap crate

use thiserror::Error;

/// Errors that can occur while decoding a WMAP file
#[derive(Debug, Error)]
pub enum WmapError {
    /// I/O error while reading the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The header line is not one of the WMAP magic tokens
    #[error("not a WMAP file (header line {found:?})")]
    FormatMismatch { found: String },

    /// The file extension is not on the wat/wal/wap allow-list
    #[error("unrecognized file extension: {0:?}")]
    UnrecognizedExtension(String),

    /// End of stream inside the polygon-mode arc/node preamble
    #[error("truncated stream while reading {context}")]
    Truncated { context: &'static str },

    /// A polygon ring references an arc ID absent from the arc section
    #[error("polygon references unknown arc {id}")]
    ArcNotFound { id: i64 },

    /// Write-path surface present for host-catalog compatibility only
    #[error("{0} is not supported by the wmap driver")]
    Unsupported(&'static str),
}

impl WmapError {
    pub(crate) fn truncated(context: &'static str) -> Self {
        Self::Truncated { context }
    }
}
