//! Error taxonomy shared by both decoders

use thiserror::Error;

/// Errors returned by a decode call.
///
/// Only structural failures surface here. Problems in optional enrichment
/// data (shared strings, number formats, styles) are logged and degraded
/// inside the decoders instead.
#[derive(Debug, Error)]
pub enum ReadError {
    /// No registered decoder recognizes the input.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid container signature, missing mandatory stream or part, or an
    /// archive that fails to open.
    #[error("corrupt container: {0}")]
    ContainerCorrupt(String),

    /// The workbook definition part or the workbook stream is absent.
    #[error("missing structural part: {0}")]
    StructuralPartMissing(String),

    /// A record or sector read would run past the available bytes.
    #[error("stream truncated: {0}")]
    StreamTruncated(String),

    /// An XML part failed to parse.
    #[error("malformed markup in {part}: {message}")]
    MalformedMarkup { part: String, message: String },

    /// The runtime lacks a capability the input requires.
    #[error("missing capability: {0}")]
    MissingCapability(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, ReadError>;

impl ReadError {
    pub(crate) fn markup(part: &str, err: impl std::fmt::Display) -> Self {
        ReadError::MalformedMarkup {
            part: part.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for ReadError {
    fn from(err: zip::result::ZipError) -> Self {
        use zip::result::ZipError;
        match err {
            ZipError::Io(e) => ReadError::Io(e),
            ZipError::UnsupportedArchive(what) => ReadError::MissingCapability(format!(
                "archive feature not available in this build: {what} (enable the zip crate's deflate support)"
            )),
            ZipError::FileNotFound => {
                ReadError::StructuralPartMissing("archive entry not found".to_string())
            }
            other => ReadError::ContainerCorrupt(other.to_string()),
        }
    }
}
