use crate::engine::status;
use std::os::raw::c_ulong;
use thiserror::Error;

/// Error type for everything that happens on the engine side of the boundary.
///
/// These never reach callers directly. The native entry points collapse each
/// variant into one of the engine status codes via [`PDFError::status_code`].
#[derive(Debug, Clone, Error)]
pub enum PDFError {
    /// End of stream reached unexpectedly
    #[error("Unexpected end of stream")]
    UnexpectedEndOfStream,

    /// Invalid byte range requested
    #[error("Invalid byte range: {begin}..{end}")]
    InvalidByteRange { begin: usize, end: usize },

    /// Invalid stream position
    #[error("Invalid position {pos} for stream of length {length}")]
    InvalidPosition { pos: usize, length: usize },

    /// The block-read callback reported failure
    #[error("Block read of {size} bytes at offset {offset} failed")]
    BlockRead { offset: usize, size: usize },

    /// Malformed PDF syntax or structure
    #[error("Parse error: {0}")]
    Parse(String),

    /// Password required or incorrect
    #[error("Password required or incorrect")]
    Password,

    /// Encryption scheme this engine cannot handle
    #[error("Unsupported security scheme: {0}")]
    UnsupportedSecurity(String),

    /// Requested page does not exist
    #[error("Page {index} not found")]
    PageNotFound { index: usize },

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl PDFError {
    pub fn parse(msg: impl Into<String>) -> Self {
        PDFError::Parse(msg.into())
    }

    /// Status code reported through the last-error query for this failure.
    pub fn status_code(&self) -> c_ulong {
        match self {
            PDFError::BlockRead { .. } => status::ERR_FILE,
            PDFError::UnexpectedEndOfStream
            | PDFError::InvalidByteRange { .. }
            | PDFError::InvalidPosition { .. }
            | PDFError::Parse(_) => status::ERR_FORMAT,
            PDFError::Password => status::ERR_PASSWORD,
            PDFError::UnsupportedSecurity(_) => status::ERR_SECURITY,
            PDFError::PageNotFound { .. } => status::ERR_PAGE,
            PDFError::Generic(_) => status::ERR_UNKNOWN,
        }
    }
}

/// Result type alias for PDF operations
pub type PDFResult<T> = Result<T, PDFError>;
