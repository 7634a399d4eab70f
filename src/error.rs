//! Public error type and the translation of engine status codes.

use crate::engine::status;
use std::io;
use std::os::raw::c_ulong;
use thiserror::Error;

/// Errors returned by document handles.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte source cannot be used, for example because it cannot seek.
    #[error("byte source is missing required operations: {}", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    /// The password contains a NUL byte and cannot be passed to the engine.
    #[error("password must not contain NUL bytes")]
    InvalidPassword,

    /// Reading from the byte source failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The data is not a readable PDF document.
    #[error("file is not a PDF document or is damaged")]
    Format,

    /// A password is required, or the one given is wrong.
    #[error("password required or incorrect")]
    Password,

    /// The document uses a security scheme the engine does not support.
    #[error("unsupported security scheme")]
    UnsupportedSecurity,

    /// The engine reported fewer than one page.
    #[error("document reports {count} pages; it may need a password or be damaged")]
    PageCountInvalid { count: i32 },

    /// A page index outside `0..count`.
    #[error("page index {index} out of range for document with {count} pages")]
    PageIndex { index: usize, count: usize },

    /// The engine could not load a page that should exist.
    #[error("page {index} could not be loaded")]
    PageNotFound { index: usize },

    /// The engine failed with a status code outside its known set, or
    /// failed while claiming success.
    #[error("engine failed with status {code}")]
    UnknownEngine { code: c_ulong },

    /// The handle has already been closed.
    #[error("document is closed")]
    Closed,
}

/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of engine status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Success,
    Unknown,
    File,
    Format,
    Password,
    Security,
    Page,
}

/// Engine status codes: `(code, kind, name, description)`.
pub static ENGINE_ERRORS: &[(c_ulong, ErrorKind, &str, &str)] = &[
    (status::ERR_SUCCESS, ErrorKind::Success, "Success", "no error"),
    (status::ERR_UNKNOWN, ErrorKind::Unknown, "Unknown", "unknown error"),
    (status::ERR_FILE, ErrorKind::File, "File", "file not found or could not be read"),
    (status::ERR_FORMAT, ErrorKind::Format, "Format", "file is not a PDF or is corrupted"),
    (status::ERR_PASSWORD, ErrorKind::Password, "Password", "password required or incorrect"),
    (status::ERR_SECURITY, ErrorKind::Security, "Security", "unsupported security scheme"),
    (status::ERR_PAGE, ErrorKind::Page, "Page", "page not found or content error"),
];

/// Looks up the table entry for `code`.
pub fn lookup(code: c_ulong) -> Option<&'static (c_ulong, ErrorKind, &'static str, &'static str)> {
    usize::try_from(code)
        .ok()
        .and_then(|idx| ENGINE_ERRORS.get(idx))
        .filter(|entry| entry.0 == code)
}

/// Kind of `code`; codes outside the table are [`ErrorKind::Unknown`].
pub fn kind_of(code: c_ulong) -> ErrorKind {
    lookup(code).map_or(ErrorKind::Unknown, |entry| entry.1)
}

/// Details carried into a translated error.
#[derive(Debug, Default)]
pub struct Context {
    /// The byte source failure recorded by the bridge, if any
    pub io_failure: Option<io::Error>,
    /// The page being loaded, for page errors
    pub page: Option<usize>,
}

/// Converts the status of a failed engine call into an [`Error`].
///
/// The call is known to have failed, so a status of success is reported as
/// [`Error::UnknownEngine`] rather than ignored.
pub fn translate(code: c_ulong, context: Context) -> Error {
    match lookup(code).map(|entry| entry.1) {
        Some(ErrorKind::Success) => Error::UnknownEngine { code },
        Some(ErrorKind::File) => Error::Io(context.io_failure.unwrap_or_else(|| {
            io::Error::other("engine could not read the file")
        })),
        Some(ErrorKind::Format) => Error::Format,
        Some(ErrorKind::Password) => Error::Password,
        Some(ErrorKind::Security) => Error::UnsupportedSecurity,
        Some(ErrorKind::Page) => Error::PageNotFound {
            index: context.page.unwrap_or_default(),
        },
        Some(ErrorKind::Unknown) | None => Error::UnknownEngine { code },
    }
}
