//! The fixed boundary between documents and the PDF engine behind them.
//!
//! Everything here is shaped like a C library interface: the engine receives a
//! `#[repr(C)]` [`FileAccess`] record holding the file length and a block-read
//! callback, hands back an opaque document pointer, and reports failures
//! through integer status codes queried after the fact. The engine may call the
//! callback at any time while a document is alive, in any order.

pub mod native;

use std::ffi::CStr;
use std::os::raw::{c_int, c_uchar, c_ulong, c_void};
use std::ptr::NonNull;

pub use native::NativeEngine;

/// Engine status codes returned by [`Engine::last_error`].
pub mod status {
    use std::os::raw::c_ulong;

    pub const ERR_SUCCESS: c_ulong = 0;
    pub const ERR_UNKNOWN: c_ulong = 1;
    pub const ERR_FILE: c_ulong = 2;
    pub const ERR_FORMAT: c_ulong = 3;
    pub const ERR_PASSWORD: c_ulong = 4;
    pub const ERR_SECURITY: c_ulong = 5;
    pub const ERR_PAGE: c_ulong = 6;
}

/// Return value of a block-read callback that delivered every requested byte.
pub const BLOCK_OK: c_int = 1;

/// Return value of a block-read callback that failed.
pub const BLOCK_FAILED: c_int = 0;

/// Block-read callback: fill `size` bytes at `buf` with file data starting at
/// `position`, returning [`BLOCK_OK`] or [`BLOCK_FAILED`].
///
/// Implementations must never unwind.
pub type GetBlockFn = unsafe extern "C" fn(
    param: *mut c_void,
    position: c_ulong,
    buf: *mut c_uchar,
    size: c_ulong,
) -> c_int;

/// File access record handed to [`Engine::load_custom_document`].
///
/// The engine keeps a pointer to this record for the lifetime of the document,
/// so it must not move or be freed until the document is closed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FileAccess {
    /// Total file length in bytes.
    pub file_len: c_ulong,
    /// Block-read callback.
    pub get_block: Option<GetBlockFn>,
    /// Opaque pointer passed back as the callback's first argument.
    pub param: *mut c_void,
}

impl FileAccess {
    /// Invokes the callback, reporting a missing callback as failure.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for `size` writes and `param` must be whatever the
    /// callback expects.
    pub unsafe fn read_block(&self, position: c_ulong, buf: *mut c_uchar, size: c_ulong) -> c_int {
        match self.get_block {
            Some(get_block) => unsafe { get_block(self.param, position, buf, size) },
            None => BLOCK_FAILED,
        }
    }
}

/// Opaque engine-side document object.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawDocument(NonNull<c_void>);

impl RawDocument {
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(RawDocument)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// A PDF engine reachable only through the custom-document-load interface.
///
/// Every fallible call signals failure in-band (`None`, a negative count) and
/// leaves the reason in [`Engine::last_error`].
pub trait Engine {
    /// Loads a document whose bytes are served by `access`.
    ///
    /// # Safety
    ///
    /// `access` must point to a valid [`FileAccess`] whose callback stays
    /// callable, and whose memory stays put, until the returned document is
    /// passed to [`Engine::close_document`].
    unsafe fn load_custom_document(
        &self,
        access: *mut FileAccess,
        password: Option<&CStr>,
    ) -> Option<RawDocument>;

    /// Returns the document's page count, which may be zero or negative for
    /// broken files.
    ///
    /// # Safety
    ///
    /// `doc` must come from this engine and not be closed yet.
    unsafe fn page_count(&self, doc: RawDocument) -> c_int;

    /// Returns `(width, height)` in points of page `index`.
    ///
    /// # Safety
    ///
    /// `doc` must come from this engine and not be closed yet.
    unsafe fn page_size(&self, doc: RawDocument, index: c_int) -> Option<(f64, f64)>;

    /// Releases the document. The file access record may be freed afterwards.
    ///
    /// # Safety
    ///
    /// `doc` must come from this engine and must not be used again.
    unsafe fn close_document(&self, doc: RawDocument);

    /// Status code of the most recent failure on this thread.
    fn last_error(&self) -> c_ulong;
}
