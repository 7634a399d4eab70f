//! The native engine and its C entry points.
//!
//! The entry points follow the usual shape of a C PDF library: documents are
//! opaque pointers, failures come back as null or zero, and the reason is
//! fetched afterwards with [`pdfx_get_last_error`]. All of them catch panics
//! so that nothing unwinds into the caller.

use super::status::{ERR_FILE, ERR_PAGE, ERR_SUCCESS, ERR_UNKNOWN};
use super::{Engine, FileAccess, RawDocument};
use crate::config::EngineConfig;
use crate::core::{BlockStream, CallbackLoader, PDFDocument, PDFError};
use std::cell::Cell;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_ulong, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};

thread_local! {
    static LAST_ERROR: Cell<c_ulong> = const { Cell::new(ERR_SUCCESS) };
}

fn set_last_error(code: c_ulong) {
    LAST_ERROR.with(|last| last.set(code));
}

fn record(error: &PDFError) {
    log::debug!("native engine error: {error}");
    set_last_error(error.status_code());
}

/// Engine-side document object behind a [`RawDocument`].
struct NativeDocument {
    document: PDFDocument,
}

/// # Safety
///
/// `access` must be null or valid for the lifetime of the returned document.
unsafe fn load_document(
    access: *mut FileAccess,
    password: Option<&CStr>,
    config: EngineConfig,
) -> *mut c_void {
    set_last_error(ERR_SUCCESS);
    if access.is_null() {
        set_last_error(ERR_UNKNOWN);
        return std::ptr::null_mut();
    }

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let config = config.normalized();
        // SAFETY: non-null and valid per the caller's contract.
        let file_len = unsafe { (*access).file_len };
        if usize::try_from(file_len).is_err() {
            return Err(PDFError::BlockRead { offset: 0, size: 0 });
        }
        log::debug!(
            "loading document of {} bytes ({}-byte blocks, {} cached)",
            file_len,
            config.block_size,
            config.max_cached_blocks
        );

        // SAFETY: the record outlives the document, which owns the loader.
        let loader = unsafe { CallbackLoader::new(access, config.block_size) };
        let stream = BlockStream::new(Box::new(loader), config.max_cached_blocks);
        PDFDocument::open(Box::new(stream), password.map(CStr::to_bytes))
    }));

    match outcome {
        Ok(Ok(document)) => Box::into_raw(Box::new(NativeDocument { document })).cast(),
        Ok(Err(error)) => {
            record(&error);
            std::ptr::null_mut()
        }
        Err(_) => {
            log::debug!("native engine panicked while loading");
            set_last_error(ERR_UNKNOWN);
            std::ptr::null_mut()
        }
    }
}

/// Runs `f` on the document behind `doc`, reporting panics as `ERR_UNKNOWN`.
///
/// # Safety
///
/// `doc` must be null or a live pointer returned by a load entry point.
unsafe fn with_document<T>(
    doc: *mut c_void,
    fallback: T,
    f: impl FnOnce(&mut NativeDocument) -> T,
) -> T {
    if doc.is_null() {
        set_last_error(ERR_UNKNOWN);
        return fallback;
    }
    // SAFETY: see the function contract.
    let document = unsafe { &mut *doc.cast::<NativeDocument>() };
    catch_unwind(AssertUnwindSafe(|| f(document))).unwrap_or_else(|_| {
        set_last_error(ERR_UNKNOWN);
        fallback
    })
}

/// Loads a document whose bytes are served by `access`.
///
/// `password` may be null. Returns null on failure.
///
/// # Safety
///
/// `access` must stay valid, and its callback callable, until the document
/// is closed. `password` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pdfx_load_custom_document(
    access: *mut FileAccess,
    password: *const c_char,
) -> *mut c_void {
    // SAFETY: forwarded from the caller.
    let password = (!password.is_null()).then(|| unsafe { CStr::from_ptr(password) });
    unsafe { load_document(access, password, EngineConfig::default()) }
}

/// Returns the page count, or 0 if `doc` is null.
///
/// # Safety
///
/// `doc` must be null or a live document pointer.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pdfx_get_page_count(doc: *mut c_void) -> c_int {
    unsafe { with_document(doc, 0, |native| native.document.page_count()) }
}

/// Writes the size of page `index` in points and returns 1, or returns 0
/// with the last error set to `ERR_PAGE` or `ERR_FILE`.
///
/// # Safety
///
/// `doc` must be null or a live document pointer; `width` and `height` must
/// be valid for writes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pdfx_get_page_size_by_index(
    doc: *mut c_void,
    index: c_int,
    width: *mut f64,
    height: *mut f64,
) -> c_int {
    if width.is_null() || height.is_null() {
        set_last_error(ERR_UNKNOWN);
        return 0;
    }
    let size = unsafe {
        with_document(doc, None, |native| {
            let Ok(index) = usize::try_from(index) else {
                set_last_error(ERR_PAGE);
                return None;
            };
            match native.document.page_size(index) {
                Ok(size) => Some(size),
                Err(PDFError::BlockRead { .. }) => {
                    set_last_error(ERR_FILE);
                    None
                }
                Err(error) => {
                    log::debug!("page {index} unavailable: {error}");
                    set_last_error(ERR_PAGE);
                    None
                }
            }
        })
    };

    match size {
        Some((w, h)) => {
            // SAFETY: checked non-null above, valid per the contract.
            unsafe {
                *width = w;
                *height = h;
            }
            1
        }
        None => 0,
    }
}

/// Releases a document. Null is ignored.
///
/// # Safety
///
/// `doc` must be null or a live document pointer, and is dangling afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pdfx_close_document(doc: *mut c_void) {
    if doc.is_null() {
        return;
    }
    // SAFETY: produced by Box::into_raw in load_document.
    let native = unsafe { Box::from_raw(doc.cast::<NativeDocument>()) };
    if catch_unwind(AssertUnwindSafe(move || drop(native))).is_err() {
        set_last_error(ERR_UNKNOWN);
    }
}

/// Status code of the most recent failure on the calling thread.
#[unsafe(no_mangle)]
pub extern "C" fn pdfx_get_last_error() -> c_ulong {
    LAST_ERROR.with(Cell::get)
}

/// The built-in engine, reached through the `pdfx_*` entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine {
    config: EngineConfig,
}

impl NativeEngine {
    pub fn new(config: EngineConfig) -> Self {
        NativeEngine { config }
    }
}

impl Engine for NativeEngine {
    unsafe fn load_custom_document(
        &self,
        access: *mut FileAccess,
        password: Option<&CStr>,
    ) -> Option<RawDocument> {
        RawDocument::new(unsafe { load_document(access, password, self.config) })
    }

    unsafe fn page_count(&self, doc: RawDocument) -> c_int {
        unsafe { pdfx_get_page_count(doc.as_ptr()) }
    }

    unsafe fn page_size(&self, doc: RawDocument, index: c_int) -> Option<(f64, f64)> {
        let (mut width, mut height) = (0.0, 0.0);
        let ok =
            unsafe { pdfx_get_page_size_by_index(doc.as_ptr(), index, &mut width, &mut height) };
        (ok != 0).then_some((width, height))
    }

    unsafe fn close_document(&self, doc: RawDocument) {
        unsafe { pdfx_close_document(doc.as_ptr()) }
    }

    fn last_error(&self) -> c_ulong {
        pdfx_get_last_error()
    }
}
