//! Adapts a [`ByteSource`] to the engine's block-read callback.
//!
//! The engine asks for `size` bytes at `offset` whenever it needs them, in
//! any order. Each request seeks the source to the absolute offset and fills
//! the engine's buffer completely, or fails with a status code. Failures and
//! panics are caught here and kept on the reader so the handle can report
//! the underlying I/O error later.

use crate::engine::{BLOCK_FAILED, BLOCK_OK, FileAccess};
use crate::error::{Error, Result};
use crate::source::ByteSource;
use std::io::{self, SeekFrom};
use std::marker::PhantomData;
use std::os::raw::{c_int, c_uchar, c_ulong, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;

/// Counters for the block requests a bridge has handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Requests served successfully
    pub requests: u64,
    /// Bytes delivered to the engine
    pub bytes: u64,
    /// Requests that returned a failure status
    pub failures: u64,
}

/// Fails with a configuration error if `source` lacks a required operation.
pub fn check_capabilities(source: &dyn ByteSource) -> Result<()> {
    let missing = source.capabilities().missing();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Configuration { missing })
    }
}

/// Determines the total length of `source`, leaving its cursor where it was.
pub fn probe_length(source: &mut dyn ByteSource) -> Result<u64> {
    let as_config = |op: &'static str| {
        move |e: io::Error| match e.kind() {
            io::ErrorKind::Unsupported => Error::Configuration { missing: vec![op] },
            _ => Error::Io(e),
        }
    };

    let original = source.tell().map_err(as_config("tell"))?;
    source.seek(SeekFrom::End(0)).map_err(as_config("seek"))?;
    let length = source.tell().map_err(as_config("tell"))?;
    source
        .seek(SeekFrom::Start(original))
        .map_err(as_config("seek"))?;
    engine_length(length)?;
    Ok(length)
}

/// `length` as the engine's `file_len`, or an error when it does not fit.
pub fn engine_length(length: u64) -> Result<c_ulong> {
    c_ulong::try_from(length).map_err(|_| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source of {length} bytes is too large for the engine"),
        ))
    })
}

/// The state behind the callback's `param` pointer.
pub struct BlockReader<'a> {
    source: Box<dyn ByteSource + 'a>,
    length: u64,
    access: FileAccess,
    last_failure: Option<io::Error>,
    stats: BlockStats,
}

impl BlockReader<'_> {
    /// Serves one request.
    ///
    /// # Safety
    ///
    /// `buf` must be valid for `size` writes when the range is in bounds.
    unsafe fn read_block(&mut self, offset: u64, buf: *mut c_uchar, size: u64) -> io::Result<()> {
        let in_bounds = offset.checked_add(size).is_some_and(|end| end <= self.length);
        if !in_bounds {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "block of {} bytes at offset {} is outside the {}-byte file",
                    size, offset, self.length
                ),
            ));
        }
        if size == 0 {
            return Ok(());
        }
        if buf.is_null() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "null block buffer"));
        }
        let len = usize::try_from(size).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "block size overflows usize")
        })?;
        // SAFETY: non-null and valid for `len` writes per the contract.
        let dest = unsafe { std::slice::from_raw_parts_mut(buf, len) };

        let pos = self.source.seek(SeekFrom::Start(offset))?;
        if pos != offset {
            return Err(io::Error::other(format!(
                "seek to {} landed at {}",
                offset, pos
            )));
        }

        let mut filled = 0;
        while filled < len {
            match self.source.read_into(&mut dest[filled..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "short read: {} of {} bytes at offset {}",
                            filled, len, offset
                        ),
                    ));
                }
                Ok(n) if n > len - filled => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("source reported {} bytes for a {}-byte buffer", n, len - filled),
                    ));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.stats.requests += 1;
        self.stats.bytes += size;
        Ok(())
    }

    fn record_failure(&mut self, error: io::Error) {
        log::debug!("block read failed: {error}");
        self.stats.failures += 1;
        self.last_failure = Some(error);
    }
}

/// The callback handed to the engine.
///
/// # Safety
///
/// `param` must be null or the `param` of a live [`PinnedReader`]'s
/// [`FileAccess`]. `buf` must be valid for `size` writes.
pub unsafe extern "C" fn get_block(
    param: *mut c_void,
    position: c_ulong,
    buf: *mut c_uchar,
    size: c_ulong,
) -> c_int {
    if param.is_null() {
        return BLOCK_FAILED;
    }
    // SAFETY: `param` was set from the reader's own heap address.
    let reader = unsafe { &mut *param.cast::<BlockReader<'_>>() };
    log::trace!("get_block offset={position} size={size}");

    let outcome = catch_unwind(AssertUnwindSafe(|| unsafe {
        reader.read_block(position as u64, buf, size as u64)
    }));
    match outcome {
        Ok(Ok(())) => BLOCK_OK,
        Ok(Err(error)) => {
            reader.record_failure(error);
            BLOCK_FAILED
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            reader.record_failure(io::Error::other(format!("byte source panicked: {message}")));
            BLOCK_FAILED
        }
    }
}

/// A heap-allocated [`BlockReader`] whose address stays fixed.
///
/// The engine holds pointers to the embedded [`FileAccess`] and to the
/// reader itself, so the reader is only ever touched through the raw pointer
/// kept here.
pub struct PinnedReader<'a> {
    ptr: NonNull<BlockReader<'a>>,
    _owns: PhantomData<Box<BlockReader<'a>>>,
}

impl<'a> PinnedReader<'a> {
    /// Builds the bridge for `source`, whose total length is `length`.
    ///
    /// A length past [`engine_length`] is capped, so requests beyond the
    /// cap are refused.
    pub fn new(source: Box<dyn ByteSource + 'a>, length: u64) -> Self {
        let file_len = engine_length(length).unwrap_or(c_ulong::MAX);
        let reader = Box::new(BlockReader {
            source,
            length: u64::from(file_len),
            access: FileAccess {
                file_len,
                get_block: Some(get_block),
                param: std::ptr::null_mut(),
            },
            last_failure: None,
            stats: BlockStats::default(),
        });
        let ptr = NonNull::from(Box::leak(reader));
        // SAFETY: freshly leaked, nothing else refers to it yet.
        unsafe {
            (*ptr.as_ptr()).access.param = ptr.as_ptr().cast();
        }
        PinnedReader {
            ptr,
            _owns: PhantomData,
        }
    }

    /// Pointer to hand to the engine's load call.
    pub fn access_ptr(&self) -> *mut FileAccess {
        // SAFETY: the allocation is live while `self` exists.
        unsafe { &raw mut (*self.ptr.as_ptr()).access }
    }

    pub fn length(&self) -> u64 {
        // SAFETY: no engine call is running while the handle holds `&self`.
        unsafe { (*self.ptr.as_ptr()).length }
    }

    pub fn stats(&self) -> BlockStats {
        unsafe { (*self.ptr.as_ptr()).stats }
    }

    /// Takes the failure recorded by the most recent failing request.
    pub fn take_failure(&self) -> Option<io::Error> {
        unsafe { (*self.ptr.as_ptr()).last_failure.take() }
    }

    /// Frees the bridge and hands the source back.
    ///
    /// The engine must no longer hold the access pointer.
    pub fn into_source(self) -> Box<dyn ByteSource + 'a> {
        // SAFETY: created by Box::leak in `new`; `forget` prevents a double free.
        let reader = unsafe { Box::from_raw(self.ptr.as_ptr()) };
        std::mem::forget(self);
        reader.source
    }
}

impl Drop for PinnedReader<'_> {
    fn drop(&mut self) {
        // SAFETY: created by Box::leak in `new` and not freed yet.
        drop(unsafe { Box::from_raw(self.ptr.as_ptr()) });
    }
}
