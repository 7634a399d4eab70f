//! Document handles: opening, validation, queries and release.

use crate::bridge::{self, BlockStats, PinnedReader};
use crate::config::OpenOptions;
use crate::engine::{Engine, NativeEngine, RawDocument};
use crate::error::{Context, Error, Result, translate};
use crate::source::{ByteSource, PathSource};
use std::ffi::CString;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

/// Lifecycle of a [`DocumentHandle`].
///
/// Only `Open` and `Closed` handles are ever returned to callers; the other
/// states exist while [`DocumentHandle::open_with`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unopened,
    Opening,
    Open,
    Closed,
    Failed,
}

/// What to open: a filesystem path or a caller-provided source.
pub enum Input<'a> {
    Path(PathBuf),
    Source(Box<dyn ByteSource + 'a>),
}

impl From<&Path> for Input<'_> {
    fn from(path: &Path) -> Self {
        Input::Path(path.to_path_buf())
    }
}

impl From<PathBuf> for Input<'_> {
    fn from(path: PathBuf) -> Self {
        Input::Path(path)
    }
}

impl From<&str> for Input<'_> {
    fn from(path: &str) -> Self {
        Input::Path(PathBuf::from(path))
    }
}

impl<'a> From<Box<dyn ByteSource + 'a>> for Input<'a> {
    fn from(source: Box<dyn ByteSource + 'a>) -> Self {
        Input::Source(source)
    }
}

/// An open PDF document.
///
/// Owns the engine document, the bridge serving its block reads and the byte
/// source behind the bridge. They are released in that order by
/// [`close`](Self::close) or on drop. The handle is neither `Send` nor
/// `Sync`.
pub struct DocumentHandle<'a, E: Engine = NativeEngine> {
    engine: E,
    doc: Option<RawDocument>,
    bridge: Option<PinnedReader<'a>>,
    file_len: u64,
    state: State,
}

impl<'a, E: Engine> DocumentHandle<'a, E> {
    /// Opens `source` with `engine`.
    ///
    /// The source is checked for the operations it needs and its length is
    /// probed before the engine sees it. The document must report at least
    /// one page. On any failure everything acquired so far is released,
    /// including closing the source.
    pub fn open_with(
        engine: E,
        mut source: Box<dyn ByteSource + 'a>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let mut state = State::Unopened;
        log::debug!("state {:?}: checking byte source", state);

        let (file_len, password) = match Self::prepare(source.as_mut(), options) {
            Ok(prepared) => prepared,
            Err(error) => {
                if let Err(close_error) = source.close() {
                    log::debug!("closing rejected source failed: {close_error}");
                }
                return Err(error);
            }
        };

        state = State::Opening;
        let bridge = PinnedReader::new(source, file_len);
        let access = bridge.access_ptr();
        let mut handle = DocumentHandle {
            engine,
            doc: None,
            bridge: Some(bridge),
            file_len,
            state,
        };
        log::debug!(
            "state {:?}: loading {} bytes{}",
            handle.state,
            file_len,
            if password.is_some() { " with password" } else { "" }
        );

        // SAFETY: the bridge stays allocated, at the same address, until
        // `release` has closed the document.
        let loaded = unsafe { handle.engine.load_custom_document(access, password.as_deref()) };

        let Some(doc) = loaded else {
            let error = handle.engine_error(None);
            handle.fail();
            return Err(error);
        };
        handle.doc = Some(doc);
        handle.state = State::Open;

        // SAFETY: `doc` was just returned by this engine.
        let count = unsafe { handle.engine.page_count(doc) };
        if count < 1 {
            handle.fail();
            return Err(Error::PageCountInvalid { count });
        }

        log::debug!("state {:?}: {} pages", handle.state, count);
        Ok(handle)
    }

    /// Runs the checks that need nothing but the source and the options.
    fn prepare(
        source: &mut dyn ByteSource,
        options: &OpenOptions,
    ) -> Result<(u64, Option<CString>)> {
        bridge::check_capabilities(source)?;
        let file_len = bridge::probe_length(source)?;
        let password = options
            .password
            .as_deref()
            .map(CString::new)
            .transpose()
            .map_err(|_| Error::InvalidPassword)?;
        Ok((file_len, password))
    }

    /// Opens the file at `path` with `engine`.
    pub fn open_path_with(
        engine: E,
        path: &Path,
        options: &OpenOptions,
    ) -> Result<DocumentHandle<'static, E>> {
        let source = PathSource::open(path)?;
        DocumentHandle::open_with(engine, Box::new(source), options)
    }

    /// Translates the engine's last error, picking up any failure the bridge
    /// recorded.
    fn engine_error(&self, page: Option<usize>) -> Error {
        let code = self.engine.last_error();
        let io_failure = self.bridge.as_ref().and_then(PinnedReader::take_failure);
        translate(code, Context { io_failure, page })
    }

    fn fail(&mut self) {
        if let Err(error) = self.release() {
            log::debug!("release after failed open: {error}");
        }
        self.state = State::Failed;
        log::debug!("state {:?}", self.state);
    }

    /// Closes the document, then frees the bridge, then closes the source.
    fn release(&mut self) -> Result<()> {
        if let Some(doc) = self.doc.take() {
            // SAFETY: `doc` came from this engine and is dropped from `self`.
            unsafe { self.engine.close_document(doc) };
        }
        match self.bridge.take() {
            Some(bridge) => bridge.into_source().close().map_err(Error::Io),
            None => Ok(()),
        }
    }

    /// Releases everything. Closing an already closed handle does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        let result = self.release();
        self.state = State::Closed;
        log::debug!("state {:?}", self.state);
        result
    }

    fn document(&self) -> Result<RawDocument> {
        match (self.state, self.doc) {
            (State::Open, Some(doc)) => Ok(doc),
            _ => Err(Error::Closed),
        }
    }

    /// Number of pages, at least 1.
    pub fn page_count(&self) -> Result<usize> {
        let doc = self.document()?;
        // SAFETY: `doc` is open.
        let count = unsafe { self.engine.page_count(doc) };
        usize::try_from(count)
            .ok()
            .filter(|&n| n >= 1)
            .ok_or(Error::PageCountInvalid { count })
    }

    /// Width and height in points of page `index`, with rotation applied.
    pub fn page_size(&self, index: usize) -> Result<(f64, f64)> {
        let doc = self.document()?;
        let count = self.page_count()?;
        if index >= count {
            return Err(Error::PageIndex { index, count });
        }
        let engine_index = c_int::try_from(index).map_err(|_| Error::PageIndex { index, count })?;

        // SAFETY: `doc` is open.
        match unsafe { self.engine.page_size(doc, engine_index) } {
            Some(size) => Ok(size),
            None => Err(self.engine_error(Some(index))),
        }
    }

    /// Block requests served so far.
    pub fn block_stats(&self) -> Result<BlockStats> {
        self.document()?;
        self.bridge.as_ref().map(PinnedReader::stats).ok_or(Error::Closed)
    }

    /// Total length of the source in bytes.
    pub fn file_len(&self) -> Result<u64> {
        self.document()?;
        Ok(self.file_len)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == State::Open
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

impl<E: Engine> Drop for DocumentHandle<'_, E> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            log::debug!("error while dropping document: {error}");
        }
    }
}

impl<E: Engine> std::fmt::Debug for DocumentHandle<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandle")
            .field("state", &self.state)
            .field("file_len", &self.file_len)
            .finish_non_exhaustive()
    }
}
