//! Options for opening documents.

use crate::core::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CACHED_CHUNKS};
use crate::engine::NativeEngine;
use crate::handle::{DocumentHandle, Input};
use crate::source::ByteSource;
use crate::Result;
use std::path::Path;

/// Tuning for the native engine's block cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size of each block requested through the read callback, in bytes.
    pub block_size: usize,
    /// Number of blocks kept in memory.
    pub max_cached_blocks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            block_size: DEFAULT_CHUNK_SIZE,
            max_cached_blocks: DEFAULT_MAX_CACHED_CHUNKS,
        }
    }
}

impl EngineConfig {
    /// Copy with both sizes raised to at least 1.
    pub fn normalized(self) -> Self {
        EngineConfig {
            block_size: self.block_size.max(1),
            max_cached_blocks: self.max_cached_blocks.max(1),
        }
    }
}

/// Options for opening a document.
///
/// ```no_run
/// use pdf_x_bridge::OpenOptions;
///
/// let doc = OpenOptions::new()
///     .password("secret")
///     .block_size(16 * 1024)
///     .open_path("report.pdf")?;
/// println!("{} pages", doc.page_count()?);
/// # Ok::<(), pdf_x_bridge::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    pub password: Option<String>,
    pub engine: EngineConfig,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.engine.block_size = block_size;
        self
    }

    pub fn max_cached_blocks(mut self, max_cached_blocks: usize) -> Self {
        self.engine.max_cached_blocks = max_cached_blocks;
        self
    }

    /// Opens `input` with the native engine.
    pub fn open<'a>(&self, input: impl Into<Input<'a>>) -> Result<DocumentHandle<'a>> {
        match input.into() {
            Input::Path(path) => self.open_path(path),
            Input::Source(source) => self.open_source(source),
        }
    }

    pub fn open_path(&self, path: impl AsRef<Path>) -> Result<DocumentHandle<'static>> {
        DocumentHandle::open_path_with(self.native_engine(), path.as_ref(), self)
    }

    pub fn open_source<'a>(&self, source: Box<dyn ByteSource + 'a>) -> Result<DocumentHandle<'a>> {
        DocumentHandle::open_with(self.native_engine(), source, self)
    }

    fn native_engine(&self) -> NativeEngine {
        NativeEngine::new(self.engine)
    }
}
