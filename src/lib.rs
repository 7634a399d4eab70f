//! Incremental PDF document reading over pluggable byte sources.
//!
//! A [`ByteSource`] (a file, an in-memory buffer, anything that can seek and
//! read) is bridged to the block-read callback of a PDF engine. The engine
//! pulls only the blocks it needs to resolve the cross-reference data and
//! the page tree, so opening a large document does not read all of it.
//!
//! ```no_run
//! let doc = pdf_x_bridge::open_path("manual.pdf", None)?;
//! println!("{} pages", doc.page_count()?);
//! let (width, height) = doc.page_size(0)?;
//! println!("first page is {width}x{height} pt");
//! # Ok::<(), pdf_x_bridge::Error>(())
//! ```

pub mod bridge;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod handle;
pub mod source;

pub use bridge::BlockStats;
pub use config::{EngineConfig, OpenOptions};
pub use engine::{Engine, NativeEngine};
pub use error::{Error, ErrorKind, Result};
pub use handle::{DocumentHandle, Input, State};
pub use source::{BufferSource, ByteSource, Capabilities, ForwardSource, PathSource};

use std::path::Path;

fn options_for(password: Option<&str>) -> OpenOptions {
    OpenOptions {
        password: password.map(str::to_owned),
        ..OpenOptions::default()
    }
}

/// Opens a path or a byte source with the native engine.
pub fn open<'a>(input: impl Into<Input<'a>>, password: Option<&str>) -> Result<DocumentHandle<'a>> {
    options_for(password).open(input)
}

/// Opens the file at `path`.
pub fn open_path(
    path: impl AsRef<Path>,
    password: Option<&str>,
) -> Result<DocumentHandle<'static>> {
    options_for(password).open_path(path)
}

/// Opens a caller-provided byte source.
pub fn open_source<'a>(
    source: Box<dyn ByteSource + 'a>,
    password: Option<&str>,
) -> Result<DocumentHandle<'a>> {
    options_for(password).open_source(source)
}
