//! The native PDF engine: stream access, syntax, cross-reference data,
//! security and the page tree.
//!
//! Nothing in here knows about byte sources or handles. It reads the file
//! exclusively through a [`BaseStream`], which in production is a
//! [`BlockStream`] calling back across the engine boundary.

pub mod base_stream;
pub mod block_stream;
pub mod chunk_manager;
pub mod crypto;
pub mod decode;
pub mod document;
pub mod encryption;
pub mod error;
pub mod lexer;
pub mod page;
pub mod parser;
pub mod stream;
pub mod xref;

pub use base_stream::BaseStream;
pub use block_stream::{BlockStream, CallbackLoader};
pub use chunk_manager::{ChunkLoader, ChunkManager, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CACHED_CHUNKS};
pub use document::PDFDocument;
pub use error::{PDFError, PDFResult};
pub use lexer::{Lexer, Token};
pub use page::{Page, PageTree};
pub use parser::{Dict, PDFObject, Parser};
pub use stream::Stream;
pub use xref::{XRef, XRefEntry};
