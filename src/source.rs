//! Random-access byte sources that documents are read from.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// The operations a [`ByteSource`] actually supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub seek: bool,
    pub tell: bool,
    pub read_into: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        seek: true,
        tell: true,
        read_into: true,
    };

    /// Names of the unsupported operations, in declaration order.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.seek, "seek"),
            (self.tell, "tell"),
            (self.read_into, "read_into"),
        ]
        .into_iter()
        .filter_map(|(supported, name)| (!supported).then_some(name))
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.seek && self.tell && self.read_into
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::ALL
    }
}

/// A random-access provider of document bytes.
///
/// Sources are checked once, when a document is opened: every operation
/// reported by [`ByteSource::capabilities`] must be available, otherwise the
/// open fails with a configuration error before the engine is involved.
pub trait ByteSource {
    /// Moves the cursor, returning the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;

    /// Current absolute position.
    fn tell(&mut self) -> io::Result<u64>;

    /// Reads up to `buf.len()` bytes at the cursor, returning how many were
    /// read. Zero means end of data.
    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    /// Releases whatever the source owns. Called once when the document
    /// handle closes.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A source over any seekable reader the caller already has.
///
/// Closing it does nothing: the reader belongs to the caller, so a
/// `&mut Cursor<Vec<u8>>` is still usable after the document is closed.
#[derive(Debug)]
pub struct BufferSource<R> {
    inner: R,
}

impl<R: Read + Seek> BufferSource<R> {
    pub fn new(inner: R) -> Self {
        BufferSource { inner }
    }
}

impl<R: Read + Seek> ByteSource for BufferSource<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// A source that opens and owns a file.
#[derive(Debug)]
pub struct PathSource {
    path: PathBuf,
    file: Option<BufferSource<File>>,
}

impl PathSource {
    /// Opens `path` for binary reading. Relative paths are resolved against
    /// the current directory first.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let file = File::open(&path)?;
        log::debug!("opened {}", path.display());
        Ok(PathSource {
            path,
            file: Some(BufferSource::new(file)),
        })
    }

    /// The absolute path this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn file(&mut self) -> io::Result<&mut BufferSource<File>> {
        self.file.as_mut().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} is closed", self.path.display()),
            )
        })
    }
}

impl ByteSource for PathSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }

    fn tell(&mut self) -> io::Result<u64> {
        self.file()?.tell()
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read_into(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        if self.file.take().is_some() {
            log::debug!("closed {}", self.path.display());
        }
        Ok(())
    }
}

/// A forward-only reader such as a pipe. It cannot seek, so opening a
/// document from it fails with a configuration error.
#[derive(Debug)]
pub struct ForwardSource<R> {
    inner: R,
}

impl<R: Read> ForwardSource<R> {
    pub fn new(inner: R) -> Self {
        ForwardSource { inner }
    }
}

fn unsupported(op: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("{op} is not supported"))
}

impl<R: Read> ByteSource for ForwardSource<R> {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(unsupported("seek"))
    }

    fn tell(&mut self) -> io::Result<u64> {
        Err(unsupported("tell"))
    }

    fn read_into(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            seek: false,
            tell: false,
            read_into: true,
        }
    }
}
