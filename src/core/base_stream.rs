use super::error::{PDFError, PDFResult};

/// Byte access shared by every stream the parser reads.
///
/// Implemented by [`Stream`](super::Stream) for data held in memory and by
/// [`BlockStream`](super::BlockStream) for file data fetched through the
/// engine's file-access callback.
///
/// A stream is a window `[start, start + length)` over its data and all
/// positions are absolute offsets into that data.
pub trait BaseStream {
    fn length(&self) -> usize;

    /// Absolute offset where the window begins.
    fn start(&self) -> usize;

    fn pos(&self) -> usize;

    /// Moves to `pos`, which may be one past the last byte.
    fn set_pos(&mut self, pos: usize) -> PDFResult<()>;

    /// Reads one byte, or fails with [`PDFError::UnexpectedEndOfStream`] at
    /// the end of the window.
    fn get_byte(&mut self) -> PDFResult<u8>;

    /// Reads up to `length` bytes. Fewer come back only at the end of the
    /// window.
    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>>;

    /// A stream over `[start, start + length)` sharing this one's data.
    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>>;

    /// Absolute offset one past the last byte of the window.
    fn end(&self) -> usize {
        self.start() + self.length()
    }

    fn peek_byte(&mut self) -> PDFResult<u8> {
        let at = self.pos();
        let byte = self.get_byte()?;
        self.set_pos(at)?;
        Ok(byte)
    }

    /// Reads `[begin, end)` and restores the current position.
    fn get_byte_range(&mut self, begin: usize, end: usize) -> PDFResult<Vec<u8>> {
        if begin > end || begin < self.start() || end > self.end() {
            return Err(PDFError::InvalidByteRange { begin, end });
        }
        let at = self.pos();
        self.set_pos(begin)?;
        let bytes = self.get_bytes(end - begin);
        self.set_pos(at)?;
        bytes
    }
}
