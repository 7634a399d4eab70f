use super::base_stream::BaseStream;
use super::error::{PDFError, PDFResult};
use std::rc::Rc;

/// An in-memory stream.
///
/// Holds data that is already materialised: decoded cross-reference
/// streams, decompressed object streams and test input. Sub-streams share
/// the buffer.
pub struct Stream {
    data: Rc<[u8]>,
    cursor: usize,
    range: std::ops::Range<usize>,
}

impl Stream {
    /// Creates a stream over the whole of `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let range = 0..bytes.len();
        Stream {
            data: bytes.into(),
            cursor: 0,
            range,
        }
    }
}

impl BaseStream for Stream {
    fn length(&self) -> usize {
        self.range.len()
    }

    fn start(&self) -> usize {
        self.range.start
    }

    fn pos(&self) -> usize {
        self.cursor
    }

    fn set_pos(&mut self, pos: usize) -> PDFResult<()> {
        // One past the end is a valid position
        if !(self.range.start..=self.range.end).contains(&pos) {
            return Err(PDFError::InvalidPosition {
                pos,
                length: self.range.len(),
            });
        }
        self.cursor = pos;
        Ok(())
    }

    fn get_byte(&mut self) -> PDFResult<u8> {
        if !self.range.contains(&self.cursor) {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let byte = self.data[self.cursor];
        self.cursor += 1;
        Ok(byte)
    }

    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>> {
        let from = self.cursor;
        self.cursor = from.saturating_add(length).min(self.range.end);
        Ok(self.data[from..self.cursor].to_vec())
    }

    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>> {
        let end = start.saturating_add(length);
        if start < self.range.start || end > self.range.end {
            return Err(PDFError::InvalidByteRange { begin: start, end });
        }
        Ok(Box::new(Stream {
            data: Rc::clone(&self.data),
            cursor: start,
            range: start..end,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_creation() {
        let stream = Stream::from_bytes(vec![1, 2, 3, 4, 5]);

        assert_eq!(stream.length(), 5);
        assert_eq!(stream.pos(), 0);
        assert_eq!(stream.end(), 5);
    }

    #[test]
    fn test_get_byte_and_peek() {
        let mut stream = Stream::from_bytes(vec![10, 20, 30]);

        assert_eq!(stream.peek_byte().unwrap(), 10);
        assert_eq!(stream.pos(), 0);
        assert_eq!(stream.get_byte().unwrap(), 10);
        assert_eq!(stream.get_byte().unwrap(), 20);
        assert_eq!(stream.pos(), 2);
    }

    #[test]
    fn test_get_bytes_stops_at_end() {
        let mut stream = Stream::from_bytes(vec![1, 2, 3]);

        assert_eq!(stream.get_bytes(2).unwrap(), vec![1, 2]);
        assert_eq!(stream.get_bytes(10).unwrap(), vec![3]);
        assert!(stream.get_byte().is_err());
    }

    #[test]
    fn test_sub_stream_uses_absolute_positions() {
        let stream = Stream::from_bytes((1..=10).collect());

        let mut sub = stream.make_sub_stream(2, 4).unwrap();
        assert_eq!(sub.length(), 4);
        assert_eq!(sub.pos(), 2);
        assert_eq!(sub.get_bytes(10).unwrap(), vec![3, 4, 5, 6]);
        assert!(sub.set_pos(1).is_err());
        assert!(stream.make_sub_stream(8, 5).is_err());
    }

    #[test]
    fn test_sub_stream_shares_data() {
        let stream = Stream::from_bytes(vec![0; 16]);
        let _sub1 = stream.make_sub_stream(0, 8).unwrap();
        let _sub2 = stream.make_sub_stream(8, 8).unwrap();

        assert_eq!(Rc::strong_count(&stream.data), 3);
    }

    #[test]
    fn test_get_byte_range_restores_position() {
        let mut stream = Stream::from_bytes(b"hello world".to_vec());
        stream.set_pos(3).unwrap();

        assert_eq!(stream.get_byte_range(6, 11).unwrap(), b"world".to_vec());
        assert_eq!(stream.pos(), 3);
    }
}
