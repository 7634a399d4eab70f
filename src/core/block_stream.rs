use super::base_stream::BaseStream;
use super::chunk_manager::{ChunkLoader, ChunkManager};
use super::error::{PDFError, PDFResult};
use crate::engine::{BLOCK_OK, FileAccess};
use std::cell::RefCell;
use std::os::raw::c_ulong;
use std::rc::Rc;

/// Loads chunks by invoking the caller's file-access callback.
pub struct CallbackLoader {
    access: *const FileAccess,
    chunk_size: usize,
    total_length: usize,
}

impl CallbackLoader {
    /// # Safety
    ///
    /// `access` must stay valid for as long as the loader is used.
    pub unsafe fn new(access: *const FileAccess, chunk_size: usize) -> Self {
        let total_length = unsafe { (*access).file_len } as usize;
        CallbackLoader {
            access,
            chunk_size: chunk_size.max(1),
            total_length,
        }
    }
}

impl ChunkLoader for CallbackLoader {
    fn request_chunk(&mut self, chunk_num: usize) -> PDFResult<Vec<u8>> {
        let begin = chunk_num * self.chunk_size;
        let end = (begin + self.chunk_size).min(self.total_length);
        if begin >= end {
            return Err(PDFError::InvalidByteRange { begin, end });
        }

        let mut buffer = vec![0u8; end - begin];
        log::trace!("requesting block {} ({}..{})", chunk_num, begin, end);
        // Copy the record out so no reference into it is alive while the
        // callback runs.
        // SAFETY: `access` is valid per the constructor contract and `buffer`
        // has exactly `end - begin` writable bytes.
        let status = unsafe {
            let access = *self.access;
            access.read_block(begin as c_ulong, buffer.as_mut_ptr(), buffer.len() as c_ulong)
        };
        if status != BLOCK_OK {
            return Err(PDFError::BlockRead {
                offset: begin,
                size: end - begin,
            });
        }
        Ok(buffer)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn total_length(&self) -> usize {
        self.total_length
    }
}

struct Shared {
    loader: Box<dyn ChunkLoader>,
    manager: ChunkManager,
}

/// A stream over file data fetched block by block through a [`ChunkLoader`].
///
/// Every sub-stream shares the loader and the block cache, so a block read
/// once for the xref is not read again when an object inside it is fetched.
pub struct BlockStream {
    shared: Rc<RefCell<Shared>>,
    pos: usize,
    start: usize,
    length: usize,
}

impl BlockStream {
    pub fn new(loader: Box<dyn ChunkLoader>, max_cached_chunks: usize) -> Self {
        let length = loader.total_length();
        let manager = ChunkManager::new(length, Some(loader.chunk_size()), Some(max_cached_chunks));
        BlockStream {
            shared: Rc::new(RefCell::new(Shared { loader, manager })),
            pos: 0,
            start: 0,
            length,
        }
    }

    /// Number of distinct blocks fetched so far.
    pub fn num_chunks_loaded(&self) -> usize {
        self.shared.borrow().manager.num_chunks_loaded()
    }

    /// Returns the block containing `pos` and the absolute offset it starts at.
    fn chunk_at(&self, pos: usize) -> PDFResult<(Rc<[u8]>, usize)> {
        let mut shared = self.shared.borrow_mut();
        let Shared { loader, manager } = &mut *shared;
        let chunk_num = manager.get_chunk_number(pos);
        let chunk = manager.ensure_chunk(loader.as_mut(), chunk_num)?;
        Ok((chunk, manager.chunk_range(chunk_num).0))
    }
}

impl BaseStream for BlockStream {
    fn length(&self) -> usize {
        self.length
    }

    fn start(&self) -> usize {
        self.start
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn set_pos(&mut self, pos: usize) -> PDFResult<()> {
        if pos < self.start || pos > self.end() {
            return Err(PDFError::InvalidPosition {
                pos,
                length: self.length,
            });
        }
        self.pos = pos;
        Ok(())
    }

    fn get_byte(&mut self) -> PDFResult<u8> {
        if self.pos >= self.end() {
            return Err(PDFError::UnexpectedEndOfStream);
        }
        let (chunk, chunk_start) = self.chunk_at(self.pos)?;
        let byte = chunk[self.pos - chunk_start];
        self.pos += 1;
        Ok(byte)
    }

    fn get_bytes(&mut self, length: usize) -> PDFResult<Vec<u8>> {
        let end_pos = self.pos.saturating_add(length).min(self.end());
        let mut result = Vec::with_capacity(end_pos - self.pos);

        while self.pos < end_pos {
            let (chunk, chunk_start) = self.chunk_at(self.pos)?;
            let read_start = self.pos - chunk_start;
            let read_end = (end_pos - chunk_start).min(chunk.len());
            result.extend_from_slice(&chunk[read_start..read_end]);
            self.pos = chunk_start + read_end;
        }

        Ok(result)
    }

    fn make_sub_stream(&self, start: usize, length: usize) -> PDFResult<Box<dyn BaseStream>> {
        let end = start.saturating_add(length);
        if start < self.start || end > self.end() {
            return Err(PDFError::InvalidByteRange { begin: start, end });
        }
        Ok(Box::new(BlockStream {
            shared: Rc::clone(&self.shared),
            pos: start,
            start,
            length,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BLOCK_FAILED;
    use std::os::raw::{c_int, c_uchar, c_void};

    struct Counting {
        data: Vec<u8>,
        calls: Vec<(usize, usize)>,
        fail: bool,
    }

    unsafe extern "C" fn counting_get_block(
        param: *mut c_void,
        position: c_ulong,
        buf: *mut c_uchar,
        size: c_ulong,
    ) -> c_int {
        let file = unsafe { &mut *(param as *mut Counting) };
        let (pos, size) = (position as usize, size as usize);
        file.calls.push((pos, size));
        if file.fail || pos + size > file.data.len() {
            return BLOCK_FAILED;
        }
        unsafe { std::ptr::copy_nonoverlapping(file.data.as_ptr().add(pos), buf, size) };
        BLOCK_OK
    }

    fn access_for(file: &mut Counting) -> FileAccess {
        FileAccess {
            file_len: file.data.len() as c_ulong,
            get_block: Some(counting_get_block),
            param: file as *mut Counting as *mut c_void,
        }
    }

    #[test]
    fn test_reads_across_block_boundaries() {
        let mut file = Counting {
            data: (0..250u32).map(|i| i as u8).collect(),
            calls: Vec::new(),
            fail: false,
        };
        let access = access_for(&mut file);
        let loader = unsafe { CallbackLoader::new(&access, 100) };
        let mut stream = BlockStream::new(Box::new(loader), 4);

        stream.set_pos(95).unwrap();
        let bytes = stream.get_bytes(10).unwrap();
        assert_eq!(bytes, (95..105).map(|i| i as u8).collect::<Vec<_>>());
        assert_eq!(stream.num_chunks_loaded(), 2);

        stream.set_pos(249).unwrap();
        assert_eq!(stream.get_byte().unwrap(), 249);
        assert!(stream.get_byte().is_err());

        drop(stream);
        assert_eq!(file.calls, vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[test]
    fn test_sub_streams_share_cache() {
        let mut file = Counting {
            data: vec![7u8; 64],
            calls: Vec::new(),
            fail: false,
        };
        let access = access_for(&mut file);
        let loader = unsafe { CallbackLoader::new(&access, 32) };
        let stream = BlockStream::new(Box::new(loader), 4);

        let mut a = stream.make_sub_stream(0, 16).unwrap();
        let mut b = stream.make_sub_stream(16, 16).unwrap();
        a.get_bytes(16).unwrap();
        b.get_bytes(16).unwrap();

        drop((a, b, stream));
        assert_eq!(file.calls.len(), 1);
    }

    #[test]
    fn test_callback_failure_is_block_read_error() {
        let mut file = Counting {
            data: vec![0u8; 10],
            calls: Vec::new(),
            fail: true,
        };
        let access = access_for(&mut file);
        let loader = unsafe { CallbackLoader::new(&access, 8) };
        let mut stream = BlockStream::new(Box::new(loader), 2);

        assert!(matches!(
            stream.get_byte(),
            Err(PDFError::BlockRead { offset: 0, size: 8 })
        ));
    }
}
