use super::error::{PDFError, PDFResult};
use lru::LruCache;
use rustc_hash::FxHashSet;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Default chunk size: 64 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 65536;

/// Default number of chunks kept in memory
pub const DEFAULT_MAX_CACHED_CHUNKS: usize = 10;

/// Trait for loading chunks from a data source.
///
/// The native engine has exactly one data source, the file-access callback
/// handed over at load time, but the cache does not care where bytes come
/// from. Tests drive it with an in-memory loader.
pub trait ChunkLoader {
    /// Performs the I/O to fetch chunk `chunk_num`.
    ///
    /// The returned data may be shorter than `chunk_size` for the last chunk.
    fn request_chunk(&mut self, chunk_num: usize) -> PDFResult<Vec<u8>>;

    /// Returns the chunk size in bytes.
    fn chunk_size(&self) -> usize;

    /// Returns the total data length in bytes.
    fn total_length(&self) -> usize;
}

/// Bounded LRU cache of fixed-size chunks.
///
/// Evicted chunks are requested again from the loader. `loaded` remembers
/// every chunk fetched at least once.
pub struct ChunkManager {
    total_length: usize,
    chunk_size: usize,
    cache: LruCache<usize, Rc<[u8]>>,
    loaded: FxHashSet<usize>,
}

impl ChunkManager {
    /// Zero sizes are raised to 1.
    pub fn new(
        total_length: usize,
        chunk_size: Option<usize>,
        max_cached_chunks: Option<usize>,
    ) -> Self {
        let chunk_size = chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE).max(1);
        let capacity = NonZeroUsize::new(max_cached_chunks.unwrap_or(DEFAULT_MAX_CACHED_CHUNKS))
            .unwrap_or(NonZeroUsize::MIN);

        ChunkManager {
            total_length,
            chunk_size,
            cache: LruCache::new(capacity),
            loaded: FxHashSet::default(),
        }
    }

    pub fn length(&self) -> usize {
        self.total_length
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn num_chunks(&self) -> usize {
        self.total_length.div_ceil(self.chunk_size)
    }

    pub fn get_chunk_number(&self, pos: usize) -> usize {
        pos / self.chunk_size
    }

    /// Byte range `[begin, end)` covered by `chunk_num`.
    pub fn chunk_range(&self, chunk_num: usize) -> (usize, usize) {
        let begin = chunk_num.saturating_mul(self.chunk_size);
        (begin, begin.saturating_add(self.chunk_size).min(self.total_length))
    }

    /// Stores freshly loaded chunk data, which must cover the whole chunk.
    pub fn on_receive_data(&mut self, chunk_num: usize, chunk: Vec<u8>) -> PDFResult<()> {
        let (begin, end) = self.chunk_range(chunk_num);
        if chunk_num >= self.num_chunks() || chunk.len() != end - begin {
            return Err(PDFError::InvalidByteRange {
                begin,
                end: begin + chunk.len(),
            });
        }

        self.loaded.insert(chunk_num);
        self.cache.put(chunk_num, chunk.into());
        Ok(())
    }

    /// Returns a cached chunk and marks it most recently used.
    pub fn get_chunk(&mut self, chunk_num: usize) -> Option<Rc<[u8]>> {
        self.cache.get(&chunk_num).cloned()
    }

    /// Number of distinct chunks loaded so far, cached or evicted.
    pub fn num_chunks_loaded(&self) -> usize {
        self.loaded.len()
    }

    /// Returns the chunk, requesting it from `loader` on a cache miss.
    pub fn ensure_chunk(
        &mut self,
        loader: &mut dyn ChunkLoader,
        chunk_num: usize,
    ) -> PDFResult<Rc<[u8]>> {
        if let Some(chunk) = self.get_chunk(chunk_num) {
            return Ok(chunk);
        }
        let data = loader.request_chunk(chunk_num)?;
        self.on_receive_data(chunk_num, data)?;
        self.get_chunk(chunk_num)
            .ok_or_else(|| PDFError::Generic(format!("chunk {chunk_num} vanished from cache")))
    }
}
