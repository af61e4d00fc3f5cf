use std::collections::HashSet;
use std::num::NonZeroUsize;

use bytes::{Bytes, BytesMut};
use lru::LruCache;
use parking_lot::{Condvar, Mutex};

use super::RangeReader;
use crate::error::IoError;

/// Default block size: 256KB
/// Large enough to cover a CZI directory or a run of TIFF IFDs in one read.
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default cache capacity in number of blocks.
/// 100 blocks * 256KB = 25.6MB default cache size.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Reads spanning at least this many blocks skip the cache.
///
/// Sub-block payloads are read once and decoded; caching them would only
/// evict the small structural blocks that parsing keeps revisiting.
const BYPASS_BLOCK_COUNT: u64 = 4;

struct CacheState {
    blocks: LruCache<u64, Bytes>,
    in_flight: HashSet<u64>,
}

/// Block-based caching layer that wraps any RangeReader.
///
/// Header and directory parsing issue many small reads at scattered offsets.
/// The cache rounds them up to fixed-size blocks so that neighbouring fields
/// are served from memory.
///
/// Features:
/// - Fixed-size block cache (default 256KB blocks)
/// - LRU eviction when cache reaches capacity
/// - Singleflight: concurrent requests for the same block share one fetch
/// - Handles reads spanning multiple blocks
/// - Large reads go straight to the underlying reader
pub struct BlockCache<R> {
    /// The underlying reader
    inner: R,
    /// Block size in bytes
    block_size: usize,
    state: Mutex<CacheState>,
    /// Signalled whenever an in-flight fetch completes
    fetched: Condvar,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache wrapping the given reader.
    ///
    /// Uses default block size (256KB) and cache capacity (100 blocks).
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// Zero values are clamped to one.
    ///
    /// # Arguments
    /// * `inner` - The underlying reader to wrap
    /// * `block_size` - Size of each cached block in bytes
    /// * `capacity` - Maximum number of blocks to cache
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        Self {
            inner,
            block_size: block_size.max(1),
            state: Mutex::new(CacheState {
                blocks: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
                in_flight: HashSet::new(),
            }),
            fetched: Condvar::new(),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Get a block from cache or fetch it from the underlying reader.
    ///
    /// If several threads request the same block concurrently, only one fetch
    /// is performed and the others wait for its result.
    fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        {
            let mut state = self.state.lock();
            loop {
                if let Some(data) = state.blocks.get(&block_idx) {
                    return Ok(data.clone());
                }
                if !state.in_flight.contains(&block_idx) {
                    state.in_flight.insert(block_idx);
                    break;
                }
                self.fetched.wait(&mut state);
            }
        }

        let result = self.fetch_block_from_source(block_idx);

        {
            let mut state = self.state.lock();
            if let Ok(ref data) = result {
                state.blocks.put(block_idx, data.clone());
            }
            state.in_flight.remove(&block_idx);
        }
        self.fetched.notify_all();

        result
    }

    /// Fetch a block directly from the underlying reader.
    fn fetch_block_from_source(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let offset = block_idx * self.block_size as u64;
        let size = self.inner.size();

        // Last block may be short
        let remaining = size.saturating_sub(offset);
        if remaining == 0 {
            return Err(IoError::RangeOutOfBounds {
                resource: self.inner.identifier().to_string(),
                offset,
                requested: self.block_size as u64,
                size,
            });
        }

        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        self.inner.read_exact_at(offset, len)
    }

    #[inline]
    fn block_for_offset(&self, offset: u64) -> u64 {
        offset / self.block_size as u64
    }

    #[inline]
    fn offset_within_block(&self, offset: u64) -> usize {
        (offset % self.block_size as u64) as usize
    }
}

impl<R: RangeReader> RangeReader for BlockCache<R> {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.inner.size();
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > size) {
            return Err(IoError::RangeOutOfBounds {
                resource: self.inner.identifier().to_string(),
                offset,
                requested: len as u64,
                size,
            });
        }

        if len == 0 {
            return Ok(Bytes::new());
        }

        let start_block = self.block_for_offset(offset);
        let end_block = self.block_for_offset(offset + len as u64 - 1);

        if end_block - start_block + 1 >= BYPASS_BLOCK_COUNT {
            return self.inner.read_exact_at(offset, len);
        }

        if start_block == end_block {
            let block = self.get_block(start_block)?;
            let block_offset = self.offset_within_block(offset);
            return Ok(block.slice(block_offset..block_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut remaining = len;
        let mut current_offset = offset;

        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx)?;
            let block_offset = self.offset_within_block(current_offset);
            let bytes_in_block = std::cmp::min(block.len() - block_offset, remaining);

            result.extend_from_slice(&block[block_offset..block_offset + bytes_in_block]);

            remaining -= bytes_in_block;
            current_offset += bytes_in_block as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
