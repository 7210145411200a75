//! Chunk planning for a single transfer.

/// A chunk of a transfer: byte range [offset, offset + len).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub offset: u64,
    pub len: u64,
}

impl ChunkRange {
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// Number of chunks for a transfer of `size` bytes with `block_size` chunks.
///
/// Always at least 1: a zero-byte transfer still gets one empty chunk so the
/// destination is created. Exact for every input; callers bound it.
pub fn chunk_count(size: u64, block_size: u64) -> u64 {
    let block_size = block_size.max(1);
    size.div_ceil(block_size).max(1)
}

/// Byte range of chunk `index` of a transfer of `size` bytes. The last chunk may be short.
pub fn chunk_range(size: u64, block_size: u64, index: u64) -> ChunkRange {
    let block_size = block_size.max(1);
    let offset = index.saturating_mul(block_size).min(size);
    let len = (size - offset).min(block_size);
    ChunkRange { offset, len }
}

/// All chunk ranges of a transfer, in order.
pub fn plan_chunks(size: u64, block_size: u64) -> Vec<ChunkRange> {
    (0..chunk_count(size, block_size))
        .map(|i| chunk_range(size, block_size, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_chunks_even() {
        let chunks = plan_chunks(1000, 250);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], ChunkRange { offset: 0, len: 250 });
        assert_eq!(chunks[3], ChunkRange { offset: 750, len: 250 });
        assert_eq!(chunks[3].end(), 1000);
    }

    #[test]
    fn plan_chunks_short_tail() {
        let chunks = plan_chunks(10, 4);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2], ChunkRange { offset: 8, len: 2 });
    }

    #[test]
    fn zero_size_has_one_empty_chunk() {
        assert_eq!(chunk_count(0, 4096), 1);
        let chunks = plan_chunks(0, 4096);
        assert_eq!(chunks, vec![ChunkRange { offset: 0, len: 0 }]);
    }

    #[test]
    fn zero_block_size_is_clamped() {
        assert_eq!(chunk_count(3, 0), 3);
    }

    #[test]
    fn chunk_count_does_not_saturate() {
        assert_eq!(chunk_count(u64::MAX, 1), u64::MAX);
        assert_eq!(chunk_count(u64::MAX, 8 * 1024 * 1024), 1 << 41);
        assert_eq!(chunk_count(u64::MAX, u64::MAX), 1);
    }
}
