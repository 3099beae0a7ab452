use memmap2::Mmap;
use std::sync::Arc;

/// Backing store for an arena of raw bytes: heap-owned while building,
/// a borrowed window of a memory-mapped index file after `load`.
#[derive(Debug, Clone)]
pub(crate) enum ByteStore {
    Owned(Vec<u8>),
    Mapped { map: Arc<Mmap>, off: usize, len: usize },
}

impl ByteStore {
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            ByteStore::Owned(v) => v,
            ByteStore::Mapped { map, off, len } => &map[*off..*off + *len],
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            ByteStore::Owned(v) => v.len(),
            ByteStore::Mapped { len, .. } => *len,
        }
    }
}

/// Backing store for a table of little-endian u32s. The mapped variant decodes
/// per access, which keeps loads zero-copy and byte-order independent.
#[derive(Debug, Clone)]
pub(crate) enum U32Store {
    Owned(Vec<u32>),
    Mapped { map: Arc<Mmap>, off: usize, count: usize },
}

impl U32Store {
    pub(crate) fn len(&self) -> usize {
        match self {
            U32Store::Owned(v) => v.len(),
            U32Store::Mapped { count, .. } => *count,
        }
    }

    #[inline]
    pub(crate) fn get(&self, i: usize) -> u32 {
        match self {
            U32Store::Owned(v) => v[i],
            U32Store::Mapped { map, off, count } => {
                debug_assert!(i < *count);
                let p = *off + i * 4;
                u32::from_le_bytes(map[p..p + 4].try_into().unwrap())
            }
        }
    }

    pub(crate) fn to_vec(&self) -> Vec<u32> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

/// Binary search over `[0, n)` for the first index where `pred` is false.
/// `pred` must be monotone: true for a (possibly empty) prefix, then false.
pub(crate) fn partition(n: usize, pred: impl Fn(usize) -> bool) -> usize {
    let mut lo = 0usize;
    let mut hi = n;
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// A bounded arena of concatenated content bytes, each content followed by a
/// single 0x00 sentinel so no literal lookup can span two contents. Offsets
/// within a chunk fit in u32.
#[derive(Debug)]
pub(crate) struct Chunk {
    pub(crate) bytes: ByteStore,
    /// Suffix array over `bytes`: a permutation of `[0, len)` with suffixes in
    /// non-decreasing lexicographic order. Empty until the index is sealed.
    pub(crate) sa: U32Store,
    /// Region map: `(start_offset, content_id)` pairs, interleaved and sorted
    /// by start offset, partitioning the chunk into content regions.
    pub(crate) regions: U32Store,
}

impl Chunk {
    pub(crate) fn data(&self) -> &[u8] {
        self.bytes.as_slice()
    }

    pub(crate) fn region_count(&self) -> usize {
        self.regions.len() / 2
    }

    pub(crate) fn region(&self, i: usize) -> (u32, u32) {
        (self.regions.get(2 * i), self.regions.get(2 * i + 1))
    }

    /// Resolve a chunk offset to `(content_id, content_relative_offset)`.
    ///
    /// An offset pointing at a content's trailing sentinel byte resolves to
    /// that content with `rel == content.len`; callers reject those.
    pub(crate) fn resolve(&self, off: u32) -> (u32, u32) {
        let n = self.region_count();
        debug_assert!(n > 0, "resolve on an empty chunk");
        let idx = partition(n, |i| self.regions.get(2 * i) <= off).saturating_sub(1);
        let (start, content) = self.region(idx);
        (content, off - start)
    }
}
