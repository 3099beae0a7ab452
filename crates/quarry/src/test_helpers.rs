//! Inspection helpers for integration tests. Not part of the public API.

use crate::index::Index;

/// Raw bytes of chunk `i`, sentinels included.
pub fn chunk_data(idx: &Index, i: usize) -> Vec<u8> {
    idx.chunks[i].data().to_vec()
}

/// The suffix array of chunk `i`.
pub fn suffix_array(idx: &Index, i: usize) -> Vec<u32> {
    idx.chunks[i].sa.to_vec()
}

/// Region map of chunk `i` as `(start_offset, content_id)` pairs.
pub fn regions(idx: &Index, i: usize) -> Vec<(u32, u32)> {
    let c = &idx.chunks[i];
    (0..c.region_count()).map(|r| c.region(r)).collect()
}

/// Line-offset table of content `i` (content-relative).
pub fn line_offsets(idx: &Index, i: usize) -> Vec<u32> {
    idx.contents[i].lines.to_vec()
}

/// `(chunk, start, len)` of content `i`.
pub fn content_span(idx: &Index, i: usize) -> (u32, u32, u32) {
    let c = &idx.contents[i];
    (c.chunk, c.start, c.len)
}

/// Content id referenced by file `i`.
pub fn file_content(idx: &Index, i: usize) -> u32 {
    idx.files[i].content
}
