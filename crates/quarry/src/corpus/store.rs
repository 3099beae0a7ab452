use fnv::FnvHashMap;
use rayon::prelude::*;
use sha2::{Digest, Sha256};

use super::chunk::{partition, ByteStore, Chunk, U32Store};
use crate::error::{Error, Result};
use crate::suffix;

/// Byte separating contents inside a chunk arena.
pub(crate) const SENTINEL: u8 = 0x00;

/// Default cap on a chunk arena. Bounded so offsets fit u32 and so the
/// per-chunk suffix sort stays tractable.
pub(crate) const DEFAULT_CHUNK_BYTES: usize = 32 << 20;

/// Files containing a line longer than this are skipped at ingest.
pub(crate) const MAX_LINE_BYTES: usize = 1 << 20;

/// A deduplicated blob of file bytes with its line-offset table.
///
/// `lines` is content-relative: `lines[0] == 0`, strictly increasing, and the
/// last entry equals `len`. The stored bytes always end with a newline (one is
/// appended at ingest when the raw file lacks it), so line `i` spans
/// `[lines[i], lines[i + 1])` and includes its terminating `\n`.
#[derive(Debug)]
pub(crate) struct Content {
    pub(crate) chunk: u32,
    pub(crate) start: u32,
    pub(crate) len: u32,
    pub(crate) lines: U32Store,
}

impl Content {
    pub(crate) fn line_count(&self) -> usize {
        self.lines.len() - 1
    }

    /// Line index owning a content-relative offset. `rel` must be `< len`.
    pub(crate) fn line_of(&self, rel: u32) -> usize {
        debug_assert!(rel < self.len);
        partition(self.lines.len(), |i| self.lines.get(i) <= rel) - 1
    }

    /// Content-relative `[start, end)` of line `i`, including its newline.
    pub(crate) fn line_span(&self, i: usize) -> (u32, u32) {
        (self.lines.get(i), self.lines.get(i + 1))
    }
}

/// A file in the catalog: a path within a tree, pointing at shared content.
#[derive(Debug, Clone)]
pub(crate) struct FileEntry {
    pub(crate) tree: u32,
    pub(crate) path: String,
    pub(crate) content: u32,
}

struct ChunkBuilder {
    bytes: Vec<u8>,
    regions: Vec<u32>,
}

/// Append-only content store used during ingest. Sealing sorts the suffix
/// arrays and converts the accumulated arenas into read-only chunks.
pub(crate) struct StoreBuilder {
    chunk_limit: usize,
    done: Vec<ChunkBuilder>,
    cur: ChunkBuilder,
    contents: Vec<Content>,
    dedup: FnvHashMap<[u8; 32], u32>,
}

impl StoreBuilder {
    pub(crate) fn new(chunk_limit: usize) -> Self {
        Self {
            chunk_limit: chunk_limit.max(1),
            done: Vec::new(),
            cur: ChunkBuilder {
                bytes: Vec::new(),
                regions: Vec::new(),
            },
            contents: Vec::new(),
            dedup: FnvHashMap::default(),
        }
    }

    /// Add one file's raw bytes, deduplicating by content hash.
    ///
    /// Returns `Ok(None)` when the file is skipped under the long-line policy.
    pub(crate) fn add_content(&mut self, raw: &[u8]) -> Result<Option<u32>> {
        let mut hasher = Sha256::new();
        hasher.update(raw);
        let hash: [u8; 32] = hasher.finalize().into();
        if let Some(&id) = self.dedup.get(&hash) {
            return Ok(Some(id));
        }

        let needs_newline = raw.last() != Some(&b'\n');
        let len = raw.len() + usize::from(needs_newline);
        if len >= u32::MAX as usize {
            return Err(Error::IndexBuildFailed(format!(
                "content of {} bytes exceeds the 4 GiB chunk offset range",
                raw.len()
            )));
        }

        // Line-offset table, computed once at ingest: start of every line,
        // plus a final entry equal to the content length.
        let mut lines: Vec<u32> = vec![0];
        let mut last_start = 0usize;
        for (i, &b) in raw.iter().enumerate() {
            if b == b'\n' {
                if i - last_start > MAX_LINE_BYTES {
                    return Ok(None);
                }
                last_start = i + 1;
                if last_start < len {
                    lines.push(last_start as u32);
                }
            }
        }
        if raw.len() - last_start > MAX_LINE_BYTES {
            return Ok(None);
        }
        lines.push(len as u32);

        // Rotate to a fresh chunk when this content (plus its sentinel) would
        // overflow the current one. An oversized content gets a chunk alone.
        if !self.cur.bytes.is_empty() && self.cur.bytes.len() + len + 1 > self.chunk_limit {
            let full = std::mem::replace(
                &mut self.cur,
                ChunkBuilder {
                    bytes: Vec::new(),
                    regions: Vec::new(),
                },
            );
            self.done.push(full);
        }

        let chunk = self.done.len() as u32;
        let start = self.cur.bytes.len() as u32;
        self.cur.regions.push(start);
        self.cur.regions.push(self.contents.len() as u32);
        self.cur.bytes.extend_from_slice(raw);
        if needs_newline {
            self.cur.bytes.push(b'\n');
        }
        self.cur.bytes.push(SENTINEL);

        let id = self.contents.len() as u32;
        self.contents.push(Content {
            chunk,
            start,
            len: len as u32,
            lines: U32Store::Owned(lines),
        });
        self.dedup.insert(hash, id);
        Ok(Some(id))
    }

    /// Seal the store: sort a suffix array per chunk (in parallel) and freeze
    /// the arenas.
    pub(crate) fn seal(mut self) -> Result<(Vec<Chunk>, Vec<Content>)> {
        if !self.cur.bytes.is_empty() {
            self.done.push(self.cur);
        }
        let chunks: Vec<Chunk> = self
            .done
            .into_par_iter()
            .map(|cb| {
                let sa = suffix::build(&cb.bytes);
                Chunk {
                    bytes: ByteStore::Owned(cb.bytes),
                    sa: U32Store::Owned(sa),
                    regions: U32Store::Owned(cb.regions),
                }
            })
            .collect();
        for (i, c) in chunks.iter().enumerate() {
            if c.sa.len() != c.bytes.len() {
                return Err(Error::IndexBuildFailed(format!(
                    "suffix array for chunk {} has {} entries for {} bytes",
                    i,
                    c.sa.len(),
                    c.bytes.len()
                )));
            }
        }
        Ok((chunks, self.contents))
    }
}
