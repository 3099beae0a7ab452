use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use super::{HEADER_BYTES, MAGIC, VERSION};

fn align4(off: usize) -> usize {
    let rem = off % 4;
    if rem == 0 { off } else { off + (4 - rem) }
}

fn align8(off: usize) -> usize {
    let rem = off % 8;
    if rem == 0 { off } else { off + (8 - rem) }
}
use crate::corpus::chunk::{ByteStore, Chunk, U32Store};
use crate::corpus::store::{Content, FileEntry};
use crate::error::{Error, Result};
use crate::index::Index;
use crate::types::TreeMeta;

/// Memory-map a dumped index and rebuild the in-memory views. Chunk arenas,
/// suffix arrays, line-offset tables and region maps all reference the
/// mapping; only catalog strings are decoded.
pub(crate) fn read_index(path: &Path) -> Result<Index> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    let map = Arc::new(mmap);

    if map.len() < HEADER_BYTES {
        return Err(Error::IncompatibleIndex(format!(
            "file of {} bytes is smaller than the header",
            map.len()
        )));
    }
    let magic = read_u32_at(&map, 0)?;
    let version = read_u32_at(&map, 4)?;
    if magic != MAGIC {
        return Err(Error::IncompatibleIndex(format!(
            "bad magic {:#010x}, expected {:#010x}",
            magic, MAGIC
        )));
    }
    if version != VERSION {
        return Err(Error::IncompatibleIndex(format!(
            "format version {} unsupported, expected {}",
            version, VERSION
        )));
    }
    let chunk_count = read_u32_at(&map, 8)? as usize;
    let chunks_off = read_u64_at(&map, 16)? as usize;
    let suffix_off = read_u64_at(&map, 24)? as usize;
    let catalog_off = read_u64_at(&map, 32)? as usize;
    let regions_off = read_u64_at(&map, 40)? as usize;

    // Chunk arenas.
    let mut arena_spans: Vec<(usize, usize)> = Vec::with_capacity(chunk_count);
    let mut off = chunks_off;
    for _ in 0..chunk_count {
        let len = read_u64(&map, &mut off, "chunk arena length")? as usize;
        check_span(&map, off, len, "chunk arena")?;
        arena_spans.push((off, len));
        off += len;
        off = align8(off);
    }

    // Suffix arrays.
    let mut sa_spans: Vec<(usize, usize)> = Vec::with_capacity(chunk_count);
    let mut off = suffix_off;
    for _ in 0..chunk_count {
        let count = read_u64(&map, &mut off, "suffix array length")? as usize;
        check_span(&map, off, count * 4, "suffix array")?;
        sa_spans.push((off, count));
        off += count * 4;
        off = align8(off);
    }

    // Catalog.
    let mut off = catalog_off;
    let name = read_str16(&map, &mut off, "index name")?;
    let tree_count = read_u32(&map, &mut off, "tree count")? as usize;
    let mut trees = Vec::with_capacity(tree_count);
    for _ in 0..tree_count {
        let tname = read_str16(&map, &mut off, "tree name")?;
        let version = read_str16(&map, &mut off, "tree version")?;
        let meta_count = read_u32(&map, &mut off, "tree metadata count")? as usize;
        let mut metadata = BTreeMap::new();
        for _ in 0..meta_count {
            let k = read_str16(&map, &mut off, "metadata key")?;
            let v = read_str16(&map, &mut off, "metadata value")?;
            metadata.insert(k, v);
        }
        trees.push(TreeMeta {
            name: tname,
            version,
            metadata,
        });
    }
    let file_count = read_u32(&map, &mut off, "file count")? as usize;
    let mut files = Vec::with_capacity(file_count);
    for _ in 0..file_count {
        let tree = read_u32(&map, &mut off, "file tree id")?;
        let content = read_u32(&map, &mut off, "file content id")?;
        let path = read_str16(&map, &mut off, "file path")?;
        if tree as usize >= tree_count {
            return Err(Error::IncompatibleIndex(format!(
                "file references tree {} of {}",
                tree, tree_count
            )));
        }
        files.push(FileEntry {
            tree,
            path,
            content,
        });
    }
    off = align4(off);
    let content_count = read_u32(&map, &mut off, "content count")? as usize;
    let mut records: Vec<(u32, u32, u32, u32)> = Vec::with_capacity(content_count);
    for _ in 0..content_count {
        let chunk = read_u32(&map, &mut off, "content chunk id")?;
        let start = read_u32(&map, &mut off, "content start")?;
        let len = read_u32(&map, &mut off, "content length")?;
        let lines = read_u32(&map, &mut off, "content line count")?;
        if chunk as usize >= chunk_count {
            return Err(Error::IncompatibleIndex(format!(
                "content references chunk {} of {}",
                chunk, chunk_count
            )));
        }
        let arena_len = arena_spans[chunk as usize].1;
        if (start as usize) + (len as usize) + 1 > arena_len {
            return Err(Error::IncompatibleIndex(format!(
                "content spans past its chunk arena (start={}, len={}, arena={})",
                start, len, arena_len
            )));
        }
        records.push((chunk, start, len, lines));
    }
    let mut contents = Vec::with_capacity(content_count);
    for (chunk, start, len, line_entries) in records {
        let count = line_entries as usize;
        check_span(&map, off, count * 4, "line-offset table")?;
        contents.push(Content {
            chunk,
            start,
            len,
            lines: U32Store::Mapped {
                map: Arc::clone(&map),
                off,
                count,
            },
        });
        off += count * 4;
    }
    for f in &files {
        if f.content as usize >= contents.len() {
            return Err(Error::IncompatibleIndex(format!(
                "file references content {} of {}",
                f.content,
                contents.len()
            )));
        }
    }

    // Region maps.
    let mut region_spans: Vec<(usize, usize)> = Vec::with_capacity(chunk_count);
    let mut off = regions_off;
    for _ in 0..chunk_count {
        let count = read_u64(&map, &mut off, "region map length")? as usize;
        check_span(&map, off, count * 4, "region map")?;
        region_spans.push((off, count));
        off += count * 4;
        off = align8(off);
    }

    let chunks: Vec<Chunk> = (0..chunk_count)
        .map(|i| {
            let (aoff, alen) = arena_spans[i];
            let (soff, scount) = sa_spans[i];
            let (roff, rcount) = region_spans[i];
            Chunk {
                bytes: ByteStore::Mapped {
                    map: Arc::clone(&map),
                    off: aoff,
                    len: alen,
                },
                sa: U32Store::Mapped {
                    map: Arc::clone(&map),
                    off: soff,
                    count: scount,
                },
                regions: U32Store::Mapped {
                    map: Arc::clone(&map),
                    off: roff,
                    count: rcount,
                },
            }
        })
        .collect();
    for (i, c) in chunks.iter().enumerate() {
        if c.sa.len() != c.bytes.len() {
            return Err(Error::IncompatibleIndex(format!(
                "chunk {}: suffix array has {} entries for {} bytes",
                i,
                c.sa.len(),
                c.bytes.len()
            )));
        }
    }

    let mut content_files: Vec<Vec<u32>> = vec![Vec::new(); contents.len()];
    for (i, f) in files.iter().enumerate() {
        content_files[f.content as usize].push(i as u32);
    }

    Ok(Index {
        name,
        trees,
        files,
        contents,
        content_files,
        chunks,
    })
}

fn truncated(what: &str, off: usize) -> Error {
    Error::IncompatibleIndex(format!("index truncated reading {} (off={})", what, off))
}

fn check_span(map: &Mmap, off: usize, len: usize, what: &str) -> Result<()> {
    if off.checked_add(len).map_or(true, |end| end > map.len()) {
        return Err(truncated(what, off));
    }
    Ok(())
}

fn read_u32_at(map: &Mmap, off: usize) -> Result<u32> {
    let mut o = off;
    read_u32(map, &mut o, "header field")
}

fn read_u64_at(map: &Mmap, off: usize) -> Result<u64> {
    let mut o = off;
    read_u64(map, &mut o, "header field")
}

fn read_u32(map: &Mmap, off: &mut usize, what: &str) -> Result<u32> {
    check_span(map, *off, 4, what)?;
    let v = u32::from_le_bytes(map[*off..*off + 4].try_into().unwrap());
    *off += 4;
    Ok(v)
}

fn read_u64(map: &Mmap, off: &mut usize, what: &str) -> Result<u64> {
    check_span(map, *off, 8, what)?;
    let v = u64::from_le_bytes(map[*off..*off + 8].try_into().unwrap());
    *off += 8;
    Ok(v)
}

fn read_str16(map: &Mmap, off: &mut usize, what: &str) -> Result<String> {
    check_span(map, *off, 2, what)?;
    let len = u16::from_le_bytes(map[*off..*off + 2].try_into().unwrap()) as usize;
    *off += 2;
    check_span(map, *off, len, what)?;
    let s = std::str::from_utf8(&map[*off..*off + len])
        .map_err(|_| Error::IncompatibleIndex(format!("{} is not valid UTF-8 (off={})", what, off)))?
        .to_string();
    *off += len;
    Ok(s)
}
