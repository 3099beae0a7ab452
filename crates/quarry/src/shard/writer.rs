use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use super::{HEADER_BYTES, MAGIC, VERSION};
use crate::error::{Error, Result};
use crate::index::Index;

/// Serialize a sealed index to `path`.
///
/// The header is written with zeroed section offsets first, then each section
/// is streamed and its real offset patched in at the end.
pub(crate) fn write_index(idx: &Index, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    w.write_all(&MAGIC.to_le_bytes())?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&(idx.chunks.len() as u32).to_le_bytes())?;
    w.write_all(&0u32.to_le_bytes())?; // reserved
    for _ in 0..4 {
        w.write_all(&0u64.to_le_bytes())?; // section offsets, patched below
    }
    debug_assert_eq!(w.stream_position()? as usize, HEADER_BYTES);

    // Chunk arenas.
    let chunks_off = w.stream_position()?;
    for chunk in &idx.chunks {
        let data = chunk.data();
        w.write_all(&(data.len() as u64).to_le_bytes())?;
        w.write_all(data)?;
        pad8(&mut w)?;
    }

    // Suffix arrays.
    let suffix_off = w.stream_position()?;
    for chunk in &idx.chunks {
        w.write_all(&(chunk.sa.len() as u64).to_le_bytes())?;
        for i in 0..chunk.sa.len() {
            w.write_all(&chunk.sa.get(i).to_le_bytes())?;
        }
        pad8(&mut w)?;
    }

    // Catalog: name, trees, files, then the content table.
    let catalog_off = w.stream_position()?;
    write_str16(&mut w, &idx.name)?;
    w.write_all(&(idx.trees.len() as u32).to_le_bytes())?;
    for tree in &idx.trees {
        write_str16(&mut w, &tree.name)?;
        write_str16(&mut w, &tree.version)?;
        w.write_all(&(tree.metadata.len() as u32).to_le_bytes())?;
        for (k, v) in &tree.metadata {
            write_str16(&mut w, k)?;
            write_str16(&mut w, v)?;
        }
    }
    w.write_all(&(idx.files.len() as u32).to_le_bytes())?;
    for f in &idx.files {
        w.write_all(&f.tree.to_le_bytes())?;
        w.write_all(&f.content.to_le_bytes())?;
        write_str16(&mut w, &f.path)?;
    }
    pad4(&mut w)?;
    w.write_all(&(idx.contents.len() as u32).to_le_bytes())?;
    for c in &idx.contents {
        w.write_all(&c.chunk.to_le_bytes())?;
        w.write_all(&c.start.to_le_bytes())?;
        w.write_all(&c.len.to_le_bytes())?;
        w.write_all(&(c.lines.len() as u32).to_le_bytes())?;
    }
    for c in &idx.contents {
        for i in 0..c.lines.len() {
            w.write_all(&c.lines.get(i).to_le_bytes())?;
        }
    }
    pad8(&mut w)?;

    // Region maps.
    let regions_off = w.stream_position()?;
    for chunk in &idx.chunks {
        w.write_all(&(chunk.regions.len() as u64).to_le_bytes())?;
        for i in 0..chunk.regions.len() {
            w.write_all(&chunk.regions.get(i).to_le_bytes())?;
        }
        pad8(&mut w)?;
    }

    // Patch the header offsets.
    w.flush()?;
    let mut file = w.into_inner().map_err(|e| Error::Io(e.into_error()))?;
    file.seek(SeekFrom::Start(16))?;
    file.write_all(&chunks_off.to_le_bytes())?;
    file.write_all(&suffix_off.to_le_bytes())?;
    file.write_all(&catalog_off.to_le_bytes())?;
    file.write_all(&regions_off.to_le_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn write_str16<W: Write>(w: &mut W, s: &str) -> Result<()> {
    let b = s.as_bytes();
    if b.len() > u16::MAX as usize {
        return Err(Error::IndexBuildFailed(format!(
            "string of {} bytes too long for catalog",
            b.len()
        )));
    }
    w.write_all(&(b.len() as u16).to_le_bytes())?;
    w.write_all(b)?;
    Ok(())
}

fn pad8<W: Write + Seek>(w: &mut W) -> Result<()> {
    pad_to(w, 8)
}

fn pad4<W: Write + Seek>(w: &mut W) -> Result<()> {
    pad_to(w, 4)
}

fn pad_to<W: Write + Seek>(w: &mut W, align: u64) -> Result<()> {
    let pos = w.stream_position()?;
    let rem = pos % align;
    if rem != 0 {
        let zeros = [0u8; 8];
        w.write_all(&zeros[..(align - rem) as usize])?;
    }
    Ok(())
}
