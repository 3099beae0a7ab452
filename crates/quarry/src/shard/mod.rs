//! On-disk index format: dump and load.
//!
//! Little-endian throughout, explicit widths, absolute file offsets. The
//! layout is header, chunk arenas, suffix arrays, catalog, region maps; the
//! writer streams sections and patches the header offsets afterwards, and the
//! reader memory-maps the file and hands out views into the mapping without
//! copying the arenas.

pub(crate) const MAGIC: u32 = 0x5152_4958; // 'QRIX'
pub(crate) const VERSION: u32 = 1;

/// Fixed header size: magic, version, chunk count, reserved, four section
/// offsets.
pub(crate) const HEADER_BYTES: usize = 16 + 8 * 4;

mod reader;
mod writer;

pub(crate) use reader::read_index;
pub(crate) use writer::write_index;
