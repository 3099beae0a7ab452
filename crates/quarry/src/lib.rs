//! quarry: an interactive, regex-driven source-code search engine over a
//! fixed corpus of repository snapshots.
//!
//! Ingest builds a content-addressed, chunked corpus with one suffix array
//! per chunk; queries are planned into required literal substrings, located
//! through the suffix index, and verified line-by-line with the full regex.

pub mod error;
pub mod index;
pub mod search;
pub mod types;

mod corpus;
mod planner;
mod shard;
mod suffix;

pub use crate::error::{Error, Result};
pub use crate::index::{FileId, Index, IndexBuilder, TreeId};
pub use crate::search::{CancelToken, SearchOpts, Searcher};
pub use crate::types::{
    Bounds, CodeSearchResult, ExitReason, IndexInfo, Query, SearchResult, SearchStats, TreeMeta,
};

/// Convenience for callers (and tests) that want a one-shot single-tree index.
pub fn build_index<P, B, I>(tree: &str, version: &str, files: I) -> Result<Index>
where
    P: Into<String>,
    B: AsRef<[u8]>,
    I: IntoIterator<Item = (P, B)>,
{
    let mut builder = IndexBuilder::new();
    let t = builder.add_tree(tree, version, Default::default())?;
    for (path, bytes) in files {
        builder.add_file(t, path, bytes.as_ref())?;
    }
    builder.finalize()
}

#[doc(hidden)]
pub mod test_helpers;
