use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One revision of one source repository, identified by `(name, version)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeMeta {
    pub name: String,
    pub version: String,
    /// Free-form tree metadata (e.g. the walked path or a URL pattern).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// A search request. Empty strings mean "no constraint".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
    /// The line regex. Required; an empty pattern matches every line.
    #[serde(default)]
    pub line: String,
    /// Restrict to files whose path matches this regex.
    #[serde(default)]
    pub file: String,
    /// Restrict to trees whose name matches this regex.
    #[serde(default)]
    pub repo: String,
    /// Restrict to tags matching this regex (no-op unless a tags corpus is loaded).
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub fold_case: bool,
    /// Exclude files whose path matches this regex.
    #[serde(default)]
    pub not_file: String,
    /// Exclude trees whose name matches this regex.
    #[serde(default)]
    pub not_repo: String,
    #[serde(default)]
    pub not_tags: String,
}

/// Byte bounds of the match within `line`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: u32,
    pub right: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub tree: String,
    pub version: String,
    pub path: String,
    /// 1-based line number of the matching line.
    pub line_number: u32,
    pub context_before: Vec<String>,
    pub context_after: Vec<String>,
    pub bounds: Bounds,
    /// The matching line, without its trailing newline.
    pub line: String,
}

/// Why a search stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    #[default]
    None,
    Timeout,
    MatchLimit,
    Cancelled,
}

/// Per-query timing, in microseconds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchStats {
    /// Regex compilation and planning.
    pub re2_time: i64,
    /// Context assembly.
    pub git_time: i64,
    /// Result sorting.
    pub sort_time: i64,
    /// Suffix-index lookup and candidate resolution.
    pub index_time: i64,
    /// File/tree filter evaluation.
    pub analyze_time: i64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSearchResult {
    pub stats: SearchStats,
    pub results: Vec<SearchResult>,
}

/// Description of a loaded index, as returned by an `Info` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    pub trees: Vec<TreeMeta>,
    pub has_tags: bool,
}
