//! The match engine: plan, locate candidates through the suffix index,
//! verify with the full regex, filter, contextualize, and collect.

use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::corpus::chunk::Chunk;
use crate::corpus::store::Content;
use crate::error::Result;
use crate::index::{FileId, Index};
use crate::planner::{self, Plan};
use crate::suffix;
use crate::types::{Bounds, CodeSearchResult, ExitReason, Query, SearchResult, SearchStats};

/// Per-query execution limits.
#[derive(Debug, Clone)]
pub struct SearchOpts {
    /// Stop after this many emitted results (`MATCH_LIMIT`).
    pub max_matches: usize,
    /// Wall-clock budget (`TIMEOUT`).
    pub timeout: Duration,
    /// Lines of context fetched before and after each match.
    pub context_lines: usize,
}

impl Default for SearchOpts {
    fn default() -> Self {
        Self {
            max_matches: 50,
            timeout: Duration::from_millis(1000),
            context_lines: 3,
        }
    }
}

/// Cooperative cancellation handle, polled at per-candidate and per-line loop
/// boundaries. Cancelling keeps results already collected.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

const EXIT_NONE: u8 = 0;
const EXIT_TIMEOUT: u8 = 1;
const EXIT_MATCH_LIMIT: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

struct Filters {
    file: Option<regex::Regex>,
    not_file: Option<regex::Regex>,
    repo: Option<regex::Regex>,
    not_repo: Option<regex::Regex>,
}

impl Filters {
    fn compile(q: &Query) -> Result<Filters> {
        fn opt(pat: &str) -> Result<Option<regex::Regex>> {
            if pat.is_empty() {
                Ok(None)
            } else {
                Ok(Some(regex::Regex::new(pat)?))
            }
        }
        Ok(Filters {
            file: opt(&q.file)?,
            not_file: opt(&q.not_file)?,
            repo: opt(&q.repo)?,
            not_repo: opt(&q.not_repo)?,
        })
    }

    fn accept(&self, tree_name: &str, path: &str) -> bool {
        if let Some(re) = &self.repo {
            if !re.is_match(tree_name) {
                return false;
            }
        }
        if let Some(re) = &self.not_repo {
            if re.is_match(tree_name) {
                return false;
            }
        }
        if let Some(re) = &self.file {
            if !re.is_match(path) {
                return false;
            }
        }
        if let Some(re) = &self.not_file {
            if re.is_match(path) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct WorkerStats {
    index_time: i64,
    analyze_time: i64,
    git_time: i64,
}

impl WorkerStats {
    fn add(self, other: WorkerStats) -> WorkerStats {
        WorkerStats {
            index_time: self.index_time + other.index_time,
            analyze_time: self.analyze_time + other.analyze_time,
            git_time: self.git_time + other.git_time,
        }
    }
}

struct Shared<'a> {
    idx: &'a Index,
    line_re: &'a regex::bytes::Regex,
    filters: &'a Filters,
    plan: &'a Plan,
    opts: &'a SearchOpts,
    cancel: &'a CancelToken,
    deadline: Instant,
    emitted: AtomicUsize,
    exit: AtomicU8,
    collector: Mutex<Vec<SearchResult>>,
}

impl Shared<'_> {
    fn set_exit(&self, reason: u8) {
        let _ = self
            .exit
            .compare_exchange(EXIT_NONE, reason, Ordering::SeqCst, Ordering::SeqCst);
    }

    /// Poll limits at a loop boundary. True means stop working.
    fn stopped(&self) -> bool {
        if self.exit.load(Ordering::Relaxed) != EXIT_NONE {
            return true;
        }
        if self.cancel.is_cancelled() {
            self.set_exit(EXIT_CANCELLED);
            return true;
        }
        if Instant::now() >= self.deadline {
            self.set_exit(EXIT_TIMEOUT);
            return true;
        }
        false
    }
}

/// Read-only query executor borrowing a sealed [`Index`].
pub struct Searcher<'a> {
    idx: &'a Index,
}

impl<'a> Searcher<'a> {
    pub fn new(idx: &'a Index) -> Self {
        Self { idx }
    }

    /// Run one query to completion (or to its limits), returning results
    /// grouped by `(tree, path)` with ascending line numbers.
    pub fn search(
        &self,
        query: &Query,
        opts: &SearchOpts,
        cancel: &CancelToken,
    ) -> Result<CodeSearchResult> {
        let mut stats = SearchStats::default();

        let t_compile = Instant::now();
        let line_re = regex::bytes::RegexBuilder::new(&query.line)
            .case_insensitive(query.fold_case)
            .size_limit(1 << 20)
            .build()?;
        let filters = Filters::compile(query)?;
        let plan = planner::plan(&query.line, query.fold_case)?;
        stats.re2_time = t_compile.elapsed().as_micros() as i64;

        // No tags corpus is ever ingested, so a tags constraint matches
        // nothing; not_tags excludes nothing.
        if !query.tags.is_empty() {
            return Ok(CodeSearchResult {
                stats,
                results: Vec::new(),
            });
        }
        if opts.max_matches == 0 {
            stats.exit_reason = ExitReason::MatchLimit;
            return Ok(CodeSearchResult {
                stats,
                results: Vec::new(),
            });
        }

        let shared = Shared {
            idx: self.idx,
            line_re: &line_re,
            filters: &filters,
            plan: &plan,
            opts,
            cancel,
            deadline: t_compile + opts.timeout,
            emitted: AtomicUsize::new(0),
            exit: AtomicU8::new(EXIT_NONE),
            collector: Mutex::new(Vec::new()),
        };

        let worker = self
            .idx
            .chunks
            .par_iter()
            .map(|chunk| search_chunk(&shared, chunk))
            .reduce(WorkerStats::default, WorkerStats::add);
        stats.index_time = worker.index_time;
        stats.analyze_time = worker.analyze_time;
        stats.git_time = worker.git_time;

        let mut results = shared.collector.into_inner();
        let t_sort = Instant::now();
        results.sort_unstable_by(|a, b| {
            (&a.tree, &a.path, a.line_number, &a.version)
                .cmp(&(&b.tree, &b.path, b.line_number, &b.version))
        });
        results.truncate(opts.max_matches);
        stats.sort_time = t_sort.elapsed().as_micros() as i64;

        stats.exit_reason = match shared.exit.load(Ordering::SeqCst) {
            EXIT_TIMEOUT => ExitReason::Timeout,
            EXIT_MATCH_LIMIT => ExitReason::MatchLimit,
            EXIT_CANCELLED => ExitReason::Cancelled,
            _ => ExitReason::None,
        };
        Ok(CodeSearchResult { stats, results })
    }
}

/// Candidate generation, verification and emission for one chunk.
fn search_chunk(shared: &Shared<'_>, chunk: &Chunk) -> WorkerStats {
    let mut ws = WorkerStats::default();
    if shared.stopped() {
        return ws;
    }
    let data = chunk.data();
    let contents = &shared.idx.contents;

    // Locate: resolve planner literals through the suffix array, coalescing
    // candidates by (content, line) so overlapping literal hits verify once.
    let t_index = Instant::now();
    let mut cand: BTreeSet<(u32, u32)> = BTreeSet::new();
    match shared.plan {
        Plan::Literals(lits) => {
            'lits: for lit in lits {
                let (lo, hi) = suffix::sa_range(data, &chunk.sa, lit);
                for i in lo..hi {
                    if shared.stopped() {
                        break 'lits;
                    }
                    let off = chunk.sa.get(i);
                    let (cid, rel) = chunk.resolve(off);
                    let content = &contents[cid as usize];
                    if rel >= content.len {
                        // The literal started on a chunk sentinel byte.
                        continue;
                    }
                    cand.insert((cid, content.line_of(rel) as u32));
                }
            }
        }
        Plan::FullScan => {
            'regions: for ri in 0..chunk.region_count() {
                let (_, cid) = chunk.region(ri);
                let content = &contents[cid as usize];
                for line in 0..content.line_count() {
                    if shared.stopped() {
                        break 'regions;
                    }
                    cand.insert((cid, line as u32));
                }
            }
        }
    }
    ws.index_time = t_index.elapsed().as_micros() as i64;

    // Verify each candidate line, then fan out to the files sharing its
    // content, filter, contextualize and emit.
    'cand: for &(cid, line) in &cand {
        if shared.stopped() {
            break;
        }
        let content = &contents[cid as usize];
        let (ls, le) = content.line_span(line as usize);
        let start = (content.start + ls) as usize;
        let end = (content.start + le) as usize;
        let line_bytes = &data[start..end - 1];
        let m = match shared.line_re.find(line_bytes) {
            Some(m) => m,
            None => continue,
        };
        let bounds = Bounds {
            left: m.start() as u32,
            right: m.end() as u32,
        };

        let t_analyze = Instant::now();
        let mut emit: Vec<FileId> = Vec::new();
        for &fid in &shared.idx.content_files[cid as usize] {
            let file = &shared.idx.files[fid as usize];
            let tree = &shared.idx.trees[file.tree as usize];
            if shared.filters.accept(&tree.name, &file.path) {
                emit.push(fid);
            }
        }
        ws.analyze_time += t_analyze.elapsed().as_micros() as i64;
        if emit.is_empty() {
            continue;
        }

        let t_context = Instant::now();
        let k = shared.opts.context_lines as u32;
        let line_count = content.line_count() as u32;
        let context_before: Vec<String> = (line.saturating_sub(k)..line)
            .map(|ln| line_text(chunk, content, ln))
            .collect();
        let context_after: Vec<String> = (line + 1..(line + 1 + k).min(line_count))
            .map(|ln| line_text(chunk, content, ln))
            .collect();
        let text = String::from_utf8_lossy(line_bytes).into_owned();
        ws.git_time += t_context.elapsed().as_micros() as i64;

        for fid in emit {
            let n = shared.emitted.fetch_add(1, Ordering::SeqCst);
            if n >= shared.opts.max_matches {
                shared.set_exit(EXIT_MATCH_LIMIT);
                break 'cand;
            }
            let file = &shared.idx.files[fid as usize];
            let tree = &shared.idx.trees[file.tree as usize];
            shared.collector.lock().push(SearchResult {
                tree: tree.name.clone(),
                version: tree.version.clone(),
                path: file.path.clone(),
                line_number: line + 1,
                context_before: context_before.clone(),
                context_after: context_after.clone(),
                bounds,
                line: text.clone(),
            });
        }
    }
    ws
}

fn line_text(chunk: &Chunk, content: &Content, line: u32) -> String {
    let (ls, le) = content.line_span(line as usize);
    let start = (content.start + ls) as usize;
    let end = (content.start + le) as usize;
    String::from_utf8_lossy(&chunk.data()[start..end - 1]).into_owned()
}
