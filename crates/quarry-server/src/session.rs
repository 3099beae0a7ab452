//! Session loop and the presentation capability.
//!
//! A session reads queries, runs them through the match engine under the
//! server's concurrency gate, and prints results. The presentation layer is a
//! trait with a human CLI variant and a newline-delimited JSON variant; the
//! session never depends on which is active.

use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use quarry::{
    CancelToken, Index, IndexInfo, Query, SearchOpts, SearchResult, SearchStats,
};

/// One parsed request from a client.
#[derive(Debug)]
pub enum SessionRequest {
    Query(Query),
    Info,
}

/// Presentation capability: how prompts, queries, results, stats and errors
/// cross the wire.
pub trait Presenter: Send {
    fn print_prompt(&mut self, info: &IndexInfo) -> io::Result<()>;
    /// Read the next request. `Ok(None)` means the client is done.
    fn read_query(&mut self) -> io::Result<Option<SessionRequest>>;
    fn print_result(&mut self, result: &SearchResult) -> io::Result<()>;
    fn print_stats(&mut self, stats: &SearchStats, matched: usize) -> io::Result<()>;
    fn print_error(&mut self, message: &str) -> io::Result<()>;
    fn print_info(&mut self, info: &IndexInfo) -> io::Result<()>;
}

/// Bounded admission gate for queries, owned by the server (or by an
/// interactive main) and shared by its sessions.
#[derive(Clone)]
pub struct QueryGate {
    sem: Arc<Semaphore>,
    handle: tokio::runtime::Handle,
}

impl QueryGate {
    pub fn new(handle: tokio::runtime::Handle, permits: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(permits.max(1))),
            handle,
        }
    }

    fn acquire(&self) -> io::Result<OwnedSemaphorePermit> {
        self.handle
            .block_on(Arc::clone(&self.sem).acquire_owned())
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "query gate closed"))
    }
}

pub struct Session {
    index: Arc<Index>,
    presenter: Box<dyn Presenter>,
    gate: QueryGate,
    opts: SearchOpts,
    quiet: bool,
}

impl Session {
    pub fn new(
        index: Arc<Index>,
        presenter: Box<dyn Presenter>,
        gate: QueryGate,
        opts: SearchOpts,
        quiet: bool,
    ) -> Self {
        Self {
            index,
            presenter,
            gate,
            opts,
            quiet,
        }
    }

    /// Request/response loop until EOF. Query errors are reported in-band and
    /// the loop continues; transport errors end the session.
    pub fn run(&mut self) -> io::Result<()> {
        let info = self.index.info();
        loop {
            self.presenter.print_prompt(&info)?;
            let request = match self.presenter.read_query()? {
                Some(r) => r,
                None => return Ok(()),
            };
            match request {
                SessionRequest::Info => self.presenter.print_info(&info)?,
                SessionRequest::Query(query) => self.run_query(&query)?,
            }
        }
    }

    fn run_query(&mut self, query: &Query) -> io::Result<()> {
        let _permit = self.gate.acquire()?;
        let cancel = CancelToken::new();
        let searcher = self.index.searcher();
        match searcher.search(query, &self.opts, &cancel) {
            Ok(out) => {
                if !self.quiet {
                    for result in &out.results {
                        if let Err(e) = self.presenter.print_result(result) {
                            // The client went away mid-stream; anything the
                            // engine still had in flight is moot.
                            cancel.cancel();
                            return Err(e);
                        }
                    }
                }
                self.presenter.print_stats(&out.stats, out.results.len())
            }
            Err(err) => {
                tracing::debug!(error = %err, "query failed");
                self.presenter.print_error(&err.to_string())
            }
        }
    }
}

/// Parse the human CLI query syntax: whitespace-separated tokens, `key:value`
/// filters, the rest joined into the line regex.
///
/// Keys: `file:`, `repo:`, `tags:`, negated as `-file:`, `-repo:`, `-tags:`,
/// and `case:no` to fold case. The bare word `info` requests index info.
pub fn parse_cli_query(input: &str) -> Option<SessionRequest> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if input == "info" {
        return Some(SessionRequest::Info);
    }
    let mut query = Query::default();
    let mut pattern: Vec<&str> = Vec::new();
    for tok in input.split_whitespace() {
        match tok.split_once(':') {
            Some(("file", v)) => query.file = v.to_string(),
            Some(("repo", v)) => query.repo = v.to_string(),
            Some(("tags", v)) => query.tags = v.to_string(),
            Some(("-file", v)) => query.not_file = v.to_string(),
            Some(("-repo", v)) => query.not_repo = v.to_string(),
            Some(("-tags", v)) => query.not_tags = v.to_string(),
            Some(("case", v)) => query.fold_case = matches!(v, "no" | "false" | "insensitive"),
            _ => pattern.push(tok),
        }
    }
    query.line = pattern.join(" ");
    Some(SessionRequest::Query(query))
}

/// Human-oriented presenter: `grep -n`-style lines on a prompt loop.
pub struct CliPresenter<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> CliPresenter<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }
}

impl<R: BufRead + Send, W: Write + Send> Presenter for CliPresenter<R, W> {
    fn print_prompt(&mut self, info: &IndexInfo) -> io::Result<()> {
        if info.name.is_empty() {
            write!(self.out, "search> ")?;
        } else {
            write!(self.out, "{}> ", info.name)?;
        }
        self.out.flush()
    }

    fn read_query(&mut self) -> io::Result<Option<SessionRequest>> {
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if let Some(req) = parse_cli_query(&line) {
                return Ok(Some(req));
            }
            // Blank input: prompt again.
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
    }

    fn print_result(&mut self, r: &SearchResult) -> io::Result<()> {
        let first = r.line_number as usize - r.context_before.len();
        for (i, line) in r.context_before.iter().enumerate() {
            writeln!(self.out, "{}:{}-{}", r.path, first + i, line)?;
        }
        writeln!(
            self.out,
            "{}@{}:{}:{}: {}",
            r.tree, r.version, r.path, r.line_number, r.line
        )?;
        for (i, line) in r.context_after.iter().enumerate() {
            writeln!(
                self.out,
                "{}:{}-{}",
                r.path,
                r.line_number as usize + 1 + i,
                line
            )?;
        }
        Ok(())
    }

    fn print_stats(&mut self, stats: &SearchStats, matched: usize) -> io::Result<()> {
        writeln!(
            self.out,
            "{} matches (re2 {}us, index {}us, analyze {}us, git {}us, sort {}us, exit {:?})",
            matched,
            stats.re2_time,
            stats.index_time,
            stats.analyze_time,
            stats.git_time,
            stats.sort_time,
            stats.exit_reason
        )?;
        self.out.flush()
    }

    fn print_error(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "Error: {}", message)?;
        self.out.flush()
    }

    fn print_info(&mut self, info: &IndexInfo) -> io::Result<()> {
        writeln!(self.out, "index: {}", info.name)?;
        for t in &info.trees {
            writeln!(self.out, "  {}@{}", t.name, t.version)?;
        }
        self.out.flush()
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WireRequest {
    Query { body: Query },
    Info,
}

/// Newline-delimited JSON presenter, one message per line.
pub struct JsonPresenter<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> JsonPresenter<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }

    fn emit(&mut self, value: serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &value)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

impl<R: BufRead + Send, W: Write + Send> Presenter for JsonPresenter<R, W> {
    fn print_prompt(&mut self, _info: &IndexInfo) -> io::Result<()> {
        Ok(())
    }

    fn read_query(&mut self) -> io::Result<Option<SessionRequest>> {
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WireRequest>(&line) {
                Ok(WireRequest::Query { body }) => return Ok(Some(SessionRequest::Query(body))),
                Ok(WireRequest::Info) => return Ok(Some(SessionRequest::Info)),
                Err(e) => self.emit(serde_json::json!({
                    "op": "error",
                    "error": format!("bad request: {}", e),
                }))?,
            }
        }
    }

    fn print_result(&mut self, result: &SearchResult) -> io::Result<()> {
        self.emit(serde_json::json!({ "op": "match", "result": result }))
    }

    fn print_stats(&mut self, stats: &SearchStats, matched: usize) -> io::Result<()> {
        self.emit(serde_json::json!({ "op": "done", "stats": stats, "matches": matched }))
    }

    fn print_error(&mut self, message: &str) -> io::Result<()> {
        self.emit(serde_json::json!({ "op": "error", "error": message }))
    }

    fn print_info(&mut self, info: &IndexInfo) -> io::Result<()> {
        self.emit(serde_json::json!({ "op": "info", "info": info }))
    }
}
