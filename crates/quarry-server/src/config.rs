use clap::Parser;
use std::path::{Path, PathBuf};

/// Command-line surface of the `quarry` binary.
#[derive(Parser, Debug)]
#[command(name = "quarry", about = "Regex code search over repository snapshots")]
pub struct Args {
    /// Load a prebuilt index instead of walking repositories.
    #[arg(long = "load_index")]
    pub load_index: Option<PathBuf>,

    /// Dump the produced index to the given path.
    #[arg(long = "dump_index")]
    pub dump_index: Option<PathBuf>,

    /// Listen on a socket: a filesystem path or tcp://HOST:PORT.
    #[arg(long)]
    pub listen: Option<String>,

    /// Number of concurrent queries to allow.
    #[arg(long, default_value_t = 16)]
    pub concurrency: usize,

    /// Use JSON framing instead of the human CLI protocol.
    #[arg(long)]
    pub json: bool,

    /// Do the search, but don't print results.
    #[arg(long)]
    pub quiet: bool,

    /// The name of this index.
    #[arg(long, default_value = "")]
    pub name: String,

    /// Per-query wall-clock budget in milliseconds. 0 disables the deadline.
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// Maximum results returned per query.
    #[arg(long, default_value_t = 50)]
    pub max_matches: usize,

    /// Lines of context around each match.
    #[arg(long, default_value_t = 3)]
    pub context: usize,

    /// Trees to ingest: [name@]path[:rev1,rev2,...]
    pub trees: Vec<String>,
}

/// One positional tree argument, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSpec {
    pub name: String,
    pub path: PathBuf,
    pub revs: Vec<String>,
}

/// Parse `[name@]path[:rev1,rev2,...]`. Revisions default to HEAD; the name
/// defaults to the path's basename.
pub fn parse_tree_spec(spec: &str) -> TreeSpec {
    let (name, rest) = match spec.split_once('@') {
        Some((n, r)) => (Some(n.to_string()), r),
        None => (None, spec),
    };
    let (path, revs) = match rest.split_once(':') {
        Some((p, revs)) => (
            p,
            revs.split(',')
                .filter(|r| !r.is_empty())
                .map(String::from)
                .collect::<Vec<_>>(),
        ),
        None => (rest, Vec::new()),
    };
    let revs = if revs.is_empty() {
        vec!["HEAD".to_string()]
    } else {
        revs
    };
    let name = name.unwrap_or_else(|| {
        Path::new(path)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string())
    });
    TreeSpec {
        name,
        path: PathBuf::from(path),
        revs,
    }
}
