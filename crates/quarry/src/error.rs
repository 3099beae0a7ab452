use std::error::Error as StdError;
use std::fmt::{self, Display};

/// Typed errors for index construction, persistence and queries.
///
/// Per-query failures (`QuerySyntax`, `QueryTooComplex`) are recoverable: the
/// caller reports them and keeps its session. Everything else is fatal to the
/// operation that produced it.
#[derive(Debug)]
pub enum Error {
    /// The query regex failed to compile.
    QuerySyntax(String),
    /// The query regex exceeded the planner's program-size or width bounds.
    QueryTooComplex(String),
    /// Mutation attempted after `finalize`.
    SealedIndex,
    /// A `(name, version)` tree pair was ingested twice.
    DuplicateTree(String, String),
    /// Suffix-array construction or arena allocation failed during ingest.
    IndexBuildFailed(String),
    /// On-disk index magic/version/layout mismatch on load.
    IncompatibleIndex(String),
    /// Socket, file, or memory-map failure.
    Io(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QuerySyntax(s) => write!(f, "query syntax: {}", s),
            Error::QueryTooComplex(s) => write!(f, "query too complex: {}", s),
            Error::SealedIndex => write!(f, "index is sealed; mutation is not allowed"),
            Error::DuplicateTree(name, version) => {
                write!(f, "duplicate tree {}@{}", name, version)
            }
            Error::IndexBuildFailed(s) => write!(f, "index build failed: {}", s),
            Error::IncompatibleIndex(s) => write!(f, "incompatible index: {}", s),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        match e {
            regex::Error::CompiledTooBig(limit) => {
                Error::QueryTooComplex(format!("compiled program exceeds {} bytes", limit))
            }
            other => Error::QuerySyntax(other.to_string()),
        }
    }
}

impl Error {
    /// True for errors a session reports in-band and survives.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Error::QuerySyntax(_) | Error::QueryTooComplex(_))
    }
}
