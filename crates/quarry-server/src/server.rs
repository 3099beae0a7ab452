//! Socket acceptor: one session per connection, queries admitted through the
//! server-owned concurrency gate.

use anyhow::{bail, Context, Result};
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, UnixListener};

use quarry::{Index, SearchOpts};

use crate::session::{CliPresenter, JsonPresenter, Presenter, QueryGate, Session};

/// Where to listen: a filesystem path (unix stream socket) or tcp://HOST:PORT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenSpec {
    Unix(PathBuf),
    Tcp(String),
}

pub fn parse_listen_spec(spec: &str) -> Result<ListenSpec> {
    if let Some(addr) = spec.strip_prefix("tcp://") {
        if !addr.contains(':') {
            bail!("tcp listen addresses must be HOST:PORT, got {:?}", addr);
        }
        return Ok(ListenSpec::Tcp(addr.to_string()));
    }
    if let Some(path) = spec.strip_prefix("unix://") {
        return Ok(ListenSpec::Unix(PathBuf::from(path)));
    }
    if let Some((proto, _)) = spec.split_once("://") {
        bail!("unknown listen protocol {:?}", proto);
    }
    Ok(ListenSpec::Unix(PathBuf::from(spec)))
}

/// Per-session settings shared by the acceptor.
#[derive(Clone)]
pub struct ServerConfig {
    pub concurrency: usize,
    pub json: bool,
    pub quiet: bool,
    pub opts: SearchOpts,
}

/// Accept connections forever, one blocking session task per client.
pub async fn serve(spec: ListenSpec, index: Arc<Index>, config: ServerConfig) -> Result<()> {
    let gate = QueryGate::new(tokio::runtime::Handle::current(), config.concurrency);
    match spec {
        ListenSpec::Unix(path) => {
            // A stale socket from a previous run would fail the bind.
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)
                .with_context(|| format!("binding unix socket {}", path.display()))?;
            tracing::info!(path = %path.display(), "listening");
            loop {
                let (stream, _) = listener.accept().await.context("accept")?;
                let stream = stream.into_std().context("converting accepted socket")?;
                stream.set_nonblocking(false)?;
                let reader = stream.try_clone().context("cloning socket")?;
                start_session(
                    BufReader::new(reader),
                    stream,
                    Arc::clone(&index),
                    gate.clone(),
                    config.clone(),
                );
            }
        }
        ListenSpec::Tcp(addr) => {
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding tcp {}", addr))?;
            tracing::info!(addr, "listening");
            loop {
                let (stream, peer) = listener.accept().await.context("accept")?;
                tracing::debug!(%peer, "client connected");
                let stream = stream.into_std().context("converting accepted socket")?;
                stream.set_nonblocking(false)?;
                let reader = stream.try_clone().context("cloning socket")?;
                start_session(
                    BufReader::new(reader),
                    stream,
                    Arc::clone(&index),
                    gate.clone(),
                    config.clone(),
                );
            }
        }
    }
}

fn start_session<R, W>(
    reader: R,
    writer: W,
    index: Arc<Index>,
    gate: QueryGate,
    config: ServerConfig,
) where
    R: std::io::BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let presenter: Box<dyn Presenter> = if config.json {
            Box::new(JsonPresenter::new(reader, writer))
        } else {
            Box::new(CliPresenter::new(reader, writer))
        };
        let mut session = Session::new(index, presenter, gate, config.opts, config.quiet);
        if let Err(e) = session.run() {
            tracing::debug!(error = %e, "session ended");
        }
    });
}
