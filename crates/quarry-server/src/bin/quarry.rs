use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::BufReader;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use quarry::{Index, IndexBuilder, SearchOpts};
use quarry_server::config::{parse_tree_spec, Args};
use quarry_server::server::{parse_listen_spec, serve, ServerConfig};
use quarry_server::session::{CliPresenter, JsonPresenter, Presenter, QueryGate, Session};
use quarry_server::walker;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.load_index.is_some() && !args.trees.is_empty() {
        bail!("--load_index is mutually exclusive with tree arguments");
    }
    if args.load_index.is_none() && args.trees.is_empty() {
        bail!("nothing to search: pass tree specs to ingest, or --load_index");
    }

    let index = if let Some(path) = &args.load_index {
        let started = Instant::now();
        let index = Index::load(path)
            .with_context(|| format!("loading index from {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index loaded"
        );
        if let Some(dump) = &args.dump_index {
            index
                .dump(dump)
                .with_context(|| format!("dumping index to {}", dump.display()))?;
            tracing::info!(path = %dump.display(), "index re-dumped");
        }
        index
    } else {
        let mut builder = IndexBuilder::new().name(args.name.clone());
        if let Some(dump) = &args.dump_index {
            builder = builder.dump_path(dump);
        }
        let started = Instant::now();
        for spec in &args.trees {
            let tree = parse_tree_spec(spec);
            tracing::info!(tree = tree.name, path = %tree.path.display(), revs = ?tree.revs, "walking");
            walker::ingest_tree(&mut builder, &tree)?;
        }
        let index = builder.finalize().context("finalizing index")?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "index finalized"
        );
        index
    };

    tracing::info!(
        trees = index.tree_count(),
        files = index.file_count(),
        contents = index.content_count(),
        chunks = index.chunk_count(),
        bytes = index.content_bytes(),
        "index ready"
    );

    let opts = SearchOpts {
        max_matches: args.max_matches,
        timeout: if args.timeout_ms == 0 {
            Duration::from_secs(24 * 60 * 60)
        } else {
            Duration::from_millis(args.timeout_ms)
        },
        context_lines: args.context,
    };
    let index = Arc::new(index);

    if let Some(listen) = &args.listen {
        let spec = parse_listen_spec(listen)?;
        let config = ServerConfig {
            concurrency: args.concurrency,
            json: args.json,
            quiet: args.quiet,
            opts,
        };
        serve(spec, index, config).await
    } else {
        let gate = QueryGate::new(tokio::runtime::Handle::current(), args.concurrency);
        let presenter: Box<dyn Presenter> = if args.json {
            Box::new(JsonPresenter::new(
                BufReader::new(std::io::stdin()),
                std::io::stdout(),
            ))
        } else {
            Box::new(CliPresenter::new(
                BufReader::new(std::io::stdin()),
                std::io::stdout(),
            ))
        };
        let mut session = Session::new(index, presenter, gate, opts, args.quiet);
        tokio::task::spawn_blocking(move || session.run())
            .await
            .context("session task")??;
        Ok(())
    }
}
