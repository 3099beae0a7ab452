//! Blob enumeration for ingest: walk git revisions via libgit2, or a plain
//! working tree via the ignore-aware directory walker.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quarry::{IndexBuilder, TreeId};

use crate::config::TreeSpec;

/// Blobs larger than this are not indexed.
const MAX_FILE_BYTES: usize = 1_000_000;

/// Ingest every revision of one tree spec into the builder.
pub fn ingest_tree(builder: &mut IndexBuilder, spec: &TreeSpec) -> Result<()> {
    for rev in &spec.revs {
        let mut metadata = BTreeMap::new();
        metadata.insert("path".to_string(), spec.path.display().to_string());
        let tree = builder.add_tree(&spec.name, rev, metadata)?;
        match git2::Repository::open(&spec.path) {
            Ok(repo) => walk_git(builder, tree, &repo, rev)
                .with_context(|| format!("walking {}:{}", spec.path.display(), rev))?,
            Err(_) => {
                if rev != "HEAD" {
                    bail!(
                        "{} is not a git repository; cannot walk revision {}",
                        spec.path.display(),
                        rev
                    );
                }
                walk_dir(builder, tree, &spec.path)
                    .with_context(|| format!("walking directory {}", spec.path.display()))?;
            }
        }
    }
    Ok(())
}

fn walk_git(
    builder: &mut IndexBuilder,
    tree_id: TreeId,
    repo: &git2::Repository,
    rev: &str,
) -> Result<()> {
    let obj = repo
        .revparse_single(rev)
        .with_context(|| format!("resolving revision {}", rev))?;
    let git_tree = obj
        .peel_to_tree()
        .with_context(|| format!("peeling {} to a tree", rev))?;

    let mut walk_err: Option<anyhow::Error> = None;
    let mut indexed = 0usize;
    let mut skipped = 0usize;
    git_tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
        if entry.kind() != Some(git2::ObjectType::Blob) {
            return git2::TreeWalkResult::Ok;
        }
        let name = match entry.name() {
            Some(n) => n,
            None => return git2::TreeWalkResult::Ok,
        };
        let path = format!("{}{}", dir, name);
        let blob = match entry.to_object(repo).and_then(|o| o.peel_to_blob()) {
            Ok(b) => b,
            Err(e) => {
                walk_err = Some(anyhow::Error::new(e).context(format!("reading blob {}", path)));
                return git2::TreeWalkResult::Abort;
            }
        };
        if blob.size() > MAX_FILE_BYTES {
            tracing::debug!(path, size = blob.size(), "skipping oversized blob");
            skipped += 1;
            return git2::TreeWalkResult::Ok;
        }
        match builder.add_file(tree_id, path.as_str(), blob.content()) {
            Ok(Some(_)) => indexed += 1,
            Ok(None) => {
                tracing::warn!(path, "skipping file with an over-long line");
                skipped += 1;
            }
            Err(e) => {
                walk_err = Some(anyhow::Error::new(e).context(format!("indexing {}", path)));
                return git2::TreeWalkResult::Abort;
            }
        }
        git2::TreeWalkResult::Ok
    })?;
    if let Some(e) = walk_err {
        return Err(e);
    }
    tracing::info!(rev, indexed, skipped, "walked revision");
    Ok(())
}

fn walk_dir(builder: &mut IndexBuilder, tree_id: TreeId, root: &Path) -> Result<()> {
    let mut indexed = 0usize;
    let mut skipped = 0usize;
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .follow_links(false)
        .git_ignore(true)
        .build();
    for entry in walker
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
    {
        let rel = pathdiff::diff_paths(entry.path(), root)
            .unwrap_or_else(|| PathBuf::from(entry.file_name()));
        let path = rel.to_string_lossy().into_owned();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > MAX_FILE_BYTES as u64 {
            tracing::debug!(path, size, "skipping oversized file");
            skipped += 1;
            continue;
        }
        let bytes = match std::fs::read(entry.path()) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path, error = %e, "skipping unreadable file");
                skipped += 1;
                continue;
            }
        };
        match builder.add_file(tree_id, path.as_str(), &bytes)? {
            Some(_) => indexed += 1,
            None => {
                tracing::warn!(path, "skipping file with an over-long line");
                skipped += 1;
            }
        }
    }
    tracing::info!(root = %root.display(), indexed, skipped, "walked working tree");
    Ok(())
}
