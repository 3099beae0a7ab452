//! Index construction and the sealed, queryable index.

use fnv::FnvHashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::corpus::chunk::Chunk;
use crate::corpus::store::{Content, FileEntry, StoreBuilder, DEFAULT_CHUNK_BYTES};
use crate::error::{Error, Result};
use crate::types::{IndexInfo, TreeMeta};

pub type TreeId = u32;
pub type FileId = u32;

/// Accumulates trees and file contents, then seals them into an [`Index`].
///
/// All mutation happens here; after [`IndexBuilder::finalize`] the builder is
/// spent and further `add_*` calls fail with [`Error::SealedIndex`].
pub struct IndexBuilder {
    name: String,
    dump_path: Option<PathBuf>,
    trees: Vec<TreeMeta>,
    tree_keys: FnvHashMap<(String, String), TreeId>,
    files: Vec<FileEntry>,
    content_files: Vec<Vec<FileId>>,
    store: StoreBuilder,
    sealed: bool,
}

impl Default for IndexBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBuilder {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            dump_path: None,
            trees: Vec::new(),
            tree_keys: FnvHashMap::default(),
            files: Vec::new(),
            content_files: Vec::new(),
            store: StoreBuilder::new(DEFAULT_CHUNK_BYTES),
            sealed: false,
        }
    }

    /// Name reported by `Info` requests.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Cap on each chunk arena. Small values force multi-chunk indexes and
    /// are mainly useful in tests.
    pub fn chunk_bytes(mut self, bytes: usize) -> Self {
        self.store = StoreBuilder::new(bytes);
        self
    }

    /// Write the sealed index to this path during finalize.
    pub fn dump_path(mut self, path: impl AsRef<Path>) -> Self {
        self.dump_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Register one revision of one repository.
    pub fn add_tree(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<TreeId> {
        if self.sealed {
            return Err(Error::SealedIndex);
        }
        let name = name.into();
        let version = version.into();
        let key = (name.clone(), version.clone());
        if self.tree_keys.contains_key(&key) {
            return Err(Error::DuplicateTree(name, version));
        }
        let id = self.trees.len() as TreeId;
        self.tree_keys.insert(key, id);
        self.trees.push(TreeMeta {
            name,
            version,
            metadata,
        });
        Ok(id)
    }

    /// Add one file. Identical byte contents across files share storage.
    ///
    /// Returns `Ok(None)` when the file is skipped under the long-line policy.
    pub fn add_file(
        &mut self,
        tree: TreeId,
        path: impl Into<String>,
        bytes: &[u8],
    ) -> Result<Option<FileId>> {
        if self.sealed {
            return Err(Error::SealedIndex);
        }
        assert!(
            (tree as usize) < self.trees.len(),
            "add_file with unknown tree id {}",
            tree
        );
        let content = match self.store.add_content(bytes)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let id = self.files.len() as FileId;
        self.files.push(FileEntry {
            tree,
            path: path.into(),
            content,
        });
        if self.content_files.len() <= content as usize {
            self.content_files.resize(content as usize + 1, Vec::new());
        }
        self.content_files[content as usize].push(id);
        Ok(Some(id))
    }

    /// Seal the index: sort all suffix arrays, freeze the arenas, and write
    /// the on-disk image when a dump path was configured.
    pub fn finalize(&mut self) -> Result<Index> {
        if self.sealed {
            return Err(Error::SealedIndex);
        }
        self.sealed = true;
        let store = std::mem::replace(&mut self.store, StoreBuilder::new(1));
        let (chunks, contents) = store.seal()?;
        let mut content_files = std::mem::take(&mut self.content_files);
        content_files.resize(contents.len(), Vec::new());
        let index = Index {
            name: std::mem::take(&mut self.name),
            trees: std::mem::take(&mut self.trees),
            files: std::mem::take(&mut self.files),
            contents,
            content_files,
            chunks,
        };
        if let Some(path) = self.dump_path.take() {
            index.dump(&path)?;
        }
        Ok(index)
    }
}

/// The sealed corpus: trees, files, deduplicated contents, and per-chunk
/// suffix arrays. Strictly read-only; shared across query threads without
/// locking.
pub struct Index {
    pub(crate) name: String,
    pub(crate) trees: Vec<TreeMeta>,
    pub(crate) files: Vec<FileEntry>,
    pub(crate) contents: Vec<Content>,
    /// ContentId -> ids of the files sharing that content, in ingest order.
    pub(crate) content_files: Vec<Vec<FileId>>,
    pub(crate) chunks: Vec<Chunk>,
}

impl Index {
    /// Load a dumped index, memory-mapping its arenas.
    pub fn load(path: impl AsRef<Path>) -> Result<Index> {
        crate::shard::read_index(path.as_ref())
    }

    /// Write the index to `path` in the on-disk format.
    pub fn dump(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::shard::write_index(self, path.as_ref())
    }

    pub fn searcher(&self) -> crate::search::Searcher<'_> {
        crate::search::Searcher::new(self)
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            name: self.name.clone(),
            trees: self.trees.clone(),
            has_tags: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total stored content bytes across all chunk arenas, sentinels included.
    pub fn content_bytes(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes.len() as u64).sum()
    }
}
