//! File registry and include resolution.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::PrepError;

/// Backing storage for a registered file.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Read from disk each time the file is expanded.
    Path(PathBuf),
    /// Fixed in-memory contents; used by tests and embedded snippets.
    Memory(Arc<str>),
}

/// Handle to an entry in the [`FileRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId(usize);

#[derive(Debug)]
struct FileEntry {
    name: Arc<str>,
    source: FileSource,
    imported: bool,
}

/// Maps logical file names to line-producing sources and resolves
/// include/import paths.
///
/// Resolution order is fixed: exact registered name first, then relative
/// to the including file's directory, then the search roots in
/// registration order. Filesystem hits are interned so the one-shot
/// import flag has a stable home per physical file.
#[derive(Debug, Default)]
pub struct FileRegistry {
    entries: Vec<FileEntry>,
    index: HashMap<String, usize>,
    search_roots: Vec<PathBuf>,
    allow_override: bool,
}

impl FileRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `register_*` to replace an existing entry instead of failing
    /// with [`PrepError::DuplicateRegistration`].
    pub fn set_allow_override(&mut self, allow: bool) {
        self.allow_override = allow;
    }

    /// Append a directory to the search roots. Order of registration is
    /// the order of resolution.
    pub fn add_search_root(&mut self, dir: impl Into<PathBuf>) {
        self.search_roots.push(dir.into());
    }

    /// Register a disk-backed file under a logical name.
    pub fn register_path(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<FileId, PrepError> {
        self.register(name.into(), FileSource::Path(path.into()))
    }

    /// Register in-memory contents under a logical name.
    pub fn register_memory(
        &mut self,
        name: impl Into<String>,
        contents: impl Into<Arc<str>>,
    ) -> Result<FileId, PrepError> {
        self.register(name.into(), FileSource::Memory(contents.into()))
    }

    fn register(&mut self, name: String, source: FileSource) -> Result<FileId, PrepError> {
        if let Some(&existing) = self.index.get(&name) {
            if !self.allow_override {
                return Err(PrepError::DuplicateRegistration { name });
            }
            self.entries[existing].source = source;
            return Ok(FileId(existing));
        }
        Ok(self.insert(name, source))
    }

    fn insert(&mut self, name: String, source: FileSource) -> FileId {
        let id = self.entries.len();
        self.entries.push(FileEntry {
            name: Arc::from(name.as_str()),
            source,
            imported: false,
        });
        self.index.insert(name, id);
        FileId(id)
    }

    /// Resolve a name as seen at an include site.
    ///
    /// `origin_dir` is the directory of the including file, when it has
    /// one; relative lookups try it before the search roots.
    pub fn resolve(&mut self, name: &str, origin_dir: Option<&Path>) -> Result<FileId, PrepError> {
        if let Some(&id) = self.index.get(name) {
            return Ok(FileId(id));
        }

        let mut candidates = Vec::new();
        if let Some(dir) = origin_dir {
            candidates.push(dir.join(name));
        }
        for root in &self.search_roots {
            candidates.push(root.join(name));
        }

        for candidate in candidates {
            if candidate.is_file() {
                // Canonicalize so the same physical file resolved through
                // different spellings shares one import flag.
                let path = candidate.canonicalize().unwrap_or(candidate);
                let key = path.display().to_string();
                if let Some(&id) = self.index.get(&key) {
                    return Ok(FileId(id));
                }
                return Ok(self.insert(key, FileSource::Path(path)));
            }
        }

        Err(PrepError::FileNotFound {
            name: name.to_owned(),
        })
    }

    /// Logical name of an entry.
    #[must_use]
    pub fn name(&self, id: FileId) -> &Arc<str> {
        &self.entries[id.0].name
    }

    /// Directory relative includes inside this entry resolve against.
    #[must_use]
    pub fn origin_dir(&self, id: FileId) -> Option<PathBuf> {
        match &self.entries[id.0].source {
            FileSource::Path(path) => path.parent().map(Path::to_path_buf),
            FileSource::Memory(_) => None,
        }
    }

    /// Directory of the entry registered under `name`, if any.
    #[must_use]
    pub fn origin_dir_of(&self, name: &str) -> Option<PathBuf> {
        self.index
            .get(name)
            .and_then(|&id| self.origin_dir(FileId(id)))
    }

    /// Read the entry's contents.
    pub fn read(&self, id: FileId) -> io::Result<String> {
        match &self.entries[id.0].source {
            FileSource::Path(path) => std::fs::read_to_string(path),
            FileSource::Memory(contents) => Ok(contents.to_string()),
        }
    }

    /// Flip the one-shot import flag. Monotonic within a run.
    pub fn mark_imported(&mut self, id: FileId) {
        self.entries[id.0].imported = true;
    }

    /// Whether the entry has been imported this run.
    #[must_use]
    pub fn was_imported(&self, id: FileId) -> bool {
        self.entries[id.0].imported
    }

    /// Clear all import flags. Called at the start of every expansion run.
    pub fn reset_imports(&mut self) {
        for entry in &mut self.entries {
            entry.imported = false;
        }
    }
}
