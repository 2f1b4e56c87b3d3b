//! Folder scanning and the source-name to reader lookup table.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::reader::{ReaderCatalog, SourceReader};

/// Binds source filenames to live readers. Readers are created on first
/// listing and retained; re-listing a folder picks up new files without
/// disturbing cached readers.
pub struct SourceRegistry {
    root: PathBuf,
    catalog: ReaderCatalog,
    readers: RwLock<HashMap<String, Arc<dyn SourceReader>>>,
}

impl SourceRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            catalog: ReaderCatalog::new(),
            readers: RwLock::new(HashMap::new()),
        }
    }

    /// True when `folder` exists under the registry root.
    pub fn folder_exists(&self, folder: &str) -> bool {
        self.root.join(folder).is_dir()
    }

    /// Scan `folder` for files of recognized types, creating and caching a
    /// reader per filename when not already cached. Files whose reader
    /// cannot be built are skipped with a warning. Returns the recognized
    /// filenames, sorted for stable listings.
    pub fn list_sources(&self, folder: &str) -> Result<Vec<String>> {
        let dir = self.root.join(folder);
        let entries = std::fs::read_dir(&dir).map_err(|_| Error::not_found("folder", folder))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, folder = %dir.display(), "Skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            if self.catalog.marker_for(&filename).is_none() {
                continue;
            }
            if !self.is_cached(&filename) {
                match self.catalog.open(&filename, &path) {
                    Some(Ok(reader)) => {
                        tracing::info!(file = %path.display(), "Registered source");
                        self.cache(filename.clone(), reader);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, file = %path.display(), "Skipping unreadable source");
                        continue;
                    }
                    None => continue,
                }
            }
            names.push(filename);
        }

        names.sort();
        tracing::debug!(folder, count = names.len(), "Listed sources");
        Ok(names)
    }

    /// Look up the reader cached for `source`.
    pub fn resolve(&self, source: &str) -> Result<Arc<dyn SourceReader>> {
        self.readers
            .read()
            .ok()
            .and_then(|map| map.get(source).cloned())
            .ok_or_else(|| Error::not_found("source", source))
    }

    fn is_cached(&self, name: &str) -> bool {
        self.readers
            .read()
            .map(|map| map.contains_key(name))
            .unwrap_or(false)
    }

    fn cache(&self, name: String, reader: Arc<dyn SourceReader>) {
        if let Ok(mut map) = self.readers.write() {
            map.insert(name, reader);
        }
    }
}
