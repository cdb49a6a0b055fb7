//! Directory enumeration.
//!
//! Lists the direct children of a directory as [`Entry`] snapshots. A child
//! whose metadata cannot be read is skipped (and logged); only a failure to
//! open the directory itself is reported to the caller.

use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::collaborators::{EntryClassifier, ExtensionClassifier};
use crate::entry::Entry;
use crate::error::ListError;

/// Non-recursive directory lister.
#[derive(Clone)]
pub struct DirectoryLister {
    /// Resolves archive/package/certificate flags.
    classifier: Arc<dyn EntryClassifier>,
    /// Whether entries starting with '.' are listed.
    include_hidden: bool,
}

impl DirectoryLister {
    /// Create a lister that classifies entries with `classifier`.
    pub fn new(classifier: Arc<dyn EntryClassifier>) -> Self {
        Self {
            classifier,
            include_hidden: true,
        }
    }

    /// Set whether hidden entries are listed (default: true).
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }

    /// List the direct children of `directory`.
    ///
    /// The result is unsorted; ordering is the sort engine's job.
    pub fn list(&self, directory: &Path) -> Result<Vec<Entry>, ListError> {
        let metadata = fs::metadata(directory).map_err(|e| ListError::from_io(directory, e))?;
        if !metadata.is_dir() {
            return Err(ListError::NotADirectory(directory.to_path_buf()));
        }

        let children = fs::read_dir(directory).map_err(|e| ListError::from_io(directory, e))?;

        let mut entries = Vec::new();
        for child in children {
            let child = match child {
                Ok(c) => c,
                Err(e) => {
                    debug!(
                        directory = ?directory,
                        error = %e,
                        "Skipping unreadable directory entry"
                    );
                    continue;
                }
            };

            let name = child.file_name().to_string_lossy().into_owned();
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }

            match self.read_entry(child.path(), name) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    debug!(
                        path = ?child.path(),
                        error = %e,
                        "Skipping entry with unreadable metadata"
                    );
                }
            }
        }

        debug!(directory = ?directory, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Build the entry for a single path.
    pub fn entry_for(&self, path: &Path) -> Result<Entry, ListError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ListError::NotFound(path.to_path_buf()))?;

        self.read_entry(path.to_path_buf(), name)
            .map_err(|e| ListError::from_io(path, e))
    }

    fn read_entry(&self, path: PathBuf, name: String) -> io::Result<Entry> {
        let metadata = read_metadata(&path)?;

        let is_directory = metadata.is_dir();
        let size = if metadata.is_file() { metadata.len() } else { 0 };
        let flags = self.classifier.classify(&path, is_directory);

        Ok(Entry {
            name,
            path,
            size,
            created_at: metadata.created().ok(),
            is_directory,
            flags,
        })
    }
}

impl Default for DirectoryLister {
    fn default() -> Self {
        Self::new(Arc::new(ExtensionClassifier::default()))
    }
}

/// Metadata following symlinks, falling back to the link itself when its
/// target is gone.
fn read_metadata(path: &Path) -> io::Result<Metadata> {
    match fs::metadata(path) {
        Ok(m) => Ok(m),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::symlink_metadata(path),
        Err(e) => Err(e),
    }
}
