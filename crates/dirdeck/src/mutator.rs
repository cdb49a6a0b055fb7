//! Filesystem mutations: bulk delete/import and single-item operations.
//!
//! Everything here is blocking and runs on tokio's blocking pool, driven by
//! [`crate::state::DirectoryHandle`]. Bulk operations never stop early: each
//! item is attempted on its own, failures are collected into a
//! [`BatchReport`], and the caller turns that into one aggregated message.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::entry::Entry;
use crate::error::{MutationError, MutationFailure, OperationError};
use crate::naming;

/// Which bulk operation a report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Delete,
    Import,
}

impl BatchKind {
    fn verb(&self) -> &'static str {
        match self {
            BatchKind::Delete => "delete",
            BatchKind::Import => "import",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// Outcome of a bulk operation.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Which operation ran.
    pub kind: BatchKind,
    /// Number of items attempted.
    pub attempted: usize,
    /// Paths that succeeded: removed paths for deletes, created
    /// destinations for imports.
    pub succeeded: Vec<PathBuf>,
    /// Per-item failures, in the order they happened.
    pub failures: Vec<MutationError>,
}

impl BatchReport {
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            attempted: 0,
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Names of the items that failed.
    pub fn failed_names(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.item_name.as_str()).collect()
    }

    /// One aggregated, human-readable line, or `None` when nothing failed.
    pub fn summary(&self) -> Option<String> {
        match self.failures.len() {
            0 => None,
            1 => Some(format!("failed to {} 1 item", self.kind)),
            n => Some(format!("failed to {} {} items", self.kind, n)),
        }
    }
}

/// Remove a single entry from disk.
///
/// The on-disk type is checked at removal time rather than trusting the
/// snapshot, so a symlink to a directory only loses the link.
pub fn remove_entry(entry: &Entry) -> Result<(), MutationError> {
    let fail = |e: io::Error| MutationError::new(entry.name.clone(), &entry.path, e);

    let metadata = fs::symlink_metadata(&entry.path).map_err(fail)?;
    if metadata.is_dir() {
        fs::remove_dir_all(&entry.path).map_err(fail)
    } else {
        fs::remove_file(&entry.path).map_err(fail)
    }
}

/// Delete every item, calling `on_removed` right after each success.
pub fn delete_batch(items: &[Entry], mut on_removed: impl FnMut(&Entry)) -> BatchReport {
    let mut report = BatchReport::new(BatchKind::Delete);

    for item in items {
        report.attempted += 1;
        match remove_entry(item) {
            Ok(()) => {
                debug!(path = ?item.path, "Deleted item");
                on_removed(item);
                report.succeeded.push(item.path.clone());
            }
            Err(e) => {
                warn!(item = %item.name, error = %e.reason, "Failed to delete item");
                report.failures.push(e);
            }
        }
    }

    info!(
        attempted = report.attempted,
        failed = report.failure_count(),
        "Delete batch finished"
    );
    report
}

/// Copy `source` into `destination_dir` under a collision-free name.
///
/// The source is never moved or modified. Returns the created path.
pub fn import_source(source: &Path, destination_dir: &Path) -> Result<PathBuf, MutationError> {
    let Some(item_name) = source.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Err(MutationError::new(
            source.display().to_string(),
            source,
            MutationFailure::NoFileName,
        ));
    };

    if !source.exists() {
        return Err(MutationError::new(item_name, source, MutationFailure::SourceMissing));
    }

    let destination = naming::resolve(&destination_dir.join(&item_name));
    if source.is_dir() && destination.starts_with(source) {
        return Err(MutationError::new(
            item_name,
            source,
            MutationFailure::DestinationInsideSource,
        ));
    }

    let preexisting = fs::symlink_metadata(&destination).is_ok();
    if let Err(e) = copy_recursive(source, &destination) {
        // Don't leave half a copy behind, but never touch what was already there.
        if !preexisting {
            let cleanup = if destination.is_dir() {
                fs::remove_dir_all(&destination)
            } else {
                fs::remove_file(&destination)
            };
            match cleanup {
                Ok(()) => {}
                Err(c) if c.kind() == io::ErrorKind::NotFound => {}
                Err(c) => {
                    warn!(
                        item = %item_name,
                        destination = ?destination,
                        error = %c,
                        "Failed to remove partial copy"
                    );
                }
            }
        }
        return Err(MutationError::new(item_name, source, e));
    }

    Ok(destination)
}

fn copy_recursive(source: &Path, destination: &Path) -> io::Result<()> {
    if source.is_dir() {
        fs::create_dir(destination)?;
        for child in fs::read_dir(source)? {
            let child = child?;
            copy_recursive(&child.path(), &destination.join(child.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(source, destination).map(|_| ())
    }
}

/// Import every source into `destination_dir`.
pub fn import_batch(sources: &[PathBuf], destination_dir: &Path) -> BatchReport {
    let mut report = BatchReport::new(BatchKind::Import);

    for source in sources {
        report.attempted += 1;
        match import_source(source, destination_dir) {
            Ok(destination) => {
                debug!(source = ?source, destination = ?destination, "Imported item");
                report.succeeded.push(destination);
            }
            Err(e) => {
                warn!(item = %e.item_name, error = %e.reason, "Failed to import item");
                report.failures.push(e);
            }
        }
    }

    info!(
        attempted = report.attempted,
        failed = report.failure_count(),
        "Import batch finished"
    );
    report
}

/// Trim and sanitize a user-supplied name; `None` if nothing usable is left.
fn usable_name(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }
    let sanitized = naming::sanitize_name(name);
    (!sanitized.is_empty()).then_some(sanitized)
}

/// Create a folder named `name` inside `directory`.
///
/// Returns `Ok(None)` without touching the disk for blank names.
pub fn create_folder(directory: &Path, name: &str) -> Result<Option<PathBuf>, OperationError> {
    let Some(name) = usable_name(name) else {
        return Ok(None);
    };

    let path = directory.join(&name);
    fs::create_dir_all(&path).map_err(|source| OperationError::CreateFolder { name, source })?;

    info!(path = ?path, "Created folder");
    Ok(Some(path))
}

/// Create an empty text file named `name` inside `directory`, picking a
/// collision-free name.
///
/// Returns `Ok(None)` without touching the disk for blank names.
pub fn create_text_file(directory: &Path, name: &str) -> Result<Option<PathBuf>, OperationError> {
    let Some(name) = usable_name(name) else {
        return Ok(None);
    };

    let path = naming::resolve(&directory.join(&name));
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| OperationError::CreateFile { name, source })?;

    info!(path = ?path, "Created file");
    Ok(Some(path))
}

/// Rename `entry` within its directory.
///
/// No collision avoidance: an existing destination is an error.
/// Returns `Ok(None)` for blank names.
pub fn rename_entry(entry: &Entry, new_name: &str) -> Result<Option<PathBuf>, OperationError> {
    let Some(name) = usable_name(new_name) else {
        return Ok(None);
    };

    let destination = match entry.path.parent() {
        Some(parent) => parent.join(&name),
        None => PathBuf::from(&name),
    };
    if destination == entry.path {
        return Ok(Some(destination));
    }

    let fail = |source: io::Error| OperationError::Rename {
        from: entry.name.clone(),
        to: name.clone(),
        source,
    };

    // fs::rename replaces existing files on Unix.
    if fs::symlink_metadata(&destination).is_ok() {
        return Err(fail(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "an item with that name already exists",
        )));
    }
    fs::rename(&entry.path, &destination).map_err(fail)?;

    info!(from = ?entry.path, to = ?destination, "Renamed item");
    Ok(Some(destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lister::DirectoryLister;
    use tempfile::TempDir;

    fn entry(path: &Path) -> Entry {
        DirectoryLister::default().entry_for(path).unwrap()
    }

    #[test]
    fn test_summary() {
        let mut report = BatchReport::new(BatchKind::Delete);
        assert_eq!(report.summary(), None);

        report.failures.push(MutationError::new(
            "a",
            Path::new("/a"),
            MutationFailure::SourceMissing,
        ));
        assert_eq!(report.summary().as_deref(), Some("failed to delete 1 item"));

        report.kind = BatchKind::Import;
        report.failures.push(MutationError::new(
            "b",
            Path::new("/b"),
            MutationFailure::SourceMissing,
        ));
        assert_eq!(report.summary().as_deref(), Some("failed to import 2 items"));
        assert_eq!(report.failed_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_file_and_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::create_dir_all(temp_dir.path().join("dir/inner")).unwrap();
        fs::write(temp_dir.path().join("dir/inner/b.txt"), "b").unwrap();

        remove_entry(&entry(&temp_dir.path().join("a.txt"))).unwrap();
        remove_entry(&entry(&temp_dir.path().join("dir"))).unwrap();

        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(!temp_dir.path().join("dir").exists());
    }

    #[test]
    fn test_delete_batch_isolates_failures() {
        let temp_dir = TempDir::new().unwrap();
        let mut items = Vec::new();
        for name in ["one.txt", "two.txt", "three.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
            items.push(entry(&temp_dir.path().join(name)));
        }
        fs::remove_file(temp_dir.path().join("two.txt")).unwrap();

        let mut removed = Vec::new();
        let report = delete_batch(&items, |e| removed.push(e.name.clone()));

        assert_eq!(report.attempted, 3);
        assert_eq!(removed, vec!["one.txt", "three.txt"]);
        assert_eq!(report.failed_names(), vec!["two.txt"]);
        assert_eq!(report.summary().as_deref(), Some("failed to delete 1 item"));
    }

    #[test]
    fn test_import_copies_with_collision_free_name() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        fs::write(source_dir.path().join("photo.jpg"), "new").unwrap();
        fs::write(dest_dir.path().join("photo.jpg"), "old").unwrap();

        let created = import_source(&source_dir.path().join("photo.jpg"), dest_dir.path()).unwrap();

        assert_eq!(created, dest_dir.path().join("photo (1).jpg"));
        assert_eq!(fs::read_to_string(&created).unwrap(), "new");
        assert_eq!(fs::read_to_string(dest_dir.path().join("photo.jpg")).unwrap(), "old");
        // Copy, not move.
        assert!(source_dir.path().join("photo.jpg").exists());
    }

    #[test]
    fn test_import_directory_recursively() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        fs::create_dir_all(source_dir.path().join("album/raw")).unwrap();
        fs::write(source_dir.path().join("album/raw/1.dng"), "raw").unwrap();
        fs::write(source_dir.path().join("album/cover.jpg"), "cover").unwrap();

        let created = import_source(&source_dir.path().join("album"), dest_dir.path()).unwrap();

        assert_eq!(created, dest_dir.path().join("album"));
        assert_eq!(fs::read_to_string(created.join("raw/1.dng")).unwrap(), "raw");
        assert_eq!(fs::read_to_string(created.join("cover.jpg")).unwrap(), "cover");
    }

    #[test]
    fn test_import_into_itself_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let album = temp_dir.path().join("album");
        fs::create_dir(&album).unwrap();

        let err = import_source(&album, &album).unwrap_err();
        assert_eq!(err.reason, MutationFailure::DestinationInsideSource);
    }

    #[test]
    fn test_import_batch_never_aborts() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let sources: Vec<PathBuf> = ["a.txt", "missing.txt", "c.txt"]
            .iter()
            .map(|n| source_dir.path().join(n))
            .collect();
        fs::write(&sources[0], "a").unwrap();
        fs::write(&sources[2], "c").unwrap();

        let report = import_batch(&sources, dest_dir.path());

        assert_eq!(report.attempted, 3);
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item_name, "missing.txt");
        assert_eq!(report.failures[0].reason, MutationFailure::SourceMissing);
        assert!(dest_dir.path().join("a.txt").exists());
        assert!(dest_dir.path().join("c.txt").exists());
    }

    #[test]
    fn test_create_folder() {
        let temp_dir = TempDir::new().unwrap();

        let created = create_folder(temp_dir.path(), "New: Folder").unwrap().unwrap();
        assert_eq!(created, temp_dir.path().join("New Folder"));
        assert!(created.is_dir());

        // Existing folders are fine.
        assert!(create_folder(temp_dir.path(), "New Folder").unwrap().is_some());
    }

    #[test]
    fn test_blank_names_are_ignored() {
        let temp_dir = TempDir::new().unwrap();

        assert!(create_folder(temp_dir.path(), "   ").unwrap().is_none());
        assert!(create_text_file(temp_dir.path(), "").unwrap().is_none());
        assert!(create_text_file(temp_dir.path(), "///").unwrap().is_none());
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dot_names_stay_in_directory() {
        let parent = TempDir::new().unwrap();
        let work = parent.path().join("work");
        fs::create_dir(&work).unwrap();
        fs::write(work.join("a.txt"), "a").unwrap();
        let item = entry(&work.join("a.txt"));

        for name in [".", "..", " .. "] {
            assert!(create_folder(&work, name).unwrap().is_none());
            assert!(create_text_file(&work, name).unwrap().is_none());
            assert!(rename_entry(&item, name).unwrap().is_none());
        }

        assert!(item.path.exists());
        assert_eq!(fs::read_dir(&work).unwrap().count(), 1);
        assert_eq!(fs::read_dir(parent.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_import_source_without_file_name_is_rejected() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        fs::create_dir(source_dir.path().join("album")).unwrap();

        let source = source_dir.path().join("album/..");
        let err = import_source(&source, dest_dir.path()).unwrap_err();

        assert_eq!(err.reason, MutationFailure::NoFileName);
        assert_eq!(fs::read_dir(dest_dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_import_removes_partial_copy() {
        let source_dir = TempDir::new().unwrap();
        let dest_dir = TempDir::new().unwrap();
        let album = source_dir.path().join("album");
        fs::create_dir(&album).unwrap();
        fs::write(album.join("cover.jpg"), "cover").unwrap();
        std::os::unix::fs::symlink(source_dir.path().join("gone"), album.join("link")).unwrap();

        let err = import_source(&album, dest_dir.path()).unwrap_err();

        assert!(matches!(err.reason, MutationFailure::Io { .. }));
        assert!(!dest_dir.path().join("album").exists());
        assert!(album.join("cover.jpg").exists());
    }

    #[test]
    fn test_create_text_file_avoids_collisions() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("todo.txt"), "keep me").unwrap();

        let created = create_text_file(temp_dir.path(), "todo.txt").unwrap().unwrap();

        assert_eq!(created, temp_dir.path().join("todo (1).txt"));
        assert_eq!(fs::read_to_string(&created).unwrap(), "");
        assert_eq!(fs::read_to_string(temp_dir.path().join("todo.txt")).unwrap(), "keep me");
    }

    #[test]
    fn test_create_folder_failure_reports_io_error() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("blocker"), "").unwrap();

        let err = create_folder(&temp_dir.path().join("blocker"), "child").unwrap_err();
        assert!(matches!(err, OperationError::CreateFolder { .. }));
    }

    #[test]
    fn test_rename() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("old.txt"), "data").unwrap();

        let renamed = rename_entry(&entry(&temp_dir.path().join("old.txt")), "new?.txt")
            .unwrap()
            .unwrap();

        assert_eq!(renamed, temp_dir.path().join("new.txt"));
        assert_eq!(fs::read_to_string(&renamed).unwrap(), "data");
        assert!(!temp_dir.path().join("old.txt").exists());
    }

    #[test]
    fn test_rename_onto_existing_fails() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();

        let err = rename_entry(&entry(&temp_dir.path().join("a.txt")), "b.txt").unwrap_err();

        match err {
            OperationError::Rename { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::AlreadyExists)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fs::read_to_string(temp_dir.path().join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_rename_blank_and_same_name() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();
        let item = entry(&temp_dir.path().join("a.txt"));

        assert!(rename_entry(&item, " ").unwrap().is_none());
        assert_eq!(rename_entry(&item, "a.txt").unwrap(), Some(item.path.clone()));
        assert!(item.path.exists());
    }
}
