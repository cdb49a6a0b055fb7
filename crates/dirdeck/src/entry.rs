//! Directory entries.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Type label used for directories when sorting by type.
pub const FOLDER_LABEL: &str = "Folder";

/// Type label used for files without an extension.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Classification resolved outside the core (by extension or content
/// sniffing) and only read by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    /// Can be handed to the archive service for extraction.
    pub is_archive: bool,
    /// A directory-style package that can be packaged as an archive.
    pub is_package: bool,
    /// An importable certificate container.
    pub is_certificate_container: bool,
}

/// One file-system object within the current directory.
///
/// Entries are snapshots: a reload produces new entries rather than
/// updating existing ones. Equality and hashing use `path` only.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Last path segment.
    pub name: String,
    /// Absolute location.
    pub path: PathBuf,
    /// Size in bytes (0 for directories and unreadable files).
    pub size: u64,
    /// Creation time, if the platform reported one.
    pub created_at: Option<SystemTime>,
    /// Whether this is a directory.
    pub is_directory: bool,
    /// Externally resolved classification.
    pub flags: EntryFlags,
}

impl Entry {
    /// Build an entry whose name is derived from `path`.
    pub fn new(
        path: PathBuf,
        size: u64,
        created_at: Option<SystemTime>,
        is_directory: bool,
    ) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            path,
            size,
            created_at,
            is_directory,
            flags: EntryFlags::default(),
        }
    }

    /// Attach classification flags.
    pub fn with_flags(mut self, flags: EntryFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Lowercased extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .filter(|ext| !ext.is_empty())
    }

    /// Label used by the type sort: `"Folder"`, the lowercased extension,
    /// or `"Unknown"`.
    pub fn type_label(&self) -> String {
        if self.is_directory {
            return FOLDER_LABEL.to_string();
        }
        self.extension().unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    /// Convert to a serializable record.
    pub fn to_record(&self) -> EntryRecord {
        let created = self
            .created_at
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs());

        EntryRecord {
            name: self.name.clone(),
            path: self.path.clone(),
            size: self.size,
            created,
            is_directory: self.is_directory,
            kind: self.type_label(),
            flags: self.flags,
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Entry {}

impl Hash for Entry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Serializable view of an [`Entry`] with the creation time in unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub created: Option<u64>,
    pub is_directory: bool,
    pub kind: String,
    pub flags: EntryFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn test_name_derived_from_path() {
        let entry = Entry::new(PathBuf::from("/docs/Report.PDF"), 10, None, false);
        assert_eq!(entry.name, "Report.PDF");
        assert_eq!(entry.extension().as_deref(), Some("pdf"));
    }

    #[test]
    fn test_type_labels() {
        let folder = Entry::new(PathBuf::from("/docs/photos.v2"), 0, None, true);
        let file = Entry::new(PathBuf::from("/docs/a.TXT"), 1, None, false);
        let bare = Entry::new(PathBuf::from("/docs/Makefile"), 1, None, false);
        let dotfile = Entry::new(PathBuf::from("/docs/.env"), 1, None, false);

        assert_eq!(folder.type_label(), "Folder");
        assert_eq!(file.type_label(), "txt");
        assert_eq!(bare.type_label(), "Unknown");
        assert_eq!(dotfile.type_label(), "Unknown");
    }

    #[test]
    fn test_identity_is_path() {
        let a = Entry::new(PathBuf::from("/docs/a.txt"), 1, None, false);
        let mut renamed = a.clone();
        renamed.name = "b.txt".to_string();
        renamed.size = 99;

        assert_eq!(a, renamed);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&renamed));
        assert!(!set.contains(&Entry::new(PathBuf::from("/other/a.txt"), 1, None, false)));
    }

    #[test]
    fn test_to_record() {
        let created = SystemTime::UNIX_EPOCH + Duration::from_secs(1704067200);
        let entry = Entry::new(PathBuf::from("/docs/bundle.p12"), 2048, Some(created), false)
            .with_flags(EntryFlags {
                is_certificate_container: true,
                ..EntryFlags::default()
            });

        let record = entry.to_record();
        assert_eq!(record.name, "bundle.p12");
        assert_eq!(record.size, 2048);
        assert_eq!(record.created, Some(1704067200));
        assert_eq!(record.kind, "p12");
        assert!(record.flags.is_certificate_container);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"created\":1704067200"));
    }
}
