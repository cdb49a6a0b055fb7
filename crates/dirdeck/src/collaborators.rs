//! Interfaces to services the engine calls but does not implement.
//!
//! Certificate import and archive handling live outside this crate. The
//! engine only checks an entry's classification, hands the entry to the
//! collaborator on the blocking pool, and reacts to the outcome (reload plus
//! a forwarded message). Hosts plug in their implementations through
//! [`Collaborators`]; [`Unconfigured`] is used when they don't.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::entry::{Entry, EntryFlags};

/// Errors reported by collaborators.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    /// No implementation was supplied for this service.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// The certificate importer found nothing to pair with the entry.
    #[error("no associated file found for {0}")]
    NoAssociatedFile(String),

    /// The collaborator failed with a message of its own.
    #[error("{0}")]
    Failed(String),
}

/// Errors from importing a certificate bundle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    /// The password did not unlock the bundle. Hosts re-prompt on this.
    #[error("invalid password")]
    InvalidPassword,

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// A file paired with a certificate container (e.g. its provisioning profile).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociatedFile {
    pub path: PathBuf,
}

/// Imports certificate bundles.
pub trait CertificateImporter: Send + Sync {
    /// Find the file that belongs with `near`.
    fn find_associated_file(&self, near: &Entry) -> Result<AssociatedFile, CollaboratorError>;

    /// Import `entry` together with its associated file.
    ///
    /// Returns a message to forward to the user on success.
    fn import_bundle(
        &self,
        entry: &Entry,
        associated: &AssociatedFile,
        password: &str,
    ) -> Result<String, ImportError>;
}

/// Extracts archives and packages directories.
pub trait ArchiveService: Send + Sync {
    /// Extract `entry` into `into`.
    fn extract(&self, entry: &Entry, into: &Path) -> Result<(), CollaboratorError>;

    /// Package the directory `entry` as an archive inside `into`.
    ///
    /// Returns the name of the produced archive.
    fn package_directory(&self, entry: &Entry, into: &Path) -> Result<String, CollaboratorError>;
}

/// Resolves classification flags for listed entries.
pub trait EntryClassifier: Send + Sync {
    fn classify(&self, path: &Path, is_directory: bool) -> EntryFlags;
}

/// Classifies entries by their (case-insensitive) extension.
#[derive(Debug, Clone)]
pub struct ExtensionClassifier {
    archive_extensions: Vec<String>,
    package_extensions: Vec<String>,
    certificate_extensions: Vec<String>,
}

impl ExtensionClassifier {
    pub fn new(
        archive_extensions: Vec<String>,
        package_extensions: Vec<String>,
        certificate_extensions: Vec<String>,
    ) -> Self {
        let lower = |exts: Vec<String>| -> Vec<String> {
            exts.into_iter().map(|e| e.to_lowercase()).collect()
        };
        Self {
            archive_extensions: lower(archive_extensions),
            package_extensions: lower(package_extensions),
            certificate_extensions: lower(certificate_extensions),
        }
    }
}

impl Default for ExtensionClassifier {
    fn default() -> Self {
        let owned = |exts: &[&str]| -> Vec<String> { exts.iter().map(|e| e.to_string()).collect() };
        Self::new(
            owned(&["zip", "ipa", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar"]),
            owned(&["app", "bundle", "framework", "xcarchive"]),
            owned(&["p12", "pfx", "mobileprovision"]),
        )
    }
}

impl EntryClassifier for ExtensionClassifier {
    fn classify(&self, path: &Path, is_directory: bool) -> EntryFlags {
        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            return EntryFlags::default();
        };

        EntryFlags {
            is_archive: !is_directory && self.archive_extensions.contains(&ext),
            is_package: is_directory && self.package_extensions.contains(&ext),
            is_certificate_container: !is_directory && self.certificate_extensions.contains(&ext),
        }
    }
}

/// Placeholder collaborator that rejects every request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl CertificateImporter for Unconfigured {
    fn find_associated_file(&self, _near: &Entry) -> Result<AssociatedFile, CollaboratorError> {
        Err(CollaboratorError::NotConfigured("certificate importer"))
    }

    fn import_bundle(
        &self,
        _entry: &Entry,
        _associated: &AssociatedFile,
        _password: &str,
    ) -> Result<String, ImportError> {
        Err(CollaboratorError::NotConfigured("certificate importer").into())
    }
}

impl ArchiveService for Unconfigured {
    fn extract(&self, _entry: &Entry, _into: &Path) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::NotConfigured("archive service"))
    }

    fn package_directory(&self, _entry: &Entry, _into: &Path) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::NotConfigured("archive service"))
    }
}

/// The set of collaborators handed to the directory state.
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn EntryClassifier>,
    pub certificates: Arc<dyn CertificateImporter>,
    pub archives: Arc<dyn ArchiveService>,
}

impl Collaborators {
    pub fn with_classifier(mut self, classifier: Arc<dyn EntryClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_certificates(mut self, certificates: Arc<dyn CertificateImporter>) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn with_archives(mut self, archives: Arc<dyn ArchiveService>) -> Self {
        self.archives = archives;
        self
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            classifier: Arc::new(ExtensionClassifier::default()),
            certificates: Arc::new(Unconfigured),
            archives: Arc::new(Unconfigured),
        }
    }
}
