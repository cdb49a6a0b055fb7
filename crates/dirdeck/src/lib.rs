//! # Dirdeck
//!
//! Directory-content engine for file-browser front ends.
//!
//! ## Overview
//!
//! Dirdeck keeps an in-memory, sorted view of one directory and performs
//! the mutations a browser offers on it:
//!
//! - **Listing**: non-recursive enumeration with classification flags
//! - **Sorting**: total orders by name, creation date or type
//! - **Naming**: collision-free `name (n).ext` destinations
//! - **Bulk operations**: background delete and import with per-item
//!   failure reporting
//! - **Single operations**: create folder, create text file, rename
//! - **Collaborators**: archive extraction, packaging and certificate
//!   import behind traits supplied by the host
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    DirectoryHandle                       │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌──────────────┐  commands  ┌────────────────────────┐  │
//! │  │  Bulk worker │ ─────────▶ │   Directory state task │  │
//! │  └──────────────┘            └────────────────────────┘  │
//! │         │                       │          │             │
//! │  ┌──────────────┐     ┌──────────────┐ ┌─────────────┐   │
//! │  │   Mutator    │     │    Lister    │ │ Sort engine │   │
//! │  └──────────────┘     └──────────────┘ └─────────────┘   │
//! │         │                                                │
//! │  ┌──────────────┐                                        │
//! │  │ Naming       │                                        │
//! │  └──────────────┘                                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dirdeck::{Collaborators, DirectoryHandle, SortKey, StateOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = StateOptions::new("/srv/share").with_sort(SortKey::Date, false);
//!     let handle = DirectoryHandle::open(options, Collaborators::default()).await?;
//!
//!     for entry in &handle.snapshot().entries {
//!         println!("{} ({})", entry.name, entry.type_label());
//!     }
//!
//!     handle.create_folder("Reports").await?;
//!     let report = handle.import_many(vec!["/tmp/scan.pdf".into()]).wait().await;
//!     if let Some(summary) = report.summary() {
//!         eprintln!("{summary}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`entry`]: Entry snapshots and classification flags
//! - [`naming`]: Name sanitizing and collision resolution
//! - [`lister`]: Directory enumeration
//! - [`sort`]: Entry ordering
//! - [`mutator`]: Filesystem mutations
//! - [`collaborators`]: Host-supplied services
//! - [`state`]: The directory state task and its handle
//! - [`error`]: Error types

pub mod collaborators;
pub mod config;
pub mod entry;
pub mod error;
pub mod lister;
pub mod mutator;
pub mod naming;
pub mod sort;
pub mod state;

// Re-export config types for convenience
pub use config::Config;

// Re-export entry types for convenience
pub use entry::{Entry, EntryFlags, EntryRecord};

// Re-export error types for convenience
pub use error::{ListError, MutationError, MutationFailure, NamingError, OperationError, StateError};

// Re-export collaborator types for convenience
pub use collaborators::{
    ArchiveService, AssociatedFile, CertificateImporter, CollaboratorError, Collaborators,
    EntryClassifier, ExtensionClassifier, ImportError, Unconfigured,
};

// Re-export engine types for convenience
pub use lister::DirectoryLister;
pub use mutator::{BatchKind, BatchReport};
pub use sort::SortKey;
pub use state::{
    BatchHandle, DirectoryEvent, DirectoryHandle, DirectorySnapshot, DirectoryState, Operation,
    StateOptions,
};
