//! Directory state and the handle used to drive it.
//!
//! A single task owns the current directory, the sorted entry list, the
//! selection and the sort preference. Nothing else writes to them: every
//! change arrives as a [`Command`] on an mpsc channel and is applied in
//! arrival order. Filesystem work happens on the blocking pool, and bulk
//! workers stream their per-item results back to the state task as they go.
//!
//! ```text
//!  DirectoryHandle ──commands──▶ state task ──watch──▶ DirectorySnapshot
//!        │                          ▲   │
//!        │ spawn                    │   └──broadcast──▶ DirectoryEvent
//!        ▼                          │
//!  bulk worker (blocking pool) ─────┘ RemoveEntry / FinishBatch
//! ```
//!
//! Readers either take a [`DirectorySnapshot`] or subscribe to
//! [`DirectoryEvent`]s; dropping the receiver unsubscribes.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::collaborators::{AssociatedFile, Collaborators, ImportError};
use crate::config::Config;
use crate::entry::Entry;
use crate::error::{ListError, OperationError, StateError};
use crate::lister::DirectoryLister;
use crate::mutator::{self, BatchKind, BatchReport};
use crate::sort::{self, SortKey};

/// Capacity of the command channel.
const COMMAND_BUFFER: usize = 256;

/// Largest event buffer a state task will allocate.
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Settings for a new directory state.
#[derive(Debug, Clone)]
pub struct StateOptions {
    pub directory: PathBuf,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
    pub include_hidden: bool,
    pub event_capacity: usize,
}

impl StateOptions {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            sort_key: SortKey::Name,
            sort_ascending: true,
            include_hidden: true,
            event_capacity: 256,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            directory: config.browser.start_directory.clone(),
            sort_key: config.browser.sort_key,
            sort_ascending: config.browser.sort_ascending,
            include_hidden: config.browser.include_hidden,
            event_capacity: config.browser.event_capacity,
        }
    }

    pub fn with_sort(mut self, key: SortKey, ascending: bool) -> Self {
        self.sort_key = key;
        self.sort_ascending = ascending;
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.include_hidden = include;
        self
    }
}

/// Immutable view of the directory state.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    pub current_directory: PathBuf,
    /// Entries in display order.
    pub entries: Vec<Entry>,
    /// Paths marked for bulk operations.
    pub selection: HashSet<PathBuf>,
    /// Whether bulk-selection mode is active.
    pub selection_mode: bool,
    pub sort_key: SortKey,
    pub sort_ascending: bool,
}

impl DirectorySnapshot {
    /// Entry names in display order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn entry(&self, path: &Path) -> Option<&Entry> {
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn entry_named(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_selected(&self, path: &Path) -> bool {
        self.selection.contains(path)
    }

    /// Selected entries in display order.
    pub fn selected_entries(&self) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| self.selection.contains(&e.path))
            .cloned()
            .collect()
    }
}

/// Single-item operations, as named in failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateFolder,
    CreateFile,
    Rename,
    Extract,
    Package,
    FindAssociatedFile,
    ImportCertificate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateFolder => "create folder",
            Operation::CreateFile => "create file",
            Operation::Rename => "rename",
            Operation::Extract => "extract",
            Operation::Package => "package",
            Operation::FindAssociatedFile => "find associated file",
            Operation::ImportCertificate => "import certificate",
        };
        f.write_str(name)
    }
}

/// Notifications published by the state task.
#[derive(Debug, Clone)]
pub enum DirectoryEvent {
    /// The entry list was replaced by a fresh listing.
    Loaded { directory: PathBuf, count: usize },
    /// A bulk delete removed one entry.
    EntryRemoved { path: PathBuf },
    /// A bulk operation finished. Carries the aggregated failures.
    BatchCompleted(BatchReport),
    /// A directory could not be listed; the previous listing is kept.
    ListingFailed { directory: PathBuf, message: String },
    /// A single-item operation failed.
    OperationFailed { operation: Operation, message: String },
    /// A message forwarded from a collaborator.
    CollaboratorMessage(String),
}

enum SelectionChange {
    Select(Vec<PathBuf>),
    Deselect(Vec<PathBuf>),
    Toggle(PathBuf),
    All,
    Clear,
    Mode(bool),
}

enum Command {
    Load {
        directory: Option<PathBuf>,
        reply: oneshot::Sender<Result<usize, ListError>>,
    },
    UpdateSort {
        key: SortKey,
        ascending: bool,
        reply: oneshot::Sender<()>,
    },
    Selection {
        change: SelectionChange,
        reply: oneshot::Sender<usize>,
    },
    RemoveEntry(PathBuf),
    FinishBatch {
        report: BatchReport,
        reply: oneshot::Sender<()>,
    },
    Notify(DirectoryEvent),
    Shutdown,
}

/// The state owned by the state task.
pub struct DirectoryState {
    current_directory: PathBuf,
    entries: Vec<Entry>,
    selection: HashSet<PathBuf>,
    selection_mode: bool,
    sort_key: SortKey,
    sort_ascending: bool,
    lister: Arc<DirectoryLister>,
    events: broadcast::Sender<DirectoryEvent>,
    snapshots: watch::Sender<Arc<DirectorySnapshot>>,
}

impl DirectoryState {
    /// Spawn the state task and return a handle to it.
    ///
    /// The entry list starts empty; call [`DirectoryHandle::load`] (or use
    /// [`DirectoryHandle::open`]) to populate it. Must be called from within
    /// a tokio runtime.
    pub fn spawn(options: StateOptions, collaborators: Collaborators) -> DirectoryHandle {
        let current_directory =
            std::path::absolute(&options.directory).unwrap_or_else(|_| options.directory.clone());
        let lister = DirectoryLister::new(Arc::clone(&collaborators.classifier))
            .include_hidden(options.include_hidden);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, _) = broadcast::channel(options.event_capacity.clamp(1, MAX_EVENT_CAPACITY));
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(DirectorySnapshot {
            current_directory: current_directory.clone(),
            sort_key: options.sort_key,
            sort_ascending: options.sort_ascending,
            ..DirectorySnapshot::default()
        }));

        let state = Self {
            current_directory,
            entries: Vec::new(),
            selection: HashSet::new(),
            selection_mode: false,
            sort_key: options.sort_key,
            sort_ascending: options.sort_ascending,
            lister: Arc::new(lister),
            events: event_tx.clone(),
            snapshots: snapshot_tx,
        };
        tokio::spawn(state.run(command_rx));

        DirectoryHandle {
            commands: command_tx,
            events: event_tx,
            snapshots: snapshot_rx,
            collaborators,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        debug!(directory = ?self.current_directory, "Directory state task started");

        while let Some(command) = commands.recv().await {
            match command {
                Command::Load { directory, reply } => {
                    let result = self.load(directory).await;
                    let _ = reply.send(result);
                }
                Command::UpdateSort {
                    key,
                    ascending,
                    reply,
                } => {
                    self.update_sort(key, ascending);
                    let _ = reply.send(());
                }
                Command::Selection { change, reply } => {
                    self.change_selection(change);
                    let _ = reply.send(self.selection.len());
                }
                Command::RemoveEntry(path) => self.remove_entry(&path),
                Command::FinishBatch { report, reply } => {
                    self.finish_batch(report).await;
                    let _ = reply.send(());
                }
                Command::Notify(event) => self.emit(event),
                Command::Shutdown => break,
            }
        }

        debug!("Directory state task stopped");
    }

    /// List `directory` (or the current one) and replace the entry list.
    ///
    /// On failure nothing changes, including the current directory.
    async fn load(&mut self, directory: Option<PathBuf>) -> Result<usize, ListError> {
        let target = match directory {
            Some(dir) if dir.is_relative() => self.current_directory.join(dir),
            Some(dir) => dir,
            None => self.current_directory.clone(),
        };

        let lister = Arc::clone(&self.lister);
        let listing_dir = target.clone();
        let listing = tokio::task::spawn_blocking(move || {
            let dir = without_dot_components(listing_dir);
            let result = lister.list(&dir);
            (dir, result)
        });
        let (target, listed) = match listing.await {
            Ok(listing) => listing,
            Err(e) => {
                let source = io::Error::other(e.to_string());
                (target.clone(), Err(ListError::Io { path: target, source }))
            }
        };

        let mut entries = match listed {
            Ok(entries) => entries,
            Err(e) => {
                warn!(directory = ?target, error = %e, "Failed to list directory");
                self.emit(DirectoryEvent::ListingFailed {
                    directory: target,
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        if target != self.current_directory {
            info!(from = ?self.current_directory, to = ?target, "Changed directory");
            self.current_directory = target;
            self.selection.clear();
            self.selection_mode = false;
        }

        sort::sort_entries(&mut entries, self.sort_key, self.sort_ascending);
        self.entries = entries;

        let listed: HashSet<&PathBuf> = self.entries.iter().map(|e| &e.path).collect();
        self.selection.retain(|path| listed.contains(path));

        self.publish();
        let count = self.entries.len();
        self.emit(DirectoryEvent::Loaded {
            directory: self.current_directory.clone(),
            count,
        });
        Ok(count)
    }

    fn update_sort(&mut self, key: SortKey, ascending: bool) {
        self.sort_key = key;
        self.sort_ascending = ascending;
        sort::sort_entries(&mut self.entries, key, ascending);
        debug!(key = %key, ascending, "Re-sorted entries");
        self.publish();
    }

    fn is_listed(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    fn change_selection(&mut self, change: SelectionChange) {
        match change {
            SelectionChange::Select(paths) => {
                for path in paths {
                    if self.is_listed(&path) {
                        self.selection.insert(path);
                    }
                }
            }
            SelectionChange::Deselect(paths) => {
                for path in &paths {
                    self.selection.remove(path);
                }
            }
            SelectionChange::Toggle(path) => {
                if !self.selection.remove(&path) && self.is_listed(&path) {
                    self.selection.insert(path);
                }
            }
            SelectionChange::All => {
                self.selection = self.entries.iter().map(|e| e.path.clone()).collect();
            }
            SelectionChange::Clear => self.selection.clear(),
            SelectionChange::Mode(enabled) => {
                self.selection_mode = enabled;
                if !enabled {
                    self.selection.clear();
                }
            }
        }
        self.publish();
    }

    /// Drop one entry after a successful delete. Removal keeps the list sorted.
    fn remove_entry(&mut self, path: &Path) {
        if let Some(idx) = self.entries.iter().position(|e| e.path == path) {
            self.entries.remove(idx);
        }
        self.selection.remove(path);
        self.publish();
        self.emit(DirectoryEvent::EntryRemoved {
            path: path.to_path_buf(),
        });
    }

    async fn finish_batch(&mut self, report: BatchReport) {
        match report.kind {
            BatchKind::Delete => {
                self.selection.clear();
                self.selection_mode = false;
                self.publish();
            }
            BatchKind::Import => {
                // Failure is already published as ListingFailed.
                let _ = self.load(None).await;
            }
        }

        if let Some(summary) = report.summary() {
            warn!(failed = ?report.failed_names(), "{}", summary);
        }
        self.emit(DirectoryEvent::BatchCompleted(report));
    }

    fn snapshot(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            current_directory: self.current_directory.clone(),
            entries: self.entries.clone(),
            selection: self.selection.clone(),
            selection_mode: self.selection_mode,
            sort_key: self.sort_key,
            sort_ascending: self.sort_ascending,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.snapshot()));
    }

    fn emit(&self, event: DirectoryEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// A dispatched bulk operation.
///
/// Dropping the handle does not cancel the operation.
#[derive(Debug)]
pub struct BatchHandle {
    kind: BatchKind,
    task: Option<JoinHandle<BatchReport>>,
}

impl BatchHandle {
    fn noop(kind: BatchKind) -> Self {
        Self { kind, task: None }
    }

    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    /// Whether the request was empty and nothing was dispatched.
    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }

    /// Wait for the batch to finish.
    ///
    /// Resolves after the state task has applied the batch's final update.
    pub async fn wait(self) -> BatchReport {
        let kind = self.kind;
        match self.task {
            None => BatchReport::new(kind),
            Some(task) => task.await.unwrap_or_else(|e| {
                error!(error = %e, batch = %kind, "Batch task failed");
                BatchReport::new(kind)
            }),
        }
    }
}

/// Cloneable handle to the directory state task.
#[derive(Clone)]
pub struct DirectoryHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<DirectoryEvent>,
    snapshots: watch::Receiver<Arc<DirectorySnapshot>>,
    collaborators: Collaborators,
}

impl DirectoryHandle {
    /// Spawn a state task and load its directory.
    pub async fn open(
        options: StateOptions,
        collaborators: Collaborators,
    ) -> Result<Self, StateError> {
        let handle = DirectoryState::spawn(options, collaborators);
        handle.load().await?;
        Ok(handle)
    }

    /// The latest published state.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&*self.snapshots.borrow())
    }

    /// A receiver that is notified whenever the state changes.
    pub fn watch(&self) -> watch::Receiver<Arc<DirectorySnapshot>> {
        self.snapshots.clone()
    }

    /// Subscribe to events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<DirectoryEvent> {
        self.events.subscribe()
    }

    pub fn current_directory(&self) -> PathBuf {
        self.snapshots.borrow().current_directory.clone()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, StateError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| StateError::Closed)?;
        response.await.map_err(|_| StateError::Closed)
    }

    async fn notify(&self, event: DirectoryEvent) {
        let _ = self.commands.send(Command::Notify(event)).await;
    }

    /// Reload the current directory. Returns the number of entries.
    pub async fn load(&self) -> Result<usize, StateError> {
        self.request(|reply| Command::Load {
            directory: None,
            reply,
        })
        .await?
        .map_err(StateError::from)
    }

    /// Switch to `directory` (relative paths resolve against the current
    /// one). Clears the selection on success; changes nothing on failure.
    pub async fn change_directory(
        &self,
        directory: impl Into<PathBuf>,
    ) -> Result<usize, StateError> {
        let directory = directory.into();
        self.request(|reply| Command::Load {
            directory: Some(directory),
            reply,
        })
        .await?
        .map_err(StateError::from)
    }

    /// Change the sort preference and re-sort in memory.
    pub async fn update_sort(&self, key: SortKey, ascending: bool) -> Result<(), StateError> {
        self.request(|reply| Command::UpdateSort {
            key,
            ascending,
            reply,
        })
        .await
    }

    async fn change_selection(&self, change: SelectionChange) -> Result<usize, StateError> {
        self.request(|reply| Command::Selection { change, reply }).await
    }

    /// Add listed paths to the selection. Returns the selection size.
    pub async fn select(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::Select(paths.into_iter().collect()))
            .await
    }

    pub async fn deselect(
        &self,
        paths: impl IntoIterator<Item = PathBuf>,
    ) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::Deselect(paths.into_iter().collect()))
            .await
    }

    pub async fn toggle_selection(&self, path: impl Into<PathBuf>) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::Toggle(path.into()))
            .await
    }

    pub async fn select_all(&self) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::All).await
    }

    pub async fn clear_selection(&self) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::Clear).await
    }

    /// Enter or leave bulk-selection mode. Leaving clears the selection.
    pub async fn set_selection_mode(&self, enabled: bool) -> Result<usize, StateError> {
        self.change_selection(SelectionChange::Mode(enabled)).await
    }

    /// Delete `items` in the background.
    ///
    /// Returns immediately. Entries disappear from the listing one by one as
    /// they are removed; failed items stay. When the batch ends the selection
    /// is cleared and selection mode is left, whatever the outcome.
    pub fn delete_many(&self, items: Vec<Entry>) -> BatchHandle {
        if items.is_empty() {
            return BatchHandle::noop(BatchKind::Delete);
        }

        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            let worker = commands.clone();
            let report = tokio::task::spawn_blocking(move || {
                mutator::delete_batch(&items, |entry| {
                    let _ = worker.blocking_send(Command::RemoveEntry(entry.path.clone()));
                })
            })
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Delete worker failed");
                BatchReport::new(BatchKind::Delete)
            });

            finish_batch(&commands, report).await
        });

        BatchHandle {
            kind: BatchKind::Delete,
            task: Some(task),
        }
    }

    /// Delete the current selection in the background.
    pub fn delete_selected(&self) -> BatchHandle {
        self.delete_many(self.snapshot().selected_entries())
    }

    /// Copy `sources` into the current directory in the background.
    ///
    /// Returns immediately. Every source is attempted; the directory is
    /// reloaded once at the end.
    pub fn import_many(&self, sources: Vec<PathBuf>) -> BatchHandle {
        if sources.is_empty() {
            return BatchHandle::noop(BatchKind::Import);
        }

        let destination = self.current_directory();
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            let report =
                tokio::task::spawn_blocking(move || mutator::import_batch(&sources, &destination))
                    .await
                    .unwrap_or_else(|e| {
                        error!(error = %e, "Import worker failed");
                        BatchReport::new(BatchKind::Import)
                    });

            finish_batch(&commands, report).await
        });

        BatchHandle {
            kind: BatchKind::Import,
            task: Some(task),
        }
    }

    /// Create a folder in the current directory.
    ///
    /// Blank names are ignored (`Ok(None)`).
    pub async fn create_folder(&self, name: &str) -> Result<Option<PathBuf>, OperationError> {
        let directory = self.current_directory();
        let name = name.to_string();
        let result = run_blocking(move || mutator::create_folder(&directory, &name)).await?;
        self.complete(Operation::CreateFolder, result).await
    }

    /// Create an empty text file in the current directory under a
    /// collision-free name.
    ///
    /// Blank names are ignored (`Ok(None)`).
    pub async fn create_text_file(&self, name: &str) -> Result<Option<PathBuf>, OperationError> {
        let directory = self.current_directory();
        let name = name.to_string();
        let result = run_blocking(move || mutator::create_text_file(&directory, &name)).await?;
        self.complete(Operation::CreateFile, result).await
    }

    /// Rename `entry` within its directory.
    ///
    /// Blank names are ignored (`Ok(None)`); an existing target is an error.
    pub async fn rename(
        &self,
        entry: &Entry,
        new_name: &str,
    ) -> Result<Option<PathBuf>, OperationError> {
        let entry = entry.clone();
        let new_name = new_name.to_string();
        let result = run_blocking(move || mutator::rename_entry(&entry, &new_name)).await?;
        self.complete(Operation::Rename, result).await
    }

    /// Hand an archive to the archive service for extraction next to it.
    pub async fn extract_archive(&self, entry: &Entry) -> Result<(), OperationError> {
        let result = if entry.flags.is_archive {
            let archives = Arc::clone(&self.collaborators.archives);
            let into = self.parent_of(entry);
            let target = entry.clone();
            run_blocking(move || archives.extract(&target, &into))
                .await?
                .map_err(OperationError::from)
        } else {
            Err(unsupported(entry, "an archive"))
        };

        match result {
            Ok(()) => {
                self.reload_quietly().await?;
                self.notify(DirectoryEvent::CollaboratorMessage(format!(
                    "Extracted {}",
                    entry.name
                )))
                .await;
                Ok(())
            }
            Err(e) => Err(self.fail(Operation::Extract, e).await),
        }
    }

    /// Package a directory-style package as an archive next to it.
    ///
    /// Returns the name of the produced archive.
    pub async fn package_directory(&self, entry: &Entry) -> Result<String, OperationError> {
        let result = if entry.flags.is_package {
            let archives = Arc::clone(&self.collaborators.archives);
            let into = self.parent_of(entry);
            let target = entry.clone();
            run_blocking(move || archives.package_directory(&target, &into))
                .await?
                .map_err(OperationError::from)
        } else {
            Err(unsupported(entry, "a package"))
        };

        match result {
            Ok(output) => {
                self.reload_quietly().await?;
                self.notify(DirectoryEvent::CollaboratorMessage(format!("Created {output}")))
                    .await;
                Ok(output)
            }
            Err(e) => Err(self.fail(Operation::Package, e).await),
        }
    }

    /// Ask the certificate importer for the file that belongs with `entry`.
    pub async fn find_associated_file(
        &self,
        entry: &Entry,
    ) -> Result<AssociatedFile, OperationError> {
        let result = if entry.flags.is_certificate_container {
            let certificates = Arc::clone(&self.collaborators.certificates);
            let target = entry.clone();
            run_blocking(move || certificates.find_associated_file(&target))
                .await?
                .map_err(OperationError::from)
        } else {
            Err(unsupported(entry, "a certificate container"))
        };

        match result {
            Ok(associated) => Ok(associated),
            Err(e) => Err(self.fail(Operation::FindAssociatedFile, e).await),
        }
    }

    /// Import a certificate container together with its associated file.
    ///
    /// A wrong password is returned (see
    /// [`OperationError::is_invalid_password`]) without publishing a failure
    /// event, so the host can prompt again.
    pub async fn import_certificate(
        &self,
        entry: &Entry,
        password: &str,
    ) -> Result<String, OperationError> {
        let result = if entry.flags.is_certificate_container {
            let certificates = Arc::clone(&self.collaborators.certificates);
            let target = entry.clone();
            let password = password.to_string();
            run_blocking(move || -> Result<String, ImportError> {
                let associated = certificates.find_associated_file(&target)?;
                certificates.import_bundle(&target, &associated, &password)
            })
            .await?
            .map_err(OperationError::from)
        } else {
            Err(unsupported(entry, "a certificate container"))
        };

        match result {
            Ok(message) => {
                info!(item = %entry.name, "Imported certificate bundle");
                self.notify(DirectoryEvent::CollaboratorMessage(message.clone()))
                    .await;
                Ok(message)
            }
            Err(e) if e.is_invalid_password() => {
                debug!(item = %entry.name, "Certificate password rejected");
                Err(e)
            }
            Err(e) => Err(self.fail(Operation::ImportCertificate, e).await),
        }
    }

    /// Stop the state task. Outstanding handles get [`StateError::Closed`].
    pub async fn shutdown(&self) -> Result<(), StateError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| StateError::Closed)
    }

    fn parent_of(&self, entry: &Entry) -> PathBuf {
        entry
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.current_directory())
    }

    /// Reload, treating a listing failure as already reported.
    async fn reload_quietly(&self) -> Result<(), StateError> {
        match self.load().await {
            Ok(_) | Err(StateError::Listing(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn complete<T>(
        &self,
        operation: Operation,
        result: Result<Option<T>, OperationError>,
    ) -> Result<Option<T>, OperationError> {
        match result {
            Ok(None) => Ok(None),
            Ok(Some(value)) => {
                self.reload_quietly().await?;
                Ok(Some(value))
            }
            Err(e) => Err(self.fail(operation, e).await),
        }
    }

    /// Publish a single failure event and hand the error back.
    async fn fail(&self, operation: Operation, error: OperationError) -> OperationError {
        warn!(operation = %operation, error = %error, "Operation failed");
        self.notify(DirectoryEvent::OperationFailed {
            operation,
            message: error.to_string(),
        })
        .await;
        error
    }
}

/// Resolve `.` and `..` so the current directory never carries them.
///
/// Falls back to the path as given when it cannot be canonicalized; the
/// listing then reports the error.
fn without_dot_components(path: PathBuf) -> PathBuf {
    let dotted = path
        .components()
        .any(|c| matches!(c, Component::CurDir | Component::ParentDir));
    if !dotted {
        return path;
    }
    std::fs::canonicalize(&path).unwrap_or(path)
}

fn unsupported(entry: &Entry, expected: &'static str) -> OperationError {
    OperationError::Unsupported {
        name: entry.name.clone(),
        expected,
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StateError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Hand the final report to the state task and wait until it is applied.
async fn finish_batch(commands: &mpsc::Sender<Command>, report: BatchReport) -> BatchReport {
    let (reply, applied) = oneshot::channel();
    let command = Command::FinishBatch {
        report: report.clone(),
        reply,
    };
    if commands.send(command).await.is_ok() {
        let _ = applied.await;
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    async fn open(dir: &Path) -> DirectoryHandle {
        DirectoryHandle::open(StateOptions::new(dir), Collaborators::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_spawn_starts_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), "a").unwrap();

        let options = StateOptions::new(temp_dir.path());
        let handle = DirectoryState::spawn(options, Collaborators::default());
        assert!(handle.snapshot().entries.is_empty());

        assert_eq!(handle.load().await.unwrap(), 1);
        assert_eq!(handle.snapshot().names(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_change_directory_resolves_dot_components() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("inner")).unwrap();
        let root = fs::canonicalize(temp_dir.path()).unwrap();
        let handle = open(&root).await;

        handle.change_directory("inner").await.unwrap();
        assert_eq!(handle.current_directory(), root.join("inner"));

        handle.change_directory("..").await.unwrap();
        assert_eq!(handle.current_directory(), root);
        assert_eq!(handle.snapshot().current_directory, root);

        handle.change_directory("./inner/.").await.unwrap();
        assert_eq!(handle.current_directory(), root.join("inner"));
    }

    #[tokio::test]
    async fn test_oversized_event_capacity_is_clamped() {
        let temp_dir = TempDir::new().unwrap();
        let options = StateOptions {
            event_capacity: usize::MAX,
            ..StateOptions::new(temp_dir.path())
        };

        let handle = DirectoryHandle::open(options, Collaborators::default())
            .await
            .unwrap();
        assert_eq!(handle.snapshot().entries.len(), 0);
    }

    #[tokio::test]
    async fn test_update_sort_resorts_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["b.txt", "a.txt", "c.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let handle = open(temp_dir.path()).await;
        assert_eq!(handle.snapshot().names(), vec!["a.txt", "b.txt", "c.txt"]);

        // Not visible until the next reload.
        fs::write(temp_dir.path().join("d.txt"), "d").unwrap();

        handle.update_sort(SortKey::Name, false).await.unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.names(), vec!["c.txt", "b.txt", "a.txt"]);
        assert!(!snapshot.sort_ascending);

        handle.load().await.unwrap();
        assert_eq!(handle.snapshot().names(), vec!["d.txt", "c.txt", "b.txt", "a.txt"]);
    }

    #[tokio::test]
    async fn test_selection() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let handle = open(temp_dir.path()).await;
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");

        assert_eq!(handle.select([a.clone(), temp_dir.path().join("ghost")]).await.unwrap(), 1);
        assert_eq!(handle.toggle_selection(b.clone()).await.unwrap(), 2);
        assert_eq!(handle.toggle_selection(a.clone()).await.unwrap(), 1);
        assert!(handle.snapshot().is_selected(&b));

        assert_eq!(handle.select_all().await.unwrap(), 2);
        assert_eq!(handle.deselect([b.clone()]).await.unwrap(), 1);
        assert_eq!(handle.clear_selection().await.unwrap(), 0);

        handle.set_selection_mode(true).await.unwrap();
        handle.select_all().await.unwrap();
        assert!(handle.snapshot().selection_mode);
        assert_eq!(handle.set_selection_mode(false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reload_prunes_selection() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["keep.txt", "gone.txt"] {
            fs::write(temp_dir.path().join(name), name).unwrap();
        }
        let handle = open(temp_dir.path()).await;
        handle.select_all().await.unwrap();

        fs::remove_file(temp_dir.path().join("gone.txt")).unwrap();
        handle.load().await.unwrap();

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.selection.len(), 1);
        assert!(snapshot.is_selected(&temp_dir.path().join("keep.txt")));
    }

    #[tokio::test]
    async fn test_empty_batches_are_noops() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(temp_dir.path()).await;
        let mut events = handle.subscribe();

        let delete = handle.delete_many(Vec::new());
        let import = handle.import_many(Vec::new());
        assert!(delete.is_noop());
        assert!(import.is_noop());
        assert_eq!(delete.wait().await.attempted, 0);
        assert_eq!(import.wait().await.attempted, 0);

        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_closes_handle() {
        let temp_dir = TempDir::new().unwrap();
        let handle = open(temp_dir.path()).await;

        handle.shutdown().await.unwrap();
        assert!(matches!(handle.load().await, Err(StateError::Closed)));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::CreateFolder.to_string(), "create folder");
        assert_eq!(Operation::ImportCertificate.to_string(), "import certificate");
    }
}
