//! The currently displayed directory and the operations on it.

use bytesize::ByteSize;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use filedeck_api::{EntryUpdate, FileServer, RemoteDirectory, RemoteEntry};
use filedeck_common::{EntryId, Error, Result};

use crate::context::AppContext;
use crate::events::{AppEvent, EventBus};
use crate::selection::{Selection, SelectionModel};

/// Size label shown for directories.
pub const FOLDER_LABEL: &str = "folder";

/// Human readable size: `"folder"` for directories, 1024-based units otherwise.
pub fn size_label(size_bytes: u64, is_directory: bool) -> String {
    if is_directory {
        FOLDER_LABEL.to_string()
    } else {
        ByteSize::b(size_bytes).to_string()
    }
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub id: EntryId,
    pub name: String,
    pub size_bytes: u64,
    pub is_directory: bool,
    pub parent_id: Option<EntryId>,
    pub modified: Option<DateTime<Utc>>,
    /// UI-local; false after every load.
    pub selected: bool,
    pub size_label: String,
}

impl From<RemoteEntry> for FileEntry {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            size_label: size_label(entry.size, entry.dir),
            id: entry.id,
            name: entry.name,
            size_bytes: entry.size,
            is_directory: entry.dir,
            parent_id: entry.parent,
            modified: entry.mtime,
            selected: false,
        }
    }
}

/// A directory and its entries, replaced wholesale on every load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directory {
    /// `None` only for the placeholder shown before the first load.
    pub id: Option<EntryId>,
    pub name: String,
    pub parent_id: Option<EntryId>,
    pub entries: Vec<FileEntry>,
}

impl Directory {
    /// Empty root shown until the first listing arrives.
    pub fn placeholder() -> Self {
        Self {
            id: None,
            name: "/".to_string(),
            parent_id: None,
            entries: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }

    /// The directory id, for operations that address it.
    ///
    /// # Errors
    /// - `NotFound` for the placeholder
    pub fn require_id(&self) -> Result<&EntryId> {
        self.id
            .as_ref()
            .ok_or_else(|| Error::NotFound("No directory loaded".to_string()))
    }

    pub fn entry(&self, id: &EntryId) -> Option<&FileEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }
}

impl From<RemoteDirectory> for Directory {
    fn from(remote: RemoteDirectory) -> Self {
        Self {
            id: Some(remote.entry.id),
            name: remote.entry.name,
            parent_id: remote.entry.parent,
            entries: remote
                .files
                .unwrap_or_default()
                .into_iter()
                .map(FileEntry::from)
                .collect(),
        }
    }
}

/// One entry a batch delete could not remove.
#[derive(Debug)]
pub struct DeleteFailure {
    pub id: EntryId,
    pub name: String,
    pub error: Error,
}

/// Result of deleting the selection.
#[derive(Debug, Default)]
pub struct BatchDeleteReport {
    pub deleted: Vec<EntryId>,
    pub failed: Vec<DeleteFailure>,
    /// Set when the listing could not be refreshed afterwards.
    pub reload_error: Option<Error>,
}

impl BatchDeleteReport {
    /// Whether every selected entry was deleted.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct StoreState {
    current: Directory,
    /// Last ticket handed out.
    issued: u64,
    /// Ticket of the listing currently shown.
    applied: u64,
}

/// Owner of the current directory.
///
/// Cloning yields a handle to the same store. Loads may overlap; each
/// takes a ticket and a settled load is applied only if no later-issued
/// load has been applied already.
#[derive(Clone)]
pub struct DirectoryStore {
    server: Arc<dyn FileServer>,
    events: EventBus,
    state: Arc<Mutex<StoreState>>,
}

impl DirectoryStore {
    pub fn new(ctx: &AppContext) -> Self {
        Self {
            server: ctx.server().clone(),
            events: ctx.events().clone(),
            state: Arc::new(Mutex::new(StoreState {
                current: Directory::placeholder(),
                issued: 0,
                applied: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the current directory.
    pub fn current(&self) -> Directory {
        self.lock().current.clone()
    }

    pub fn current_id(&self) -> Option<EntryId> {
        self.lock().current.id.clone()
    }

    /// Selection derived from the current entries.
    pub fn selection(&self) -> Selection {
        Selection::of(&self.lock().current.entries)
    }

    /// Fetch a listing and make it current. `None` lists the root.
    ///
    /// The returned directory is the fetched one even when a later load
    /// won and it was not applied.
    ///
    /// # Errors
    /// - `Unauthorized` if the server demands login; the view is kept
    /// - `NotFound` if the directory does not exist
    pub async fn load(&self, id: Option<&EntryId>) -> Result<Directory> {
        let ticket = self.begin_load();
        debug!("Loading directory {:?} (ticket {})", id, ticket);

        let remote = self.server.get_directory(id).await.map_err(|e| {
            warn!("Failed to load directory: {}", e);
            e
        })?;
        let directory = Directory::from(remote);

        if !self.apply_loaded(ticket, directory.clone()) {
            debug!("Discarding stale listing (ticket {})", ticket);
        }
        Ok(directory)
    }

    /// Reload whatever is current; the root if nothing was loaded yet.
    ///
    /// # Errors
    /// - Same as [`load`](Self::load)
    pub async fn reload(&self) -> Result<Directory> {
        let id = self.current_id();
        self.load(id.as_ref()).await
    }

    /// Take the next load ticket.
    pub(crate) fn begin_load(&self) -> u64 {
        let mut state = self.lock();
        state.issued += 1;
        state.issued
    }

    /// Replace the current directory unless a later load was applied.
    pub(crate) fn apply_loaded(&self, ticket: u64, directory: Directory) -> bool {
        let event = {
            let mut state = self.lock();
            if ticket <= state.applied {
                return false;
            }
            state.applied = ticket;
            state.current = directory;
            state.current.id.clone().map(|id| AppEvent::DirectoryLoaded {
                id,
                entries: state.current.entries.len(),
            })
        };
        if let Some(event) = event {
            self.events.publish(event);
        }
        true
    }

    /// Create a directory named `name` under `parent`.
    ///
    /// # Errors
    /// - `Validation` with the server's message if the name is rejected
    pub async fn create(&self, parent: &EntryId, name: &str) -> Result<FileEntry> {
        let created = self.server.create_directory(parent, name).await?;
        info!("Created directory {} ({})", created.name, created.id);
        Ok(FileEntry::from(created))
    }

    /// Rename an entry, keeping it under `parent_id`.
    ///
    /// Files are addressed under the current directory.
    ///
    /// # Errors
    /// - `Validation` with the server's message if the name is rejected
    /// - `NotFound` when renaming a file before any directory was loaded
    pub async fn rename(
        &self,
        entry_id: &EntryId,
        is_directory: bool,
        new_name: &str,
        parent_id: Option<&EntryId>,
    ) -> Result<FileEntry> {
        let update = EntryUpdate {
            name: new_name.to_string(),
            parent: parent_id.cloned(),
        };
        let renamed = if is_directory {
            self.server.update_directory(entry_id, &update).await?
        } else {
            let dir = self.current().require_id()?.clone();
            self.server.update_file(&dir, entry_id, &update).await?
        };
        info!("Renamed {} to {}", entry_id, renamed.name);
        Ok(FileEntry::from(renamed))
    }

    /// Delete an entry through the directory endpoint, file or not.
    ///
    /// # Errors
    /// - Returns error if the server refuses
    pub async fn remove(&self, entry_id: &EntryId) -> Result<()> {
        self.server.delete_directory(entry_id).await?;
        info!("Deleted {}", entry_id);
        Ok(())
    }

    /// Delete every selected entry one at a time, then reload once.
    ///
    /// A failure does not stop the batch; it is recorded in the report, as
    /// is a failed final reload.
    pub async fn delete_selected(&self) -> BatchDeleteReport {
        let mut report = BatchDeleteReport::default();
        for entry in self.selection().iter() {
            match self.remove(&entry.id).await {
                Ok(()) => report.deleted.push(entry.id.clone()),
                Err(error) => {
                    warn!("Failed to delete {}: {}", entry.name, error);
                    report.failed.push(DeleteFailure {
                        id: entry.id.clone(),
                        name: entry.name.clone(),
                        error,
                    });
                }
            }
        }
        if let Err(e) = self.reload().await {
            warn!("Failed to reload after batch delete: {}", e);
            report.reload_error = Some(e);
        }
        report
    }

    /// Select or clear every entry.
    pub fn select_all(&self, selected: bool) {
        let count = {
            let mut state = self.lock();
            let mut model = SelectionModel::new(&mut state.current.entries);
            model.select_all(selected);
            model.selection().len()
        };
        self.events.publish(AppEvent::SelectionChanged { selected: count });
    }

    /// Flip one entry's flag, returning the new value.
    ///
    /// # Errors
    /// - `InvalidInput` if `id` is not in the current directory
    pub fn toggle(&self, id: &EntryId) -> Result<bool> {
        let (selected, count) = {
            let mut state = self.lock();
            let mut model = SelectionModel::new(&mut state.current.entries);
            let selected = model.toggle(id)?;
            (selected, model.selection().len())
        };
        self.events.publish(AppEvent::SelectionChanged { selected: count });
        Ok(selected)
    }

    /// Set one entry's flag.
    ///
    /// # Errors
    /// - `InvalidInput` if `id` is not in the current directory
    pub fn set_selected(&self, id: &EntryId, selected: bool) -> Result<()> {
        let count = {
            let mut state = self.lock();
            let mut model = SelectionModel::new(&mut state.current.entries);
            model.set(id, selected)?;
            model.selection().len()
        };
        self.events.publish(AppEvent::SelectionChanged { selected: count });
        Ok(())
    }
}
