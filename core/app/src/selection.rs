//! Multi-selection over the current directory's entries.

use serde::Serialize;

use filedeck_common::{EntryId, Error, Result};

use crate::directory::FileEntry;

/// The parts of a selected entry the action gate and batch operations need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedEntry {
    pub id: EntryId,
    pub name: String,
    pub is_directory: bool,
    pub parent_id: Option<EntryId>,
}

impl From<&FileEntry> for SelectedEntry {
    fn from(entry: &FileEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            is_directory: entry.is_directory,
            parent_id: entry.parent_id.clone(),
        }
    }
}

/// Snapshot of the selected entries, in listing order.
///
/// Derived from the entry list on demand; never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    entries: Vec<SelectedEntry>,
}

impl Selection {
    pub fn new(entries: Vec<SelectedEntry>) -> Self {
        Self { entries }
    }

    /// Collect the selected entries of `entries`.
    pub fn of(entries: &[FileEntry]) -> Self {
        Self {
            entries: entries
                .iter()
                .filter(|e| e.selected)
                .map(SelectedEntry::from)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The selected entry, if exactly one is selected.
    pub fn single(&self) -> Option<&SelectedEntry> {
        match self.entries.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    /// The selected entry, if exactly one is selected and it is a file.
    pub fn single_file(&self) -> Option<&SelectedEntry> {
        self.single().filter(|e| !e.is_directory)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SelectedEntry> {
        self.entries.iter()
    }
}

/// Mutable view for changing `selected` flags.
///
/// Only entries of the borrowed list can be selected, which keeps every
/// selection inside the current directory.
pub struct SelectionModel<'a> {
    entries: &'a mut [FileEntry],
}

impl<'a> SelectionModel<'a> {
    pub fn new(entries: &'a mut [FileEntry]) -> Self {
        Self { entries }
    }

    /// Set every entry's flag.
    pub fn select_all(&mut self, selected: bool) {
        for entry in self.entries.iter_mut() {
            entry.selected = selected;
        }
    }

    /// Set one entry's flag.
    ///
    /// # Errors
    /// - `InvalidInput` if `id` is not in the list
    pub fn set(&mut self, id: &EntryId, selected: bool) -> Result<()> {
        self.find(id)?.selected = selected;
        Ok(())
    }

    /// Flip one entry's flag, returning the new value.
    ///
    /// # Errors
    /// - `InvalidInput` if `id` is not in the list
    pub fn toggle(&mut self, id: &EntryId) -> Result<bool> {
        let entry = self.find(id)?;
        entry.selected = !entry.selected;
        Ok(entry.selected)
    }

    pub fn selection(&self) -> Selection {
        Selection::of(self.entries)
    }

    fn find(&mut self, id: &EntryId) -> Result<&mut FileEntry> {
        self.entries
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not in the current directory", id)))
    }
}
