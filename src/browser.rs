//! Intent-driven navigation over the stored containers.

use std::path::PathBuf;

use crate::catalog::{Catalog, CatalogEntry};
use crate::error::Result;
use crate::session::Intents;
use crate::storage::Storage;

/// What the caller should do after an intent snapshot was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseAction {
    Nothing,
    Moved,
    Play(PathBuf),
    Deleted(String),
    Quit,
}

pub struct Browser {
    catalog: Catalog,
    entries: Vec<CatalogEntry>,
    cursor: usize,
}

impl Browser {
    pub fn open<S: Storage>(storage: &S, catalog: Catalog) -> Result<Self> {
        let entries = catalog.entries(storage)?;
        Ok(Self {
            catalog,
            entries,
            cursor: 0,
        })
    }

    /// Re-list storage, keeping the cursor in range.
    pub fn refresh<S: Storage>(&mut self, storage: &S) -> Result<()> {
        self.entries = self.catalog.entries(storage)?;
        if self.cursor >= self.entries.len() {
            self.cursor = self.entries.len().saturating_sub(1);
        }
        Ok(())
    }

    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn selected(&self) -> Option<&CatalogEntry> {
        self.entries.get(self.cursor)
    }

    /// Apply one snapshot. Stop wins over everything else, then delete,
    /// select, and movement.
    pub fn handle<S: Storage>(&mut self, storage: &S, intents: Intents) -> Result<BrowseAction> {
        if intents.stop {
            return Ok(BrowseAction::Quit);
        }
        if intents.delete {
            let Some(entry) = self.selected() else {
                return Ok(BrowseAction::Nothing);
            };
            let name = entry.name.clone();
            self.catalog.remove(storage, &name)?;
            self.refresh(storage)?;
            return Ok(BrowseAction::Deleted(name));
        }
        if intents.select {
            return Ok(self
                .selected()
                .map_or(BrowseAction::Nothing, |e| BrowseAction::Play(e.path.clone())));
        }

        let len = self.entries.len();
        if len == 0 || intents.up == intents.down {
            return Ok(BrowseAction::Nothing);
        }
        self.cursor = if intents.up {
            (self.cursor + len - 1) % len
        } else {
            (self.cursor + 1) % len
        };
        Ok(BrowseAction::Moved)
    }

    /// `[2/5] REC0002.wav`, or a note that nothing is stored.
    #[must_use]
    pub fn status(&self) -> String {
        self.selected().map_or_else(
            || format!("no recordings in {}", self.catalog.dir().display()),
            |e| format!("[{}/{}] {}", self.cursor + 1, self.entries.len(), e.name),
        )
    }
}
