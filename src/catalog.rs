//! Container naming and the listing of what is already on the volume.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::Deserialize;

use crate::error::{RecorderError, Result};
use crate::storage::Storage;

const EXTENSION: &str = "wav";

/// How new container names are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamingPolicy {
    /// `PREFIX0001.wav`, one past the highest number already present.
    #[default]
    Counter,
    /// `PREFIX20260131-142500-00.wav`, with a suffix bumped on collision.
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub path: PathBuf,
    /// Numeric suffix for counter-style names.
    pub sequence: Option<u64>,
}

pub struct Catalog {
    dir: PathBuf,
    prefix: String,
    policy: NamingPolicy,
    next_sequence: u64,
    taken: BTreeSet<String>,
}

fn is_container(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(EXTENSION))
}

/// Numeric suffix of `PREFIX<digits>.wav`, if the name has that shape.
#[must_use]
pub fn sequence_of(prefix: &str, name: &str) -> Option<u64> {
    if !is_container(name) {
        return None;
    }
    let stem = &name[..name.len() - EXTENSION.len() - 1];
    let digits = stem.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn list_names<S: Storage>(storage: &S, dir: &Path) -> Result<Vec<String>> {
    let entries = match storage.list_entries(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RecorderError::StorageUnavailable {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut names = Vec::new();
    for entry in entries {
        let name = entry.map_err(|source| RecorderError::StorageUnavailable {
            path: dir.to_path_buf(),
            source,
        })?;
        if is_container(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

impl Catalog {
    /// Scan `dir` once so new names never collide with existing containers.
    /// A directory that does not exist yet is an empty catalog.
    pub fn scan<S: Storage>(
        storage: &S,
        dir: &Path,
        prefix: &str,
        policy: NamingPolicy,
    ) -> Result<Self> {
        let names = list_names(storage, dir)?;
        let highest = names.iter().filter_map(|n| sequence_of(prefix, n)).max();

        tracing::debug!(
            "catalog {}: {} containers, highest sequence {highest:?}",
            dir.display(),
            names.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            policy,
            next_sequence: highest.map_or(1, |k| k.saturating_add(1)),
            taken: names.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reserve a fresh container name.
    pub fn next_name(&mut self) -> String {
        self.next_name_at(Local::now().naive_local())
    }

    /// As [`Catalog::next_name`], with the clock supplied by the caller.
    pub fn next_name_at(&mut self, now: NaiveDateTime) -> String {
        let name = match self.policy {
            NamingPolicy::Counter => loop {
                let candidate = format!("{}{:04}.{EXTENSION}", self.prefix, self.next_sequence);
                self.next_sequence = self.next_sequence.saturating_add(1);
                if !self.taken.contains(&candidate) {
                    break candidate;
                }
            },
            NamingPolicy::Timestamp => {
                let stamp = now.format("%Y%m%d-%H%M%S").to_string();
                let mut n = 0u32;
                loop {
                    let candidate = format!("{}{stamp}-{n:02}.{EXTENSION}", self.prefix);
                    if !self.taken.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        self.taken.insert(name.clone());
        name
    }

    pub fn next_path(&mut self) -> PathBuf {
        let name = self.next_name();
        self.dir.join(name)
    }

    /// Path for a user-supplied name; `.wav` is appended when missing.
    #[must_use]
    pub fn path_of(&self, name: &str) -> PathBuf {
        if is_container(name) {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{name}.{EXTENSION}"))
        }
    }

    /// Current containers, sorted by name. Re-lists storage on every call.
    pub fn entries<S: Storage>(&self, storage: &S) -> Result<Vec<CatalogEntry>> {
        Ok(list_names(storage, &self.dir)?
            .into_iter()
            .map(|name| CatalogEntry {
                sequence: sequence_of(&self.prefix, &name),
                path: self.dir.join(&name),
                name,
            })
            .collect())
    }

    /// Delete a container. Its name stays reserved for this process.
    pub fn remove<S: Storage>(&self, storage: &S, name: &str) -> Result<()> {
        let path = self.path_of(name);
        storage
            .remove(&path)
            .map_err(|source| RecorderError::StorageUnavailable {
                path: path.clone(),
                source,
            })?;
        tracing::info!("removed {}", path.display());
        Ok(())
    }
}
