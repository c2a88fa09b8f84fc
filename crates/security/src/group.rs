//! Membership sets: persisted lists of platform user ids.
//!
//! Used for the blocked, trusted, and permitting groups. Mutations are
//! idempotent: adding a member twice is a no-op that still counts as
//! processed. Persistence is one decimal id per line, replaced wholesale on
//! load.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use lorebot_core::UserId;
use lorebot_core::error::{Error, ValidationError};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::path::{PersistPath, ensure_parent};

/// A named, persisted set of user ids.
#[derive(Debug)]
pub struct MembershipSet {
    name: String,
    members: RwLock<HashSet<UserId>>,
    path: PersistPath,
}

impl MembershipSet {
    /// An empty set that will persist to `path` by default.
    pub fn new(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            members: RwLock::new(HashSet::new()),
            path: PersistPath::new(path),
        }
    }

    /// Create the set and load it from `path` if that file exists.
    pub fn open(name: impl Into<String>, path: Option<PathBuf>) -> Result<Self, Error> {
        let set = Self::new(name, path.clone());
        if let Some(path) = path.filter(|p| p.exists()) {
            set.load(Some(&path))?;
        }
        Ok(set)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add every id; returns how many were processed.
    pub fn add(&self, ids: impl IntoIterator<Item = UserId>) -> usize {
        let mut members = self.members.write();
        let mut processed = 0;
        for id in ids {
            members.insert(id);
            processed += 1;
        }
        debug!(group = %self.name, processed, size = members.len(), "Members added");
        processed
    }

    /// Remove every id; returns how many were processed.
    pub fn remove(&self, ids: impl IntoIterator<Item = UserId>) -> usize {
        let mut members = self.members.write();
        let mut processed = 0;
        for id in ids {
            members.remove(&id);
            processed += 1;
        }
        debug!(group = %self.name, processed, size = members.len(), "Members removed");
        processed
    }

    pub fn contains(&self, id: UserId) -> bool {
        self.members.read().contains(&id)
    }

    pub fn clear(&self) {
        self.members.write().clear();
    }

    pub fn len(&self) -> usize {
        self.members.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.read().is_empty()
    }

    /// Members in ascending order.
    pub fn members(&self) -> Vec<UserId> {
        let mut out: Vec<_> = self.members.read().iter().copied().collect();
        out.sort();
        out
    }

    /// The most recently used persistence path.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.path.current()
    }

    /// Write the set to `path` (or the last-used path), overwriting it.
    ///
    /// Returns `Ok(false)` when no path was given and none was ever used.
    pub fn save(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let content: String = self
            .members()
            .iter()
            .map(|id| format!("{id}\n"))
            .collect();
        ensure_parent(&path)?;
        std::fs::write(&path, content)?;
        info!(group = %self.name, path = %path.display(), size = self.len(), "Group saved");
        self.path.commit(&path);
        Ok(true)
    }

    /// Replace the set with the contents of `path` (or the last-used path).
    ///
    /// Every line is parsed before anything changes; one malformed line
    /// rejects the whole file. Returns `Ok(false)` when no path is known.
    pub fn load(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let content = std::fs::read_to_string(&path)?;
        let parsed = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.parse::<u64>()
                    .map(UserId)
                    .map_err(|_| ValidationError::InvalidId(line.to_string()))
            })
            .collect::<Result<HashSet<_>, _>>()?;

        let size = parsed.len();
        *self.members.write() = parsed;
        info!(group = %self.name, path = %path.display(), size, "Group loaded");
        self.path.commit(&path);
        Ok(true)
    }
}
