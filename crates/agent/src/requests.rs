//! Pending consent requests.
//!
//! A ledger tracks open requests, each keyed by the platform message that
//! currently displays it. There is at most one open request per recipient:
//! later requests for the same recipient are merged into it. Resolution
//! removes the entry; nothing about resolved requests is retained.
//!
//! The ledger itself does no platform IO. [`crate::consent`] drives it
//! together with the channel.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use lorebot_core::channel::{MessageRef, UserId};
use lorebot_core::error::{Error, ValidationError};
use lorebot_security::{PersistPath, ensure_parent};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// What approving a request does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Add the desired messages to the corpus.
    Corpus,
    /// Add the recipient to the permitting group.
    Permitting,
}

impl LedgerKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Corpus => "corpus requests",
            Self::Permitting => "permitting requests",
        }
    }
}

/// A platform message whose content is waiting to be added to the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredItem {
    pub message: MessageRef,
    pub link: String,
    pub content: String,
}

/// One open request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Whose consent is sought. Never changes once set.
    pub recipient: UserId,
    /// Who asked, in order, without duplicates.
    pub requesters: Vec<UserId>,
    /// What is waiting for approval, in order, without duplicates.
    #[serde(default)]
    pub desired: Vec<DesiredItem>,
    /// The message currently showing this request.
    pub display: MessageRef,
    /// Earlier segments of the display that must be cleaned up on resolution.
    #[serde(default)]
    pub prior_display: Vec<MessageRef>,
}

impl PendingRequest {
    pub fn new(recipient: UserId, requester: UserId, desired: Option<DesiredItem>, display: MessageRef) -> Self {
        Self {
            recipient,
            requesters: vec![requester],
            desired: desired.into_iter().collect(),
            display,
            prior_display: Vec::new(),
        }
    }

    /// Append `requester` and `item` unless already present. Returns whether
    /// anything changed.
    pub fn merge(&mut self, requester: UserId, item: Option<DesiredItem>) -> bool {
        let mut changed = false;
        if !self.requesters.contains(&requester) {
            self.requesters.push(requester);
            changed = true;
        }
        if let Some(item) = item {
            if !self.desired.iter().any(|d| d.message == item.message) {
                self.desired.push(item);
                changed = true;
            }
        }
        changed
    }

    /// Every platform message belonging to this request.
    pub fn all_messages(&self) -> impl Iterator<Item = &MessageRef> {
        self.prior_display.iter().chain(std::iter::once(&self.display))
    }
}

#[derive(Debug)]
pub struct PendingRequestLedger {
    kind: LedgerKind,
    max_pending: usize,
    entries: RwLock<HashMap<MessageRef, PendingRequest>>,
    path: PersistPath,
}

impl PendingRequestLedger {
    pub fn new(kind: LedgerKind, max_pending: usize, path: Option<PathBuf>) -> Self {
        Self {
            kind,
            max_pending,
            entries: RwLock::new(HashMap::new()),
            path: PersistPath::new(path),
        }
    }

    /// Create the ledger, loading `path` if it exists.
    pub fn open(kind: LedgerKind, max_pending: usize, path: Option<PathBuf>) -> Result<Self, Error> {
        let ledger = Self::new(kind, max_pending, path.clone());
        if path.is_some_and(|p| p.exists()) {
            ledger.load(None)?;
        }
        Ok(ledger)
    }

    pub fn kind(&self) -> LedgerKind {
        self.kind
    }

    pub fn get(&self, display: &MessageRef) -> Option<PendingRequest> {
        self.entries.read().get(display).cloned()
    }

    pub fn is_display(&self, message: &MessageRef) -> bool {
        self.entries.read().contains_key(message)
    }

    pub fn find_by_recipient(&self, recipient: UserId) -> Option<PendingRequest> {
        self.entries
            .read()
            .values()
            .find(|r| r.recipient == recipient)
            .cloned()
    }

    pub fn contains_recipient(&self, recipient: UserId) -> bool {
        self.entries.read().values().any(|r| r.recipient == recipient)
    }

    /// Whether another entry can be created.
    pub fn has_capacity(&self) -> bool {
        self.entries.read().len() < self.max_pending
    }

    /// Insert a new entry.
    ///
    /// Fails with `Capacity` when the ledger is full and with a validation
    /// error when the recipient already has an open request.
    pub fn create(&self, request: PendingRequest) -> Result<(), Error> {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_pending {
            return Err(Error::Capacity(format!(
                "{} already holds {} pending requests",
                self.kind.label(),
                self.max_pending
            )));
        }
        if entries.values().any(|r| r.recipient == request.recipient) {
            return Err(ValidationError::ImmutableField("recipient".into()).into());
        }
        info!(
            ledger = self.kind.label(),
            recipient = %request.recipient,
            display = %request.display,
            "Request created"
        );
        entries.insert(request.display, request);
        Ok(())
    }

    /// Merge into the entry displayed by `display`.
    ///
    /// Returns the updated entry and whether it changed, or `None` if there
    /// is no such entry.
    pub fn merge(
        &self,
        display: &MessageRef,
        requester: UserId,
        item: Option<DesiredItem>,
    ) -> Option<(PendingRequest, bool)> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(display)?;
        let changed = entry.merge(requester, item);
        Some((entry.clone(), changed))
    }

    /// Move an entry to a new display message whose earlier segments are
    /// `prior`.
    pub fn redisplay(&self, old: &MessageRef, new: MessageRef, prior: Vec<MessageRef>) -> bool {
        let mut entries = self.entries.write();
        let Some(mut entry) = entries.remove(old) else {
            return false;
        };
        entry.prior_display = prior;
        entry.display = new;
        entries.insert(new, entry);
        true
    }

    /// Remove and return the entry displayed by `display`.
    pub fn take(&self, display: &MessageRef) -> Option<PendingRequest> {
        self.entries.write().remove(display)
    }

    /// Drop `message` from whichever entry lists it as a prior segment.
    pub fn forget_prior(&self, message: &MessageRef) -> bool {
        let mut entries = self.entries.write();
        for entry in entries.values_mut() {
            if let Some(pos) = entry.prior_display.iter().position(|m| m == message) {
                entry.prior_display.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.path.current()
    }

    pub fn save(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let mut records: Vec<PendingRequest> = self.entries.read().values().cloned().collect();
        records.sort_by_key(|r| (r.display.channel_id, r.display.message_id));

        ensure_parent(&path)?;
        std::fs::write(&path, serde_json::to_vec_pretty(&records)?)?;
        info!(ledger = self.kind.label(), path = %path.display(), entries = records.len(), "Requests saved");
        self.path.commit(&path);
        Ok(true)
    }

    /// Replace the ledger from a JSON file, validating it as untrusted input.
    /// On any error the in-memory ledger is left unchanged.
    pub fn load(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let records: Vec<PendingRequest> = serde_json::from_slice(&std::fs::read(&path)?)?;
        let loaded = self.validate(records)?;

        let size = loaded.len();
        *self.entries.write() = loaded;
        info!(ledger = self.kind.label(), path = %path.display(), entries = size, "Requests loaded");
        self.path.commit(&path);
        Ok(true)
    }

    fn validate(&self, records: Vec<PendingRequest>) -> Result<HashMap<MessageRef, PendingRequest>, ValidationError> {
        let mut recipients = HashSet::new();
        let mut messages = HashSet::new();
        let mut out = HashMap::new();
        for record in records {
            if record.requesters.is_empty() {
                return Err(ValidationError::InvalidRecord(format!("request {} has no requesters", record.display)));
            }
            let unique: HashSet<_> = record.requesters.iter().collect();
            if unique.len() != record.requesters.len() {
                return Err(ValidationError::InvalidRecord(format!("request {} repeats a requester", record.display)));
            }
            if self.kind == LedgerKind::Corpus && record.desired.is_empty() {
                return Err(ValidationError::InvalidRecord(format!("request {} has no desired messages", record.display)));
            }
            if !recipients.insert(record.recipient) {
                return Err(ValidationError::InvalidRecord(format!("recipient {} has several open requests", record.recipient)));
            }
            for message in record.all_messages() {
                if !messages.insert(*message) {
                    return Err(ValidationError::InvalidRecord(format!("message {message} belongs to several requests")));
                }
            }
            out.insert(record.display, record);
        }
        if out.len() > self.max_pending {
            return Err(ValidationError::InvalidRecord(format!(
                "{} entries exceed the limit of {}",
                out.len(),
                self.max_pending
            )));
        }
        Ok(out)
    }
}
