//! Audit logging: a structured record of privileged actions.
//!
//! Every trusted/owner command outcome, path-scope denial, and automatic
//! trust revocation is recorded here in addition to the normal tracing
//! output, so operators can review who changed what.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use lorebot_core::UserId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: UserId,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Refused for lack of privilege
    CommandDenied { command: String },
    /// A trusted or owner command ran
    CommandExecuted { command: String },
    /// A save/load path fell outside the data directory
    PathDenied { path: String },
    /// Automatic demotion from the trusted group
    TrustRevoked,
    RequestResolved { approved: bool },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Somewhere audit entries are forwarded as they are recorded.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Bounded in-memory audit history, mirrored to any number of sinks.
pub struct AuditLogger {
    history: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("len", &self.count())
            .field("capacity", &self.capacity)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_CAPACITY,
            sinks,
        }
    }

    pub fn log(&self, event: AuditEvent, actor: UserId, outcome: AuditOutcome, details: Option<String>) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor,
            outcome,
            details,
        };
        self.sinks.iter().for_each(|sink| sink.record(&entry));

        let mut history = self.history.lock();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.history.lock().len()
    }
}

/// Mirrors entries into the tracing output; denials log at `warn`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        let details = entry.details.as_deref().unwrap_or_default();
        match entry.outcome {
            AuditOutcome::Denied => warn!(
                target: "lorebot::audit",
                event = ?entry.event,
                actor = %entry.actor,
                details,
                "Denied"
            ),
            outcome => info!(
                target: "lorebot::audit",
                event = ?entry.event,
                actor = %entry.actor,
                ?outcome,
                details,
                "Audited"
            ),
        }
    }
}
