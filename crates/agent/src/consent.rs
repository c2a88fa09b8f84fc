//! Consent workflow: drives a [`PendingRequestLedger`] together with the
//! platform messages that display its requests.
//!
//! ```text
//! no request ──upsert──▶ pending ──upsert──▶ pending (merged, display edited)
//!                           │
//!                        resolve ──▶ committed or dropped, display deleted
//! ```
//!
//! Upserts for one recipient are serialized by a per-recipient gate, so at
//! most one entry per recipient can ever be created.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lorebot_channels::{edit_within_limit, reply_within_limit};
use lorebot_core::channel::{Channel, MessageRef, UserId};
use lorebot_core::corpus::{CorpusDocument, CorpusIndex};
use lorebot_core::error::Error;
use lorebot_security::MembershipSet;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::requests::{DesiredItem, LedgerKind, PendingRequest, PendingRequestLedger};
use crate::texts::{self, ACKNOWLEDGE_EMOJI, APPROVE_EMOJI, REJECT_EMOJI};

/// How long an approved display stays visible before it is deleted.
pub const APPROVAL_DELAY: Duration = Duration::from_millis(750);

/// Result of a commit: how many items were attempted and how many stuck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub attempted: usize,
    pub committed: usize,
}

impl CommitReport {
    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.committed)
    }

    fn into_result(self) -> Result<Self, Error> {
        match self.failed() {
            0 => Ok(self),
            failed => Err(Error::PartialFailure {
                failed,
                attempted: self.attempted,
            }),
        }
    }
}

/// What approving a request does.
#[async_trait]
pub trait RequestCommit: Send + Sync {
    /// Apply the request. Failures are counted, never raised.
    async fn commit(&self, request: &PendingRequest) -> CommitReport;
}

/// Adds every desired message to the corpus, sourced by its link.
pub struct CorpusCommit {
    corpus: Arc<dyn CorpusIndex>,
}

impl CorpusCommit {
    pub fn new(corpus: Arc<dyn CorpusIndex>) -> Self {
        Self { corpus }
    }
}

#[async_trait]
impl RequestCommit for CorpusCommit {
    async fn commit(&self, request: &PendingRequest) -> CommitReport {
        let documents: Vec<CorpusDocument> = request
            .desired
            .iter()
            .map(|d| CorpusDocument::new(d.content.clone(), Some(d.link.clone())))
            .collect();
        let attempted = documents.len();
        let committed = match self.corpus.add(documents).await {
            Ok(n) => n,
            Err(e) => {
                warn!(recipient = %request.recipient, error = %e, "Corpus commit failed");
                0
            }
        };
        CommitReport {
            attempted,
            committed,
        }
    }
}

/// Adds the recipient to the permitting group.
pub struct PermittingCommit {
    group: Arc<MembershipSet>,
}

impl PermittingCommit {
    pub fn new(group: Arc<MembershipSet>) -> Self {
        Self { group }
    }
}

#[async_trait]
impl RequestCommit for PermittingCommit {
    async fn commit(&self, request: &PendingRequest) -> CommitReport {
        CommitReport {
            attempted: 1,
            committed: self.group.add([request.recipient]),
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new display was sent
    Created(MessageRef),
    /// The existing display was edited
    Merged(MessageRef),
    /// The requester and item were already part of the request
    Unchanged(MessageRef),
}

impl Upsert {
    pub fn display(&self) -> MessageRef {
        match self {
            Upsert::Created(m) | Upsert::Merged(m) | Upsert::Unchanged(m) => *m,
        }
    }
}

pub struct ConsentWorkflow {
    ledger: Arc<PendingRequestLedger>,
    template: &'static str,
    commit: Arc<dyn RequestCommit>,
    gates: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    approval_delay: Duration,
}

impl std::fmt::Debug for ConsentWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsentWorkflow")
            .field("ledger", &self.ledger.kind())
            .field("pending", &self.ledger.len())
            .field("approval_delay", &self.approval_delay)
            .finish()
    }
}

impl ConsentWorkflow {
    pub fn new(
        ledger: Arc<PendingRequestLedger>,
        template: &'static str,
        commit: Arc<dyn RequestCommit>,
    ) -> Self {
        Self {
            ledger,
            template,
            commit,
            gates: Mutex::new(HashMap::new()),
            approval_delay: APPROVAL_DELAY,
        }
    }

    /// The corpus-request workflow.
    pub fn corpus(ledger: Arc<PendingRequestLedger>, corpus: Arc<dyn CorpusIndex>) -> Self {
        debug_assert_eq!(ledger.kind(), LedgerKind::Corpus);
        Self::new(ledger, texts::CORPUS_REQUEST, Arc::new(CorpusCommit::new(corpus)))
    }

    /// The blanket-permission workflow.
    pub fn permitting(ledger: Arc<PendingRequestLedger>, group: Arc<MembershipSet>) -> Self {
        debug_assert_eq!(ledger.kind(), LedgerKind::Permitting);
        Self::new(
            ledger,
            texts::PERMISSION_REQUEST,
            Arc::new(PermittingCommit::new(group)),
        )
    }

    pub fn with_approval_delay(mut self, delay: Duration) -> Self {
        self.approval_delay = delay;
        self
    }

    pub fn ledger(&self) -> &Arc<PendingRequestLedger> {
        &self.ledger
    }

    fn gate(&self, recipient: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.gates.lock();
        gates.retain(|_, gate| Arc::strong_count(gate) > 1);
        gates.entry(recipient).or_default().clone()
    }

    /// Ask `recipient` for consent on behalf of `requester`.
    ///
    /// Merges into the recipient's open request if there is one, editing its
    /// display in place. Otherwise replies to `anchor` with a new display,
    /// reacts with the approve and reject emblems, and records the entry.
    pub async fn upsert(
        &self,
        channel: &dyn Channel,
        anchor: &MessageRef,
        recipient: UserId,
        requester: UserId,
        item: Option<DesiredItem>,
    ) -> Result<Upsert, Error> {
        let gate = self.gate(recipient);
        let _guard = gate.lock().await;

        let merged = self
            .ledger
            .find_by_recipient(recipient)
            .and_then(|existing| self.ledger.merge(&existing.display, requester, item.clone()));
        if let Some((request, changed)) = merged {
            if !changed {
                debug!(recipient = %recipient, requester = %requester, "Request already covers this");
                return Ok(Upsert::Unchanged(request.display));
            }
            let text = texts::render_request(self.template, &request);
            let chain: Vec<MessageRef> = request.all_messages().copied().collect();
            let sent = edit_within_limit(channel, &chain, &text).await?;
            let display = self.relocate(channel, request.display, sent).await;
            info!(
                ledger = self.ledger.kind().label(),
                recipient = %recipient,
                requesters = request.requesters.len(),
                desired = request.desired.len(),
                "Request merged"
            );
            return Ok(Upsert::Merged(display));
        }

        if !self.ledger.has_capacity() {
            return Err(Error::Capacity(format!(
                "{} is full",
                self.ledger.kind().label()
            )));
        }

        let mut request = PendingRequest::new(recipient, requester, item, *anchor);
        let text = texts::render_request(self.template, &request);
        let sent = reply_within_limit(channel, anchor, &text).await?;
        let Some((display, prior)) = sent.split_last() else {
            return Err(Error::Internal("display message was not sent".into()));
        };
        request.display = *display;
        request.prior_display = prior.to_vec();

        if let Err(e) = self.ledger.create(request) {
            for message in &sent {
                delete_quietly(channel, message).await;
            }
            return Err(e);
        }
        react_controls(channel, display).await;
        Ok(Upsert::Created(*display))
    }

    /// Re-key an entry whose rewritten display now ends on another message.
    async fn relocate(&self, channel: &dyn Channel, old: MessageRef, chain: Vec<MessageRef>) -> MessageRef {
        let Some((&display, prior)) = chain.split_last() else {
            return old;
        };
        if display == old {
            return old;
        }
        self.ledger.redisplay(&old, display, prior.to_vec());
        react_controls(channel, &display).await;
        display
    }

    /// Answer the request displayed by `display`.
    ///
    /// Returns `Ok(None)` when no such request is open. On approval the
    /// request is committed before cleanup; a partial commit is reported as
    /// `Error::PartialFailure` once cleanup has finished.
    pub async fn resolve(
        &self,
        channel: &dyn Channel,
        display: &MessageRef,
        approved: bool,
    ) -> Result<Option<PendingRequest>, Error> {
        let Some(pending) = self.ledger.get(display) else {
            return Ok(None);
        };
        let gate = self.gate(pending.recipient);
        let _guard = gate.lock().await;
        let Some(request) = self.ledger.take(display) else {
            return Ok(None);
        };

        let report = if approved {
            Some(self.commit.commit(&request).await)
        } else {
            None
        };
        info!(
            ledger = self.ledger.kind().label(),
            recipient = %request.recipient,
            approved,
            "Request resolved"
        );

        for message in &request.prior_display {
            delete_quietly(channel, message).await;
        }
        if approved {
            if let Err(e) = channel.add_reaction(&request.display, ACKNOWLEDGE_EMOJI).await {
                debug!(error = %e, "Could not acknowledge approval");
            }
            tokio::time::sleep(self.approval_delay).await;
        }
        delete_quietly(channel, &request.display).await;

        match report {
            Some(report) => report.into_result().map(|_| Some(request)),
            None => Ok(Some(request)),
        }
    }

    /// Commit without asking: the recipient already consented, or asked for
    /// it themselves. No ledger entry or display is involved.
    pub async fn commit_direct(
        &self,
        recipient: UserId,
        requester: UserId,
        item: Option<DesiredItem>,
    ) -> Result<CommitReport, Error> {
        let request = PendingRequest::new(recipient, requester, item, MessageRef::new(0, 0));
        let report = self.commit.commit(&request).await;
        info!(
            ledger = self.ledger.kind().label(),
            recipient = %recipient,
            committed = report.committed,
            "Request auto-approved"
        );
        report.into_result()
    }

    /// Re-sync after the platform deleted `message`.
    ///
    /// A deleted display drops its request and deletes the request's other
    /// segments; a deleted prior segment is simply forgotten.
    pub async fn forget_message(&self, channel: &dyn Channel, message: &MessageRef) -> bool {
        if let Some(request) = self.ledger.take(message) {
            info!(
                ledger = self.ledger.kind().label(),
                recipient = %request.recipient,
                "Display deleted, request dropped"
            );
            for prior in &request.prior_display {
                delete_quietly(channel, prior).await;
            }
            return true;
        }
        self.ledger.forget_prior(message)
    }
}

async fn react_controls(channel: &dyn Channel, display_ref: &MessageRef) {
    for emoji in [APPROVE_EMOJI, REJECT_EMOJI] {
        if let Err(e) = channel.add_reaction(display_ref, emoji).await {
            warn!(message = %display_ref, error = %e, "Could not add control reaction");
        }
    }
}

async fn delete_quietly(channel: &dyn Channel, message: &MessageRef) {
    if let Err(e) = channel.delete(message).await {
        debug!(message = %message, error = %e, "Delete skipped");
    }
}
