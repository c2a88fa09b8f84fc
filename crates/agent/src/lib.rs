//! The request-admission and answer-caching core of lorebot.
//!
//! An ask flows through:
//!
//! 1. **Cooldown**: the global [`RateLimiter`] admits or refuses the query
//! 2. **Cache**: exact, then semantic lookup in the [`AnswerCache`]
//! 3. **Retrieval**: the corpus returns the most relevant segments
//! 4. **Generation**: the language model answers from that context
//!
//! Additions to the corpus go through the consent workflow: the author of a
//! message must approve before it is stored, unless they already gave
//! blanket permission. The [`Orchestrator`] ties these to platform events
//! and enforces permission tiers.

pub mod admin;
pub mod ask;
pub mod bootstrap;
pub mod cache;
pub mod consent;
pub mod cooldown;
pub mod orchestrator;
pub mod requests;
pub mod texts;

pub use admin::{AdminRegistry, AdminTarget, BatchReport};
pub use ask::{AskOutcome, AskPipeline};
pub use bootstrap::{Components, build_components, build_orchestrator};
pub use cache::AnswerCache;
pub use consent::{CommitReport, ConsentWorkflow, CorpusCommit, PermittingCommit, RequestCommit, Upsert};
pub use cooldown::RateLimiter;
pub use orchestrator::{Orchestrator, OrchestratorOptions, Tier};
pub use requests::{DesiredItem, LedgerKind, PendingRequest, PendingRequestLedger};
