//! Access control for lorebot: membership groups and path scoping, plus an audit log.
//!
//! Provides:
//! - **Groups**: persisted blocked / trusted / permitting user sets
//! - **Path validation**: admin save/load confined to the data directory
//! - **Audit logging**: structured record of privileged actions

pub mod audit;
pub mod group;
pub mod path;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use group::MembershipSet;
pub use path::{PathIntent, PathScope, PersistPath, ensure_parent};
