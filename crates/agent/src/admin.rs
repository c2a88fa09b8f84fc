//! Administrable objects.
//!
//! Admin commands address a closed set of objects ([`AdminObject`]). Each
//! resolves to an [`AdminTarget`] offering the shared size/clear/save/load
//! surface; object-specific operations (group membership, ledger lookups)
//! live on the variants.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lorebot_core::channel::UserId;
use lorebot_core::corpus::CorpusIndex;
use lorebot_core::error::{Error, ValidationError};
use lorebot_core::event::AdminObject;
use lorebot_security::{MembershipSet, PathIntent, PathScope};
use tracing::{info, warn};

use crate::cache::AnswerCache;
use crate::requests::PendingRequestLedger;

/// One administrable object.
#[derive(Clone)]
pub enum AdminTarget {
    Membership(Arc<MembershipSet>),
    Cache(Arc<AnswerCache>),
    Corpus(Arc<dyn CorpusIndex>),
    Ledger(Arc<PendingRequestLedger>),
}

impl AdminTarget {
    pub async fn size(&self) -> usize {
        match self {
            AdminTarget::Membership(group) => group.len(),
            AdminTarget::Cache(cache) => cache.len(),
            AdminTarget::Corpus(corpus) => corpus.len().await,
            AdminTarget::Ledger(ledger) => ledger.len(),
        }
    }

    pub async fn clear(&self) {
        match self {
            AdminTarget::Membership(group) => group.clear(),
            AdminTarget::Cache(cache) => cache.clear(),
            AdminTarget::Corpus(corpus) => corpus.clear().await,
            AdminTarget::Ledger(ledger) => ledger.clear(),
        }
    }

    /// Whether `user` is a member, or has an open request. `None` when the
    /// question makes no sense for this object.
    pub fn contains(&self, user: UserId) -> Option<bool> {
        match self {
            AdminTarget::Membership(group) => Some(group.contains(user)),
            AdminTarget::Ledger(ledger) => Some(ledger.contains_recipient(user)),
            AdminTarget::Cache(_) | AdminTarget::Corpus(_) => None,
        }
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        match self {
            AdminTarget::Membership(group) => group.current_path(),
            AdminTarget::Cache(cache) => cache.current_path(),
            AdminTarget::Corpus(corpus) => corpus.current_path(),
            AdminTarget::Ledger(ledger) => ledger.current_path(),
        }
    }

    pub async fn save(&self, path: Option<&Path>) -> Result<bool, Error> {
        match self {
            AdminTarget::Membership(group) => group.save(path),
            AdminTarget::Cache(cache) => cache.save(path),
            AdminTarget::Corpus(corpus) => Ok(corpus.save(path).await?),
            AdminTarget::Ledger(ledger) => ledger.save(path),
        }
    }

    pub async fn load(&self, path: Option<&Path>) -> Result<bool, Error> {
        match self {
            AdminTarget::Membership(group) => group.load(path),
            AdminTarget::Cache(cache) => cache.load(path),
            AdminTarget::Corpus(corpus) => Ok(corpus.load(path).await?),
            AdminTarget::Ledger(ledger) => ledger.load(path),
        }
    }
}

/// Outcome of a batch over several objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Every object the bot administers, plus the directory admin paths must
/// stay inside.
pub struct AdminRegistry {
    pub blocked: Arc<MembershipSet>,
    pub trusted: Arc<MembershipSet>,
    pub permitting: Arc<MembershipSet>,
    pub cache: Option<Arc<AnswerCache>>,
    pub corpus: Arc<dyn CorpusIndex>,
    pub corpus_requests: Arc<PendingRequestLedger>,
    pub permitting_requests: Arc<PendingRequestLedger>,
    pub scope: PathScope,
}

impl std::fmt::Debug for AdminRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminRegistry")
            .field("blocked", &self.blocked.len())
            .field("trusted", &self.trusted.len())
            .field("permitting", &self.permitting.len())
            .field("cache", &self.cache.as_ref().map(|c| c.len()))
            .field("scope", &self.scope.root())
            .finish()
    }
}

impl AdminRegistry {
    /// Resolve a concrete object. `None` for `All` and for a disabled cache.
    pub fn target(&self, object: AdminObject) -> Option<AdminTarget> {
        Some(match object {
            AdminObject::Blocked => AdminTarget::Membership(self.blocked.clone()),
            AdminObject::Trusted => AdminTarget::Membership(self.trusted.clone()),
            AdminObject::Permitting => AdminTarget::Membership(self.permitting.clone()),
            AdminObject::Cache => AdminTarget::Cache(self.cache.clone()?),
            AdminObject::Corpus => AdminTarget::Corpus(self.corpus.clone()),
            AdminObject::CorpusRequests => AdminTarget::Ledger(self.corpus_requests.clone()),
            AdminObject::PermittingRequests => {
                AdminTarget::Ledger(self.permitting_requests.clone())
            }
            AdminObject::All => return None,
        })
    }

    /// Every existing target `object` stands for.
    pub fn targets(&self, object: AdminObject) -> Vec<(AdminObject, AdminTarget)> {
        object
            .expand()
            .into_iter()
            .filter_map(|o| self.target(o).map(|t| (o, t)))
            .collect()
    }

    /// The group `add`/`remove` may change, if `object` is one.
    pub fn editable_group(&self, object: AdminObject) -> Option<&Arc<MembershipSet>> {
        match object {
            AdminObject::Blocked => Some(&self.blocked),
            AdminObject::Trusted => Some(&self.trusted),
            _ => None,
        }
    }

    /// Sizes of every existing target `object` stands for.
    pub async fn sizes(&self, object: AdminObject) -> Vec<(AdminObject, usize)> {
        let mut out = Vec::new();
        for (o, target) in self.targets(object) {
            out.push((o, target.size().await));
        }
        out
    }

    /// Clear every target; returns how many were cleared.
    pub async fn clear(&self, object: AdminObject) -> usize {
        let targets = self.targets(object);
        for (o, target) in &targets {
            target.clear().await;
            info!(object = %o, "Object cleared");
        }
        targets.len()
    }

    /// Save or load `object`.
    ///
    /// A user-supplied path is checked against the scope first; a violation
    /// returns `Error::Security` before anything is touched. `All` only
    /// works with each object's own path.
    pub async fn persist(
        &self,
        intent: PathIntent,
        object: AdminObject,
        requested: Option<&str>,
    ) -> Result<BatchReport, Error> {
        let targets = self.targets(object);
        if targets.is_empty() {
            return Err(ValidationError::InvalidRecord(format!("{object} is disabled")).into());
        }

        let explicit = match requested.map(str::trim).filter(|p| !p.is_empty()) {
            Some(_) if object == AdminObject::All => {
                return Err(ValidationError::InvalidRecord(
                    "a filepath cannot be combined with All".into(),
                )
                .into());
            }
            Some(requested) => {
                let own = targets[0].1.current_path();
                Some(self.scope.verify(requested, own.as_deref(), intent)?)
            }
            None => None,
        };

        let mut report = BatchReport::default();
        for (o, target) in targets {
            report.attempted += 1;
            let result = match intent {
                PathIntent::Save => target.save(explicit.as_deref()).await,
                PathIntent::Load => target.load(explicit.as_deref()).await,
            };
            match result {
                Ok(true) => {}
                Ok(false) => {
                    warn!(object = %o, ?intent, "No filepath known");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(object = %o, ?intent, error = %e, "Persistence failed");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }
}

/// Parse whitespace- or comma-separated user ids and mentions.
///
/// Returns the ids that parsed and how many tokens did not.
pub fn parse_user_ids(input: &str) -> (Vec<UserId>, usize) {
    let mut ids = Vec::new();
    let mut failed = 0;
    for token in input
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        match token.parse::<UserId>() {
            Ok(id) => ids.push(id),
            Err(_) => failed += 1,
        }
    }
    (ids, failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::LedgerKind;
    use lorebot_core::error::SecurityError;
    use lorebot_memory::{VectorStore, VectorStoreOptions};
    use lorebot_providers::HashEmbedder;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> AdminRegistry {
        let embedder = Arc::new(HashEmbedder::new(16).unwrap());
        let group = |name: &str| {
            Arc::new(MembershipSet::new(
                name,
                Some(dir.path().join(format!("{name}.txt"))),
            ))
        };
        AdminRegistry {
            blocked: group("blocked"),
            trusted: group("trusted"),
            permitting: Arc::new(MembershipSet::new("permitting", None)),
            cache: None,
            corpus: Arc::new(VectorStore::new(embedder, VectorStoreOptions::default()).unwrap()),
            corpus_requests: Arc::new(PendingRequestLedger::new(LedgerKind::Corpus, 5, None)),
            permitting_requests: Arc::new(PendingRequestLedger::new(
                LedgerKind::Permitting,
                5,
                None,
            )),
            scope: PathScope::new(dir.path()),
        }
    }

    #[test]
    fn ids_parse_from_mentions_and_commas() {
        let (ids, failed) = parse_user_ids("<@1>, 2 <@!3> nope");
        assert_eq!(ids, vec![UserId(1), UserId(2), UserId(3)]);
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn all_skips_the_disabled_cache() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let sizes = reg.sizes(AdminObject::All).await;
        assert_eq!(sizes.len(), 6);
        assert!(sizes.iter().all(|(o, _)| *o != AdminObject::Cache));
        assert!(reg.target(AdminObject::Cache).is_none());
    }

    #[tokio::test]
    async fn contains_only_answers_for_groups_and_ledgers() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.blocked.add([UserId(4)]);
        let blocked = reg.target(AdminObject::Blocked).unwrap();
        assert_eq!(blocked.contains(UserId(4)), Some(true));
        let requests = reg.target(AdminObject::CorpusRequests).unwrap();
        assert_eq!(requests.contains(UserId(4)), Some(false));
        assert_eq!(reg.target(AdminObject::Corpus).unwrap().contains(UserId(4)), None);
    }

    #[tokio::test]
    async fn save_all_uses_each_objects_own_path() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.trusted.add([UserId(7)]);

        let report = reg.persist(PathIntent::Save, AdminObject::All, None).await.unwrap();
        assert_eq!(report.attempted, 6);
        // only the two groups have default paths
        assert_eq!(report.failed, 4);
        assert!(dir.path().join("trusted.txt").exists());

        let err = reg
            .persist(PathIntent::Save, AdminObject::All, Some("x.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn explicit_paths_are_scoped() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.blocked.add([UserId(9)]);

        let inside = dir.path().join("backup.txt");
        let report = reg
            .persist(PathIntent::Save, AdminObject::Blocked, inside.to_str())
            .await
            .unwrap();
        assert_eq!(report, BatchReport { attempted: 1, failed: 0 });

        reg.blocked.clear();
        reg.persist(PathIntent::Load, AdminObject::Blocked, inside.to_str())
            .await
            .unwrap();
        assert!(reg.blocked.contains(UserId(9)));

        let err = reg
            .persist(PathIntent::Load, AdminObject::Blocked, Some("/etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Security(SecurityError::OutsideScope(_))));

        let escape = format!("{}/../escape.txt", dir.path().display());
        let err = reg
            .persist(PathIntent::Save, AdminObject::Blocked, Some(&escape))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Security(SecurityError::PathTraversal(_))));
    }

    #[tokio::test]
    async fn clear_all_empties_everything() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.blocked.add([UserId(1)]);
        reg.trusted.add([UserId(2)]);
        assert_eq!(reg.clear(AdminObject::All).await, 6);
        assert!(reg.sizes(AdminObject::All).await.iter().all(|(_, n)| *n == 0));
    }
}
