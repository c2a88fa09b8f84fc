//! Build every component from an [`AppConfig`].
//!
//! Components that have a configured path load it if the file exists.
//! Nothing is ever saved automatically.

use std::sync::Arc;

use lorebot_config::AppConfig;
use lorebot_core::channel::Channel;
use lorebot_core::corpus::CorpusIndex;
use lorebot_core::error::Error;
use lorebot_memory::{VectorStore, VectorStoreOptions};
use lorebot_providers::{build_embedder, build_generator};
use lorebot_security::{AuditLogger, MembershipSet, PathScope, TracingSink};
use tracing::info;

use crate::admin::AdminRegistry;
use crate::ask::AskPipeline;
use crate::cache::AnswerCache;
use crate::cooldown::RateLimiter;
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::requests::{LedgerKind, PendingRequestLedger};

/// Everything the orchestrator owns, before a channel is attached.
#[derive(Debug)]
pub struct Components {
    pub ask: AskPipeline,
    pub admin: AdminRegistry,
}

pub async fn build_components(config: &AppConfig) -> Result<Components, Error> {
    let embedder = build_embedder(config)?;

    let corpus: Arc<dyn CorpusIndex> = Arc::new(
        VectorStore::open(
            embedder.clone(),
            VectorStoreOptions {
                min_relevance: config.corpus.min_relevance,
                segment_size: config.corpus.segment_size,
                path: config.corpus.path.clone(),
            },
        )
        .await?,
    );

    let cache = match AnswerCache::from_config(&config.cache, embedder)? {
        Some(cache) => {
            if cache.current_path().is_some_and(|p| p.exists()) {
                cache.load(None)?;
            }
            Some(Arc::new(cache))
        }
        None => None,
    };

    let ask = AskPipeline::new(corpus.clone(), config.corpus.max_results, config.ai.require_context)
        .with_cooldown(RateLimiter::from_config(&config.cooldown)?)
        .with_cache(cache.clone())
        .with_generator(build_generator(config)?);

    let groups = &config.groups;
    let requests = &config.requests;
    let admin = AdminRegistry {
        blocked: Arc::new(MembershipSet::open("blocked", groups.blocked_path.clone())?),
        trusted: Arc::new(MembershipSet::open("trusted", groups.trusted_path.clone())?),
        permitting: Arc::new(MembershipSet::open("permitting", groups.permitting_path.clone())?),
        cache,
        corpus,
        corpus_requests: Arc::new(PendingRequestLedger::open(
            LedgerKind::Corpus,
            requests.max_pending,
            requests.corpus_path.clone(),
        )?),
        permitting_requests: Arc::new(PendingRequestLedger::open(
            LedgerKind::Permitting,
            requests.max_pending,
            requests.permitting_path.clone(),
        )?),
        scope: PathScope::new(config.storage.data_dir.clone()),
    };

    info!(
        corpus_segments = admin.corpus.len().await,
        blocked = admin.blocked.len(),
        trusted = admin.trusted.len(),
        permitting = admin.permitting.len(),
        ai = ask.ai_enabled(),
        "Components ready"
    );
    Ok(Components { ask, admin })
}

/// Build the orchestrator for `channel`, with audit entries mirrored to tracing.
pub async fn build_orchestrator(config: &AppConfig, channel: Arc<dyn Channel>) -> Result<Orchestrator, Error> {
    let Components { ask, admin } = build_components(config).await?;
    let audit = AuditLogger::with_sinks(vec![Box::new(TracingSink)]);
    Ok(Orchestrator::new(
        channel,
        ask,
        admin,
        audit,
        OrchestratorOptions::from(config),
    ))
}
