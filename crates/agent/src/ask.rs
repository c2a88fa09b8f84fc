//! The ask pipeline: admission, cache, retrieval, generation.
//!
//! ```text
//! query ─▶ cooldown ─▶ exact match ─▶ embed once ─▶ semantic match
//!                                                        │ miss
//!                      reply ◀─ cache insert ◀─ generate ◀─ corpus query
//! ```
//!
//! The query embedding is computed once and reused for both the semantic
//! lookup and the cache insertion. An embedding failure aborts the ask;
//! provider failures are reported to the user and never cached.

use std::sync::Arc;
use std::time::Duration;

use lorebot_core::corpus::{CorpusHit, CorpusIndex};
use lorebot_core::embedding::Embedding;
use lorebot_providers::AnswerGenerator;
use tracing::{debug, info, warn};

use crate::cache::AnswerCache;
use crate::cooldown::RateLimiter;
use crate::texts;

/// How an ask ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// Refused by the rate limiter
    Cooldown(Duration),
    /// Served from the answer cache
    Cached(String),
    /// Nothing relevant in the corpus and context is required
    NoContext,
    /// A fresh answer; `generated` is false when it lists corpus segments
    Answered { answer: String, generated: bool },
    /// A collaborator failed; the text is user-facing
    Failed(String),
}

impl AskOutcome {
    /// The reply to send for this outcome.
    pub fn render(&self, ai_enabled: bool) -> String {
        match self {
            AskOutcome::Cooldown(remaining) => texts::cooldown(remaining.as_secs_f64()),
            AskOutcome::Cached(answer) => texts::cached(answer, ai_enabled),
            AskOutcome::NoContext => texts::NO_CONTEXT.to_string(),
            AskOutcome::Answered {
                answer,
                generated: true,
            } => texts::with_disclaimer(answer),
            AskOutcome::Answered { answer, .. } => answer.clone(),
            AskOutcome::Failed(message) => message.clone(),
        }
    }
}

pub struct AskPipeline {
    corpus: Arc<dyn CorpusIndex>,
    cooldown: Option<RateLimiter>,
    cache: Option<Arc<AnswerCache>>,
    generator: Option<AnswerGenerator>,
    max_results: usize,
    require_context: bool,
}

impl std::fmt::Debug for AskPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AskPipeline")
            .field("corpus", &self.corpus.name())
            .field("cooldown", &self.cooldown)
            .field("cache", &self.cache.is_some())
            .field("generator", &self.generator)
            .field("max_results", &self.max_results)
            .field("require_context", &self.require_context)
            .finish()
    }
}

impl AskPipeline {
    pub fn new(corpus: Arc<dyn CorpusIndex>, max_results: usize, require_context: bool) -> Self {
        Self {
            corpus,
            cooldown: None,
            cache: None,
            generator: None,
            max_results: max_results.max(1),
            require_context,
        }
    }

    pub fn with_cooldown(mut self, cooldown: Option<RateLimiter>) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_cache(mut self, cache: Option<Arc<AnswerCache>>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_generator(mut self, generator: Option<AnswerGenerator>) -> Self {
        self.generator = generator;
        self
    }

    pub fn ai_enabled(&self) -> bool {
        self.generator.is_some()
    }

    pub fn cache(&self) -> Option<&Arc<AnswerCache>> {
        self.cache.as_ref()
    }

    pub fn corpus(&self) -> &Arc<dyn CorpusIndex> {
        &self.corpus
    }

    /// Run one query through the pipeline.
    pub async fn ask(&self, query: &str) -> AskOutcome {
        if let Some(cooldown) = &self.cooldown {
            let remaining = cooldown.check_and_record();
            if !remaining.is_zero() {
                info!(remaining_secs = remaining.as_secs_f64(), "Query refused during cooldown");
                return AskOutcome::Cooldown(remaining);
            }
        }

        let mut embedding: Option<Embedding> = None;
        if let Some(cache) = &self.cache {
            if let Some(answer) = cache.exact_match(query) {
                debug!("Exact cache hit");
                return AskOutcome::Cached(answer);
            }
            let vector = match cache.embed(query).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "Query embedding failed");
                    return AskOutcome::Failed(texts::query_error(&e));
                }
            };
            if let Some(answer) = cache.semantic_match_embedding(&vector) {
                return AskOutcome::Cached(answer);
            }
            embedding = Some(vector);
        }

        let hits = match self.corpus.query(query, self.max_results).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Corpus query failed");
                return AskOutcome::Failed(texts::query_error(&e));
            }
        };
        debug!(hits = hits.len(), "Corpus queried");

        if hits.is_empty() && (self.require_context || self.generator.is_none()) {
            return AskOutcome::NoContext;
        }

        let (answer, generated) = match self.generate(query, &hits).await {
            Ok(answer) => answer,
            Err(message) => return AskOutcome::Failed(message),
        };

        if let (Some(cache), Some(embedding)) = (&self.cache, embedding) {
            if let Err(e) = cache.insert(query, &answer, embedding) {
                warn!(error = %e, "Answer not cached");
            }
        }
        AskOutcome::Answered { answer, generated }
    }

    async fn generate(&self, query: &str, hits: &[CorpusHit]) -> Result<(String, bool), String> {
        let Some(generator) = &self.generator else {
            return Ok((texts::corpus_listing(hits), false));
        };
        let context = (!hits.is_empty()).then(|| texts::model_context(hits));
        match generator.generate(query, context.as_deref()).await {
            Ok(answer) => Ok((answer, true)),
            Err(e) => {
                warn!(provider = generator.provider_name(), error = %e, "Generation failed");
                Err(texts::query_error(&e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lorebot_core::corpus::CorpusDocument;
    use lorebot_core::embedding::Embedder;
    use lorebot_core::error::ProviderError;
    use lorebot_core::message::Message;
    use lorebot_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use lorebot_memory::{VectorStore, VectorStoreOptions};
    use lorebot_providers::{GeneratorOptions, HashEmbedder};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed string, or fails when `answer` is `None`.
    struct Scripted {
        answer: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.answer {
                Some(answer) => Ok(ProviderResponse {
                    message: Message::assistant(answer.clone()),
                    model: request.model,
                    usage: None,
                }),
                None => Err(ProviderError::Timeout("no answer".into())),
            }
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, ProviderError> {
            Err(ProviderError::Network("embedding service down".into()))
        }
    }

    fn embedder() -> Arc<HashEmbedder> {
        Arc::new(HashEmbedder::new(128).unwrap())
    }

    async fn corpus(docs: &[&str]) -> Arc<VectorStore> {
        let store = VectorStore::new(embedder(), VectorStoreOptions::default()).unwrap();
        store
            .add(docs.iter().map(|d| CorpusDocument::new(*d, Some(format!("src:{d}")))).collect())
            .await
            .unwrap();
        Arc::new(store)
    }

    fn generator(answer: Option<&str>) -> (AnswerGenerator, Arc<Scripted>) {
        let provider = Arc::new(Scripted {
            answer: answer.map(str::to_string),
            calls: AtomicUsize::new(0),
        });
        let options = GeneratorOptions {
            model: "test".into(),
            temperature: 0.0,
            system_prompt: "Answer from context.".into(),
            max_input_characters: None,
            max_output_characters: None,
        };
        (AnswerGenerator::new(provider.clone(), options).unwrap(), provider)
    }

    fn cache() -> Arc<AnswerCache> {
        Arc::new(AnswerCache::new(embedder(), 10, None, 0.99).unwrap())
    }

    #[tokio::test]
    async fn generated_answer_is_cached_and_reused() {
        let (answerer, provider) = generator(Some("The tower fell."));
        let pipeline = AskPipeline::new(corpus(&["the tower fell in the third age"]).await, 4, true)
            .with_cache(Some(cache()))
            .with_generator(Some(answerer));

        let first = pipeline.ask("when did the tower fall").await;
        assert_eq!(
            first,
            AskOutcome::Answered {
                answer: "The tower fell.".into(),
                generated: true
            }
        );
        let second = pipeline.ask("when did the tower fall").await;
        assert_eq!(second, AskOutcome::Cached("The tower fell.".into()));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(second.render(true).ends_with(texts::AI_DISCLAIMER));
    }

    #[tokio::test]
    async fn empty_corpus_requires_context() {
        let (answerer, provider) = generator(Some("made up"));
        let store = Arc::new(VectorStore::new(embedder(), VectorStoreOptions::default()).unwrap());
        let pipeline = AskPipeline::new(store, 4, true).with_generator(Some(answerer));
        assert_eq!(pipeline.ask("anything").await, AskOutcome::NoContext);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn context_optional_still_generates() {
        let (answerer, _) = generator(Some("general answer"));
        let store = Arc::new(VectorStore::new(embedder(), VectorStoreOptions::default()).unwrap());
        let pipeline = AskPipeline::new(store, 4, false).with_generator(Some(answerer));
        assert!(matches!(pipeline.ask("anything").await, AskOutcome::Answered { generated: true, .. }));
    }

    #[tokio::test]
    async fn without_ai_the_segments_are_listed() {
        let pipeline = AskPipeline::new(corpus(&["dragons hoard gold"]).await, 4, true);
        let AskOutcome::Answered { answer, generated } = pipeline.ask("dragons hoard gold").await else {
            panic!("expected a listing");
        };
        assert!(!generated);
        assert!(answer.contains("src:dragons hoard gold _(relevance estimate **"));
        assert!(!AskOutcome::Answered { answer, generated }.render(false).contains("-#"));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_and_not_cached() {
        let (answerer, provider) = generator(None);
        let c = cache();
        let pipeline = AskPipeline::new(corpus(&["lore"]).await, 4, false)
            .with_cache(Some(c.clone()))
            .with_generator(Some(answerer));

        let AskOutcome::Failed(message) = pipeline.ask("lore").await else {
            panic!("expected failure");
        };
        assert!(message.starts_with("Error generating response:"));
        assert!(c.is_empty());
        pipeline.ask("lore").await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_generation() {
        let (answerer, provider) = generator(Some("unused"));
        let broken = Arc::new(AnswerCache::new(Arc::new(BrokenEmbedder), 10, None, 0.9).unwrap());
        let pipeline = AskPipeline::new(corpus(&["lore"]).await, 4, false)
            .with_cache(Some(broken))
            .with_generator(Some(answerer));

        assert!(matches!(pipeline.ask("lore").await, AskOutcome::Failed(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_checked_first() {
        let (answerer, provider) = generator(Some("answer"));
        let limiter = RateLimiter::new(Duration::from_secs(120), Duration::from_secs(20), 1).unwrap();
        let pipeline = AskPipeline::new(corpus(&["lore"]).await, 4, false)
            .with_cooldown(Some(limiter))
            .with_generator(Some(answerer));

        assert!(matches!(pipeline.ask("lore").await, AskOutcome::Answered { .. }));
        let refused = pipeline.ask("lore").await;
        assert_eq!(refused, AskOutcome::Cooldown(Duration::from_secs(120)));
        assert!(refused.render(true).contains("(120 seconds remaining)"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}
