//! In-process vector store backing the corpus index.
//!
//! Documents are split into overlapping, sentence-aligned segments, embedded
//! once, and kept in memory. Queries embed the query text and rank segments
//! by cosine similarity. Persistence is JSON-lines, one segment per line,
//! written only when explicitly asked.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lorebot_core::corpus::{CorpusDocument, CorpusHit, CorpusIndex};
use lorebot_core::embedding::{Embedder, Embedding};
use lorebot_core::error::{MemoryError, ValidationError};
use lorebot_core::text::split_into_sentences;
use lorebot_security::path::{PersistPath, ensure_parent};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::vector::rank_by_similarity;

/// One stored, embedded segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSegment {
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    embedding: Embedding,
}

/// Options for a [`VectorStore`].
#[derive(Debug, Clone)]
pub struct VectorStoreOptions {
    /// Minimum relevance in `[0, 1]` for a segment to be returned
    pub min_relevance: f32,

    /// Target segment size in characters; `None` stores documents whole
    pub segment_size: Option<usize>,

    /// Default persistence path
    pub path: Option<PathBuf>,
}

impl Default for VectorStoreOptions {
    fn default() -> Self {
        Self {
            min_relevance: 0.0,
            segment_size: None,
            path: None,
        }
    }
}

pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    segments: RwLock<Vec<StoredSegment>>,
    min_relevance: f32,
    segment_size: Option<usize>,
    path: PersistPath,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("embedder", &self.embedder.name())
            .field("min_relevance", &self.min_relevance)
            .field("segment_size", &self.segment_size)
            .field("path", &self.path.current())
            .finish()
    }
}

impl VectorStore {
    /// Create an empty store.
    pub fn new(embedder: Arc<dyn Embedder>, options: VectorStoreOptions) -> lorebot_core::Result<Self> {
        if !(0.0..=1.0).contains(&options.min_relevance) {
            return Err(lorebot_core::Error::config(format!(
                "Invalid minimum relevance provided: {}",
                options.min_relevance
            )));
        }
        if options.segment_size == Some(0) {
            return Err(lorebot_core::Error::config("Invalid segment size provided: 0"));
        }
        Ok(Self {
            embedder,
            segments: RwLock::new(Vec::new()),
            min_relevance: options.min_relevance,
            segment_size: options.segment_size,
            path: PersistPath::new(options.path),
        })
    }

    /// Create a store and load its default path if that file exists.
    pub async fn open(embedder: Arc<dyn Embedder>, options: VectorStoreOptions) -> lorebot_core::Result<Self> {
        let existing = options.path.clone().filter(|p| p.exists());
        let store = Self::new(embedder, options)?;
        if let Some(path) = existing {
            store.load(Some(&path)).await?;
        }
        Ok(store)
    }

    fn segment(&self, text: &str) -> Vec<String> {
        let pieces = match self.segment_size {
            Some(size) => split_into_sentences(text, size, true),
            None => vec![text.to_string()],
        };
        pieces.into_iter().filter(|p| !p.trim().is_empty()).collect()
    }

    fn read_segments(&self, path: &Path) -> Result<Vec<StoredSegment>, MemoryError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Storage(format!("Failed to read corpus file: {e}")))?;
        let dimensions = self.embedder.dimensions();

        let mut segments = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredSegment>(line) {
                Ok(segment) if segment.embedding.len() == dimensions => segments.push(segment),
                Ok(segment) => {
                    let err = ValidationError::DimensionMismatch {
                        expected: dimensions,
                        actual: segment.embedding.len(),
                    };
                    warn!(line = line_no + 1, error = %err, "Skipping corpus segment");
                }
                Err(e) => warn!(line = line_no + 1, error = %e, "Skipping corrupted corpus segment"),
            }
        }
        Ok(segments)
    }
}

#[async_trait]
impl CorpusIndex for VectorStore {
    fn name(&self) -> &str {
        "vector_store"
    }

    async fn query(&self, text: &str, max_results: usize) -> Result<Vec<CorpusHit>, MemoryError> {
        let embedding = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;

        let segments = self.segments.read().await;
        let ranked = rank_by_similarity(
            segments.iter().map(|s| (s.embedding.as_slice(), s)),
            &embedding,
            max_results,
            self.min_relevance,
        );
        debug!(candidates = segments.len(), returned = ranked.len(), "Corpus queried");

        Ok(ranked
            .into_iter()
            .map(|(relevance, s)| CorpusHit {
                content: s.content.clone(),
                source: s.source.clone(),
                relevance,
            })
            .collect())
    }

    async fn add(&self, documents: Vec<CorpusDocument>) -> Result<usize, MemoryError> {
        let mut texts = Vec::new();
        let mut sources = Vec::new();
        let mut inserted = 0;
        for doc in &documents {
            let before = texts.len();
            for segment in self.segment(&doc.content) {
                texts.push(segment);
                sources.push(doc.source.clone());
            }
            if texts.len() > before {
                inserted += 1;
            }
        }
        if texts.is_empty() {
            return Ok(0);
        }

        // Embed before taking the lock.
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| MemoryError::EmbeddingFailed(e.to_string()))?;
        if embeddings.len() != texts.len() {
            return Err(MemoryError::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }

        let added = texts.len();
        let mut segments = self.segments.write().await;
        segments.extend(
            texts
                .into_iter()
                .zip(sources)
                .zip(embeddings)
                .map(|((content, source), embedding)| StoredSegment {
                    content,
                    source,
                    embedding,
                }),
        );
        info!(documents = inserted, segments = added, total = segments.len(), "Corpus extended");
        Ok(inserted)
    }

    async fn len(&self) -> usize {
        self.segments.read().await.len()
    }

    async fn clear(&self) {
        self.segments.write().await.clear();
    }

    async fn save(&self, path: Option<&Path>) -> Result<bool, MemoryError> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };

        let segments = self.segments.read().await;
        let mut content = String::new();
        for segment in segments.iter() {
            let line = serde_json::to_string(segment)
                .map_err(|e| MemoryError::Storage(format!("Failed to serialize segment: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        ensure_parent(&path)
            .map_err(|e| MemoryError::Storage(format!("Failed to create corpus directory: {e}")))?;
        std::fs::write(&path, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write corpus file: {e}")))?;
        info!(path = %path.display(), segments = segments.len(), "Corpus saved");
        self.path.commit(&path);
        Ok(true)
    }

    async fn load(&self, path: Option<&Path>) -> Result<bool, MemoryError> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let loaded = self.read_segments(&path)?;
        let count = loaded.len();
        *self.segments.write().await = loaded;
        info!(path = %path.display(), segments = count, "Corpus loaded");
        self.path.commit(&path);
        Ok(true)
    }

    fn current_path(&self) -> Option<PathBuf> {
        self.path.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorebot_core::error::ProviderError;

    /// Embeds by counting a few marker words, so similarity is predictable.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
            let lower = text.to_lowercase();
            Ok(["cache", "cooldown", "corpus"]
                .iter()
                .map(|w| lower.matches(w).count() as f32)
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            3
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, ProviderError> {
            Err(ProviderError::Network("offline".into()))
        }
    }

    fn store(options: VectorStoreOptions) -> VectorStore {
        VectorStore::new(Arc::new(KeywordEmbedder), options).unwrap()
    }

    #[test]
    fn invalid_options_rejected() {
        let bad = VectorStoreOptions {
            min_relevance: 1.5,
            ..Default::default()
        };
        assert!(VectorStore::new(Arc::new(KeywordEmbedder), bad).is_err());
        let bad = VectorStoreOptions {
            segment_size: Some(0),
            ..Default::default()
        };
        assert!(VectorStore::new(Arc::new(KeywordEmbedder), bad).is_err());
    }

    #[tokio::test]
    async fn query_ranks_by_relevance_with_sources() {
        let store = store(VectorStoreOptions {
            min_relevance: 0.5,
            ..Default::default()
        });
        let added = store
            .add(vec![
                CorpusDocument::new("The cache stores answers", Some("link-1".into())),
                CorpusDocument::new("The cooldown limits queries", None),
                CorpusDocument::new("cache and cooldown together", None),
            ])
            .await
            .unwrap();
        assert_eq!(added, 3);

        let hits = store.query("how does the cache work", 4).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "The cache stores answers");
        assert_eq!(hits[0].source.as_deref(), Some("link-1"));
        assert!((hits[0].relevance - 1.0).abs() < 1e-6);
        assert!(hits[1].relevance < hits[0].relevance);
    }

    #[tokio::test]
    async fn long_documents_are_segmented() {
        let store = store(VectorStoreOptions {
            segment_size: Some(40),
            ..Default::default()
        });
        let text = "The cache is bounded. The cooldown is sliding. The corpus is append only. \
                    Requests wait for consent before anything is added.";
        let added = store
            .add(vec![CorpusDocument::new(text, Some("src".into()))])
            .await
            .unwrap();
        assert_eq!(added, 1);
        assert!(store.len().await > 1);
    }

    #[tokio::test]
    async fn blank_documents_add_nothing() {
        let store = store(VectorStoreOptions::default());
        assert_eq!(store.add(vec![CorpusDocument::new("   ", None)]).await.unwrap(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn embedding_failure_is_reported() {
        let store = VectorStore::new(Arc::new(FailingEmbedder), VectorStoreOptions::default()).unwrap();
        let err = store.query("anything", 4).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
        let err = store
            .add(vec![CorpusDocument::new("text", None)])
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingFailed(_)));
    }

    #[tokio::test]
    async fn removal_is_unsupported() {
        let store = store(VectorStoreOptions::default());
        let err = store.remove("anything").await.unwrap_err();
        assert!(matches!(err, MemoryError::Unsupported(_)));
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus").join("segments.jsonl");

        let store1 = store(VectorStoreOptions::default());
        assert!(!store1.save(None).await.unwrap());
        store1
            .add(vec![CorpusDocument::new("cache entry", Some("s".into()))])
            .await
            .unwrap();
        assert!(store1.save(Some(&path)).await.unwrap());

        let store2 = store(VectorStoreOptions {
            path: Some(path.clone()),
            ..Default::default()
        });
        store2.add(vec![CorpusDocument::new("cooldown", None)]).await.unwrap();
        assert!(store2.load(None).await.unwrap());
        assert_eq!(store2.len().await, 1);
        let hits = store2.query("cache", 1).await.unwrap();
        assert_eq!(hits[0].source.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn load_skips_corrupt_and_mismatched_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        std::fs::write(
            &path,
            "{\"content\":\"ok\",\"embedding\":[1.0,0.0,0.0]}\n\
             not json\n\
             {\"content\":\"short\",\"embedding\":[1.0]}\n",
        )
        .unwrap();

        let store = VectorStore::open(
            Arc::new(KeywordEmbedder),
            VectorStoreOptions {
                path: Some(path),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(store.len().await, 1);
    }
}
