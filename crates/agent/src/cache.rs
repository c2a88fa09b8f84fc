//! Answer cache with exact and semantic lookup.
//!
//! Entries map a query string to its answer and the query's embedding. The
//! cache is bounded (least recently inserted entries are evicted first) and
//! entries expire after a fixed time to live. Reads never refresh an entry.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lorebot_config::CacheConfig;
use lorebot_core::embedding::{Embedder, Embedding};
use lorebot_core::error::{Error, ProviderError, ValidationError};
use lorebot_memory::cosine_similarity;
use lorebot_security::{PersistPath, ensure_parent};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct CacheEntry {
    answer: String,
    embedding: Embedding,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// On-disk form of one entry. Expiry is wall-clock so it survives restarts.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    query: String,
    answer: String,
    embedding: Embedding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

pub struct AnswerCache {
    embedder: Arc<dyn Embedder>,
    ttl: Option<Duration>,
    threshold: f64,
    entries: Mutex<LruCache<String, CacheEntry>>,
    path: PersistPath,
}

impl std::fmt::Debug for AnswerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerCache")
            .field("embedder", &self.embedder.name())
            .field("ttl", &self.ttl)
            .field("threshold", &self.threshold)
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

impl AnswerCache {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        max_size: usize,
        ttl: Option<Duration>,
        semantic_threshold: f64,
    ) -> Result<Self, Error> {
        let capacity = NonZeroUsize::new(max_size)
            .ok_or_else(|| Error::config("Invalid cache maximum size provided: 0"))?;
        if ttl.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("Invalid cache expiration time provided: 0"));
        }
        if !(0.0..=1.0).contains(&semantic_threshold) {
            return Err(Error::config(format!(
                "Invalid semantic similarity threshold provided: {semantic_threshold}"
            )));
        }
        Ok(Self {
            embedder,
            ttl,
            threshold: semantic_threshold,
            entries: Mutex::new(LruCache::new(capacity)),
            path: PersistPath::new(None),
        })
    }

    /// Build the cache from config, or `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig, embedder: Arc<dyn Embedder>) -> Result<Option<Self>, Error> {
        if !config.is_enabled() {
            info!("Answer cache disabled");
            return Ok(None);
        }
        let ttl = config
            .expiration_secs
            .map(|s| {
                Duration::try_from_secs_f64(s).map_err(|e| {
                    Error::config(format!("Invalid cache expiration time provided: {s} ({e})"))
                })
            })
            .transpose()?;
        let max_size = usize::try_from(config.max_size)
            .map_err(|_| Error::config(format!("Invalid cache maximum size provided: {}", config.max_size)))?;
        let mut cache = Self::new(embedder, max_size, ttl, config.semantic_similarity_threshold)?;
        cache.path = PersistPath::new(config.filepath.clone());
        Ok(Some(cache))
    }

    /// Whether semantic lookups can ever hit.
    pub fn semantic_enabled(&self) -> bool {
        self.threshold < 1.0
    }

    pub fn embed_dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        self.embedder.embed(text).await
    }

    /// Look up `query` by exact string equality.
    pub fn exact_match(&self, query: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .lock()
            .peek(query)
            .filter(|e| e.is_live(now))
            .map(|e| e.answer.clone())
    }

    /// Embed `query` and look it up by similarity.
    pub async fn semantic_match(&self, query: &str) -> Result<Option<String>, ProviderError> {
        if !self.semantic_enabled() {
            return Ok(None);
        }
        let embedding = self.embed(query).await?;
        Ok(self.semantic_match_embedding(&embedding))
    }

    /// Return the answer of the live entry most similar to `embedding`, if
    /// that similarity reaches the threshold. Ties go to the oldest entry.
    pub fn semantic_match_embedding(&self, embedding: &[f32]) -> Option<String> {
        if !self.semantic_enabled() {
            return None;
        }
        let now = Instant::now();
        let entries = self.entries.lock();

        let mut best: Option<(f32, &CacheEntry)> = None;
        // iter() runs most recent first; reversed gives insertion order
        for (_, entry) in entries.iter().rev().filter(|(_, e)| e.is_live(now)) {
            let similarity = cosine_similarity(embedding, &entry.embedding);
            if similarity <= best.map_or(0.0, |(s, _)| s) {
                continue;
            }
            best = Some((similarity, entry));
        }

        best.filter(|(s, _)| f64::from(*s) >= self.threshold)
            .map(|(s, e)| {
                debug!(similarity = s, "Semantic cache hit");
                e.answer.clone()
            })
    }

    /// Insert or replace the answer for `query`.
    pub fn insert(&self, query: &str, answer: &str, embedding: Embedding) -> Result<(), ValidationError> {
        if query.is_empty() {
            return Err(ValidationError::Empty("cache key".into()));
        }
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(ValidationError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }
        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, now);
        entries.put(
            query.to_string(),
            CacheEntry {
                answer: answer.to_string(),
                embedding,
                expires_at: self.ttl.map(|t| now + t),
            },
        );
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().iter().filter(|(_, e)| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.path.current()
    }

    /// Write the live entries as JSON. `Ok(false)` when no path is known.
    pub fn save(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let now = Instant::now();
        let wall = Utc::now();
        let persisted: Vec<PersistedEntry> = {
            let entries = self.entries.lock();
            entries
                .iter()
                .rev()
                .filter(|(_, e)| e.is_live(now))
                .map(|(query, e)| PersistedEntry {
                    query: query.clone(),
                    answer: e.answer.clone(),
                    embedding: e.embedding.clone(),
                    expires_at: e.expires_at.and_then(|at| {
                        chrono::Duration::from_std(at.saturating_duration_since(now))
                            .ok()
                            .map(|remaining| wall + remaining)
                    }),
                })
                .collect()
        };

        ensure_parent(&path)?;
        std::fs::write(&path, serde_json::to_vec_pretty(&persisted)?)?;
        info!(path = %path.display(), entries = persisted.len(), "Cache saved");
        self.path.commit(&path);
        Ok(true)
    }

    /// Replace the cache contents from a JSON file.
    ///
    /// The file is untrusted: a wrong-sized embedding rejects the whole load
    /// and leaves the cache untouched. Entries already expired are dropped.
    pub fn load(&self, path: Option<&Path>) -> Result<bool, Error> {
        let Some(path) = self.path.resolve(path) else {
            return Ok(false);
        };
        let persisted: Vec<PersistedEntry> = serde_json::from_slice(&std::fs::read(&path)?)?;

        let expected = self.embedder.dimensions();
        if let Some(bad) = persisted.iter().find(|e| e.embedding.len() != expected) {
            return Err(ValidationError::DimensionMismatch {
                expected,
                actual: bad.embedding.len(),
            }
            .into());
        }

        let now = Instant::now();
        let wall = Utc::now();
        let mut fresh = LruCache::new(self.entries.lock().cap());
        for entry in persisted {
            let expires_at = match entry.expires_at {
                None => None,
                Some(at) if at <= wall => continue,
                Some(at) => Some(now + (at - wall).to_std().unwrap_or_default()),
            };
            fresh.put(
                entry.query,
                CacheEntry {
                    answer: entry.answer,
                    embedding: entry.embedding,
                    expires_at,
                },
            );
        }

        let size = fresh.len();
        *self.entries.lock() = fresh;
        info!(path = %path.display(), entries = size, "Cache loaded");
        self.path.commit(&path);
        Ok(true)
    }
}

fn purge_expired(entries: &mut LruCache<String, CacheEntry>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| !e.is_live(now))
        .map(|(k, _)| k.clone())
        .collect();
    for key in expired {
        entries.pop(&key);
    }
}
