//! CorpusIndex trait: the similarity index over stored text segments.
//!
//! The corpus is append-only from the assistant's point of view: documents
//! are added (possibly split into overlapping segments first) and queried by
//! similarity. Removal is not supported.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A document to add to the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusDocument {
    /// The text content
    pub content: String,

    /// Where the text came from (e.g., a message permalink)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CorpusDocument {
    pub fn new(content: impl Into<String>, source: Option<String>) -> Self {
        Self {
            content: content.into(),
            source,
        }
    }
}

/// A single query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusHit {
    /// The matched segment
    pub content: String,

    /// Source metadata of the segment, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Relevance in `[0, 1]`, higher is better
    pub relevance: f32,
}

/// The core CorpusIndex trait.
///
/// Implementations: the in-process vector store.
#[async_trait]
pub trait CorpusIndex: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Return up to `max_results` segments ordered by descending relevance,
    /// filtered by the index's minimum relevance.
    async fn query(&self, text: &str, max_results: usize) -> Result<Vec<CorpusHit>, MemoryError>;

    /// Add documents; returns how many documents were inserted. Blank
    /// documents are skipped and not counted.
    async fn add(&self, documents: Vec<CorpusDocument>) -> Result<usize, MemoryError>;

    /// Removal is not supported.
    async fn remove(&self, _content: &str) -> Result<usize, MemoryError> {
        Err(MemoryError::Unsupported(format!(
            "corpus '{}' does not support removal",
            self.name()
        )))
    }

    /// Number of stored segments.
    async fn len(&self) -> usize;

    /// Whether the index holds no segments.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every segment.
    async fn clear(&self);

    /// Persist to `path`, or to the most recently used path.
    ///
    /// Returns `Ok(false)` if no path was given and none was ever used.
    async fn save(&self, path: Option<&Path>) -> Result<bool, MemoryError>;

    /// Replace the in-memory contents with those at `path` (or the most
    /// recently used path).
    async fn load(&self, path: Option<&Path>) -> Result<bool, MemoryError>;

    /// The most recently used persistence path.
    fn current_path(&self) -> Option<PathBuf>;
}
