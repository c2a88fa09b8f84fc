//! Embedder trait: text to fixed-dimension vectors.
//!
//! One embedder instance is constructed at startup and injected into every
//! component that compares texts by meaning (the answer cache and the
//! corpus index), so all stored vectors share one dimensionality.

use async_trait::async_trait;

use crate::error::ProviderError;

/// An embedding vector.
pub type Embedding = Vec<f32>;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// A human-readable name (e.g., "hash", "openai").
    fn name(&self) -> &str;

    /// Dimensionality of every vector this embedder returns.
    fn dimensions(&self) -> usize;

    /// Embed a single text. Same text, same vector.
    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;

    /// Embed several texts, preserving order.
    ///
    /// Default implementation embeds one at a time.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}
