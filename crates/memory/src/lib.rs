//! Corpus storage for lorebot.
//!
//! - [`vector`]: cosine similarity and ranking, shared with the answer cache
//! - [`store`]: the in-process [`VectorStore`] implementing `CorpusIndex`

pub mod store;
pub mod vector;

pub use store::{VectorStore, VectorStoreOptions};
pub use vector::{cosine_similarity, rank_by_similarity};
