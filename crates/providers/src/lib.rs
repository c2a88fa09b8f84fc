//! Language-model and embedding backends for Lorebot.
//!
//! Chat completions go through any OpenAI-compatible endpoint. Embeddings
//! come either from such an endpoint or from the local hashing embedder.

pub mod generator;
pub mod hash_embed;
pub mod openai_compat;
pub mod router;

pub use generator::{AnswerGenerator, GeneratorOptions};
pub use hash_embed::HashEmbedder;
pub use openai_compat::{OpenAiCompatProvider, OpenAiEmbedder};
pub use router::{build_embedder, build_generator, build_provider, default_base_url};
