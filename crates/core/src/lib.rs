//! # Lorebot Core
//!
//! Domain types, collaborator traits, and error definitions for the lorebot
//! retrieval-augmented chat assistant. This crate has **no framework
//! dependencies**: it defines the vocabulary every other crate implements
//! against.
//!
//! ## Collaborators
//!
//! The admission and caching pipeline talks to three external systems, each
//! behind a trait defined here:
//! - [`Channel`]: the messaging platform (send, edit, delete, react)
//! - [`Provider`] / [`Embedder`]: language-model completions and embeddings
//! - [`CorpusIndex`]: the similarity index over stored text segments

pub mod channel;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod text;

// Re-export key types at crate root for ergonomics
pub use channel::{Channel, MessageRef, PlatformMessage, UserId};
pub use corpus::{CorpusDocument, CorpusHit, CorpusIndex};
pub use embedding::{Embedder, Embedding};
pub use error::{Error, Result};
pub use event::{AdminObject, Command, Invocation, InvocationKind, PlatformEvent};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
