//! # cryslgen core
//!
//! Domain types, traits, and error definitions shared by every cryslgen crate.
//! Nothing in here talks to the network or the filesystem; the rule store,
//! retrieval pipeline and providers implement against these definitions.
//!
//! ## Layout
//!
//! - [`error`]: one error enum per bounded context plus the top-level [`Error`]
//! - [`message`]: chat messages sent to completion providers
//! - [`provider`]: the [`Provider`] trait covering completions and embeddings

pub mod error;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, RetrievalError, RuleError};
pub use message::{Message, Role};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse};
