//! Documentation and code-example generation for CrySL rules.
//!
//! A run for one rule goes through the same steps every time:
//!
//! 1. **Load** the `.crysl` source and split it into sections
//! 2. **Resolve** dependency constraints and guarantees from sanitized records
//! 3. **Retrieve** reference excerpts (optional, degrades to nothing)
//! 4. **Prompt** the configured provider
//! 5. **Clean and cache** the answer
//!
//! [`DocGenerator`] drives the steps; the other modules are the pieces.

pub mod cache;
pub mod context;
pub mod generator;
pub mod output;
pub mod prompts;

pub use cache::{ExplanationCache, safe_class_name};
pub use context::{RuleContext, RulePayload};
pub use generator::{
    BatchOutcome, DocGenerator, Explanation, GeneratorSettings, retrieval_from_config,
};
pub use output::clean_llm_output;
