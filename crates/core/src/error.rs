//! Error types for the cryslgen domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all cryslgen operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Rule errors ---
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Failed to read document {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    #[error("Unsupported reference document: {0}")]
    UnsupportedDocument(PathBuf),

    #[error("Embedding shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Index cache error at {path}: {reason}")]
    Cache { path: PathBuf, reason: String },

    #[error("Embedding generation failed: {0}")]
    Embedding(#[from] ProviderError),
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("CrySL rule not found for {class_name} at {path}")]
    SourceNotFound { class_name: String, path: PathBuf },

    #[error("Failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Invalid rule payload: {0}")]
    InvalidPayload(String),
}
