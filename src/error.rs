//! Typed errors at the subsystem boundaries.
//!
//! Internal code chains context with `anyhow`; these enums are constructed
//! where a caller can act on the distinction (retry vs reconfigure vs give
//! up) and travel inside `anyhow::Error`, recoverable via `downcast_ref`.

use thiserror::Error;

// ── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ── LLM / Provider ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider {provider} request failed: {message}")]
    Request { provider: String, message: String },

    #[error("provider {provider} authentication failed")]
    Auth { provider: String },

    #[error("streaming error: {0}")]
    Streaming(String),

    #[error("provider is disabled (no credentials configured)")]
    Disabled,
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opening database failed: {0}")]
    Open(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(sqlx::Error),
}

// ── Retrieval ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector search failed: {0}")]
    Search(String),
}
