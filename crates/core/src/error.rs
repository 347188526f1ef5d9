//! Error types for the Loregate domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded context
//! has its own error enum; the top-level [`Error`] aggregates them with
//! `#[from]` conversions.

use thiserror::Error;

/// The top-level error type for all Loregate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Card parsing / validation (loading phase) ---
    #[error("Card error: {0}")]
    Card(#[from] CardError),

    // --- Chat history validation (apply phase) ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Lorebook entry validation (apply phase) ---
    #[error("Entry error: {0}")]
    Entry(#[from] EntryError),

    // --- Upstream completion endpoint ---
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    // --- Card storage ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures while parsing or validating a character card document.
#[derive(Debug, Error)]
pub enum CardError {
    #[error("malformed card JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported spec: {spec:?} {spec_version:?} (expected \"chara_card_v3\" \"3.0\")")]
    SpecMismatch { spec: String, spec_version: String },

    #[error("character name is required")]
    MissingName,
}

/// Failures while validating an incoming chat history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("history must not be empty")]
    Empty,

    #[error("history must not contain a system message (found at index {index})")]
    ContainsSystem { index: usize },

    #[error("the last history message must come from the user")]
    LastNotUser,

    #[error("the last history message must be non-empty")]
    LastEmpty,
}

/// Failures while validating a lorebook entry at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("unknown lorebook entry role code: {0}")]
    UnknownRole(i64),

    #[error("unknown depth prompt role: {0:?}")]
    UnknownDepthPromptRole(String),

    #[error("unknown lorebook entry position code: {0}")]
    UnknownPosition(i64),

    #[error("lorebook entry depth must be non-negative (got {0})")]
    NegativeDepth(i64),
}

/// Failures from the upstream completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("rate limited by upstream, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("upstream returned an empty response")]
    EmptyResponse,

    #[error("network error: {0}")]
    Network(String),
}

/// Failures while locating or reading a stored character card.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid character id: {0:?}")]
    InvalidId(String),

    #[error("character not found: {0:?}")]
    NotFound(String),

    #[error("failed to read character file: {0}")]
    Io(#[from] std::io::Error),
}
