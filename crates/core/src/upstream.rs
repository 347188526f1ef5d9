//! The upstream completion seam.
//!
//! The prompt-assembly core emits an ordered message sequence; something has
//! to forward it to an LLM completion endpoint. That something implements
//! [`CompletionClient`]. The gateway crate ships an OpenAI-compatible
//! implementation; tests use stubs.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::message::Message;

/// A client for an LLM chat-completion endpoint.
///
/// Implementations receive the composed message sequence verbatim — the core
/// prescribes neither streaming nor tokenization.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Human-readable client name (for logs).
    fn name(&self) -> &str;

    /// Request a single completion for the given messages.
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
    ) -> std::result::Result<String, UpstreamError>;
}
