//! Reasoning service trait: the abstraction over model backends.
//!
//! A reasoning service receives the fully assembled instruction payload and
//! returns raw text, which the execution loop parses into a tool-call plan.
//! Provider wire formats, credentials, and retries are the implementor's
//! concern.

use async_trait::async_trait;
use crate::error::ReasoningError;

/// The core ReasoningService trait.
///
/// The execution loop calls [`complete`](ReasoningService::complete) once per
/// iteration without knowing which backend is behind it.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// A human-readable name for this service (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send the assembled payload and return the raw response text.
    async fn complete(&self, payload: &str) -> std::result::Result<String, ReasoningError>;

    /// Maximum payload size in estimated tokens, if the backend enforces one.
    ///
    /// When `Some`, the loop refuses to send payloads estimated above it.
    fn context_window(&self) -> Option<usize> {
        None
    }
}
