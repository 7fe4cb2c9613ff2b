//! Abstraction over the external generative-text service.
//!
//! The pipeline never talks HTTP itself. It is handed a ready-to-use
//! [`GenerationBackend`] and only sees raw reply text or a typed
//! [`CallFailure`]. The application crate provides the HTTP implementation.

use async_trait::async_trait;

use crate::error::CallFailure;

/// One bounded call to the generative-text service.
///
/// Implementations must not retry internally and must map every transport
/// or upstream problem to a [`CallFailure`] rather than panicking.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short label used in logs (e.g. `gemini:gemini-2.0-flash`).
    fn name(&self) -> &str;

    /// Send `prompt` and return the raw reply text.
    async fn generate(&self, prompt: &str) -> Result<String, CallFailure>;
}

/// Raw outcome of the call made for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub chunk_index: usize,
    pub text: Result<String, CallFailure>,
}

impl RawResponse {
    /// Make the call for chunk `chunk_index` and capture its outcome.
    pub async fn fetch(backend: &dyn GenerationBackend, chunk_index: usize, prompt: &str) -> Self {
        Self {
            chunk_index,
            text: backend.generate(prompt).await,
        }
    }
}
