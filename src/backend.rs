//! Backend abstraction
//!
//! The routing engine never calls compute backends itself; it only decides
//! where a prompt should go. Embedding applications implement [`Backend`]
//! for each endpoint named in the pricing table and drive it after
//! dequeueing a record.
//!
//! [`EchoBackend`] ships for pipeline smoke tests without real model
//! dependencies.

use crate::RouterError;
use async_trait::async_trait;

/// Result of one backend generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// The completion text.
    pub text: String,
    /// Tokens consumed, when the backend reports them.
    pub tokens_used: Option<u64>,
}

/// Trait for prompt-completion backends.
///
/// Implementations must be thread-safe (Send + Sync) for use across tasks.
/// The trait is object-safe to allow dynamic dispatch via `Arc<dyn Backend>`.
/// Failures surface as [`RouterError::Backend`]; the queue stores whatever
/// error string the caller passes to `fail` without inspecting it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate a completion for `prompt` using `model`.
    async fn generate(&self, prompt: &str, model: &str) -> Result<Generation, RouterError>;
}

/// Dummy echo backend for testing.
///
/// Returns the prompt unchanged after a simulated delay and reports a
/// whitespace token count.
pub struct EchoBackend {
    /// Simulated generation delay in milliseconds.
    pub delay_ms: u64,
}

impl EchoBackend {
    /// Create an echo backend with a 10ms simulated delay.
    pub fn new() -> Self {
        Self { delay_ms: 10 }
    }

    /// Create an echo backend with a custom delay.
    pub fn with_delay(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for EchoBackend {
    async fn generate(&self, prompt: &str, model: &str) -> Result<Generation, RouterError> {
        if prompt.is_empty() {
            return Err(RouterError::Backend("empty prompt".to_string()));
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;

        let tokens = prompt.split_whitespace().count() as u64;
        Ok(Generation {
            text: format!("[{model}] {prompt}"),
            tokens_used: Some(tokens),
        })
    }
}
