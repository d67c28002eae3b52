// SPDX-License-Identifier: MIT OR Apache-2.0
//! The generative backend seam (§1, §4.5).
//!
//! The language-model vendor and its safety knobs are explicitly out of
//! scope for this crate (a non-goal of §4.5) — [`ChatBackend`] is the
//! capability boundary a caller plugs a real vendor SDK into. Everything in
//! this crate only ever sees `String` in, `String` out.

use crate::error::SessionError;
use async_trait::async_trait;

/// A generative chat backend: takes an (already-augmented) prompt, returns
/// the model's raw response text.
///
/// Implementations own their own retry/timeout/vendor-specific safety
/// knobs; none of that is this crate's concern.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `message` to the backend and return its response text.
    async fn send(&self, message: &str) -> Result<String, SessionError>;
}

/// A fixed-response backend, useful for tests and for local development
/// without a configured vendor.
pub struct EchoBackend {
    prefix: String,
}

impl EchoBackend {
    /// Create a backend that always replies `"{prefix}{message}"`.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

#[async_trait]
impl ChatBackend for EchoBackend {
    async fn send(&self, message: &str) -> Result<String, SessionError> {
        Ok(format!("{}{}", self.prefix, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_backend_prefixes_message() {
        let backend = EchoBackend::new("echo: ");
        let reply = backend.send("hi").await.unwrap();
        assert_eq!(reply, "echo: hi");
    }
}
