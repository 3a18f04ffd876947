//! Generative backend abstraction.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Sampling temperature used for every document query.
pub const QUERY_TEMPERATURE: f32 = 0.3;

/// Secret used to authenticate against the backend. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a non-blank secret; blank input yields `None`.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Raw secret for the transport layer.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// One piece of the single user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    /// Binary attachment, base64-encoded.
    InlineData {
        /// MIME type of the attachment.
        mime_type: String,
        /// Base64 payload.
        data: String,
    },
    /// Plain text.
    Text(String),
}

/// Request for one backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Model that executes the request.
    pub model: String,
    /// System instruction text.
    pub system_instruction: String,
    /// Parts of the single user turn, in order.
    pub parts: Vec<ContentPart>,
    /// Sampling temperature.
    pub temperature: f32,
}

/// Errors surfaced by a backend call.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Transport(String),
    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: StatusCode,
        /// Error message extracted from the body.
        message: String,
    },
    /// The response body could not be decoded.
    #[error("malformed response: {0}")]
    InvalidResponse(String),
    /// The call exceeded its time budget.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// Interface implemented by document question-answering backends.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Issue one request. `Ok(None)` means the backend answered without any text.
    async fn generate(
        &self,
        credential: &ApiKey,
        request: GenerateRequest,
    ) -> Result<Option<String>, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_is_redacted_and_trimmed() {
        let key = ApiKey::new("  secret-value ").expect("non-blank");
        assert_eq!(key.expose(), "secret-value");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
        assert!(ApiKey::new("   ").is_none());
    }
}
