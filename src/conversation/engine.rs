use crate::conversation::backend::{
    ApiKey, BackendError, ContentPart, GenerateRequest, GenerativeBackend, QUERY_TEMPERATURE,
};
use crate::conversation::prompt::{compose_turn, execution_model, system_instruction};
use crate::document::Document;
use crate::pipeline::PipelineConfig;
use crate::session::Message;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reply used when the backend answers without any text.
pub const EMPTY_REPLY_FALLBACK: &str = "I processed the document but generated no text response.";

/// User-facing text for a query attempted without a credential.
pub const MISSING_CREDENTIAL_REPLY: &str =
    "Error: No API key found in GEMINI_API_KEY. Please configure your environment.";

/// Typed failure of a single `answer` attempt.
#[derive(Debug, Error)]
pub enum ConversationError {
    /// No credential was supplied to the engine.
    #[error("no backend credential configured")]
    MissingCredential,
    /// The backend call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ConversationError {
    /// Text appended to the transcript in place of an answer.
    pub fn reply_text(&self) -> String {
        match self {
            Self::MissingCredential => MISSING_CREDENTIAL_REPLY.to_string(),
            Self::Backend(error) => format!("Error querying document: {error}"),
        }
    }
}

/// How a reply was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Backend text.
    Answered,
    /// Backend answered without text; the fallback sentence was used.
    Fallback,
    /// A failure was converted to text.
    Failed,
}

/// Text to append to the transcript plus how it came about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Assistant text.
    pub text: String,
    /// Provenance of the text.
    pub outcome: ReplyOutcome,
}

/// Compiles a configuration and transcript into one backend request.
///
/// The engine performs at most one backend call per invocation, never retries, and never
/// mutates the document or configuration it is given. The credential is supplied at
/// construction; the engine does not read the environment.
#[derive(Clone)]
pub struct ConversationEngine {
    backend: Arc<dyn GenerativeBackend>,
    credential: Option<ApiKey>,
    timeout: Duration,
}

impl ConversationEngine {
    /// Create an engine over `backend`.
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        credential: Option<ApiKey>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            credential,
            timeout,
        }
    }

    /// Same backend and timeout, different credential.
    pub fn with_credential(&self, credential: Option<ApiKey>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            credential,
            timeout: self.timeout,
        }
    }

    /// Whether a credential is available. Pure; performs no I/O.
    pub fn has_credential(&self) -> bool {
        self.credential.is_some()
    }

    /// Build the request for a question without sending it.
    pub fn build_request(
        &self,
        document: &Document,
        history: &[Message],
        new_text: &str,
        config: &PipelineConfig,
    ) -> GenerateRequest {
        GenerateRequest {
            model: execution_model(config).to_string(),
            system_instruction: system_instruction(document.name(), config),
            parts: vec![
                ContentPart::InlineData {
                    mime_type: document.mime_type().to_string(),
                    data: document.content_base64().to_string(),
                },
                ContentPart::Text(compose_turn(history, new_text)),
            ],
            temperature: QUERY_TEMPERATURE,
        }
    }

    /// Ask the backend once. Empty replies map to [`EMPTY_REPLY_FALLBACK`].
    pub async fn try_answer(
        &self,
        document: &Document,
        history: &[Message],
        new_text: &str,
        config: &PipelineConfig,
    ) -> Result<Reply, ConversationError> {
        let credential = self
            .credential
            .as_ref()
            .ok_or(ConversationError::MissingCredential)?;
        let request = self.build_request(document, history, new_text, config);
        let model = request.model.clone();

        let text = tokio::time::timeout(self.timeout, self.backend.generate(credential, request))
            .await
            .map_err(|_| BackendError::Timeout(self.timeout))??;

        tracing::info!(
            model = %model,
            history = history.len(),
            empty = text.is_none(),
            "Backend replied"
        );
        Ok(match text {
            Some(text) => Reply {
                text,
                outcome: ReplyOutcome::Answered,
            },
            None => Reply {
                text: EMPTY_REPLY_FALLBACK.to_string(),
                outcome: ReplyOutcome::Fallback,
            },
        })
    }

    /// Ask the backend once and always return transcript text.
    ///
    /// Failures never escape: they are logged and rendered with
    /// [`ConversationError::reply_text`].
    pub async fn answer(
        &self,
        document: &Document,
        history: &[Message],
        new_text: &str,
        config: &PipelineConfig,
    ) -> Reply {
        match self.try_answer(document, history, new_text, config).await {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(error = %error, "Query failed; replying with error text");
                Reply {
                    text: error.reply_text(),
                    outcome: ReplyOutcome::Failed,
                }
            }
        }
    }
}
