//! Conversation engine: prompt synthesis and the single backend call per question.

mod backend;
mod engine;
mod gemini;
pub mod prompt;

pub use backend::{
    ApiKey, BackendError, ContentPart, GenerateRequest, GenerativeBackend, QUERY_TEMPERATURE,
};
pub use engine::{
    ConversationEngine, ConversationError, EMPTY_REPLY_FALLBACK, MISSING_CREDENTIAL_REPLY, Reply,
    ReplyOutcome,
};
pub use gemini::GeminiClient;

#[cfg(test)]
pub(crate) use engine::tests::{ScriptedBackend, document as test_document};
