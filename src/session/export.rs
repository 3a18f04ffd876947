//! Session export bundle.
//!
//! The bundle is a labelled diagnostic snapshot: configuration metadata plus the transcript,
//! serialized as pretty JSON. It contains no vectors because none are ever produced.

use crate::document::Document;
use crate::pipeline::{ModelProvider, PipelineConfig};
use crate::session::transcript::Message;
use serde::Serialize;
use time::OffsetDateTime;

/// Value of the `kind` field identifying the bundle format.
pub const EXPORT_KIND: &str = "ragforge.session-export";

/// Placeholder standing in for the vector payload.
pub const VECTOR_STORE_PLACEHOLDER: &str =
    "not materialized: embeddings and the vector index are simulated";

/// Configuration metadata recorded in the bundle.
#[derive(Debug, Clone, Serialize)]
pub struct ExportMeta {
    /// Uploaded document name.
    pub filename: String,
    /// Parser label.
    pub parsed_by: String,
    /// Chunk size in tokens.
    pub chunk_size: u32,
    /// Overlap in tokens.
    pub overlap: u32,
    /// Retrieval depth.
    pub retrieval_k: u32,
    /// Provider category.
    pub model_provider: ModelProvider,
    /// Model identifier.
    pub model: String,
    /// When the bundle was generated.
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Export-only snapshot of a chat session.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBundle {
    /// Format label, always [`EXPORT_KIND`].
    pub kind: &'static str,
    /// Configuration metadata.
    pub meta: ExportMeta,
    /// Placeholder text; no vectors exist.
    pub vector_store: &'static str,
    /// Full transcript.
    pub chat_history: Vec<Message>,
    #[serde(skip)]
    stem: String,
}

impl ExportBundle {
    /// Assemble a bundle for the given session data.
    pub fn new(document: &Document, config: &PipelineConfig, transcript: &[Message]) -> Self {
        Self {
            kind: EXPORT_KIND,
            meta: ExportMeta {
                filename: document.name().to_string(),
                parsed_by: config.parser.label().to_string(),
                chunk_size: config.chunk_size,
                overlap: config.overlap,
                retrieval_k: config.retrieval_k,
                model_provider: config.model_provider,
                model: config.model.clone(),
                generated_at: OffsetDateTime::now_utc(),
            },
            vector_store: VECTOR_STORE_PLACEHOLDER,
            chat_history: transcript.to_vec(),
            stem: document.stem().to_string(),
        }
    }

    /// Suggested download name: `{stem}_{model}.session.json` with `/` in the model replaced.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.session.json",
            self.stem,
            self.meta.model.replace('/', "-")
        )
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
