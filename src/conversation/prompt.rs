//! Deterministic prompt synthesis.
//!
//! The backend never sees real retrieval. Instead the pipeline configuration is narrated in a
//! system instruction that asks the model to role-play the configured parser, chunking, and
//! model persona. Conversation history is flattened into a single text block and re-sent in
//! full on every call; there is no incremental multi-turn state on the backend.

use crate::pipeline::{
    HOSTED_ADVANCED_MODEL, HOSTED_DEFAULT_MODEL, ModelProvider, ParserKind, PipelineConfig,
};
use crate::session::Message;

/// Backend model that executes every request except the advanced hosted tier.
pub const DEFAULT_EXECUTION_MODEL: &str = HOSTED_DEFAULT_MODEL;

/// Pick the model that actually executes the request.
///
/// Open-catalog selections still run on the default hosted model; they are only imitated
/// through the persona directive.
pub fn execution_model(config: &PipelineConfig) -> &'static str {
    if config.model_provider == ModelProvider::Google && config.model == HOSTED_ADVANCED_MODEL {
        HOSTED_ADVANCED_MODEL
    } else {
        DEFAULT_EXECUTION_MODEL
    }
}

/// Behavioural directive for each simulated parser.
pub fn parser_directive(parser: ParserKind) -> &'static str {
    match parser {
        ParserKind::Docling => {
            "SIMULATION MODE: DOCLING. The user has chosen a layout-aware parser. You should pay extreme attention to tables, headers, and document structure. If the PDF contains tables, represent them accurately in Markdown. Assume the context provided to you was extracted with high structural fidelity."
        }
        ParserKind::LangChain => {
            "SIMULATION MODE: LANGCHAIN. The user has chosen a recursive character splitter. You should simulate the effect of content being split by character count. Context might be fragmented mid-sentence. Focus on text density."
        }
        ParserKind::Unstructured => {
            "SIMULATION MODE: UNSTRUCTURED. Focus on raw element extraction."
        }
    }
}

fn persona_directive(config: &PipelineConfig) -> String {
    match config.model_provider {
        ModelProvider::HuggingFace => format!(
            "ACT AS: {}. Adopt the typical personality, verbosity, and formatting style of this Hugging Face model.",
            config.model
        ),
        ModelProvider::Google => "ACT AS: Standard Gemini Assistant (Helpful, Concise).".to_string(),
    }
}

/// Build the system instruction for a document and configuration.
pub fn system_instruction(document_name: &str, config: &PipelineConfig) -> String {
    let parser = config.parser.label();
    format!(
        "You are an advanced RAG (Retrieval-Augmented Generation) assistant.

CONFIGURATION:
- Target Document: \"{document_name}\"
- Parser Engine: {parser}
- Chunking Strategy: {chunk} tokens per chunk with {overlap} token overlap.
- Retrieval Depth: Top-{k} chunks.

MODEL PERSONA:
{persona}

PARSER BEHAVIOR:
{behavior}

INSTRUCTIONS:
1. Answer questions strictly based on the content of the provided document.
2. If the user asks about the pipeline, explain that you are simulating a RAG system using {parser} with {chunk}-token chunks, retrieving the top {k} relevant segments.
3. If acting as a specific HF model, try to use its specific catchphrases or formatting quirks (e.g. \"Here is the code:\" for CodeLlama).
4. Maintain a professional, technical tone suitable for a vector database admin interface.
",
        chunk = config.chunk_size,
        overlap = config.overlap,
        k = config.retrieval_k,
        persona = persona_directive(config),
        behavior = parser_directive(config.parser),
    )
}

/// Flatten prior messages and the new question into one text block.
pub fn compose_turn(history: &[Message], new_text: &str) -> String {
    let lines = history
        .iter()
        .map(|message| format!("{}: {}", message.role.as_str(), message.text))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Here is the conversation history:\n{lines}\n\nUser: {new_text}")
}
