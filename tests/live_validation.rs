use std::sync::{Arc, Once};

use ragforge::{
    config,
    conversation::{ApiKey, ConversationEngine, GeminiClient, ReplyOutcome},
    document::{PDF_MIME_TYPE, Upload},
    pipeline::PipelineConfig,
};

static INIT: Once = Once::new();

fn init_config_once() {
    INIT.call_once(config::init_config);
}

// Minimal single-page PDF with the text "Operating voltage: 3.3V".
const TINY_PDF: &str = "%PDF-1.4
1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj
2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj
3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 300 144] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj
4 0 obj << /Length 52 >> stream
BT /F1 18 Tf 20 72 Td (Operating voltage: 3.3V) Tj ET
endstream endobj
5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj
trailer << /Root 1 0 R >>
%%EOF
";

#[tokio::test]
#[ignore = "Requires GEMINI_API_KEY and network access"]
async fn live_gemini_answers_about_inline_pdf() {
    init_config_once();
    let config = config::get_config();
    let credential = config
        .gemini_api_key
        .clone()
        .and_then(ApiKey::new)
        .expect("GEMINI_API_KEY must be set for live validation");

    let client = GeminiClient::new(config.gemini_base_url.clone(), config.request_timeout)
        .expect("client");
    let engine = ConversationEngine::new(Arc::new(client), Some(credential), config.request_timeout);
    let document = Upload::new("tiny.pdf", Some(PDF_MIME_TYPE.into()), TINY_PDF.as_bytes().to_vec())
        .validate()
        .expect("valid pdf");

    let reply = engine
        .try_answer(
            &document,
            &[],
            "What operating voltage does the document state?",
            &PipelineConfig::default(),
        )
        .await
        .expect("live backend call");

    assert_eq!(reply.outcome, ReplyOutcome::Answered, "reply: {reply:?}");
    assert!(reply.text.contains("3.3"), "unexpected answer: {}", reply.text);
}
