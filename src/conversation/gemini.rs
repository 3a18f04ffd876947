//! Gemini REST client.
//!
//! Issues a single `models/{model}:generateContent` call per request: one user turn made of the
//! inlined PDF and the composed text block, a system instruction, and a fixed temperature.
//! The credential travels in the `x-goog-api-key` header so it never appears in URLs or logs.

use crate::conversation::backend::{
    ApiKey, BackendError, ContentPart, GenerateRequest, GenerativeBackend,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP adapter for the hosted generative backend.
pub struct GeminiClient {
    http: Client,
    base_url: String,
}

impl GeminiClient {
    /// Build a client against `base_url` with a transport-level timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .user_agent("ragforge/0.1")
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentBody {
    system_instruction: InstructionContent,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct InstructionContent {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

impl From<ContentPart> for Part {
    fn from(part: ContentPart) -> Self {
        match part {
            ContentPart::Text(text) => Part::Text { text },
            ContentPart::InlineData { mime_type, data } => Part::InlineData {
                inline_data: InlineData { mime_type, data },
            },
        }
    }
}

impl From<GenerateRequest> for GenerateContentBody {
    fn from(request: GenerateRequest) -> Self {
        Self {
            system_instruction: InstructionContent {
                parts: vec![Part::Text {
                    text: request.system_instruction,
                }],
            },
            contents: vec![Content {
                role: "user",
                parts: request.parts.into_iter().map(Part::from).collect(),
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

/// Text of the first candidate, joined across its text parts. Empty text counts as none.
fn first_candidate_text(response: GenerateContentResponse) -> Option<String> {
    let content = response.candidates.into_iter().next()?.content?;
    let text = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>();
    (!text.is_empty()).then_some(text)
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .map(|wrapper| {
            let message = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status) if !status.is_empty() => format!("{status}: {message}"),
                _ => message,
            }
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(
        &self,
        credential: &ApiKey,
        request: GenerateRequest,
    ) -> Result<Option<String>, BackendError> {
        let endpoint = self.endpoint(&request.model);
        tracing::debug!(model = %request.model, parts = request.parts.len(), "Calling Gemini");
        let body = GenerateContentBody::from(request);

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    BackendError::Transport(format!("Gemini request timed out: {err}"))
                } else {
                    BackendError::Transport(format!("failed to reach Gemini: {err}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = BackendError::Status {
                status,
                message: error_message(&body),
            };
            tracing::error!(error = %error, "Gemini request failed");
            return Err(error);
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|err| {
            BackendError::InvalidResponse(format!("failed to decode Gemini response: {err}"))
        })?;

        Ok(first_candidate_text(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::backend::QUERY_TEMPERATURE;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new(server.base_url(), Duration::from_secs(5)).expect("client")
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash".into(),
            system_instruction: "Be brief.".into(),
            parts: vec![
                ContentPart::InlineData {
                    mime_type: "application/pdf".into(),
                    data: "JVBERi0=".into(),
                },
                ContentPart::Text("User: hi".into()),
            ],
            temperature: QUERY_TEMPERATURE,
        }
    }

    fn key() -> ApiKey {
        ApiKey::new("test-key").expect("key")
    }

    #[tokio::test]
    async fn sends_single_turn_and_returns_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "test-key")
                    .json_body(json!({
                        "systemInstruction": { "parts": [{ "text": "Be brief." }] },
                        "contents": [{
                            "role": "user",
                            "parts": [
                                { "inlineData": { "mimeType": "application/pdf", "data": "JVBERi0=" } },
                                { "text": "User: hi" }
                            ]
                        }],
                        "generationConfig": { "temperature": 0.3 }
                    }));
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "role": "model", "parts": [{ "text": "3.3V typical." }] }
                    }]
                }));
            })
            .await;

        let text = client(&server)
            .generate(&key(), request())
            .await
            .expect("success");

        mock.assert_async().await;
        assert_eq!(text.as_deref(), Some("3.3V typical."));
    }

    #[tokio::test]
    async fn missing_candidates_yield_no_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({ "candidates": [] }));
            })
            .await;

        let text = client(&server)
            .generate(&key(), request())
            .await
            .expect("empty is not an error");
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn whitespace_text_is_returned_verbatim() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).json_body(json!({
                    "candidates": [{ "content": { "parts": [{ "text": " " }] } }]
                }));
            })
            .await;

        let text = client(&server)
            .generate(&key(), request())
            .await
            .expect("success");
        assert_eq!(text.as_deref(), Some(" "));
    }

    #[tokio::test]
    async fn error_status_carries_backend_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).json_body(json!({
                    "error": { "code": 403, "message": "API key not valid.", "status": "PERMISSION_DENIED" }
                }));
            })
            .await;

        let error = client(&server)
            .generate(&key(), request())
            .await
            .expect_err("forbidden");
        match error {
            BackendError::Status { status, message } => {
                assert_eq!(status.as_u16(), 403);
                assert_eq!(message, "PERMISSION_DENIED: API key not valid.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_invalid_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(200).body("not json");
            })
            .await;

        let error = client(&server)
            .generate(&key(), request())
            .await
            .expect_err("bad body");
        assert!(matches!(error, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        let client = GeminiClient::new("http://host/v1beta/", Duration::from_secs(1)).expect("client");
        assert_eq!(
            client.endpoint("gemini-3-pro-preview"),
            "http://host/v1beta/models/gemini-3-pro-preview:generateContent"
        );
    }
}
