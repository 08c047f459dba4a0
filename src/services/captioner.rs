//! Caption generation against Gemini's `generateContent` REST endpoint.
//!
//! Captioning is best-effort: `generate_caption` always returns a
//! `Caption`, with fixed placeholder titles standing in for failures.

use crate::models::{
    caption::{ANALYSIS_ERROR, API_KEY_MISSING, Caption, PROCESSING_ERROR},
    object::guess_content_type,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, warn};

const TITLE_PROMPT: &str =
    "Please generate a concise, descriptive title for this image. Keep it under 10 words.";
const DESCRIPTION_PROMPT: &str = "Please provide a detailed description of what's in this image. \
     Include key details about the subjects, setting, colors, and mood. Keep it under 200 words.";

#[async_trait]
pub trait Captioner: Send + Sync {
    /// Produce a title and description for the image at `image_path`.
    /// Never fails; see the placeholder titles in `models::caption`.
    async fn generate_caption(&self, image_path: &Path) -> Caption;
}

pub type SharedCaptioner = Arc<dyn Captioner>;

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("the Gemini API key is not configured")]
    MissingApiKey,
    #[error("{0}")]
    Service(String),
    #[error("{0}")]
    Processing(String),
}

impl CaptionError {
    pub fn into_fallback(self) -> Caption {
        match self {
            CaptionError::MissingApiKey => Caption::new(
                API_KEY_MISSING,
                "The Gemini API key is not configured. \
                 Please set the GEMINI_API_KEY environment variable.",
            ),
            CaptionError::Service(msg) => Caption::new(
                ANALYSIS_ERROR,
                format!("An error occurred while analyzing the image: {}", msg),
            ),
            CaptionError::Processing(msg) => Caption::new(
                PROCESSING_ERROR,
                format!(
                    "An unexpected error occurred while processing the image: {}",
                    msg
                ),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Text parts of the first candidate, joined.
    fn text(self) -> String {
        self.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Gemini-backed captioner. Holds one HTTP client for the process.
#[derive(Clone)]
pub struct GeminiCaptioner {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiCaptioner {
    pub fn new(api_key: Option<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        if api_key.is_none() {
            warn!("GEMINI_API_KEY not set; captions will use the missing-key placeholder");
        }
        Self {
            client: Client::new(),
            api_key,
            model: model.into(),
            base_url: base_url.into(),
        }
    }

    async fn try_caption(&self, image_path: &Path) -> Result<Caption, CaptionError> {
        let api_key = self.api_key.as_deref().ok_or(CaptionError::MissingApiKey)?;

        let bytes = tokio::fs::read(image_path).await.map_err(|err| {
            CaptionError::Processing(format!("reading {}: {}", image_path.display(), err))
        })?;
        let data = general_purpose::STANDARD.encode(&bytes);
        let mime_type = image_path
            .to_str()
            .and_then(guess_content_type)
            .filter(|m| m.starts_with("image/"))
            .unwrap_or("image/jpeg");

        let (title, description) = tokio::join!(
            self.generate(api_key, TITLE_PROMPT, mime_type, &data),
            self.generate(api_key, DESCRIPTION_PROMPT, mime_type, &data),
        );

        Ok(Caption::from_generated(&title?, &description?))
    }

    async fn generate(
        &self,
        api_key: &str,
        prompt: &str,
        mime_type: &str,
        data: &str,
    ) -> Result<String, CaptionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = GenerateRequest {
            contents: [Content {
                parts: [
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData { mime_type, data },
                    },
                ],
            }],
        };

        debug!(model = %self.model, bytes = data.len(), "sending generateContent request");
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| CaptionError::Service(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err(CaptionError::Service(format!("status {}: {}", status, body)));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| CaptionError::Processing(format!("decoding response: {}", err)))?;
        Ok(parsed.text())
    }
}

#[async_trait]
impl Captioner for GeminiCaptioner {
    async fn generate_caption(&self, image_path: &Path) -> Caption {
        match self.try_caption(image_path).await {
            Ok(caption) => {
                info!(title = %caption.title, "generated caption");
                caption
            }
            Err(err) => {
                warn!("caption generation failed: {}", err);
                err.into_fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::post,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    #[derive(Clone)]
    enum Reply {
        Echo,
        Empty,
        Fail,
        Garbage,
    }

    async fn generate_content(
        State(reply): State<Reply>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        assert_eq!(headers["x-goog-api-key"], "test-key");
        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts[1]["inline_data"]["data"], "aW1hZ2U=");

        let prompt = parts[0]["text"].as_str().unwrap_or_default();
        let text = if prompt.contains("title") {
            "  A red bicycle \n"
        } else {
            "A red bicycle leaning on a brick wall."
        };
        match reply {
            Reply::Echo => Json(json!({
                "candidates": [{ "content": { "parts": [{ "text": text }] } }]
            }))
            .into_response(),
            Reply::Empty => Json(json!({ "candidates": [] })).into_response(),
            Reply::Fail => (StatusCode::FORBIDDEN, "API key not valid").into_response(),
            Reply::Garbage => (StatusCode::OK, "<html>not json</html>").into_response(),
        }
    }

    async fn fake_gemini(reply: Reply) -> String {
        let app = Router::new()
            .route("/v1beta/models/{model_action}", post(generate_content))
            .with_state(reply);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn image_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bike.jpg");
        tokio::fs::write(&path, b"image").await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn missing_key_returns_placeholder() {
        let (_dir, path) = image_file().await;
        let captioner = GeminiCaptioner::new(None, "m", "http://127.0.0.1:1");
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption.title, API_KEY_MISSING);
        assert!(caption.description.contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn successful_generation_is_trimmed() {
        let (_dir, path) = image_file().await;
        let base = fake_gemini(Reply::Echo).await;
        let captioner = GeminiCaptioner::new(Some("test-key".into()), "gemini-1.5-pro", base);
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption.title, "A red bicycle");
        assert_eq!(caption.description, "A red bicycle leaning on a brick wall.");
    }

    #[tokio::test]
    async fn empty_output_uses_defaults() {
        let (_dir, path) = image_file().await;
        let base = fake_gemini(Reply::Empty).await;
        let captioner = GeminiCaptioner::new(Some("test-key".into()), "m", base);
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption, Caption::from_generated("", ""));
    }

    #[tokio::test]
    async fn service_errors_become_analysis_error() {
        let (_dir, path) = image_file().await;
        let base = fake_gemini(Reply::Fail).await;
        let captioner = GeminiCaptioner::new(Some("test-key".into()), "m", base);
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption.title, ANALYSIS_ERROR);
        assert!(caption.description.contains("API key not valid"));
    }

    #[tokio::test]
    async fn undecodable_response_becomes_processing_error() {
        let (_dir, path) = image_file().await;
        let base = fake_gemini(Reply::Garbage).await;
        let captioner = GeminiCaptioner::new(Some("test-key".into()), "m", base);
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption.title, PROCESSING_ERROR);
    }

    #[tokio::test]
    async fn unreadable_image_becomes_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let captioner = GeminiCaptioner::new(Some("k".into()), "m", "http://127.0.0.1:1");
        let caption = captioner
            .generate_caption(&dir.path().join("gone.jpg"))
            .await;
        assert_eq!(caption.title, PROCESSING_ERROR);
    }

    #[tokio::test]
    async fn unreachable_service_becomes_analysis_error() {
        let (_dir, path) = image_file().await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let captioner =
            GeminiCaptioner::new(Some("k".into()), "m", format!("http://{}", addr));
        let caption = captioner.generate_caption(&path).await;
        assert_eq!(caption.title, ANALYSIS_ERROR);
    }

    #[test]
    fn response_text_joins_first_candidate_parts() {
        let parsed: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                { "content": { "parts": [{ "text": "one" }, { "text": "two" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        }))
        .unwrap();
        assert_eq!(parsed.text(), "one\ntwo");
    }
}
