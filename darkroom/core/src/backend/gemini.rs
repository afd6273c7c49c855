//! Gemini / Imagen Service Implementation
//!
//! [`ImageService`] backed by the Generative Language REST API.
//!
//! # Endpoints
//!
//! - `POST {base}/models/{describe_model}:generateContent` - vision model, one
//!   user turn carrying the instruction text and the photo as inline data
//! - `POST {base}/models/{generate_model}:predict` - image model, one instance
//!   carrying the prompt, fixed generation parameters
//!
//! The API key travels as the `key` query parameter and is never logged.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::traits::{EncodedImage, GeneratedArtifact, ImageService, ServiceFailure};
use crate::config::ApiConfig;

/// Media type assumed when a prediction does not state one
const DEFAULT_ARTIFACT_MIME: &str = "image/png";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    Inline {
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

#[derive(Deserialize, Default)]
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
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: PredictInstance<'a>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
    aspect_ratio: &'static str,
    person_generation: &'static str,
    safety_setting: &'static str,
}

impl Default for PredictParameters {
    fn default() -> Self {
        Self {
            sample_count: 1,
            aspect_ratio: "3:4",
            person_generation: "allow_all",
            safety_setting: "block_low_and_above",
        }
    }
}

#[derive(Deserialize, Default)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ============================================================================
// Service
// ============================================================================

/// Gemini describe + Imagen generate client
#[derive(Clone)]
pub struct GeminiService {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    describe_model: String,
    generate_model: String,
}

impl std::fmt::Debug for GeminiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiService")
            .field("base_url", &self.base_url)
            .field("describe_model", &self.describe_model)
            .field("generate_model", &self.generate_model)
            .finish_non_exhaustive()
    }
}

impl GeminiService {
    /// Create a client from API settings and a key
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (TLS backend unavailable).
    pub fn new(config: &ApiConfig, api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            describe_model: config.describe_model.clone(),
            generate_model: config.generate_model.clone(),
        })
    }

    fn describe_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.describe_model)
    }

    fn generate_url(&self) -> String {
        format!("{}/models/{}:predict", self.base_url, self.generate_model)
    }

    async fn post<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response, ServiceFailure> {
        let response = self
            .http_client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        Err(ServiceFailure::Status {
            code: status.as_u16(),
            detail: error_detail(&raw, status.canonical_reason()),
        })
    }
}

/// Pull `error.message` out of an error body, falling back to the raw text
fn error_detail(raw: &str, reason: Option<&str>) -> String {
    if let Ok(ErrorEnvelope {
        error: Some(ErrorBody {
            message: Some(message),
        }),
    }) = serde_json::from_str::<ErrorEnvelope>(raw)
    {
        return message;
    }
    if raw.trim().is_empty() {
        reason.unwrap_or_default().to_string()
    } else {
        raw.to_string()
    }
}

fn first_text(response: GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
}

fn first_image(response: PredictResponse) -> Result<GeneratedArtifact, ServiceFailure> {
    let prediction = response
        .predictions
        .into_iter()
        .next()
        .ok_or_else(|| ServiceFailure::Malformed("no predictions in response".to_string()))?;

    let encoded = prediction
        .bytes_base64_encoded
        .filter(|b| !b.is_empty())
        .ok_or_else(|| ServiceFailure::Malformed("prediction carries no image bytes".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| ServiceFailure::Malformed(format!("invalid base64 image: {e}")))?;

    if bytes.is_empty() {
        return Err(ServiceFailure::Malformed("decoded image is empty".to_string()));
    }

    let mime = prediction
        .mime_type
        .unwrap_or_else(|| DEFAULT_ARTIFACT_MIME.to_string());
    Ok(GeneratedArtifact::new(bytes, mime))
}

#[async_trait]
impl ImageService for GeminiService {
    fn name(&self) -> &str {
        "Gemini"
    }

    async fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, ServiceFailure> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::Inline {
                        inline_data: InlineData {
                            mime_type: image.mime_type.clone(),
                            data: base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                        },
                    },
                ],
            }],
        };

        tracing::debug!(model = %self.describe_model, bytes = image.bytes.len(), "Calling describe endpoint");
        let response = self.post(&self.describe_url(), &body).await?;
        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ServiceFailure::Malformed(format!("describe body: {e}")))?;

        first_text(parsed)
            .ok_or_else(|| ServiceFailure::Malformed("no description in response".to_string()))
    }

    async fn generate(&self, prompt: &str) -> Result<GeneratedArtifact, ServiceFailure> {
        let body = PredictRequest {
            instances: PredictInstance { prompt },
            parameters: PredictParameters::default(),
        };

        tracing::debug!(model = %self.generate_model, prompt_len = prompt.len(), "Calling generate endpoint");
        let response = self.post(&self.generate_url(), &body).await?;
        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| ServiceFailure::Malformed(format!("predict body: {e}")))?;

        first_image(parsed)
    }
}
