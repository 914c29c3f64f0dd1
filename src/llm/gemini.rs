use crate::config::GeminiConfig;
use crate::http::build_client;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing GEMINI_API_KEY")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

/// Vision-capable model behind the Generative Language REST API.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Sends one prompt together with one inline image and returns the
    /// concatenated text of the first candidate.
    pub async fn generate_with_image(
        &self,
        prompt: &str,
        image: &[u8],
        mime_type: &str,
    ) -> Result<LlmResponse, LlmError> {
        if self.config.api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type,
                            data: BASE64.encode(image),
                        },
                    },
                ],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: GenerateResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("missing text".into()))?;

        if let Some(usage) = &payload.usage_metadata {
            debug!(
                target = "market.llm",
                model = %self.config.model,
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "gemini_usage"
            );
        }

        Ok(LlmResponse { text })
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
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
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}
