//! Vision-analysis service client (Anthropic Messages API).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::AnalysisError;

// ---

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 2000;
const API_VERSION: &str = "2023-06-01";

/// Sends one photo plus a text context and returns the raw reply text.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, jpeg: &[u8], prompt: &str) -> Result<String, AnalysisError>;
}

pub struct AnthropicClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        // ---
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                error!(error = %e, "Failed to build HTTP client with custom timeout, using default client");
                Client::new()
            });

        AnthropicClient {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock<'a> {
    Image { source: ImageSource },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

fn request_body<'a>(model: &'a str, jpeg: &[u8], prompt: &'a str) -> MessagesRequest<'a> {
    // ---
    MessagesRequest {
        model,
        max_tokens: MAX_TOKENS,
        messages: vec![Message {
            role: "user",
            content: vec![
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: "image/jpeg",
                        data: STANDARD.encode(jpeg),
                    },
                },
                ContentBlock::Text { text: prompt },
            ],
        }],
    }
}

fn first_text(response: MessagesResponse) -> Option<String> {
    response
        .content
        .into_iter()
        .find(|b| b.kind == "text")
        .and_then(|b| b.text)
}

#[async_trait]
impl VisionAnalyzer for AnthropicClient {
    async fn analyze(&self, jpeg: &[u8], prompt: &str) -> Result<String, AnalysisError> {
        // ---
        let body = request_body(&self.model, jpeg, prompt);
        debug!(model = %self.model, image_bytes = jpeg.len(), "Sending analysis request");

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Status { status, body: text });
        }

        let parsed: MessagesResponse = response.json().await?;
        first_text(parsed).ok_or(AnalysisError::EmptyResponse)
    }
}
