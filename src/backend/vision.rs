//! Vision-model backend speaking the OpenAI-compatible chat API.
//!
//! Images travel as data URLs for local files and inline bytes, or as plain
//! URLs for remote references. The reply content is returned verbatim; the
//! perception stage owns the tolerant decoding.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{BackendError, VisionModel};
use crate::model::ImageRef;

const ENV_VISION_MODEL: &str = "GEOINFER_VISION_MODEL";
const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

const USER_AGENT: &str = "geoinfer/0.1";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// [`VisionModel`] over an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiVisionModel {
    client: Client,
    base_url: Url,
    api_key: String,
    model: String,
}

impl OpenAiVisionModel {
    /// Uses `GEOINFER_VISION_MODEL` when set, defaulting to gpt-4o-mini.
    ///
    /// `base_url` must end with a trailing slash (e.g.
    /// `https://api.openai.com/v1/`) so the completions path joins under it.
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        let model =
            std::env::var(ENV_VISION_MODEL).unwrap_or_else(|_| DEFAULT_VISION_MODEL.to_string());

        tracing::info!(model = %model, base_url = %base_url, "Vision model backend initialized");

        Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
            model,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Resolve the image reference into the `image_url` the API accepts
    async fn image_url(&self, image: &ImageRef) -> Result<String, BackendError> {
        match image {
            ImageRef::Url(url) => Ok(url.to_string()),
            ImageRef::Inline(bytes) => Ok(Self::data_url(bytes)),
            ImageRef::Path(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| BackendError::Service(format!("failed to read image: {e}")))?;
                Ok(Self::data_url(&bytes))
            }
        }
    }

    fn data_url(bytes: &[u8]) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )
    }
}

#[async_trait]
impl VisionModel for OpenAiVisionModel {
    async fn analyze(&self, image: &ImageRef, prompt: &str) -> Result<String, BackendError> {
        let image_url = self.image_url(image).await?;

        let endpoint = self
            .base_url
            .join("chat/completions")
            .map_err(|e| BackendError::Service(format!("invalid base URL: {e}")))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_url } },
                ],
            }],
        });

        tracing::debug!(model = %self.model, prompt_length = prompt.len(), "Calling vision model");

        let response = self
            .client
            .post(endpoint)
            .header("User-Agent", USER_AGENT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "Vision model call failed");
            return Err(BackendError::Service(format!(
                "vision model returned HTTP {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::Parse("vision reply carried no content".to_string()))?;

        tracing::debug!(reply_length = content.len(), "Vision model call completed");

        Ok(content)
    }
}
