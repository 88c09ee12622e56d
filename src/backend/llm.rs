//! Text-model backend over rig's OpenAI-compatible provider.
//!
//! A thin shared client wrapper plus a [`TextModel`] implementation. The
//! structured path embeds the target schema in the prompt and decodes the
//! reply leniently, so providers without native schema enforcement still
//! work.

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use super::{BackendError, TextModel};
use crate::service::parse;

/// Environment variable for the reasoning model name
const ENV_TEXT_MODEL: &str = "GEOINFER_TEXT_MODEL";

/// Default reasoning model
const DEFAULT_MODEL: &str = openai::GPT_4O_MINI;

/// Shared LLM client wrapper
#[derive(Clone)]
pub struct LlmClient {
    client: openai::Client,
}

impl LlmClient {
    /// Create a new LLM client with the provided API key
    pub fn new(api_key: &str) -> Result<Self, BackendError> {
        let client = openai::Client::new(api_key);

        Ok(Self { client })
    }

    /// Get a reference to the underlying OpenAI client
    pub fn openai_client(&self) -> &openai::Client {
        &self.client
    }
}

/// [`TextModel`] backed by a rig agent
pub struct RigTextModel {
    client: LlmClient,
    model: String,
}

impl RigTextModel {
    /// Uses `GEOINFER_TEXT_MODEL` when set, defaulting to gpt-4o-mini
    pub fn new(client: LlmClient) -> Self {
        let model = std::env::var(ENV_TEXT_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        tracing::info!(model = %model, "Text model backend initialized");

        Self { client, model }
    }

    pub fn with_model(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextModel for RigTextModel {
    async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, BackendError> {
        let start_time = std::time::Instant::now();

        let mut builder = self.client.openai_client().agent(&self.model);
        if let Some(system) = system {
            builder = builder.preamble(system);
        }
        let agent = builder.build();

        match agent.prompt(prompt).await {
            Ok(reply) => {
                tracing::debug!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    prompt_length = prompt.len(),
                    reply_length = reply.len(),
                    "Text model call completed"
                );
                Ok(reply)
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %e,
                    "Text model call failed"
                );
                Err(BackendError::Service(e.to_string()))
            }
        }
    }

    async fn generate_structured(
        &self,
        prompt: &str,
        system: Option<&str>,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        let framed = format!(
            "{prompt}\n\n\
             Respond with a single JSON object conforming to this JSON Schema. \
             Output the JSON object only, no prose and no code fences.\n\n\
             {schema}",
            schema = serde_json::to_string(schema)
                .map_err(|e| BackendError::Parse(e.to_string()))?,
        );

        let reply = self.generate(&framed, system).await?;

        parse::first_json_object(&reply).ok_or_else(|| {
            BackendError::Parse(format!(
                "no JSON object found in model reply ({} chars)",
                reply.len()
            ))
        })
    }
}
