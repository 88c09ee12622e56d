//! Collaborator contracts for the external services the pipeline depends on.
//!
//! Every suspension point in the pipeline is a call through one of these
//! traits: the vision model, the text model, the geo-retrieval service and
//! the EXIF reader. Implementations live alongside the traits; stages only
//! ever see trait objects, so tests substitute stubs freely.

mod exif;
mod geoclip;
mod llm;
mod vision;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::model::{ImageMetadata, ImageRef};

pub use exif::{NoExif, StaticExif};
pub use geoclip::HttpGeoRetrieval;
pub use llm::{LlmClient, RigTextModel};
pub use vision::OpenAiVisionModel;

/// Errors from collaborator calls
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BackendError {
    /// Transport, auth or remote-side failure
    #[error("service call failed: {0}")]
    Service(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A call exceeded the configured per-call budget; treated like a
    /// failed call for fallback purposes
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator answered but the payload could not be decoded
    #[error("failed to parse collaborator output: {0}")]
    Parse(String),
}

/// Await `fut` for at most `budget`, mapping a timeout into [`BackendError`]
pub async fn with_timeout<T, F>(budget: Duration, fut: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(budget)),
    }
}

/// Vision-language model: turns an image plus an instruction prompt into a
/// textual payload. The payload is expected to be JSON but callers must
/// tolerate prose wrapping and malformed fragments.
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn analyze(&self, image: &ImageRef, prompt: &str) -> Result<String, BackendError>;
}

/// Text reasoning model
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Free-text generation
    async fn generate(&self, prompt: &str, system: Option<&str>)
        -> Result<String, BackendError>;

    /// Structured generation: the returned value conforms to `schema`.
    /// Fails with [`BackendError::Parse`] when the model output cannot be
    /// decoded against the schema.
    async fn generate_structured(
        &self,
        prompt: &str,
        system: Option<&str>,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value, BackendError>;
}

/// Structured generation into a concrete type, deriving the schema from the
/// target. Schema mismatches surface as [`BackendError::Parse`].
pub async fn generate_typed<T>(
    model: &dyn TextModel,
    prompt: &str,
    system: Option<&str>,
) -> Result<T, BackendError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = serde_json::to_value(schemars::schema_for!(T))
        .map_err(|e| BackendError::Parse(e.to_string()))?;
    let value = model.generate_structured(prompt, system, &schema).await?;
    serde_json::from_value(value).map_err(|e| BackendError::Parse(e.to_string()))
}

/// One coordinate hit from the retrieval service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub lat: f64,
    pub lon: f64,
    /// Retrieval-internal similarity score in `[0, 1]`
    pub score: f64,
    pub name: Option<String>,
}

/// Nearest-location retrieval over image and/or text embeddings.
///
/// At least one of `image`/`text` must be provided; implementations reject
/// calls with neither.
#[async_trait]
pub trait GeoRetrieval: Send + Sync {
    async fn locate(
        &self,
        image: Option<&ImageRef>,
        text: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, BackendError>;
}

/// Best-effort EXIF extraction. Failures are expected and the caller
/// treats them as empty metadata.
#[async_trait]
pub trait ExifReader: Send + Sync {
    async fn read(&self, image: &ImageRef) -> Result<ImageMetadata, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowModel;

    #[async_trait]
    impl TextModel for SlowModel {
        async fn generate(
            &self,
            _prompt: &str,
            _system: Option<&str>,
        ) -> Result<String, BackendError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(String::new())
        }

        async fn generate_structured(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _schema: &serde_json::Value,
        ) -> Result<serde_json::Value, BackendError> {
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test]
    async fn timeout_maps_to_backend_error() {
        let model = SlowModel;
        let result = with_timeout(
            Duration::from_millis(10),
            model.generate("anything", None),
        )
        .await;
        assert!(matches!(result, Err(BackendError::Timeout(_))));
    }

    #[tokio::test]
    async fn generate_typed_surfaces_schema_mismatch_as_parse_error() {
        struct WrongShape;

        #[async_trait]
        impl TextModel for WrongShape {
            async fn generate(
                &self,
                _prompt: &str,
                _system: Option<&str>,
            ) -> Result<String, BackendError> {
                Ok(String::new())
            }

            async fn generate_structured(
                &self,
                _prompt: &str,
                _system: Option<&str>,
                _schema: &serde_json::Value,
            ) -> Result<serde_json::Value, BackendError> {
                Ok(serde_json::json!({"hypotheses": "not-a-list"}))
            }
        }

        let result =
            generate_typed::<crate::model::extract::ExtractedHypotheses>(&WrongShape, "p", None)
                .await;
        assert!(matches!(result, Err(BackendError::Parse(_))));
    }
}
