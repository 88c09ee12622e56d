//! HTTP adapter for the nearest-location retrieval service.
//!
//! Speaks a small JSON contract: image bytes and/or a text query in, ranked
//! coordinate hits out. Hits outside valid coordinate ranges are dropped at
//! the boundary so stages never see them.

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{BackendError, GeoRetrieval, RetrievalHit};
use crate::model::ImageRef;

const USER_AGENT: &str = "geoinfer/0.1";

#[derive(Debug, Serialize)]
struct LocateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_b64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct LocateResponse {
    results: Vec<RetrievalHit>,
}

/// [`GeoRetrieval`] over an HTTP embedding/retrieval service
pub struct HttpGeoRetrieval {
    client: Client,
    endpoint: Url,
}

impl HttpGeoRetrieval {
    pub fn new(endpoint: Url) -> Self {
        tracing::info!(endpoint = %endpoint, "Geo-retrieval backend initialized");
        Self {
            client: Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl GeoRetrieval for HttpGeoRetrieval {
    async fn locate(
        &self,
        image: Option<&ImageRef>,
        text: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, BackendError> {
        if image.is_none() && text.is_none() {
            return Err(BackendError::Service(
                "locate requires at least one of image or text".to_string(),
            ));
        }

        let mut image_b64 = None;
        let mut image_url = None;
        match image {
            Some(ImageRef::Url(url)) => image_url = Some(url.as_str()),
            Some(ImageRef::Inline(bytes)) => {
                image_b64 = Some(base64::engine::general_purpose::STANDARD.encode(bytes));
            }
            Some(ImageRef::Path(path)) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| BackendError::Service(format!("failed to read image: {e}")))?;
                image_b64 = Some(base64::engine::general_purpose::STANDARD.encode(&bytes));
            }
            None => {}
        }

        let request = LocateRequest {
            image_b64,
            image_url,
            text,
            top_k,
        };

        tracing::debug!(
            has_image = image.is_some(),
            has_text = text.is_some(),
            top_k = top_k,
            "Calling geo-retrieval service"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("User-Agent", USER_AGENT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "Geo-retrieval call failed");
            return Err(BackendError::Service(format!(
                "retrieval service returned HTTP {status}"
            )));
        }

        let parsed: LocateResponse = response.json().await?;

        let hit_count = parsed.results.len();
        let hits: Vec<RetrievalHit> = parsed
            .results
            .into_iter()
            .filter(|h| (-90.0..=90.0).contains(&h.lat) && (-180.0..=180.0).contains(&h.lon))
            .collect();

        if hits.len() < hit_count {
            tracing::warn!(
                dropped = hit_count - hits.len(),
                "Dropped retrieval hits with out-of-range coordinates"
            );
        }

        tracing::debug!(hits = hits.len(), "Geo-retrieval call completed");

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locate_request_omits_absent_fields() {
        let request = LocateRequest {
            image_b64: None,
            image_url: None,
            text: Some("Paris, France"),
            top_k: 5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("image_b64").is_none());
        assert_eq!(json["text"], "Paris, France");
        assert_eq!(json["top_k"], 5);
    }

    #[test]
    fn locate_response_decodes() {
        let raw = r#"{"results":[{"lat":48.858,"lon":2.294,"score":0.91,"name":"Eiffel Tower"}]}"#;
        let parsed: LocateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].name.as_deref(), Some("Eiffel Tower"));
    }
}
