//! Perception stage: image to structured clues.
//!
//! Runs the EXIF reader (best effort) and the vision model (fallible) and
//! merges the results into the session's clues. A vision failure degrades
//! to EXIF-only clues when the fallback is enabled; an undecodable vision
//! reply degrades to empty-but-valid clues either way.

pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{ExifReader, VisionModel, with_timeout};
use crate::model::extract::ExtractedScene;
use crate::model::{Clues, ImageMetadata, ReasoningSession};
use crate::service::error::StageError;
use crate::service::parse;

use prompts::build_perception_prompt;

pub struct PerceptionStage {
    vision: Arc<dyn VisionModel>,
    exif: Arc<dyn ExifReader>,
    fallback_to_exif: bool,
    call_timeout: Duration,
}

impl PerceptionStage {
    pub fn new(
        vision: Arc<dyn VisionModel>,
        exif: Arc<dyn ExifReader>,
        fallback_to_exif: bool,
        call_timeout: Duration,
    ) -> Self {
        Self {
            vision,
            exif,
            fallback_to_exif,
            call_timeout,
        }
    }

    /// Extract clues from the session's image and write them to the session
    pub async fn run(&self, session: &mut ReasoningSession) -> Result<(), StageError> {
        tracing::info!(session = %session.id, "Perception stage started");

        // EXIF extraction failure alone is non-fatal and yields empty metadata
        let exif_meta = match with_timeout(self.call_timeout, self.exif.read(&session.image)).await
        {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "EXIF extraction failed, using empty metadata");
                ImageMetadata::default()
            }
        };

        let prompt = build_perception_prompt(&exif_meta);

        let clues = match with_timeout(
            self.call_timeout,
            self.vision.analyze(&session.image, &prompt),
        )
        .await
        {
            Ok(reply) => {
                // The model may wrap its JSON in prose; an undecodable reply
                // collapses to an empty scene rather than failing the stage
                let scene: ExtractedScene = parse::decode_or_default(&reply);
                scene.into_clues(exif_meta)
            }
            Err(e) if self.fallback_to_exif => {
                tracing::warn!(
                    session = %session.id,
                    error = %e,
                    "Vision model failed, degrading to EXIF-only clues"
                );
                Clues::from_metadata(exif_meta)
            }
            Err(e) => {
                tracing::error!(session = %session.id, error = %e, "Vision model failed with fallback disabled");
                return Err(StageError::Backend(e));
            }
        };

        tracing::info!(
            session = %session.id,
            ocr_count = clues.ocr.len(),
            visual_count = clues.visual.len(),
            has_gps = clues.meta.gps.is_some(),
            "Perception stage completed"
        );

        session.clues = Some(clues);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, NoExif, StaticExif};
    use crate::model::{GpsPoint, ImageRef};
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct FixedVision(String);

    #[async_trait]
    impl VisionModel for FixedVision {
        async fn analyze(
            &self,
            _image: &ImageRef,
            _prompt: &str,
        ) -> Result<String, BackendError> {
            Ok(self.0.clone())
        }
    }

    struct FailingVision;

    #[async_trait]
    impl VisionModel for FailingVision {
        async fn analyze(
            &self,
            _image: &ImageRef,
            _prompt: &str,
        ) -> Result<String, BackendError> {
            Err(BackendError::Service("vision backend down".to_string()))
        }
    }

    fn session() -> ReasoningSession {
        ReasoningSession::new(ImageRef::Path(PathBuf::from("photo.jpg")))
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn well_formed_reply_becomes_clues() {
        let reply = r#"{"ocr_texts":[{"text":"Eiffel Tower","confidence":0.95}],"visual_features":[{"category":"landmark","value":"iron lattice tower","confidence":0.9}],"metadata":{"scene_type":"urban"}}"#;
        let stage = PerceptionStage::new(
            Arc::new(FixedVision(reply.to_string())),
            Arc::new(NoExif),
            true,
            timeout(),
        );
        let mut session = session();
        stage.run(&mut session).await.unwrap();

        let clues = session.clues.unwrap();
        assert_eq!(clues.ocr.len(), 1);
        assert_eq!(clues.ocr[0].text, "Eiffel Tower");
        assert_eq!(clues.visual.len(), 1);
        assert_eq!(clues.meta.scene_type.as_deref(), Some("urban"));
    }

    #[tokio::test]
    async fn prose_wrapped_reply_still_decodes() {
        let reply = "Sure! Here is the analysis:\n```json\n{\"ocr_texts\":[{\"text\":\"Tokyo\",\"confidence\":0.8}]}\n```";
        let stage = PerceptionStage::new(
            Arc::new(FixedVision(reply.to_string())),
            Arc::new(NoExif),
            true,
            timeout(),
        );
        let mut session = session();
        stage.run(&mut session).await.unwrap();
        assert_eq!(session.clues.unwrap().ocr[0].text, "Tokyo");
    }

    #[tokio::test]
    async fn undecodable_reply_yields_empty_clues() {
        let stage = PerceptionStage::new(
            Arc::new(FixedVision("I cannot analyze this image.".to_string())),
            Arc::new(NoExif),
            true,
            timeout(),
        );
        let mut session = session();
        stage.run(&mut session).await.unwrap();

        let clues = session.clues.unwrap();
        assert!(clues.ocr.is_empty());
        assert!(clues.visual.is_empty());
    }

    #[tokio::test]
    async fn vision_failure_with_fallback_keeps_exif_only_clues() {
        let exif = StaticExif::new(ImageMetadata {
            gps: Some(GpsPoint {
                lat: 48.858,
                lon: 2.294,
            }),
            camera: Some("X100".to_string()),
            ..Default::default()
        });
        let stage = PerceptionStage::new(
            Arc::new(FailingVision),
            Arc::new(exif),
            true,
            timeout(),
        );
        let mut session = session();
        stage.run(&mut session).await.unwrap();

        let clues = session.clues.unwrap();
        assert!(clues.ocr.is_empty());
        assert!(clues.visual.is_empty());
        assert_eq!(clues.meta.gps.unwrap().lat, 48.858);
        assert_eq!(clues.meta.camera.as_deref(), Some("X100"));
    }

    #[tokio::test]
    async fn vision_failure_without_fallback_propagates() {
        let stage = PerceptionStage::new(
            Arc::new(FailingVision),
            Arc::new(NoExif),
            false,
            timeout(),
        );
        let mut session = session();
        let err = stage.run(&mut session).await.unwrap_err();
        assert!(matches!(err, StageError::Backend(_)));
        assert!(session.clues.is_none());
    }
}
