//! Pipeline driver: an explicit state machine over the four stages.
//!
//! `init → perceiving → hypothesizing → retrieving → verifying`, then either
//! `done` or a confidence-gated loop back to `hypothesizing` with the
//! current hypotheses carried as refinement seed. Each stage transition is
//! atomic: a stage either completes and writes its field, or the session
//! keeps its pre-stage state with the error recorded and the run ends.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::backend::{ExifReader, GeoRetrieval, TextModel, VisionModel};
use crate::model::{AgentConfig, FinalPrediction, ImageRef, Phase, ReasoningSession};
use crate::service::error::{PipelineError, StageError};
use crate::service::hypothesis::HypothesisStage;
use crate::service::perception::PerceptionStage;
use crate::service::retrieval::RetrievalStage;
use crate::service::verification::{RankingJudge, VerificationStage};
use crate::verifier::VerifierRegistry;

/// The geolocation pipeline. The sole entry point other code should call.
pub struct Geolocator {
    perception: PerceptionStage,
    hypothesis: HypothesisStage,
    retrieval: RetrievalStage,
    verification: VerificationStage,
    config: AgentConfig,
}

impl Geolocator {
    /// Wire the four stages from collaborator backends, a verifier
    /// registry and the configuration
    pub fn new(
        vision: Arc<dyn VisionModel>,
        text: Arc<dyn TextModel>,
        retrieval: Arc<dyn GeoRetrieval>,
        exif: Arc<dyn ExifReader>,
        registry: &VerifierRegistry,
        config: AgentConfig,
    ) -> Self {
        let config = config.validated();

        let judge = config.use_judge.then(|| {
            RankingJudge::new(Arc::clone(&text), config.judge_top_n, config.call_timeout)
        });

        let perception = PerceptionStage::new(
            vision,
            exif,
            config.perception_fallback,
            config.call_timeout,
        );
        let hypothesis = HypothesisStage::new(
            Arc::clone(&text),
            config.max_hypotheses,
            config.placeholder_region.clone(),
            config.call_timeout,
        );
        let retrieval = RetrievalStage::new(
            retrieval,
            config.retrieval_strategy,
            config.top_k,
            config.call_timeout,
        );
        let verification = VerificationStage::new(
            registry.resolve(&config.verifiers),
            judge,
            config.weights,
            config.call_timeout,
        );

        tracing::info!(
            strategy = ?config.retrieval_strategy,
            refinement = config.enable_refinement,
            verifiers = ?config.verifiers,
            "Geolocation pipeline initialized"
        );

        Self {
            perception,
            hypothesis,
            retrieval,
            verification,
            config,
        }
    }

    /// Run one session to completion and return the prediction
    pub async fn locate(&self, image: ImageRef) -> Result<FinalPrediction, PipelineError> {
        let mut session = ReasoningSession::new(image);
        self.drive(&mut session).await
    }

    /// Run one session and return it alongside the outcome, keeping the
    /// partial progress inspectable on failure
    pub async fn locate_with_session(
        &self,
        image: ImageRef,
    ) -> (ReasoningSession, Result<FinalPrediction, PipelineError>) {
        let mut session = ReasoningSession::new(image);
        let outcome = self.drive(&mut session).await;
        (session, outcome)
    }

    /// Geolocate a batch of images, at most `concurrency` sessions in
    /// flight at once. Sessions share no state; results come back in input
    /// order and a failed image does not affect the others.
    pub async fn locate_batch(
        &self,
        images: Vec<ImageRef>,
        concurrency: usize,
    ) -> Vec<Result<FinalPrediction, PipelineError>> {
        let total = images.len();
        tracing::info!(count = total, concurrency = concurrency, "Batch geolocation started");

        let results: Vec<_> = stream::iter(images.into_iter().map(|image| self.locate(image)))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        tracing::info!(
            count = total,
            succeeded = results.iter().filter(|r| r.is_ok()).count(),
            "Batch geolocation completed"
        );
        results
    }

    /// The one conditional edge of the state machine: loop back to
    /// hypothesis generation while the prediction is under-confident and
    /// refinement budget remains, otherwise terminate.
    pub fn next_after_verification(
        confidence: f64,
        iteration: u32,
        config: &AgentConfig,
    ) -> Phase {
        if config.enable_refinement
            && confidence < config.confidence_threshold
            && iteration < config.max_iterations
        {
            Phase::Hypothesizing
        } else {
            Phase::Done
        }
    }

    async fn drive(
        &self,
        session: &mut ReasoningSession,
    ) -> Result<FinalPrediction, PipelineError> {
        tracing::info!(session = %session.id, "Session started");

        session.phase = Phase::Perceiving;
        if let Err(e) = self.perception.run(session).await {
            return Err(Self::fail(session, e));
        }

        loop {
            session.phase = Phase::Hypothesizing;
            if let Err(e) = self
                .hypothesis
                .run_validated(session, self.config.min_hypothesis_confidence)
                .await
            {
                return Err(Self::fail(session, e));
            }

            session.phase = Phase::Retrieving;
            if let Err(e) = self.retrieval.run(session).await {
                return Err(Self::fail(session, e));
            }

            session.phase = Phase::Verifying;
            if let Err(e) = self.verification.run(session).await {
                return Err(Self::fail(session, e));
            }

            let confidence = session
                .final_prediction
                .as_ref()
                .map_or(0.0, |p| p.confidence);

            match Self::next_after_verification(confidence, session.iteration, &self.config) {
                Phase::Hypothesizing => {
                    session.iteration += 1;
                    tracing::info!(
                        session = %session.id,
                        confidence = confidence,
                        threshold = self.config.confidence_threshold,
                        iteration = session.iteration,
                        "Under-confident prediction, looping back to hypothesis stage"
                    );
                    // hypotheses stay as the refinement seed; downstream
                    // output is rebuilt from scratch
                    session.candidates.clear();
                    session.evidence.clear();
                    session.final_prediction = None;
                }
                _ => {
                    session.phase = Phase::Done;
                    break;
                }
            }
        }

        let prediction = session
            .final_prediction
            .clone()
            .ok_or_else(|| PipelineError::new(Phase::Done, StageError::NoSurvivors("prediction")))?;

        tracing::info!(
            session = %session.id,
            lat = prediction.lat,
            lon = prediction.lon,
            confidence = prediction.confidence,
            iterations = session.iteration,
            "Session completed"
        );
        Ok(prediction)
    }

    /// Record the failure on the session and wrap it with the failing phase
    fn fail(session: &mut ReasoningSession, source: StageError) -> PipelineError {
        let error = PipelineError::new(session.phase, source);
        tracing::error!(session = %session.id, error = %error, "Session failed");
        session.error = Some(error.to_string());
        error
    }
}
