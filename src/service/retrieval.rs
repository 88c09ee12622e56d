//! Retrieval stage: hypotheses to concrete coordinate candidates.
//!
//! Each hypothesis becomes a short query (region label plus up to three
//! supporting clues) answered by the geo-retrieval service. Candidates are
//! scored with the hypothesis confidence: retrieval ranks *where*, the
//! hypotheses already ranked *how sure*. Per-hypothesis calls run
//! concurrently; a failing call is logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::backend::{with_timeout, BackendError, GeoRetrieval};
use crate::model::candidate::sort_by_score;
use crate::model::{
    ImageRef, PlaceCandidate, ReasoningSession, RegionHypothesis, RetrievalMethod,
    RetrievalStrategy,
};
use crate::service::error::StageError;

/// Geographic scales swept by the multi-scale strategy
const SCALES: &[&str] = &["city", "region", "country"];

pub struct RetrievalStage {
    retrieval: Arc<dyn GeoRetrieval>,
    strategy: RetrievalStrategy,
    top_k: usize,
    call_timeout: Duration,
}

/// Outcome of one full retrieval pass: the surviving candidates and the
/// first backend error seen, kept so a total failure can be reported as a
/// service error instead of an empty result
struct PassOutcome {
    candidates: Vec<PlaceCandidate>,
    first_error: Option<BackendError>,
}

impl RetrievalStage {
    pub fn new(
        retrieval: Arc<dyn GeoRetrieval>,
        strategy: RetrievalStrategy,
        top_k: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            retrieval,
            strategy,
            top_k,
            call_timeout,
        }
    }

    /// Resolve the session's hypotheses into ranked coordinate candidates
    pub async fn run(&self, session: &mut ReasoningSession) -> Result<(), StageError> {
        if session.hypotheses.is_empty() {
            return Err(StageError::Validation("hypotheses"));
        }

        tracing::info!(
            session = %session.id,
            hypothesis_count = session.hypotheses.len(),
            strategy = ?self.strategy,
            "Retrieval stage started"
        );

        let outcome = match self.strategy {
            RetrievalStrategy::Direct => {
                self.pass(&session.image, &session.hypotheses, RetrievalMethod::ImageText, None)
                    .await
            }
            RetrievalStrategy::Fallback => {
                self.fallback_pass(&session.image, &session.hypotheses).await
            }
            RetrievalStrategy::MultiScale => {
                self.multi_scale_pass(&session.image, &session.hypotheses).await
            }
            RetrievalStrategy::Ensemble => {
                self.ensemble_pass(&session.image, &session.hypotheses).await
            }
        };

        let mut candidates = outcome.candidates;
        if candidates.is_empty() {
            // a total wipe-out caused by collaborator failures surfaces as
            // the service error, not as an empty stage
            return Err(match outcome.first_error {
                Some(e) => StageError::Backend(e),
                None => StageError::NoSurvivors("candidates"),
            });
        }

        sort_by_score(&mut candidates);
        if candidates.len() > self.top_k {
            tracing::debug!(
                from_count = candidates.len(),
                to_count = self.top_k,
                "Truncating candidate list"
            );
            candidates.truncate(self.top_k);
        }

        tracing::info!(
            session = %session.id,
            candidate_count = candidates.len(),
            top_score = candidates[0].score,
            "Retrieval stage completed"
        );

        session.candidates = candidates;
        Ok(())
    }

    /// One retrieval pass over all hypotheses, issued concurrently
    async fn pass(
        &self,
        image: &ImageRef,
        hypotheses: &[RegionHypothesis],
        method: RetrievalMethod,
        scale: Option<&str>,
    ) -> PassOutcome {
        let futures: Vec<_> = hypotheses
            .iter()
            .map(|h| self.locate_one(image, h, method, scale))
            .collect();

        let mut candidates = Vec::new();
        let mut first_error = None;

        for (hypothesis, result) in hypotheses.iter().zip(join_all(futures).await) {
            match result {
                Ok(Some(candidate)) => candidates.push(candidate),
                Ok(None) => {
                    tracing::debug!(region = %hypothesis.region, "No retrieval hit for hypothesis");
                }
                Err(e) => {
                    tracing::warn!(
                        region = %hypothesis.region,
                        error = %e,
                        "Retrieval failed for hypothesis, skipping"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        PassOutcome {
            candidates,
            first_error,
        }
    }

    /// Resolve one hypothesis into at most one candidate
    async fn locate_one(
        &self,
        image: &ImageRef,
        hypothesis: &RegionHypothesis,
        method: RetrievalMethod,
        scale: Option<&str>,
    ) -> Result<Option<PlaceCandidate>, BackendError> {
        let mut query = build_query(hypothesis);
        if let Some(scale) = scale {
            query = format!("{query}, {scale} level");
        }

        let (image_arg, text_arg) = match method {
            RetrievalMethod::ImageText => (Some(image), Some(query.as_str())),
            RetrievalMethod::ImageOnly => (Some(image), None),
            RetrievalMethod::TextOnly => (None, Some(query.as_str())),
        };

        let hits = with_timeout(
            self.call_timeout,
            self.retrieval.locate(image_arg, text_arg, 1),
        )
        .await?;

        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let candidate = PlaceCandidate {
            name: hit.name.unwrap_or_else(|| hypothesis.region.clone()),
            lat: hit.lat,
            lon: hit.lon,
            source_hypothesis: hypothesis.region.clone(),
            // hypothesis confidence carries the ranking; the retrieval
            // similarity is kept as metadata only
            score: hypothesis.confidence,
            retrieval_method: method,
            metadata: {
                let mut metadata = std::collections::BTreeMap::new();
                metadata.insert("retrieval_score".to_string(), serde_json::json!(hit.score));
                if let Some(scale) = scale {
                    metadata.insert("scale".to_string(), serde_json::json!(scale));
                }
                metadata
            },
        };

        if !candidate.in_valid_range() {
            tracing::warn!(
                region = %hypothesis.region,
                lat = candidate.lat,
                lon = candidate.lon,
                "Dropping candidate with out-of-range coordinates"
            );
            return Ok(None);
        }

        Ok(Some(candidate))
    }

    /// Image+text, degrading to text-only when the first pass yields nothing
    async fn fallback_pass(
        &self,
        image: &ImageRef,
        hypotheses: &[RegionHypothesis],
    ) -> PassOutcome {
        let primary = self
            .pass(image, hypotheses, RetrievalMethod::ImageText, None)
            .await;
        if !primary.candidates.is_empty() {
            return primary;
        }

        tracing::warn!("Image+text retrieval yielded nothing, degrading to text-only");
        let mut secondary = self
            .pass(image, hypotheses, RetrievalMethod::TextOnly, None)
            .await;
        if secondary.first_error.is_none() {
            secondary.first_error = primary.first_error;
        }
        secondary
    }

    /// Sweep the scales and deduplicate by grid cell, keeping the
    /// highest-scoring candidate per cell
    async fn multi_scale_pass(
        &self,
        image: &ImageRef,
        hypotheses: &[RegionHypothesis],
    ) -> PassOutcome {
        let mut all = Vec::new();
        let mut first_error = None;

        for scale in SCALES {
            let outcome = self
                .pass(image, hypotheses, RetrievalMethod::ImageText, Some(scale))
                .await;
            all.extend(outcome.candidates);
            if first_error.is_none() {
                first_error = outcome.first_error;
            }
        }

        let mut by_cell: HashMap<(i64, i64), PlaceCandidate> = HashMap::new();
        let total = all.len();
        for candidate in all {
            match by_cell.entry(candidate.cell_key()) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    if candidate.score > slot.get().score {
                        slot.insert(candidate);
                    }
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }

        let candidates: Vec<PlaceCandidate> = by_cell.into_values().collect();
        tracing::debug!(
            total = total,
            unique = candidates.len(),
            "Multi-scale retrieval deduplicated by grid cell"
        );

        PassOutcome {
            candidates,
            first_error,
        }
    }

    /// Two independent passes merged by grid cell; co-located candidates
    /// reinforce each other by summing scores, capped to keep scores in
    /// `[0, 1]`
    async fn ensemble_pass(
        &self,
        image: &ImageRef,
        hypotheses: &[RegionHypothesis],
    ) -> PassOutcome {
        let primary = self.fallback_pass(image, hypotheses).await;
        let secondary = self
            .pass(image, hypotheses, RetrievalMethod::ImageOnly, None)
            .await;

        let first_error = primary.first_error.or(secondary.first_error);

        let mut by_cell: HashMap<(i64, i64), PlaceCandidate> = HashMap::new();
        for candidate in primary.candidates.into_iter().chain(secondary.candidates) {
            match by_cell.entry(candidate.cell_key()) {
                std::collections::hash_map::Entry::Occupied(mut slot) => {
                    let merged = slot.get_mut();
                    merged.score = (merged.score + candidate.score).min(1.0);
                }
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
            }
        }

        PassOutcome {
            candidates: by_cell.into_values().collect(),
            first_error,
        }
    }
}

/// Query string for a hypothesis: region label plus up to three supporting
/// clues
fn build_query(hypothesis: &RegionHypothesis) -> String {
    let mut parts = vec![hypothesis.region.clone()];
    parts.extend(hypothesis.supporting.iter().take(3).cloned());
    parts.join(", ")
}
