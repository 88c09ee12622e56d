//! Hypothesis stage: clues to ranked region hypotheses.
//!
//! Summarizes the clues, asks the text model for structured hypotheses,
//! caps and ranks them. A signal-free clue set short-circuits to a single
//! low-confidence placeholder so the pipeline never stalls on a featureless
//! image. Wrappers add confidence filtering and multi-round refinement.

pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{generate_typed, with_timeout, TextModel};
use crate::model::extract::ExtractedHypotheses;
use crate::model::hypothesis::sort_by_confidence;
use crate::model::{ReasoningSession, RegionHypothesis};
use crate::service::error::StageError;

use prompts::{build_hypothesis_prompt, render_clue_summary, HYPOTHESIS_SYSTEM_PROMPT};

pub struct HypothesisStage {
    llm: Arc<dyn TextModel>,
    max_hypotheses: usize,
    placeholder_region: String,
    call_timeout: Duration,
}

impl HypothesisStage {
    pub fn new(
        llm: Arc<dyn TextModel>,
        max_hypotheses: usize,
        placeholder_region: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            max_hypotheses,
            placeholder_region: placeholder_region.into(),
            call_timeout,
        }
    }

    /// Generate hypotheses from the session's clues and write them to the
    /// session, replacing any previous round
    pub async fn run(&self, session: &mut ReasoningSession) -> Result<(), StageError> {
        let clues = session
            .clues
            .as_ref()
            .ok_or(StageError::Validation("clues"))?;

        tracing::info!(
            session = %session.id,
            ocr_count = clues.ocr.len(),
            visual_count = clues.visual.len(),
            iteration = session.iteration,
            "Hypothesis stage started"
        );

        if !clues.has_signal() {
            tracing::warn!(
                session = %session.id,
                "No usable clues, emitting placeholder hypothesis"
            );
            session.hypotheses = vec![RegionHypothesis::placeholder(&self.placeholder_region)];
            return Ok(());
        }

        let summary = render_clue_summary(clues);
        let previous = if session.hypotheses.is_empty() {
            None
        } else {
            Some(session.hypotheses.as_slice())
        };
        let prompt = build_hypothesis_prompt(&summary, previous);

        let payload: ExtractedHypotheses = with_timeout(
            self.call_timeout,
            generate_typed(self.llm.as_ref(), &prompt, Some(HYPOTHESIS_SYSTEM_PROMPT)),
        )
        .await?;

        let mut hypotheses = payload.into_hypotheses();
        if hypotheses.is_empty() {
            return Err(StageError::NoSurvivors("hypotheses"));
        }

        sort_by_confidence(&mut hypotheses);
        if hypotheses.len() > self.max_hypotheses {
            tracing::debug!(
                from_count = hypotheses.len(),
                to_count = self.max_hypotheses,
                "Truncating hypothesis list"
            );
            hypotheses.truncate(self.max_hypotheses);
        }

        tracing::info!(
            session = %session.id,
            count = hypotheses.len(),
            top_confidence = hypotheses[0].confidence,
            "Hypothesis stage completed"
        );

        session.hypotheses = hypotheses;
        Ok(())
    }

    /// Run the stage, then drop hypotheses below `min_confidence`. When the
    /// filter would empty the list, the highest-confidence hypothesis is
    /// kept so later stages still have something to work with.
    pub async fn run_validated(
        &self,
        session: &mut ReasoningSession,
        min_confidence: f64,
    ) -> Result<(), StageError> {
        self.run(session).await?;

        let before = session.hypotheses.len();
        let survivors: Vec<RegionHypothesis> = session
            .hypotheses
            .iter()
            .filter(|h| h.confidence >= min_confidence)
            .cloned()
            .collect();

        if survivors.is_empty() {
            // list is sorted descending, keep the best one
            session.hypotheses.truncate(1);
        } else {
            session.hypotheses = survivors;
        }

        if session.hypotheses.len() < before {
            tracing::info!(
                session = %session.id,
                original_count = before,
                filtered_count = session.hypotheses.len(),
                threshold = min_confidence,
                "Filtered low-confidence hypotheses"
            );
        }
        Ok(())
    }

    /// Run the stage `rounds` times, feeding each round's hypotheses back
    /// in as refinement context
    pub async fn run_iterative(
        &self,
        session: &mut ReasoningSession,
        rounds: u32,
    ) -> Result<(), StageError> {
        tracing::info!(session = %session.id, rounds = rounds, "Iterative hypothesis generation started");
        for round in 0..rounds.max(1) {
            self.run(session).await?;
            tracing::debug!(
                session = %session.id,
                round = round + 1,
                count = session.hypotheses.len(),
                "Hypothesis refinement round completed"
            );
        }
        Ok(())
    }
}
