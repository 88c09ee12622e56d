//! Verification stage: score candidates against evidence and emit the
//! final prediction.
//!
//! Every candidate is checked by the enabled verifiers; each verifier's
//! findings become immutable evidence and feed the score blend. Candidates
//! are re-ranked, optionally reviewed by the LLM judge, and the winner is
//! assembled into the final prediction with supporting and excluding
//! rationale.

pub mod judge;
pub mod prompts;
pub mod scoring;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::model::candidate::sort_by_score;
use crate::model::{
    Clues, Evidence, EvidenceOutcome, FinalPrediction, PlaceCandidate, ReasoningSession,
    ScoringWeights,
};
use crate::service::error::StageError;
use crate::verifier::Verifier;

pub use judge::RankingJudge;

use judge::apply_ranking;
use scoring::blend_score;

pub struct VerificationStage {
    verifiers: Vec<Arc<dyn Verifier>>,
    judge: Option<RankingJudge>,
    weights: ScoringWeights,
    call_timeout: Duration,
}

impl VerificationStage {
    pub fn new(
        verifiers: Vec<Arc<dyn Verifier>>,
        judge: Option<RankingJudge>,
        weights: ScoringWeights,
        call_timeout: Duration,
    ) -> Self {
        Self {
            verifiers,
            judge,
            weights,
            call_timeout,
        }
    }

    /// Verify the session's candidates and write the re-ranked list, the
    /// collected evidence and the final prediction back to the session
    pub async fn run(&self, session: &mut ReasoningSession) -> Result<(), StageError> {
        if session.candidates.is_empty() {
            return Err(StageError::Validation("candidates"));
        }

        let clues = match &session.clues {
            Some(clues) => clues.clone(),
            None => {
                tracing::warn!(
                    session = %session.id,
                    "Clues missing, verifier coverage is degraded"
                );
                Clues::default()
            }
        };

        tracing::info!(
            session = %session.id,
            candidate_count = session.candidates.len(),
            verifier_count = self.verifiers.len(),
            use_judge = self.judge.is_some(),
            "Verification stage started"
        );

        let mut candidates = std::mem::take(&mut session.candidates);

        // all candidates verify concurrently; within one candidate the
        // enabled verifiers also run concurrently
        let verify_futures: Vec<_> = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| self.verify_candidate(index, candidate, &clues))
            .collect();
        let per_candidate_evidence = join_all(verify_futures).await;

        let mut all_evidence = Vec::new();
        for (candidate, evidence) in candidates.iter_mut().zip(per_candidate_evidence) {
            let confidences: Vec<f64> = evidence.iter().map(|e| e.confidence).collect();
            let old_score = candidate.score;
            candidate.score = blend_score(old_score, &confidences, &self.weights);

            tracing::debug!(
                candidate = %candidate.name,
                old_score = old_score,
                new_score = candidate.score,
                evidence_count = evidence.len(),
                "Candidate score updated"
            );
            all_evidence.extend(evidence);
        }

        sort_by_score(&mut candidates);

        if let Some(judge) = &self.judge {
            if let Some(ranking) = judge.review(&candidates, &all_evidence).await {
                candidates = apply_ranking(candidates, &ranking);
            }
        }

        let prediction = build_prediction(session, &candidates, &all_evidence);

        tracing::info!(
            session = %session.id,
            lat = prediction.lat,
            lon = prediction.lon,
            confidence = prediction.confidence,
            passed_evidence = all_evidence
                .iter()
                .filter(|e| e.outcome == EvidenceOutcome::Pass)
                .count(),
            "Verification stage completed"
        );

        session.candidates = candidates;
        session.evidence.extend(all_evidence);
        session.final_prediction = Some(prediction);
        Ok(())
    }

    /// Run every enabled verifier against one candidate; a verifier failure
    /// contributes zero evidence without aborting the others
    async fn verify_candidate(
        &self,
        index: usize,
        candidate: &PlaceCandidate,
        clues: &Clues,
    ) -> Vec<Evidence> {
        let checks: Vec<_> = self
            .verifiers
            .iter()
            .map(|verifier| async move {
                let result = crate::backend::with_timeout(self.call_timeout, async {
                    verifier
                        .verify(candidate, clues)
                        .await
                        .map_err(|e| crate::backend::BackendError::Service(e.to_string()))
                })
                .await;
                (verifier.name(), result)
            })
            .collect();

        let mut evidence = Vec::new();
        for (name, result) in join_all(checks).await {
            match result {
                Ok(verdict) => {
                    for finding in verdict.findings {
                        evidence.push(Evidence {
                            candidate: candidate.name.clone(),
                            candidate_index: index,
                            kind: name.to_string(),
                            value: finding.value,
                            outcome: finding.outcome,
                            confidence: finding.confidence.clamp(0.0, 1.0),
                            details: finding.details,
                        });
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        candidate = %candidate.name,
                        verifier = name,
                        error = %e,
                        "Verifier failed, contributing zero evidence"
                    );
                }
            }
        }
        evidence
    }
}

/// Assemble the final prediction from the ranked candidates and evidence
fn build_prediction(
    session: &ReasoningSession,
    candidates: &[PlaceCandidate],
    evidence: &[Evidence],
) -> FinalPrediction {
    let top = &candidates[0];

    let supporting: Vec<String> = evidence
        .iter()
        .filter(|e| e.outcome == EvidenceOutcome::Pass)
        .take(3)
        .map(|e| format!("{}: {}", e.kind, e.value))
        .collect();

    let excluded: Vec<String> = candidates[1..]
        .iter()
        .map(|c| format!("{} scored lower ({:.2})", c.name, c.score))
        .collect();

    let answer = if top.name.trim().is_empty() {
        format!("{:.4}, {:.4}", top.lat, top.lon)
    } else {
        top.name.clone()
    };

    let rationale = if supporting.is_empty() {
        format!("highest-scoring candidate {answer} with no passing verifier evidence")
    } else {
        format!(
            "highest-scoring candidate {answer}, supported by: {}",
            supporting.join("; ")
        )
    };

    let clue_count = session
        .clues
        .as_ref()
        .map_or(0, |c| c.ocr.len() + c.visual.len());

    FinalPrediction {
        answer,
        lat: top.lat,
        lon: top.lon,
        confidence: top.score,
        rationale,
        supporting,
        excluded,
        reasoning_path: vec![
            format!("perception: extracted {clue_count} clues"),
            format!("hypothesis: proposed {} regions", session.hypotheses.len()),
            format!("retrieval: resolved {} candidates", candidates.len()),
            format!(
                "verification: collected {} evidence items, top score {:.2}",
                evidence.len(),
                top.score
            ),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, TextModel};
    use crate::model::{ImageRef, OcrSnippet, RetrievalMethod};
    use crate::verifier::{Finding, Verdict, VerifierError, VerifierRegistry};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    /// Verifier emitting one finding with a fixed confidence
    struct FixedVerifier {
        confidence: f64,
        outcome: EvidenceOutcome,
    }

    #[async_trait]
    impl Verifier for FixedVerifier {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn verify(
            &self,
            _candidate: &PlaceCandidate,
            _clues: &Clues,
        ) -> Result<Verdict, VerifierError> {
            Ok(Verdict::single(Finding {
                value: "fixed check".to_string(),
                outcome: self.outcome,
                confidence: self.confidence,
                details: BTreeMap::new(),
            }))
        }
    }

    /// Verifier that always fails
    struct BrokenVerifier;

    #[async_trait]
    impl Verifier for BrokenVerifier {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn verify(
            &self,
            _candidate: &PlaceCandidate,
            _clues: &Clues,
        ) -> Result<Verdict, VerifierError> {
            Err(VerifierError::CheckFailed("broken on purpose".to_string()))
        }
    }

    fn candidate(name: &str, score: f64) -> PlaceCandidate {
        PlaceCandidate {
            name: name.to_string(),
            lat: 48.858,
            lon: 2.294,
            source_hypothesis: "France/Paris".to_string(),
            score,
            retrieval_method: RetrievalMethod::ImageText,
            metadata: BTreeMap::new(),
        }
    }

    fn session_with_candidates(candidates: Vec<PlaceCandidate>) -> ReasoningSession {
        let mut session = ReasoningSession::new(ImageRef::Path(PathBuf::from("photo.jpg")));
        session.clues = Some(Clues {
            ocr: vec![OcrSnippet {
                text: "Eiffel Tower".to_string(),
                bbox: None,
                confidence: 0.9,
                language: None,
            }],
            ..Default::default()
        });
        session.candidates = candidates;
        session
    }

    fn stage_with(verifiers: Vec<Arc<dyn Verifier>>) -> VerificationStage {
        VerificationStage::new(
            verifiers,
            None,
            ScoringWeights::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn empty_candidates_is_a_validation_error() {
        let stage = stage_with(vec![]);
        let mut session = session_with_candidates(vec![]);
        let err = stage.run(&mut session).await.unwrap_err();
        assert!(matches!(err, StageError::Validation("candidates")));
    }

    #[tokio::test]
    async fn scores_blend_with_evidence_and_stay_sorted() {
        let stage = stage_with(vec![Arc::new(FixedVerifier {
            confidence: 0.9,
            outcome: EvidenceOutcome::Pass,
        })]);
        let mut session =
            session_with_candidates(vec![candidate("a", 0.5), candidate("b", 0.7)]);

        stage.run(&mut session).await.unwrap();

        let expected_b = 0.7 * 0.6 + 0.9 * 0.4;
        let expected_a = 0.5 * 0.6 + 0.9 * 0.4;
        assert_eq!(session.candidates[0].name, "b");
        assert!((session.candidates[0].score - expected_b).abs() < 1e-12);
        assert!((session.candidates[1].score - expected_a).abs() < 1e-12);
        assert!(session
            .candidates
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
        assert!(session
            .candidates
            .iter()
            .all(|c| (0.0..=1.0).contains(&c.score)));
    }

    #[tokio::test]
    async fn no_verifiers_leaves_scores_untouched() {
        let stage = stage_with(vec![]);
        let mut session = session_with_candidates(vec![candidate("a", 0.42)]);

        stage.run(&mut session).await.unwrap();

        assert_eq!(session.candidates[0].score, 0.42);
        assert!(session.evidence.is_empty());
    }

    #[tokio::test]
    async fn broken_verifier_contributes_zero_evidence_without_aborting() {
        let stage = stage_with(vec![
            Arc::new(BrokenVerifier),
            Arc::new(FixedVerifier {
                confidence: 0.8,
                outcome: EvidenceOutcome::Pass,
            }),
        ]);
        let mut session = session_with_candidates(vec![candidate("a", 0.5)]);

        stage.run(&mut session).await.unwrap();

        // only the working verifier's evidence arrived
        assert_eq!(session.evidence.len(), 1);
        assert_eq!(session.evidence[0].kind, "fixed");
        let expected = 0.5 * 0.6 + 0.8 * 0.4;
        assert!((session.candidates[0].score - expected).abs() < 1e-12);
    }

    #[tokio::test]
    async fn missing_clues_degrades_but_completes() {
        let stage = stage_with(vec![Arc::new(FixedVerifier {
            confidence: 0.8,
            outcome: EvidenceOutcome::Pass,
        })]);
        let mut session = session_with_candidates(vec![candidate("a", 0.5)]);
        session.clues = None;

        stage.run(&mut session).await.unwrap();
        assert!(session.final_prediction.is_some());
    }

    #[tokio::test]
    async fn builtin_registry_raises_matching_candidate() {
        let registry = VerifierRegistry::builtin();
        let verifiers = registry.resolve(&["ocr_place".to_string()]);
        let stage = stage_with(verifiers);
        let mut session = session_with_candidates(vec![
            candidate("Eiffel Tower", 0.6),
            candidate("Tokyo Station", 0.6),
        ]);

        stage.run(&mut session).await.unwrap();

        assert_eq!(session.candidates[0].name, "Eiffel Tower");
        assert!(session.candidates[0].score > 0.6);
    }

    #[tokio::test]
    async fn prediction_carries_support_and_exclusions() {
        let stage = stage_with(vec![Arc::new(FixedVerifier {
            confidence: 0.9,
            outcome: EvidenceOutcome::Pass,
        })]);
        let mut session =
            session_with_candidates(vec![candidate("winner", 0.8), candidate("runner-up", 0.4)]);

        stage.run(&mut session).await.unwrap();

        let prediction = session.final_prediction.unwrap();
        assert_eq!(prediction.answer, "winner");
        assert!(!prediction.supporting.is_empty());
        assert_eq!(prediction.excluded.len(), 1);
        assert!(prediction.excluded[0].contains("runner-up"));
        assert_eq!(prediction.reasoning_path.len(), 4);
    }

    /// Judge stub that reverses the shown order
    struct ReversingJudge;

    #[async_trait]
    impl TextModel for ReversingJudge {
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
            Ok(serde_json::json!({"ranking": [1, 0]}))
        }
    }

    /// Judge stub whose output never parses
    struct GarbageJudge;

    #[async_trait]
    impl TextModel for GarbageJudge {
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
            Err(BackendError::Parse("gibberish".to_string()))
        }
    }

    #[tokio::test]
    async fn judge_override_reorders_candidates() {
        let judge = RankingJudge::new(Arc::new(ReversingJudge), 3, Duration::from_secs(5));
        let stage = VerificationStage::new(
            vec![],
            Some(judge),
            ScoringWeights::default(),
            Duration::from_secs(5),
        );
        let mut session =
            session_with_candidates(vec![candidate("first", 0.9), candidate("second", 0.5)]);

        stage.run(&mut session).await.unwrap();

        assert_eq!(session.candidates[0].name, "second");
        assert_eq!(session.final_prediction.unwrap().answer, "second");
    }

    #[tokio::test]
    async fn unparseable_judge_keeps_pre_judge_ranking() {
        let judge = RankingJudge::new(Arc::new(GarbageJudge), 3, Duration::from_secs(5));
        let stage = VerificationStage::new(
            vec![],
            Some(judge),
            ScoringWeights::default(),
            Duration::from_secs(5),
        );
        let mut session =
            session_with_candidates(vec![candidate("first", 0.9), candidate("second", 0.5)]);

        stage.run(&mut session).await.unwrap();

        assert_eq!(session.candidates[0].name, "first");
        assert_eq!(session.final_prediction.unwrap().answer, "first");
    }
}
