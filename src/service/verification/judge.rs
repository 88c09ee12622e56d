//! Optional LLM judge over the verified ranking.
//!
//! The judge sees the top candidates with their evidence and may reorder
//! them. Any failure (the call itself, an undecodable reply, an invalid
//! index set) falls back to the pre-judge ranking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{generate_typed, with_timeout, TextModel};
use crate::model::extract::ExtractedRanking;
use crate::model::{Evidence, PlaceCandidate};

use super::prompts::{build_judge_prompt, JUDGE_SYSTEM_PROMPT};

pub struct RankingJudge {
    llm: Arc<dyn TextModel>,
    top_n: usize,
    call_timeout: Duration,
}

impl RankingJudge {
    pub fn new(llm: Arc<dyn TextModel>, top_n: usize, call_timeout: Duration) -> Self {
        Self {
            llm,
            top_n,
            call_timeout,
        }
    }

    /// Ask the judge to review the top candidates. Returns the approved
    /// ordering as indices into `candidates`, or `None` when the review
    /// failed or produced an unusable ranking.
    pub async fn review(
        &self,
        candidates: &[PlaceCandidate],
        evidence: &[Evidence],
    ) -> Option<Vec<usize>> {
        let reviewed = &candidates[..candidates.len().min(self.top_n)];
        if reviewed.len() < 2 {
            // nothing to reorder
            return None;
        }

        let prompt = build_judge_prompt(reviewed, evidence);

        let ranking: ExtractedRanking = match with_timeout(
            self.call_timeout,
            generate_typed(self.llm.as_ref(), &prompt, Some(JUDGE_SYSTEM_PROMPT)),
        )
        .await
        {
            Ok(ranking) => ranking,
            Err(e) => {
                tracing::warn!(error = %e, "Judge review failed, keeping pre-judge ranking");
                return None;
            }
        };

        if !is_valid_ranking(&ranking.ranking, reviewed.len()) {
            tracing::warn!(
                ranking = ?ranking.ranking,
                reviewed = reviewed.len(),
                "Judge returned an invalid ranking, keeping pre-judge ranking"
            );
            return None;
        }

        tracing::info!(ranking = ?ranking.ranking, "Judge review accepted");
        Some(ranking.ranking)
    }
}

/// A usable ranking covers a non-empty, duplicate-free subset of the
/// reviewed indices
fn is_valid_ranking(ranking: &[usize], reviewed: usize) -> bool {
    if ranking.is_empty() {
        return false;
    }
    let mut seen = HashSet::new();
    ranking
        .iter()
        .all(|&index| index < reviewed && seen.insert(index))
}

/// Apply a judged ordering: judged indices first in judged order, then the
/// remaining candidates in their existing order
pub fn apply_ranking(candidates: Vec<PlaceCandidate>, ranking: &[usize]) -> Vec<PlaceCandidate> {
    let mut taken: Vec<Option<PlaceCandidate>> = candidates.into_iter().map(Some).collect();
    let mut reordered = Vec::with_capacity(taken.len());

    for &index in ranking {
        if let Some(candidate) = taken.get_mut(index).and_then(Option::take) {
            reordered.push(candidate);
        }
    }
    reordered.extend(taken.into_iter().flatten());
    reordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RetrievalMethod;
    use std::collections::BTreeMap;

    fn candidate(name: &str, score: f64) -> PlaceCandidate {
        PlaceCandidate {
            name: name.to_string(),
            lat: 0.0,
            lon: 0.0,
            source_hypothesis: "Test".to_string(),
            score,
            retrieval_method: RetrievalMethod::TextOnly,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn ranking_validation_rejects_bad_shapes() {
        assert!(is_valid_ranking(&[1, 0], 2));
        assert!(is_valid_ranking(&[0], 2));
        assert!(!is_valid_ranking(&[], 2));
        assert!(!is_valid_ranking(&[0, 0], 2));
        assert!(!is_valid_ranking(&[2], 2));
    }

    #[test]
    fn apply_ranking_reorders_and_keeps_the_rest() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.8), candidate("c", 0.7)];
        let reordered = apply_ranking(candidates, &[1, 0]);
        let names: Vec<_> = reordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
    }

    #[test]
    fn apply_ranking_ignores_out_of_range_indices() {
        let candidates = vec![candidate("a", 0.9), candidate("b", 0.8)];
        let reordered = apply_ranking(candidates, &[7, 1]);
        let names: Vec<_> = reordered.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
    }
}
