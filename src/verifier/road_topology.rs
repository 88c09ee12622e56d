//! Road-topology check.
//!
//! Compares road-related traits observed in the image against whatever road
//! information the retrieval hit carried in its metadata (`roads`, a list of
//! road names or descriptors). Applicable only when both sides have data.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Finding, Verdict, Verifier, VerifierError};
use crate::model::{Clues, EvidenceOutcome, PlaceCandidate};

/// Match fraction at or above this counts as a pass
const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Categories of visual observations that describe road structure
const ROAD_CATEGORIES: &[&str] = &["road", "street", "highway", "lane", "intersection", "road_marking"];

pub struct RoadTopologyVerifier {
    threshold: f64,
}

impl Default for RoadTopologyVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl RoadTopologyVerifier {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    fn observed_road_features(clues: &Clues) -> Vec<String> {
        clues
            .visual
            .iter()
            .filter(|obs| {
                let category = obs.category.to_lowercase();
                ROAD_CATEGORIES.iter().any(|c| category.contains(c))
            })
            .map(|obs| obs.value.clone())
            .collect()
    }

    fn candidate_roads(candidate: &PlaceCandidate) -> Vec<String> {
        candidate
            .metadata
            .get("roads")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Fraction of observed features contained in the candidate's road text
fn contains_match(candidate_text: &str, observed: &[String]) -> f64 {
    if observed.is_empty() {
        return 0.0;
    }
    let haystack = candidate_text.to_lowercase();
    let matched = observed
        .iter()
        .filter(|feature| haystack.contains(&feature.to_lowercase()))
        .count();
    matched as f64 / observed.len() as f64
}

#[async_trait]
impl Verifier for RoadTopologyVerifier {
    fn name(&self) -> &'static str {
        "road_topology"
    }

    async fn verify(
        &self,
        candidate: &PlaceCandidate,
        clues: &Clues,
    ) -> Result<Verdict, VerifierError> {
        let observed = Self::observed_road_features(clues);
        let roads = Self::candidate_roads(candidate);

        if observed.is_empty() || roads.is_empty() {
            return Ok(Verdict::inapplicable());
        }

        let score = contains_match(&roads.join(" "), &observed);

        let outcome = if score >= self.threshold {
            EvidenceOutcome::Pass
        } else if score > 0.0 {
            EvidenceOutcome::Uncertain
        } else {
            EvidenceOutcome::Fail
        };

        tracing::debug!(
            candidate = %candidate.name,
            score = score,
            observed_count = observed.len(),
            road_count = roads.len(),
            "Road topology check completed"
        );

        let mut details = BTreeMap::new();
        details.insert("observed_count".to_string(), serde_json::json!(observed.len()));
        details.insert("road_count".to_string(), serde_json::json!(roads.len()));
        details.insert("threshold".to_string(), serde_json::json!(self.threshold));

        Ok(Verdict::single(Finding {
            value: format!(
                "matched {:.0}% of observed road features",
                score * 100.0
            ),
            outcome,
            confidence: score.clamp(0.0, 1.0),
            details,
        }))
    }
}
