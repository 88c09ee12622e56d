//! Concrete coordinate candidates, verification evidence and the final prediction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a candidate was retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMethod {
    ImageText,
    ImageOnly,
    TextOnly,
}

/// A concrete lat/lon guess derived from one hypothesis.
///
/// The score starts as the source hypothesis's confidence and is updated in
/// place by the verification stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub name: String,
    /// Latitude in `[-90, 90]`
    pub lat: f64,
    /// Longitude in `[-180, 180]`
    pub lon: f64,
    /// Region label of the hypothesis this candidate came from
    pub source_hypothesis: String,
    /// Ranking score in `[0, 1]`
    pub score: f64,
    pub retrieval_method: RetrievalMethod,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl PlaceCandidate {
    pub fn in_valid_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Grid-cell key at roughly 1 km resolution, used for deduplication and
    /// ensemble merging. Two decimal degrees is ~1.1 km at the equator.
    pub fn cell_key(&self) -> (i64, i64) {
        ((self.lat * 100.0).round() as i64, (self.lon * 100.0).round() as i64)
    }
}

/// Did a verifier's check pass for this candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceOutcome {
    Pass,
    Fail,
    Uncertain,
}

/// One verifier's finding about one candidate. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Name of the candidate the finding is about
    pub candidate: String,
    /// Index of the candidate in the pre-verification ordering; candidate
    /// names are not guaranteed unique
    pub candidate_index: usize,
    /// Verifier name, e.g. `ocr_place`
    pub kind: String,
    /// Human-readable summary of the finding
    pub value: String,
    pub outcome: EvidenceOutcome,
    /// Finding confidence in `[0, 1]`
    pub confidence: f64,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// The session's answer: one coordinate with confidence and rationale
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalPrediction {
    /// Place name or a formatted coordinate when no name is known
    pub answer: String,
    pub lat: f64,
    pub lon: f64,
    /// Calibrated confidence in `[0, 1]`
    pub confidence: f64,
    /// Why this candidate won
    pub rationale: String,
    /// Evidence summaries supporting the answer
    #[serde(default)]
    pub supporting: Vec<String>,
    /// Why the runner-up candidates were excluded
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Per-stage trace of how the answer was reached
    #[serde(default)]
    pub reasoning_path: Vec<String>,
}

/// Sort candidates by descending score, preserving order for ties
pub fn sort_by_score(candidates: &mut [PlaceCandidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(lat: f64, lon: f64, score: f64) -> PlaceCandidate {
        PlaceCandidate {
            name: "somewhere".to_string(),
            lat,
            lon,
            source_hypothesis: "Test".to_string(),
            score,
            retrieval_method: RetrievalMethod::TextOnly,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn range_check() {
        assert!(candidate(48.858, 2.294, 0.5).in_valid_range());
        assert!(!candidate(91.0, 0.0, 0.5).in_valid_range());
        assert!(!candidate(0.0, -181.0, 0.5).in_valid_range());
    }

    #[test]
    fn cell_key_groups_nearby_points() {
        let a = candidate(48.8583, 2.2945, 0.5);
        let b = candidate(48.8581, 2.2949, 0.4);
        let c = candidate(48.9000, 2.2945, 0.4);
        assert_eq!(a.cell_key(), b.cell_key());
        assert_ne!(a.cell_key(), c.cell_key());
    }

    #[test]
    fn sort_is_descending() {
        let mut cs = vec![
            candidate(0.0, 0.0, 0.2),
            candidate(0.0, 0.0, 0.9),
            candidate(0.0, 0.0, 0.5),
        ];
        sort_by_score(&mut cs);
        let scores: Vec<_> = cs.iter().map(|c| c.score).collect();
        assert_eq!(scores, [0.9, 0.5, 0.2]);
    }
}
