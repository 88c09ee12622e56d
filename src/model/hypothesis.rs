//! Geographic region hypotheses produced by the hypothesis stage

use serde::{Deserialize, Serialize};

/// A ranked guess about the broad geographic region depicted.
///
/// The region label is a coarse-to-fine path such as `France/Paris` or a
/// single country name; the retrieval stage turns it into concrete
/// coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionHypothesis {
    /// Non-empty region label, e.g. `Japan/Tokyo`
    pub region: String,
    /// Reasoning steps that led to this hypothesis
    #[serde(default)]
    pub rationale: Vec<String>,
    /// Clues supporting the hypothesis
    #[serde(default)]
    pub supporting: Vec<String>,
    /// Clues conflicting with the hypothesis
    #[serde(default)]
    pub conflicting: Vec<String>,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
}

impl RegionHypothesis {
    /// Placeholder emitted when the image yields no usable signal; keeps
    /// the pipeline moving instead of stalling on a featureless image.
    pub fn placeholder(region: &str) -> Self {
        Self {
            region: region.to_string(),
            rationale: vec!["no usable clues were extracted from the image".to_string()],
            supporting: Vec::new(),
            conflicting: Vec::new(),
            confidence: 0.3,
        }
    }
}

/// Sort hypotheses by descending confidence, preserving order for ties
pub fn sort_by_confidence(hypotheses: &mut [RegionHypothesis]) {
    hypotheses.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
