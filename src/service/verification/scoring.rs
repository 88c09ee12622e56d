//! Evidence blending for candidate scores

use crate::model::ScoringWeights;

/// Blend a candidate's prior score with the mean confidence of its
/// collected evidence:
///
/// `new = old * prior + mean(c₁..cₖ) * evidence`
///
/// With no evidence the score is returned untouched, so candidates no
/// verifier could assess keep their retrieval ranking.
pub fn blend_score(old: f64, evidence_confidences: &[f64], weights: &ScoringWeights) -> f64 {
    if evidence_confidences.is_empty() {
        return old;
    }
    let mean =
        evidence_confidences.iter().sum::<f64>() / evidence_confidences.len() as f64;
    (old * weights.prior + mean * weights.evidence).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn no_evidence_is_an_exact_no_op() {
        let weights = ScoringWeights::default();
        assert_eq!(blend_score(0.37, &[], &weights), 0.37);
        assert_eq!(blend_score(0.0, &[], &weights), 0.0);
        assert_eq!(blend_score(1.0, &[], &weights), 1.0);
    }

    #[test]
    fn default_weights_follow_the_stated_formula() {
        let weights = ScoringWeights::default();
        let confidences = [0.9, 0.7, 0.5];
        let mean = (0.9 + 0.7 + 0.5) / 3.0;
        let expected = 0.5 * 0.6 + mean * 0.4;
        assert!((blend_score(0.5, &confidences, &weights) - expected).abs() < TOLERANCE);
    }

    #[test]
    fn single_evidence_item_blends() {
        let weights = ScoringWeights::default();
        let expected = 0.8 * 0.6 + 0.95 * 0.4;
        assert!((blend_score(0.8, &[0.95], &weights) - expected).abs() < TOLERANCE);
    }

    #[test]
    fn strong_evidence_raises_a_weak_score() {
        let weights = ScoringWeights::default();
        assert!(blend_score(0.4, &[0.95], &weights) > 0.4);
    }

    #[test]
    fn weak_evidence_lowers_a_strong_score() {
        let weights = ScoringWeights::default();
        assert!(blend_score(0.9, &[0.1], &weights) < 0.9);
    }

    #[test]
    fn result_stays_in_unit_interval() {
        let weights = ScoringWeights::default();
        for old in [0.0, 0.3, 1.0] {
            for conf in [0.0, 0.5, 1.0] {
                let blended = blend_score(old, &[conf], &weights);
                assert!((0.0..=1.0).contains(&blended));
            }
        }
    }

    #[test]
    fn custom_weights_are_honored() {
        let weights = ScoringWeights {
            prior: 0.5,
            evidence: 0.5,
        };
        let expected = 0.6 * 0.5 + 0.8 * 0.5;
        assert!((blend_score(0.6, &[0.8], &weights) - expected).abs() < TOLERANCE);
    }
}
