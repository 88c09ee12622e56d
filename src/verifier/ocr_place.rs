//! OCR-to-place fuzzy matcher.
//!
//! Compares recognized text fragments against the candidate's place names.
//! Each snippet is matched against the best-fitting name; the verdict
//! confidence is the mean of the per-snippet best scores.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Finding, Verdict, Verifier, VerifierError};
use crate::model::{Clues, EvidenceOutcome, PlaceCandidate};

/// Similarity at or above this counts as a match
const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;

pub struct OcrPlaceVerifier {
    threshold: f64,
}

impl Default for OcrPlaceVerifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl OcrPlaceVerifier {
    pub fn with_threshold(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Names the candidate is known by: its own name plus the components of
    /// the source hypothesis region path
    fn candidate_names(candidate: &PlaceCandidate) -> Vec<String> {
        let mut names = vec![candidate.name.clone()];
        names.extend(
            candidate
                .source_hypothesis
                .split('/')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );
        names
    }
}

/// Lowercase, strip punctuation, collapse whitespace
fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Similarity of two place strings in `[0, 1]`: containment short-circuits
/// to the Jaro-Winkler score floor of 0.9, otherwise plain Jaro-Winkler
fn similarity(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let jw = strsim::jaro_winkler(&a, &b);
    if a.contains(&b) || b.contains(&a) {
        jw.max(0.9)
    } else {
        jw
    }
}

#[async_trait]
impl Verifier for OcrPlaceVerifier {
    fn name(&self) -> &'static str {
        "ocr_place"
    }

    async fn verify(
        &self,
        candidate: &PlaceCandidate,
        clues: &Clues,
    ) -> Result<Verdict, VerifierError> {
        if clues.ocr.is_empty() {
            return Ok(Verdict::inapplicable());
        }

        let names = Self::candidate_names(candidate);

        let mut matches = Vec::new();
        let mut total_score = 0.0;

        for snippet in &clues.ocr {
            let mut best_score = 0.0;
            let mut best_name = None;

            for name in &names {
                let score = similarity(&snippet.text, name);
                if score > best_score {
                    best_score = score;
                    best_name = Some(name.clone());
                }
            }

            if let Some(name) = best_name {
                matches.push(serde_json::json!({
                    "ocr_text": snippet.text,
                    "place_name": name,
                    "score": best_score,
                    "matched": best_score >= self.threshold,
                }));
            }
            total_score += best_score;
        }

        let avg_score = total_score / clues.ocr.len() as f64;
        let matched_count = matches
            .iter()
            .filter(|m| m["matched"].as_bool().unwrap_or(false))
            .count();

        let outcome = if avg_score >= self.threshold {
            EvidenceOutcome::Pass
        } else if matched_count > 0 {
            EvidenceOutcome::Uncertain
        } else {
            EvidenceOutcome::Fail
        };

        tracing::debug!(
            candidate = %candidate.name,
            avg_score = avg_score,
            matched = matched_count,
            ocr_count = clues.ocr.len(),
            "OCR-place matching completed"
        );

        let mut details = BTreeMap::new();
        details.insert("matches".to_string(), serde_json::Value::Array(matches));
        details.insert(
            "threshold".to_string(),
            serde_json::json!(self.threshold),
        );

        Ok(Verdict::single(Finding {
            value: format!(
                "matched {matched_count}/{} text fragments against candidate names",
                clues.ocr.len()
            ),
            outcome,
            confidence: avg_score.clamp(0.0, 1.0),
            details,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OcrSnippet, RetrievalMethod};

    fn candidate(name: &str, hypothesis: &str) -> PlaceCandidate {
        PlaceCandidate {
            name: name.to_string(),
            lat: 48.858,
            lon: 2.294,
            source_hypothesis: hypothesis.to_string(),
            score: 0.5,
            retrieval_method: RetrievalMethod::TextOnly,
            metadata: BTreeMap::new(),
        }
    }

    fn clues_with_ocr(texts: &[&str]) -> Clues {
        Clues {
            ocr: texts
                .iter()
                .map(|t| OcrSnippet {
                    text: t.to_string(),
                    bbox: None,
                    confidence: 0.9,
                    language: None,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn normalization_strips_punctuation_and_case() {
        assert_eq!(normalize("Eiffel  Tower!"), "eiffel tower");
        assert_eq!(normalize("  Tour-Eiffel "), "tour eiffel");
    }

    #[test]
    fn exact_name_scores_high() {
        assert!(similarity("Eiffel Tower", "Eiffel Tower") > 0.99);
    }

    #[test]
    fn containment_scores_at_least_point_nine() {
        assert!(similarity("Welcome to the Eiffel Tower entrance", "Eiffel Tower") >= 0.9);
    }

    #[tokio::test]
    async fn matching_ocr_passes() {
        let verifier = OcrPlaceVerifier::default();
        let verdict = verifier
            .verify(
                &candidate("Eiffel Tower", "France/Paris"),
                &clues_with_ocr(&["Eiffel Tower"]),
            )
            .await
            .unwrap();
        assert_eq!(verdict.findings.len(), 1);
        assert_eq!(verdict.findings[0].outcome, EvidenceOutcome::Pass);
        assert!(verdict.findings[0].confidence > 0.9);
    }

    #[tokio::test]
    async fn unrelated_ocr_fails() {
        let verifier = OcrPlaceVerifier::default();
        let verdict = verifier
            .verify(
                &candidate("Eiffel Tower", "France/Paris"),
                &clues_with_ocr(&["qqqq zzzz"]),
            )
            .await
            .unwrap();
        assert_eq!(verdict.findings[0].outcome, EvidenceOutcome::Fail);
    }

    #[tokio::test]
    async fn no_ocr_is_inapplicable() {
        let verifier = OcrPlaceVerifier::default();
        let verdict = verifier
            .verify(&candidate("Eiffel Tower", "France/Paris"), &Clues::default())
            .await
            .unwrap();
        assert!(verdict.findings.is_empty());
    }
}
