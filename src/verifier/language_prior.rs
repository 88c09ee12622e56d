//! Language/script region prior.
//!
//! Detects the dominant language and writing system of the recognized text
//! and checks whether the candidate's region is plausible for them. Script
//! agreement alone is weaker evidence than language agreement; both together
//! are strongest.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Finding, Verdict, Verifier, VerifierError};
use crate::model::{Clues, EvidenceOutcome, PlaceCandidate};

/// Language code to plausible region names
const LANGUAGE_REGIONS: &[(&str, &[&str])] = &[
    ("zh", &["China", "Taiwan", "Hong Kong", "Singapore"]),
    ("ja", &["Japan"]),
    ("ko", &["Korea"]),
    (
        "en",
        &[
            "United States",
            "United Kingdom",
            "Canada",
            "Australia",
            "New Zealand",
            "Ireland",
        ],
    ),
    (
        "es",
        &["Spain", "Mexico", "Argentina", "Colombia", "Peru", "Chile"],
    ),
    ("fr", &["France", "Canada", "Belgium", "Switzerland"]),
    ("de", &["Germany", "Austria", "Switzerland"]),
    ("it", &["Italy", "Switzerland"]),
    ("pt", &["Portugal", "Brazil"]),
    ("ru", &["Russia", "Belarus", "Kazakhstan"]),
    ("ar", &["Saudi Arabia", "Egypt", "United Arab Emirates", "Morocco"]),
    ("hi", &["India"]),
    ("th", &["Thailand"]),
    ("he", &["Israel"]),
    ("el", &["Greece"]),
];

/// Script name to plausible region names
const SCRIPT_REGIONS: &[(&str, &[&str])] = &[
    ("han", &["China", "Taiwan", "Hong Kong", "Japan", "Singapore"]),
    ("hiragana", &["Japan"]),
    ("katakana", &["Japan"]),
    ("hangul", &["Korea"]),
    ("cyrillic", &["Russia", "Belarus", "Kazakhstan", "Ukraine"]),
    (
        "arabic",
        &["Saudi Arabia", "Egypt", "United Arab Emirates", "Morocco", "Iraq"],
    ),
    ("devanagari", &["India", "Nepal"]),
    ("thai", &["Thailand"]),
    ("hebrew", &["Israel"]),
    ("greek", &["Greece"]),
    (
        "latin",
        &[
            "United States",
            "United Kingdom",
            "France",
            "Germany",
            "Italy",
            "Spain",
            "Portugal",
            "Poland",
            "Netherlands",
        ],
    ),
];

/// Detect the dominant language by character ranges. Kana outranks Han so
/// Japanese text with kanji is not misread as Chinese.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let has = |pred: fn(char) -> bool| text.chars().any(pred);

    if has(|c| ('\u{3040}'..='\u{30ff}').contains(&c)) {
        return Some("ja");
    }
    if has(|c| ('\u{ac00}'..='\u{d7af}').contains(&c)) {
        return Some("ko");
    }
    if has(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        return Some("zh");
    }
    if has(|c| ('\u{0600}'..='\u{06ff}').contains(&c)) {
        return Some("ar");
    }
    if has(|c| ('\u{0400}'..='\u{04ff}').contains(&c)) {
        return Some("ru");
    }
    if has(|c| ('\u{0e00}'..='\u{0e7f}').contains(&c)) {
        return Some("th");
    }
    if has(|c| ('\u{0590}'..='\u{05ff}').contains(&c)) {
        return Some("he");
    }
    if has(|c| ('\u{0370}'..='\u{03ff}').contains(&c)) {
        return Some("el");
    }
    if has(|c| ('\u{0900}'..='\u{097f}').contains(&c)) {
        return Some("hi");
    }
    if has(|c| c.is_ascii_alphabetic()) {
        return Some("en");
    }
    None
}

/// Detect the dominant writing system by character ranges
pub fn detect_script(text: &str) -> Option<&'static str> {
    let has = |pred: fn(char) -> bool| text.chars().any(pred);

    if has(|c| ('\u{3040}'..='\u{309f}').contains(&c)) {
        return Some("hiragana");
    }
    if has(|c| ('\u{30a0}'..='\u{30ff}').contains(&c)) {
        return Some("katakana");
    }
    if has(|c| ('\u{ac00}'..='\u{d7af}').contains(&c)) {
        return Some("hangul");
    }
    if has(|c| ('\u{4e00}'..='\u{9fff}').contains(&c)) {
        return Some("han");
    }
    if has(|c| ('\u{0600}'..='\u{06ff}').contains(&c)) {
        return Some("arabic");
    }
    if has(|c| ('\u{0400}'..='\u{04ff}').contains(&c)) {
        return Some("cyrillic");
    }
    if has(|c| ('\u{0900}'..='\u{097f}').contains(&c)) {
        return Some("devanagari");
    }
    if has(|c| ('\u{0e00}'..='\u{0e7f}').contains(&c)) {
        return Some("thai");
    }
    if has(|c| ('\u{0590}'..='\u{05ff}').contains(&c)) {
        return Some("hebrew");
    }
    if has(|c| ('\u{0370}'..='\u{03ff}').contains(&c)) {
        return Some("greek");
    }
    if has(|c| c.is_ascii_alphabetic()) {
        return Some("latin");
    }
    None
}

fn lookup(
    table: &'static [(&'static str, &'static [&'static str])],
    key: &str,
) -> Option<&'static [&'static str]> {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, regions)| *regions)
}

fn region_matches(regions: &[&str], candidate_label: &str) -> bool {
    let label = candidate_label.to_lowercase();
    regions
        .iter()
        .any(|region| label.contains(&region.to_lowercase()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LanguagePriorVerifier;

#[async_trait]
impl Verifier for LanguagePriorVerifier {
    fn name(&self) -> &'static str {
        "language_prior"
    }

    async fn verify(
        &self,
        candidate: &PlaceCandidate,
        clues: &Clues,
    ) -> Result<Verdict, VerifierError> {
        if clues.ocr.is_empty() {
            return Ok(Verdict::inapplicable());
        }

        let text = clues.ocr_texts().join(" ");
        let language = detect_language(&text);
        let script = detect_script(&text);

        let candidate_label = format!("{} {}", candidate.source_hypothesis, candidate.name);

        let language_consistent = language
            .and_then(|lang| lookup(LANGUAGE_REGIONS, lang))
            .map(|regions| region_matches(regions, &candidate_label));
        let script_consistent = script
            .and_then(|s| lookup(SCRIPT_REGIONS, s))
            .map(|regions| region_matches(regions, &candidate_label));

        // Confidence ladder: both priors agree 0.9, language alone 0.6,
        // script alone 0.4, disagreement 0.2
        let (outcome, confidence, consistency) = match (language_consistent, script_consistent) {
            (Some(true), Some(true)) => (EvidenceOutcome::Pass, 0.9, "language+script"),
            (Some(true), _) => (EvidenceOutcome::Pass, 0.6, "language"),
            (_, Some(true)) => (EvidenceOutcome::Pass, 0.4, "script"),
            (None, None) => return Ok(Verdict::inapplicable()),
            _ => (EvidenceOutcome::Fail, 0.2, "none"),
        };

        tracing::debug!(
            candidate = %candidate.name,
            language = ?language,
            script = ?script,
            consistency = consistency,
            "Language prior check completed"
        );

        let mut details = BTreeMap::new();
        if let Some(lang) = language {
            details.insert("language".to_string(), serde_json::json!(lang));
        }
        if let Some(s) = script {
            details.insert("script".to_string(), serde_json::json!(s));
        }
        details.insert("consistency".to_string(), serde_json::json!(consistency));

        Ok(Verdict::single(Finding {
            value: format!(
                "text language {} / script {} against region {}",
                language.unwrap_or("unknown"),
                script.unwrap_or("unknown"),
                candidate.source_hypothesis
            ),
            outcome,
            confidence,
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
            lat: 0.0,
            lon: 0.0,
            source_hypothesis: hypothesis.to_string(),
            score: 0.5,
            retrieval_method: RetrievalMethod::TextOnly,
            metadata: BTreeMap::new(),
        }
    }

    fn clues_with_text(text: &str) -> Clues {
        Clues {
            ocr: vec![OcrSnippet {
                text: text.to_string(),
                bbox: None,
                confidence: 0.9,
                language: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn kana_beats_han_for_japanese() {
        assert_eq!(detect_language("東京駅ひろば"), Some("ja"));
        assert_eq!(detect_script("ひろば"), Some("hiragana"));
    }

    #[test]
    fn plain_hanzi_reads_as_chinese() {
        assert_eq!(detect_language("北京市"), Some("zh"));
        assert_eq!(detect_script("北京市"), Some("han"));
    }

    #[test]
    fn latin_defaults_to_english() {
        assert_eq!(detect_language("Main Street"), Some("en"));
        assert_eq!(detect_script("Main Street"), Some("latin"));
    }

    #[tokio::test]
    async fn japanese_text_supports_japan_candidate() {
        let verifier = LanguagePriorVerifier;
        let verdict = verifier
            .verify(
                &candidate("Tokyo Station", "Japan/Tokyo"),
                &clues_with_text("東京駅ひろば"),
            )
            .await
            .unwrap();
        assert_eq!(verdict.findings[0].outcome, EvidenceOutcome::Pass);
        assert!((verdict.findings[0].confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn japanese_text_contradicts_brazil_candidate() {
        let verifier = LanguagePriorVerifier;
        let verdict = verifier
            .verify(
                &candidate("Rio de Janeiro", "Brazil/Rio de Janeiro"),
                &clues_with_text("東京駅ひろば"),
            )
            .await
            .unwrap();
        assert_eq!(verdict.findings[0].outcome, EvidenceOutcome::Fail);
        assert!((verdict.findings[0].confidence - 0.2).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn french_candidate_with_latin_text_passes_on_script() {
        let verifier = LanguagePriorVerifier;
        let verdict = verifier
            .verify(
                &candidate("Eiffel Tower", "France/Paris"),
                &clues_with_text("Tour Eiffel"),
            )
            .await
            .unwrap();
        // Latin text defaults to English, whose regions miss France, but the
        // Latin script prior still covers it
        assert_eq!(verdict.findings[0].outcome, EvidenceOutcome::Pass);
        assert!((verdict.findings[0].confidence - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn no_ocr_is_inapplicable() {
        let verifier = LanguagePriorVerifier;
        let verdict = verifier
            .verify(&candidate("Anywhere", "Unknown"), &Clues::default())
            .await
            .unwrap();
        assert!(verdict.findings.is_empty());
    }
}
