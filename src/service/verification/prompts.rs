//! Prompts for the ranking judge

use crate::model::{Evidence, PlaceCandidate};

/// System prompt for the judge reviewing the verified ranking
pub const JUDGE_SYSTEM_PROMPT: &str = r#"You are reviewing the ranked output of a geolocation pipeline. You are given candidate locations with their scores and the verification evidence collected for each.

## Task

Decide the best ordering of the candidates, most plausible first, based strictly on the evidence shown.

Rules:
- Judge only from the listed evidence; do not introduce outside knowledge about the places.
- Prefer candidates whose evidence passed independent checks over candidates with higher raw scores but failed checks.
- Keep the existing order unless the evidence clearly justifies a change."#;

/// Build the judge prompt for the top candidates and their evidence
pub fn build_judge_prompt(candidates: &[PlaceCandidate], evidence: &[Evidence]) -> String {
    let mut sections = Vec::new();

    for (index, candidate) in candidates.iter().enumerate() {
        let lines: Vec<String> = evidence
            .iter()
            .filter(|e| e.candidate_index == index)
            .map(|e| {
                format!(
                    "  - [{}] {:?} (confidence {:.2}): {}",
                    e.kind, e.outcome, e.confidence, e.value
                )
            })
            .collect();

        let evidence_block = if lines.is_empty() {
            "  - no evidence collected".to_string()
        } else {
            lines.join("\n")
        };

        sections.push(format!(
            "### Candidate {index}\n\
             - name: {}\n\
             - coordinates: ({:.4}, {:.4})\n\
             - region: {}\n\
             - score: {:.3}\n\
             - evidence:\n{evidence_block}",
            candidate.name, candidate.lat, candidate.lon, candidate.source_hypothesis,
            candidate.score,
        ));
    }

    format!(
        "Review these geolocation candidates and return your ranking.\n\n\
         {}\n\n\
         Return the zero-based candidate indices ordered best first.",
        sections.join("\n\n")
    )
}
