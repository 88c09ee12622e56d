//! Prompts and clue summarization for hypothesis generation

use crate::model::{Clues, RegionHypothesis};

/// Cap on items rendered per clue type; keeps the prompt bounded on
/// clue-dense images
const MAX_ITEMS_PER_TYPE: usize = 10;

/// System prompt for hypothesis generation
pub const HYPOTHESIS_SYSTEM_PROMPT: &str = r#"You are a geolocation analyst. Given clues extracted from a photograph, propose the most plausible geographic regions where it was taken.

## Rules

- Propose 2 to 5 hypotheses, each naming a region as a coarse-to-fine path, e.g. "France/Paris" or "Japan/Tokyo". A country alone is acceptable when the clues do not support anything finer.
- Ground every hypothesis in the provided clues; cite the supporting clues verbatim.
- List clues that conflict with a hypothesis under conflicting_clues.
- Confidence lies in [0, 1] and reflects how strongly the clues point at the region, not how famous the place is.
- Prefer fewer, well-grounded hypotheses over many weak ones."#;

/// Render clues into the bounded textual summary the model reasons over
pub fn render_clue_summary(clues: &Clues) -> String {
    let mut sections = Vec::new();

    if !clues.ocr.is_empty() {
        let mut lines = vec!["**OCR text**:".to_string()];
        for (i, snippet) in clues.ocr.iter().take(MAX_ITEMS_PER_TYPE).enumerate() {
            let language = snippet
                .language
                .as_deref()
                .map(|l| format!(", lang {l}"))
                .unwrap_or_default();
            lines.push(format!(
                "  {}. \"{}\" (confidence {:.2}{language})",
                i + 1,
                snippet.text,
                snippet.confidence
            ));
        }
        sections.push(lines.join("\n"));
    }

    if !clues.visual.is_empty() {
        let mut lines = vec!["**Visual features**:".to_string()];
        for (i, obs) in clues.visual.iter().take(MAX_ITEMS_PER_TYPE).enumerate() {
            lines.push(format!(
                "  {}. {}: {} (confidence {:.2})",
                i + 1,
                obs.category,
                obs.value,
                obs.confidence
            ));
        }
        sections.push(lines.join("\n"));
    }

    let mut meta_lines = Vec::new();
    if let Some(gps) = &clues.meta.gps {
        meta_lines.push(format!("  - GPS: ({:.4}, {:.4})", gps.lat, gps.lon));
    }
    if let Some(timestamp) = &clues.meta.timestamp {
        meta_lines.push(format!("  - timestamp: {timestamp}"));
    }
    if let Some(camera) = &clues.meta.camera {
        meta_lines.push(format!("  - camera: {camera}"));
    }
    if let Some(scene) = &clues.meta.scene_type {
        meta_lines.push(format!("  - scene type: {scene}"));
    }
    if let Some(time_of_day) = &clues.meta.time_of_day {
        meta_lines.push(format!("  - time of day: {time_of_day}"));
    }
    if let Some(season) = &clues.meta.season {
        meta_lines.push(format!("  - season: {season}"));
    }
    if !meta_lines.is_empty() {
        sections.push(format!("**Metadata**:\n{}", meta_lines.join("\n")));
    }

    if sections.is_empty() {
        "(no clues were extracted)".to_string()
    } else {
        sections.join("\n\n")
    }
}

/// Build the user prompt, optionally feeding back the previous round's
/// hypotheses as refinement context
pub fn build_hypothesis_prompt(
    clues_summary: &str,
    previous: Option<&[RegionHypothesis]>,
) -> String {
    let mut prompt = format!(
        "Propose geographic hypotheses for the photograph described by these clues.\n\n\
         ## Clues\n\n{clues_summary}\n"
    );

    if let Some(previous) = previous.filter(|p| !p.is_empty()) {
        prompt.push_str("\n## Previous hypotheses to refine\n\n");
        for h in previous {
            prompt.push_str(&format!(
                "- {} (confidence {:.2})\n",
                h.region, h.confidence
            ));
        }
        prompt.push_str(
            "\nSharpen or replace these: narrow regions where the clues allow it, \
             drop hypotheses the clues contradict.\n",
        );
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OcrSnippet, VisualObservation};

    fn snippet(text: &str) -> OcrSnippet {
        OcrSnippet {
            text: text.to_string(),
            bbox: None,
            confidence: 0.9,
            language: None,
        }
    }

    #[test]
    fn summary_is_bounded_per_clue_type() {
        let clues = Clues {
            ocr: (0..25).map(|i| snippet(&format!("sign {i}"))).collect(),
            ..Default::default()
        };
        let summary = render_clue_summary(&clues);
        assert!(summary.contains("sign 9"));
        assert!(!summary.contains("sign 10"));
    }

    #[test]
    fn empty_clues_render_a_marker() {
        assert_eq!(render_clue_summary(&Clues::default()), "(no clues were extracted)");
    }

    #[test]
    fn summary_covers_all_clue_types() {
        let clues = Clues {
            ocr: vec![snippet("Tour Eiffel")],
            visual: vec![VisualObservation {
                category: "landmark".to_string(),
                value: "iron tower".to_string(),
                confidence: 0.8,
                bbox: None,
            }],
            ..Default::default()
        };
        let summary = render_clue_summary(&clues);
        assert!(summary.contains("OCR text"));
        assert!(summary.contains("Visual features"));
        assert!(summary.contains("Tour Eiffel"));
    }

    #[test]
    fn refinement_context_lists_previous_rounds() {
        let previous = vec![RegionHypothesis {
            region: "France/Paris".to_string(),
            rationale: vec![],
            supporting: vec![],
            conflicting: vec![],
            confidence: 0.7,
        }];
        let prompt = build_hypothesis_prompt("clues here", Some(&previous));
        assert!(prompt.contains("Previous hypotheses"));
        assert!(prompt.contains("France/Paris"));
    }

    #[test]
    fn no_previous_hypotheses_means_no_refinement_section() {
        let prompt = build_hypothesis_prompt("clues here", None);
        assert!(!prompt.contains("Previous hypotheses"));
    }
}
