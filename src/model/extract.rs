//! Model-extractable payload structures.
//!
//! These mirror the JSON shapes the vision and text models are prompted to
//! produce. They are deliberately lenient: every field defaults, so a
//! partially well-formed payload still deserializes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::clues::{Clues, ImageMetadata, OcrSnippet, VisualObservation};
use super::hypothesis::RegionHypothesis;

/// One OCR fragment as reported by the vision model
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedOcrText {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub language: Option<String>,
}

/// One visual trait as reported by the vision model
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedVisualFeature {
    #[serde(default, alias = "type")]
    pub category: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
}

/// Scene-level metadata as reported by the vision model
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedSceneMetadata {
    #[serde(default)]
    pub scene_type: Option<String>,
    #[serde(default)]
    pub time_of_day: Option<String>,
    #[serde(default)]
    pub season: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Complete perception payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedScene {
    #[serde(default)]
    pub ocr_texts: Vec<ExtractedOcrText>,
    #[serde(default)]
    pub visual_features: Vec<ExtractedVisualFeature>,
    #[serde(default)]
    pub metadata: ExtractedSceneMetadata,
}

impl ExtractedScene {
    /// Convert to domain clues, layering EXIF-derived metadata over the
    /// scene description. EXIF wins for the fields it carries; confidences
    /// are clamped into `[0, 1]` and snippets without text are dropped.
    pub fn into_clues(self, exif: ImageMetadata) -> Clues {
        let ocr = self
            .ocr_texts
            .into_iter()
            .filter(|t| !t.text.trim().is_empty())
            .map(|t| OcrSnippet {
                text: t.text,
                bbox: t.bbox,
                confidence: t.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                language: t.language,
            })
            .collect();

        let visual = self
            .visual_features
            .into_iter()
            .filter(|f| !f.value.trim().is_empty())
            .map(|f| VisualObservation {
                category: if f.category.is_empty() {
                    "general".to_string()
                } else {
                    f.category
                },
                value: f.value,
                confidence: f.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                bbox: f.bbox,
            })
            .collect();

        let meta = ImageMetadata {
            gps: exif.gps,
            timestamp: exif.timestamp,
            camera: exif.camera,
            scene_type: self.metadata.scene_type,
            time_of_day: self.metadata.time_of_day,
            season: self.metadata.season,
            weather: self.metadata.weather,
            notes: self.metadata.notes,
            exif: exif.exif,
        };

        Clues { ocr, visual, meta }
    }
}

/// One region hypothesis as reported by the text model
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedHypothesis {
    /// Region label, coarse to fine, e.g. `France/Paris`
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub supporting_clues: Vec<String>,
    #[serde(default)]
    pub conflicting_clues: Vec<String>,
}

/// Complete hypothesis payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedHypotheses {
    #[serde(default)]
    pub hypotheses: Vec<ExtractedHypothesis>,
}

impl ExtractedHypotheses {
    /// Convert to domain hypotheses, dropping entries without a region label
    pub fn into_hypotheses(self) -> Vec<RegionHypothesis> {
        self.hypotheses
            .into_iter()
            .filter(|h| !h.region.trim().is_empty())
            .map(|h| RegionHypothesis {
                region: h.region,
                rationale: if h.reasoning.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![h.reasoning]
                },
                supporting: h.supporting_clues,
                conflicting: h.conflicting_clues,
                confidence: h.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            })
            .collect()
    }
}

/// Judge payload: the reviewed ranking of candidate indices, best first
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedRanking {
    /// Zero-based indices into the candidate list shown to the judge
    #[serde(default)]
    pub ranking: Vec<usize>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::clues::GpsPoint;

    #[test]
    fn scene_conversion_clamps_and_filters() {
        let scene = ExtractedScene {
            ocr_texts: vec![
                ExtractedOcrText {
                    text: "Eiffel Tower".to_string(),
                    confidence: Some(1.5),
                    ..Default::default()
                },
                ExtractedOcrText {
                    text: "   ".to_string(),
                    ..Default::default()
                },
            ],
            visual_features: vec![ExtractedVisualFeature {
                category: String::new(),
                value: "iron lattice tower".to_string(),
                confidence: None,
                bbox: None,
            }],
            metadata: ExtractedSceneMetadata {
                scene_type: Some("urban".to_string()),
                ..Default::default()
            },
        };

        let clues = scene.into_clues(ImageMetadata::default());
        assert_eq!(clues.ocr.len(), 1);
        assert!((clues.ocr[0].confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(clues.visual[0].category, "general");
        assert_eq!(clues.meta.scene_type.as_deref(), Some("urban"));
    }

    #[test]
    fn exif_fields_survive_conversion() {
        let exif = ImageMetadata {
            gps: Some(GpsPoint { lat: 1.0, lon: 2.0 }),
            camera: Some("X100".to_string()),
            ..Default::default()
        };
        let clues = ExtractedScene::default().into_clues(exif);
        assert!(clues.meta.gps.is_some());
        assert_eq!(clues.meta.camera.as_deref(), Some("X100"));
    }

    #[test]
    fn hypotheses_without_region_are_dropped() {
        let payload = ExtractedHypotheses {
            hypotheses: vec![
                ExtractedHypothesis {
                    region: "Japan/Tokyo".to_string(),
                    confidence: Some(0.8),
                    ..Default::default()
                },
                ExtractedHypothesis::default(),
            ],
        };
        let hs = payload.into_hypotheses();
        assert_eq!(hs.len(), 1);
        assert_eq!(hs[0].region, "Japan/Tokyo");
    }
}
