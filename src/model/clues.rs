//! Perception output: everything the pipeline knows about the image

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One recognized text fragment from the image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSnippet {
    pub text: String,
    /// Pixel bounding box `[x1, y1, x2, y2]`, when the vision model reported one
    pub bbox: Option<[f64; 4]>,
    /// Recognition confidence in `[0, 1]`
    pub confidence: f64,
    /// BCP-47-ish language tag, e.g. `en`, `ja`
    pub language: Option<String>,
}

/// One detected visual trait (architecture, vegetation, signage, road marking, ...)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualObservation {
    /// Trait category: `landmark`, `architecture`, `vegetation`, `road_marking`, ...
    pub category: String,
    /// Free-text description of the trait
    pub value: String,
    /// Detection confidence in `[0, 1]`
    pub confidence: f64,
    pub bbox: Option<[f64; 4]>,
}

/// A GPS fix carried in image metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Metadata merged from EXIF and the vision model's scene description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub gps: Option<GpsPoint>,
    pub timestamp: Option<String>,
    pub camera: Option<String>,
    /// `street`, `rural`, `indoor`, ... as reported by the vision model
    pub scene_type: Option<String>,
    pub time_of_day: Option<String>,
    pub season: Option<String>,
    pub weather: Option<String>,
    pub notes: Option<String>,
    /// Raw EXIF tags that did not map to a typed field
    #[serde(default)]
    pub exif: BTreeMap<String, String>,
}

/// All clues extracted by the perception stage.
///
/// May be empty for a featureless image, but is always present on the
/// session once perception has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clues {
    #[serde(default)]
    pub ocr: Vec<OcrSnippet>,
    #[serde(default)]
    pub visual: Vec<VisualObservation>,
    #[serde(default)]
    pub meta: ImageMetadata,
}

impl Clues {
    /// Clues built from EXIF alone, the perception fallback output
    pub fn from_metadata(meta: ImageMetadata) -> Self {
        Self {
            ocr: Vec::new(),
            visual: Vec::new(),
            meta,
        }
    }

    /// Whether any signal exists for downstream reasoning: OCR text, a
    /// visual observation, or a GPS fix
    pub fn has_signal(&self) -> bool {
        !self.ocr.is_empty() || !self.visual.is_empty() || self.meta.gps.is_some()
    }

    /// All OCR texts in detection order
    pub fn ocr_texts(&self) -> Vec<&str> {
        self.ocr.iter().map(|s| s.text.as_str()).collect()
    }
}
