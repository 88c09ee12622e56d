//! Mutable working state for one end-to-end geolocation request

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::candidate::{Evidence, EvidenceOutcome, FinalPrediction, PlaceCandidate};
use super::clues::Clues;
use super::hypothesis::RegionHypothesis;

/// Reference to the image under analysis.
///
/// The core never decodes image files itself; backends receive the
/// reference and transport it however their service requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRef {
    /// Local file, read by backends that need raw bytes
    Path(PathBuf),
    /// Remote image, passed through to backends that accept URLs
    Url(Url),
    /// Raw bytes supplied by the caller
    Inline(#[serde(with = "serde_bytes_b64")] Vec<u8>),
}

/// Inline bytes serialize as base64 so sessions stay JSON-dumpable
mod serde_bytes_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(de)?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(serde::de::Error::custom)
    }
}

/// Pipeline phase tag. `Done` is the only phase from which the final
/// prediction may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Init,
    Perceiving,
    Hypothesizing,
    Retrieving,
    Verifying,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Perceiving => "perceiving",
            Phase::Hypothesizing => "hypothesizing",
            Phase::Retrieving => "retrieving",
            Phase::Verifying => "verifying",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Working state threaded through the four stages.
///
/// Owned exclusively by the pipeline driver; each stage reads prior-stage
/// output and writes only its own field. Partial progress stays inspectable
/// here when a run fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSession {
    pub id: Uuid,
    pub image: ImageRef,
    pub started_at: DateTime<Utc>,
    pub clues: Option<Clues>,
    #[serde(default)]
    pub hypotheses: Vec<RegionHypothesis>,
    #[serde(default)]
    pub candidates: Vec<PlaceCandidate>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    pub final_prediction: Option<FinalPrediction>,
    /// Number of refinement loop-backs performed so far
    pub iteration: u32,
    pub phase: Phase,
    pub error: Option<String>,
}

impl ReasoningSession {
    pub fn new(image: ImageRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
            started_at: Utc::now(),
            clues: None,
            hypotheses: Vec::new(),
            candidates: Vec::new(),
            evidence: Vec::new(),
            final_prediction: None,
            iteration: 0,
            phase: Phase::Init,
            error: None,
        }
    }

    /// Highest-scoring candidate, if any were retrieved
    pub fn best_candidate(&self) -> Option<&PlaceCandidate> {
        self.candidates
            .iter()
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Number of evidence items that passed their check
    pub fn passed_evidence_count(&self) -> usize {
        self.evidence
            .iter()
            .filter(|e| e.outcome == EvidenceOutcome::Pass)
            .count()
    }

    /// Compact per-stage counts for diagnostics and logging
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            phase: self.phase,
            iteration: self.iteration,
            ocr_count: self.clues.as_ref().map_or(0, |c| c.ocr.len()),
            visual_count: self.clues.as_ref().map_or(0, |c| c.visual.len()),
            hypothesis_count: self.hypotheses.len(),
            candidate_count: self.candidates.len(),
            evidence_count: self.evidence.len(),
            confidence: self.final_prediction.as_ref().map(|p| p.confidence),
            error: self.error.clone(),
        }
    }
}

/// Snapshot of how far a session got
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub phase: Phase,
    pub iteration: u32,
    pub ocr_count: usize,
    pub visual_count: usize,
    pub hypothesis_count: usize,
    pub candidate_count: usize,
    pub evidence_count: usize,
    pub confidence: Option<f64>,
    pub error: Option<String>,
}
