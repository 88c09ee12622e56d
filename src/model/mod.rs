pub mod candidate;
pub mod clues;
pub mod config;
pub mod extract;
pub mod hypothesis;
pub mod session;

pub use candidate::{
    Evidence, EvidenceOutcome, FinalPrediction, PlaceCandidate, RetrievalMethod,
};
pub use clues::{Clues, GpsPoint, ImageMetadata, OcrSnippet, VisualObservation};
pub use config::{AgentConfig, RetrievalStrategy, ScoringWeights};
pub use hypothesis::RegionHypothesis;
pub use session::{ImageRef, Phase, ReasoningSession, SessionSummary};
