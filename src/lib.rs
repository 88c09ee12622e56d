//! Reasoning core for image geolocation.
//!
//! Given a photograph, the pipeline produces a best-guess coordinate with a
//! calibrated confidence score and an auditable explanation chain. The work
//! is split across four stages (perception, hypothesis, retrieval,
//! verification) sequenced by an explicit state machine that tolerates the
//! failure of any external collaborator at any stage.
//!
//! Model backends, the geo-retrieval service and EXIF extraction are
//! consumed through the trait contracts in [`backend`]; fact-checking runs
//! through the pluggable [`verifier`] registry.

pub mod backend;
pub mod model;
pub mod service;
pub mod verifier;

pub use model::{
    AgentConfig, Clues, Evidence, FinalPrediction, ImageMetadata, ImageRef, OcrSnippet, Phase,
    PlaceCandidate, ReasoningSession, RegionHypothesis, RetrievalStrategy, ScoringWeights,
    VisualObservation,
};
pub use service::{Geolocator, PipelineError, StageError};
pub use verifier::{Verdict, Verifier, VerifierRegistry};
