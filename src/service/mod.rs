//! The four reasoning stages and the state machine that sequences them

pub mod error;
pub mod hypothesis;
pub mod orchestrator;
pub mod parse;
pub mod perception;
pub mod retrieval;
pub mod verification;

pub use error::{PipelineError, StageError};
pub use hypothesis::HypothesisStage;
pub use orchestrator::Geolocator;
pub use perception::PerceptionStage;
pub use retrieval::RetrievalStage;
pub use verification::{RankingJudge, VerificationStage};
