//! Stage and pipeline error taxonomy

use crate::backend::BackendError;
use crate::model::Phase;

/// Errors a stage can raise.
///
/// `Validation` means required prior-stage output was missing and is always
/// fatal. `Backend` covers failed, timed-out or unparseable collaborator
/// calls that the stage had no fallback for. `NoSurvivors` means the stage
/// ran but produced zero usable items for the next stage.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StageError {
    #[error("missing prior-stage output: {0}")]
    Validation(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("no usable {0} survived the stage")]
    NoSurvivors(&'static str),
}

/// The single terminal error a run surfaces: which phase failed and why.
/// Partial progress stays inspectable on the session object.
#[derive(Debug, thiserror::Error)]
#[error("pipeline failed during {phase}: {source}")]
pub struct PipelineError {
    pub phase: Phase,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(phase: Phase, source: StageError) -> Self {
        Self { phase, source }
    }
}
