use std::time::Duration;

use thiserror::Error;

use crate::job::{ArtifactKind, JobId, JobStatus};
use crate::registry::StageId;

/// Failure raised by a stage handler or one of its collaborators.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("script generation failed: {0}")]
    ScriptGeneration(String),

    #[error("character '{0}' not found")]
    CharacterNotFound(String),

    #[error("timed out after {:.1}s", .0.as_secs_f64())]
    StageTimeout(Duration),

    #[error("generation service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("invalid generated content: {0}")]
    InvalidContent(String),

    #[error("required artifact '{0}' is missing")]
    MissingArtifact(ArtifactKind),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StageError {
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::ScriptGeneration(_) => "script_generation",
            StageError::CharacterNotFound(_) => "character_not_found",
            StageError::StageTimeout(_) => "stage_timeout",
            StageError::ServiceUnavailable(_) => "service_unavailable",
            StageError::InvalidContent(_) => "invalid_content",
            StageError::MissingArtifact(_) => "missing_artifact",
            StageError::Other(_) => "other",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid concept: {}", .0.join("; "))]
    InvalidConcept(Vec<String>),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("cannot {operation} job {job_id} while it is {status}")]
    InvalidState {
        job_id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: StageId,
        #[source]
        source: StageError,
    },

    #[error("job {job_id} cannot resume: artifact '{kind}' of a completed stage is missing or altered")]
    MissingArtifact { job_id: JobId, kind: ArtifactKind },

    #[error("checkpoint store failure: {0:#}")]
    Checkpoint(anyhow::Error),

    #[error("no handler registered for stage '{0}'")]
    MissingHandler(StageId),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
