pub mod checkpoint;
pub mod collaborators;
pub mod concept;
pub mod config;
pub mod digest;
pub mod error;
pub mod job;
pub mod observability;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod validation;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use concept::{Tone, VideoConcept};
pub use config::ForgeConfig;
pub use error::{PipelineError, PipelineResult, StageError};
pub use job::{Artifact, ArtifactKind, JobId, JobStatus, PipelineJob, ProgressReport};
pub use orchestrator::{Orchestrator, ProgressEvent, RunOutcome};
pub use pipeline::{HandlerRegistry, StageContext, StageHandler};
pub use registry::{StageId, StageRegistry};
