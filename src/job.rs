use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::concept::VideoConcept;
use crate::registry::{StageId, StageRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_resumable(self) -> bool {
        matches!(self, JobStatus::Paused | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Script,
    Storyboard,
    Characters,
    VideoSegments,
    Voiceover,
    IntegratedAudio,
    AssembledVideo,
    Exports,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Script => "script",
            ArtifactKind::Storyboard => "storyboard",
            ArtifactKind::Characters => "characters",
            ArtifactKind::VideoSegments => "video_segments",
            ArtifactKind::Voiceover => "voiceover",
            ArtifactKind::IntegratedAudio => "integrated_audio",
            ArtifactKind::AssembledVideo => "assembled_video",
            ArtifactKind::Exports => "exports",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named output attached to a job by the stage that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub stage: StageId,
    pub paths: Vec<PathBuf>,
    /// SHA-256 per entry of `paths`, when the producer recorded them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub digests: Vec<String>,
    pub produced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub summary: Map<String, Value>,
}

impl Artifact {
    pub fn new(stage: StageId, paths: Vec<PathBuf>) -> Self {
        Self {
            kind: stage.artifact_kind(),
            stage,
            paths,
            digests: Vec::new(),
            produced_at: Utc::now(),
            summary: Map::new(),
        }
    }

    pub fn single(stage: StageId, path: impl Into<PathBuf>) -> Self {
        Self::new(stage, vec![path.into()])
    }

    pub fn with_summary(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.summary.insert(key.into(), value.into());
        self
    }

    pub fn with_digests(mut self, digests: Vec<String>) -> Self {
        self.digests = digests;
        self
    }

    pub fn primary_path(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }
}

/// Append-only artifact map: each kind is recorded at most once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(BTreeMap<ArtifactKind, Artifact>);

impl ArtifactSet {
    /// Records `artifact`, refusing to replace one already present.
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), ArtifactKind> {
        if self.0.contains_key(&artifact.kind) {
            return Err(artifact.kind);
        }
        self.0.insert(artifact.kind, artifact);
        Ok(())
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.0.get(&kind)
    }

    pub fn contains(&self, kind: ArtifactKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.0.values()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub stage: StageId,
    pub kind: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

/// State of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineJob {
    pub id: JobId,
    pub concept: VideoConcept,
    /// Stage being executed, or next to execute; the failing stage after a
    /// failure and the final stage once completed.
    pub current_stage: StageId,
    pub last_completed: Option<StageId>,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub artifacts: ArtifactSet,
    pub workspace: PathBuf,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl PipelineJob {
    pub fn new(concept: VideoConcept, workspace_root: &Path, registry: &StageRegistry) -> Self {
        let id = JobId::new();
        Self {
            id,
            concept,
            current_stage: registry.first(),
            last_completed: None,
            status: JobStatus::Pending,
            progress_percent: 0,
            artifacts: ArtifactSet::default(),
            workspace: workspace_root.join(id.to_string()),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    pub fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.get(kind)
    }

    /// The primary export deliverable, once the export stage has run.
    pub fn final_output(&self) -> Option<&Path> {
        self.artifacts
            .get(ArtifactKind::Exports)
            .and_then(Artifact::primary_path)
    }

    pub fn progress(&self) -> ProgressReport {
        ProgressReport {
            job_id: self.id,
            status: self.status,
            current_stage: self.current_stage,
            progress_percent: self.progress_percent,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.as_ref().map(|detail| detail.message.clone()),
            pause_requested: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub current_stage: StageId,
    pub progress_percent: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub pause_requested: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_set_is_append_only() {
        let mut artifacts = ArtifactSet::default();
        artifacts
            .insert(Artifact::single(StageId::ScriptGeneration, "a/script.json"))
            .unwrap();
        let rejected =
            artifacts.insert(Artifact::single(StageId::ScriptGeneration, "b/script.json"));
        assert_eq!(rejected, Err(ArtifactKind::Script));
        assert_eq!(
            artifacts.get(ArtifactKind::Script).unwrap().primary_path(),
            Some(Path::new("a/script.json"))
        );
    }

    #[test]
    fn fresh_job_is_pending_at_first_stage() {
        let registry = StageRegistry::standard();
        let job = PipelineJob::new(
            VideoConcept::new("t", "b", "a"),
            Path::new("/work"),
            registry,
        );
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress_percent, 0);
        assert_eq!(job.current_stage, StageId::ScriptGeneration);
        assert_eq!(job.workspace, Path::new("/work").join(job.id.to_string()));
        assert!(job.started_at.is_none() && job.error.is_none());
    }

    #[test]
    fn job_ids_parse_from_display() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-job".parse::<JobId>().is_err());
    }
}
