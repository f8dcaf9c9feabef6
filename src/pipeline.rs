use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::StageSettings;
use crate::error::StageError;
use crate::job::{Artifact, ArtifactKind, PipelineJob};
use crate::registry::{StageId, StageRegistry};

/// What a handler may see besides the job itself.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub workspace: &'a Path,
    pub settings: &'a StageSettings,
}

impl StageContext<'_> {
    /// Path inside the job workspace, creating parent directories.
    pub fn output_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf, StageError> {
        let path = self.workspace.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create stage directory: {}", parent.display())
            })?;
        }
        Ok(path)
    }

    pub fn output_dir(&self, relative: impl AsRef<Path>) -> Result<PathBuf, StageError> {
        let dir = self.workspace.join(relative);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create stage directory: {}", dir.display()))?;
        Ok(dir)
    }

    pub fn write_json<T: Serialize>(
        &self,
        relative: impl AsRef<Path>,
        value: &T,
    ) -> Result<PathBuf, StageError> {
        let path = self.output_path(relative)?;
        let content = serde_json::to_vec_pretty(value).context("Failed to encode stage output")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write stage output: {}", path.display()))?;
        Ok(path)
    }
}

/// Read a JSON document recorded by an earlier stage.
pub fn read_artifact_json<T: DeserializeOwned>(
    job: &PipelineJob,
    kind: ArtifactKind,
) -> Result<T, StageError> {
    let path = job
        .artifact(kind)
        .and_then(Artifact::primary_path)
        .ok_or(StageError::MissingArtifact(kind))?;
    let content = fs::read(path)
        .with_context(|| format!("Failed to read {kind} artifact: {}", path.display()))?;
    let value = serde_json::from_slice(&content)
        .with_context(|| format!("Failed to parse {kind} artifact: {}", path.display()))?;
    Ok(value)
}

/// The replaceable logic behind one stage. A handler produces its own artifact
/// from a read-only view of the job; only the orchestrator mutates the job.
pub trait StageHandler: Send + Sync {
    fn stage(&self) -> StageId;
    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError>;
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<StageId, Arc<dyn StageHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for its stage, replacing any earlier one.
    pub fn register<H>(&mut self, handler: H)
    where
        H: StageHandler + 'static,
    {
        self.handlers.insert(handler.stage(), Arc::new(handler));
    }

    pub fn get(&self, stage: StageId) -> Option<Arc<dyn StageHandler>> {
        self.handlers.get(&stage).cloned()
    }

    /// Registry stages that have no handler.
    pub fn missing(&self, registry: &StageRegistry) -> Vec<StageId> {
        registry
            .stages()
            .iter()
            .copied()
            .filter(|stage| !self.handlers.contains_key(stage))
            .collect()
    }

    pub fn known_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<_> = self.handlers.keys().copied().collect();
        stages.sort();
        stages
    }
}
