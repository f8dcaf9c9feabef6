//! Persistence of job snapshots so an interrupted job can resume.
//!
//! One record per job id holding the full [`PipelineJob`]. Writes for the same
//! id are serialized; different ids never contend.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::job::{JobId, PipelineJob};

const RECORD_VERSION: u32 = 1;

pub trait CheckpointStore: Send + Sync {
    fn save(&self, job: &PipelineJob) -> Result<()>;
    fn load(&self, id: JobId) -> Result<Option<PipelineJob>>;
    fn list(&self) -> Result<Vec<JobId>>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    version: u32,
    saved_at: DateTime<Utc>,
    job: PipelineJob,
}

fn encode(job: &PipelineJob) -> Result<String> {
    let record = CheckpointRecord {
        version: RECORD_VERSION,
        saved_at: Utc::now(),
        job: job.clone(),
    };
    serde_json::to_string_pretty(&record).context("Failed to serialize checkpoint")
}

fn decode(content: &str) -> Result<PipelineJob> {
    let record: CheckpointRecord =
        serde_json::from_str(content).context("Failed to parse checkpoint record")?;
    if record.version != RECORD_VERSION {
        bail!("Unsupported checkpoint version: {}", record.version);
    }
    Ok(record.job)
}

/// JSON file per job under a directory. Records are written to a temporary
/// sibling and renamed into place, so a crash mid-write keeps the previous one.
#[derive(Debug)]
pub struct FileCheckpointStore {
    root: PathBuf,
    writers: Mutex<HashMap<JobId, Arc<Mutex<()>>>>,
}

impl FileCheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| {
            format!("Failed to create checkpoint directory: {}", root.display())
        })?;
        Ok(Self {
            root,
            writers: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, id: JobId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn writer_lock(&self, id: JobId) -> Arc<Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(id).or_default().clone()
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, job: &PipelineJob) -> Result<()> {
        let lock = self.writer_lock(job.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let content = encode(job)?;
        let path = self.path_for(job.id);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, content)
            .with_context(|| format!("Failed to write checkpoint: {}", staging.display()))?;
        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to commit checkpoint: {}", path.display()))?;
        debug!(job_id = %job.id, stage = %job.current_stage, status = %job.status, "Checkpoint written");
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<Option<PipelineJob>> {
        let path = self.path_for(id);
        if !path.is_file() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read checkpoint: {}", path.display()))?;
        let job = decode(&content).with_context(|| format!("Checkpoint {}", path.display()))?;
        Ok(Some(job))
    }

    fn list(&self) -> Result<Vec<JobId>> {
        let entries = fs::read_dir(&self.root).with_context(|| {
            format!("Failed to list checkpoint directory: {}", self.root.display())
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<JobId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Keeps encoded records in memory. Records still go through the same JSON
/// encoding as the file store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<JobId, String>>,
    saves: Mutex<HashMap<JobId, usize>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `id` has been saved.
    pub fn save_count(&self, id: JobId) -> usize {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or_default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, job: &PipelineJob) -> Result<()> {
        let content = encode(job)?;
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job.id, content);
        *self
            .saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job.id)
            .or_default() += 1;
        Ok(())
    }

    fn load(&self, id: JobId) -> Result<Option<PipelineJob>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.get(&id).map(|content| decode(content)).transpose()
    }

    fn list(&self) -> Result<Vec<JobId>> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<JobId> = records.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
