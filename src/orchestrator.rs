//! The control loop that drives jobs through the stage registry.
//!
//! Jobs live in an active-job table for the life of the orchestrator. Each
//! entry has its own lock; the stage walk holds it only while reading or
//! recording state, never across a handler call, so progress queries stay
//! responsive while a slow stage runs. `Run`/`Resume` admit a job only from a
//! status that allows it and flip it to `Running` under that lock, which keeps
//! a second walk of the same job out.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::checkpoint::CheckpointStore;
use crate::concept::VideoConcept;
use crate::config::ForgeConfig;
use crate::digest::compute_sha256;
use crate::error::{PipelineError, PipelineResult, StageError};
use crate::job::{Artifact, ErrorDetail, JobId, JobStatus, PipelineJob, ProgressReport};
use crate::observability::MetricsCollector;
use crate::pipeline::{HandlerRegistry, StageContext};
use crate::registry::{StageId, StageRegistry};
use crate::validation::validate_concept;

/// How a `run`/`resume` call ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every stage finished; carries the primary export deliverable.
    Completed(PathBuf),
    /// A pause request was honoured at a stage boundary.
    Paused { last_completed: Option<StageId> },
}

impl RunOutcome {
    pub fn export_path(&self) -> Option<&Path> {
        match self {
            RunOutcome::Completed(path) => Some(path),
            RunOutcome::Paused { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    StageStarted {
        job_id: JobId,
        stage: StageId,
    },
    StageCompleted {
        job_id: JobId,
        stage: StageId,
        progress_percent: u8,
    },
    StageSkipped {
        job_id: JobId,
        stage: StageId,
        progress_percent: u8,
    },
    StageFailed {
        job_id: JobId,
        stage: StageId,
        error: String,
    },
    Paused {
        job_id: JobId,
        progress_percent: u8,
    },
    Completed {
        job_id: JobId,
        output: PathBuf,
    },
}

type Observer = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

struct JobSlot {
    job: Mutex<PipelineJob>,
    pause_requested: AtomicBool,
}

impl JobSlot {
    fn new(job: PipelineJob) -> Self {
        Self {
            job: Mutex::new(job),
            pause_requested: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineJob> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn report(&self) -> ProgressReport {
        let job = self.lock();
        let mut report = job.progress();
        report.pause_requested =
            job.status == JobStatus::Running && self.pause_requested.load(Ordering::SeqCst);
        report
    }
}

pub struct Orchestrator {
    registry: &'static StageRegistry,
    handlers: HandlerRegistry,
    store: Arc<dyn CheckpointStore>,
    config: ForgeConfig,
    jobs: Mutex<HashMap<JobId, Arc<JobSlot>>>,
    metrics: MetricsCollector,
    observer: Option<Observer>,
}

impl Orchestrator {
    /// Fails with `MissingHandler` unless every registry stage has a handler.
    pub fn new(
        handlers: HandlerRegistry,
        store: Arc<dyn CheckpointStore>,
        config: ForgeConfig,
    ) -> PipelineResult<Self> {
        let registry = StageRegistry::standard();
        if let Some(stage) = handlers.missing(registry).first() {
            return Err(PipelineError::MissingHandler(*stage));
        }
        Ok(Self {
            registry,
            handlers,
            store,
            config,
            jobs: Mutex::new(HashMap::new()),
            metrics: MetricsCollector::new(),
            observer: None,
        })
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn registry(&self) -> &StageRegistry {
        self.registry
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Validates `concept` and registers a `Pending` job. Does not execute it.
    pub fn submit(&self, concept: VideoConcept) -> PipelineResult<JobId> {
        let report = validate_concept(&concept, &self.config.concept_limits);
        for warning in &report.warnings {
            warn!(title = %concept.title, "{warning}");
        }
        if !report.is_ok() {
            return Err(PipelineError::InvalidConcept(report.errors));
        }

        let job = PipelineJob::new(concept, &self.config.workspace_root, self.registry);
        let id = job.id;
        info!(job_id = %id, title = %job.concept.title, "Job submitted");
        self.jobs_lock().insert(id, Arc::new(JobSlot::new(job)));
        Ok(id)
    }

    /// Drives a `Pending` job through every stage. Blocks for as long as the
    /// stage handlers do.
    #[instrument(skip_all, fields(job_id = %id))]
    pub fn run(&self, id: JobId) -> PipelineResult<RunOutcome> {
        let slot = self.slot(id).ok_or(PipelineError::JobNotFound(id))?;
        let start = {
            let mut job = slot.lock();
            if job.status != JobStatus::Pending {
                return Err(PipelineError::InvalidState {
                    job_id: id,
                    status: job.status,
                    operation: "run",
                });
            }
            job.status = JobStatus::Running;
            job.started_at = Some(Utc::now());
            self.registry.next_after(job.last_completed)
        };
        info!("Job started");
        self.walk(&slot, start)
    }

    /// Continues a `Paused` or `Failed` job from the first stage that has not
    /// completed. Jobs unknown to this process are loaded from the checkpoint
    /// store.
    #[instrument(skip_all, fields(job_id = %id))]
    pub fn resume(&self, id: JobId) -> PipelineResult<RunOutcome> {
        let slot = match self.slot(id) {
            Some(slot) => slot,
            None => self.recover_slot(id)?,
        };
        let start = {
            let mut job = slot.lock();
            if !job.status.is_resumable() {
                return Err(PipelineError::InvalidState {
                    job_id: id,
                    status: job.status,
                    operation: "resume",
                });
            }
            self.verify_completed_artifacts(&job)?;

            slot.pause_requested.store(false, Ordering::SeqCst);
            job.status = JobStatus::Running;
            job.error = None;
            if job.started_at.is_none() {
                job.started_at = Some(Utc::now());
            }
            let start = self.registry.next_after(job.last_completed);
            if let Some(stage) = start {
                job.current_stage = stage;
            }
            start
        };
        info!(from = ?start, "Job resumed");
        self.walk(&slot, start)
    }

    /// A `Pending` job pauses immediately. A `Running` job pauses at the next
    /// stage boundary; the handler in flight is never interrupted.
    pub fn pause(&self, id: JobId) -> PipelineResult<()> {
        let slot = self.slot(id).ok_or(PipelineError::JobNotFound(id))?;
        let mut job = slot.lock();
        let status = job.status;
        match status {
            JobStatus::Pending => {
                job.status = JobStatus::Paused;
                let snapshot = job.clone();
                drop(job);
                self.metrics.record_job_paused();
                self.store
                    .save(&snapshot)
                    .map_err(PipelineError::Checkpoint)?;
                info!(job_id = %id, "Job paused before start");
                Ok(())
            }
            JobStatus::Running => {
                slot.pause_requested.store(true, Ordering::SeqCst);
                info!(job_id = %id, stage = %job.current_stage, "Pause requested");
                Ok(())
            }
            JobStatus::Paused => Ok(()),
            status => Err(PipelineError::InvalidState {
                job_id: id,
                status,
                operation: "pause",
            }),
        }
    }

    /// Read-only view of a job's progress; `None` for unknown ids.
    pub fn get_progress(&self, id: JobId) -> Option<ProgressReport> {
        self.slot(id).map(|slot| slot.report())
    }

    /// Snapshot of the full job record.
    pub fn job(&self, id: JobId) -> Option<PipelineJob> {
        self.slot(id).map(|slot| slot.lock().clone())
    }

    /// Progress of every active job, oldest first.
    pub fn jobs(&self) -> Vec<ProgressReport> {
        let slots: Vec<Arc<JobSlot>> = self.jobs_lock().values().cloned().collect();
        let mut reports: Vec<_> = slots
            .iter()
            .map(|slot| {
                let created_at = slot.lock().created_at;
                (created_at, slot.report())
            })
            .collect();
        reports.sort_by_key(|(created_at, _)| *created_at);
        reports.into_iter().map(|(_, report)| report).collect()
    }

    /// Loads a job from the checkpoint store into the active-job table. A job
    /// persisted as `Running` was interrupted mid-stage and comes back `Paused`.
    pub fn recover(&self, id: JobId) -> PipelineResult<ProgressReport> {
        match self.slot(id) {
            Some(slot) => Ok(slot.report()),
            None => self.recover_slot(id).map(|slot| slot.report()),
        }
    }

    fn recover_slot(&self, id: JobId) -> PipelineResult<Arc<JobSlot>> {
        let mut job = self
            .store
            .load(id)
            .map_err(PipelineError::Checkpoint)?
            .ok_or(PipelineError::JobNotFound(id))?;
        if job.status == JobStatus::Running {
            warn!(job_id = %id, stage = %job.current_stage, "Checkpoint was taken mid-run; treating job as paused");
            job.status = JobStatus::Paused;
        }
        debug!(job_id = %id, status = %job.status, "Job recovered from checkpoint");
        let mut jobs = self.jobs_lock();
        let slot = jobs
            .entry(id)
            .or_insert_with(|| Arc::new(JobSlot::new(job)))
            .clone();
        Ok(slot)
    }

    fn walk(&self, slot: &JobSlot, start: Option<StageId>) -> PipelineResult<RunOutcome> {
        let started = Instant::now();
        let mut next = start;
        while let Some(stage) = next {
            if slot.pause_requested.swap(false, Ordering::SeqCst) {
                return self.pause_at_boundary(slot);
            }
            self.execute_stage(slot, stage)?;
            next = self.registry.next(stage);
        }
        self.complete(slot, started)
    }

    fn execute_stage(&self, slot: &JobSlot, stage: StageId) -> PipelineResult<()> {
        let job = {
            let mut job = slot.lock();
            job.current_stage = stage;
            job.clone()
        };

        let produced = if job.artifacts.contains(stage.artifact_kind()) {
            debug!(%stage, "Artifact already recorded; not invoking handler");
            self.metrics.record_stage_skipped(stage);
            None
        } else {
            Some(self.invoke(slot, &job, stage)?)
        };
        let skipped = produced.is_none();

        let progress = self.registry.progress_for(stage);
        let snapshot = {
            let mut job = slot.lock();
            if let Some(artifact) = produced
                && let Err(kind) = job.artifacts.insert(artifact)
            {
                drop(job);
                return Err(self.fail(
                    slot,
                    stage,
                    StageError::InvalidContent(format!("artifact '{kind}' was already recorded")),
                ));
            }
            job.progress_percent = job.progress_percent.max(progress);
            job.last_completed = Some(stage);
            job.current_stage = self.registry.next(stage).unwrap_or(stage);
            job.clone()
        };

        if let Err(err) = self.store.save(&snapshot) {
            return Err(self.fail_checkpoint(slot, stage, err));
        }

        let event = if skipped {
            ProgressEvent::StageSkipped {
                job_id: snapshot.id,
                stage,
                progress_percent: snapshot.progress_percent,
            }
        } else {
            ProgressEvent::StageCompleted {
                job_id: snapshot.id,
                stage,
                progress_percent: snapshot.progress_percent,
            }
        };
        info!(%stage, progress = snapshot.progress_percent, "Stage completed");
        self.notify(&event);
        Ok(())
    }

    fn invoke(&self, slot: &JobSlot, job: &PipelineJob, stage: StageId) -> PipelineResult<Artifact> {
        let Some(handler) = self.handlers.get(stage) else {
            return Err(self.fail(
                slot,
                stage,
                StageError::Other(anyhow!("no handler registered for stage '{stage}'")),
            ));
        };

        let span = tracing::span!(tracing::Level::DEBUG, "stage", stage = stage.as_str());
        let _span_guard = span.enter();
        self.notify(&ProgressEvent::StageStarted {
            job_id: job.id,
            stage,
        });

        let ctx = StageContext {
            workspace: &job.workspace,
            settings: &self.config.stages,
        };
        let result = {
            let _timer = self.metrics.start_stage(stage);
            handler.run(job, &ctx)
        };

        match result {
            Ok(artifact) if artifact.kind != stage.artifact_kind() => Err(self.fail(
                slot,
                stage,
                StageError::InvalidContent(format!(
                    "handler produced a '{}' artifact instead of '{}'",
                    artifact.kind,
                    stage.artifact_kind()
                )),
            )),
            Ok(artifact) if artifact.paths.is_empty() => Err(self.fail(
                slot,
                stage,
                StageError::InvalidContent(format!("'{}' artifact has no location", artifact.kind)),
            )),
            Ok(artifact) => Ok(artifact),
            Err(err) => Err(self.fail(slot, stage, err)),
        }
    }

    /// Marks the job failed at `stage` and returns the error to surface.
    fn fail(&self, slot: &JobSlot, stage: StageId, source: StageError) -> PipelineError {
        let snapshot = {
            let mut job = slot.lock();
            job.status = JobStatus::Failed;
            job.current_stage = stage;
            job.error = Some(ErrorDetail {
                stage,
                kind: source.kind().to_string(),
                message: source.to_string(),
                occurred_at: Utc::now(),
            });
            job.clone()
        };
        error!(%stage, kind = source.kind(), error = %source, "Stage failed");
        self.metrics.record_stage_failure(stage);
        self.metrics.record_job_failed();
        if let Err(err) = self.store.save(&snapshot) {
            warn!(%stage, "Failed to checkpoint failed job: {err:#}");
        }
        self.notify(&ProgressEvent::StageFailed {
            job_id: snapshot.id,
            stage,
            error: source.to_string(),
        });
        PipelineError::Stage { stage, source }
    }

    /// The stage itself succeeded but its checkpoint did not. The job stops
    /// as failed so nothing runs past an unpersisted stage.
    fn fail_checkpoint(&self, slot: &JobSlot, stage: StageId, err: anyhow::Error) -> PipelineError {
        let job_id = {
            let mut job = slot.lock();
            job.status = JobStatus::Failed;
            job.error = Some(ErrorDetail {
                stage,
                kind: "checkpoint".to_string(),
                message: format!("{err:#}"),
                occurred_at: Utc::now(),
            });
            job.id
        };
        error!(%stage, "Checkpoint after stage failed: {err:#}");
        self.metrics.record_job_failed();
        self.notify(&ProgressEvent::StageFailed {
            job_id,
            stage,
            error: format!("{err:#}"),
        });
        PipelineError::Checkpoint(err)
    }

    fn pause_at_boundary(&self, slot: &JobSlot) -> PipelineResult<RunOutcome> {
        let snapshot = {
            let mut job = slot.lock();
            job.status = JobStatus::Paused;
            job.clone()
        };
        self.metrics.record_job_paused();
        self.store
            .save(&snapshot)
            .map_err(PipelineError::Checkpoint)?;
        info!(
            last_completed = ?snapshot.last_completed,
            progress = snapshot.progress_percent,
            "Job paused at stage boundary"
        );
        self.notify(&ProgressEvent::Paused {
            job_id: snapshot.id,
            progress_percent: snapshot.progress_percent,
        });
        Ok(RunOutcome::Paused {
            last_completed: snapshot.last_completed,
        })
    }

    fn complete(&self, slot: &JobSlot, started: Instant) -> PipelineResult<RunOutcome> {
        let last = self.registry.last();
        let snapshot = {
            let mut job = slot.lock();
            if job.final_output().is_none() {
                drop(job);
                return Err(self.fail(
                    slot,
                    last,
                    StageError::MissingArtifact(last.artifact_kind()),
                ));
            }
            job.status = JobStatus::Completed;
            job.current_stage = last;
            job.progress_percent = self.registry.progress_for(last);
            job.completed_at = Some(Utc::now());
            job.clone()
        };
        let output = snapshot
            .final_output()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if let Err(err) = self.store.save(&snapshot) {
            warn!("Failed to checkpoint completed job: {err:#}");
        }
        self.metrics.record_job_completed(started.elapsed());
        info!(output = %output.display(), "Job completed");
        self.notify(&ProgressEvent::Completed {
            job_id: snapshot.id,
            output: output.clone(),
        });
        Ok(RunOutcome::Completed(output))
    }

    /// Every completed stage's artifact must still be recorded and, when
    /// configured, present on disk with its recorded digest.
    fn verify_completed_artifacts(&self, job: &PipelineJob) -> PipelineResult<()> {
        let Some(last) = job.last_completed else {
            return Ok(());
        };
        for stage in self.registry.through(last) {
            let kind = stage.artifact_kind();
            let missing = PipelineError::MissingArtifact {
                job_id: job.id,
                kind,
            };
            let Some(artifact) = job.artifact(kind) else {
                return Err(missing);
            };
            if !self.config.verify_artifacts_on_resume {
                continue;
            }
            for (idx, path) in artifact.paths.iter().enumerate() {
                if !path.exists() {
                    warn!(%kind, path = %path.display(), "Artifact file is gone");
                    return Err(missing);
                }
                if let Some(expected) = artifact.digests.get(idx) {
                    match compute_sha256(path) {
                        Ok(actual) if &actual == expected => {}
                        _ => {
                            warn!(%kind, path = %path.display(), "Artifact digest changed");
                            return Err(missing);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn slot(&self, id: JobId) -> Option<Arc<JobSlot>> {
        self.jobs_lock().get(&id).cloned()
    }

    fn jobs_lock(&self) -> MutexGuard<'_, HashMap<JobId, Arc<JobSlot>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: &ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer(event);
        }
    }
}
