use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::registry::StageId;

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub stages: BTreeMap<String, StageMetrics>,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_paused: u64,
    pub total_duration_ms: f64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct StageMetrics {
    pub calls: u64,
    pub failures: u64,
    pub skipped: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_stage(&self, stage: StageId) -> StageTimer {
        StageTimer {
            stage: stage.as_str(),
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    pub fn record_stage_failure(&self, stage: StageId) {
        if let Ok(mut guard) = self.inner.lock() {
            guard
                .stages
                .entry(stage.as_str().to_string())
                .or_default()
                .failures += 1;
        }
    }

    pub fn record_stage_skipped(&self, stage: StageId) {
        if let Ok(mut guard) = self.inner.lock() {
            guard
                .stages
                .entry(stage.as_str().to_string())
                .or_default()
                .skipped += 1;
        }
    }

    pub fn record_job_completed(&self, duration: Duration) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.jobs_completed += 1;
            guard.total_duration_ms += duration.as_secs_f64() * 1_000.0;
        }
    }

    pub fn record_job_failed(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.jobs_failed += 1;
        }
    }

    pub fn record_job_paused(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.jobs_paused += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Records a stage call's duration when dropped.
pub struct StageTimer {
    stage: &'static str,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl StageTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration = self.started_at.elapsed();
        let duration_ms = duration.as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.stages.entry(self.stage.to_string()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(stage = self.stage, duration_ms, "Stage duration recorded");
        self.recorded = true;
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        jobs_completed = snapshot.jobs_completed,
        jobs_failed = snapshot.jobs_failed,
        jobs_paused = snapshot.jobs_paused,
        total_duration_ms = snapshot.total_duration_ms,
        "Pipeline metrics summary"
    );
    for (stage, metrics) in &snapshot.stages {
        info!(
            stage = stage.as_str(),
            calls = metrics.calls,
            failures = metrics.failures,
            skipped = metrics.skipped,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Stage metrics"
        );
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        for (name, help, value) in [
            (
                "reelforge_jobs_completed_total",
                "Jobs that reached the final stage",
                self.jobs_completed,
            ),
            (
                "reelforge_jobs_failed_total",
                "Runs that stopped on a stage error",
                self.jobs_failed,
            ),
            (
                "reelforge_jobs_paused_total",
                "Runs that stopped on a pause request",
                self.jobs_paused,
            ),
        ] {
            output.push_str(&format!("# HELP {name} {help}\n"));
            output.push_str(&format!("# TYPE {name} counter\n"));
            output.push_str(&format!("{name} {value}\n"));
        }
        output.push_str("# HELP reelforge_stage_calls_total Stage handler invocations\n");
        output.push_str("# TYPE reelforge_stage_calls_total counter\n");
        output.push_str("# HELP reelforge_stage_failures_total Stage handler failures\n");
        output.push_str("# TYPE reelforge_stage_failures_total counter\n");
        output.push_str(
            "# HELP reelforge_stage_duration_seconds_total Accumulated stage duration in seconds\n",
        );
        output.push_str("# TYPE reelforge_stage_duration_seconds_total counter\n");
        output.push_str(
            "# HELP reelforge_stage_duration_seconds_max Maximum stage duration in seconds\n",
        );
        output.push_str("# TYPE reelforge_stage_duration_seconds_max gauge\n");
        for (stage, metrics) in &self.stages {
            output.push_str(&format!(
                "reelforge_stage_calls_total{{stage=\"{}\"}} {}\n",
                stage, metrics.calls
            ));
            output.push_str(&format!(
                "reelforge_stage_failures_total{{stage=\"{}\"}} {}\n",
                stage, metrics.failures
            ));
            output.push_str(&format!(
                "reelforge_stage_duration_seconds_total{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "reelforge_stage_duration_seconds_max{{stage=\"{}\"}} {:.6}\n",
                stage,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP reelforge_job_duration_seconds_total Wall time of completed runs\n");
        output.push_str("# TYPE reelforge_job_duration_seconds_total counter\n");
        output.push_str(&format!(
            "reelforge_job_duration_seconds_total {:.6}\n",
            self.total_duration_ms / 1_000.0
        ));
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_on_drop() {
        let metrics = MetricsCollector::new();
        {
            let _timer = metrics.start_stage(StageId::Storyboarding);
        }
        metrics.record_stage_failure(StageId::Storyboarding);
        let snapshot = metrics.snapshot();
        let stage = snapshot.stages.get("storyboarding").unwrap();
        assert_eq!(stage.calls, 1);
        assert_eq!(stage.failures, 1);
        assert!(
            snapshot
                .to_prometheus()
                .contains("reelforge_stage_calls_total{stage=\"storyboarding\"} 1")
        );
    }
}
