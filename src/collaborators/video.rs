use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::VideoGenerator;
use crate::digest;
use crate::error::StageError;

const MAX_SUBMIT_ATTEMPTS: u32 = 3;
const MAX_REPORTED_PERCENT: u8 = 95;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRequest {
    pub prompt: String,
    pub duration_seconds: f64,
    pub aspect_ratio: String,
    pub style: String,
    pub resolution: String,
}

impl VideoRequest {
    /// Cache key over every field that changes the rendered output.
    pub fn fingerprint(&self) -> String {
        digest::fingerprint([
            self.prompt.as_str(),
            format!("{:.3}", self.duration_seconds).as_str(),
            self.aspect_ratio.as_str(),
            self.style.as_str(),
            self.resolution.as_str(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderStatus {
    Queued,
    Processing,
    Completed,
    Failed(String),
}

/// A remote render service: submit, poll, download.
pub trait RenderBackend: Send + Sync {
    fn submit(&self, request: &VideoRequest) -> Result<String, StageError>;
    fn status(&self, remote_id: &str) -> Result<RenderStatus, StageError>;
    fn download(&self, remote_id: &str, destination: &Path) -> Result<(), StageError>;

    fn file_extension(&self) -> &'static str {
        "mp4"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderProgress {
    pub polls: u32,
    pub percent: u8,
}

type ProgressCallback = Box<dyn Fn(&VideoRequest, RenderProgress) + Send + Sync>;

/// Drives a [`RenderBackend`] to completion with bounded polling and caches
/// finished renders by request fingerprint.
pub struct PollingVideoClient<B> {
    backend: B,
    poll_interval: Duration,
    timeout: Duration,
    cache: Mutex<HashMap<String, PathBuf>>,
    on_progress: Option<ProgressCallback>,
}

impl<B: RenderBackend> PollingVideoClient<B> {
    pub fn new(backend: B, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            backend,
            poll_interval,
            timeout,
            cache: Mutex::new(HashMap::new()),
            on_progress: None,
        }
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&VideoRequest, RenderProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn cached(&self, key: &str) -> Option<PathBuf> {
        let cache = self.cache.lock().ok()?;
        cache.get(key).filter(|path| path.exists()).cloned()
    }

    fn remember(&self, key: String, path: PathBuf) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, path);
        }
    }

    fn submit_with_retry(&self, request: &VideoRequest) -> Result<String, StageError> {
        let mut attempt = 1;
        loop {
            match self.backend.submit(request) {
                Ok(remote_id) => return Ok(remote_id),
                Err(StageError::ServiceUnavailable(reason)) if attempt < MAX_SUBMIT_ATTEMPTS => {
                    warn!(attempt, reason = %reason, "Render submission failed; retrying");
                    thread::sleep(self.poll_interval * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<B: RenderBackend> VideoGenerator for PollingVideoClient<B> {
    fn generate(&self, request: &VideoRequest, output_dir: &Path) -> Result<PathBuf, StageError> {
        let key = request.fingerprint();
        if let Some(path) = self.cached(&key) {
            debug!(key = %&key[..16], "Render cache hit");
            return Ok(path);
        }

        let destination = output_dir.join(format!(
            "segment_{}.{}",
            &key[..16],
            self.backend.file_extension()
        ));
        if destination.exists() {
            debug!(path = %destination.display(), "Reusing render from an earlier run");
            self.remember(key, destination.clone());
            return Ok(destination);
        }

        let remote_id = self.submit_with_retry(request)?;
        let deadline = Instant::now() + self.timeout;
        let mut polls: u32 = 0;
        loop {
            match self.backend.status(&remote_id)? {
                RenderStatus::Completed => {
                    self.backend.download(&remote_id, &destination)?;
                    info!(remote_id = %remote_id, polls, path = %destination.display(), "Render completed");
                    self.remember(key, destination.clone());
                    return Ok(destination);
                }
                RenderStatus::Failed(reason) => {
                    return Err(StageError::ServiceUnavailable(format!(
                        "render {remote_id} failed: {reason}"
                    )));
                }
                RenderStatus::Queued | RenderStatus::Processing => {}
            }

            if Instant::now() >= deadline {
                return Err(StageError::StageTimeout(self.timeout));
            }
            polls += 1;
            if let Some(callback) = &self.on_progress {
                let percent = (polls.saturating_mul(10)).min(MAX_REPORTED_PERCENT as u32) as u8;
                callback(request, RenderProgress { polls, percent });
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderManifest<'a> {
    remote_id: &'a str,
    rendered_at: String,
    #[serde(flatten)]
    request: &'a VideoRequest,
}

/// Completes every render immediately and writes its parameters as JSON.
#[derive(Debug, Default)]
pub struct OfflineRenderBackend {
    submitted: Mutex<HashMap<String, VideoRequest>>,
}

impl OfflineRenderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> usize {
        self.submitted.lock().map(|jobs| jobs.len()).unwrap_or(0)
    }
}

impl RenderBackend for OfflineRenderBackend {
    fn submit(&self, request: &VideoRequest) -> Result<String, StageError> {
        let remote_id = Uuid::new_v4().to_string();
        self.submitted
            .lock()
            .map_err(|_| StageError::ServiceUnavailable("render queue poisoned".into()))?
            .insert(remote_id.clone(), request.clone());
        Ok(remote_id)
    }

    fn status(&self, remote_id: &str) -> Result<RenderStatus, StageError> {
        let known = self
            .submitted
            .lock()
            .map(|jobs| jobs.contains_key(remote_id))
            .unwrap_or(false);
        Ok(if known {
            RenderStatus::Completed
        } else {
            RenderStatus::Failed(format!("unknown render {remote_id}"))
        })
    }

    fn download(&self, remote_id: &str, destination: &Path) -> Result<(), StageError> {
        let request = self
            .submitted
            .lock()
            .ok()
            .and_then(|jobs| jobs.get(remote_id).cloned())
            .ok_or_else(|| StageError::ServiceUnavailable(format!("unknown render {remote_id}")))?;
        let manifest = RenderManifest {
            remote_id,
            rendered_at: Utc::now().to_rfc3339(),
            request: &request,
        };
        let content = serde_json::to_vec_pretty(&manifest).context("Failed to encode render")?;
        fs::write(destination, content)
            .with_context(|| format!("Failed to write render: {}", destination.display()))?;
        Ok(())
    }

    fn file_extension(&self) -> &'static str {
        "render.json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn request(prompt: &str) -> VideoRequest {
        VideoRequest {
            prompt: prompt.into(),
            duration_seconds: 6.0,
            aspect_ratio: "16:9".into(),
            style: "cinematic".into(),
            resolution: "1080p".into(),
        }
    }

    /// Reports `Processing` for a fixed number of polls, then `Completed`.
    struct SlowBackend {
        polls_before_done: u32,
        polls: AtomicU32,
        submits: AtomicU32,
        failing_submits: u32,
    }

    impl SlowBackend {
        fn new(polls_before_done: u32) -> Self {
            Self {
                polls_before_done,
                polls: AtomicU32::new(0),
                submits: AtomicU32::new(0),
                failing_submits: 0,
            }
        }
    }

    impl RenderBackend for SlowBackend {
        fn submit(&self, _request: &VideoRequest) -> Result<String, StageError> {
            let attempt = self.submits.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failing_submits {
                return Err(StageError::ServiceUnavailable("busy".into()));
            }
            Ok("remote-1".into())
        }

        fn status(&self, _remote_id: &str) -> Result<RenderStatus, StageError> {
            let polled = self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(if polled >= self.polls_before_done {
                RenderStatus::Completed
            } else {
                RenderStatus::Processing
            })
        }

        fn download(&self, _remote_id: &str, destination: &Path) -> Result<(), StageError> {
            fs::write(destination, b"video").map_err(|err| StageError::Other(err.into()))
        }
    }

    #[test]
    fn polls_until_complete_and_reports_progress() {
        let dir = tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let client = PollingVideoClient::new(
            SlowBackend::new(3),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .with_progress(move |_, progress| sink.lock().unwrap().push(progress.percent));

        let path = client.generate(&request("sunrise"), dir.path()).unwrap();
        assert!(path.exists());
        assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn identical_requests_hit_the_cache() {
        let dir = tempdir().unwrap();
        let client = PollingVideoClient::new(
            SlowBackend::new(0),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        let first = client.generate(&request("sunrise"), dir.path()).unwrap();
        let second = client.generate(&request("sunrise"), dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(client.backend().submits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn never_finishing_render_times_out() {
        let dir = tempdir().unwrap();
        let client = PollingVideoClient::new(
            SlowBackend::new(u32::MAX),
            Duration::from_millis(2),
            Duration::from_millis(20),
        );
        let err = client.generate(&request("sunset"), dir.path()).unwrap_err();
        assert!(matches!(err, StageError::StageTimeout(timeout) if timeout == Duration::from_millis(20)));
    }

    #[test]
    fn transient_submit_failures_are_retried() {
        let dir = tempdir().unwrap();
        let mut backend = SlowBackend::new(0);
        backend.failing_submits = 2;
        let client = PollingVideoClient::new(backend, Duration::from_millis(1), Duration::from_secs(5));
        client.generate(&request("noon"), dir.path()).unwrap();
        assert_eq!(client.backend().submits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn offline_backend_writes_request_manifest() {
        let dir = tempdir().unwrap();
        let client = PollingVideoClient::new(
            OfflineRenderBackend::new(),
            Duration::from_millis(1),
            Duration::from_secs(5),
        );
        let path = client.generate(&request("harbour at dusk"), dir.path()).unwrap();
        assert!(path.to_string_lossy().ends_with(".render.json"));
        let manifest: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(manifest["prompt"], "harbour at dusk");
        assert_eq!(manifest["aspect_ratio"], "16:9");
        assert_eq!(client.backend().submitted(), 1);
    }
}
