use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::collaborators::assembly::PlatformProfile;

/// Top-level configuration, loaded from YAML. Every field has a default so an
/// empty document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub workspace_root: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub concept_limits: ConceptLimits,
    pub verify_artifacts_on_resume: bool,
    pub stages: StageSettings,
    pub video: VideoClientSettings,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(".reel-forge/work"),
            checkpoint_dir: PathBuf::from(".reel-forge/checkpoints"),
            concept_limits: ConceptLimits::default(),
            verify_artifacts_on_resume: true,
            stages: StageSettings::default(),
            video: VideoClientSettings::default(),
        }
    }
}

impl ForgeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: ForgeConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config YAML: {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptLimits {
    pub min_duration_seconds: f64,
    pub max_duration_seconds: f64,
}

impl Default for ConceptLimits {
    fn default() -> Self {
        Self {
            min_duration_seconds: 10.0,
            max_duration_seconds: 600.0,
        }
    }
}

/// Parameters the stage handlers pass to their collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettings {
    pub aspect_ratio: String,
    pub style: String,
    pub resolution: String,
    pub transition_seconds: f64,
    pub narrator_voice: String,
    pub background_music: Option<PathBuf>,
    pub export_profiles: Vec<PlatformProfile>,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            aspect_ratio: "16:9".to_string(),
            style: "cinematic".to_string(),
            resolution: "1080p".to_string(),
            transition_seconds: 0.5,
            narrator_voice: "en_US_female_professional".to_string(),
            background_music: None,
            export_profiles: vec![PlatformProfile::Youtube1080],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoClientSettings {
    pub poll_interval_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for VideoClientSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            timeout_seconds: 300,
        }
    }
}

impl VideoClientSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
