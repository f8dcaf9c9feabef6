use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::job::ArtifactKind;

/// One discrete unit of the generation pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    ScriptGeneration,
    Storyboarding,
    CharacterDesign,
    VideoGeneration,
    VoiceSynthesis,
    AudioIntegration,
    VideoAssembly,
    Export,
}

impl StageId {
    pub const ALL: [StageId; 8] = [
        StageId::ScriptGeneration,
        StageId::Storyboarding,
        StageId::CharacterDesign,
        StageId::VideoGeneration,
        StageId::VoiceSynthesis,
        StageId::AudioIntegration,
        StageId::VideoAssembly,
        StageId::Export,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::ScriptGeneration => "script_generation",
            StageId::Storyboarding => "storyboarding",
            StageId::CharacterDesign => "character_design",
            StageId::VideoGeneration => "video_generation",
            StageId::VoiceSynthesis => "voice_synthesis",
            StageId::AudioIntegration => "audio_integration",
            StageId::VideoAssembly => "video_assembly",
            StageId::Export => "export",
        }
    }

    /// Percent complete once this stage has finished. Total over the enum so
    /// ordering and progress cannot drift apart.
    pub fn checkpoint_percent(self) -> u8 {
        match self {
            StageId::ScriptGeneration => 10,
            StageId::Storyboarding => 20,
            StageId::CharacterDesign => 30,
            StageId::VideoGeneration => 60,
            StageId::VoiceSynthesis => 75,
            StageId::AudioIntegration => 85,
            StageId::VideoAssembly => 95,
            StageId::Export => 100,
        }
    }

    /// The artifact this stage owns.
    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            StageId::ScriptGeneration => ArtifactKind::Script,
            StageId::Storyboarding => ArtifactKind::Storyboard,
            StageId::CharacterDesign => ArtifactKind::Characters,
            StageId::VideoGeneration => ArtifactKind::VideoSegments,
            StageId::VoiceSynthesis => ArtifactKind::Voiceover,
            StageId::AudioIntegration => ArtifactKind::IntegratedAudio,
            StageId::VideoAssembly => ArtifactKind::AssembledVideo,
            StageId::Export => ArtifactKind::Exports,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        StageId::ALL
            .into_iter()
            .find(|stage| stage.as_str() == normalized)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown stage '{}'. Available stages: {}",
                    value,
                    StageId::ALL.map(StageId::as_str).join(", ")
                )
            })
    }
}

/// Fixed, totally ordered stage sequence shared by every job.
#[derive(Debug, Clone)]
pub struct StageRegistry {
    stages: Vec<StageId>,
}

static STANDARD: Lazy<StageRegistry> = Lazy::new(|| StageRegistry {
    stages: StageId::ALL.to_vec(),
});

impl StageRegistry {
    /// The process-wide registry. Immutable, so it is shared without locking.
    pub fn standard() -> &'static StageRegistry {
        &STANDARD
    }

    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    pub fn first(&self) -> StageId {
        self.stages[0]
    }

    pub fn last(&self) -> StageId {
        self.stages[self.stages.len() - 1]
    }

    pub fn position(&self, stage: StageId) -> usize {
        self.stages
            .iter()
            .position(|candidate| *candidate == stage)
            .unwrap_or_default()
    }

    pub fn progress_for(&self, stage: StageId) -> u8 {
        stage.checkpoint_percent()
    }

    pub fn next(&self, stage: StageId) -> Option<StageId> {
        self.stages.get(self.position(stage) + 1).copied()
    }

    /// First stage that has not completed, given the last completed one.
    pub fn next_after(&self, completed: Option<StageId>) -> Option<StageId> {
        match completed {
            Some(stage) => self.next(stage),
            None => Some(self.first()),
        }
    }

    /// Stages up to and including `stage`.
    pub fn through(&self, stage: StageId) -> &[StageId] {
        &self.stages[..=self.position(stage)]
    }
}
