//! Services the stage handlers call out to. Each trait is the narrow seam a
//! real generation backend plugs into; the offline implementations here are
//! deterministic and write JSON manifests instead of media.

pub mod assembly;
pub mod character;
pub mod script;
pub mod storyboard;
pub mod video;
pub mod voice;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::concept::VideoConcept;
use crate::config::ForgeConfig;
use crate::error::StageError;

use self::assembly::{OfflineAssembler, PlatformProfile};
use self::character::{CharacterProfile, ConsistencyEngine};
use self::script::{Scene, Screenplay, TemplateScriptGenerator};
use self::storyboard::{RuleStoryboardEngine, StoryboardScene};
use self::video::{OfflineRenderBackend, PollingVideoClient, VideoRequest};
use self::voice::{DialogueTurn, OfflineVoiceSynthesizer, VoiceLine};

pub trait ScriptGenerator: Send + Sync {
    fn generate(&self, concept: &VideoConcept) -> Result<Screenplay, StageError>;
}

pub trait StoryboardBuilder: Send + Sync {
    fn build(&self, scenes: &[Scene]) -> Vec<StoryboardScene>;
}

pub trait CharacterConsistency: Send + Sync {
    fn register(
        &self,
        character_id: Option<&str>,
        name: &str,
        description: &str,
        reference_images: &[PathBuf],
    ) -> CharacterProfile;
    fn profile(&self, character_id: &str) -> Option<CharacterProfile>;
    fn prompt_for(&self, character_id: &str, scene_description: &str)
    -> Result<String, StageError>;
    /// Similarity of a generated frame to the character's references, in [0, 1].
    fn score(&self, character_id: &str, frame: &Path) -> Result<f64, StageError>;
}

pub trait VideoGenerator: Send + Sync {
    fn generate(&self, request: &VideoRequest, output_dir: &Path) -> Result<PathBuf, StageError>;
}

pub trait VoiceSynthesizer: Send + Sync {
    fn synthesize(&self, line: &VoiceLine, output_dir: &Path) -> Result<PathBuf, StageError>;
    fn synthesize_dialogue(
        &self,
        turns: &[DialogueTurn],
        output_dir: &Path,
    ) -> Result<PathBuf, StageError>;
}

pub trait VideoAssembler: Send + Sync {
    fn integrate_audio(
        &self,
        narration: &Path,
        background: Option<&Path>,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError>;
    fn assemble(
        &self,
        segments: &[PathBuf],
        audio: &Path,
        transition_seconds: f64,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError>;
    fn export_for(
        &self,
        profile: PlatformProfile,
        video: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError>;
}

/// The full set of collaborators the default stage handlers need.
#[derive(Clone)]
pub struct Collaborators {
    pub script: Arc<dyn ScriptGenerator>,
    pub storyboard: Arc<dyn StoryboardBuilder>,
    pub characters: Arc<dyn CharacterConsistency>,
    pub video: Arc<dyn VideoGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub assembler: Arc<dyn VideoAssembler>,
}

impl Collaborators {
    pub fn offline(config: &ForgeConfig) -> Self {
        Self {
            script: Arc::new(TemplateScriptGenerator::new()),
            storyboard: Arc::new(RuleStoryboardEngine),
            characters: Arc::new(ConsistencyEngine::new()),
            video: Arc::new(PollingVideoClient::new(
                OfflineRenderBackend::new(),
                config.video.poll_interval(),
                config.video.timeout(),
            )),
            voice: Arc::new(OfflineVoiceSynthesizer::new(
                config.stages.narrator_voice.clone(),
            )),
            assembler: Arc::new(OfflineAssembler),
        }
    }
}
