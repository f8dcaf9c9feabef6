//! Default handlers for the eight pipeline stages, each delegating to one of
//! the [`Collaborators`].

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::checkpoint::CheckpointStore;
use crate::collaborators::character::CharacterProfile;
use crate::collaborators::script::Screenplay;
use crate::collaborators::storyboard::StoryboardScene;
use crate::collaborators::video::VideoRequest;
use crate::collaborators::voice::DialogueTurn;
use crate::collaborators::{
    CharacterConsistency, Collaborators, ScriptGenerator, StoryboardBuilder, VideoAssembler,
    VideoGenerator, VoiceSynthesizer,
};
use crate::config::ForgeConfig;
use crate::digest;
use crate::error::{PipelineResult, StageError};
use crate::job::{Artifact, ArtifactKind, PipelineJob};
use crate::orchestrator::Orchestrator;
use crate::pipeline::{HandlerRegistry, StageContext, StageHandler, read_artifact_json};
use crate::registry::StageId;

pub fn register_defaults(handlers: &mut HandlerRegistry, collaborators: &Collaborators) {
    handlers.register(ScriptStage {
        generator: collaborators.script.clone(),
    });
    handlers.register(StoryboardStage {
        builder: collaborators.storyboard.clone(),
    });
    handlers.register(CharacterStage {
        characters: collaborators.characters.clone(),
    });
    handlers.register(VideoStage {
        video: collaborators.video.clone(),
        characters: collaborators.characters.clone(),
    });
    handlers.register(VoiceStage {
        voice: collaborators.voice.clone(),
    });
    handlers.register(AudioStage {
        assembler: collaborators.assembler.clone(),
    });
    handlers.register(AssemblyStage {
        assembler: collaborators.assembler.clone(),
    });
    handlers.register(ExportStage {
        assembler: collaborators.assembler.clone(),
    });
}

/// Orchestrator wired to the offline collaborators.
pub fn build_offline_orchestrator(
    config: ForgeConfig,
    store: Arc<dyn CheckpointStore>,
) -> PipelineResult<Orchestrator> {
    let collaborators = Collaborators::offline(&config);
    let mut handlers = HandlerRegistry::new();
    register_defaults(&mut handlers, &collaborators);
    Orchestrator::new(handlers, store, config)
}

/// Output of character design: one profile per speaker plus the
/// consistency prompt for every scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub profiles: Vec<CharacterProfile>,
    pub scene_prompts: Vec<ScenePrompt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePrompt {
    pub scene_number: u32,
    pub character_id: String,
    pub prompt: String,
}

fn character_id(speaker: &str) -> String {
    let slug: String = speaker
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    if slug.is_empty() {
        "narrator".into()
    } else {
        slug
    }
}

struct ScriptStage {
    generator: Arc<dyn ScriptGenerator>,
}

impl StageHandler for ScriptStage {
    fn stage(&self) -> StageId {
        StageId::ScriptGeneration
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let screenplay = self.generator.generate(&job.concept)?;
        if screenplay.scenes.is_empty() {
            return Err(StageError::ScriptGeneration(
                "screenplay contains no scenes".into(),
            ));
        }
        let path = ctx.write_json("script.json", &screenplay)?;
        Ok(Artifact::single(self.stage(), path)
            .with_summary("scene_count", screenplay.scenes.len())
            .with_summary("duration_seconds", screenplay.duration_seconds))
    }
}

struct StoryboardStage {
    builder: Arc<dyn StoryboardBuilder>,
}

impl StageHandler for StoryboardStage {
    fn stage(&self) -> StageId {
        StageId::Storyboarding
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let screenplay: Screenplay = read_artifact_json(job, ArtifactKind::Script)?;
        let boards = self.builder.build(&screenplay.scenes);
        if boards.len() != screenplay.scenes.len() {
            return Err(StageError::InvalidContent(format!(
                "storyboard has {} scenes, screenplay has {}",
                boards.len(),
                screenplay.scenes.len()
            )));
        }
        let path = ctx.write_json("storyboard.json", &boards)?;
        Ok(Artifact::single(self.stage(), path).with_summary("scene_count", boards.len()))
    }
}

struct CharacterStage {
    characters: Arc<dyn CharacterConsistency>,
}

impl StageHandler for CharacterStage {
    fn stage(&self) -> StageId {
        StageId::CharacterDesign
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let screenplay: Screenplay = read_artifact_json(job, ArtifactKind::Script)?;
        let concept = &job.concept;

        let mut profiles: Vec<CharacterProfile> = Vec::new();
        let mut scene_prompts = Vec::with_capacity(screenplay.scenes.len());
        for scene in &screenplay.scenes {
            let id = character_id(&scene.speaker);
            if !profiles.iter().any(|p| p.character_id == id) {
                let description = format!(
                    "{} presenting {} to {} in a {} style",
                    scene.speaker, concept.title, concept.target_audience, concept.tone
                );
                profiles.push(self.characters.register(
                    Some(id.as_str()),
                    &scene.speaker,
                    &description,
                    &[],
                ));
            }
            let prompt = self
                .characters
                .prompt_for(&id, &scene.visual_description)?;
            scene_prompts.push(ScenePrompt {
                scene_number: scene.number,
                character_id: id,
                prompt,
            });
        }

        let sheet = CharacterSheet {
            profiles,
            scene_prompts,
        };
        let path = ctx.write_json("characters.json", &sheet)?;
        Ok(Artifact::single(self.stage(), path)
            .with_summary("characters", sheet.profiles.len()))
    }
}

struct VideoStage {
    video: Arc<dyn VideoGenerator>,
    characters: Arc<dyn CharacterConsistency>,
}

impl VideoStage {
    /// Profiles live in memory; after a restart they are re-registered from
    /// the recorded character sheet.
    fn restore_profiles(&self, sheet: &CharacterSheet) {
        for profile in &sheet.profiles {
            if self.characters.profile(&profile.character_id).is_none() {
                debug!(character_id = %profile.character_id, "Restoring character profile");
                self.characters.register(
                    Some(profile.character_id.as_str()),
                    &profile.name,
                    &profile.description,
                    &profile.reference_images,
                );
            }
        }
    }
}

impl StageHandler for VideoStage {
    fn stage(&self) -> StageId {
        StageId::VideoGeneration
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let boards: Vec<StoryboardScene> = read_artifact_json(job, ArtifactKind::Storyboard)?;
        let sheet: CharacterSheet = read_artifact_json(job, ArtifactKind::Characters)?;
        self.restore_profiles(&sheet);

        let output_dir = ctx.output_dir("segments")?;
        let mut segments = Vec::with_capacity(boards.len());
        let mut min_consistency: f64 = 1.0;
        for board in &boards {
            let scene_prompt = sheet
                .scene_prompts
                .iter()
                .find(|p| p.scene_number == board.scene_number)
                .ok_or_else(|| {
                    StageError::InvalidContent(format!(
                        "no character prompt for scene {}",
                        board.scene_number
                    ))
                })?;
            let request = VideoRequest {
                prompt: format!(
                    "{}\n\nCamera: {} with {} movement ({}). Lighting: {}.",
                    scene_prompt.prompt,
                    board.camera_angle,
                    board.camera_movement,
                    board.movement_direction,
                    board.lighting
                ),
                duration_seconds: board.duration_seconds,
                aspect_ratio: ctx.settings.aspect_ratio.clone(),
                style: ctx.settings.style.clone(),
                resolution: ctx.settings.resolution.clone(),
            };
            let path = self.video.generate(&request, &output_dir)?;
            let score = self.characters.score(&scene_prompt.character_id, &path)?;
            if score < 0.5 {
                warn!(
                    scene = board.scene_number,
                    score, "Generated segment drifts from character references"
                );
            }
            min_consistency = min_consistency.min(score);
            segments.push(path);
        }

        let digests = digest::digest_all(&segments)?;
        Ok(Artifact::new(self.stage(), segments)
            .with_digests(digests)
            .with_summary("segment_count", boards.len())
            .with_summary("min_consistency", min_consistency))
    }
}

struct VoiceStage {
    voice: Arc<dyn VoiceSynthesizer>,
}

impl StageHandler for VoiceStage {
    fn stage(&self) -> StageId {
        StageId::VoiceSynthesis
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let screenplay: Screenplay = read_artifact_json(job, ArtifactKind::Script)?;
        let turns: Vec<DialogueTurn> = screenplay
            .scenes
            .iter()
            .filter(|scene| !scene.dialogue.trim().is_empty())
            .map(|scene| DialogueTurn {
                speaker: scene.speaker.clone(),
                text: scene.dialogue.clone(),
                emotion: scene.dominant_emotion(),
                emphasis_words: scene.emphasis_words(),
            })
            .collect();
        let path = self
            .voice
            .synthesize_dialogue(&turns, &ctx.output_dir("voice")?)?;
        Ok(Artifact::single(self.stage(), path).with_summary("turns", turns.len()))
    }
}

struct AudioStage {
    assembler: Arc<dyn VideoAssembler>,
}

impl StageHandler for AudioStage {
    fn stage(&self) -> StageId {
        StageId::AudioIntegration
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let narration = job
            .artifact(ArtifactKind::Voiceover)
            .and_then(Artifact::primary_path)
            .ok_or(StageError::MissingArtifact(ArtifactKind::Voiceover))?;
        let background = ctx.settings.background_music.as_deref();
        let path = self
            .assembler
            .integrate_audio(narration, background, &ctx.output_dir("audio")?)?;
        Ok(Artifact::single(self.stage(), path)
            .with_summary("background_music", background.is_some()))
    }
}

struct AssemblyStage {
    assembler: Arc<dyn VideoAssembler>,
}

impl StageHandler for AssemblyStage {
    fn stage(&self) -> StageId {
        StageId::VideoAssembly
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let segments = job
            .artifact(ArtifactKind::VideoSegments)
            .map(|artifact| artifact.paths.clone())
            .ok_or(StageError::MissingArtifact(ArtifactKind::VideoSegments))?;
        let audio = job
            .artifact(ArtifactKind::IntegratedAudio)
            .and_then(Artifact::primary_path)
            .ok_or(StageError::MissingArtifact(ArtifactKind::IntegratedAudio))?;
        let path = self.assembler.assemble(
            &segments,
            audio,
            ctx.settings.transition_seconds,
            ctx.workspace,
        )?;
        let digest = digest::compute_sha256(&path)?;
        Ok(Artifact::single(self.stage(), path)
            .with_digests(vec![digest])
            .with_summary("segments", segments.len()))
    }
}

struct ExportStage {
    assembler: Arc<dyn VideoAssembler>,
}

impl StageHandler for ExportStage {
    fn stage(&self) -> StageId {
        StageId::Export
    }

    fn run(&self, job: &PipelineJob, ctx: &StageContext<'_>) -> Result<Artifact, StageError> {
        let profiles = &ctx.settings.export_profiles;
        if profiles.is_empty() {
            return Err(StageError::InvalidContent(
                "no export profiles configured".into(),
            ));
        }
        let video = job
            .artifact(ArtifactKind::AssembledVideo)
            .and_then(Artifact::primary_path)
            .ok_or(StageError::MissingArtifact(ArtifactKind::AssembledVideo))?;
        let output_dir = ctx.output_dir("exports")?;
        let paths = profiles
            .iter()
            .map(|profile| self.assembler.export_for(*profile, video, &output_dir))
            .collect::<Result<Vec<PathBuf>, _>>()?;
        let digests = digest::digest_all(&paths)?;
        let names: Vec<&str> = profiles.iter().map(|profile| profile.as_str()).collect();
        Ok(Artifact::new(self.stage(), paths)
            .with_digests(digests)
            .with_summary("profiles", json!(names)))
    }
}
