use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::VoiceSynthesizer;
use super::script::Emotion;
use crate::digest;
use crate::error::StageError;

const PACE_RANGE: std::ops::RangeInclusive<f64> = 0.5..=2.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceLine {
    pub text: String,
    pub voice_id: String,
    pub emotion: Emotion,
    #[serde(default = "default_pace")]
    pub pace_multiplier: f64,
    #[serde(default)]
    pub emphasis_words: Vec<String>,
}

fn default_pace() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub speaker: String,
    pub text: String,
    pub emotion: Emotion,
    #[serde(default)]
    pub emphasis_words: Vec<String>,
}

/// Voice assigned to a named speaker; anyone unlisted gets `default_voice`.
pub fn voice_for_speaker<'a>(speaker: &str, default_voice: &'a str) -> &'a str {
    match speaker.to_ascii_lowercase().as_str() {
        "ceo" => "en_US_male_executive",
        "customer" => "en_US_female_conversational",
        _ => default_voice,
    }
}

/// SSML-style markup with emotion prosody and emphasised words.
pub fn render_markup(line: &VoiceLine) -> String {
    let mut text = line.text.clone();
    for word in &line.emphasis_words {
        if word.is_empty() {
            continue;
        }
        text = text.replace(word.as_str(), &format!("<emphasis level=\"strong\">{word}</emphasis>"));
    }
    let (pitch, rate) = match line.emotion {
        Emotion::Enthusiastic => ("+10%", 1.1),
        Emotion::Serious => ("-5%", 0.9),
        Emotion::Curious => ("+5%", 1.0),
        Emotion::Warm => ("+2%", 0.95),
        Emotion::Emphatic | Emotion::Neutral => ("+0%", 1.0),
    };
    format!(
        "<prosody pitch=\"{pitch}\" rate=\"{:.0}%\">{text}</prosody>",
        rate * line.pace_multiplier * 100.0
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceClip {
    pub voice_id: String,
    pub markup: String,
    pub pace_multiplier: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DialogueTrack {
    pub speakers: Vec<String>,
    pub clips: Vec<PathBuf>,
}

/// Writes markup clips to disk instead of calling a speech service.
#[derive(Debug, Clone)]
pub struct OfflineVoiceSynthesizer {
    default_voice: String,
}

impl OfflineVoiceSynthesizer {
    pub fn new(default_voice: impl Into<String>) -> Self {
        Self {
            default_voice: default_voice.into(),
        }
    }
}

impl VoiceSynthesizer for OfflineVoiceSynthesizer {
    fn synthesize(&self, line: &VoiceLine, output_dir: &Path) -> Result<PathBuf, StageError> {
        if line.text.trim().is_empty() {
            return Err(StageError::InvalidContent("voice line has no text".into()));
        }
        if !PACE_RANGE.contains(&line.pace_multiplier) {
            return Err(StageError::InvalidContent(format!(
                "pace multiplier {} outside {:?}",
                line.pace_multiplier, PACE_RANGE
            )));
        }
        let clip = VoiceClip {
            voice_id: line.voice_id.clone(),
            markup: render_markup(line),
            pace_multiplier: line.pace_multiplier,
        };
        let key = digest::fingerprint([clip.voice_id.as_str(), clip.markup.as_str()]);
        let path = output_dir.join(format!("clip_{}.json", &key[..16]));
        let content = serde_json::to_vec_pretty(&clip).context("Failed to encode voice clip")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write voice clip: {}", path.display()))?;
        debug!(voice = %clip.voice_id, path = %path.display(), "Voice clip written");
        Ok(path)
    }

    fn synthesize_dialogue(
        &self,
        turns: &[DialogueTurn],
        output_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        if turns.is_empty() {
            return Err(StageError::InvalidContent("dialogue has no turns".into()));
        }
        let mut track = DialogueTrack {
            speakers: Vec::new(),
            clips: Vec::with_capacity(turns.len()),
        };
        for turn in turns {
            let line = VoiceLine {
                text: turn.text.clone(),
                voice_id: voice_for_speaker(&turn.speaker, &self.default_voice).to_string(),
                emotion: turn.emotion,
                pace_multiplier: 1.0,
                emphasis_words: turn.emphasis_words.clone(),
            };
            track.clips.push(self.synthesize(&line, output_dir)?);
            if !track.speakers.contains(&turn.speaker) {
                track.speakers.push(turn.speaker.clone());
            }
        }
        let path = output_dir.join("narration.json");
        let content = serde_json::to_vec_pretty(&track).context("Failed to encode narration")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write narration: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn line(text: &str, emotion: Emotion) -> VoiceLine {
        VoiceLine {
            text: text.into(),
            voice_id: "narrator".into(),
            emotion,
            pace_multiplier: 1.0,
            emphasis_words: Vec::new(),
        }
    }

    #[test]
    fn markup_wraps_emphasis_and_prosody() {
        let mut voice = line("Take the next step.", Emotion::Enthusiastic);
        voice.emphasis_words = vec!["step".into()];
        let markup = render_markup(&voice);
        assert!(markup.contains("<emphasis level=\"strong\">step</emphasis>"));
        assert!(markup.starts_with("<prosody pitch=\"+10%\" rate=\"110%\">"));
    }

    #[test]
    fn pace_outside_range_is_rejected() {
        let dir = tempdir().unwrap();
        let mut voice = line("Hello", Emotion::Neutral);
        voice.pace_multiplier = 3.0;
        let err = OfflineVoiceSynthesizer::new("narrator")
            .synthesize(&voice, dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_content");
    }

    #[test]
    fn dialogue_maps_speakers_to_voices() {
        let dir = tempdir().unwrap();
        let turns = vec![
            DialogueTurn {
                speaker: "CEO".into(),
                text: "We built this for you.".into(),
                emotion: Emotion::Serious,
                emphasis_words: Vec::new(),
            },
            DialogueTurn {
                speaker: "Narrator".into(),
                text: "Here is how it works.".into(),
                emotion: Emotion::Neutral,
                emphasis_words: Vec::new(),
            },
        ];
        let synth = OfflineVoiceSynthesizer::new("en_US_female_professional");
        let path = synth.synthesize_dialogue(&turns, dir.path()).unwrap();
        let track: DialogueTrack = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(track.clips.len(), 2);
        assert_eq!(track.speakers, vec!["CEO".to_string(), "Narrator".to_string()]);
        let first: VoiceClip = serde_json::from_slice(&fs::read(&track.clips[0]).unwrap()).unwrap();
        assert_eq!(first.voice_id, "en_US_male_executive");
        let second: VoiceClip =
            serde_json::from_slice(&fs::read(&track.clips[1]).unwrap()).unwrap();
        assert_eq!(second.voice_id, "en_US_female_professional");
    }
}
