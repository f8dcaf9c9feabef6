use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ScriptGenerator;
use crate::concept::{Tone, VideoConcept};
use crate::error::StageError;

const SECONDS_PER_SCENE: f64 = 12.0;
const MIN_SCENES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Enthusiastic,
    Serious,
    Curious,
    Emphatic,
    Warm,
}

impl Emotion {
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Enthusiastic => "enthusiastic",
            Emotion::Serious => "serious",
            Emotion::Curious => "curious",
            Emotion::Emphatic => "emphatic",
            Emotion::Warm => "warm",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub number: u32,
    pub title: String,
    pub duration_seconds: f64,
    pub visual_description: String,
    pub dialogue: String,
    pub camera_direction: String,
    pub speaker: String,
    /// Word in `dialogue` -> delivery emotion.
    pub emotion_markers: BTreeMap<String, Emotion>,
    pub suggested_background: String,
}

impl Scene {
    /// Emotion used for the whole line: the first non-emphatic marker, else
    /// neutral. Emphasis is carried separately by [`Scene::emphasis_words`].
    pub fn dominant_emotion(&self) -> Emotion {
        self.emotion_markers
            .values()
            .copied()
            .find(|emotion| *emotion != Emotion::Emphatic)
            .unwrap_or(Emotion::Neutral)
    }

    pub fn emphasis_words(&self) -> Vec<String> {
        self.emotion_markers
            .iter()
            .filter(|(_, emotion)| **emotion == Emotion::Emphatic)
            .map(|(word, _)| word.clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenplay {
    pub title: String,
    pub duration_seconds: f64,
    pub language: String,
    pub tone: Tone,
    pub scenes: Vec<Scene>,
    pub voice_over_instructions: String,
    pub pacing_notes: String,
}

/// Fixed opening / content / call-to-action structure filled from the brief.
#[derive(Debug, Default)]
pub struct TemplateScriptGenerator;

impl TemplateScriptGenerator {
    pub fn new() -> Self {
        Self
    }
}

pub fn estimate_scene_count(duration_seconds: f64) -> usize {
    MIN_SCENES.max((duration_seconds / SECONDS_PER_SCENE) as usize)
}

fn language_phrases(language: &str) -> (&'static str, &'static str) {
    match language.to_ascii_lowercase().as_str() {
        "spanish" => ("Hola", "Gracias"),
        "french" => ("Bonjour", "Merci"),
        "german" => ("Hallo", "Danke"),
        "chinese" => ("你好", "谢谢"),
        "japanese" => ("こんにちは", "ありがとう"),
        _ => ("Welcome", "Thank you"),
    }
}

fn voice_over_instructions(tone: Tone) -> &'static str {
    match tone {
        Tone::Professional => {
            "Use clear, authoritative tone. Emphasize key terms. Pace: 120-140 words per minute."
        }
        Tone::Casual => "Conversational, friendly delivery. Natural speech patterns. Pace: 130-150 wpm.",
        Tone::Humorous => "Energetic, playful. Pause for comedic effect. Pace: 140-160 wpm.",
        Tone::Emotional => {
            "Sincere, heartfelt delivery. Build emotional connection. Pace: 100-120 wpm."
        }
        Tone::Educational => {
            "Clear explanation, measured pace. Emphasize learning points. Pace: 110-130 wpm."
        }
    }
}

fn pacing_notes(duration_seconds: f64) -> &'static str {
    if duration_seconds < 30.0 {
        "Fast-paced. Minimal scene transitions. Quick cuts recommended."
    } else if duration_seconds < 60.0 {
        "Moderate pace. 2-3 second scene transitions. Good for social media."
    } else {
        "Measured pace. 3-5 second transitions. Room for scene development."
    }
}

impl ScriptGenerator for TemplateScriptGenerator {
    fn generate(&self, concept: &VideoConcept) -> Result<Screenplay, StageError> {
        let title = concept.title.trim();
        if title.is_empty() {
            return Err(StageError::ScriptGeneration("concept has no title".into()));
        }
        let duration = concept.duration_seconds;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(StageError::ScriptGeneration(format!(
                "cannot plan scenes for a {duration}s video"
            )));
        }

        let audience = concept.target_audience.trim();
        let (greeting, closing) = language_phrases(&concept.language);
        let scene_count = estimate_scene_count(duration);
        let content_scenes = scene_count - 2;
        let content_each = duration * 0.8 / content_scenes.max(1) as f64;

        let mut scenes = Vec::with_capacity(scene_count);
        scenes.push(Scene {
            number: 1,
            title: "Opening Hook".into(),
            duration_seconds: duration * 0.1,
            visual_description: format!("Engaging opening that captures attention of {audience}"),
            dialogue: format!("{greeting}! This is {title}."),
            camera_direction: "wide shot to close-up".into(),
            speaker: "Narrator".into(),
            emotion_markers: BTreeMap::from([(greeting.to_string(), Emotion::Enthusiastic)]),
            suggested_background: "dynamic".into(),
        });
        for point in 1..=content_scenes {
            scenes.push(Scene {
                number: (point + 1) as u32,
                title: format!("Content Section {point}"),
                duration_seconds: content_each,
                visual_description: format!("Presenting key information point {point}"),
                dialogue: format!("Key message {point} for {audience}."),
                camera_direction: "medium shot with emphasis, slow zoom in".into(),
                speaker: "Narrator".into(),
                emotion_markers: BTreeMap::from([("message".to_string(), Emotion::Emphatic)]),
                suggested_background: "professional".into(),
            });
        }
        scenes.push(Scene {
            number: scene_count as u32,
            title: "Call to Action".into(),
            duration_seconds: duration * 0.1,
            visual_description: "Strong closing with clear call-to-action".into(),
            dialogue: format!("{closing}. Take the next step."),
            camera_direction: "direct to camera".into(),
            speaker: "Narrator".into(),
            emotion_markers: BTreeMap::from([
                (closing.to_string(), Emotion::Warm),
                ("step".to_string(), Emotion::Emphatic),
            ]),
            suggested_background: "simple".into(),
        });

        Ok(Screenplay {
            title: title.to_string(),
            duration_seconds: duration,
            language: concept.language.clone(),
            tone: concept.tone,
            scenes,
            voice_over_instructions: voice_over_instructions(concept.tone).to_string(),
            pacing_notes: pacing_notes(duration).to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_second_concept_yields_five_scenes_covering_duration() {
        let concept = VideoConcept::new("Launch", "brief", "Engineers");
        let screenplay = TemplateScriptGenerator::new().generate(&concept).unwrap();
        assert_eq!(screenplay.scenes.len(), 5);
        let total: f64 = screenplay.scenes.iter().map(|s| s.duration_seconds).sum();
        assert!((total - 60.0).abs() < 1e-9);
        assert_eq!(screenplay.scenes[0].title, "Opening Hook");
        assert_eq!(screenplay.scenes[4].title, "Call to Action");
        let numbers: Vec<u32> = screenplay.scenes.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn short_videos_still_get_three_scenes() {
        assert_eq!(estimate_scene_count(10.0), 3);
        assert_eq!(estimate_scene_count(35.9), 3);
        assert_eq!(estimate_scene_count(120.0), 10);
    }

    #[test]
    fn blank_title_is_a_generation_error() {
        let concept = VideoConcept::new("   ", "brief", "Engineers");
        let err = TemplateScriptGenerator::new().generate(&concept).unwrap_err();
        assert_eq!(err.kind(), "script_generation");
    }

    #[test]
    fn closing_scene_splits_emotion_and_emphasis() {
        let concept = VideoConcept::new("Launch", "brief", "Engineers");
        let screenplay = TemplateScriptGenerator::new().generate(&concept).unwrap();
        let closing = screenplay.scenes.last().unwrap();
        assert_eq!(closing.dominant_emotion(), Emotion::Warm);
        assert_eq!(closing.emphasis_words(), vec!["step".to_string()]);
    }
}
