use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// The creative brief a job is generated from. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConcept {
    pub title: String,
    pub brief: String,
    pub target_audience: String,
    #[serde(default = "default_duration")]
    pub duration_seconds: f64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub tone: Tone,
}

fn default_duration() -> f64 {
    60.0
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Humorous,
    Emotional,
    Educational,
}

impl Tone {
    pub fn as_str(self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Humorous => "humorous",
            Tone::Emotional => "emotional",
            Tone::Educational => "educational",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VideoConcept {
    pub fn new(
        title: impl Into<String>,
        brief: impl Into<String>,
        target_audience: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            brief: brief.into(),
            target_audience: target_audience.into(),
            duration_seconds: default_duration(),
            language: default_language(),
            tone: Tone::default(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read concept file: {}", path.display()))?;
        let concept: VideoConcept = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse concept YAML: {}", path.display()))?;
        Ok(concept)
    }

    pub fn brief_word_count(&self) -> usize {
        self.brief.split_whitespace().count()
    }
}

/// Write a starter concept file for one of the named presets.
pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let concept = match name {
        "product-launch" => product_launch_preset(),
        "explainer" => explainer_preset(),
        "social-teaser" => social_teaser_preset(),
        other => anyhow::bail!(
            "Unknown preset '{other}'. Available presets: {}",
            PRESETS.join(", ")
        ),
    };

    let rendered = serde_yaml::to_string(&concept)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write concept file: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

pub const PRESETS: [&str; 3] = ["product-launch", "explainer", "social-teaser"];

fn product_launch_preset() -> VideoConcept {
    VideoConcept::new(
        "Introducing Our New Product",
        "Announce the launch, frame the problem the product solves, walk through the \
         three headline capabilities and close with a clear next step for viewers.",
        "Operations leaders evaluating new tooling",
    )
}

fn explainer_preset() -> VideoConcept {
    VideoConcept::new(
        "How It Works",
        "Explain the core idea step by step, using one concrete example per step and a \
         short recap at the end.",
        "Curious newcomers",
    )
    .with_duration(120.0)
    .with_tone(Tone::Educational)
}

fn social_teaser_preset() -> VideoConcept {
    VideoConcept::new(
        "Coming Soon",
        "A fast teaser that hints at the announcement without revealing it.",
        "Existing followers",
    )
    .with_duration(15.0)
    .with_tone(Tone::Casual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_optional_fields_take_defaults() {
        let concept: VideoConcept = serde_yaml::from_str(
            "title: Launch\nbrief: Something new\ntarget_audience: Everyone\n",
        )
        .unwrap();
        assert_eq!(concept.duration_seconds, 60.0);
        assert_eq!(concept.language, "English");
        assert_eq!(concept.tone, Tone::Professional);
    }

    #[test]
    fn unknown_tone_is_rejected() {
        let parsed: Result<VideoConcept, _> = serde_yaml::from_str(
            "title: Launch\nbrief: b\ntarget_audience: a\ntone: sarcastic\n",
        );
        assert!(parsed.is_err());
    }
}
