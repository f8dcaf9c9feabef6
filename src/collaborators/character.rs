use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::CharacterConsistency;
use crate::error::StageError;

const PROMPT_KEYWORDS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterProfile {
    pub character_id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub reference_images: Vec<PathBuf>,
    pub appearance_notes: String,
}

/// Keeps character descriptions in memory and turns them into prompt
/// fragments. Frames are scored by how many description keywords the
/// rendered output mentions.
#[derive(Debug, Default)]
pub struct ConsistencyEngine {
    characters: Mutex<HashMap<String, CharacterProfile>>,
}

impl ConsistencyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, character_id: &str) -> Result<CharacterProfile, StageError> {
        self.characters
            .lock()
            .ok()
            .and_then(|characters| characters.get(character_id).cloned())
            .ok_or_else(|| StageError::CharacterNotFound(character_id.to_string()))
    }
}

fn keywords(description: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for word in description
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() > 3)
    {
        if !words.contains(&word) {
            words.push(word);
        }
    }
    words
}

impl CharacterConsistency for ConsistencyEngine {
    fn register(
        &self,
        character_id: Option<&str>,
        name: &str,
        description: &str,
        reference_images: &[PathBuf],
    ) -> CharacterProfile {
        let character_id = character_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let profile = CharacterProfile {
            character_id: character_id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            reference_images: reference_images.to_vec(),
            appearance_notes: format!("{name}: {description}"),
        };
        if let Ok(mut characters) = self.characters.lock() {
            characters.insert(character_id.clone(), profile.clone());
        }
        debug!(character_id = %character_id, name, "Character registered");
        profile
    }

    fn profile(&self, character_id: &str) -> Option<CharacterProfile> {
        self.lookup(character_id).ok()
    }

    fn prompt_for(
        &self,
        character_id: &str,
        scene_description: &str,
    ) -> Result<String, StageError> {
        let profile = self.lookup(character_id)?;
        let traits = keywords(&profile.description);
        let traits = traits
            .iter()
            .take(PROMPT_KEYWORDS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "{scene_description}\n\nCharacter: {} ({traits}). Keep appearance consistent with the reference description: {}",
            profile.name, profile.description
        ))
    }

    fn score(&self, character_id: &str, frame: &Path) -> Result<f64, StageError> {
        let profile = self.lookup(character_id)?;
        let expected = keywords(&profile.description);
        if expected.is_empty() {
            return Ok(1.0);
        }
        let content = fs::read(frame)
            .with_context(|| format!("Failed to read frame: {}", frame.display()))?;
        let content = String::from_utf8_lossy(&content).to_lowercase();
        let found = expected
            .iter()
            .filter(|word| content.contains(word.as_str()))
            .count();
        Ok(found as f64 / expected.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generated_ids_are_unique_and_explicit_ids_are_kept() {
        let engine = ConsistencyEngine::new();
        let a = engine.register(None, "A", "tall presenter", &[]);
        let b = engine.register(None, "B", "short presenter", &[]);
        assert_ne!(a.character_id, b.character_id);
        let narrator = engine.register(Some("narrator"), "Narrator", "calm voice", &[]);
        assert_eq!(narrator.character_id, "narrator");
        assert!(engine.profile("narrator").is_some());
    }

    #[test]
    fn prompt_includes_scene_and_traits() {
        let engine = ConsistencyEngine::new();
        engine.register(Some("ceo"), "CEO", "Confident executive in a navy suit", &[]);
        let prompt = engine.prompt_for("ceo", "Office at dawn").unwrap();
        assert!(prompt.starts_with("Office at dawn"));
        assert!(prompt.contains("confident"));
        assert!(prompt.contains("navy"));
    }

    #[test]
    fn unknown_character_is_reported() {
        let engine = ConsistencyEngine::new();
        let err = engine.prompt_for("ghost", "anything").unwrap_err();
        assert!(matches!(err, StageError::CharacterNotFound(id) if id == "ghost"));
    }

    #[test]
    fn score_reflects_keywords_present_in_frame() {
        let dir = tempdir().unwrap();
        let engine = ConsistencyEngine::new();
        engine.register(Some("host"), "Host", "smiling host wearing glasses", &[]);
        let full = dir.path().join("full.json");
        fs::write(&full, "A smiling host wearing glasses").unwrap();
        let half = dir.path().join("half.json");
        fs::write(&half, "a smiling figure").unwrap();
        assert_eq!(engine.score("host", &full).unwrap(), 1.0);
        let partial = engine.score("host", &half).unwrap();
        assert!(partial > 0.0 && partial < 1.0);
    }
}
