use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::VideoAssembler;
use crate::error::StageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformProfile {
    #[serde(rename = "youtube_1080")]
    Youtube1080,
    #[serde(rename = "youtube_4k")]
    Youtube4k,
    #[serde(rename = "instagram_reels")]
    InstagramReels,
    #[serde(rename = "tiktok")]
    Tiktok,
    #[serde(rename = "linkedin")]
    Linkedin,
    #[serde(rename = "standard_mp4")]
    StandardMp4,
}

impl PlatformProfile {
    pub const ALL: [PlatformProfile; 6] = [
        PlatformProfile::Youtube1080,
        PlatformProfile::Youtube4k,
        PlatformProfile::InstagramReels,
        PlatformProfile::Tiktok,
        PlatformProfile::Linkedin,
        PlatformProfile::StandardMp4,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlatformProfile::Youtube1080 => "youtube_1080",
            PlatformProfile::Youtube4k => "youtube_4k",
            PlatformProfile::InstagramReels => "instagram_reels",
            PlatformProfile::Tiktok => "tiktok",
            PlatformProfile::Linkedin => "linkedin",
            PlatformProfile::StandardMp4 => "standard_mp4",
        }
    }

    pub fn resolution(self) -> (u32, u32) {
        match self {
            PlatformProfile::Youtube1080 | PlatformProfile::StandardMp4 => (1920, 1080),
            PlatformProfile::Youtube4k => (3840, 2160),
            PlatformProfile::InstagramReels | PlatformProfile::Tiktok => (1080, 1920),
            PlatformProfile::Linkedin => (1296, 1080),
        }
    }

    pub fn aspect_ratio(self) -> &'static str {
        match self {
            PlatformProfile::Youtube1080
            | PlatformProfile::Youtube4k
            | PlatformProfile::StandardMp4 => "16:9",
            PlatformProfile::InstagramReels | PlatformProfile::Tiktok => "9:16",
            PlatformProfile::Linkedin => "1.2:1",
        }
    }

    pub fn video_bitrate_kbps(self) -> u32 {
        match self {
            PlatformProfile::Youtube4k => 35_000,
            PlatformProfile::Youtube1080 => 8_000,
            PlatformProfile::InstagramReels | PlatformProfile::Tiktok => 6_000,
            PlatformProfile::Linkedin | PlatformProfile::StandardMp4 => 5_000,
        }
    }
}

impl fmt::Display for PlatformProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformProfile {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        PlatformProfile::ALL
            .into_iter()
            .find(|profile| profile.as_str() == normalized)
            .ok_or_else(|| anyhow!("unknown export profile '{value}'"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AudioMix {
    pub narration: PathBuf,
    pub background: Option<PathBuf>,
    pub narration_gain_db: f64,
    pub background_gain_db: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AssembledCut {
    pub segments: Vec<PathBuf>,
    pub audio: PathBuf,
    pub transition_seconds: f64,
    pub transitions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExportRender {
    pub profile: PlatformProfile,
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: String,
    pub video_bitrate_kbps: u32,
}

fn write_manifest<T: Serialize>(path: &Path, value: &T) -> Result<(), StageError> {
    let content = serde_json::to_vec_pretty(value).context("Failed to encode manifest")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;
    Ok(())
}

fn require_file(path: &Path, what: &str) -> Result<(), StageError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(StageError::InvalidContent(format!(
            "{what} not found: {}",
            path.display()
        )))
    }
}

/// Produces edit decision manifests in place of rendered media.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineAssembler;

impl VideoAssembler for OfflineAssembler {
    fn integrate_audio(
        &self,
        narration: &Path,
        background: Option<&Path>,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        require_file(narration, "narration")?;
        if let Some(background) = background {
            require_file(background, "background music")?;
        }
        let mix = AudioMix {
            narration: narration.to_path_buf(),
            background: background.map(Path::to_path_buf),
            narration_gain_db: 0.0,
            background_gain_db: -18.0,
        };
        let path = output_dir.join("mix.json");
        write_manifest(&path, &mix)?;
        Ok(path)
    }

    fn assemble(
        &self,
        segments: &[PathBuf],
        audio: &Path,
        transition_seconds: f64,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        if segments.is_empty() {
            return Err(StageError::InvalidContent("no video segments to assemble".into()));
        }
        for segment in segments {
            require_file(segment, "video segment")?;
        }
        require_file(audio, "audio track")?;
        if transition_seconds < 0.0 {
            return Err(StageError::InvalidContent(format!(
                "negative transition length {transition_seconds}"
            )));
        }
        let cut = AssembledCut {
            segments: segments.to_vec(),
            audio: audio.to_path_buf(),
            transition_seconds,
            transitions: segments.len() - 1,
        };
        let path = output_dir.join("assembled.json");
        write_manifest(&path, &cut)?;
        info!(segments = segments.len(), path = %path.display(), "Video assembled");
        Ok(path)
    }

    fn export_for(
        &self,
        profile: PlatformProfile,
        video: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, StageError> {
        require_file(video, "assembled video")?;
        let (width, height) = profile.resolution();
        let render = ExportRender {
            profile,
            source: video.to_path_buf(),
            width,
            height,
            aspect_ratio: profile.aspect_ratio().to_string(),
            video_bitrate_kbps: profile.video_bitrate_kbps(),
        };
        let path = output_dir.join(format!("{profile}.json"));
        write_manifest(&path, &render)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn profiles_parse_with_hyphens() {
        assert_eq!(
            "instagram-reels".parse::<PlatformProfile>().unwrap(),
            PlatformProfile::InstagramReels
        );
        assert_eq!("YouTube_4K".parse::<PlatformProfile>().unwrap(), PlatformProfile::Youtube4k);
        assert!("vimeo".parse::<PlatformProfile>().is_err());
    }

    #[test]
    fn vertical_profiles_are_portrait() {
        let (w, h) = PlatformProfile::Tiktok.resolution();
        assert!(h > w);
        assert_eq!(PlatformProfile::Linkedin.aspect_ratio(), "1.2:1");
    }

    #[test]
    fn assemble_counts_transitions_and_rejects_missing_segments() {
        let dir = tempdir().unwrap();
        let audio = dir.path().join("mix.json");
        fs::write(&audio, "{}").unwrap();
        let segments: Vec<PathBuf> = (0..3)
            .map(|i| {
                let path = dir.path().join(format!("seg{i}.json"));
                fs::write(&path, "{}").unwrap();
                path
            })
            .collect();

        let out = OfflineAssembler
            .assemble(&segments, &audio, 0.5, dir.path())
            .unwrap();
        let cut: AssembledCut = serde_json::from_slice(&fs::read(out).unwrap()).unwrap();
        assert_eq!(cut.transitions, 2);

        let missing = vec![dir.path().join("nope.json")];
        let err = OfflineAssembler
            .assemble(&missing, &audio, 0.5, dir.path())
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_content");
    }

    #[test]
    fn export_writes_profile_named_file() {
        let dir = tempdir().unwrap();
        let video = dir.path().join("assembled.json");
        fs::write(&video, "{}").unwrap();
        let out = OfflineAssembler
            .export_for(PlatformProfile::Youtube4k, &video, dir.path())
            .unwrap();
        assert!(out.ends_with("youtube_4k.json"));
        let render: ExportRender = serde_json::from_slice(&fs::read(out).unwrap()).unwrap();
        assert_eq!((render.width, render.height), (3840, 2160));
    }
}
