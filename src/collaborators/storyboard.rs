use std::fmt;

use serde::{Deserialize, Serialize};

use super::StoryboardBuilder;
use super::script::Scene;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraAngle {
    Wide,
    Medium,
    CloseUp,
    ExtremeCloseUp,
    OverShoulder,
    PointOfView,
}

impl CameraAngle {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraAngle::Wide => "wide shot",
            CameraAngle::Medium => "medium shot",
            CameraAngle::CloseUp => "close-up",
            CameraAngle::ExtremeCloseUp => "extreme close-up",
            CameraAngle::OverShoulder => "over-the-shoulder",
            CameraAngle::PointOfView => "point of view",
        }
    }
}

impl fmt::Display for CameraAngle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraMovement {
    Static,
    Pan,
    Tilt,
    Zoom,
    Dolly,
    Tracking,
    Crane,
}

impl CameraMovement {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraMovement::Static => "static",
            CameraMovement::Pan => "pan",
            CameraMovement::Tilt => "tilt",
            CameraMovement::Zoom => "zoom",
            CameraMovement::Dolly => "dolly",
            CameraMovement::Tracking => "tracking",
            CameraMovement::Crane => "crane",
        }
    }
}

impl fmt::Display for CameraMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualElement {
    pub element_type: String,
    /// Normalised (x, y) centre within the frame.
    pub position: (f64, f64),
    pub size: (f64, f64),
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryboardScene {
    pub scene_number: u32,
    pub duration_seconds: f64,
    pub camera_angle: CameraAngle,
    pub camera_movement: CameraMovement,
    pub movement_direction: String,
    pub visual_elements: Vec<VisualElement>,
    pub lighting: String,
    pub color_palette: Vec<String>,
    pub transition_in: String,
    pub transition_out: String,
    pub notes: String,
}

/// Derives shot composition from scene titles and camera directions.
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleStoryboardEngine;

impl RuleStoryboardEngine {
    fn camera_angle(scene: &Scene) -> CameraAngle {
        let title = scene.title.to_lowercase();
        if title.contains("opening") {
            CameraAngle::Wide
        } else if title.contains("close") || title.contains("detail") {
            CameraAngle::CloseUp
        } else {
            CameraAngle::Medium
        }
    }

    fn camera_movement(direction: &str) -> CameraMovement {
        let direction = direction.to_lowercase();
        [
            ("zoom", CameraMovement::Zoom),
            ("pan", CameraMovement::Pan),
            ("tilt", CameraMovement::Tilt),
            ("tracking", CameraMovement::Tracking),
            ("dolly", CameraMovement::Dolly),
            ("crane", CameraMovement::Crane),
        ]
        .into_iter()
        .find(|(keyword, _)| direction.contains(keyword))
        .map(|(_, movement)| movement)
        .unwrap_or(CameraMovement::Static)
    }

    fn movement_direction(movement: CameraMovement, direction: &str) -> String {
        if movement == CameraMovement::Static {
            return "static".into();
        }
        let direction = direction.to_lowercase();
        direction
            .split(|c: char| !c.is_alphanumeric())
            .find(|word| matches!(*word, "left" | "right" | "up" | "down" | "in" | "out"))
            .unwrap_or("static")
            .to_string()
    }

    fn visual_elements(scene: &Scene) -> Vec<VisualElement> {
        let mut elements = vec![VisualElement {
            element_type: "background".into(),
            position: (0.5, 0.5),
            size: (1.0, 1.0),
            description: format!("{} backdrop", scene.suggested_background),
            duration_seconds: None,
        }];
        if !scene.speaker.trim().is_empty() {
            elements.push(VisualElement {
                element_type: "character".into(),
                position: (0.5, 0.5),
                size: (0.3, 0.6),
                description: format!("{} speaking", scene.speaker),
                duration_seconds: None,
            });
        }
        if scene.dialogue.to_lowercase().contains("key message") {
            elements.push(VisualElement {
                element_type: "text".into(),
                position: (0.5, 0.8),
                size: (0.8, 0.1),
                description: "Key message overlay".into(),
                duration_seconds: Some(scene.duration_seconds * 0.7),
            });
        }
        elements
    }

    fn lighting(background: &str) -> &'static str {
        match background {
            "dynamic" => "high-key lighting with dramatic shadows",
            "professional" => "three-point lighting, soft and even",
            "simple" => "bright, even lighting",
            _ => "natural lighting",
        }
    }

    fn palette(background: &str) -> Vec<String> {
        let colors: &[&str] = match background {
            "dynamic" => &["#FF6B6B", "#4ECDC4", "#FFE66D"],
            "professional" => &["#2C3E50", "#3498DB", "#ECF0F1"],
            "simple" => &["#FFFFFF", "#333333", "#0066CC"],
            _ => &["#FFFFFF", "#000000"],
        };
        colors.iter().map(|c| c.to_string()).collect()
    }
}

impl StoryboardBuilder for RuleStoryboardEngine {
    fn build(&self, scenes: &[Scene]) -> Vec<StoryboardScene> {
        let last = scenes.len().saturating_sub(1);
        scenes
            .iter()
            .enumerate()
            .map(|(index, scene)| {
                let movement = Self::camera_movement(&scene.camera_direction);
                StoryboardScene {
                    scene_number: scene.number,
                    duration_seconds: scene.duration_seconds,
                    camera_angle: Self::camera_angle(scene),
                    camera_movement: movement,
                    movement_direction: Self::movement_direction(movement, &scene.camera_direction),
                    visual_elements: Self::visual_elements(scene),
                    lighting: Self::lighting(&scene.suggested_background).to_string(),
                    color_palette: Self::palette(&scene.suggested_background),
                    transition_in: if index == 0 { "fade" } else { "cut" }.to_string(),
                    transition_out: if index == last { "fade" } else { "cut" }.to_string(),
                    notes: format!("{}: {}", scene.title, scene.camera_direction),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::ScriptGenerator;
    use crate::collaborators::script::TemplateScriptGenerator;
    use crate::concept::VideoConcept;

    fn boards() -> Vec<StoryboardScene> {
        let concept = VideoConcept::new("Launch", "brief", "Engineers");
        let screenplay = TemplateScriptGenerator::new().generate(&concept).unwrap();
        RuleStoryboardEngine.build(&screenplay.scenes)
    }

    #[test]
    fn one_board_per_scene_with_matching_numbers() {
        let boards = boards();
        assert_eq!(boards.len(), 5);
        for (index, board) in boards.iter().enumerate() {
            assert_eq!(board.scene_number as usize, index + 1);
        }
    }

    #[test]
    fn opening_is_wide_and_content_zooms_in() {
        let boards = boards();
        assert_eq!(boards[0].camera_angle, CameraAngle::Wide);
        assert_eq!(boards[1].camera_angle, CameraAngle::Medium);
        assert_eq!(boards[1].camera_movement, CameraMovement::Zoom);
        assert_eq!(boards[1].movement_direction, "in");
        assert_eq!(boards[4].camera_movement, CameraMovement::Static);
        assert_eq!(boards[0].movement_direction, "static");
    }

    #[test]
    fn content_scenes_carry_a_text_overlay() {
        let boards = boards();
        assert!(
            boards[2]
                .visual_elements
                .iter()
                .any(|element| element.element_type == "text")
        );
        assert!(
            !boards[0]
                .visual_elements
                .iter()
                .any(|element| element.element_type == "text")
        );
    }

    #[test]
    fn transitions_fade_at_the_ends() {
        let boards = boards();
        assert_eq!(boards[0].transition_in, "fade");
        assert_eq!(boards[4].transition_out, "fade");
        assert_eq!(boards[2].transition_in, "cut");
    }
}
