use reel_forge::concept::{PRESETS, Tone, VideoConcept, generate_preset};
use reel_forge::config::ConceptLimits;
use reel_forge::validation::validate_concept;
use tempfile::tempdir;

#[test]
fn every_preset_writes_a_valid_concept() {
    let temp = tempdir().unwrap();
    for preset in PRESETS {
        let path = temp.path().join(format!("{preset}.yaml"));
        let generated = generate_preset(preset, &path).expect("preset generation");
        assert_eq!(generated, path);

        let concept = VideoConcept::load(&generated).expect("load preset");
        let report = validate_concept(&concept, &ConceptLimits::default());
        assert!(report.is_ok(), "{preset}: {:?}", report.errors);
    }
}

#[test]
fn explainer_preset_is_longer_and_educational() {
    let temp = tempdir().unwrap();
    let path = generate_preset("explainer", &temp.path().join("explainer.yaml")).unwrap();
    let concept = VideoConcept::load(&path).unwrap();
    assert_eq!(concept.duration_seconds, 120.0);
    assert_eq!(concept.tone, Tone::Educational);
}

#[test]
fn preset_creates_missing_parent_directories() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("concepts/launches/teaser.yaml");
    generate_preset("social-teaser", &path).unwrap();
    assert!(path.is_file());
}

#[test]
fn unknown_preset_lists_the_available_ones() {
    let temp = tempdir().unwrap();
    let err = generate_preset("webinar", &temp.path().join("x.yaml")).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Unknown preset 'webinar'"));
    assert!(message.contains("product-launch"));
}

#[test]
fn sample_concept_in_repository_validates() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("concepts/product-launch.yaml");
    let concept = VideoConcept::load(&path).unwrap();
    let report = validate_concept(&concept, &ConceptLimits::default());
    assert!(report.is_ok(), "{:?}", report.errors);
    assert_eq!(concept.tone, Tone::Professional);
}
