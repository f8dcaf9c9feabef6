use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::tempdir;

fn forge(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("reel-forge").expect("binary present");
    cmd.current_dir(root)
        .env("RUST_LOG", "warn")
        .arg("--workspace")
        .arg(root.join("work"))
        .arg("--checkpoints")
        .arg(root.join("checkpoints"));
    cmd
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8(output).expect("utf-8 stdout")
}

fn sample_concept() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("concepts/product-launch.yaml")
}

#[test]
fn list_stages_prints_the_ordered_pipeline() {
    let temp = tempdir().unwrap();
    let stdout = stdout_of(forge(temp.path()).arg("list-stages"));
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines[0], "Pipeline stages:");
    assert_eq!(lines[1], "- script_generation (10%)");
    assert_eq!(lines[4], "- video_generation (60%)");
    assert_eq!(lines[8], "- export (100%)");
    assert_eq!(lines.len(), 9);
}

#[test]
fn concept_new_writes_preset_and_validate_accepts_it() {
    let temp = tempdir().unwrap();
    let stdout = stdout_of(
        forge(temp.path())
            .args(["concept", "new", "--preset", "explainer", "--output"])
            .arg("drafts/explainer.yaml"),
    );
    assert_eq!(stdout.trim(), "drafts/explainer.yaml");
    assert!(temp.path().join("drafts/explainer.yaml").is_file());

    let stdout = stdout_of(forge(temp.path()).args(["validate", "drafts/*.yaml"]));
    assert_eq!(stdout.trim(), "1 concept(s) valid");
}

#[test]
fn concept_presets_are_listed() {
    let temp = tempdir().unwrap();
    let stdout = stdout_of(forge(temp.path()).args(["concept", "presets"]));
    assert_eq!(
        stdout.lines().collect::<Vec<_>>(),
        ["product-launch", "explainer", "social-teaser"]
    );
}

#[test]
fn validate_fails_on_out_of_range_duration() {
    let temp = tempdir().unwrap();
    fs::write(
        temp.path().join("short.yaml"),
        "title: Blink\nbrief: Too quick to say anything.\ntarget_audience: Anyone\nduration_seconds: 3\n",
    )
    .unwrap();

    let output = forge(temp.path())
        .args(["validate", "short.yaml"])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    assert!(stderr.contains("Validation failed for 1 concept(s)"));
}

#[test]
fn validate_without_matches_fails() {
    let temp = tempdir().unwrap();
    forge(temp.path())
        .args(["validate", "nothing/*.yaml"])
        .assert()
        .failure();
}

#[test]
fn run_completes_and_job_is_visible_afterwards() {
    let temp = tempdir().unwrap();
    let metrics = temp.path().join("metrics/run.json");
    let stdout = stdout_of(
        forge(temp.path())
            .arg("run")
            .arg(sample_concept())
            .arg("--no-progress")
            .arg("--metrics-json")
            .arg(&metrics),
    );
    let mut lines = stdout.lines();
    let job_id = lines
        .next()
        .and_then(|line| line.strip_prefix("job "))
        .expect("job id line")
        .to_string();
    let completed = lines
        .next()
        .and_then(|line| line.strip_prefix("completed "))
        .expect("completion line");
    assert!(completed.ends_with("youtube_1080.json"));
    assert!(Path::new(completed).is_file());
    assert!(metrics.is_file());
    assert!(
        temp.path()
            .join("checkpoints")
            .join(format!("{job_id}.json"))
            .is_file()
    );

    let status = stdout_of(forge(temp.path()).args(["status", &job_id]));
    let report: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["progress_percent"], 100);

    let jobs = stdout_of(forge(temp.path()).arg("jobs"));
    assert_eq!(jobs.lines().count(), 1);
    assert!(jobs.contains(&job_id));
    assert!(jobs.contains("Introducing Relay Sync"));

    forge(temp.path())
        .args(["resume", &job_id, "--no-progress"])
        .assert()
        .failure();
}

#[test]
fn status_of_unknown_job_fails() {
    let temp = tempdir().unwrap();
    forge(temp.path())
        .args(["status", "6f1c5a0e-3b9d-4c1e-9a51-2d7e8f4b0c11"])
        .assert()
        .failure();
}

#[test]
fn completions_are_generated_for_bash() {
    let temp = tempdir().unwrap();
    let stdout = stdout_of(forge(temp.path()).args(["completions", "bash"]));
    assert!(stdout.contains("reel-forge"));
}
