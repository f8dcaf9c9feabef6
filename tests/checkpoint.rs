use std::fs;

use reel_forge::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use reel_forge::concept::VideoConcept;
use reel_forge::job::{Artifact, JobId, JobStatus, PipelineJob};
use reel_forge::registry::{StageId, StageRegistry};
use tempfile::tempdir;

fn job(root: &std::path::Path) -> PipelineJob {
    let concept = VideoConcept::new("Quarterly Update", "What shipped and what is next.", "Staff");
    PipelineJob::new(concept, root, StageRegistry::standard())
}

#[test]
fn saved_job_loads_back_with_artifacts() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoints")).unwrap();
    let mut job = job(dir.path());
    job.status = JobStatus::Paused;
    job.last_completed = Some(StageId::Storyboarding);
    job.current_stage = StageId::CharacterDesign;
    job.progress_percent = 20;
    job.artifacts
        .insert(Artifact::single(StageId::ScriptGeneration, dir.path().join("script.json")))
        .unwrap();

    store.save(&job).unwrap();
    assert_eq!(store.root(), dir.path().join("checkpoints"));
    assert!(store.path_for(job.id).is_file());

    let loaded = store.load(job.id).unwrap().unwrap();
    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, JobStatus::Paused);
    assert_eq!(loaded.last_completed, Some(StageId::Storyboarding));
    assert_eq!(loaded.current_stage, StageId::CharacterDesign);
    assert_eq!(loaded.progress_percent, 20);
    assert_eq!(loaded.artifacts.len(), 1);
    assert_eq!(loaded.concept.title, "Quarterly Update");
}

#[test]
fn later_save_replaces_the_earlier_record() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    let mut job = job(dir.path());
    store.save(&job).unwrap();
    job.status = JobStatus::Completed;
    job.progress_percent = 100;
    store.save(&job).unwrap();

    let loaded = store.load(job.id).unwrap().unwrap();
    assert_eq!(loaded.status, JobStatus::Completed);
    assert_eq!(store.list().unwrap(), vec![job.id]);
    assert!(!store.path_for(job.id).with_extension("json.tmp").exists());
}

#[test]
fn unknown_id_loads_as_none() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    assert!(store.load(JobId::new()).unwrap().is_none());
}

#[test]
fn list_ignores_foreign_files() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    let first = job(dir.path());
    let second = job(dir.path());
    store.save(&first).unwrap();
    store.save(&second).unwrap();
    fs::write(dir.path().join("notes.json"), "{}").unwrap();
    fs::write(dir.path().join("README.txt"), "checkpoints").unwrap();

    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(store.list().unwrap(), expected);
}

#[test]
fn corrupt_record_is_an_error() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    let id = JobId::new();
    fs::write(store.path_for(id), "{ not json").unwrap();

    let err = store.load(id).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse checkpoint record"));
}

#[test]
fn record_from_another_version_is_rejected() {
    let dir = tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path()).unwrap();
    let job = job(dir.path());
    store.save(&job).unwrap();

    let path = store.path_for(job.id);
    let mut record: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    record["version"] = serde_json::json!(99);
    fs::write(&path, record.to_string()).unwrap();

    let err = store.load(job.id).unwrap_err();
    assert!(format!("{err:#}").contains("Unsupported checkpoint version: 99"));
}

#[test]
fn memory_store_counts_saves_per_job() {
    let dir = tempdir().unwrap();
    let store = MemoryCheckpointStore::new();
    let job = job(dir.path());
    assert!(store.load(job.id).unwrap().is_none());

    store.save(&job).unwrap();
    store.save(&job).unwrap();
    assert_eq!(store.save_count(job.id), 2);
    assert_eq!(store.list().unwrap(), vec![job.id]);
    assert_eq!(store.load(job.id).unwrap().unwrap().id, job.id);
}
