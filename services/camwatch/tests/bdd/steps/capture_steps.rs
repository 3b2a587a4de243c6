//! BDD step definitions for recording and snapshots

use cucumber::{then, when};

use crate::world::CamwatchWorld;

#[when("the operator starts recording")]
async fn start_recording(world: &mut CamwatchWorld) {
    let result = world.console().live().start_recording().await;
    world.last_result = Some(result);
}

#[when("the operator stops recording")]
async fn stop_recording(world: &mut CamwatchWorld) {
    let result = world.console().live().stop_recording().await;
    world.last_result = Some(result);
}

#[when("the operator takes a snapshot")]
async fn take_snapshot(world: &mut CamwatchWorld) {
    let result = world.console().live().take_snapshot().await;
    world.last_result = Some(result);
}

#[when("the operator starts the snapshot backup")]
async fn start_backup(world: &mut CamwatchWorld) {
    let result = world.console().live().start_snapshot_backup().await;
    world.last_result = Some(result);
}

#[when("the operator stops the snapshot backup")]
async fn stop_backup(world: &mut CamwatchWorld) {
    let result = world.console().live().stop_snapshot_backup().await;
    world.last_result = Some(result);
}

#[then("the snapshot backup is running")]
async fn backup_running(world: &mut CamwatchWorld) {
    let running = world
        .with_state(|s| s.live.as_ref().is_some_and(|l| l.backup.is_some()))
        .await;
    assert!(running);
}

#[then("no snapshot backup is running")]
async fn backup_stopped(world: &mut CamwatchWorld) {
    let running = world
        .with_state(|s| s.live.as_ref().is_some_and(|l| l.backup.is_some()))
        .await;
    assert!(!running);
}

#[then(expr = "the recording file starts with {string}")]
async fn recording_file_prefix(world: &mut CamwatchWorld, prefix: String) {
    let file = world
        .with_state(|s| s.recording().map(|r| r.file.clone()))
        .await
        .expect("no recording in progress");
    assert!(file.starts_with(&prefix), "{file}");
}

#[then("a recording is in progress")]
async fn recording_active(world: &mut CamwatchWorld) {
    let recording = world.with_state(|s| s.is_recording()).await;
    assert!(recording);
}

#[then("no recording is in progress")]
async fn recording_idle(world: &mut CamwatchWorld) {
    let recording = world.with_state(|s| s.is_recording()).await;
    assert!(!recording);
}

#[then(expr = "the records list has {int} entry/entries")]
async fn records_count(world: &mut CamwatchWorld, count: usize) {
    let shown: Vec<String> = world
        .with_state(|s| s.records.iter().map(|r| r.name.clone()).collect())
        .await;
    assert_eq!(shown.len(), count);
    assert_eq!(shown, world.backend.records());
}

#[then(expr = "the snapshots list has {int} entry/entries")]
async fn snapshots_count(world: &mut CamwatchWorld, count: usize) {
    let shown: Vec<String> = world
        .with_state(|s| s.snapshots.iter().map(|r| r.name.clone()).collect())
        .await;
    assert_eq!(shown.len(), count);
    assert_eq!(shown, world.backend.snapshots());
}

#[then("the last operation failed")]
fn last_failed(world: &mut CamwatchWorld) {
    let result = world.last_result.as_ref().expect("no operation ran");
    assert!(result.is_err());
}
