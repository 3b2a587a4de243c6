//! BDD step definitions for the device registry

use cucumber::{given, then, when};
use serde_json::{Map, Value};

use crate::world::CamwatchWorld;

#[given("the backend lower-cases device names")]
fn backend_lowercases(world: &mut CamwatchWorld) {
    world.backend.lowercase_names();
}

#[given(expr = "the operator selected device {string}")]
async fn selected_device(world: &mut CamwatchWorld, id: String) {
    world.console().live().select_device(&id).await.unwrap();
}

#[when(expr = "the operator adds device {string} named {string} at {string}")]
async fn add_device(world: &mut CamwatchWorld, id: String, name: String, rtsp_url: String) {
    let result = world.console().devices().add_device(&id, &name, &rtsp_url).await;
    world.last_result = Some(result);
}

#[when(expr = "the operator deletes device {string} without confirming")]
async fn delete_unconfirmed(world: &mut CamwatchWorld, id: String) {
    let sent = world.console().devices().delete_device(&id, false).await.unwrap();
    assert!(!sent);
}

#[when(expr = "the operator deletes device {string} and confirms")]
async fn delete_confirmed(world: &mut CamwatchWorld, id: String) {
    let result = world.console().devices().delete_device(&id, true).await;
    world.last_result = Some(result.map(|_| ()));
}

#[when(expr = "the operator sets {string} to {string}")]
async fn update_setting(world: &mut CamwatchWorld, key: String, value: String) {
    let device_id = world
        .with_state(|s| s.live.as_ref().map(|l| l.device_id.clone()))
        .await
        .expect("no device selected");
    let mut fields = Map::new();
    fields.insert(key, Value::from(value));
    let result = world.console().devices().update_device(&device_id, fields).await;
    world.last_result = Some(result);
}

#[then(expr = "device {string} is shown as {string}")]
async fn device_status(world: &mut CamwatchWorld, id: String, status: String) {
    let shown = world
        .with_state(|s| {
            s.devices
                .iter()
                .find(|d| d.id == id)
                .map(|d| d.status.to_string())
        })
        .await;
    assert_eq!(shown.as_deref(), Some(status.as_str()));
}

#[then(expr = "the device table lists {string}")]
async fn table_lists(world: &mut CamwatchWorld, id: String) {
    let listed = world
        .with_state(|s| s.devices.iter().any(|d| d.id == id))
        .await;
    assert!(listed, "device {} not in table", id);
}

#[then("the device table matches the backend")]
async fn table_matches_backend(world: &mut CamwatchWorld) {
    let shown: Vec<String> = world
        .with_state(|s| s.devices.iter().map(|d| d.id.clone()).collect())
        .await;
    assert_eq!(shown, world.backend.device_ids());
}

#[then("no device is selected")]
async fn nothing_selected(world: &mut CamwatchWorld) {
    let selected = world.with_state(|s| s.live.is_some()).await;
    assert!(!selected);
}

#[then(expr = "the live panel setting {string} is {string}")]
async fn live_setting(world: &mut CamwatchWorld, key: String, expected: String) {
    let value = world
        .with_state(|s| s.live.as_ref().and_then(|l| l.settings.get(&key).cloned()))
        .await;
    assert_eq!(value, Some(Value::from(expected)));
}

#[then(expr = "the backend stored {string} as name of {string}")]
fn backend_name(world: &mut CamwatchWorld, name: String, id: String) {
    let device = world.backend.device(&id).expect("device not in backend");
    assert_eq!(device.name, name);
}
