//! BDD step definitions for login and logout

use cucumber::{given, then, when};

use camwatch::state::Screen;

use crate::world::CamwatchWorld;

#[given(expr = "a backend with user {string} and password {string}")]
fn backend_with_user(world: &mut CamwatchWorld, username: String, password: String) {
    world.backend.add_user(&username, &password);
}

#[given(expr = "the backend has device {string} named {string} at {string} which is {word}")]
fn backend_has_device(
    world: &mut CamwatchWorld,
    id: String,
    name: String,
    rtsp_url: String,
    status: String,
) {
    let online = match status.as_str() {
        "online" => true,
        "offline" => false,
        other => panic!("Unknown device status: {}", other),
    };
    world.backend.add_device(&id, &name, &rtsp_url, online);
}

#[given(expr = "the operator is logged in as {string} with password {string}")]
async fn logged_in(world: &mut CamwatchWorld, username: String, password: String) {
    world.console().login(&username, &password).await.unwrap();
}

#[given("the backend becomes unreachable")]
fn backend_unreachable(world: &mut CamwatchWorld) {
    world.backend.set_unreachable(true);
}

#[when("the backend goes down")]
fn backend_goes_down(world: &mut CamwatchWorld) {
    world.backend.set_unreachable(true);
}

#[when(expr = "the operator logs in as {string} with password {string}")]
async fn log_in(world: &mut CamwatchWorld, username: String, password: String) {
    let result = world.console().login(&username, &password).await;
    world.last_result = Some(result);
}

#[when("the operator logs out")]
async fn log_out(world: &mut CamwatchWorld) {
    let result = world.console().logout().await;
    world.last_result = Some(result);
}

#[then(expr = "the console shows the dashboard for {string}")]
async fn shows_dashboard(world: &mut CamwatchWorld, username: String) {
    let (screen, current) = world
        .with_state(|s| (s.screen(), s.username().map(str::to_string)))
        .await;
    assert_eq!(screen, Screen::Dashboard);
    assert_eq!(current.as_deref(), Some(username.as_str()));
}

#[then("the console shows the login view")]
async fn shows_login(world: &mut CamwatchWorld) {
    let screen = world.with_state(|s| s.screen()).await;
    assert_eq!(screen, Screen::Login);
    assert!(!world.console().session().is_polling().await);
}

#[then(expr = "the notice reads {string}")]
async fn notice_reads(world: &mut CamwatchWorld, expected: String) {
    let notice = world
        .with_state(|s| s.notice.as_ref().map(|n| n.text.clone()))
        .await;
    assert_eq!(notice.as_deref(), Some(expected.as_str()));
}

#[then(expr = "the backend received {int} {string} request(s)")]
fn request_count(world: &mut CamwatchWorld, count: usize, request: String) {
    assert_eq!(world.backend.request_count(&request), count);
}

#[then(expr = "the backend received no {string} request")]
fn no_request(world: &mut CamwatchWorld, request: String) {
    assert_eq!(world.backend.request_count(&request), 0);
}
