//! Shared view state for the console panels

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::RecordingId;
use crate::error::CamwatchError;

/// Liveness of a device as reported by the online probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Online => write!(f, "online"),
            DeviceStatus::Offline => write!(f, "offline"),
        }
    }
}

/// One row of the device table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    pub status: DeviceStatus,
    /// Set when the detail fetch for this row failed
    pub error: Option<String>,
}

/// A snapshot or recording file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
}

impl From<String> for FileEntry {
    fn from(name: String) -> Self {
        Self { name }
    }
}

/// A recording the backend confirmed as started
#[derive(Debug, Clone)]
pub struct ActiveRecording {
    pub recording_id: RecordingId,
    pub file: String,
    /// Client-side counter; `None` until the first timer tick
    pub elapsed_seconds: Option<u64>,
    pub timer: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    /// A start request is in flight; further starts are rejected
    Starting,
    Recording(ActiveRecording),
}

/// The selected device and everything the live panel shows for it
#[derive(Debug, Clone)]
pub struct LiveView {
    pub device_id: String,
    pub name: String,
    pub rtsp_url: String,
    pub settings: Map<String, Value>,
    pub stream_url: Option<String>,
    pub details_loaded: bool,
    pub recording: RecordingState,
    /// Periodic snapshot backup timer, child of `token`
    pub backup: Option<CancellationToken>,
    pub token: CancellationToken,
}

impl LiveView {
    fn new(device_id: String, token: CancellationToken) -> Self {
        Self {
            device_id,
            name: String::new(),
            rtsp_url: String::new(),
            settings: Map::new(),
            stream_url: None,
            details_loaded: false,
            recording: RecordingState::Idle,
            backup: None,
            token,
        }
    }

    /// Keep exactly the submitted settings. `name` and `rtsp_url` among them
    /// also replace the fields capture requests and the header read.
    pub fn apply_submitted(&mut self, fields: Map<String, Value>, stream_url: Option<String>) {
        if let Some(name) = fields.get("name").and_then(Value::as_str) {
            self.name = name.to_string();
        }
        if let Some(rtsp_url) = fields.get("rtsp_url").and_then(Value::as_str) {
            self.rtsp_url = rtsp_url.to_string();
        }
        if stream_url.is_some() {
            self.stream_url = stream_url;
        }
        self.settings = fields;
    }
}

/// The logged-in operator
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub username: String,
    pub token: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// The last message surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

pub const NETWORK_ERROR_NOTICE: &str = "Network error, please check the connection and try again";

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    /// Transport failures get a generic text; backend messages are kept verbatim
    pub fn from_error(err: &CamwatchError) -> Self {
        let text = match err {
            CamwatchError::Http(_) => NETWORK_ERROR_NOTICE.to_string(),
            CamwatchError::Api(message) | CamwatchError::Validation(message) => message.clone(),
            CamwatchError::NotLoggedIn => "Please log in first".to_string(),
            CamwatchError::NoDeviceSelected => "Select a device first".to_string(),
            other => other.to_string(),
        };
        Self {
            level: NoticeLevel::Error,
            text,
        }
    }
}

/// Which top-level view is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Dashboard,
}

/// Everything the console renders
#[derive(Debug, Default)]
pub struct ViewState {
    pub session: Option<SessionInfo>,
    pub devices: Vec<Device>,
    pub live: Option<LiveView>,
    pub snapshots: Vec<FileEntry>,
    pub records: Vec<FileEntry>,
    pub notice: Option<Notice>,
}

impl ViewState {
    pub fn screen(&self) -> Screen {
        if self.session.is_some() {
            Screen::Dashboard
        } else {
            Screen::Login
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.username.as_str())
    }

    /// Username and lifetime token of the active session
    pub fn session_scope(&self) -> crate::Result<(String, CancellationToken)> {
        self.session
            .as_ref()
            .map(|s| (s.username.clone(), s.token.clone()))
            .ok_or(CamwatchError::NotLoggedIn)
    }

    pub fn recording(&self) -> Option<&ActiveRecording> {
        match self.live.as_ref().map(|l| &l.recording) {
            Some(RecordingState::Recording(active)) => Some(active),
            _ => None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording().is_some()
    }

    /// Start a fresh session, returning its lifetime token
    pub fn begin_session(&mut self, username: &str) -> CancellationToken {
        self.end_session();
        let token = CancellationToken::new();
        self.session = Some(SessionInfo {
            username: username.to_string(),
            token: token.clone(),
        });
        token
    }

    /// Cancel the session lifetime and drop all session-scoped view state
    pub fn end_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.token.cancel();
        }
        self.clear_selection();
        self.devices.clear();
        self.snapshots.clear();
        self.records.clear();
    }

    /// Replace the selected device; the previous selection (and its
    /// recording timer) is cancelled
    pub fn begin_selection(
        &mut self,
        device_id: &str,
        session_token: &CancellationToken,
    ) -> CancellationToken {
        self.clear_selection();
        let token = session_token.child_token();
        self.live = Some(LiveView::new(device_id.to_string(), token.clone()));
        token
    }

    pub fn clear_selection(&mut self) {
        if let Some(live) = self.live.take() {
            live.token.cancel();
        }
    }
}

/// Thread-safe shared state handle
pub type StateHandle = Arc<RwLock<ViewState>>;

pub fn new_state_handle() -> StateHandle {
    Arc::new(RwLock::new(ViewState::default()))
}

/// Run `update` under the write lock unless `token` was cancelled in the
/// meantime. Returns whether the update ran.
pub async fn apply_if_current<F>(state: &StateHandle, token: &CancellationToken, update: F) -> bool
where
    F: FnOnce(&mut ViewState),
{
    let mut guard = state.write().await;
    if token.is_cancelled() {
        return false;
    }
    update(&mut guard);
    true
}
