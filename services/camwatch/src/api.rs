//! Typed client for the surveillance backend REST API
//!
//! Every endpoint the console uses is wrapped here. Replies are checked the
//! same way everywhere: a JSON object whose `status` is not `"success"` is an
//! application failure carrying the backend `message` verbatim, a missing
//! `status` counts as success, and a non-JSON error reply is a transport
//! failure.

use std::fmt;
use std::sync::Arc;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CamwatchError, Result};
use crate::io::{HttpClient, HttpResponse};

/// Backend-issued recording handle, sent back exactly as it was received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingId(pub Value);

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => write!(f, "{}", s),
            other => write!(f, "{}", other),
        }
    }
}

/// Per-device details as returned by `/api/device/details`
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDetails {
    pub name: String,
    pub rtsp_url: String,
    /// Every field of the reply except the status envelope
    pub settings: Map<String, Value>,
}

/// Body of a start-recording request
#[derive(Debug, Clone, Serialize)]
pub struct StartRecording {
    pub rtsp_url: String,
    pub device_name: String,
    pub username: String,
    pub segment_time: u64,
}

/// Body of a snapshot request
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRequest {
    pub rtsp_url: String,
    pub device_name: String,
    pub username: String,
}

/// Body of a periodic snapshot backup request
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotBackup {
    pub rtsp_url: String,
    pub output_dir: String,
    pub interval: u64,
    pub max_snapshots: u64,
}

#[derive(Debug, Deserialize)]
struct OnlineReply {
    is_online: bool,
}

/// Client for the backend endpoints
#[derive(Clone)]
pub struct BackendApi {
    base_url: String,
    http: Arc<dyn HttpClient>,
}

impl fmt::Debug for BackendApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendApi")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl BackendApi {
    pub fn new(base_url: &str, http: Arc<dyn HttpClient>) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        tracing::debug!("Created BackendApi for {}", base_url);
        Self { base_url, http }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn url_with(&self, path: &str, params: &[(&str, &str)]) -> Result<String> {
        let url = reqwest::Url::parse_with_params(&self.url(path), params).map_err(|e| {
            CamwatchError::Config(format!("Invalid backend URL {}: {}", self.base_url, e))
        })?;
        Ok(url.to_string())
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Option<String>> {
        let body = serde_json::json!({ "username": username, "password": password });
        let response = self.http.post_json(&self.url("/api/login"), &body).await?;
        let reply = read_reply("login", response)?;
        Ok(message_of(&reply))
    }

    pub async fn logout(&self) -> Result<()> {
        let response = self.http.post(&self.url("/api/logout")).await?;
        read_reply("logout", response)?;
        Ok(())
    }

    /// Device identifiers owned by the logged-in user, in backend order
    pub async fn list_device_ids(&self) -> Result<Vec<String>> {
        let response = self.http.get(&self.url("/api/user/devices")).await?;
        let reply = read_reply("list devices", response)?;
        let Value::Array(items) = reply else {
            return Err(serde_json::Error::custom("device list is not an array").into());
        };
        items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Ok(id),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(CamwatchError::from(serde_json::Error::custom(format!(
                    "unexpected device id {}",
                    other
                )))),
            })
            .collect()
    }

    pub async fn device_details(&self, username: &str, device_id: &str) -> Result<DeviceDetails> {
        let url = self.url_with(
            "/api/device/details",
            &[("username", username), ("device_id", device_id)],
        )?;
        let response = self.http.get(&url).await?;
        let reply = read_reply("device details", response)?;
        let Value::Object(mut settings) = reply else {
            return Err(serde_json::Error::custom("device details is not an object").into());
        };
        settings.remove("status");
        settings.remove("message");

        let field = |key: &str| {
            settings
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(DeviceDetails {
            name: field("name"),
            rtsp_url: field("rtsp_url"),
            settings,
        })
    }

    /// Raw liveness probe; callers decide how to treat failures
    pub async fn check_online(&self, rtsp_url: &str) -> Result<bool> {
        let url = self.url_with("/api/device/check_online", &[("rtsp_url", rtsp_url)])?;
        let response = self.http.get(&url).await?;
        let reply = read_reply("check online", response)?;
        let parsed: OnlineReply = serde_json::from_value(reply)?;
        Ok(parsed.is_online)
    }

    pub async fn add_device(
        &self,
        id: &str,
        name: &str,
        rtsp_url: &str,
        username: &str,
    ) -> Result<Option<String>> {
        let body = serde_json::json!({
            "id": id,
            "name": name,
            "rtsp_url": rtsp_url,
            "username": username,
        });
        let response = self.http.post_json(&self.url("/api/device/add"), &body).await?;
        Ok(message_of(&read_reply("add device", response)?))
    }

    pub async fn delete_device(&self, device_id: &str, username: &str) -> Result<Option<String>> {
        let body = serde_json::json!({ "device_id": device_id, "username": username });
        let response = self
            .http
            .post_json(&self.url("/api/device/delete"), &body)
            .await?;
        Ok(message_of(&read_reply("delete device", response)?))
    }

    /// Submit `{...fields, username, device_id}`
    pub async fn update_settings(
        &self,
        device_id: &str,
        username: &str,
        fields: &Map<String, Value>,
    ) -> Result<Option<String>> {
        let mut body = fields.clone();
        body.insert("username".to_string(), Value::from(username));
        body.insert("device_id".to_string(), Value::from(device_id));
        let response = self
            .http
            .post_json(&self.url("/api/settings/update"), &Value::Object(body))
            .await?;
        Ok(message_of(&read_reply("update settings", response)?))
    }

    /// Backend-wide settings as stored by the backend
    pub async fn settings(&self) -> Result<Map<String, Value>> {
        let response = self.http.get(&self.url("/api/settings")).await?;
        match read_reply("settings", response)? {
            Value::Object(settings) => Ok(settings),
            _ => Err(serde_json::Error::custom("settings is not an object").into()),
        }
    }

    pub fn stream_url(&self, rtsp_url: &str) -> Result<String> {
        self.url_with("/api/video/stream", &[("rtsp_url", rtsp_url)])
    }

    pub async fn start_recording(&self, request: &StartRecording) -> Result<RecordingId> {
        let body = serde_json::to_value(request)?;
        let response = self
            .http
            .post_json(&self.url("/api/video/record/start"), &body)
            .await?;
        let mut reply = read_reply("start recording", response)?;
        match reply.get_mut("recording_id").map(Value::take) {
            Some(id) if !id.is_null() => Ok(RecordingId(id)),
            _ => Err(serde_json::Error::custom("start recording reply has no recording_id").into()),
        }
    }

    pub async fn stop_recording(&self, recording_id: &RecordingId) -> Result<Option<String>> {
        let body = serde_json::json!({ "recording_id": recording_id });
        let response = self
            .http
            .post_json(&self.url("/api/video/record/stop"), &body)
            .await?;
        Ok(message_of(&read_reply("stop recording", response)?))
    }

    pub async fn take_snapshot(&self, request: &SnapshotRequest) -> Result<Option<String>> {
        let body = serde_json::to_value(request)?;
        let response = self
            .http
            .post_json(&self.url("/api/video/snapshot"), &body)
            .await?;
        Ok(message_of(&read_reply("snapshot", response)?))
    }

    pub async fn backup_snapshots(&self, request: &SnapshotBackup) -> Result<Option<String>> {
        let body = serde_json::to_value(request)?;
        let response = self
            .http
            .post_json(&self.url("/api/video/snapshots/backup"), &body)
            .await?;
        Ok(message_of(&read_reply("snapshot backup", response)?))
    }

    pub async fn list_snapshots(&self) -> Result<Vec<String>> {
        self.list_files("/api/video/snapshots", "snapshots").await
    }

    pub async fn list_records(&self) -> Result<Vec<String>> {
        self.list_files("/api/video/records", "records").await
    }

    async fn list_files(&self, path: &str, key: &str) -> Result<Vec<String>> {
        let response = self.http.get(&self.url(path)).await?;
        let mut reply = read_reply(key, response)?;
        match reply.get_mut(key).map(Value::take) {
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(list) => Ok(serde_json::from_value(list)?),
        }
    }

    pub fn snapshot_url(&self, name: &str) -> Result<String> {
        self.url_with("/api/video/download_snapshot", &[("snapshot_file", name)])
    }

    pub fn playback_url(&self, name: &str) -> Result<String> {
        self.url_with("/api/video/playback", &[("video_file", name)])
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.http.get_bytes(url).await
    }
}

/// Apply the backend's reply conventions and return the JSON payload
fn read_reply(what: &str, response: HttpResponse) -> Result<Value> {
    let value: Value = match serde_json::from_str(&response.body) {
        Ok(value) => value,
        Err(e) if response.is_success() => return Err(e.into()),
        Err(_) => {
            return Err(CamwatchError::Http(format!(
                "{} returned status {}",
                what, response.status
            )))
        }
    };

    let failed = match value.get("status") {
        Some(status) => status.as_str() != Some("success"),
        None => !response.is_success(),
    };
    if failed {
        let message = message_of(&value).unwrap_or_else(|| {
            format!("{} failed (status {})", what, response.status)
        });
        tracing::debug!("{} rejected by backend: {}", what, message);
        return Err(CamwatchError::Api(message));
    }
    Ok(value)
}

fn message_of(value: &Value) -> Option<String> {
    value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}
