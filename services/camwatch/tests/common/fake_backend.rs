//! In-memory surveillance backend speaking the REST conventions of the real one

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use camwatch::io::{HttpClient, HttpResponse};
use camwatch::CamwatchError;
use reqwest::Url;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    pub online: bool,
    pub settings: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<String, String>,
    session: Option<String>,
    devices: Vec<FakeDevice>,
    snapshots: Vec<String>,
    records: Vec<String>,
    recordings: HashMap<u64, String>,
    next_id: u64,
    requests: Vec<String>,
    unreachable: bool,
    lowercase_names: bool,
}

/// Stateful fake backend used in place of the HTTP transport
#[derive(Debug, Default)]
pub struct FakeBackend {
    inner: Mutex<Inner>,
}

fn reply(status: u16, body: Value) -> camwatch::Result<HttpResponse> {
    Ok(HttpResponse {
        status,
        body: body.to_string(),
    })
}

fn error(status: u16, message: &str) -> camwatch::Result<HttpResponse> {
    reply(status, json!({ "status": "error", "message": message }))
}

fn success(message: &str) -> camwatch::Result<HttpResponse> {
    reply(200, json!({ "status": "success", "message": message }))
}

fn str_field<'a>(body: &'a Value, key: &str) -> &'a str {
    body.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl FakeBackend {
    pub fn add_user(&self, username: &str, password: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.users.insert(username.to_string(), password.to_string());
    }

    pub fn add_device(&self, id: &str, name: &str, rtsp_url: &str, online: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.devices.push(FakeDevice {
            id: id.to_string(),
            name: name.to_string(),
            rtsp_url: rtsp_url.to_string(),
            online,
            settings: Map::new(),
        });
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unwrap().unreachable = unreachable;
    }

    /// Store device names lower-cased, the way some backends normalize input
    pub fn lowercase_names(&self) {
        self.inner.lock().unwrap().lowercase_names = true;
    }

    pub fn device_ids(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.devices.iter().map(|d| d.id.clone()).collect()
    }

    pub fn device(&self, id: &str) -> Option<FakeDevice> {
        let inner = self.inner.lock().unwrap();
        inner.devices.iter().find(|d| d.id == id).cloned()
    }

    pub fn records(&self) -> Vec<String> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.inner.lock().unwrap().snapshots.clone()
    }

    /// How many requests matched `"<METHOD> <path>"`
    pub fn request_count(&self, request: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.iter().filter(|r| r.as_str() == request).count()
    }

    fn begin(&self, method: &str, url: &str) -> camwatch::Result<(Url, std::sync::MutexGuard<'_, Inner>)> {
        let parsed = Url::parse(url).map_err(|e| CamwatchError::Http(e.to_string()))?;
        let mut inner = self.inner.lock().unwrap();
        if inner.unreachable {
            return Err(CamwatchError::Http(format!("{} {} failed: connection refused", method, url)));
        }
        inner.requests.push(format!("{} {}", method, parsed.path()));
        Ok((parsed, inner))
    }
}

fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

#[async_trait]
impl HttpClient for FakeBackend {
    async fn get(&self, url: &str) -> camwatch::Result<HttpResponse> {
        let (url, inner) = self.begin("GET", url)?;
        match url.path() {
            "/api/user/devices" => {
                if inner.session.is_none() {
                    return error(401, "Not logged in");
                }
                let ids: Vec<&str> = inner.devices.iter().map(|d| d.id.as_str()).collect();
                reply(200, json!(ids))
            }
            "/api/device/details" => {
                let id = query(&url, "device_id").unwrap_or_default();
                match inner.devices.iter().find(|d| d.id == id) {
                    Some(device) => {
                        let mut body = device.settings.clone();
                        body.insert("status".to_string(), json!("success"));
                        body.insert("name".to_string(), json!(device.name));
                        body.insert("rtsp_url".to_string(), json!(device.rtsp_url));
                        reply(200, Value::Object(body))
                    }
                    None => error(404, "Device not found"),
                }
            }
            "/api/device/check_online" => {
                let rtsp_url = query(&url, "rtsp_url").unwrap_or_default();
                let online = inner
                    .devices
                    .iter()
                    .any(|d| d.rtsp_url == rtsp_url && d.online);
                reply(200, json!({ "is_online": online }))
            }
            "/api/settings" => reply(200, json!({ "retention_days": 7 })),
            "/api/video/snapshots" => {
                reply(200, json!({ "status": "success", "snapshots": inner.snapshots }))
            }
            // Listing without a status field
            "/api/video/records" => reply(200, json!({ "records": inner.records })),
            _ => Ok(HttpResponse {
                status: 404,
                body: "Not Found".to_string(),
            }),
        }
    }

    async fn get_bytes(&self, url: &str) -> camwatch::Result<Vec<u8>> {
        let (url, inner) = self.begin("GET", url)?;
        let (key, files) = match url.path() {
            "/api/video/download_snapshot" => ("snapshot_file", &inner.snapshots),
            "/api/video/playback" => ("video_file", &inner.records),
            _ => return Err(CamwatchError::Http(format!("GET {} returned status 404", url))),
        };
        let name = query(&url, key).unwrap_or_default();
        if files.contains(&name) {
            Ok(name.into_bytes())
        } else {
            Err(CamwatchError::Http(format!("GET {} returned status 404", url)))
        }
    }

    async fn post(&self, url: &str) -> camwatch::Result<HttpResponse> {
        let (url, mut inner) = self.begin("POST", url)?;
        match url.path() {
            "/api/logout" => {
                inner.session = None;
                success("Logged out")
            }
            _ => error(404, "Not found"),
        }
    }

    async fn post_json(&self, url: &str, body: &Value) -> camwatch::Result<HttpResponse> {
        let (url, mut inner) = self.begin("POST", url)?;
        match url.path() {
            "/api/login" => {
                let username = str_field(body, "username");
                let password = str_field(body, "password");
                if inner.users.get(username).map(String::as_str) == Some(password) {
                    inner.session = Some(username.to_string());
                    success("Login successful")
                } else {
                    error(401, "Invalid credentials")
                }
            }
            "/api/device/add" => {
                let id = str_field(body, "id");
                if inner.devices.iter().any(|d| d.id == id) {
                    return error(400, "Device id already exists");
                }
                inner.devices.push(FakeDevice {
                    id: id.to_string(),
                    name: str_field(body, "name").to_string(),
                    rtsp_url: str_field(body, "rtsp_url").to_string(),
                    online: true,
                    settings: Map::new(),
                });
                success("Device added")
            }
            "/api/device/delete" => {
                let id = str_field(body, "device_id");
                let before = inner.devices.len();
                inner.devices.retain(|d| d.id != id);
                if inner.devices.len() == before {
                    error(404, "Device not found")
                } else {
                    success("Device deleted")
                }
            }
            "/api/settings/update" => {
                let id = str_field(body, "device_id").to_string();
                let lowercase = inner.lowercase_names;
                let Some(device) = inner.devices.iter_mut().find(|d| d.id == id) else {
                    return error(404, "Device not found");
                };
                let reserved: HashSet<&str> = ["username", "device_id"].into_iter().collect();
                for (key, value) in body.as_object().into_iter().flatten() {
                    if reserved.contains(key.as_str()) {
                        continue;
                    }
                    let value = match (key.as_str(), value) {
                        ("name", Value::String(name)) if lowercase => json!(name.to_lowercase()),
                        _ => value.clone(),
                    };
                    if key == "name" {
                        device.name = value.as_str().unwrap_or_default().to_string();
                    } else if key == "rtsp_url" {
                        device.rtsp_url = value.as_str().unwrap_or_default().to_string();
                    } else {
                        device.settings.insert(key.clone(), value);
                    }
                }
                success("Settings updated")
            }
            "/api/video/record/start" => {
                inner.next_id += 1;
                let id = inner.next_id;
                let file = format!(
                    "{}_{}_{}.mp4",
                    str_field(body, "device_name"),
                    str_field(body, "username"),
                    id
                );
                inner.recordings.insert(id, file);
                reply(200, json!({ "status": "success", "recording_id": id }))
            }
            "/api/video/record/stop" => {
                let id = body.get("recording_id").and_then(Value::as_u64).unwrap_or_default();
                match inner.recordings.remove(&id) {
                    Some(file) => {
                        inner.records.push(file);
                        success("Recording stopped")
                    }
                    None => error(404, "Recording not found"),
                }
            }
            "/api/video/snapshots/backup" => {
                if str_field(body, "rtsp_url").is_empty() {
                    return error(400, "rtsp_url is required");
                }
                success("Snapshots backed up")
            }
            "/api/video/snapshot" => {
                inner.next_id += 1;
                let file = format!("{}_{}.jpg", str_field(body, "device_name"), inner.next_id);
                inner.snapshots.push(file);
                success("Snapshot saved")
            }
            _ => error(404, "Not found"),
        }
    }
}
