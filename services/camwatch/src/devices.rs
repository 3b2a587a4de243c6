//! Device registry panel: the device table and its add/update/delete actions

use std::collections::HashMap;

use serde_json::{Map, Value};
use tokio::task::JoinSet;

use crate::api::BackendApi;
use crate::console::ClientContext;
use crate::error::{CamwatchError, Result};
use crate::live::LivePanel;
use crate::state::{apply_if_current, Device, DeviceStatus, Notice};

/// Actions on the device table
#[derive(Clone, Debug)]
pub struct DeviceRegistry {
    ctx: ClientContext,
}

impl DeviceRegistry {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    /// Re-fetch the device table, surfacing failures as the notice
    pub async fn fetch_devices(&self) -> Result<()> {
        let result = self.load().await;
        self.ctx.report(result).await
    }

    /// Re-fetch the device table without touching the notice
    pub(crate) async fn load(&self) -> Result<()> {
        let (username, token) = self.ctx.session_scope().await?;
        let rows = assemble_rows(&self.ctx.api, &username).await?;
        let count = rows.len();

        // Overlapping loads are not ordered: the last one to land wins
        if apply_if_current(&self.ctx.state, &token, |state| state.devices = rows).await {
            tracing::debug!("Device table updated ({} devices)", count);
        } else {
            tracing::debug!("Discarding device table for an ended session");
        }
        Ok(())
    }

    /// Best-effort liveness probe; any failure reads as offline
    pub async fn check_online(&self, rtsp_url: &str) -> DeviceStatus {
        probe(&self.ctx.api, rtsp_url).await
    }

    pub async fn add_device(&self, id: &str, name: &str, rtsp_url: &str) -> Result<()> {
        let result = self.add(id.trim(), name.trim(), rtsp_url.trim()).await;
        self.ctx.report(result).await
    }

    async fn add(&self, id: &str, name: &str, rtsp_url: &str) -> Result<()> {
        if id.is_empty() || name.is_empty() || rtsp_url.is_empty() {
            return Err(CamwatchError::Validation(
                "Device id, name and RTSP URL are all required".to_string(),
            ));
        }
        let (username, token) = self.ctx.session_scope().await?;

        let message = self.ctx.api.add_device(id, name, rtsp_url, &username).await?;
        tracing::info!("Added device {} ({})", id, name);
        apply_if_current(&self.ctx.state, &token, |state| {
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| format!("Device {} added", id)),
            ));
        })
        .await;

        self.load().await
    }

    /// Delete a device. Nothing is sent unless the operator confirmed.
    /// Returns whether a delete request was issued.
    pub async fn delete_device(&self, device_id: &str, confirmed: bool) -> Result<bool> {
        if !confirmed {
            tracing::debug!("Delete of {} not confirmed", device_id);
            return Ok(false);
        }
        let result = self.delete(device_id).await.map(|_| true);
        self.ctx.report(result).await
    }

    async fn delete(&self, device_id: &str) -> Result<()> {
        let (username, token) = self.ctx.session_scope().await?;

        let message = self.ctx.api.delete_device(device_id, &username).await?;
        tracing::info!("Deleted device {}", device_id);
        apply_if_current(&self.ctx.state, &token, |state| {
            let selected = state
                .live
                .as_ref()
                .is_some_and(|live| live.device_id == device_id);
            if selected {
                state.clear_selection();
            }
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| format!("Device {} deleted", device_id)),
            ));
        })
        .await;

        self.load().await
    }

    /// Submit changed settings for a device.
    ///
    /// On success the live panel keeps exactly the submitted fields, unless
    /// `client.refresh_after_update` asks for a re-fetch instead.
    pub async fn update_device(&self, device_id: &str, fields: Map<String, Value>) -> Result<()> {
        let result = self.update(device_id, fields).await;
        self.ctx.report(result).await
    }

    async fn update(&self, device_id: &str, fields: Map<String, Value>) -> Result<()> {
        if fields.is_empty() {
            return Err(CamwatchError::Validation(
                "No settings to update".to_string(),
            ));
        }
        let (username, token) = self.ctx.session_scope().await?;

        let message = self
            .ctx
            .api
            .update_settings(device_id, &username, &fields)
            .await?;
        tracing::info!("Updated settings of {}", device_id);

        let refresh = self.ctx.config.client.refresh_after_update;
        let stream_url = match fields.get("rtsp_url").and_then(Value::as_str) {
            Some(rtsp_url) if !refresh => Some(self.ctx.api.stream_url(rtsp_url)?),
            _ => None,
        };
        apply_if_current(&self.ctx.state, &token, |state| {
            if !refresh {
                if let Some(row) = state.devices.iter_mut().find(|d| d.id == device_id) {
                    if let Some(name) = fields.get("name").and_then(Value::as_str) {
                        row.name = name.to_string();
                    }
                    if let Some(rtsp_url) = fields.get("rtsp_url").and_then(Value::as_str) {
                        row.rtsp_url = rtsp_url.to_string();
                    }
                }
                if let Some(live) = state.live.as_mut().filter(|l| l.device_id == device_id) {
                    live.apply_submitted(fields, stream_url);
                }
            }
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| "Settings updated".to_string()),
            ));
        })
        .await;

        if refresh {
            LivePanel::new(self.ctx.clone())
                .reload_details(device_id)
                .await?;
            self.load().await?;
        }
        Ok(())
    }

    /// Backend-wide settings (`GET /api/settings`), shown read-only
    pub async fn backend_settings(&self) -> Result<Map<String, Value>> {
        let result = self.read_settings().await;
        self.ctx.report(result).await
    }

    async fn read_settings(&self) -> Result<Map<String, Value>> {
        self.ctx.session_scope().await?;
        let settings = self.ctx.api.settings().await?;
        tracing::debug!("Read {} backend settings", settings.len());
        Ok(settings)
    }
}

/// Fetch the id list, then details and probe for every id concurrently.
/// Rows come back in list order; a failed row never fails the table.
async fn assemble_rows(api: &BackendApi, username: &str) -> Result<Vec<Device>> {
    let ids = api.list_device_ids().await?;

    let mut join_set = JoinSet::new();
    let mut tasks = HashMap::new();
    for (index, id) in ids.iter().enumerate() {
        let api = api.clone();
        let username = username.to_string();
        let id = id.clone();
        let handle =
            join_set.spawn(async move { (index, device_row(&api, &username, id).await) });
        tasks.insert(handle.id(), index);
    }

    let mut rows: Vec<Option<Device>> = vec![None; ids.len()];
    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((_, (index, row))) => rows[index] = Some(row),
            Err(e) => {
                tracing::warn!("Device row task failed: {}", e);
                if let Some(&index) = tasks.get(&e.id()) {
                    rows[index] = Some(failed_row(ids[index].clone(), e.to_string()));
                }
            }
        }
    }

    // One row per id, in list order
    Ok(rows
        .into_iter()
        .zip(ids)
        .map(|(row, id)| {
            row.unwrap_or_else(|| failed_row(id, "Device row was not loaded".to_string()))
        })
        .collect())
}

fn failed_row(id: String, error: String) -> Device {
    Device {
        id,
        name: String::new(),
        rtsp_url: String::new(),
        status: DeviceStatus::Offline,
        error: Some(error),
    }
}

async fn device_row(api: &BackendApi, username: &str, id: String) -> Device {
    match api.device_details(username, &id).await {
        Ok(details) => {
            let status = probe(api, &details.rtsp_url).await;
            Device {
                id,
                name: details.name,
                rtsp_url: details.rtsp_url,
                status,
                error: None,
            }
        }
        Err(e) => {
            tracing::warn!("Details for device {} failed: {}", id, e);
            failed_row(id, Notice::from_error(&e).text)
        }
    }
}

async fn probe(api: &BackendApi, rtsp_url: &str) -> DeviceStatus {
    if rtsp_url.is_empty() {
        return DeviceStatus::Offline;
    }
    match api.check_online(rtsp_url).await {
        Ok(true) => DeviceStatus::Online,
        Ok(false) => DeviceStatus::Offline,
        Err(e) => {
            tracing::debug!("Online probe for {} failed: {}", rtsp_url, e);
            DeviceStatus::Offline
        }
    }
}
