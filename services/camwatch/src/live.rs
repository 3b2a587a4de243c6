//! Live view panel: the selected device, its stream, recording and snapshots

use std::time::Duration;

use chrono::NaiveDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::{SnapshotBackup, SnapshotRequest, StartRecording};
use crate::console::ClientContext;
use crate::error::{CamwatchError, Result};
use crate::files::FileBrowser;
use crate::state::{
    apply_if_current, ActiveRecording, Notice, RecordingState, StateHandle, ViewState,
};

/// What a capture request needs to know about the selected device
struct Target {
    username: String,
    device_id: String,
    name: String,
    rtsp_url: String,
    token: CancellationToken,
}

/// Actions on the selected device
#[derive(Clone, Debug)]
pub struct LivePanel {
    ctx: ClientContext,
}

impl LivePanel {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    /// Make `device_id` the selected device, load its details and refresh
    /// the file listings once
    pub async fn select_device(&self, device_id: &str) -> Result<()> {
        let result = self.select(device_id.trim()).await;
        self.ctx.report(result).await
    }

    async fn select(&self, device_id: &str) -> Result<()> {
        if device_id.is_empty() {
            return Err(CamwatchError::Validation("Device id is required".to_string()));
        }
        let token = {
            let mut state = self.ctx.state.write().await;
            let (_, session) = state.session_scope()?;
            if let Some(active) = state.recording() {
                tracing::warn!(
                    "Leaving recording {} ({}) running on the backend",
                    active.recording_id,
                    active.file
                );
            }
            state.begin_selection(device_id, &session)
        };
        tracing::info!("Selected device {}", device_id);

        self.load_details(device_id, &token).await?;

        let files = FileBrowser::new(self.ctx.clone());
        files.load_snapshots().await?;
        files.load_records().await
    }

    /// Re-fetch details of `device_id` if it is still the selected device
    pub async fn reload_details(&self, device_id: &str) -> Result<()> {
        let token = {
            let state = self.ctx.state.read().await;
            state
                .live
                .as_ref()
                .filter(|live| live.device_id == device_id)
                .map(|live| live.token.clone())
        };
        match token {
            Some(token) => self.load_details(device_id, &token).await,
            None => Ok(()),
        }
    }

    async fn load_details(&self, device_id: &str, token: &CancellationToken) -> Result<()> {
        let username = self.ctx.session_scope().await?.0;
        let details = self.ctx.api.device_details(&username, device_id).await?;
        let stream_url = self.ctx.api.stream_url(&details.rtsp_url)?;

        let applied = apply_if_current(&self.ctx.state, token, |state| {
            if let Some(live) = state.live.as_mut() {
                live.name = details.name;
                live.rtsp_url = details.rtsp_url;
                live.settings = details.settings;
                live.stream_url = Some(stream_url);
                live.details_loaded = true;
            }
        })
        .await;
        if !applied {
            tracing::debug!("Discarding details of {} for a stale selection", device_id);
        }
        Ok(())
    }

    /// Playable stream URL of the selected device
    pub async fn stream_url(&self) -> Result<String> {
        let state = self.ctx.state.read().await;
        let live = state.live.as_ref().ok_or(CamwatchError::NoDeviceSelected)?;
        live.stream_url
            .clone()
            .ok_or_else(|| CamwatchError::InvalidState("Device details are not loaded yet".to_string()))
    }

    /// Launch the configured external player on the stream URL
    pub async fn open_stream(&self) -> Result<String> {
        let result = self.launch_player().await;
        self.ctx.report(result).await
    }

    async fn launch_player(&self) -> Result<String> {
        let url = self.stream_url().await?;
        let player = self.ctx.config.client.player.as_deref().ok_or_else(|| {
            CamwatchError::Config("No external player configured (client.player)".to_string())
        })?;

        let mut child = tokio::process::Command::new(player)
            .arg(&url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;
        tracing::info!("Started {} on {}", player, url);

        let player = player.to_string();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => tracing::debug!("{} exited with {}", player, status),
                Err(e) => tracing::warn!("Waiting for {} failed: {}", player, e),
            }
        });
        Ok(url)
    }

    async fn target(&self) -> Result<Target> {
        target_of(&*self.ctx.state.read().await)
    }

    pub async fn start_recording(&self) -> Result<()> {
        let result = self.start().await;
        self.ctx.report(result).await
    }

    async fn start(&self) -> Result<()> {
        // Claim the recording slot under the same lock as the check
        let target = {
            let mut state = self.ctx.state.write().await;
            let busy = state
                .live
                .as_ref()
                .is_some_and(|live| !matches!(live.recording, RecordingState::Idle));
            if busy {
                return Err(CamwatchError::InvalidState(
                    "A recording is already in progress".to_string(),
                ));
            }
            let target = target_of(&state)?;
            if let Some(live) = state.live.as_mut() {
                live.recording = RecordingState::Starting;
            }
            target
        };
        let device_name = if target.name.is_empty() {
            target.device_id.clone()
        } else {
            target.name.clone()
        };
        let file = recording_file_name(
            &device_name,
            &target.username,
            chrono::Local::now().naive_local(),
            &self.ctx.config.recording.file_extension,
        );

        let request = StartRecording {
            rtsp_url: target.rtsp_url,
            device_name,
            username: target.username,
            segment_time: self.ctx.config.recording.segment_time_seconds,
        };
        let recording_id = match self.ctx.api.start_recording(&request).await {
            Ok(recording_id) => recording_id,
            Err(e) => {
                apply_if_current(&self.ctx.state, &target.token, |state| {
                    if let Some(live) = state.live.as_mut() {
                        if matches!(live.recording, RecordingState::Starting) {
                            live.recording = RecordingState::Idle;
                        }
                    }
                })
                .await;
                return Err(e);
            }
        };

        let timer = target.token.child_token();
        let active = ActiveRecording {
            recording_id: recording_id.clone(),
            file: file.clone(),
            elapsed_seconds: None,
            timer: timer.clone(),
        };
        let applied = apply_if_current(&self.ctx.state, &target.token, |state| {
            if let Some(live) = state.live.as_mut() {
                live.recording = RecordingState::Recording(active);
            }
            state.notice = Some(Notice::info(format!("Recording started: {}", file)));
        })
        .await;

        if applied {
            tracing::info!("Recording {} started as {}", recording_id, file);
            spawn_recording_timer(
                self.ctx.state.clone(),
                timer,
                self.ctx.config.polling.recording_tick(),
            );
        } else {
            tracing::warn!(
                "Recording {} started after the selection changed; it continues on the backend",
                recording_id
            );
        }
        Ok(())
    }

    /// Stop the active recording. On failure the recording stays active so
    /// the stop can be retried.
    pub async fn stop_recording(&self) -> Result<()> {
        let result = self.stop().await;
        self.ctx.report(result).await
    }

    async fn stop(&self) -> Result<()> {
        let (recording_id, token) = {
            let state = self.ctx.state.read().await;
            let live = state.live.as_ref().ok_or(CamwatchError::NoDeviceSelected)?;
            match &live.recording {
                RecordingState::Recording(active) => {
                    (active.recording_id.clone(), live.token.clone())
                }
                RecordingState::Starting => {
                    return Err(CamwatchError::InvalidState(
                        "The recording is still starting".to_string(),
                    ))
                }
                RecordingState::Idle => {
                    return Err(CamwatchError::InvalidState(
                        "No recording in progress".to_string(),
                    ))
                }
            }
        };

        let message = self.ctx.api.stop_recording(&recording_id).await?;

        apply_if_current(&self.ctx.state, &token, |state| {
            if let Some(live) = state.live.as_mut() {
                let same = matches!(
                    &live.recording,
                    RecordingState::Recording(active) if active.recording_id == recording_id
                );
                if same {
                    if let RecordingState::Recording(active) = std::mem::take(&mut live.recording) {
                        active.timer.cancel();
                    }
                }
            }
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| "Recording stopped".to_string()),
            ));
        })
        .await;
        tracing::info!("Recording {} stopped", recording_id);

        FileBrowser::new(self.ctx.clone()).load_records().await
    }

    pub async fn take_snapshot(&self) -> Result<()> {
        let result = self.snapshot().await;
        self.ctx.report(result).await
    }

    async fn snapshot(&self) -> Result<()> {
        let target = self.target().await?;
        let device_name = if target.name.is_empty() {
            target.device_id.clone()
        } else {
            target.name.clone()
        };
        let request = SnapshotRequest {
            rtsp_url: target.rtsp_url,
            device_name,
            username: target.username,
        };
        let message = self.ctx.api.take_snapshot(&request).await?;

        apply_if_current(&self.ctx.state, &target.token, |state| {
            state.notice = Some(Notice::info(
                message.unwrap_or_else(|| "Snapshot taken".to_string()),
            ));
        })
        .await;
        tracing::info!("Snapshot taken on {}", target.device_id);

        FileBrowser::new(self.ctx.clone()).load_snapshots().await
    }

    /// Ask the backend for a batch of snapshots of the selected device every
    /// `snapshot_backup.interval_seconds` until stopped or the selection ends
    pub async fn start_snapshot_backup(&self) -> Result<()> {
        let result = self.start_backup().await;
        self.ctx.report(result).await
    }

    async fn start_backup(&self) -> Result<()> {
        let backup = &self.ctx.config.snapshot_backup;
        let (device_id, timer) = {
            let mut state = self.ctx.state.write().await;
            let target = target_of(&state)?;
            let live = state.live.as_mut().ok_or(CamwatchError::NoDeviceSelected)?;
            if live.backup.is_some() {
                return Err(CamwatchError::InvalidState(
                    "Snapshot backup is already running".to_string(),
                ));
            }
            let timer = target.token.child_token();
            live.backup = Some(timer.clone());
            state.notice = Some(Notice::info(format!(
                "Snapshot backup started (every {} s, up to {} snapshots)",
                backup.interval_seconds, backup.max_snapshots
            )));
            (target.device_id, timer)
        };
        tracing::info!("Snapshot backup of {} started", device_id);

        spawn_snapshot_backup(self.ctx.clone(), timer);
        Ok(())
    }

    pub async fn stop_snapshot_backup(&self) -> Result<()> {
        let result = self.stop_backup().await;
        self.ctx.report(result).await
    }

    async fn stop_backup(&self) -> Result<()> {
        let mut state = self.ctx.state.write().await;
        state.session_scope()?;
        let live = state.live.as_mut().ok_or(CamwatchError::NoDeviceSelected)?;
        let timer = live.backup.take().ok_or_else(|| {
            CamwatchError::InvalidState("Snapshot backup is not running".to_string())
        })?;
        timer.cancel();
        tracing::info!("Snapshot backup of {} stopped", live.device_id);
        state.notice = Some(Notice::info("Snapshot backup stopped"));
        Ok(())
    }
}

/// Capture parameters of the selected device; details must be loaded
fn target_of(state: &ViewState) -> Result<Target> {
    let (username, _) = state.session_scope()?;
    let live = state.live.as_ref().ok_or(CamwatchError::NoDeviceSelected)?;
    if !live.details_loaded {
        return Err(CamwatchError::InvalidState(
            "Device details are not loaded yet".to_string(),
        ));
    }
    Ok(Target {
        username,
        device_id: live.device_id.clone(),
        name: live.name.clone(),
        rtsp_url: live.rtsp_url.clone(),
        token: live.token.clone(),
    })
}

/// `<device>_<user>_<YYYYMMDDHHMMSS>.<ext>`, with anything outside
/// `[A-Za-z0-9_-]` in the name parts replaced by `_`
pub fn recording_file_name(device: &str, username: &str, at: NaiveDateTime, ext: &str) -> String {
    fn clean(part: &str) -> String {
        part.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
    format!(
        "{}_{}_{}.{}",
        clean(device),
        clean(username),
        at.format("%Y%m%d%H%M%S"),
        ext.trim_start_matches('.')
    )
}

/// Count elapsed seconds of the active recording until `timer` is cancelled.
/// The first tick lands one `tick` after start and reads 1.
fn spawn_recording_timer(state: StateHandle, timer: CancellationToken, tick: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = timer.cancelled() => break,
            }

            let mut guard = state.write().await;
            if timer.is_cancelled() {
                break;
            }
            if let Some(RecordingState::Recording(active)) =
                guard.live.as_mut().map(|live| &mut live.recording)
            {
                active.elapsed_seconds = Some(active.elapsed_seconds.map_or(1, |n| n + 1));
            }
        }
        tracing::debug!("Recording timer stopped");
    });
}

/// Request a snapshot backup every configured interval until `timer` is
/// cancelled. Each request reads the current device URL; failures are only
/// logged.
fn spawn_snapshot_backup(ctx: ClientContext, timer: CancellationToken) {
    tokio::spawn(async move {
        let config = &ctx.config.snapshot_backup;
        let period = config.interval();
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = timer.cancelled() => break,
            }

            let request = {
                let state = ctx.state.read().await;
                if timer.is_cancelled() {
                    break;
                }
                match (state.username(), state.live.as_ref()) {
                    (Some(username), Some(live)) => SnapshotBackup {
                        rtsp_url: live.rtsp_url.clone(),
                        output_dir: config.output_dir_for(username),
                        interval: config.interval_seconds,
                        max_snapshots: config.max_snapshots,
                    },
                    _ => break,
                }
            };

            tokio::select! {
                result = ctx.api.backup_snapshots(&request) => {
                    match result {
                        Ok(_) => tracing::debug!("Snapshot backup requested for {}", request.rtsp_url),
                        Err(e) => tracing::warn!("Snapshot backup of {} failed: {}", request.rtsp_url, e),
                    }
                }
                _ = timer.cancelled() => break,
            }
        }
        tracing::debug!("Snapshot backup timer stopped");
    });
}
