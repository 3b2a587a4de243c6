//! Background refresh of the device table and file listings

use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::console::ClientContext;
use crate::devices::DeviceRegistry;
use crate::error::Result;
use crate::files::FileBrowser;

/// A resource kept fresh while the session is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTarget {
    Devices,
    Snapshots,
    Records,
}

impl PollTarget {
    pub const ALL: [PollTarget; 3] = [PollTarget::Devices, PollTarget::Snapshots, PollTarget::Records];

    fn interval(self, ctx: &ClientContext) -> Duration {
        let polling = &ctx.config.polling;
        let seconds = match self {
            PollTarget::Devices => polling.devices_interval_seconds,
            PollTarget::Snapshots => polling.snapshots_interval_seconds,
            PollTarget::Records => polling.records_interval_seconds,
        };
        Duration::from_secs(seconds)
    }

    async fn refresh(self, ctx: &ClientContext) -> Result<()> {
        match self {
            PollTarget::Devices => DeviceRegistry::new(ctx.clone()).load().await,
            PollTarget::Snapshots => FileBrowser::new(ctx.clone()).load_snapshots().await,
            PollTarget::Records => FileBrowser::new(ctx.clone()).load_records().await,
        }
    }
}

impl fmt::Display for PollTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollTarget::Devices => write!(f, "devices"),
            PollTarget::Snapshots => write!(f, "snapshots"),
            PollTarget::Records => write!(f, "records"),
        }
    }
}

/// The polling tasks of one session
#[derive(Debug)]
pub struct Poller {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Poller {
    /// Spawn one loop per target. The loops end when `token` is cancelled.
    pub fn start(ctx: ClientContext, token: CancellationToken) -> Self {
        let handles = PollTarget::ALL
            .into_iter()
            .map(|target| {
                let ctx = ctx.clone();
                let cancel = token.clone();
                let interval = target.interval(&ctx);
                tokio::spawn(async move {
                    poll_loop(target, ctx, interval, cancel).await;
                })
            })
            .collect();
        tracing::debug!("Started polling for the session");
        Self { token, handles }
    }

    /// Cancel the loops and wait for them to finish
    pub async fn stop(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!("Polling task ended abnormally: {}", e);
            }
        }
        tracing::debug!("Stopped polling");
    }
}

async fn poll_loop(
    target: PollTarget,
    ctx: ClientContext,
    interval: Duration,
    cancel: CancellationToken,
) {
    // Login already did the first load; the first tick lands one interval later
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }

        tokio::select! {
            result = target.refresh(&ctx) => {
                if let Err(e) = result {
                    tracing::warn!("Background refresh of {} failed: {}", target, e);
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    tracing::debug!("Polling loop for {} cancelled", target);
}
