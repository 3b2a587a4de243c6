//! Snapshot and recording file listings

use std::path::{Path, PathBuf};

use crate::console::ClientContext;
use crate::error::{CamwatchError, Result};
use crate::state::{apply_if_current, FileEntry};

/// Which listing a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Snapshot,
    Record,
}

/// Lists captured files and hands out links to them
#[derive(Clone, Debug)]
pub struct FileBrowser {
    ctx: ClientContext,
}

impl FileBrowser {
    pub fn new(ctx: ClientContext) -> Self {
        Self { ctx }
    }

    pub async fn fetch_snapshots(&self) -> Result<()> {
        let result = self.load_snapshots().await;
        self.ctx.report(result).await
    }

    pub async fn fetch_records(&self) -> Result<()> {
        let result = self.load_records().await;
        self.ctx.report(result).await
    }

    pub(crate) async fn load_snapshots(&self) -> Result<()> {
        self.load(FileKind::Snapshot).await
    }

    pub(crate) async fn load_records(&self) -> Result<()> {
        self.load(FileKind::Record).await
    }

    async fn load(&self, kind: FileKind) -> Result<()> {
        let (_, token) = self.ctx.session_scope().await?;
        let names = match kind {
            FileKind::Snapshot => self.ctx.api.list_snapshots().await?,
            FileKind::Record => self.ctx.api.list_records().await?,
        };
        let entries: Vec<FileEntry> = names.into_iter().map(FileEntry::from).collect();
        let count = entries.len();

        let applied = apply_if_current(&self.ctx.state, &token, |state| match kind {
            FileKind::Snapshot => state.snapshots = entries,
            FileKind::Record => state.records = entries,
        })
        .await;
        if applied {
            tracing::debug!("{:?} listing updated ({} files)", kind, count);
        }
        Ok(())
    }

    pub fn snapshot_url(&self, name: &str) -> Result<String> {
        self.ctx.api.snapshot_url(name)
    }

    pub fn playback_url(&self, name: &str) -> Result<String> {
        self.ctx.api.playback_url(name)
    }

    /// Save a snapshot into `dir` (the configured download directory when
    /// `None`) and return the written path
    pub async fn download_snapshot(&self, name: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let result = self.download(FileKind::Snapshot, name, dir).await;
        self.ctx.report(result).await
    }

    pub async fn download_record(&self, name: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let result = self.download(FileKind::Record, name, dir).await;
        self.ctx.report(result).await
    }

    async fn download(&self, kind: FileKind, name: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let file_name = local_file_name(name)?;
        let url = match kind {
            FileKind::Snapshot => self.snapshot_url(name)?,
            FileKind::Record => self.playback_url(name)?,
        };

        let bytes = self.ctx.api.download(&url).await?;
        let dir = dir.unwrap_or(self.ctx.config.client.download_dir.as_path());
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;

        tracing::info!("Downloaded {} ({} bytes) to {:?}", name, bytes.len(), path);
        Ok(path)
    }
}

/// Keep only the last path component of a backend file name
fn local_file_name(name: &str) -> Result<&str> {
    name.rsplit(['/', '\\'])
        .next()
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .ok_or_else(|| CamwatchError::Validation(format!("Invalid file name '{}'", name)))
}
