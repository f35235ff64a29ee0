// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Where completed commands go, and how the log is streamed back.

use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::CommandDevice;
use crate::error::RingError;
use crate::seekto::SeekTo;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Byte sink a response is streamed into.
pub type Sink<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

/// Default path of the file-backed log.
pub const DEFAULT_DATA_FILE: &str = "/var/tmp/aesdsocketdata";

const READ_CHUNK: usize = 1024;

/// Storage backend behind the socket server.
///
/// Object-safe for use as `Arc<dyn CommandStore>`.
pub trait CommandStore: Send + Sync + 'static {
    /// Store one complete command. Returns the log position the response
    /// to this command starts at.
    fn apply<'a>(
        &'a self,
        command: Bytes,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>>;

    /// Stream the log from `position` to its end. Returns bytes written.
    fn stream_from<'a>(
        &'a self,
        position: u64,
        sink: Sink<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>>;

    /// Release everything held by the store.
    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// In-memory log on the command ring, driven through device file operations.
#[derive(Debug)]
pub struct RingStore {
    device: Arc<CommandDevice>,
}

impl RingStore {
    pub fn new(device: Arc<CommandDevice>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<CommandDevice> {
        &self.device
    }
}

impl CommandStore for RingStore {
    fn apply<'a>(
        &'a self,
        command: Bytes,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>> {
        Box::pin(async move {
            let mut file = self.device.open(cancel.clone());
            if let Some(seek) = SeekTo::parse(&command) {
                let pos = file.seek_to_command(seek.write_cmd, seek.write_cmd_offset).await?;
                debug!(cmd = seek.write_cmd, offset = seek.write_cmd_offset, pos, "seek command");
                return Ok(pos);
            }
            file.write_all(&command).await?;
            Ok(file.position())
        })
    }

    fn stream_from<'a>(
        &'a self,
        position: u64,
        sink: Sink<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>> {
        Box::pin(async move {
            // Snapshot under one read lock; the sink is written with it released.
            let chunks = self.device.ring().read_from(position, cancel).await?;
            let mut sent = 0u64;
            for chunk in chunks {
                write_interruptible(&mut *sink, &chunk, cancel).await?;
                sent += chunk.len() as u64;
            }
            flush_interruptible(sink, cancel).await?;
            Ok(sent)
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let released = self.device.release().await;
            info!(released, "command ring released");
            Ok(())
        })
    }
}

/// Append-only log kept in a regular file.
///
/// Seek commands have no meaning here and are stored like any other line.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStore {
    /// Open or create the data file.
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open data file {}", path.display()))?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CommandStore for FileStore {
    fn apply<'a>(
        &'a self,
        command: Bytes,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>> {
        Box::pin(async move {
            let mut file = self.file.lock().await;
            file.write_all(&command)
                .await
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
            file.flush().await?;
            Ok(0)
        })
    }

    fn stream_from<'a>(
        &'a self,
        position: u64,
        sink: Sink<'a>,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, anyhow::Result<u64>> {
        Box::pin(async move {
            // Appends hold the lock for a whole command, so the length seen
            // under it bounds a prefix of complete commands.
            let end = self.file.lock().await.metadata().await?.len();
            let mut reader = File::open(&self.path)
                .await
                .with_context(|| format!("failed to read {}", self.path.display()))?;
            reader.seek(SeekFrom::Start(position)).await?;
            let mut remaining = end.saturating_sub(position);
            let mut buf = vec![0u8; READ_CHUNK];
            let mut sent = 0u64;
            while remaining > 0 {
                let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
                let n = reader.read(&mut buf[..want]).await?;
                if n == 0 {
                    break;
                }
                write_interruptible(&mut *sink, &buf[..n], cancel).await?;
                sent += n as u64;
                remaining -= n as u64;
            }
            flush_interruptible(sink, cancel).await?;
            Ok(sent)
        })
    }

    fn close(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let file = self.file.lock().await;
            file.sync_all().await.ok();
            drop(file);
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => info!(path = %self.path.display(), "data file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %self.path.display(), "failed to remove data file: {e}"),
            }
            Ok(())
        })
    }
}

/// Write `chunk` to `sink` unless `cancel` fires first.
async fn write_interruptible(
    sink: Sink<'_>,
    chunk: &[u8],
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RingError::Interrupted.into()),
        written = sink.write_all(chunk) => Ok(written?),
    }
}

async fn flush_interruptible(sink: Sink<'_>, cancel: &CancellationToken) -> anyhow::Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RingError::Interrupted.into()),
        flushed = sink.flush() => Ok(flushed?),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
