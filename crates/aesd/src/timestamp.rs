// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeZone};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::store::CommandStore;

/// Format one timestamp log line (RFC 2822 time, newline terminated).
pub fn timestamp_line<Tz>(now: &DateTime<Tz>) -> Bytes
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    Bytes::from(format!("timestamp:{}\n", now.format("%a, %d %b %Y %T %z")))
}

/// Append a timestamp line to `store` every `interval` until `shutdown`.
pub fn spawn(
    store: Arc<dyn CommandStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let line = timestamp_line(&chrono::Local::now());
                    match store.apply(line, &shutdown).await {
                        Ok(_) => debug!("timestamp appended"),
                        Err(e) => warn!("failed to append timestamp: {e:#}"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
