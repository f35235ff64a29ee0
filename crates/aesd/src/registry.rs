// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracking of live connection tasks.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Opaque handle for one registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(u64);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct ConnHandle {
    peer: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Registry of spawned connection tasks.
///
/// Each task gets a child of the registry's cancellation token. Cleanup of
/// the task's resources happens inside the task when it returns, so joining
/// is all the registry needs to do.
pub struct ConnectionRegistry {
    shutdown: CancellationToken,
    next_id: AtomicU64,
    conns: Mutex<HashMap<ConnId, ConnHandle>>,
}

impl ConnectionRegistry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown, next_id: AtomicU64::new(0), conns: Mutex::new(HashMap::new()) }
    }

    /// Spawn `task` for a newly accepted connection and record it.
    pub fn register<F, Fut>(&self, peer: SocketAddr, task: F) -> ConnId
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = ConnId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(task(cancel.clone()));
        self.conns.lock().insert(id, ConnHandle { peer, cancel, handle });
        debug!(%id, %peer, "registered connection");
        id
    }

    pub fn len(&self) -> usize {
        self.conns.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.lock().is_empty()
    }

    /// Join every task that has already finished, without waiting on the
    /// rest. Returns how many were reaped.
    pub async fn sweep(&self) -> usize {
        let finished: Vec<(ConnId, ConnHandle)> = {
            let mut conns = self.conns.lock();
            let done: Vec<ConnId> =
                conns.iter().filter(|(_, c)| c.handle.is_finished()).map(|(id, _)| *id).collect();
            done.into_iter().filter_map(|id| conns.remove(&id).map(|c| (id, c))).collect()
        };
        let reaped = finished.len();
        for (id, conn) in finished {
            join(id, conn).await;
        }
        reaped
    }

    /// Cancel every task, then wait for each to finish. Tasks still running
    /// after `timeout` are aborted. Returns how many were drained.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let all: Vec<(ConnId, ConnHandle)> = self.conns.lock().drain().collect();
        for (_, conn) in &all {
            conn.cancel.cancel();
        }
        let drained = all.len();
        let deadline = Instant::now() + timeout;
        for (id, mut conn) in all {
            let joined = match tokio::time::timeout_at(deadline, &mut conn.handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(%id, peer = %conn.peer, "connection did not stop within drain timeout, aborting");
                    conn.handle.abort();
                    (&mut conn.handle).await
                }
            };
            log_join(id, conn.peer, joined);
        }
        drained
    }
}

async fn join(id: ConnId, conn: ConnHandle) {
    log_join(id, conn.peer, conn.handle.await);
}

fn log_join(id: ConnId, peer: SocketAddr, joined: Result<(), JoinError>) {
    match joined {
        Ok(()) => debug!(%id, %peer, "connection task joined"),
        Err(e) if e.is_cancelled() => debug!(%id, %peer, "connection task aborted"),
        Err(e) => warn!(%id, %peer, "connection task failed: {e}"),
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
