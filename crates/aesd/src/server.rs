// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP front end: accept loop and per-connection command handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assembler::{CommandAssembler, FeedPolicy};
use crate::error::RingError;
use crate::registry::ConnectionRegistry;
use crate::store::CommandStore;

const READ_CHUNK: usize = 1024;
const LISTEN_BACKLOG: u32 = 10;
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listening socket plus the state every connection shares.
pub struct Server {
    listener: TcpListener,
    store: Arc<dyn CommandStore>,
    policy: FeedPolicy,
    shutdown: CancellationToken,
    registry: ConnectionRegistry,
    drain_timeout: Duration,
}

impl Server {
    /// Bind `addr` with `SO_REUSEADDR` set.
    pub async fn bind(
        addr: SocketAddr,
        store: Arc<dyn CommandStore>,
        policy: FeedPolicy,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let socket = if addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        let registry = ConnectionRegistry::new(shutdown.clone());
        Ok(Self {
            listener,
            store,
            policy,
            shutdown,
            registry,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// How long shutdown waits for connections before aborting them.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown, then drain them and close the store.
    pub async fn run(self) -> anyhow::Result<()> {
        info!("listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                },
            };
            let reaped = self.registry.sweep().await;
            if reaped > 0 {
                debug!(reaped, "reaped finished connections");
            }
            let store = Arc::clone(&self.store);
            let policy = self.policy;
            self.registry
                .register(peer, move |cancel| handle_connection(stream, peer, store, policy, cancel));
        }

        let drained = self.registry.drain(self.drain_timeout).await;
        debug!(drained, "connections drained");
        self.store.close().await
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<dyn CommandStore>,
    policy: FeedPolicy,
    cancel: CancellationToken,
) {
    info!("Accepted connection from {}", peer.ip());
    let (mut reader, mut writer) = stream.into_split();
    if let Err(e) =
        serve_connection(&mut reader, &mut writer, store.as_ref(), policy, &cancel).await
    {
        error!(%peer, "connection error: {e:#}");
    }
    info!("Closed connection from {}", peer.ip());
}

/// Feed everything read from `reader` through a fresh assembler and answer
/// each completed command on `writer`.
pub async fn serve_connection<R, W>(
    reader: &mut R,
    writer: &mut W,
    store: &dyn CommandStore,
    policy: FeedPolicy,
    cancel: &CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut assembler = CommandAssembler::new(policy);
    let mut buf = vec![0u8; READ_CHUNK];
    'conn: loop {
        let n = tokio::select! {
            _ = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read?,
        };
        if n == 0 {
            break;
        }
        for command in assembler.feed(&buf[..n])? {
            let position = match store.apply(command, cancel).await {
                Ok(position) => position,
                Err(e) if is_interrupted(&e) => break 'conn,
                Err(e) if is_invalid_argument(&e) => {
                    warn!("ignoring command: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match store.stream_from(position, &mut *writer, cancel).await {
                Ok(_) => {}
                Err(e) if is_interrupted(&e) => break 'conn,
                Err(e) => return Err(e),
            }
        }
    }
    let discarded = assembler.discard();
    if discarded > 0 {
        debug!(discarded, "discarded partial command");
    }
    if !cancel.is_cancelled() {
        writer.shutdown().await.ok();
    }
    Ok(())
}

fn is_interrupted(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<RingError>(), Some(RingError::Interrupted))
}

fn is_invalid_argument(e: &anyhow::Error) -> bool {
    e.downcast_ref::<RingError>().is_some_and(RingError::is_invalid_argument)
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
