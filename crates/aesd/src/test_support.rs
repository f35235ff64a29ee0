// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: server harness and assertion helpers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::assembler::FeedPolicy;
use crate::server::Server;
use crate::store::CommandStore;

/// Bind a [`Server`] on an ephemeral loopback port and run it in the
/// background. Cancel the returned token to stop it.
pub async fn spawn_server(
    store: Arc<dyn CommandStore>,
    policy: FeedPolicy,
) -> anyhow::Result<(SocketAddr, CancellationToken, JoinHandle<anyhow::Result<()>>)> {
    let shutdown = CancellationToken::new();
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let server = Server::bind(addr, store, policy, shutdown.clone()).await?;
    let addr = server.local_addr()?;
    let handle = tokio::spawn(server.run());
    Ok((addr, shutdown, handle))
}

/// Connect, send `payload`, half-close, and return everything the server
/// wrote before closing.
pub async fn send_command(addr: SocketAddr, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    stream.shutdown().await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
