// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use aesd::config::{BackendKind, Config};
use aesd::device::CommandDevice;
use aesd::server::Server;
use aesd::store::{CommandStore, FileStore, RingStore};

fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    // Fork before any runtime threads exist.
    if config.daemon {
        if let Err(e) = nix::unistd::daemon(false, false) {
            error!("failed to daemonize: {e}");
            std::process::exit(1);
        }
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    match config.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).init();
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    // Spawn signal handler
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let mut sigint =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

            tokio::select! {
                _ = async {
                    if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
                } => {}
                _ = async {
                    if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
                } => {}
            }
            info!("Caught signal, exiting");
            sd.cancel();
        });
    }

    let backend = config.backend_kind()?;
    let store: Arc<dyn CommandStore> = match backend {
        BackendKind::Ring => {
            Arc::new(RingStore::new(CommandDevice::new(config.capacity, config.lock()?)))
        }
        BackendKind::File => Arc::new(FileStore::open(&config.data_file).await?),
    };
    info!(%backend, capacity = config.capacity, "command store ready");

    let timestamps = config
        .timestamps()?
        .map(|interval| aesd::timestamp::spawn(Arc::clone(&store), interval, shutdown.clone()));

    let addr = tokio::net::lookup_host(config.bind_addr())
        .await?
        .next()
        .with_context(|| format!("no address for {}", config.bind_addr()))?;
    let server = Server::bind(addr, store, config.feed_policy()?, shutdown.clone())
        .await
        .with_context(|| format!("failed to bind {addr}"))?
        .with_drain_timeout(config.drain_timeout());

    let result = server.run().await;

    if let Some(handle) = timestamps {
        shutdown.cancel();
        if tokio::time::timeout(config.drain_timeout(), handle).await.is_err() {
            warn!("timestamp task did not stop within drain timeout");
        }
    }
    result
}
