// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::assembler::FeedPolicy;
use crate::shared::LockMode;
use crate::store::DEFAULT_DATA_FILE;

/// Where received commands are kept.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// In-memory command ring.
    #[default]
    Ring,
    /// Append-only data file.
    File,
}

impl BackendKind {
    /// Timestamp interval used when none is configured.
    pub fn default_timestamp_interval(&self) -> Option<Duration> {
        match self {
            Self::Ring => None,
            Self::File => Some(Duration::from_secs(10)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ring => f.write_str("ring"),
            Self::File => f.write_str("file"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ring" => Ok(Self::Ring),
            "file" => Ok(Self::File),
            other => anyhow::bail!("invalid backend: {other}"),
        }
    }
}

/// Socket server that logs newline-terminated commands and echoes the log.
#[derive(Debug, Parser)]
#[command(name = "aesdsocket", version, about)]
pub struct Config {
    /// TCP port to listen on.
    #[arg(long, env = "AESD_PORT", default_value = "9000")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "AESD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Detach and run in the background.
    #[arg(short = 'd', long, env = "AESD_DAEMON")]
    pub daemon: bool,

    /// Storage backend (ring, file).
    #[arg(long, env = "AESD_BACKEND", default_value = "ring")]
    pub backend: String,

    /// Number of commands the ring retains.
    #[arg(long, env = "AESD_CAPACITY", default_value = "10")]
    pub capacity: usize,

    /// Ring lock discipline (shared, exclusive).
    #[arg(long, env = "AESD_LOCK_MODE", default_value = "shared")]
    pub lock_mode: String,

    /// Commands completed per received chunk (single, drain).
    #[arg(long, env = "AESD_ASSEMBLY", default_value = "single")]
    pub assembly: String,

    /// Data file for the file backend.
    #[arg(long, env = "AESD_DATA_FILE", default_value = DEFAULT_DATA_FILE)]
    pub data_file: PathBuf,

    /// Seconds between timestamp lines (0 = off). Defaults to 10 for the
    /// file backend and off for the ring.
    #[arg(long, env = "AESD_TIMESTAMP_INTERVAL")]
    pub timestamp_interval: Option<u64>,

    /// Log format (json or text).
    #[arg(long, env = "AESD_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "AESD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Shutdown drain timeout override in ms.
    #[clap(skip)]
    pub drain_timeout_ms: Option<u64>,
}

fn env_duration_ms(var: &str, default: u64) -> Duration {
    let ms = std::env::var(var).ok().and_then(|v| v.parse().ok()).unwrap_or(default);
    Duration::from_millis(ms)
}

macro_rules! duration_field {
    ($method:ident, $field:ident, $env:literal, $default:expr) => {
        pub fn $method(&self) -> Duration {
            match self.$field {
                Some(ms) => Duration::from_millis(ms),
                None => env_duration_ms($env, $default),
            }
        }
    };
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.capacity == 0 {
            anyhow::bail!("--capacity must be at least 1");
        }
        self.backend_kind()?;
        self.lock()?;
        self.feed_policy()?;
        match self.log_format.as_str() {
            "json" | "text" => {}
            other => anyhow::bail!("invalid log format: {other}"),
        }
        Ok(())
    }

    duration_field!(drain_timeout, drain_timeout_ms, "AESD_DRAIN_TIMEOUT_MS", 5_000);

    pub fn backend_kind(&self) -> anyhow::Result<BackendKind> {
        self.backend.parse()
    }

    pub fn lock(&self) -> anyhow::Result<LockMode> {
        self.lock_mode.parse()
    }

    pub fn feed_policy(&self) -> anyhow::Result<FeedPolicy> {
        self.assembly.parse()
    }

    /// Effective timestamp interval; `None` disables timestamps.
    pub fn timestamps(&self) -> anyhow::Result<Option<Duration>> {
        Ok(match self.timestamp_interval {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => self.backend_kind()?.default_timestamp_interval(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Build a minimal `Config` for tests (port 0, ring backend).
    #[doc(hidden)]
    pub fn test() -> Self {
        Self {
            port: 0,
            host: "127.0.0.1".into(),
            daemon: false,
            backend: "ring".into(),
            capacity: 10,
            lock_mode: "shared".into(),
            assembly: "single".into(),
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            timestamp_interval: Some(0),
            log_format: "text".into(),
            log_level: "debug".into(),
            drain_timeout_ms: Some(500),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
