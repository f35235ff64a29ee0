// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `aesdsocket` binary as a subprocess and talks to it over
//! plain TCP.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Resolve the path to the compiled `aesdsocket` binary.
pub fn aesdsocket_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("aesdsocket")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `aesdsocket` process that is killed on drop.
pub struct AesdProcess {
    child: Child,
    port: u16,
    data_file: PathBuf,
    _data_dir: tempfile::TempDir,
}

/// Builder for the command line of an [`AesdProcess`].
#[derive(Default)]
pub struct AesdBuilder {
    file_backend: bool,
    capacity: Option<usize>,
    extra: Vec<String>,
}

impl AesdBuilder {
    /// Use the file backend with a data file in a fresh temp dir.
    pub fn file_backend(mut self) -> Self {
        self.file_backend = true;
        self
    }

    /// Set `--capacity`.
    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = Some(n);
        self
    }

    /// Append raw arguments.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.extra.push(arg.into());
        self
    }

    pub fn spawn(self) -> anyhow::Result<AesdProcess> {
        let binary = aesdsocket_binary();
        anyhow::ensure!(binary.exists(), "aesdsocket binary not found at {}", binary.display());

        let port = free_port()?;
        let data_dir = tempfile::tempdir()?;
        let data_file = data_dir.path().join("aesdsocketdata");

        let mut args: Vec<String> = vec![
            "--port".into(),
            port.to_string(),
            "--host".into(),
            "127.0.0.1".into(),
            "--data-file".into(),
            data_file.to_string_lossy().into_owned(),
            "--log-level".into(),
            "warn".into(),
        ];
        if self.file_backend {
            args.extend(["--backend".into(), "file".into()]);
        }
        if let Some(n) = self.capacity {
            args.extend(["--capacity".into(), n.to_string()]);
        }
        args.extend(self.extra);

        let child = Command::new(&binary)
            .args(&args)
            .env("AESD_DRAIN_TIMEOUT_MS", "2000")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(AesdProcess { child, port, data_file, _data_dir: data_dir })
    }
}

impl AesdProcess {
    pub fn build() -> AesdBuilder {
        AesdBuilder::default()
    }

    /// Spawn with the default ring backend.
    pub fn start() -> anyhow::Result<Self> {
        Self::build().spawn()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn data_file(&self) -> &Path {
        &self.data_file
    }

    /// Poll until the port accepts connections.
    pub async fn wait_listening(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("aesdsocket did not start listening within {timeout:?}");
            }
            // A bare connect-and-close sends no command.
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port)).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Send `payload`, half-close, and collect the response.
    pub async fn send(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", self.port)).await?;
        stream.write_all(payload).await?;
        stream.shutdown().await?;
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await?;
        Ok(response)
    }

    /// Deliver `signal` to the process.
    pub fn signal(&self, signal: Signal) -> anyhow::Result<()> {
        let pid = i32::try_from(self.child.id())?;
        kill(Pid::from_raw(pid), signal)?;
        Ok(())
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("aesdsocket did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for AesdProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
