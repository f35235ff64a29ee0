// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `aesdsocket` binary.

use std::time::Duration;

use nix::sys::signal::Signal;

use aesd::seekto::SEEKTO_PREFIX;
use aesd_specs::AesdProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

fn seek_command(cmd: u32, offset: u32) -> Vec<u8> {
    let mut line = SEEKTO_PREFIX.to_vec();
    line.extend_from_slice(format!("{cmd},{offset}\n").as_bytes());
    line
}

#[tokio::test]
async fn ring_round_trip() -> anyhow::Result<()> {
    let aesd = AesdProcess::start()?;
    aesd.wait_listening(TIMEOUT).await?;

    assert_eq!(aesd.send(b"swrite1\n").await?, b"swrite1\n");
    assert_eq!(aesd.send(b"write2\n").await?, b"swrite1\nwrite2\n");
    assert_eq!(aesd.send(&seek_command(1, 2)).await?, b"ite2\n");
    Ok(())
}

#[tokio::test]
async fn ring_keeps_last_capacity_commands() -> anyhow::Result<()> {
    let aesd = AesdProcess::build().capacity(2).spawn()?;
    aesd.wait_listening(TIMEOUT).await?;

    for line in [&b"a\n"[..], b"b\n", b"c\n"] {
        aesd.send(line).await?;
    }
    assert_eq!(aesd.send(&seek_command(0, 0)).await?, b"b\nc\n");
    Ok(())
}

#[tokio::test]
async fn file_backend_removes_data_on_sigterm() -> anyhow::Result<()> {
    let mut aesd = AesdProcess::build().file_backend().arg("--timestamp-interval").arg("0").spawn()?;
    aesd.wait_listening(TIMEOUT).await?;

    assert_eq!(aesd.send(b"hello\n").await?, b"hello\n");
    assert!(aesd.data_file().exists());

    aesd.signal(Signal::SIGTERM)?;
    let status = aesd.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status}");
    assert!(!aesd.data_file().exists());
    Ok(())
}

#[tokio::test]
async fn sigint_exits_cleanly() -> anyhow::Result<()> {
    let mut aesd = AesdProcess::start()?;
    aesd.wait_listening(TIMEOUT).await?;

    aesd.signal(Signal::SIGINT)?;
    let status = aesd.wait_exit(TIMEOUT).await?;
    assert!(status.success(), "exit status: {status}");
    Ok(())
}

#[tokio::test]
async fn invalid_config_exits_2() -> anyhow::Result<()> {
    let mut aesd = AesdProcess::build().capacity(0).spawn()?;
    let status = aesd.wait_exit(TIMEOUT).await?;
    assert_eq!(status.code(), Some(2));
    Ok(())
}
