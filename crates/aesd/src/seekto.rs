// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `AESDCHAR_IOCSEEKTO:X,Y` control commands.
//!
//! A client sends this in place of a log line to move its read cursor to byte
//! `Y` of live command `X` before the log is streamed back.

/// Prefix that marks a seek control command.
pub const SEEKTO_PREFIX: &[u8] = b"AESDCHAR_IOCSEEKTO:";

/// Arguments of the seek-to-command ioctl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekTo {
    pub write_cmd: u32,
    pub write_cmd_offset: u32,
}

impl SeekTo {
    /// Parse a complete command. Returns `None` for ordinary log data.
    pub fn parse(command: &[u8]) -> Option<Self> {
        let args = command.strip_prefix(SEEKTO_PREFIX)?;
        let args = std::str::from_utf8(args).ok()?.trim_end_matches(['\n', '\r']);
        let (cmd, offset) = args.split_once(',')?;
        Some(Self {
            write_cmd: cmd.trim().parse().ok()?,
            write_cmd_offset: offset.trim().parse().ok()?,
        })
    }
}

#[cfg(test)]
#[path = "seekto_tests.rs"]
mod tests;
