// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod assembler;
pub mod config;
pub mod device;
pub mod error;
pub mod registry;
pub mod ring;
pub mod seekto;
pub mod server;
pub mod shared;
pub mod store;
pub mod test_support;
pub mod timestamp;
