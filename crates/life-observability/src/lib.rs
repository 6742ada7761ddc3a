// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # life-observability
//!
//! Logging infrastructure shared by the LiFE crates and tools.
//!
//! Provides consistent logging across all LiFE crates with per-crate debug
//! flag support (`--debug-life-engine`, `LIFE_DEBUG=life-engine`).
//!
//! ## Features
//! - `file-logging`: JSON log files in timestamped run folders with retention

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

// Re-export commonly used items
pub use cli::*;
pub use config::*;
pub use init::*;

/// Known LiFE crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "life",
    "life-config",
    "life-structures",
    "life-engine",
    "life-connectome-serialization",
];
