// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # LiFE Core Data Structures
//!
//! Plain data types shared by every stage of connectome evaluation:
//! - **Spatial**: reference frames and voxel coordinates
//! - **Fascicles**: candidate fiber pathways as 3D polylines
//! - **Connectome**: ordered fascicles plus their fitted weights
//! - **Signal**: diffusion-weighted volume with gradient table, mask and b0
//! - **Classification**: tract name to fascicle index sets
//! - **Fit**: persisted solver diagnostics
//!
//! These types carry no algorithms beyond validation. The forward model,
//! solver, reducer and virtual lesion live in `life-engine`.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod classification;
pub mod connectome;
pub mod error;
pub mod fascicle;
pub mod fit;
pub mod signal;
pub mod spatial;

pub use classification::TractClassification;
pub use connectome::Connectome;
pub use error::{LifeError, Result};
pub use fascicle::{Fascicle, FascicleSet};
pub use fit::{FitSummary, TerminationReason};
pub use signal::{DiffusionVolume, GradientTable, VoxelGrid};
pub use spatial::{ReferenceFrame, VoxelCoord};
