// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # LiFE Evaluation Engine
//!
//! Linear fascicle evaluation of a candidate connectome against measured
//! diffusion signal.
//!
//! ## Stages
//! - **Forward model**: sparse matrix predicting the demeaned signal of every
//!   voxel and direction from unit-weight fascicles
//! - **Fit**: projected-gradient non-negative least squares
//! - **Reduce**: keep fascicles with non-zero contribution
//! - **Virtual lesion**: evidence a tract contributes to the fit
//!
//! ## Architecture
//! - Immutable stage values sharing components through `Arc`
//! - Rayon for per-fascicle construction, sparse products and per-tract
//!   evaluation
//! - No locks and no I/O

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod forward;
pub mod lesion;
pub mod model;
pub mod pipeline;
pub mod reduce;
pub mod response;
pub mod signal;
pub mod solver;
pub mod sparse;

pub use forward::{build_forward_matrix, ForwardModel};
pub use lesion::{
    earth_movers_distance, evaluate_reduced_tract, evaluate_reduced_tracts, evaluate_tract,
    evaluate_tracts, EvidenceStatistics, LesionOptions, LesionOutcome, LesionReport,
    VirtualLesionResult,
};
pub use model::{fit_summary, FittedModel, ModelStage};
pub use pipeline::{LifePipeline, PipelineOptions, PipelineOutput, PipelineProfile};
pub use reduce::{
    reduce_by, reduce_by_threshold, ReductionMap, RemappedClassification, RemappedTract,
};
pub use response::{ResponseKernel, TensorResponse};
pub use signal::SignalModel;
pub use solver::{solve_nnls, FitResult, SolverOptions};
pub use sparse::{ForwardMatrix, SparseColumn};
