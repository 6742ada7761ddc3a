// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Error types for connectome evaluation

use thiserror::Error;

/// Errors raised while building, fitting, reducing or lesioning a connectome model.
///
/// Matrix-build and input-validation errors abort a run. `SolverNonConvergence`,
/// `NoEvidence` and `IndexOutOfRange` are reported per fit or per tract and never
/// invalidate unrelated results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifeError {
    #[error("Geometry mismatch: {0}")]
    GeometryMismatch(String),

    #[error(
        "Solver did not converge after {iterations} iterations \
         (projected gradient norm {projected_gradient_norm:e}, residual norm {residual_norm:e})"
    )]
    SolverNonConvergence {
        iterations: usize,
        projected_gradient_norm: f64,
        residual_norm: f64,
    },

    #[error("Fascicle index {index} out of range for connectome of {len} fascicles")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Tract '{0}' traverses no voxel of the signal volume")]
    NoEvidence(String),

    #[error("Array size mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LifeError {
    pub fn dimension(what: &str, expected: usize, actual: usize) -> Self {
        LifeError::DimensionMismatch {
            what: what.to_string(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, LifeError>;
