// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Fit diagnostics that outlive the solver (persisted with the connectome and
//! written into result reports)

use serde::{Deserialize, Serialize};

/// Why the solver stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Projected-gradient norm fell below tolerance
    ProjectedGradient,
    /// Relative objective change fell below tolerance
    ObjectiveStalled,
    /// Iteration cap reached before either tolerance
    MaxIterations,
    /// Backtracking could not find a decreasing step
    LineSearchStalled,
}

impl TerminationReason {
    pub fn is_converged(self) -> bool {
        matches!(
            self,
            TerminationReason::ProjectedGradient | TerminationReason::ObjectiveStalled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitSummary {
    pub converged: bool,
    pub termination: TerminationReason,
    pub iterations: usize,
    /// ‖M w − y‖₂
    pub residual_norm: f64,
    /// Global variance explained of the demeaned signal
    pub variance_explained: f64,
    /// Root mean square error per measurement
    pub rmse: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converged_reasons() {
        assert!(TerminationReason::ProjectedGradient.is_converged());
        assert!(TerminationReason::ObjectiveStalled.is_converged());
        assert!(!TerminationReason::MaxIterations.is_converged());
        assert!(!TerminationReason::LineSearchStalled.is_converged());
    }
}
