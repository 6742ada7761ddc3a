// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Fitted model: an immutable snapshot of connectome, matrix and weights
//!
//! Run state advances `BuiltMatrix → Fitted → [Reduced]`; each stage is a new
//! value sharing the unchanged parts through `Arc`. Lesion evaluation only
//! reads a fitted model, so it can be repeated for any number of tracts.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use life_structures::{Connectome, FitSummary, Result};

use crate::response::TensorResponse;
use crate::signal::SignalModel;
use crate::solver::FitResult;
use crate::sparse::ForwardMatrix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStage {
    Fitted,
    Reduced,
}

#[derive(Debug, Clone)]
pub struct FittedModel {
    stage: ModelStage,
    connectome: Arc<Connectome>,
    signal: Arc<SignalModel>,
    response: TensorResponse,
    matrix: Arc<ForwardMatrix>,
    fit: Arc<FitResult>,
    summary: FitSummary,
}

impl FittedModel {
    pub(crate) fn fitted(
        connectome: Arc<Connectome>,
        signal: Arc<SignalModel>,
        response: TensorResponse,
        matrix: Arc<ForwardMatrix>,
        fit: Arc<FitResult>,
    ) -> Result<Self> {
        Self::assemble(ModelStage::Fitted, connectome, signal, response, matrix, fit)
    }

    pub(crate) fn reduced(
        connectome: Arc<Connectome>,
        signal: Arc<SignalModel>,
        response: TensorResponse,
        matrix: Arc<ForwardMatrix>,
        fit: Arc<FitResult>,
    ) -> Result<Self> {
        Self::assemble(ModelStage::Reduced, connectome, signal, response, matrix, fit)
    }

    fn assemble(
        stage: ModelStage,
        connectome: Arc<Connectome>,
        signal: Arc<SignalModel>,
        response: TensorResponse,
        matrix: Arc<ForwardMatrix>,
        fit: Arc<FitResult>,
    ) -> Result<Self> {
        let weights = connectome.weights().unwrap_or(&[]);
        let prediction = matrix.mul_vec(weights)?;
        let summary = fit_summary(&prediction, signal.observation(), &fit);
        Ok(Self {
            stage,
            connectome,
            signal,
            response,
            matrix,
            fit,
            summary,
        })
    }

    pub fn stage(&self) -> ModelStage {
        self.stage
    }

    /// Weighted connectome; fascicle `i` is matrix column `i`
    pub fn connectome(&self) -> &Arc<Connectome> {
        &self.connectome
    }

    pub fn signal(&self) -> &Arc<SignalModel> {
        &self.signal
    }

    pub fn response(&self) -> &TensorResponse {
        &self.response
    }

    pub fn matrix(&self) -> &Arc<ForwardMatrix> {
        &self.matrix
    }

    pub fn weights(&self) -> &[f64] {
        self.connectome.weights().unwrap_or(&[])
    }

    pub fn n_fascicles(&self) -> usize {
        self.matrix.n_cols()
    }

    /// Solver diagnostics of the fit this model descends from
    pub fn fit(&self) -> &FitResult {
        &self.fit
    }

    pub(crate) fn shared_fit(&self) -> Arc<FitResult> {
        Arc::clone(&self.fit)
    }

    /// Fit quality of this model's own weights and matrix
    pub fn summary(&self) -> &FitSummary {
        &self.summary
    }

    /// Predicted demeaned signal `M w`
    ///
    /// # Errors
    /// Never in practice; the weight length is fixed at construction.
    pub fn prediction(&self) -> Result<Vec<f64>> {
        self.matrix.mul_vec(self.weights())
    }
}

/// Global RMSE and variance explained of `prediction` against `observation`
pub fn fit_summary(prediction: &[f64], observation: &[f64], fit: &FitResult) -> FitSummary {
    let mut sse = 0.0;
    let mut sst = 0.0;
    for (p, y) in prediction.iter().zip(observation) {
        sse += (y - p) * (y - p);
        sst += y * y;
    }
    let n = observation.len().max(1) as f64;
    FitSummary {
        converged: fit.converged,
        termination: fit.termination,
        iterations: fit.iterations,
        residual_norm: sse.sqrt(),
        variance_explained: variance_explained(sse, sst),
        rmse: (sse / n).sqrt(),
    }
}

/// `1 − SSE / SST`; 0 when the observation carries no variance
pub(crate) fn variance_explained(sse: f64, sst: f64) -> f64 {
    if sst > 0.0 {
        1.0 - sse / sst
    } else {
        0.0
    }
}
