// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! End-to-end evaluation: build → fit → reduce → virtual lesions
//!
//! Every stage runs inside a dedicated rayon pool sized by
//! `system.max_threads`. The pipeline returns all intermediate models so
//! callers can persist or re-lesion them without re-fitting.
//!
//! Tract classifications always address the candidate connectome passed to
//! [`LifePipeline::run`]. With `ClassificationSpace::Reduced` they are
//! translated through the run's [`ReductionMap`] before lesioning the reduced
//! model; with `ClassificationSpace::Candidate` the fitted model is lesioned
//! directly.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn};

use life_config::{ClassificationSpace, LifeConfig};
use life_structures::{Connectome, DiffusionVolume, LifeError, Result, TractClassification};

use crate::forward::ForwardModel;
use crate::lesion::{evaluate_reduced_tracts, evaluate_tracts, LesionOptions, LesionReport};
use crate::model::FittedModel;
use crate::reduce::{reduce_by_threshold, ReductionMap};
use crate::response::TensorResponse;
use crate::signal::SignalModel;
use crate::solver::SolverOptions;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub response: TensorResponse,
    pub solver: SolverOptions,
    /// Abort with `SolverNonConvergence` instead of continuing best effort
    pub require_convergence: bool,
    pub weight_threshold: f64,
    pub lesion: LesionOptions,
    pub classification_space: ClassificationSpace,
    /// 0 = rayon default
    pub max_threads: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            response: TensorResponse::default(),
            solver: SolverOptions::default(),
            require_convergence: false,
            weight_threshold: 0.0,
            lesion: LesionOptions::default(),
            classification_space: ClassificationSpace::Reduced,
            max_threads: 0,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &LifeConfig) -> Self {
        Self {
            response: TensorResponse::from_config(&config.response),
            solver: SolverOptions::from_config(&config.solver),
            require_convergence: config.solver.require_convergence,
            weight_threshold: config.reduction.weight_threshold,
            lesion: LesionOptions::from_config(&config.lesion),
            classification_space: config.lesion.classification_space,
            max_threads: config.system.max_threads,
        }
    }
}

/// Wall-clock profile of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineProfile {
    pub build_ms: f64,
    pub fit_ms: f64,
    pub reduce_ms: f64,
    pub lesion_ms: f64,
    pub total_ms: f64,
    pub rayon_threads: usize,
    pub candidate_fascicles: usize,
    pub kept_fascicles: usize,
    pub matrix_nnz: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub forward: ForwardModel,
    pub fitted: FittedModel,
    pub reduced: FittedModel,
    pub reduction: ReductionMap,
    pub lesions: LesionReport,
    pub profile: PipelineProfile,
}

pub struct LifePipeline {
    options: PipelineOptions,
    pool: rayon::ThreadPool,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl LifePipeline {
    /// # Errors
    /// `InvalidInput` if the worker pool cannot be created.
    pub fn new(options: PipelineOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.max_threads)
            .thread_name(|i| format!("life-worker-{}", i))
            .build()
            .map_err(|e| LifeError::InvalidInput(format!("failed to create worker pool: {}", e)))?;
        Ok(Self { options, pool })
    }

    /// # Errors
    /// See [`LifePipeline::new`].
    pub fn from_config(config: &LifeConfig) -> Result<Self> {
        Self::new(PipelineOptions::from_config(config))
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run the whole evaluation. `classification` indexes `connectome`.
    ///
    /// # Errors
    /// Input validation, geometry and (with `require_convergence`) solver
    /// failures abort the run. Per-tract failures are kept in the report.
    pub fn run(
        &self,
        connectome: Connectome,
        volume: DiffusionVolume,
        classification: &TractClassification,
    ) -> Result<PipelineOutput> {
        self.pool
            .install(|| self.run_stages(connectome, volume, classification))
    }

    fn run_stages(
        &self,
        connectome: Connectome,
        volume: DiffusionVolume,
        classification: &TractClassification,
    ) -> Result<PipelineOutput> {
        let total_start = Instant::now();
        let mut profile = PipelineProfile {
            rayon_threads: rayon::current_num_threads(),
            candidate_fascicles: connectome.len(),
            ..PipelineProfile::default()
        };

        let forward = {
            let _span = info_span!("build").entered();
            let start = Instant::now();
            let signal = Arc::new(SignalModel::new(volume)?);
            let forward = ForwardModel::build(Arc::new(connectome), signal, self.options.response)?;
            profile.build_ms = elapsed_ms(start);
            profile.matrix_nnz = forward.matrix().nnz();
            info!(
                fascicles = forward.n_fascicles(),
                voxels = forward.signal().n_voxels(),
                directions = forward.signal().n_directions(),
                nnz = profile.matrix_nnz,
                ms = profile.build_ms,
                "Forward model built"
            );
            forward
        };

        let fitted = {
            let _span = info_span!("fit").entered();
            let start = Instant::now();
            let fitted = forward.fit(&self.options.solver)?;
            profile.fit_ms = elapsed_ms(start);
            let fit = fitted.fit();
            if self.options.require_convergence {
                fit.ensure_converged()?;
            } else if !fit.converged {
                warn!(
                    iterations = fit.iterations,
                    termination = ?fit.termination,
                    "Continuing with non-converged fit"
                );
            }
            info!(
                iterations = fit.iterations,
                converged = fit.converged,
                residual_norm = fit.residual_norm,
                variance_explained = fitted.summary().variance_explained,
                ms = profile.fit_ms,
                "Weights fitted"
            );
            fitted
        };

        let (reduced, reduction) = {
            let _span = info_span!("reduce").entered();
            let start = Instant::now();
            let out = reduce_by_threshold(&fitted, self.options.weight_threshold)?;
            profile.reduce_ms = elapsed_ms(start);
            profile.kept_fascicles = out.1.reduced_len();
            out
        };

        let lesions = {
            let _span = info_span!("lesion").entered();
            let start = Instant::now();
            let report = match self.options.classification_space {
                ClassificationSpace::Reduced => evaluate_reduced_tracts(
                    &fitted,
                    &reduced,
                    &reduction,
                    classification,
                    &self.options.lesion,
                ),
                ClassificationSpace::Candidate => {
                    evaluate_tracts(&fitted, classification, &self.options.lesion)
                }
            };
            profile.lesion_ms = elapsed_ms(start);
            info!(
                tracts = report.len(),
                evaluated = report.evaluated_count(),
                no_evidence = report.no_evidence_count(),
                failed = report.failed_count(),
                space = ?self.options.classification_space,
                ms = profile.lesion_ms,
                "Virtual lesions evaluated"
            );
            report
        };

        profile.total_ms = elapsed_ms(total_start);

        Ok(PipelineOutput {
            forward,
            fitted,
            reduced,
            reduction,
            lesions,
            profile,
        })
    }
}
