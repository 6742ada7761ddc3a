// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `life_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LifeConfig {
    pub system: SystemConfig,
    pub response: ResponseConfig,
    pub solver: SolverConfig,
    pub reduction: ReductionConfig,
    pub lesion: LesionConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// System-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Worker threads for the evaluation pool (0 = rayon default)
    pub max_threads: usize,
    pub log_level: String,
    pub output_dir: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_threads: 0,
            log_level: "info".to_string(),
            output_dir: PathBuf::from("./life_output"),
        }
    }
}

/// Tensor response model used to predict a fascicle's signal
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Diffusivity along the fascicle (µm²/ms)
    pub axial_diffusivity: f64,
    /// Diffusivity across the fascicle (µm²/ms)
    pub radial_diffusivity: f64,
    /// Multiplier converting gradient-table b-values to ms/µm²
    pub bvalue_scale: f64,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            axial_diffusivity: 1.0,
            radial_diffusivity: 0.0,
            bvalue_scale: 1e-3,
        }
    }
}

/// Projected-gradient NNLS solver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Hard iteration cap; reaching it marks the fit as not converged
    pub max_iterations: usize,
    /// Stop when ‖projected gradient‖ <= tolerance × initial ‖projected gradient‖
    pub projected_gradient_tolerance: f64,
    /// Stop when the relative objective decrease of one iteration falls below this
    pub objective_tolerance: f64,
    /// Armijo sufficient-decrease constant
    pub armijo_sufficient_decrease: f64,
    /// Step shrink factor per backtrack
    pub backtrack_factor: f64,
    pub max_backtracks: usize,
    /// Keep the per-iteration objective trace in the fit result
    pub record_history: bool,
    /// Abort the pipeline when the solver does not converge
    pub require_convergence: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            projected_gradient_tolerance: 1e-6,
            objective_tolerance: 1e-10,
            armijo_sufficient_decrease: 1e-4,
            backtrack_factor: 0.5,
            max_backtracks: 40,
            record_history: false,
            require_convergence: false,
        }
    }
}

/// Connectome reduction settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReductionConfig {
    /// Fascicles with weight strictly greater than this are kept
    pub weight_threshold: f64,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            weight_threshold: 0.0,
        }
    }
}

/// Which model tract lesions are evaluated against. Classification indices
/// always address the candidate connectome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSpace {
    /// Indices are translated through the reduction; lesions use the reduced
    /// model
    Reduced,
    /// Lesions use the fitted, unreduced model
    Candidate,
}

impl std::str::FromStr for ClassificationSpace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reduced" => Ok(ClassificationSpace::Reduced),
            "candidate" => Ok(ClassificationSpace::Candidate),
            other => Err(format!("unknown classification space '{}'", other)),
        }
    }
}

/// Virtual lesion statistics settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LesionConfig {
    /// Bootstrap resamples per Monte Carlo repeat
    pub bootstrap_samples: usize,
    pub monte_carlo_repeats: usize,
    /// Bins for the KL / Jeffreys histograms
    pub histogram_bins: usize,
    /// Seed of the bootstrap generator
    pub seed: u64,
    pub classification_space: ClassificationSpace,
}

impl Default for LesionConfig {
    fn default() -> Self {
        Self {
            bootstrap_samples: 5000,
            monte_carlo_repeats: 5,
            histogram_bins: 100,
            seed: 0x11FE,
            classification_space: ClassificationSpace::Reduced,
        }
    }
}

/// Output files
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Reduced connectome, relative to `system.output_dir`
    pub connectome_file: String,
    /// Virtual lesion report (JSON), relative to `system.output_dir`
    pub results_file: String,
    pub compression: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            connectome_file: "reduced.lifec".to_string(),
            results_file: "virtual_lesions.json".to_string(),
            compression: true,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file_logging: bool,
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file_logging: false,
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}

impl LifeConfig {
    pub fn connectome_path(&self) -> PathBuf {
        self.system.output_dir.join(&self.persistence.connectome_file)
    }

    pub fn results_path(&self) -> PathBuf {
        self.system.output_dir.join(&self.persistence.results_file)
    }
}
