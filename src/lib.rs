// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # LiFE - Linear Fascicle Evaluation
//!
//! Evaluates a candidate connectome against measured diffusion MRI signal:
//! predicts the signal from fascicle geometry, fits one non-negative weight
//! per fascicle, prunes fascicles that do not contribute, and quantifies the
//! evidence for individual tracts with virtual lesions.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! life = "0.1"  # Default: persistence + observability
//! ```
//!
//! ## Feature Flags
//! - **`persistence`** (default): persisted connectome format (bincode + LZ4)
//! - **`observability`** (default): logging initialization and per-crate debug flags
//!
//! ## Usage
//!
//! ```rust,no_run
//! use life::prelude::*;
//!
//! # fn inputs() -> (Connectome, DiffusionVolume, TractClassification) { unimplemented!() }
//! let (connectome, volume, tracts) = inputs();
//!
//! let config = load_config(None, None)?;
//! let pipeline = LifePipeline::from_config(&config)?;
//! let output = pipeline.run(connectome, volume, &tracts)?;
//!
//! for (tract, outcome) in &output.lesions.tracts {
//!     if let Some(result) = outcome.result() {
//!         println!("{}: S = {:.2}", tract, result.statistics.strength_of_evidence);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: life-structures, life-config               │
//! │  (Fascicles, connectome, signal volume, configuration)  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: life-engine                                │
//! │  (Forward model, NNLS fit, reduction, virtual lesion)   │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Edges: life-connectome-serialization,                  │
//! │         life-observability                              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod report;

pub use report::{EvaluationReport, ReductionSummary};

// Re-export foundation
pub use life_config as config;
pub use life_structures as structures;

// Re-export algorithms
pub use life_engine as engine;

#[cfg(feature = "persistence")]
pub use life_connectome_serialization as serialization;

#[cfg(feature = "observability")]
pub use life_observability as observability;

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::structures::{
        Connectome, DiffusionVolume, Fascicle, FascicleSet, FitSummary, GradientTable, LifeError,
        ReferenceFrame, TerminationReason, TractClassification, VoxelGrid,
    };

    pub use crate::config::{load_config, validate_config, ClassificationSpace, LifeConfig};

    pub use crate::engine::{
        ForwardModel, FittedModel, LesionOptions, LesionOutcome, LesionReport, LifePipeline,
        PipelineOptions, PipelineOutput, ReductionMap, SignalModel, SolverOptions,
        TensorResponse, VirtualLesionResult,
    };

    pub use crate::report::EvaluationReport;

    #[cfg(feature = "persistence")]
    pub use crate::serialization::{
        load_connectome, save_connectome, ConnectomeMetadata, ConnectomeSnapshot,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let options = PipelineOptions::default();
        assert_eq!(options.classification_space, ClassificationSpace::Reduced);
        assert!(TractClassification::new().is_empty());
    }
}
