// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent and within valid ranges before any evaluation starts.

use crate::{ConfigError, ConfigResult, LifeConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required fields
/// - Valid value ranges
///
/// All problems are collected before reporting.
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &LifeConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_response(config, &mut errors);
    validate_solver(config, &mut errors);
    validate_lesion(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn invalid(errors: &mut Vec<ConfigValidationError>, field: &str, reason: impl Into<String>) {
    errors.push(ConfigValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    });
}

fn validate_required_fields(config: &LifeConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.persistence.connectome_file.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "persistence.connectome_file".to_string(),
        });
    }
    if config.persistence.results_file.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "persistence.results_file".to_string(),
        });
    }
    if config.system.log_level.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "system.log_level".to_string(),
        });
    }
}

fn validate_response(config: &LifeConfig, errors: &mut Vec<ConfigValidationError>) {
    let r = &config.response;
    if !r.axial_diffusivity.is_finite() || r.axial_diffusivity < 0.0 {
        invalid(errors, "response.axial_diffusivity", "must be finite and >= 0");
    }
    if !r.radial_diffusivity.is_finite() || r.radial_diffusivity < 0.0 {
        invalid(errors, "response.radial_diffusivity", "must be finite and >= 0");
    }
    if r.axial_diffusivity == 0.0 && r.radial_diffusivity == 0.0 {
        invalid(errors, "response", "axial and radial diffusivity cannot both be zero");
    }
    if !r.bvalue_scale.is_finite() || r.bvalue_scale <= 0.0 {
        invalid(errors, "response.bvalue_scale", "must be finite and > 0");
    }
}

fn validate_solver(config: &LifeConfig, errors: &mut Vec<ConfigValidationError>) {
    let s = &config.solver;
    if s.max_iterations == 0 {
        invalid(errors, "solver.max_iterations", "must be at least 1");
    }
    if !(s.projected_gradient_tolerance.is_finite() && s.projected_gradient_tolerance > 0.0) {
        invalid(errors, "solver.projected_gradient_tolerance", "must be > 0");
    }
    if !(s.objective_tolerance.is_finite() && s.objective_tolerance >= 0.0) {
        invalid(errors, "solver.objective_tolerance", "must be >= 0");
    }
    if !(s.armijo_sufficient_decrease > 0.0 && s.armijo_sufficient_decrease < 1.0) {
        invalid(
            errors,
            "solver.armijo_sufficient_decrease",
            format!("{} is outside (0, 1)", s.armijo_sufficient_decrease),
        );
    }
    if !(s.backtrack_factor > 0.0 && s.backtrack_factor < 1.0) {
        invalid(
            errors,
            "solver.backtrack_factor",
            format!("{} is outside (0, 1)", s.backtrack_factor),
        );
    }
}

fn validate_lesion(config: &LifeConfig, errors: &mut Vec<ConfigValidationError>) {
    let l = &config.lesion;
    if l.bootstrap_samples == 0 {
        invalid(errors, "lesion.bootstrap_samples", "must be at least 1");
    }
    if l.monte_carlo_repeats == 0 {
        invalid(errors, "lesion.monte_carlo_repeats", "must be at least 1");
    }
    if l.histogram_bins < 2 {
        invalid(errors, "lesion.histogram_bins", "must be at least 2");
    }
    if !config.reduction.weight_threshold.is_finite() || config.reduction.weight_threshold < 0.0 {
        invalid(errors, "reduction.weight_threshold", "must be finite and >= 0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LifeConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_backtrack_factor() {
        let mut config = LifeConfig::default();
        config.solver.backtrack_factor = 1.5;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("solver.backtrack_factor"));
    }

    #[test]
    fn test_missing_required_field() {
        let mut config = LifeConfig::default();
        config.persistence.results_file = String::new();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("persistence.results_file"));
    }

    #[test]
    fn test_all_errors_reported() {
        let mut config = LifeConfig::default();
        config.solver.max_iterations = 0;
        config.lesion.bootstrap_samples = 0;
        config.response.radial_diffusivity = -1.0;

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("solver.max_iterations"));
        assert!(err.contains("lesion.bootstrap_samples"));
        assert!(err.contains("response.radial_diffusivity"));
    }
}
