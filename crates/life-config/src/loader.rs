// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, LifeConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const CONFIG_FILE_NAME: &str = "life_configuration.toml";

/// Find the LiFE configuration file
///
/// Search order:
/// 1. `LIFE_CONFIG_PATH` environment variable
/// 2. Current working directory: `./life_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("LIFE_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by LIFE_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "LiFE configuration file '{}' not found in any of these locations:\n{}\n\nSet LIFE_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if the config file is not found, contains invalid TOML, or an
/// override cannot be parsed
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<LifeConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: LifeConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config)?;

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

/// Environment variable -> override key
const ENV_OVERRIDES: &[(&str, &str)] = &[
    ("LIFE_MAX_THREADS", "max_threads"),
    ("LIFE_LOG_LEVEL", "log_level"),
    ("LIFE_OUTPUT_DIR", "output_dir"),
    ("LIFE_SOLVER_MAX_ITERATIONS", "solver_max_iterations"),
    ("LIFE_SOLVER_TOLERANCE", "solver_tolerance"),
    ("LIFE_SOLVER_OBJECTIVE_TOLERANCE", "solver_objective_tolerance"),
    ("LIFE_REQUIRE_CONVERGENCE", "require_convergence"),
    ("LIFE_WEIGHT_THRESHOLD", "weight_threshold"),
    ("LIFE_LESION_SEED", "lesion_seed"),
    ("LIFE_BOOTSTRAP_SAMPLES", "bootstrap_samples"),
    ("LIFE_CLASSIFICATION_SPACE", "classification_space"),
];

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `LIFE_MAX_THREADS` -> `system.max_threads`
/// - `LIFE_LOG_LEVEL` -> `system.log_level`
/// - `LIFE_OUTPUT_DIR` -> `system.output_dir`
/// - `LIFE_SOLVER_MAX_ITERATIONS` -> `solver.max_iterations`
/// - `LIFE_SOLVER_TOLERANCE` -> `solver.projected_gradient_tolerance`
/// - `LIFE_SOLVER_OBJECTIVE_TOLERANCE` -> `solver.objective_tolerance`
/// - `LIFE_REQUIRE_CONVERGENCE` -> `solver.require_convergence`
/// - `LIFE_WEIGHT_THRESHOLD` -> `reduction.weight_threshold`
/// - `LIFE_LESION_SEED` -> `lesion.seed`
/// - `LIFE_BOOTSTRAP_SAMPLES` -> `lesion.bootstrap_samples`
/// - `LIFE_CLASSIFICATION_SPACE` -> `lesion.classification_space`
///
/// # Errors
///
/// `ConfigError::InvalidOverride` when a variable is set to an unparsable value
pub fn apply_environment_overrides(config: &mut LifeConfig) -> ConfigResult<()> {
    for (var, key) in ENV_OVERRIDES {
        if let Ok(value) = env::var(var) {
            apply_override(config, key, &value)?;
        }
    }
    Ok(())
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - Map of override keys (e.g., `{"weight_threshold": "0.001"}`)
///
/// Accepted keys are the second column of the environment table plus
/// `axial_diffusivity`, `radial_diffusivity`, `histogram_bins` and
/// `monte_carlo_repeats`.
///
/// # Errors
///
/// `ConfigError::InvalidOverride` for unknown keys or unparsable values
pub fn apply_cli_overrides(
    config: &mut LifeConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    // Sorted so the first reported error does not depend on hash order
    let mut keys: Vec<_> = cli_args.keys().collect();
    keys.sort();
    for key in keys {
        apply_override(config, key, &cli_args[key])?;
    }
    Ok(())
}

fn apply_override(config: &mut LifeConfig, key: &str, value: &str) -> ConfigResult<()> {
    match key {
        "max_threads" => config.system.max_threads = parse(key, value)?,
        "log_level" => config.system.log_level = value.to_string(),
        "output_dir" => config.system.output_dir = PathBuf::from(value),
        "axial_diffusivity" => config.response.axial_diffusivity = parse(key, value)?,
        "radial_diffusivity" => config.response.radial_diffusivity = parse(key, value)?,
        "solver_max_iterations" => config.solver.max_iterations = parse(key, value)?,
        "solver_tolerance" => config.solver.projected_gradient_tolerance = parse(key, value)?,
        "solver_objective_tolerance" => config.solver.objective_tolerance = parse(key, value)?,
        "require_convergence" => config.solver.require_convergence = parse_bool(value),
        "record_history" => config.solver.record_history = parse_bool(value),
        "weight_threshold" => config.reduction.weight_threshold = parse(key, value)?,
        "lesion_seed" => config.lesion.seed = parse(key, value)?,
        "bootstrap_samples" => config.lesion.bootstrap_samples = parse(key, value)?,
        "monte_carlo_repeats" => config.lesion.monte_carlo_repeats = parse(key, value)?,
        "histogram_bins" => config.lesion.histogram_bins = parse(key, value)?,
        "classification_space" => config.lesion.classification_space = parse(key, value)?,
        _ => {
            return Err(ConfigError::InvalidOverride {
                key: key.to_string(),
                value: value.to_string(),
                reason: "unknown configuration key".to_string(),
            })
        }
    }
    Ok(())
}

fn parse<T>(key: &str, value: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| ConfigError::InvalidOverride {
        key: key.to_string(),
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes"
}
