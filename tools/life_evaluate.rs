// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

/*!
Connectome Evaluation Tool

Fits a candidate connectome to a diffusion volume, writes the reduced
connectome and a JSON report of per-tract virtual lesion evidence.

Usage:
  cargo run --release --bin life_evaluate -- \
      --volume dwi.json --fascicles candidate.json --classification tracts.json \
      [--config life_configuration.toml] [--output-dir out/] \
      [--set weight_threshold=0.001] [--debug-life-engine]
*/

use anyhow::{Context, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use life::config::{
    apply_cli_overrides, apply_environment_overrides, find_config_file, load_config,
    validate_config, LifeConfig,
};
use life::engine::{LesionOutcome, LifePipeline};
use life::observability::{debug_flags_help, init_logging, CrateDebugFlags, LogFormat, LoggingConfig};
use life::serialization::{save_connectome_with, ConnectomeMetadata, ConnectomeSnapshot};
use life::structures::{Connectome, DiffusionVolume, FascicleSet, TractClassification};
use life::EvaluationReport;

/// LiFE - linear fascicle evaluation of a candidate connectome
#[derive(Parser, Debug)]
#[command(name = "life_evaluate", version, long_about = None, after_help = debug_flags_help())]
struct Args {
    /// Diffusion signal volume (JSON)
    #[arg(long)]
    volume: PathBuf,

    /// Candidate fascicles with their reference frame (JSON)
    #[arg(long)]
    fascicles: PathBuf,

    /// Tract classification, tract name -> indices into --fascicles (JSON)
    #[arg(long)]
    classification: PathBuf,

    /// Configuration file (default: search for life_configuration.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (overrides system.output_dir)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Configuration override, repeatable (e.g. --set solver_max_iterations=1000)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    overrides: Vec<(String, String)>,

    /// Log as JSON lines instead of text
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn main() -> Result<()> {
    // --debug-<crate> flags are handled by the logging layer, not clap
    let (debug_args, clap_args): (Vec<String>, Vec<String>) =
        std::env::args().partition(|arg| arg.starts_with("--debug-"));
    let args = Args::parse_from(clap_args);

    let mut debug_flags = CrateDebugFlags::from_args(debug_args);
    if let Ok(value) = std::env::var("LIFE_DEBUG") {
        debug_flags.merge_env_value(&value);
    }

    let config = resolve_config(&args)?;

    let logging = LoggingConfig {
        level: config.system.log_level.clone(),
        format: if args.json_logs { LogFormat::Json } else { LogFormat::Text },
        file_logging: config.logging.file_logging,
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    };
    let _guard = init_logging(&debug_flags, &logging)?;

    info!(version = life::VERSION, "LiFE connectome evaluation");
    run(&args, &config)
}

/// File (explicit or discovered) → environment → CLI, then validate.
/// Without any config file the built-in defaults are used.
fn resolve_config(args: &Args) -> Result<LifeConfig> {
    let cli: HashMap<String, String> = args.overrides.iter().cloned().collect();

    let mut config = match &args.config {
        Some(path) => load_config(Some(path.as_path()), Some(&cli))
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => match find_config_file() {
            Ok(path) => load_config(Some(path.as_path()), Some(&cli))
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            Err(_) => {
                let mut config = LifeConfig::default();
                apply_environment_overrides(&mut config)?;
                apply_cli_overrides(&mut config, &cli)?;
                config
            }
        },
    };

    if let Some(dir) = &args.output_dir {
        config.system.output_dir = dir.clone();
    }
    validate_config(&config)?;
    Ok(config)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {} {}", what, path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {} {}", what, path.display()))
}

fn run(args: &Args, config: &LifeConfig) -> Result<()> {
    let volume: DiffusionVolume = read_json(&args.volume, "diffusion volume")?;
    let fascicles: FascicleSet = read_json(&args.fascicles, "fascicle set")?;
    let classification: TractClassification = read_json(&args.classification, "tract classification")?;
    info!(
        voxels = volume.n_voxels(),
        directions = volume.n_directions(),
        fascicles = fascicles.len(),
        tracts = classification.len(),
        "Inputs loaded"
    );

    let pipeline = LifePipeline::from_config(config)?;
    let output = pipeline.run(Connectome::from_set(fascicles), volume, &classification)?;

    std::fs::create_dir_all(&config.system.output_dir).with_context(|| {
        format!(
            "Failed to create output directory {}",
            config.system.output_dir.display()
        )
    })?;

    let metadata = ConnectomeMetadata::new(
        "reduced connectome",
        format!("fascicles: {}", args.fascicles.display()),
    )
    .with_tag("volume", args.volume.display().to_string())
    .with_tag("candidate_fascicles", output.reduction.original_len().to_string());
    let snapshot = ConnectomeSnapshot::from_connectome(
        output.reduced.connectome(),
        Some(output.reduced.summary().clone()),
        metadata,
    );
    let connectome_path = config.connectome_path();
    save_connectome_with(&snapshot, &connectome_path, config.persistence.compression)
        .with_context(|| format!("Failed to save connectome {}", connectome_path.display()))?;

    let report = EvaluationReport::from_output(&output);
    let results_path = config.results_path();
    report
        .write_json(&results_path)
        .with_context(|| format!("Failed to write report {}", results_path.display()))?;

    for (tract, outcome) in &output.lesions.tracts {
        match outcome {
            LesionOutcome::Evaluated(result) => info!(
                tract = tract.as_str(),
                strength_of_evidence = result.statistics.strength_of_evidence,
                emd = result.statistics.earth_movers_distance,
                voxels = result.voxels.len(),
                pruned = result.pruned.len(),
                "Tract evidence"
            ),
            LesionOutcome::NoEvidence { reason } => {
                warn!(tract = tract.as_str(), reason = reason.as_str(), "No evidence")
            }
            LesionOutcome::Failed { error } => {
                warn!(tract = tract.as_str(), error = error.as_str(), "Tract failed")
            }
        }
    }

    info!(
        kept = output.reduction.reduced_len(),
        candidates = output.reduction.original_len(),
        variance_explained = output.fitted.summary().variance_explained,
        total_ms = output.profile.total_ms,
        connectome = %connectome_path.display(),
        report = %results_path.display(),
        "Evaluation complete"
    );
    Ok(())
}
