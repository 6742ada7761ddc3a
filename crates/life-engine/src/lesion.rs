// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # Virtual lesion
//!
//! Measures how much a tract contributes to the fit by removing its fascicles
//! from the prediction (without re-fitting) and comparing per-voxel prediction
//! error in the voxels the tract traverses.
//!
//! ## Statistics
//! - **Strength of evidence**: `S = (μ_L − μ_F) / sqrt(σ²_L + σ²_F)` over
//!   bootstrap means of per-voxel RMSE, with voxels resampled in pairs
//! - **Earth mover's distance**: exact 1-D Wasserstein-1 between the two
//!   per-voxel RMSE samples
//! - **KL / Jeffreys divergence**: smoothed histograms on shared bin edges
//! - **Variance explained**: `R²` over the lesioned rows, full and lesioned
//!
//! Evaluation never mutates the model. A batch runs tracts in parallel and
//! keeps one outcome per tract, including failures.
//!
//! Tracts classified against the candidate connectome are lesioned in the
//! reduced model through its [`ReductionMap`]. A tract whose fascicles were
//! all pruned leaves the reduced prediction unchanged and yields zero
//! evidence over the voxels it traverses; `NoEvidence` is reserved for tracts
//! that traverse no masked voxel at all.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use life_config::LesionConfig;
use life_structures::{LifeError, Result, TractClassification};

use crate::model::{variance_explained, FittedModel};
use crate::reduce::ReductionMap;
use crate::sparse::ForwardMatrix;

/// Relative spread below which bootstrap means count as constant
const ZERO_SPREAD_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LesionOptions {
    /// Bootstrap resamples per Monte Carlo repeat
    pub bootstrap_samples: usize,
    pub monte_carlo_repeats: usize,
    pub histogram_bins: usize,
    /// Pseudo-count added to every histogram bin
    pub histogram_pseudocount: f64,
    pub seed: u64,
}

impl Default for LesionOptions {
    fn default() -> Self {
        Self {
            bootstrap_samples: 5000,
            monte_carlo_repeats: 5,
            histogram_bins: 100,
            histogram_pseudocount: 1e-3,
            seed: 0x11FE,
        }
    }
}

impl LesionOptions {
    pub fn from_config(config: &LesionConfig) -> Self {
        Self {
            bootstrap_samples: config.bootstrap_samples,
            monte_carlo_repeats: config.monte_carlo_repeats,
            histogram_bins: config.histogram_bins,
            seed: config.seed,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.bootstrap_samples == 0 || self.monte_carlo_repeats == 0 {
            return Err(LifeError::InvalidInput(
                "bootstrap samples and Monte Carlo repeats must be at least 1".to_string(),
            ));
        }
        if self.histogram_bins < 2 {
            return Err(LifeError::InvalidInput(format!(
                "at least 2 histogram bins required, got {}",
                self.histogram_bins
            )));
        }
        if !(self.histogram_pseudocount > 0.0 && self.histogram_pseudocount.is_finite()) {
            return Err(LifeError::InvalidInput(format!(
                "histogram pseudo-count must be positive, got {}",
                self.histogram_pseudocount
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceStatistics {
    /// Mean of S over Monte Carlo repeats; `"inf"` / `"-inf"` in JSON when
    /// the bootstrap means do not vary
    #[serde(with = "extended_float")]
    pub strength_of_evidence: f64,
    /// Standard deviation of S over Monte Carlo repeats
    pub strength_of_evidence_std: f64,
    pub earth_movers_distance: f64,
    /// KL(lesioned ‖ full)
    pub kl_divergence: f64,
    /// KL(lesioned ‖ full) + KL(full ‖ lesioned)
    pub jeffreys_divergence: f64,
    pub variance_explained_full: f64,
    pub variance_explained_lesioned: f64,
    /// Full minus lesioned
    pub variance_explained_delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualLesionResult {
    pub tract: String,
    /// Validated, de-duplicated fascicle indices in the evaluated model
    pub fascicles: Vec<usize>,
    /// Candidate indices of tract fascicles removed by reduction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pruned: Vec<usize>,
    /// Masked voxel indices traversed by the tract
    pub voxels: Vec<usize>,
    /// Per-voxel RMSE with all fascicles
    pub rmse_full: Vec<f64>,
    /// Per-voxel RMSE with the tract removed
    pub rmse_lesioned: Vec<f64>,
    pub statistics: EvidenceStatistics,
}

/// Outcome for one tract of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LesionOutcome {
    Evaluated(VirtualLesionResult),
    NoEvidence { reason: String },
    Failed { error: String },
}

impl LesionOutcome {
    pub fn result(&self) -> Option<&VirtualLesionResult> {
        match self {
            LesionOutcome::Evaluated(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_evaluated(&self) -> bool {
        matches!(self, LesionOutcome::Evaluated(_))
    }
}

/// Outcomes keyed by tract name, in name order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LesionReport {
    pub tracts: BTreeMap<String, LesionOutcome>,
}

impl LesionReport {
    pub fn get(&self, tract: &str) -> Option<&LesionOutcome> {
        self.tracts.get(tract)
    }

    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    pub fn evaluated_count(&self) -> usize {
        self.tracts.values().filter(|o| o.is_evaluated()).count()
    }

    pub fn no_evidence_count(&self) -> usize {
        self.tracts
            .values()
            .filter(|o| matches!(o, LesionOutcome::NoEvidence { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.tracts
            .values()
            .filter(|o| matches!(o, LesionOutcome::Failed { .. }))
            .count()
    }
}

/// Lesion one tract of `model`.
///
/// # Errors
/// - `IndexOutOfRange` if an index does not address the model's connectome
/// - `NoEvidence` if the tract traverses no masked voxel
/// - `InvalidInput` for invalid options
pub fn evaluate_tract(
    model: &FittedModel,
    tract: &str,
    fascicles: &[usize],
    options: &LesionOptions,
) -> Result<VirtualLesionResult> {
    options.validate()?;

    let n_fascicles = model.n_fascicles();
    if let Some(&bad) = fascicles.iter().find(|&&f| f >= n_fascicles) {
        return Err(LifeError::IndexOutOfRange {
            index: bad,
            len: n_fascicles,
        });
    }
    let indices = sorted_unique(fascicles);
    let voxels = traversed_voxels(model.matrix(), &indices);
    if voxels.is_empty() {
        return Err(LifeError::NoEvidence(tract.to_string()));
    }
    lesion_voxels(model, tract, indices, voxels, options)
}

/// Lesion one tract, given in the candidate index space of `map`, in the
/// reduced model.
///
/// Kept fascicles are zeroed in `reduced`. When the kept fascicles traverse
/// no masked voxel (in particular when all of them were pruned), the voxels
/// of the pruned fascicles in `candidate` are used instead; the reduced
/// prediction is unchanged there, so the result is zero evidence.
///
/// # Errors
/// - `DimensionMismatch` if the models do not belong to `map`
/// - `IndexOutOfRange` for an index outside the candidate connectome
/// - `NoEvidence` if no tract fascicle traverses a masked voxel
/// - `InvalidInput` for invalid options
pub fn evaluate_reduced_tract(
    candidate: &FittedModel,
    reduced: &FittedModel,
    map: &ReductionMap,
    tract: &str,
    fascicles: &[usize],
    options: &LesionOptions,
) -> Result<VirtualLesionResult> {
    options.validate()?;
    check_reduction(candidate, reduced, map)?;

    let remapped = map.remap_tract(fascicles)?;
    let kept = sorted_unique(&remapped.kept);
    let pruned = sorted_unique(&remapped.pruned);

    let mut voxels = traversed_voxels(reduced.matrix(), &kept);
    if voxels.is_empty() {
        voxels = traversed_voxels(candidate.matrix(), &pruned);
    }
    if voxels.is_empty() {
        return Err(LifeError::NoEvidence(tract.to_string()));
    }

    let mut result = lesion_voxels(reduced, tract, kept, voxels, options)?;
    result.pruned = pruned;
    Ok(result)
}

fn check_reduction(candidate: &FittedModel, reduced: &FittedModel, map: &ReductionMap) -> Result<()> {
    if candidate.n_fascicles() != map.original_len() {
        return Err(LifeError::dimension(
            "candidate fascicles",
            map.original_len(),
            candidate.n_fascicles(),
        ));
    }
    if reduced.n_fascicles() != map.reduced_len() {
        return Err(LifeError::dimension(
            "reduced fascicles",
            map.reduced_len(),
            reduced.n_fascicles(),
        ));
    }
    if reduced.matrix().n_rows() != candidate.matrix().n_rows() {
        return Err(LifeError::dimension(
            "reduced model rows",
            candidate.matrix().n_rows(),
            reduced.matrix().n_rows(),
        ));
    }
    Ok(())
}

fn sorted_unique(indices: &[usize]) -> Vec<usize> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Sorted masked voxels traversed by any of `columns`
fn traversed_voxels(matrix: &ForwardMatrix, columns: &[usize]) -> Vec<usize> {
    let mut voxels: Vec<usize> = columns.iter().flat_map(|&f| matrix.column_voxels(f)).collect();
    voxels.sort_unstable();
    voxels.dedup();
    voxels
}

/// Compare full and lesioned predictions of `model` on `voxels`, with the
/// fascicles in `indices` zeroed for the lesioned one
fn lesion_voxels(
    model: &FittedModel,
    tract: &str,
    indices: Vec<usize>,
    voxels: Vec<usize>,
    options: &LesionOptions,
) -> Result<VirtualLesionResult> {
    let matrix = model.matrix();
    let n_dirs = matrix.n_directions();
    let rows: Vec<usize> = voxels
        .iter()
        .flat_map(|&v| v * n_dirs..(v + 1) * n_dirs)
        .collect();

    let weights = model.weights();
    let mut lesioned_weights = weights.to_vec();
    for &f in &indices {
        lesioned_weights[f] = 0.0;
    }

    let full = matrix.mul_vec_rows(weights, &rows)?;
    let lesioned = matrix.mul_vec_rows(&lesioned_weights, &rows)?;
    let observed: Vec<f64> = rows.iter().map(|&r| model.signal().observation()[r]).collect();

    let rmse_full = per_voxel_rmse(&observed, &full, n_dirs);
    let rmse_lesioned = per_voxel_rmse(&observed, &lesioned, n_dirs);

    let (s_mean, s_std) = strength_of_evidence(&rmse_full, &rmse_lesioned, options);
    let (kl, jeffreys) = histogram_divergences(&rmse_lesioned, &rmse_full, options);

    let sst: f64 = observed.iter().map(|y| y * y).sum();
    let sse = |prediction: &[f64]| -> f64 {
        observed
            .iter()
            .zip(prediction)
            .map(|(y, p)| (y - p) * (y - p))
            .sum()
    };
    let r2_full = variance_explained(sse(&full), sst);
    let r2_lesioned = variance_explained(sse(&lesioned), sst);

    let statistics = EvidenceStatistics {
        strength_of_evidence: s_mean,
        strength_of_evidence_std: s_std,
        earth_movers_distance: earth_movers_distance(&rmse_full, &rmse_lesioned),
        kl_divergence: kl,
        jeffreys_divergence: jeffreys,
        variance_explained_full: r2_full,
        variance_explained_lesioned: r2_lesioned,
        variance_explained_delta: r2_full - r2_lesioned,
    };

    debug!(
        tract,
        fascicles = indices.len(),
        voxels = voxels.len(),
        strength_of_evidence = statistics.strength_of_evidence,
        emd = statistics.earth_movers_distance,
        "Virtual lesion evaluated"
    );

    Ok(VirtualLesionResult {
        tract: tract.to_string(),
        fascicles: indices,
        pruned: Vec::new(),
        voxels,
        rmse_full,
        rmse_lesioned,
        statistics,
    })
}

/// Lesion every tract of `classification` in parallel.
///
/// Per-tract failures are recorded in the report; nothing is dropped.
pub fn evaluate_tracts(
    model: &FittedModel,
    classification: &TractClassification,
    options: &LesionOptions,
) -> LesionReport {
    evaluate_batch(classification, |name, fascicles| {
        evaluate_tract(model, name, fascicles, options)
    })
}

/// Lesion every tract of a candidate-space `classification` in the reduced
/// model, in parallel. See [`evaluate_reduced_tract`].
pub fn evaluate_reduced_tracts(
    candidate: &FittedModel,
    reduced: &FittedModel,
    map: &ReductionMap,
    classification: &TractClassification,
    options: &LesionOptions,
) -> LesionReport {
    evaluate_batch(classification, |name, fascicles| {
        evaluate_reduced_tract(candidate, reduced, map, name, fascicles, options)
    })
}

fn evaluate_batch<F>(classification: &TractClassification, evaluate: F) -> LesionReport
where
    F: Fn(&str, &[usize]) -> Result<VirtualLesionResult> + Sync,
{
    let tracts: Vec<(&str, &[usize])> = classification.iter().collect();
    let tracts = tracts
        .par_iter()
        .map(|&(name, fascicles)| {
            let outcome = match evaluate(name, fascicles) {
                Ok(result) => LesionOutcome::Evaluated(result),
                Err(LifeError::NoEvidence(_)) => LesionOutcome::NoEvidence {
                    reason: format!("tract '{}' traverses no masked voxel", name),
                },
                Err(e) => {
                    warn!(tract = name, error = %e, "Virtual lesion failed");
                    LesionOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };
            (name.to_string(), outcome)
        })
        .collect();
    LesionReport { tracts }
}

impl FittedModel {
    /// See [`evaluate_tract`].
    pub fn lesion(
        &self,
        tract: &str,
        fascicles: &[usize],
        options: &LesionOptions,
    ) -> Result<VirtualLesionResult> {
        evaluate_tract(self, tract, fascicles, options)
    }
}

/// RMSE over directions for each voxel block of `n_dirs` rows
fn per_voxel_rmse(observed: &[f64], predicted: &[f64], n_dirs: usize) -> Vec<f64> {
    observed
        .chunks(n_dirs)
        .zip(predicted.chunks(n_dirs))
        .map(|(y, p)| {
            let mse: f64 = y.iter().zip(p).map(|(a, b)| (a - b) * (a - b)).sum::<f64>()
                / n_dirs as f64;
            mse.sqrt()
        })
        .collect()
}

fn mean_and_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, variance)
}

/// S for one set of paired bootstrap means
///
/// A spread within rounding of zero (e.g. a single lesioned voxel) gives
/// S = 0 for equal means and ±∞ otherwise.
fn strength_from_bootstrap(full_means: &[f64], lesioned_means: &[f64]) -> f64 {
    let (mu_f, var_f) = mean_and_variance(full_means);
    let (mu_l, var_l) = mean_and_variance(lesioned_means);
    let spread = (var_l + var_f).sqrt();
    let difference = mu_l - mu_f;
    let tolerance = ZERO_SPREAD_TOLERANCE * mu_l.abs().max(mu_f.abs()).max(1.0);
    if spread > tolerance {
        difference / spread
    } else if difference.abs() <= tolerance {
        0.0
    } else {
        difference.signum() * f64::INFINITY
    }
}

/// Mean and standard deviation of S over the Monte Carlo repeats
fn strength_of_evidence(rmse_full: &[f64], rmse_lesioned: &[f64], options: &LesionOptions) -> (f64, f64) {
    let n = rmse_full.len();
    let strengths: Vec<f64> = (0..options.monte_carlo_repeats)
        .into_par_iter()
        .map(|repeat| {
            let mut rng = ChaCha8Rng::seed_from_u64(options.seed.wrapping_add(repeat as u64));
            let mut full_means = Vec::with_capacity(options.bootstrap_samples);
            let mut lesioned_means = Vec::with_capacity(options.bootstrap_samples);
            for _ in 0..options.bootstrap_samples {
                let mut sum_f = 0.0;
                let mut sum_l = 0.0;
                for _ in 0..n {
                    let i = rng.gen_range(0..n);
                    sum_f += rmse_full[i];
                    sum_l += rmse_lesioned[i];
                }
                full_means.push(sum_f / n as f64);
                lesioned_means.push(sum_l / n as f64);
            }
            strength_from_bootstrap(&full_means, &lesioned_means)
        })
        .collect();

    let (mean, variance) = mean_and_variance(&strengths);
    let std = if mean.is_finite() { variance.sqrt() } else { 0.0 };
    (mean, std)
}

/// JSON has no infinities: non-finite values are written as strings
mod extended_float {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "NaN" => Ok(f64::NAN),
                other => Err(D::Error::custom(format!("invalid number '{}'", other))),
            },
        }
    }
}

/// Exact W1 between equal-size samples: mean gap between sorted values
pub fn earth_movers_distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut sa = a.to_vec();
    let mut sb = b.to_vec();
    sa.sort_unstable_by(|x, y| x.total_cmp(y));
    sb.sort_unstable_by(|x, y| x.total_cmp(y));
    sa.iter().zip(&sb).map(|(x, y)| (x - y).abs()).sum::<f64>() / a.len() as f64
}

fn smoothed_histogram(values: &[f64], lo: f64, width: f64, options: &LesionOptions) -> Vec<f64> {
    let bins = options.histogram_bins;
    let mut counts = vec![0.0; bins];
    for &x in values {
        let bin = (((x - lo) / width).floor() as usize).min(bins - 1);
        counts[bin] += 1.0;
    }
    let total = values.len() as f64 + options.histogram_pseudocount * bins as f64;
    counts
        .into_iter()
        .map(|c| (c + options.histogram_pseudocount) / total)
        .collect()
}

fn kl(p: &[f64], q: &[f64]) -> f64 {
    p.iter().zip(q).map(|(pi, qi)| pi * (pi / qi).ln()).sum()
}

/// (KL(p ‖ q), KL(p ‖ q) + KL(q ‖ p)) between histograms of two samples
fn histogram_divergences(p_values: &[f64], q_values: &[f64], options: &LesionOptions) -> (f64, f64) {
    let lo = p_values
        .iter()
        .chain(q_values)
        .copied()
        .fold(f64::INFINITY, f64::min);
    let hi = p_values
        .iter()
        .chain(q_values)
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !(hi > lo) {
        return (0.0, 0.0);
    }
    let width = (hi - lo) / options.histogram_bins as f64;
    let p = smoothed_histogram(p_values, lo, width, options);
    let q = smoothed_histogram(q_values, lo, width, options);
    let forward = kl(&p, &q);
    (forward, forward + kl(&q, &p))
}
