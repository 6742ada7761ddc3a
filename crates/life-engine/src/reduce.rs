// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Connectome reduction
//!
//! Keeps the fascicles whose weight satisfies a predicate. Geometry, weights
//! and matrix columns are subset together and re-indexed contiguously from 0,
//! preserving relative order. The input model is left untouched.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use life_structures::{LifeError, Result, TractClassification};

use crate::model::FittedModel;

/// New index → original index of a reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReductionMap {
    original_len: usize,
    kept: Vec<usize>,
}

impl ReductionMap {
    pub fn original_len(&self) -> usize {
        self.original_len
    }

    pub fn reduced_len(&self) -> usize {
        self.kept.len()
    }

    /// Original indices of the kept fascicles, ascending
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    pub fn to_original(&self, reduced: usize) -> Option<usize> {
        self.kept.get(reduced).copied()
    }

    /// Reduced index of an original fascicle, `None` if it was pruned
    pub fn to_reduced(&self, original: usize) -> Option<usize> {
        self.kept.binary_search(&original).ok()
    }

    /// Split original tract indices into reduced indices of the kept
    /// fascicles and original indices of the pruned ones, both in input order.
    ///
    /// # Errors
    /// `IndexOutOfRange` if any index does not address the original connectome.
    pub fn remap_tract(&self, indices: &[usize]) -> Result<RemappedTract> {
        let mut tract = RemappedTract::default();
        for &index in indices {
            if index >= self.original_len {
                return Err(LifeError::IndexOutOfRange {
                    index,
                    len: self.original_len,
                });
            }
            match self.to_reduced(index) {
                Some(reduced) => tract.kept.push(reduced),
                None => tract.pruned.push(index),
            }
        }
        Ok(tract)
    }

    /// Translate a classification from the original index space to the
    /// reduced one.
    ///
    /// Tracts that keep at least one fascicle (or were empty to begin with)
    /// land in `tracts` with reduced indices. Tracts whose fascicles were all
    /// pruned land in `pruned` with their original indices, so they are never
    /// mistaken for tracts that traverse nothing.
    ///
    /// # Errors
    /// `IndexOutOfRange` if any index does not address the original connectome.
    pub fn remap_classification(
        &self,
        classification: &TractClassification,
    ) -> Result<RemappedClassification> {
        let mut remapped = RemappedClassification::default();
        for (name, indices) in classification.iter() {
            let tract = self.remap_tract(indices)?;
            if tract.is_fully_pruned() {
                remapped.pruned.insert(name, tract.pruned);
            } else {
                remapped.tracts.insert(name, tract.kept);
            }
        }
        Ok(remapped)
    }
}

/// One tract after reduction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemappedTract {
    /// Reduced indices of kept fascicles
    pub kept: Vec<usize>,
    /// Original indices of pruned fascicles
    pub pruned: Vec<usize>,
}

impl RemappedTract {
    /// Had fascicles, none of which survived
    pub fn is_fully_pruned(&self) -> bool {
        self.kept.is_empty() && !self.pruned.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemappedClassification {
    /// Reduced-space indices
    pub tracts: TractClassification,
    /// Original-space indices of tracts with every fascicle pruned
    pub pruned: TractClassification,
}

/// Keep fascicles whose weight satisfies `keep`.
///
/// # Errors
/// Propagates subset failures; none occur for a consistent model.
pub fn reduce_by<F>(model: &FittedModel, keep: F) -> Result<(FittedModel, ReductionMap)>
where
    F: Fn(f64) -> bool,
{
    let kept: Vec<usize> = model
        .weights()
        .iter()
        .enumerate()
        .filter(|&(_, &w)| keep(w))
        .map(|(i, _)| i)
        .collect();

    let connectome = model.connectome().select(&kept)?;
    let matrix = model.matrix().select_columns(&kept)?;

    info!(
        candidates = model.n_fascicles(),
        kept = kept.len(),
        pruned = model.n_fascicles() - kept.len(),
        "Connectome reduced"
    );

    let reduced = FittedModel::reduced(
        Arc::new(connectome),
        Arc::clone(model.signal()),
        *model.response(),
        Arc::new(matrix),
        model.shared_fit(),
    )?;
    let map = ReductionMap {
        original_len: model.n_fascicles(),
        kept,
    };
    Ok((reduced, map))
}

/// Keep fascicles with weight strictly greater than `threshold` (default 0)
///
/// # Errors
/// `InvalidInput` for a negative or non-finite threshold.
pub fn reduce_by_threshold(model: &FittedModel, threshold: f64) -> Result<(FittedModel, ReductionMap)> {
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(LifeError::InvalidInput(format!(
            "reduction threshold must be finite and non-negative, got {}",
            threshold
        )));
    }
    reduce_by(model, |w| w > threshold)
}

impl FittedModel {
    /// See [`reduce_by_threshold`].
    pub fn reduce(&self, threshold: f64) -> Result<(FittedModel, ReductionMap)> {
        reduce_by_threshold(self, threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> ReductionMap {
        ReductionMap {
            original_len: 5,
            kept: vec![1, 3, 4],
        }
    }

    #[test]
    fn test_index_translation() {
        let map = map();
        assert_eq!(map.to_original(1), Some(3));
        assert_eq!(map.to_original(3), None);
        assert_eq!(map.to_reduced(4), Some(2));
        assert_eq!(map.to_reduced(0), None);
    }

    #[test]
    fn test_remap_tract_splits_kept_and_pruned() {
        let tract = map().remap_tract(&[4, 0, 1, 2]).unwrap();
        assert_eq!(tract.kept, vec![2, 0]);
        assert_eq!(tract.pruned, vec![0, 2]);
        assert!(!tract.is_fully_pruned());
        assert!(map().remap_tract(&[0, 2]).unwrap().is_fully_pruned());
        assert!(!map().remap_tract(&[]).unwrap().is_fully_pruned());
    }

    #[test]
    fn test_remap_classification_tracks_pruned_tracts() {
        let classification = TractClassification::new()
            .with_tract("arcuate", vec![0, 1, 4])
            .with_tract("pruned", vec![2])
            .with_tract("empty", vec![]);
        let remapped = map().remap_classification(&classification).unwrap();
        assert_eq!(remapped.tracts.get("arcuate"), Some(&[0, 2][..]));
        assert_eq!(remapped.tracts.get("empty"), Some(&[][..]));
        assert_eq!(remapped.tracts.get("pruned"), None);
        assert_eq!(remapped.pruned.get("pruned"), Some(&[2][..]));
    }

    #[test]
    fn test_remap_rejects_foreign_indices() {
        let classification = TractClassification::new().with_tract("bad", vec![5]);
        assert!(matches!(
            map().remap_classification(&classification),
            Err(LifeError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }
}
