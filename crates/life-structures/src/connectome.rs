// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Connectome: ordered fascicles plus a parallel weight vector
//!
//! Fascicle `i` corresponds to weight `i` and to column `i` of the forward
//! matrix. The weight vector is either absent (not yet fit) or exactly as long
//! as the fascicle list; constructors enforce this.

use serde::{Deserialize, Serialize};

use crate::error::{LifeError, Result};
use crate::fascicle::{Fascicle, FascicleSet};
use crate::spatial::ReferenceFrame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connectome {
    frame: ReferenceFrame,
    fascicles: Vec<Fascicle>,
    weights: Option<Vec<f64>>,
}

impl Connectome {
    /// Unweighted connectome
    pub fn new(frame: ReferenceFrame, fascicles: Vec<Fascicle>) -> Self {
        Self {
            frame,
            fascicles,
            weights: None,
        }
    }

    pub fn from_set(set: FascicleSet) -> Self {
        Self::new(set.frame, set.fascicles)
    }

    /// Attach fitted weights.
    ///
    /// # Errors
    /// - `DimensionMismatch` if `weights.len() != self.len()`
    /// - `InvalidInput` if any weight is negative or not finite
    pub fn with_weights(mut self, weights: Vec<f64>) -> Result<Self> {
        validate_weights(&weights, self.fascicles.len())?;
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn frame(&self) -> &ReferenceFrame {
        &self.frame
    }

    pub fn fascicles(&self) -> &[Fascicle] {
        &self.fascicles
    }

    pub fn fascicle(&self, index: usize) -> Option<&Fascicle> {
        self.fascicles.get(index)
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn weight(&self, index: usize) -> Option<f64> {
        self.weights.as_ref().and_then(|w| w.get(index).copied())
    }

    pub fn is_weighted(&self) -> bool {
        self.weights.is_some()
    }

    pub fn len(&self) -> usize {
        self.fascicles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fascicles.is_empty()
    }

    /// # Errors
    /// `IndexOutOfRange` for the first index not addressing a fascicle.
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.fascicles.len() {
            Ok(())
        } else {
            Err(LifeError::IndexOutOfRange {
                index,
                len: self.fascicles.len(),
            })
        }
    }

    /// New connectome holding the fascicles (and weights, if any) at
    /// `indices`, in the order given. The receiver is left untouched.
    ///
    /// # Errors
    /// `IndexOutOfRange` if any index is out of bounds.
    pub fn select(&self, indices: &[usize]) -> Result<Connectome> {
        for &index in indices {
            self.check_index(index)?;
        }
        let fascicles = indices.iter().map(|&i| self.fascicles[i].clone()).collect();
        let weights = self
            .weights
            .as_ref()
            .map(|w| indices.iter().map(|&i| w[i]).collect());
        Ok(Connectome {
            frame: self.frame.clone(),
            fascicles,
            weights,
        })
    }

    /// Number of strictly positive weights (0 if unweighted)
    pub fn positive_weight_count(&self) -> usize {
        self.weights
            .as_ref()
            .map(|w| w.iter().filter(|&&x| x > 0.0).count())
            .unwrap_or(0)
    }

    /// Split into raw parts (frame, fascicles, weights)
    pub fn into_parts(self) -> (ReferenceFrame, Vec<Fascicle>, Option<Vec<f64>>) {
        (self.frame, self.fascicles, self.weights)
    }
}

fn validate_weights(weights: &[f64], expected: usize) -> Result<()> {
    if weights.len() != expected {
        return Err(LifeError::dimension("connectome weights", expected, weights.len()));
    }
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || **w < 0.0)
    {
        return Err(LifeError::InvalidInput(format!(
            "weight {} of fascicle {} must be finite and non-negative",
            w, i
        )));
    }
    Ok(())
}
