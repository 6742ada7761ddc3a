// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Diffusion signal volume and its acquisition geometry
//!
//! Only masked voxels are stored. The mask order defines the voxel ordering of
//! every downstream row grouping: row `v * n_directions + d` of the forward
//! matrix and of the observation vector refers to `mask[v]` and direction `d`.

use ahash::AHashSet;
use nalgebra::Vector3;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{LifeError, Result};
use crate::spatial::{ReferenceFrame, VoxelCoord};

/// Diffusion-weighting directions and b-values (s/mm²).
///
/// Only diffusion-weighted acquisitions belong here; the b0 reference lives in
/// [`DiffusionVolume::b0`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientTable {
    pub directions: Vec<[f64; 3]>,
    pub bvalues: Vec<f64>,
}

impl GradientTable {
    pub fn new(directions: Vec<[f64; 3]>, bvalues: Vec<f64>) -> Self {
        Self {
            directions,
            bvalues,
        }
    }

    /// Every direction shares the same b-value
    pub fn single_shell(directions: Vec<[f64; 3]>, bvalue: f64) -> Self {
        let bvalues = vec![bvalue; directions.len()];
        Self {
            directions,
            bvalues,
        }
    }

    pub fn len(&self) -> usize {
        self.directions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Direction `d` normalized to unit length
    pub fn unit_direction(&self, d: usize) -> Vector3<f64> {
        let [x, y, z] = self.directions[d];
        Vector3::new(x, y, z).normalize()
    }

    /// # Errors
    /// `DimensionMismatch` / `InvalidInput` for inconsistent tables.
    pub fn validate(&self) -> Result<()> {
        if self.directions.is_empty() {
            return Err(LifeError::InvalidInput(
                "gradient table has no diffusion-weighted directions".to_string(),
            ));
        }
        if self.bvalues.len() != self.directions.len() {
            return Err(LifeError::dimension(
                "gradient b-values",
                self.directions.len(),
                self.bvalues.len(),
            ));
        }
        for (d, dir) in self.directions.iter().enumerate() {
            let norm = Vector3::new(dir[0], dir[1], dir[2]).norm();
            if !norm.is_finite() || norm <= f64::EPSILON {
                return Err(LifeError::InvalidInput(format!(
                    "gradient direction {} has zero or non-finite length",
                    d
                )));
            }
        }
        if let Some(b) = self.bvalues.iter().find(|b| !b.is_finite() || **b < 0.0) {
            return Err(LifeError::InvalidInput(format!(
                "b-value {} must be finite and non-negative",
                b
            )));
        }
        Ok(())
    }
}

/// Voxel grid dimensions plus the frame mapping indices to world space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelGrid {
    pub dims: [usize; 3],
    pub frame: ReferenceFrame,
}

impl VoxelGrid {
    pub fn new(dims: [usize; 3], frame: ReferenceFrame) -> Self {
        Self { dims, frame }
    }

    pub fn contains(&self, voxel: &VoxelCoord) -> bool {
        voxel[0] < self.dims[0] && voxel[1] < self.dims[1] && voxel[2] < self.dims[2]
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }
}

/// Masked diffusion measurements from the correction/alignment collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionVolume {
    pub grid: VoxelGrid,
    pub gradients: GradientTable,
    /// Masked voxels in row-group order
    pub mask: Vec<VoxelCoord>,
    /// Zero-gradient reference, one per masked voxel
    pub b0: Vec<f64>,
    /// Diffusion-weighted measurements (masked voxel × direction)
    pub signal: Array2<f64>,
}

impl DiffusionVolume {
    pub fn n_voxels(&self) -> usize {
        self.mask.len()
    }

    pub fn n_directions(&self) -> usize {
        self.gradients.len()
    }

    /// Check every shape and range constraint of the volume.
    ///
    /// # Errors
    /// `DimensionMismatch` when the mask, b0 and signal disagree in size,
    /// `InvalidInput` for voxels outside the grid, duplicated mask voxels or
    /// non-finite measurements.
    pub fn validate(&self) -> Result<()> {
        self.gradients.validate()?;

        let n_voxels = self.mask.len();
        if self.b0.len() != n_voxels {
            return Err(LifeError::dimension("b0 measurements", n_voxels, self.b0.len()));
        }
        let (rows, cols) = self.signal.dim();
        if rows != n_voxels {
            return Err(LifeError::dimension("signal rows (masked voxels)", n_voxels, rows));
        }
        if cols != self.gradients.len() {
            return Err(LifeError::dimension(
                "signal columns (gradient directions)",
                self.gradients.len(),
                cols,
            ));
        }

        let mut seen = AHashSet::with_capacity(n_voxels);
        for voxel in &self.mask {
            if !self.grid.contains(voxel) {
                return Err(LifeError::InvalidInput(format!(
                    "mask voxel {:?} lies outside grid {:?}",
                    voxel, self.grid.dims
                )));
            }
            if !seen.insert(*voxel) {
                return Err(LifeError::InvalidInput(format!(
                    "mask voxel {:?} is listed twice",
                    voxel
                )));
            }
        }

        if self.b0.iter().any(|v| !v.is_finite()) || self.signal.iter().any(|v| !v.is_finite()) {
            return Err(LifeError::InvalidInput(
                "diffusion measurements must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_volume() -> DiffusionVolume {
        DiffusionVolume {
            grid: VoxelGrid::new([2, 2, 2], ReferenceFrame::identity("acpc")),
            gradients: GradientTable::single_shell(
                vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                1000.0,
            ),
            mask: vec![[0, 0, 0], [1, 1, 1]],
            b0: vec![100.0, 100.0],
            signal: Array2::from_elem((2, 3), 50.0),
        }
    }

    #[test]
    fn test_valid_volume() {
        assert!(small_volume().validate().is_ok());
    }

    #[test]
    fn test_signal_shape_mismatch() {
        let mut v = small_volume();
        v.signal = Array2::zeros((2, 4));
        assert!(matches!(
            v.validate(),
            Err(LifeError::DimensionMismatch { expected: 3, actual: 4, .. })
        ));
    }

    #[test]
    fn test_mask_outside_grid() {
        let mut v = small_volume();
        v.mask[1] = [2, 0, 0];
        assert!(matches!(v.validate(), Err(LifeError::InvalidInput(_))));
    }

    #[test]
    fn test_duplicate_mask_voxel() {
        let mut v = small_volume();
        v.mask[1] = [0, 0, 0];
        assert!(matches!(v.validate(), Err(LifeError::InvalidInput(_))));
    }

    #[test]
    fn test_zero_direction_rejected() {
        let table = GradientTable::single_shell(vec![[0.0, 0.0, 0.0]], 1000.0);
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_unit_direction() {
        let table = GradientTable::single_shell(vec![[2.0, 0.0, 0.0]], 1000.0);
        assert!((table.unit_direction(0).norm() - 1.0).abs() < 1e-12);
    }
}
