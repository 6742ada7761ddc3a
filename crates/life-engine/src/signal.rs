// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Signal model: validated diffusion volume plus its demeaned observation vector
//!
//! The fit target is the demeaned signal: for each masked voxel, the
//! per-direction measurement minus the voxel's mean over directions. It is
//! flattened voxel-major / direction-minor, matching the forward matrix rows.

use ahash::AHashMap;
use ndarray::ArrayView1;
use tracing::debug;

use life_structures::{
    DiffusionVolume, GradientTable, ReferenceFrame, Result, VoxelCoord, VoxelGrid,
};

#[derive(Debug, Clone)]
pub struct SignalModel {
    volume: DiffusionVolume,
    /// Grid coordinate -> masked voxel index
    voxel_index: AHashMap<VoxelCoord, usize>,
    voxel_means: Vec<f64>,
    /// Demeaned signal, row `v * n_directions + d`
    observation: Vec<f64>,
}

impl SignalModel {
    /// Validate the volume and compute the demeaned observation vector.
    ///
    /// # Errors
    /// `DimensionMismatch` or `InvalidInput` from [`DiffusionVolume::validate`].
    pub fn new(volume: DiffusionVolume) -> Result<Self> {
        volume.validate()?;

        let n_directions = volume.n_directions();
        let mut voxel_index = AHashMap::with_capacity(volume.n_voxels());
        for (v, coord) in volume.mask.iter().enumerate() {
            voxel_index.insert(*coord, v);
        }

        let mut voxel_means = Vec::with_capacity(volume.n_voxels());
        let mut observation = Vec::with_capacity(volume.n_voxels() * n_directions);
        for row in volume.signal.rows() {
            let mean = row.sum() / n_directions as f64;
            voxel_means.push(mean);
            observation.extend(row.iter().map(|x| x - mean));
        }

        debug!(
            voxels = volume.n_voxels(),
            directions = n_directions,
            "Signal model prepared"
        );

        Ok(Self {
            volume,
            voxel_index,
            voxel_means,
            observation,
        })
    }

    pub fn volume(&self) -> &DiffusionVolume {
        &self.volume
    }

    pub fn grid(&self) -> &VoxelGrid {
        &self.volume.grid
    }

    pub fn frame(&self) -> &ReferenceFrame {
        &self.volume.grid.frame
    }

    pub fn gradients(&self) -> &GradientTable {
        &self.volume.gradients
    }

    pub fn n_voxels(&self) -> usize {
        self.volume.n_voxels()
    }

    pub fn n_directions(&self) -> usize {
        self.volume.n_directions()
    }

    /// Length of the observation vector
    pub fn n_rows(&self) -> usize {
        self.observation.len()
    }

    /// Masked voxel index of a grid coordinate, `None` outside the mask
    pub fn voxel_at(&self, coord: &VoxelCoord) -> Option<usize> {
        self.voxel_index.get(coord).copied()
    }

    pub fn voxel_coord(&self, voxel: usize) -> Option<VoxelCoord> {
        self.volume.mask.get(voxel).copied()
    }

    pub fn b0(&self, voxel: usize) -> f64 {
        self.volume.b0[voxel]
    }

    pub fn b0_values(&self) -> &[f64] {
        &self.volume.b0
    }

    pub fn voxel_mean(&self, voxel: usize) -> f64 {
        self.voxel_means[voxel]
    }

    pub fn measured(&self, voxel: usize) -> ArrayView1<'_, f64> {
        self.volume.signal.row(voxel)
    }

    pub fn demeaned(&self, voxel: usize) -> &[f64] {
        let n = self.n_directions();
        &self.observation[voxel * n..(voxel + 1) * n]
    }

    /// Full demeaned observation vector `y`
    pub fn observation(&self) -> &[f64] {
        &self.observation
    }
}
