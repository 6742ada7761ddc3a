// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Common test utilities: synthetic volumes and connectomes
//!
//! All scenarios live on a 3×3×3 identity-frame grid with every voxel masked.
//! Signals are synthesized from the forward model itself, so a known weight
//! vector explains them exactly.

#![allow(dead_code)]

use std::sync::Arc;

use life_engine::{build_forward_matrix, ForwardModel, SignalModel, TensorResponse};
use life_structures::{
    Connectome, DiffusionVolume, Fascicle, GradientTable, ReferenceFrame, VoxelCoord, VoxelGrid,
};
use ndarray::Array2;

pub const SPACE: &str = "acpc";
pub const DIMS: [usize; 3] = [3, 3, 3];
/// Constant added to every measurement; removed again by demeaning
pub const SIGNAL_OFFSET: f64 = 50.0;

pub fn frame() -> ReferenceFrame {
    ReferenceFrame::identity(SPACE)
}

/// Six non-collinear directions on a single b=1000 shell
pub fn gradients() -> GradientTable {
    let h = std::f64::consts::FRAC_1_SQRT_2;
    GradientTable::single_shell(
        vec![
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [h, h, 0.0],
            [h, 0.0, h],
            [0.0, h, h],
        ],
        1000.0,
    )
}

/// Every grid voxel, x-major
pub fn full_mask() -> Vec<VoxelCoord> {
    let mut mask = Vec::new();
    for x in 0..DIMS[0] {
        for y in 0..DIMS[1] {
            for z in 0..DIMS[2] {
                mask.push([x, y, z]);
            }
        }
    }
    mask
}

/// Distinct b0 per masked voxel so per-voxel errors differ
pub fn b0_for(voxel: usize) -> f64 {
    100.0 + 10.0 * voxel as f64
}

/// Volume with flat signal over `mask`
pub fn flat_volume(mask: Vec<VoxelCoord>) -> DiffusionVolume {
    let gradients = gradients();
    let n = mask.len();
    DiffusionVolume {
        grid: VoxelGrid::new(DIMS, frame()),
        signal: Array2::from_elem((n, gradients.len()), SIGNAL_OFFSET),
        b0: (0..n).map(b0_for).collect(),
        gradients,
        mask,
    }
}

/// Straight fascicle from `start` to `end` sampled every 0.2 mm
pub fn line(start: [f64; 3], end: [f64; 3]) -> Fascicle {
    let length = ((end[0] - start[0]).powi(2)
        + (end[1] - start[1]).powi(2)
        + (end[2] - start[2]).powi(2))
    .sqrt();
    let steps = (length / 0.2).round().max(1.0) as usize;
    let coords: Vec<[f64; 3]> = (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            [
                start[0] + t * (end[0] - start[0]),
                start[1] + t * (end[1] - start[1]),
                start[2] + t * (end[2] - start[2]),
            ]
        })
        .collect();
    Fascicle::from_coords(&coords)
}

/// Volume whose demeaned signal equals `M w_true` for `fascicles`
pub fn synthesize(fascicles: &[Fascicle], w_true: &[f64], mask: Vec<VoxelCoord>) -> DiffusionVolume {
    let mut volume = flat_volume(mask);
    let connectome = Connectome::new(frame(), fascicles.to_vec());
    let signal = SignalModel::new(volume.clone()).unwrap();
    let matrix = build_forward_matrix(&connectome, &signal, &TensorResponse::default()).unwrap();
    let predicted = matrix.mul_vec(w_true).unwrap();

    let n_dirs = volume.gradients.len();
    for ((v, d), value) in volume.signal.indexed_iter_mut() {
        *value = SIGNAL_OFFSET + predicted[v * n_dirs + d];
    }
    volume
}

/// One fascicle explaining a single voxel, two irrelevant ones elsewhere
pub fn single_voxel_scenario() -> (Connectome, DiffusionVolume) {
    let fascicles = vec![
        Fascicle::from_coords(&[[0.6, 1.0, 1.0], [1.0, 1.0, 1.0], [1.4, 1.0, 1.0]]),
        Fascicle::from_coords(&[[0.0, -0.2, 0.0], [0.0, 0.0, 0.0], [0.0, 0.2, 0.0]]),
        Fascicle::from_coords(&[[2.0, 2.0, 1.8], [2.0, 2.0, 2.0], [2.0, 2.0, 2.2]]),
    ];
    let volume = synthesize(&fascicles, &[1.0, 0.0, 0.0], full_mask());
    (Connectome::new(frame(), fascicles), volume)
}

/// Two explaining fascicles over three voxels each, one zero-weight fascicle
/// inside the mask and one fascicle entirely outside the grid
///
/// - 0: along x at (·, 1, 1), weight 1.0
/// - 1: along y at (1, ·, 0), weight 0.5
/// - 2: along z at (0, 2, ·), weight 0
/// - 3: outside the grid
pub fn lesion_scenario() -> (Connectome, DiffusionVolume) {
    let fascicles = vec![
        line([-0.4, 1.0, 1.0], [2.4, 1.0, 1.0]),
        line([1.0, -0.4, 0.0], [1.0, 2.4, 0.0]),
        line([0.0, 2.0, -0.4], [0.0, 2.0, 2.4]),
        line([10.0, 10.0, 10.0], [12.0, 10.0, 10.0]),
    ];
    let volume = synthesize(&fascicles, &[1.0, 0.5, 0.0, 0.0], full_mask());
    (Connectome::new(frame(), fascicles), volume)
}

/// One masked voxel, three orthogonal gradients and a fascicle along the
/// body diagonal: every direction sees the same angle, so the demeaned kernel
/// is flat even though the voxel is traversed
pub fn flat_kernel_scenario() -> (Connectome, DiffusionVolume) {
    let gradients = GradientTable::single_shell(
        vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        1000.0,
    );
    let volume = DiffusionVolume {
        grid: VoxelGrid::new(DIMS, frame()),
        signal: Array2::from_elem((1, gradients.len()), SIGNAL_OFFSET),
        b0: vec![b0_for(0)],
        gradients,
        mask: vec![[1, 1, 1]],
    };
    let connectome = Connectome::new(
        frame(),
        vec![Fascicle::from_coords(&[[0.9, 0.9, 0.9], [1.1, 1.1, 1.1]])],
    );
    (connectome, volume)
}

pub fn forward_model(connectome: Connectome, volume: DiffusionVolume) -> ForwardModel {
    let signal = Arc::new(SignalModel::new(volume).unwrap());
    ForwardModel::build(Arc::new(connectome), signal, TensorResponse::default()).unwrap()
}
