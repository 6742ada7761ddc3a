// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! # Forward model construction
//!
//! Turns fascicle geometry into the sparse matrix predicting the demeaned
//! diffusion signal. Each fascicle becomes one column:
//!
//! 1. **Walk**: central-difference tangent at every node (one-sided at the
//!    ends); nodes with a zero-length tangent are skipped.
//! 2. **Locate**: map the node into voxel space and round to the nearest
//!    index; nodes outside the grid or mask are skipped.
//! 3. **Accumulate**: add the demeaned tensor kernel into the voxel's slots,
//!    summing repeat visits, then scale by the voxel's b0.
//!
//! Every traversed voxel keeps all of its direction slots, even when the
//! kernel sums to exactly zero there, so a column's stored rows are exactly
//! the rows of the voxels its fascicle traverses.
//!
//! Columns are built in parallel and assembled in fascicle order, so the
//! result does not depend on scheduling.

use ahash::AHashMap;
use nalgebra::{Matrix4, Vector3};
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, trace};

use life_structures::{Connectome, Fascicle, LifeError, ReferenceFrame, Result, VoxelCoord};

use crate::model::FittedModel;
use crate::response::{ResponseKernel, TensorResponse};
use crate::signal::SignalModel;
use crate::solver::{solve_nnls, SolverOptions};
use crate::sparse::{ForwardMatrix, SparseColumn};

const TANGENT_EPSILON: f64 = 1e-12;

/// Build the forward matrix for `connectome` against `signal`.
///
/// # Errors
/// - `GeometryMismatch` if the connectome frame is inconsistent with the
///   signal volume frame
/// - `InvalidInput` for a singular affine or invalid response parameters
pub fn build_forward_matrix(
    connectome: &Connectome,
    signal: &SignalModel,
    response: &TensorResponse,
) -> Result<ForwardMatrix> {
    response.validate()?;
    connectome.frame().ensure_consistent(signal.frame())?;
    let world_to_voxel = signal.frame().world_to_voxel()?;
    let kernel = response.kernel(signal.gradients());

    let columns: Vec<SparseColumn> = connectome
        .fascicles()
        .par_iter()
        .map(|fascicle| fascicle_column(fascicle, signal, &kernel, &world_to_voxel))
        .collect();

    let matrix = ForwardMatrix::from_columns(signal.n_rows(), signal.n_directions(), columns);
    debug!(
        fascicles = matrix.n_cols(),
        rows = matrix.n_rows(),
        nnz = matrix.nnz(),
        "Forward matrix assembled"
    );
    Ok(matrix)
}

fn unit_tangent(points: &[nalgebra::Point3<f64>], i: usize) -> Option<Vector3<f64>> {
    let last = points.len() - 1;
    let delta = if i == 0 {
        points[1] - points[0]
    } else if i == last {
        points[last] - points[last - 1]
    } else {
        points[i + 1] - points[i - 1]
    };
    let norm = delta.norm();
    (norm > TANGENT_EPSILON).then(|| delta / norm)
}

fn nearest_voxel(world_to_voxel: &Matrix4<f64>, point: &nalgebra::Point3<f64>) -> Option<VoxelCoord> {
    let p = ReferenceFrame::to_voxel_space(world_to_voxel, point);
    let mut voxel = [0usize; 3];
    for (axis, slot) in voxel.iter_mut().enumerate() {
        let rounded = p[axis].round();
        if !rounded.is_finite() || rounded < 0.0 {
            return None;
        }
        *slot = rounded as usize;
    }
    Some(voxel)
}

fn fascicle_column(
    fascicle: &Fascicle,
    signal: &SignalModel,
    kernel: &ResponseKernel,
    world_to_voxel: &Matrix4<f64>,
) -> SparseColumn {
    let points = fascicle.points();
    if points.len() < 2 {
        return Vec::new();
    }

    let n_dirs = kernel.n_directions();
    let mut per_voxel: AHashMap<usize, Vec<f64>> = AHashMap::new();
    let mut skipped = 0usize;

    for (i, point) in points.iter().enumerate() {
        let Some(tangent) = unit_tangent(points, i) else {
            skipped += 1;
            continue;
        };
        let voxel = match nearest_voxel(world_to_voxel, point) {
            Some(coord) if signal.grid().contains(&coord) => signal.voxel_at(&coord),
            _ => None,
        };
        let Some(voxel) = voxel else {
            skipped += 1;
            continue;
        };
        let acc = per_voxel.entry(voxel).or_insert_with(|| vec![0.0; n_dirs]);
        kernel.accumulate_demeaned(&tangent, acc);
    }

    if skipped > 0 {
        trace!(nodes = points.len(), skipped, "Fascicle nodes outside mask or degenerate");
    }

    let mut voxels: Vec<(usize, Vec<f64>)> = per_voxel.into_iter().collect();
    voxels.sort_unstable_by_key(|(v, _)| *v);

    let mut column = Vec::with_capacity(voxels.len() * n_dirs);
    for (v, kernel_sum) in voxels {
        let b0 = signal.b0(v);
        for (d, k) in kernel_sum.iter().enumerate() {
            column.push((v * n_dirs + d, b0 * k));
        }
    }
    column
}

/// Built forward model: connectome, signal and matrix before any fit
#[derive(Debug, Clone)]
pub struct ForwardModel {
    connectome: Arc<Connectome>,
    signal: Arc<SignalModel>,
    response: TensorResponse,
    matrix: Arc<ForwardMatrix>,
}

impl ForwardModel {
    /// # Errors
    /// Same as [`build_forward_matrix`].
    pub fn build(
        connectome: Arc<Connectome>,
        signal: Arc<SignalModel>,
        response: TensorResponse,
    ) -> Result<Self> {
        let matrix = build_forward_matrix(&connectome, &signal, &response)?;
        Ok(Self {
            connectome,
            signal,
            response,
            matrix: Arc::new(matrix),
        })
    }

    pub fn connectome(&self) -> &Arc<Connectome> {
        &self.connectome
    }

    pub fn signal(&self) -> &Arc<SignalModel> {
        &self.signal
    }

    pub fn response(&self) -> &TensorResponse {
        &self.response
    }

    pub fn matrix(&self) -> &Arc<ForwardMatrix> {
        &self.matrix
    }

    pub fn n_fascicles(&self) -> usize {
        self.matrix.n_cols()
    }

    /// Fit non-negative weights against the demeaned signal.
    ///
    /// Non-convergence is reported in the fit diagnostics, not as an error.
    ///
    /// # Errors
    /// Invalid solver options or inconsistent dimensions.
    pub fn fit(&self, options: &SolverOptions) -> Result<FittedModel> {
        let result = solve_nnls(&self.matrix, self.signal.observation(), options)?;
        let weighted = Connectome::clone(&self.connectome)
            .with_weights(result.weights.clone())
            .map_err(|e| LifeError::InvalidInput(format!("solver produced invalid weights: {}", e)))?;
        FittedModel::fitted(
            Arc::new(weighted),
            Arc::clone(&self.signal),
            self.response,
            Arc::clone(&self.matrix),
            Arc::new(result),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use life_structures::{DiffusionVolume, GradientTable, VoxelGrid};
    use ndarray::Array2;

    fn signal() -> SignalModel {
        SignalModel::new(DiffusionVolume {
            grid: VoxelGrid::new([3, 1, 1], ReferenceFrame::identity("acpc")),
            gradients: GradientTable::single_shell(
                vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                1000.0,
            ),
            mask: vec![[0, 0, 0], [1, 0, 0]],
            b0: vec![100.0, 50.0],
            signal: Array2::zeros((2, 3)),
        })
        .unwrap()
    }

    #[test]
    fn test_repeat_visits_accumulate() {
        let signal = signal();
        let single = Connectome::new(
            ReferenceFrame::identity("acpc"),
            vec![Fascicle::from_coords(&[[0.8, 0.0, 0.0], [1.2, 0.0, 0.0]])],
        );
        let double = Connectome::new(
            ReferenceFrame::identity("acpc"),
            vec![Fascicle::from_coords(&[
                [0.7, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.3, 0.0, 0.0],
                [1.4, 0.0, 0.0],
            ])],
        );
        let response = TensorResponse::default();
        let m1 = build_forward_matrix(&single, &signal, &response).unwrap();
        let m2 = build_forward_matrix(&double, &signal, &response).unwrap();

        // Both fascicles only visit voxel 1 along x; twice as many nodes, twice the entry
        assert_eq!(m1.column_voxels(0), vec![1]);
        let (_, v1) = m1.column(0);
        let (_, v2) = m2.column(0);
        for (a, b) in v1.iter().zip(v2) {
            approx::assert_relative_eq!(2.0 * a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_b0_scales_entries() {
        let signal = signal();
        let connectome = Connectome::new(
            ReferenceFrame::identity("acpc"),
            vec![
                Fascicle::from_coords(&[[-0.2, 0.0, 0.0], [0.2, 0.0, 0.0]]),
                Fascicle::from_coords(&[[0.8, 0.0, 0.0], [1.2, 0.0, 0.0]]),
            ],
        );
        let m = build_forward_matrix(&connectome, &signal, &TensorResponse::default()).unwrap();
        let (_, a) = m.column(0);
        let (_, b) = m.column(1);
        for (x, y) in a.iter().zip(b) {
            approx::assert_relative_eq!(*x, 2.0 * y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_out_of_grid_nodes_are_skipped() {
        let signal = signal();
        let connectome = Connectome::new(
            ReferenceFrame::identity("acpc"),
            vec![
                Fascicle::from_coords(&[[-5.0, 0.0, 0.0], [-4.0, 0.0, 0.0]]),
                // Voxel (2,0,0) is in the grid but not the mask
                Fascicle::from_coords(&[[2.0, 0.0, 0.0], [2.2, 0.0, 0.0]]),
                Fascicle::from_coords(&[[0.0, 0.0, 0.0]]),
            ],
        );
        let m = build_forward_matrix(&connectome, &signal, &TensorResponse::default()).unwrap();
        assert_eq!(m.n_cols(), 3);
        assert!((0..3).all(|f| m.column_is_zero(f)));
    }

    #[test]
    fn test_flat_kernel_keeps_traversed_voxel() {
        // Equal angle to every gradient: the demeaned kernel is flat
        let signal = signal();
        let connectome = Connectome::new(
            ReferenceFrame::identity("acpc"),
            vec![Fascicle::from_coords(&[[0.9, -0.1, -0.1], [1.1, 0.1, 0.1]])],
        );
        let m = build_forward_matrix(&connectome, &signal, &TensorResponse::default()).unwrap();
        assert!(!m.column_is_zero(0));
        assert_eq!(m.column_voxels(0), vec![1]);
        assert_eq!(m.nnz(), 3);
        let (_, values) = m.column(0);
        assert!(values.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn test_frame_mismatch_is_fatal() {
        let signal = signal();
        let connectome = Connectome::new(ReferenceFrame::identity("mni"), Vec::new());
        assert!(matches!(
            build_forward_matrix(&connectome, &signal, &TensorResponse::default()),
            Err(LifeError::GeometryMismatch(_))
        ));
    }
}
