// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Forward model construction against synthetic volumes

mod common;

use common::*;
use life_engine::{build_forward_matrix, SignalModel, TensorResponse};
use life_structures::{Connectome, Fascicle, LifeError, ReferenceFrame};

#[test]
fn test_columns_follow_fascicle_order() {
    let (connectome, volume) = lesion_scenario();
    let model = forward_model(connectome, volume);
    let matrix = model.matrix();

    assert_eq!(matrix.n_cols(), 4);
    assert_eq!(matrix.n_rows(), 27 * 6);

    let coord = |c| model.signal().voxel_at(&c).expect("voxel in mask");
    assert_eq!(
        matrix.column_voxels(0),
        vec![coord([0, 1, 1]), coord([1, 1, 1]), coord([2, 1, 1])]
    );
    assert_eq!(
        matrix.column_voxels(1),
        vec![coord([1, 0, 0]), coord([1, 1, 0]), coord([1, 2, 0])]
    );
    assert_eq!(
        matrix.column_voxels(2),
        vec![coord([0, 2, 0]), coord([0, 2, 1]), coord([0, 2, 2])]
    );
}

#[test]
fn test_fascicle_outside_grid_has_zero_column() {
    let (connectome, volume) = lesion_scenario();
    let model = forward_model(connectome, volume);
    assert!(model.matrix().column_is_zero(3));
    assert!(model.matrix().column_voxels(3).is_empty());
    assert!(!model.matrix().column_is_zero(0));
}

#[test]
fn test_fascicle_outside_mask_has_zero_column() {
    let mask = vec![[0, 0, 0], [2, 2, 2]];
    let volume = flat_volume(mask);
    let connectome = Connectome::new(
        frame(),
        vec![Fascicle::from_coords(&[[0.8, 1.0, 1.0], [1.2, 1.0, 1.0]])],
    );
    let signal = SignalModel::new(volume).expect("Failed to build signal model");
    let matrix = build_forward_matrix(&connectome, &signal, &TensorResponse::default())
        .expect("Failed to build forward matrix");
    assert_eq!(matrix.n_rows(), 2 * 6);
    assert_eq!(matrix.nnz(), 0);
}

#[test]
fn test_traversed_voxel_with_flat_kernel_keeps_column() {
    let (connectome, volume) = flat_kernel_scenario();
    let model = forward_model(connectome, volume);
    let matrix = model.matrix();

    assert!(!matrix.column_is_zero(0));
    assert_eq!(matrix.column_voxels(0), vec![0]);
    assert_eq!(matrix.nnz(), 3);
    let (rows, values) = matrix.column(0);
    assert_eq!(rows, &[0, 1, 2]);
    assert!(values.iter().all(|v| v.abs() < 1e-9));
}

#[test]
fn test_voxel_blocks_are_demeaned() {
    let (connectome, volume) = lesion_scenario();
    let model = forward_model(connectome, volume);
    let matrix = model.matrix();

    let (rows, values) = matrix.column(0);
    let mut sums = std::collections::BTreeMap::new();
    for (&row, &value) in rows.iter().zip(values) {
        *sums.entry(row / matrix.n_directions()).or_insert(0.0) += value;
    }
    assert_eq!(sums.len(), 3);
    for (voxel, sum) in sums {
        let scale = b0_for(voxel) * 5.0;
        assert!(sum.abs() < 1e-9 * scale, "voxel {} block sums to {}", voxel, sum);
    }
}

#[test]
fn test_build_is_deterministic() {
    let (connectome, volume) = lesion_scenario();
    let signal = SignalModel::new(volume).expect("Failed to build signal model");
    let response = TensorResponse::default();

    let first = build_forward_matrix(&connectome, &signal, &response).expect("first build");
    let second = build_forward_matrix(&connectome, &signal, &response).expect("second build");
    for col in 0..first.n_cols() {
        assert_eq!(first.column(col), second.column(col));
    }
}

#[test]
fn test_inconsistent_frames_are_rejected() {
    let (_, volume) = lesion_scenario();
    let signal = SignalModel::new(volume).expect("Failed to build signal model");
    let connectome = Connectome::new(
        ReferenceFrame::identity("mni"),
        vec![line([0.0, 1.0, 1.0], [2.0, 1.0, 1.0])],
    );

    let err = build_forward_matrix(&connectome, &signal, &TensorResponse::default()).unwrap_err();
    assert!(matches!(err, LifeError::GeometryMismatch(_)));
}

#[test]
fn test_prediction_matches_synthesized_signal() {
    let (connectome, volume) = single_voxel_scenario();
    let model = forward_model(connectome, volume);
    let predicted = model
        .matrix()
        .mul_vec(&[1.0, 0.0, 0.0])
        .expect("Failed to predict");
    let observed = model.signal().observation();
    for (p, y) in predicted.iter().zip(observed) {
        assert!((p - y).abs() < 1e-9, "prediction {} vs observation {}", p, y);
    }
}
