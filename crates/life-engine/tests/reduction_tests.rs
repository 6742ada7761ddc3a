// Copyright 2025 LiFE Developers
// SPDX-License-Identifier: Apache-2.0

//! Connectome reduction after a fit

mod common;

use common::*;
use life_engine::{
    build_forward_matrix, evaluate_reduced_tract, evaluate_reduced_tracts, LesionOptions,
    LesionOutcome, ModelStage, SolverOptions,
};
use life_structures::{LifeError, TractClassification};

#[test]
fn test_only_explaining_fascicle_is_kept() {
    let (connectome, volume) = single_voxel_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");

    assert!((fitted.weights()[0] - 1.0).abs() < 1e-3);
    assert_eq!(&fitted.weights()[1..], &[0.0, 0.0]);

    let (reduced, map) = fitted.reduce(0.0).expect("Failed to reduce");
    assert_eq!(reduced.stage(), ModelStage::Reduced);
    assert_eq!(reduced.n_fascicles(), 1);
    assert_eq!(map.kept(), &[0]);
    assert_eq!(map.original_len(), 3);
    assert_eq!(reduced.connectome().fascicles()[0], fitted.connectome().fascicles()[0]);
}

#[test]
fn test_reduced_weights_are_positive() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (reduced, map) = fitted.reduce(0.0).expect("Failed to reduce");

    assert_eq!(map.kept(), &[0, 1]);
    assert!(reduced.weights().iter().all(|&w| w > 0.0));
    for (new, &old) in map.kept().iter().enumerate() {
        assert_eq!(reduced.weights()[new], fitted.weights()[old]);
        assert_eq!(map.to_original(new), Some(old));
    }
    assert_eq!(map.to_reduced(2), None);
}

#[test]
fn test_reduction_preserves_prediction() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (reduced, _) = fitted.reduce(0.0).expect("Failed to reduce");

    let full = fitted.prediction().expect("Failed to predict full model");
    let kept = reduced.prediction().expect("Failed to predict reduced model");
    for (a, b) in full.iter().zip(&kept) {
        assert!((a - b).abs() < 1e-9);
    }
    assert!((reduced.summary().rmse - fitted.summary().rmse).abs() < 1e-9);
}

#[test]
fn test_rebuilt_matrix_matches_reduced_columns() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let min_positive = fitted
        .weights()
        .iter()
        .copied()
        .filter(|&w| w > 0.0)
        .fold(f64::INFINITY, f64::min);
    let (reduced, _) = fitted.reduce(min_positive - 1e-9).expect("Failed to reduce");

    let rebuilt = build_forward_matrix(reduced.connectome(), reduced.signal(), reduced.response())
        .expect("Failed to rebuild matrix");
    let prediction = rebuilt
        .mul_vec(reduced.weights())
        .expect("Failed to predict rebuilt model");
    let expected = fitted.prediction().expect("Failed to predict fitted model");
    for (a, b) in prediction.iter().zip(&expected) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_threshold_prunes_weak_fascicles() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (reduced, map) = fitted.reduce(0.75).expect("Failed to reduce");
    assert_eq!(map.kept(), &[0]);
    assert_eq!(reduced.n_fascicles(), 1);
}

#[test]
fn test_input_model_is_untouched() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let before = fitted.weights().to_vec();
    let _ = fitted.reduce(0.0).expect("Failed to reduce");

    assert_eq!(fitted.weights(), before.as_slice());
    assert_eq!(fitted.n_fascicles(), 4);
}

#[test]
fn test_invalid_threshold_is_rejected() {
    let (connectome, volume) = single_voxel_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    assert!(matches!(fitted.reduce(-1.0), Err(LifeError::InvalidInput(_))));
    assert!(matches!(fitted.reduce(f64::NAN), Err(LifeError::InvalidInput(_))));
}

#[test]
fn test_classification_remap() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (_, map) = fitted.reduce(0.0).expect("Failed to reduce");

    let classification = TractClassification::new()
        .with_tract("arcuate", vec![1, 2])
        .with_tract("pruned", vec![2, 3]);
    let remapped = map
        .remap_classification(&classification)
        .expect("Failed to remap");
    assert_eq!(remapped.tracts.get("arcuate"), Some(&[1][..]));
    assert_eq!(remapped.tracts.get("pruned"), None);
    assert_eq!(remapped.pruned.get("pruned"), Some(&[2, 3][..]));

    let bad = TractClassification::new().with_tract("bad", vec![7]);
    assert_eq!(
        map.remap_classification(&bad).unwrap_err(),
        LifeError::IndexOutOfRange { index: 7, len: 4 }
    );
}

#[test]
fn test_pruned_tract_has_zero_evidence_in_reduced_model() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (reduced, map) = fitted.reduce(0.0).expect("Failed to reduce");
    let options = LesionOptions {
        bootstrap_samples: 200,
        monte_carlo_repeats: 2,
        ..LesionOptions::default()
    };

    let classification = TractClassification::new()
        .with_tract("x_tract", vec![0])
        .with_tract("z_tract", vec![2])
        .with_tract("outside", vec![3]);
    let remapped = map
        .remap_classification(&classification)
        .expect("Failed to remap");
    assert_eq!(remapped.pruned.get("z_tract"), Some(&[2][..]));

    let report = evaluate_reduced_tracts(&fitted, &reduced, &map, &classification, &options);
    assert_eq!(report.len(), 3);

    let z = report
        .get("z_tract")
        .and_then(LesionOutcome::result)
        .expect("pruned tract is evaluated, not NoEvidence");
    assert!(z.fascicles.is_empty());
    assert_eq!(z.pruned, vec![2]);
    assert_eq!(z.voxels.len(), 3);
    assert_eq!(z.rmse_full, z.rmse_lesioned);
    assert_eq!(z.statistics.strength_of_evidence, 0.0);
    assert_eq!(z.statistics.earth_movers_distance, 0.0);
    assert_eq!(z.statistics.variance_explained_delta, 0.0);

    // Never traverses the mask: still no evidence
    assert!(matches!(
        report.get("outside"),
        Some(LesionOutcome::NoEvidence { .. })
    ));

    let x = report
        .get("x_tract")
        .and_then(LesionOutcome::result)
        .expect("x_tract evaluated");
    let direct = reduced
        .lesion("x_tract", &[0], &options)
        .expect("Failed to lesion reduced model");
    assert_eq!(x, &direct);
}

#[test]
fn test_reduced_evaluation_rejects_foreign_models() {
    let (connectome, volume) = lesion_scenario();
    let fitted = forward_model(connectome, volume)
        .fit(&SolverOptions::default())
        .expect("Failed to fit weights");
    let (reduced, map) = fitted.reduce(0.0).expect("Failed to reduce");

    assert!(matches!(
        evaluate_reduced_tract(&reduced, &reduced, &map, "x", &[0], &LesionOptions::default()),
        Err(LifeError::DimensionMismatch { .. })
    ));
    assert_eq!(
        evaluate_reduced_tract(&fitted, &reduced, &map, "x", &[9], &LesionOptions::default())
            .unwrap_err(),
        LifeError::IndexOutOfRange { index: 9, len: 4 }
    );
}
