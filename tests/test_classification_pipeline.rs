mod common;

use common::{write_feature_raster, write_label_raster};
use std::fs;
use std::path::{Path, PathBuf};
use verdant::{
    classify_tile, BatchOptions, BatchOrchestrator, CanopyError, ClassificationJob, EnsembleKind,
};

const SIZE: usize = 20;

/// Training pair: left half is class 1 with low index values, right half
/// class 2 with high values.
fn setup_training(dir: &Path) -> (PathBuf, PathBuf) {
    let labels = dir.join("training_raster.tif");
    let feature = dir.join("training_fit.tif");
    write_label_raster(&labels, SIZE, SIZE, |_, col| if col < SIZE / 2 { 1 } else { 2 });
    write_feature_raster(&feature, SIZE, SIZE, |row, col| {
        let base = if col < SIZE / 2 { -0.5 } else { 0.5 };
        base + row as f32 * 0.001
    });
    (labels, feature)
}

fn setup_input(dir: &Path) -> PathBuf {
    let input_dir = dir.join("arvi");
    fs::create_dir_all(&input_dir).unwrap();
    write_feature_raster(
        &input_dir.join("arvi_tile_01.tif"),
        SIZE,
        SIZE,
        |row, col| {
            let base = if col < SIZE / 2 { -0.4 } else { 0.6 };
            base + row as f32 * 0.001
        },
    );
    input_dir
}

#[test]
fn test_random_forest_batch_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (labels, feature) = setup_training(dir.path());
    let input_dir = setup_input(dir.path());
    let output_dir = dir.path().join("outputs");

    let job = ClassificationJob::load(EnsembleKind::RandomForest, &labels, &feature, true).unwrap();
    let orchestrator = BatchOrchestrator::new(BatchOptions::default());
    let report = orchestrator
        .run_classification(&input_dir, &output_dir, &job)
        .unwrap();
    assert_eq!(report.written.len(), 1, "{:?}", report.failures);

    let output = output_dir.join("rf_arvi_tile_01.tif");
    assert!(output.exists());

    let classified = verdant::io::read_label_raster(&output).unwrap();
    assert_eq!(classified.data.dim(), (SIZE, SIZE));
    // The model never invents classes outside the training labels.
    assert!(classified.data.iter().all(|&c| c == 1 || c == 2));
    // Clean separation survives the median smoothing.
    assert_eq!(classified.data[[10, 2]], 1);
    assert_eq!(classified.data[[10, 17]], 2);
}

#[test]
fn test_extra_trees_prefix_and_domain() {
    let dir = tempfile::tempdir().unwrap();
    let (labels, feature) = setup_training(dir.path());
    let input_dir = setup_input(dir.path());
    let output_dir = dir.path().join("outputs");

    let job = ClassificationJob::load(EnsembleKind::ExtraTrees, &labels, &feature, false).unwrap();
    let orchestrator = BatchOrchestrator::new(BatchOptions::default());
    let report = orchestrator
        .run_classification(&input_dir, &output_dir, &job)
        .unwrap();
    assert_eq!(report.written.len(), 1, "{:?}", report.failures);

    let output = output_dir.join("erf_arvi_tile_01.tif");
    let classified = verdant::io::read_label_raster(&output).unwrap();
    assert!(classified.data.iter().all(|&c| c == 1 || c == 2));
}

#[test]
fn test_single_class_training_fails_per_tile_and_batch_continues() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("training_raster.tif");
    let feature = dir.path().join("training_fit.tif");
    write_label_raster(&labels, SIZE, SIZE, |_, _| 1);
    write_feature_raster(&feature, SIZE, SIZE, |_, col| col as f32);
    let input_dir = setup_input(dir.path());
    let output_dir = dir.path().join("outputs");

    let job = ClassificationJob::load(EnsembleKind::RandomForest, &labels, &feature, true).unwrap();
    let orchestrator = BatchOrchestrator::new(BatchOptions::default());
    let report = orchestrator
        .run_classification(&input_dir, &output_dir, &job)
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].error.contains("insufficient classes"));
}

#[test]
fn test_misaligned_training_pair_is_alignment_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let labels = dir.path().join("training_raster.tif");
    let feature = dir.path().join("training_fit.tif");
    write_label_raster(&labels, 10, 10, |_, col| if col < 5 { 1 } else { 2 });
    write_feature_raster(&feature, SIZE, SIZE, |_, col| col as f32);
    let input_dir = setup_input(dir.path());

    let job = ClassificationJob::load(EnsembleKind::RandomForest, &labels, &feature, true).unwrap();
    let result = classify_tile(
        &job,
        &input_dir.join("arvi_tile_01.tif"),
        &dir.path().join("rf_out.tif"),
        false,
    );
    assert!(matches!(result, Err(CanopyError::AlignmentMismatch { .. })));
}

#[test]
fn test_classification_batch_skips_then_detects_stale_training() {
    let dir = tempfile::tempdir().unwrap();
    let (labels, feature) = setup_training(dir.path());
    let input_dir = setup_input(dir.path());
    let output_dir = dir.path().join("outputs");

    let job = ClassificationJob::load(EnsembleKind::RandomForest, &labels, &feature, true).unwrap();
    let orchestrator = BatchOrchestrator::new(BatchOptions::default());
    orchestrator
        .run_classification(&input_dir, &output_dir, &job)
        .unwrap();

    // Same job again: filename + ledger agree, nothing recomputed.
    let second = orchestrator
        .run_classification(&input_dir, &output_dir, &job)
        .unwrap();
    assert_eq!(second.written.len(), 0);
    assert_eq!(second.skipped.len(), 1);

    // Swap the training classes on disk; the existing output is now stale
    // and must be recomputed even without --force.
    write_label_raster(&labels, SIZE, SIZE, |_, col| if col < SIZE / 2 { 2 } else { 1 });
    let swapped =
        ClassificationJob::load(EnsembleKind::RandomForest, &labels, &feature, true).unwrap();
    let third = orchestrator
        .run_classification(&input_dir, &output_dir, &swapped)
        .unwrap();
    assert_eq!(third.written.len(), 1, "{:?}", third.failures);

    let classified = verdant::io::read_label_raster(output_dir.join("rf_arvi_tile_01.tif")).unwrap();
    // Left half now classifies as 2 under the swapped labels.
    assert_eq!(classified.data[[10, 2]], 2);
    assert_eq!(classified.data[[10, 17]], 1);
}
