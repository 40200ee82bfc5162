use crate::core::classify::{EnsembleKind, TreeEnsemble};
use crate::core::index::VegetationIndex;
use crate::core::rasterize::rasterize_polygons;
use crate::core::smooth::Smoother;
use crate::io::raster::{read_index_raster, read_label_raster, read_naip_tile, write_raster};
use crate::io::vector::read_training_polygons;
use crate::pipeline::ledger::fingerprint_input;
use crate::types::{CanopyError, CanopyResult, IndexGrid, LabelGrid};
use std::path::{Path, PathBuf};

/// Result of one idempotent single-tile operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The output was computed and written
    Written(PathBuf),
    /// The output already existed and `force` was not set
    Skipped(PathBuf),
}

impl Outcome {
    pub fn path(&self) -> &Path {
        match self {
            Outcome::Written(p) | Outcome::Skipped(p) => p,
        }
    }
}

/// Derived output name: `{prefix}_{original filename}`.
///
/// This convention is the skip-if-exists mechanism for batch runs and must
/// stay byte-for-byte stable.
pub fn derived_name(prefix: &str, input: &Path) -> CanopyResult<String> {
    let file_name = input
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CanopyError::UnsupportedFormat {
            path: input.to_path_buf(),
            reason: "file name is not valid UTF-8".to_string(),
        })?;
    Ok(format!("{}_{}", prefix, file_name))
}

/// Compute one vegetation index raster from one NAIP tile.
///
/// Idempotent: if the output file exists the operation is an explicit
/// skip unless `force` is set.
pub fn index_tile(
    input: &Path,
    output: &Path,
    index: VegetationIndex,
    force: bool,
) -> CanopyResult<Outcome> {
    if output.exists() && !force {
        log::info!("Output {} exists, skipping", output.display());
        return Ok(Outcome::Skipped(output.to_path_buf()));
    }

    let tile = read_naip_tile(input)?;
    let grid = index.compute_grid(&tile);
    write_raster(output, &grid)?;
    Ok(Outcome::Written(output.to_path_buf()))
}

/// Burn a polygon layer onto the grid of a reference raster and write the
/// byte label raster.
///
/// The reference raster supplies width, height, geotransform, and
/// projection; the output is aligned to it by construction.
pub fn prepare_training(
    vector: &Path,
    field: Option<&str>,
    reference: &Path,
    output: &Path,
) -> CanopyResult<PathBuf> {
    let polygons = read_training_polygons(vector, field)?;
    let reference_grid = read_index_raster(reference)?;
    let labels = rasterize_polygons(&polygons, &reference_grid)?;
    write_raster(output, &labels)?;
    log::info!("Vector to raster complete: {}", output.display());
    Ok(output.to_path_buf())
}

/// A classification job: which ensemble strategy to use, the training pair
/// it fits from, and whether the output is smoothed.
///
/// The training rasters are loaded once per job; the fitted model itself
/// is ephemeral and rebuilt for every tile.
#[derive(Debug)]
pub struct ClassificationJob {
    pub kind: EnsembleKind,
    pub smoothing: bool,
    labels: LabelGrid,
    feature: IndexGrid,
    params: String,
}

impl ClassificationJob {
    pub fn load(
        kind: EnsembleKind,
        labels_path: &Path,
        feature_path: &Path,
        smoothing: bool,
    ) -> CanopyResult<Self> {
        let labels = read_label_raster(labels_path)?;
        let feature = read_index_raster(feature_path)?;

        // Training inputs are part of the job identity: if they change,
        // existing outputs become stale in the ledger.
        let labels_fp = fingerprint_input(labels_path, "")?;
        let feature_fp = fingerprint_input(feature_path, "")?;
        let params = format!(
            "model={};smoothing={};labels={};feature={}",
            kind, smoothing, labels_fp, feature_fp
        );

        Ok(Self {
            kind,
            smoothing,
            labels,
            feature,
            params,
        })
    }

    /// Operation parameter string used for ledger fingerprints
    pub fn params(&self) -> &str {
        &self.params
    }

    /// Output filename prefix for this job's strategy
    pub fn prefix(&self) -> &'static str {
        self.kind.prefix()
    }
}

/// Classify one index raster: fit an ephemeral ensemble from the job's
/// training pair, predict over the tile, optionally smooth, and write the
/// byte class raster.
pub fn classify_tile(
    job: &ClassificationJob,
    input: &Path,
    output: &Path,
    force: bool,
) -> CanopyResult<Outcome> {
    if output.exists() && !force {
        log::info!("Output {} exists, skipping", output.display());
        return Ok(Outcome::Skipped(output.to_path_buf()));
    }

    let tile = read_index_raster(input)?;

    // Fit fresh per tile; the model never outlives the job's unit of work.
    let model = TreeEnsemble::fit(job.kind, &job.labels, &job.feature)?;
    let mut classified = model.predict(&tile)?;
    if job.smoothing {
        classified = Smoother::new().apply(&classified);
    }

    write_raster(output, &classified)?;
    Ok(Outcome::Written(output.to_path_buf()))
}
