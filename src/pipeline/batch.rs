use crate::core::index::VegetationIndex;
use crate::pipeline::ledger::{fingerprint_input, JobLedger, SkipStatus};
use crate::pipeline::ops::{classify_tile, derived_name, index_tile, ClassificationJob, Outcome};
use crate::types::{CanopyError, CanopyResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Batch-wide policy switches, explicit rather than implied by exceptions
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Recompute outputs even when they already exist
    pub force: bool,
    /// Abort the batch on the first per-file error instead of recording it
    /// and continuing
    pub halt_on_error: bool,
}

/// One tile that failed, with the error it failed with
#[derive(Debug, Clone)]
pub struct TileFailure {
    pub input: PathBuf,
    pub error: String,
}

/// Per-file accounting for one batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    /// Walked files that are not rasters of the expected kind
    pub unsupported: Vec<PathBuf>,
    pub failures: Vec<TileFailure>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} written, {} skipped, {} unsupported, {} failed",
            self.written.len(),
            self.skipped.len(),
            self.unsupported.len(),
            self.failures.len()
        )
    }
}

/// Applies one single-tile operation to every eligible file under an input
/// tree, writing derived outputs into a mirrored output tree.
///
/// Tiles are processed sequentially and independently; the only shared
/// state is idempotent output-directory creation. By default a tile's
/// failure is recorded and the walk continues.
pub struct BatchOrchestrator {
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    /// Compute one vegetation index for every tile under `input_dir`
    pub fn run_index(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        index: VegetationIndex,
    ) -> CanopyResult<BatchReport> {
        let operation = format!("index:{}", index.prefix());
        let params = format!("formula={}", index.prefix());
        self.run(
            input_dir,
            output_dir,
            index.prefix(),
            &operation,
            &params,
            |input, output, force| index_tile(input, output, index, force),
        )
    }

    /// Classify (and optionally smooth) every index raster under
    /// `input_dir` with the job's ensemble strategy
    pub fn run_classification(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        job: &ClassificationJob,
    ) -> CanopyResult<BatchReport> {
        let operation = format!("classify:{}", job.prefix());
        self.run(
            input_dir,
            output_dir,
            job.prefix(),
            &operation,
            job.params(),
            |input, output, force| classify_tile(job, input, output, force),
        )
    }

    fn run(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        prefix: &str,
        operation: &str,
        params: &str,
        op: impl Fn(&Path, &Path, bool) -> CanopyResult<Outcome>,
    ) -> CanopyResult<BatchReport> {
        if !input_dir.is_dir() {
            return Err(CanopyError::InputNotFound {
                path: input_dir.to_path_buf(),
            });
        }
        // Creating an already-existing directory is not an error.
        std::fs::create_dir_all(output_dir)?;

        log::info!(
            "Batch {}: {} -> {}",
            operation,
            input_dir.display(),
            output_dir.display()
        );

        let mut ledger = JobLedger::open(output_dir);
        let mut report = BatchReport::default();

        for entry in WalkDir::new(input_dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    if self.options.halt_on_error {
                        return Err(CanopyError::Processing(format!("walk error: {}", e)));
                    }
                    report.failures.push(TileFailure {
                        input: e.path().map(Path::to_path_buf).unwrap_or_default(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let input = entry.path();

            let Some(file_name) = input.file_name().and_then(|n| n.to_str()) else {
                report.unsupported.push(input.to_path_buf());
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            let extension = input
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase());
            if !matches!(extension.as_deref(), Some("tif") | Some("tiff")) {
                log::warn!("Skipping unsupported file: {}", input.display());
                report.unsupported.push(input.to_path_buf());
                continue;
            }

            // Mirror the input subtree below the output directory.
            let relative = input.strip_prefix(input_dir).unwrap_or(input);
            let parent = relative.parent().unwrap_or_else(|| Path::new(""));
            let out_name = derived_name(prefix, input)?;
            let out_path = output_dir.join(parent).join(&out_name);
            let key = JobLedger::key(operation, &parent.join(&out_name).to_string_lossy());

            let result = self.process_file(
                &mut ledger,
                output_dir,
                &op,
                input,
                &out_path,
                &key,
                params,
            );
            match result {
                Ok(Outcome::Written(path)) => report.written.push(path),
                Ok(Outcome::Skipped(path)) => report.skipped.push(path),
                Err(CanopyError::UnsupportedFormat { path, reason }) => {
                    log::warn!("Unsupported input {}: {}", path.display(), reason);
                    report.unsupported.push(path);
                }
                Err(e) => {
                    log::error!("Failed to process {}: {}", input.display(), e);
                    if self.options.halt_on_error {
                        return Err(e);
                    }
                    report.failures.push(TileFailure {
                        input: input.to_path_buf(),
                        error: e.to_string(),
                    });
                }
            }
        }

        log::info!("Batch {} complete: {}", operation, report.summary());
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_file(
        &self,
        ledger: &mut JobLedger,
        output_dir: &Path,
        op: &impl Fn(&Path, &Path, bool) -> CanopyResult<Outcome>,
        input: &Path,
        out_path: &Path,
        key: &str,
        params: &str,
    ) -> CanopyResult<Outcome> {
        let fingerprint = fingerprint_input(input, params)?;

        let mut effective_force = self.options.force;
        if out_path.exists() && !effective_force {
            match ledger.status(key, &fingerprint) {
                SkipStatus::Fresh => {
                    log::debug!("Ledger fresh, skipping {}", out_path.display());
                    return Ok(Outcome::Skipped(out_path.to_path_buf()));
                }
                SkipStatus::Unknown => {
                    // Filename convention is the baseline mechanism.
                    log::debug!("No ledger entry, skipping existing {}", out_path.display());
                    return Ok(Outcome::Skipped(out_path.to_path_buf()));
                }
                SkipStatus::Stale => {
                    log::warn!(
                        "Stale output {} (input or parameters changed), recomputing",
                        out_path.display()
                    );
                    effective_force = true;
                }
            }
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let outcome = op(input, out_path, effective_force)?;
        if let Outcome::Written(_) = &outcome {
            ledger.record(key.to_string(), fingerprint, params.to_string());
            if let Err(e) = ledger.save(output_dir) {
                log::warn!("Failed to save job ledger: {}", e);
            }
        }
        Ok(outcome)
    }
}
