use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use verdant::{
    BatchOptions, BatchOrchestrator, BatchReport, ClassificationJob, EnsembleKind, PipelineConfig,
    VegetationIndex,
};

#[derive(Parser)]
#[command(
    name = "verdant",
    version,
    about = "Canopy classification pipeline for NAIP imagery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute a vegetation index for every tile under a directory
    Index {
        /// Directory tree of 4-band NAIP tiles
        #[arg(long)]
        input: PathBuf,
        /// Output directory (created if absent)
        #[arg(long)]
        output: PathBuf,
        /// Index formula: arvi, vari, or vdvi
        #[arg(long, default_value = "arvi")]
        index: String,
        /// Recompute outputs that already exist
        #[arg(long)]
        force: bool,
        /// Abort on the first per-file error
        #[arg(long)]
        halt_on_error: bool,
    },
    /// Burn a training polygon layer onto the grid of a reference raster
    Rasterize {
        /// Polygon layer with training data
        #[arg(long)]
        vector: PathBuf,
        /// Raster supplying the target grid and georeferencing
        #[arg(long)]
        reference: PathBuf,
        /// Output label raster
        #[arg(long)]
        output: PathBuf,
        /// Integer attribute field with class ids (burns 1 if omitted)
        #[arg(long)]
        field: Option<String>,
    },
    /// Classify index rasters with an ensemble-of-trees model
    Classify {
        /// Directory tree of index rasters to classify
        #[arg(long)]
        input: PathBuf,
        /// Output directory (created if absent)
        #[arg(long)]
        output: PathBuf,
        /// Rasterized training labels
        #[arg(long)]
        labels: PathBuf,
        /// Index raster the training labels align to
        #[arg(long)]
        feature: PathBuf,
        /// Classifier strategy: random-forest or extra-trees
        #[arg(long, default_value = "random-forest")]
        model: String,
        /// Write the raw prediction without the 5x5 median smoothing
        #[arg(long)]
        no_smoothing: bool,
        /// Recompute outputs that already exist
        #[arg(long)]
        force: bool,
        /// Abort on the first per-file error
        #[arg(long)]
        halt_on_error: bool,
    },
    /// Drive the full workspace pipeline (index, rasterize, classify) from
    /// a configuration file
    Run {
        /// Pipeline configuration JSON
        #[arg(long)]
        config: PathBuf,
        /// Index formula: arvi, vari, or vdvi
        #[arg(long, default_value = "arvi")]
        index: String,
        /// Classifier strategy: random-forest or extra-trees
        #[arg(long, default_value = "random-forest")]
        model: String,
        /// Write the raw prediction without the 5x5 median smoothing
        #[arg(long)]
        no_smoothing: bool,
        /// Recompute outputs that already exist
        #[arg(long)]
        force: bool,
        /// Abort on the first per-file error
        #[arg(long)]
        halt_on_error: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Index {
            input,
            output,
            index,
            force,
            halt_on_error,
        } => {
            let index: VegetationIndex = index.parse()?;
            let orchestrator = BatchOrchestrator::new(BatchOptions {
                force,
                halt_on_error,
            });
            let report = orchestrator
                .run_index(&input, &output, index)
                .with_context(|| format!("index batch over {} failed", input.display()))?;
            finish(&[report])
        }
        Command::Rasterize {
            vector,
            reference,
            output,
            field,
        } => {
            let written =
                verdant::prepare_training(&vector, field.as_deref(), &reference, &output)?;
            log::info!("Wrote {}", written.display());
            Ok(())
        }
        Command::Classify {
            input,
            output,
            labels,
            feature,
            model,
            no_smoothing,
            force,
            halt_on_error,
        } => {
            let kind: EnsembleKind = model.parse()?;
            let job = ClassificationJob::load(kind, &labels, &feature, !no_smoothing)
                .context("failed to load training data")?;
            let orchestrator = BatchOrchestrator::new(BatchOptions {
                force,
                halt_on_error,
            });
            let report = orchestrator
                .run_classification(&input, &output, &job)
                .with_context(|| format!("classification batch over {} failed", input.display()))?;
            finish(&[report])
        }
        Command::Run {
            config,
            index,
            model,
            no_smoothing,
            force,
            halt_on_error,
        } => {
            let config = PipelineConfig::load(&config)?;
            let index: VegetationIndex = index.parse()?;
            let kind: EnsembleKind = model.parse()?;
            let orchestrator = BatchOrchestrator::new(BatchOptions {
                force,
                halt_on_error,
            });

            let index_dir = config.results_dir.join(index.prefix());
            let index_report = orchestrator
                .run_index(&config.imagery_dir, &index_dir, index)
                .context("index stage failed")?;

            if force || !config.training_raster.exists() {
                verdant::prepare_training(
                    &config.training_vector,
                    config.training_field.as_deref(),
                    &config.training_feature,
                    &config.training_raster,
                )
                .context("training rasterization failed")?;
            } else {
                log::info!(
                    "Training raster {} exists, skipping rasterization",
                    config.training_raster.display()
                );
            }

            let job = ClassificationJob::load(
                kind,
                &config.training_raster,
                &config.training_feature,
                !no_smoothing,
            )
            .context("failed to load training data")?;
            let class_dir = config.results_dir.join("classified");
            let class_report = orchestrator
                .run_classification(&index_dir, &class_dir, &job)
                .context("classification stage failed")?;

            finish(&[index_report, class_report])
        }
    }
}

fn finish(reports: &[BatchReport]) -> Result<()> {
    let mut failed = 0;
    for report in reports {
        log::info!("{}", report.summary());
        for failure in &report.failures {
            log::error!("{}: {}", failure.input.display(), failure.error);
        }
        failed += report.failures.len();
    }
    if failed > 0 {
        bail!("{} file(s) failed", failed);
    }
    Ok(())
}
