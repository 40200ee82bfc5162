//! Verdant: A Fast, Modular Canopy Classification Pipeline for NAIP Imagery
//!
//! This library computes per-pixel vegetation indices (ARVI, VARI, VDVI)
//! from 4-band aerial imagery tiles, rasterizes vector training labels onto
//! a reference grid, classifies each pixel into canopy / non-canopy classes
//! with an ensemble-of-trees model, optionally smooths the result, and
//! orchestrates all of it idempotently across a directory tree of tiles.

pub mod config;
pub mod core;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    ensure_aligned, BandArray, CanopyError, CanopyResult, ClassArray, ClassGrid, GeoTransform,
    Georeferenced, IndexGrid, LabelGrid, NaipTile, RasterGrid,
};

pub use crate::core::{
    rasterize_polygons, EnsembleKind, Smoother, TrainingPolygon, TreeEnsemble, VegetationIndex,
};

pub use config::PipelineConfig;
pub use pipeline::{
    classify_tile, derived_name, index_tile, prepare_training, BatchOptions, BatchOrchestrator,
    BatchReport, ClassificationJob, Outcome,
};
