//! Core canopy processing modules

pub mod classify;
pub mod index;
pub mod rasterize;
pub mod smooth;

// Re-export main types
pub use classify::{EnsembleKind, TreeEnsemble, MIN_LEAF_SAMPLES, TREE_COUNT};
pub use index::VegetationIndex;
pub use rasterize::{rasterize_polygons, TrainingPolygon};
pub use smooth::{Smoother, DEFAULT_WINDOW};
