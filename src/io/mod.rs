//! Raster and vector I/O built on GDAL

pub mod raster;
pub mod vector;

pub use raster::{read_index_raster, read_label_raster, read_naip_tile, write_raster};
pub use vector::read_training_polygons;
