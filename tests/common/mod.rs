#![allow(dead_code)]

use gdal::raster::Buffer;
use gdal::DriverManager;
use ndarray::Array2;
use std::path::Path;
use verdant::{GeoTransform, IndexGrid, LabelGrid, RasterGrid};

/// Fixtures carry no CRS; alignment checks compare the (empty) projection
/// strings consistently either way.
pub const PROJECTION: &str = "";

pub fn north_up() -> GeoTransform {
    GeoTransform::from_gdal([600000.0, 1.0, 0.0, 3800000.0, 0.0, -1.0])
}

/// Write a 4-band byte GeoTIFF with constant band values {red, green,
/// blue, nir}
pub fn write_naip_tile(path: &Path, width: usize, height: usize, rgbn: [u8; 4]) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<u8, _>(path, width as isize, height as isize, 4)
        .unwrap();
    dataset.set_geo_transform(&north_up().to_gdal()).unwrap();
    for (i, &value) in rgbn.iter().enumerate() {
        let mut band = dataset.rasterband((i + 1) as isize).unwrap();
        let data = vec![value; width * height];
        band.write((0, 0), (width, height), &Buffer::new((width, height), data))
            .unwrap();
    }
}

/// Write a 4-band byte GeoTIFF whose left and right halves carry different
/// constant band values
pub fn write_naip_tile_split(
    path: &Path,
    width: usize,
    height: usize,
    left_rgbn: [u8; 4],
    right_rgbn: [u8; 4],
) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type::<u8, _>(path, width as isize, height as isize, 4)
        .unwrap();
    dataset.set_geo_transform(&north_up().to_gdal()).unwrap();
    for band_index in 0..4 {
        let mut band = dataset.rasterband((band_index + 1) as isize).unwrap();
        let mut data = vec![0u8; width * height];
        for row in 0..height {
            for col in 0..width {
                data[row * width + col] = if col < width / 2 {
                    left_rgbn[band_index]
                } else {
                    right_rgbn[band_index]
                };
            }
        }
        band.write((0, 0), (width, height), &Buffer::new((width, height), data))
            .unwrap();
    }
}

/// Write a single-band float32 GeoTIFF from a closure over (row, col)
pub fn write_feature_raster(
    path: &Path,
    width: usize,
    height: usize,
    value: impl Fn(usize, usize) -> f32,
) {
    let data = Array2::from_shape_fn((height, width), |(row, col)| value(row, col));
    let grid: IndexGrid = RasterGrid::new(data, north_up(), PROJECTION);
    verdant::io::write_raster(path, &grid).unwrap();
}

/// Write a single-band byte GeoTIFF from a closure over (row, col)
pub fn write_label_raster(
    path: &Path,
    width: usize,
    height: usize,
    value: impl Fn(usize, usize) -> u8,
) {
    let data = Array2::from_shape_fn((height, width), |(row, col)| value(row, col));
    let grid: LabelGrid = RasterGrid::new(data, north_up(), PROJECTION);
    verdant::io::write_raster(path, &grid).unwrap();
}
