use crate::types::{
    BandArray, CanopyError, CanopyResult, GeoTransform, IndexGrid, LabelGrid, NaipTile, RasterGrid,
};
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// NAIP band order: red, green, blue, near-infrared
const NAIP_BAND_COUNT: isize = 4;

fn open_dataset(path: &Path) -> CanopyResult<Dataset> {
    if !path.exists() {
        return Err(CanopyError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    Dataset::open(path).map_err(|e| CanopyError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn read_band<T: GdalType + Copy>(dataset: &Dataset, band_index: isize) -> CanopyResult<Array2<T>> {
    let (width, height) = dataset.raster_size();
    let rasterband = dataset.rasterband(band_index)?;
    let band_data = rasterband.read_as::<T>((0, 0), (width, height), (width, height), None)?;
    Array2::from_shape_vec((height, width), band_data.data)
        .map_err(|e| CanopyError::Processing(format!("failed to reshape band data: {}", e)))
}

/// Read a 4-band NAIP tile, widening every band to f32.
///
/// The band order {red, green, blue, nir} is fixed by the NAIP product;
/// tiles with fewer bands are an `UnsupportedFormat` error.
pub fn read_naip_tile<P: AsRef<Path>>(path: P) -> CanopyResult<NaipTile> {
    let path = path.as_ref();
    log::debug!("Reading NAIP tile: {}", path.display());

    let dataset = open_dataset(path)?;
    if dataset.raster_count() < NAIP_BAND_COUNT {
        return Err(CanopyError::UnsupportedFormat {
            path: path.to_path_buf(),
            reason: format!(
                "expected {} bands (red, green, blue, nir), found {}",
                NAIP_BAND_COUNT,
                dataset.raster_count()
            ),
        });
    }

    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let projection = dataset.projection();

    Ok(NaipTile {
        red: read_band::<f32>(&dataset, 1)?,
        green: read_band::<f32>(&dataset, 2)?,
        blue: read_band::<f32>(&dataset, 3)?,
        nir: read_band::<f32>(&dataset, 4)?,
        transform,
        projection,
    })
}

/// Read the first band of a raster as a float32 grid
pub fn read_index_raster<P: AsRef<Path>>(path: P) -> CanopyResult<IndexGrid> {
    let path = path.as_ref();
    log::debug!("Reading index raster: {}", path.display());

    let dataset = open_dataset(path)?;
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let projection = dataset.projection();
    let data: BandArray = read_band::<f32>(&dataset, 1)?;
    Ok(IndexGrid::new(data, transform, projection))
}

/// Read the first band of a raster as a byte grid
pub fn read_label_raster<P: AsRef<Path>>(path: P) -> CanopyResult<LabelGrid> {
    let path = path.as_ref();
    log::debug!("Reading label raster: {}", path.display());

    let dataset = open_dataset(path)?;
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);
    let projection = dataset.projection();
    let data = read_band::<u8>(&dataset, 1)?;
    Ok(LabelGrid::new(data, transform, projection))
}

/// Write a single-band GeoTIFF carrying the grid's georeferencing.
///
/// The file is created at a temporary sibling path and renamed into place
/// once fully written, so a reader of the output path never observes a
/// partial raster.
pub fn write_raster<T: GdalType + Copy, P: AsRef<Path>>(
    path: P,
    grid: &RasterGrid<T>,
) -> CanopyResult<()> {
    let path = path.as_ref();
    log::info!("Writing raster: {}", path.display());

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| CanopyError::Processing(format!("invalid output path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{}.tmp", file_name));

    let (height, width) = grid.data.dim();
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset =
        driver.create_with_band_type::<T, _>(&tmp_path, width as isize, height as isize, 1)?;

    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.projection.is_empty() {
        dataset.set_projection(&grid.projection)?;
    }

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<T> = grid.data.iter().copied().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    // Flush and close before the rename
    drop(rasterband);
    drop(dataset);

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
