use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Single raster band as read from disk, always widened to f32
pub type BandArray = Array2<f32>;

/// Per-pixel class identifiers (0 = background / unlabeled)
pub type ClassArray = Array2<u8>;

/// Geotransform comparison tolerance used by alignment checks
pub const TRANSFORM_EPSILON: f64 = 1e-9;

/// Affine geotransform mapping pixel (col, row) to world coordinates,
/// in the GDAL coefficient order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Construct from the 6-element array returned by GDAL
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// Convert back to the GDAL coefficient array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Map world coordinates to fractional pixel (col, row).
    ///
    /// Returns `None` for a degenerate (non-invertible) transform.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det.abs() < f64::EPSILON {
            return None;
        }

        let dx = x - self.top_left_x;
        let dy = y - self.top_left_y;
        let col = (self.pixel_height * dx - self.rotation_x * dy) / det;
        let row = (self.pixel_width * dy - self.rotation_y * dx) / det;
        Some((col, row))
    }

    /// Map a pixel (col, row) to the world coordinates of its origin corner
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.top_left_x + col * self.pixel_width + row * self.rotation_x;
        let y = self.top_left_y + col * self.rotation_y + row * self.pixel_height;
        (x, y)
    }

    /// Coefficient-wise comparison within `TRANSFORM_EPSILON`
    pub fn approx_eq(&self, other: &GeoTransform) -> bool {
        self.to_gdal()
            .iter()
            .zip(other.to_gdal().iter())
            .all(|(a, b)| (a - b).abs() <= TRANSFORM_EPSILON)
    }
}

/// A single-band georeferenced raster held fully in memory.
///
/// Data is row-major, indexed `data[[row, col]]`. A grid is opened once,
/// read fully, and either discarded or flushed once to a new file; it is
/// never mutated in place after being written.
#[derive(Debug, Clone)]
pub struct RasterGrid<T> {
    pub data: Array2<T>,
    pub transform: GeoTransform,
    pub projection: String,
}

impl<T> RasterGrid<T> {
    pub fn new(data: Array2<T>, transform: GeoTransform, projection: impl Into<String>) -> Self {
        Self {
            data,
            transform,
            projection: projection.into(),
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Float32 vegetation index raster.
///
/// Values are nominally in [-1, 1] but may contain NaN or infinity where a
/// formula denominator is zero; that is a documented numeric policy, not a
/// defect, and such values propagate downstream unchanged.
pub type IndexGrid = RasterGrid<f32>;

/// Rasterized training labels: 0 = unlabeled background, positive byte =
/// class identifier burned from a polygon attribute
pub type LabelGrid = RasterGrid<u8>;

/// Predicted per-pixel class identifiers, before or after smoothing
pub type ClassGrid = RasterGrid<u8>;

/// A 4-band NAIP imagery tile with band order {red, green, blue, nir},
/// each band widened to f32 on read
#[derive(Debug, Clone)]
pub struct NaipTile {
    pub red: BandArray,
    pub green: BandArray,
    pub blue: BandArray,
    pub nir: BandArray,
    pub transform: GeoTransform,
    pub projection: String,
}

/// Seam through which any two grids combined in one operation are
/// alignment-checked
pub trait Georeferenced {
    /// (height, width) in pixels
    fn shape(&self) -> (usize, usize);
    fn transform(&self) -> &GeoTransform;
    fn projection(&self) -> &str;
}

impl<T> Georeferenced for RasterGrid<T> {
    fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn projection(&self) -> &str {
        &self.projection
    }
}

impl Georeferenced for NaipTile {
    fn shape(&self) -> (usize, usize) {
        self.red.dim()
    }

    fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    fn projection(&self) -> &str {
        &self.projection
    }
}

/// Check that two grids share shape, geotransform, and projection.
///
/// A mismatch is a hard error for the calling operation; grids are never
/// silently resampled.
pub fn ensure_aligned(a: &impl Georeferenced, b: &impl Georeferenced) -> CanopyResult<()> {
    if a.shape() != b.shape() {
        return Err(CanopyError::AlignmentMismatch {
            reason: format!("shape {:?} vs {:?}", a.shape(), b.shape()),
        });
    }
    if !a.transform().approx_eq(b.transform()) {
        return Err(CanopyError::AlignmentMismatch {
            reason: format!("geotransform {:?} vs {:?}", a.transform(), b.transform()),
        });
    }
    if a.projection() != b.projection() {
        return Err(CanopyError::AlignmentMismatch {
            reason: format!("projection {:?} vs {:?}", a.projection(), b.projection()),
        });
    }
    Ok(())
}

/// Error types for canopy processing
#[derive(Debug, thiserror::Error)]
pub enum CanopyError {
    #[error("input not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("raster alignment mismatch: {reason}")]
    AlignmentMismatch { reason: String },

    #[error("insufficient classes for training: found {found}, need at least 2")]
    InsufficientClasses { found: usize },

    #[error("unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("processing error: {0}")]
    Processing(String),
}

/// Result type for canopy operations
pub type CanopyResult<T> = Result<T, CanopyError>;
