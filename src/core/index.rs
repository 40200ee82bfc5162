use crate::types::{BandArray, CanopyError, IndexGrid, NaipTile};
use ndarray::Zip;
use std::str::FromStr;

/// Selectable vegetation index formulas.
///
/// All three are elementwise band algebra over float32-cast bands. Division
/// by zero yields ±Inf and 0/0 yields NaN (IEEE policy); neither is treated
/// as a failure and both propagate into the output raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VegetationIndex {
    /// Atmospherically Resistant Vegetation Index:
    /// (NIR - 2*Red + Blue) / (NIR + 2*Red + Blue)
    Arvi,
    /// Visible Atmospherically Resistant Index over bands min-max normalized
    /// to [1, 2] per tile: (G' - R') / (G' + R' - B').
    ///
    /// The normalization is per tile, so VARI values are not comparable
    /// across tiles with different band ranges.
    Vari,
    /// Visible-band Difference Vegetation Index:
    /// (2*Green - (Red + Blue)) / (2*Green + (Red + Blue))
    Vdvi,
}

impl VegetationIndex {
    /// Output filename prefix, also the batch skip key ("arvi_" etc.)
    pub fn prefix(&self) -> &'static str {
        match self {
            VegetationIndex::Arvi => "arvi",
            VegetationIndex::Vari => "vari",
            VegetationIndex::Vdvi => "vdvi",
        }
    }

    /// Compute the index over a tile.
    ///
    /// Pure band algebra; the result carries no georeferencing and the
    /// caller pairs it back with the tile's transform and projection.
    pub fn compute(&self, tile: &NaipTile) -> BandArray {
        log::debug!(
            "Computing {:?} over {}x{} tile",
            self,
            tile.red.nrows(),
            tile.red.ncols()
        );

        match self {
            VegetationIndex::Arvi => {
                let mut out = BandArray::zeros(tile.red.dim());
                Zip::from(&mut out)
                    .and(&tile.red)
                    .and(&tile.blue)
                    .and(&tile.nir)
                    .for_each(|o, &r, &b, &n| {
                        *o = (n - 2.0 * r + b) / (n + 2.0 * r + b);
                    });
                out
            }
            VegetationIndex::Vari => {
                let red = normalize_band(&tile.red);
                let green = normalize_band(&tile.green);
                let blue = normalize_band(&tile.blue);
                let mut out = BandArray::zeros(tile.red.dim());
                Zip::from(&mut out)
                    .and(&red)
                    .and(&green)
                    .and(&blue)
                    .for_each(|o, &r, &g, &b| {
                        *o = (g - r) / (g + r - b);
                    });
                out
            }
            VegetationIndex::Vdvi => {
                let mut out = BandArray::zeros(tile.red.dim());
                Zip::from(&mut out)
                    .and(&tile.red)
                    .and(&tile.green)
                    .and(&tile.blue)
                    .for_each(|o, &r, &g, &b| {
                        *o = (2.0 * g - (r + b)) / (2.0 * g + (r + b));
                    });
                out
            }
        }
    }

    /// Compute the index and attach the tile's georeferencing
    pub fn compute_grid(&self, tile: &NaipTile) -> IndexGrid {
        IndexGrid::new(self.compute(tile), tile.transform, tile.projection.clone())
    }
}

impl FromStr for VegetationIndex {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "arvi" => Ok(VegetationIndex::Arvi),
            "vari" => Ok(VegetationIndex::Vari),
            "vdvi" => Ok(VegetationIndex::Vdvi),
            other => Err(CanopyError::Processing(format!(
                "unknown vegetation index: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for VegetationIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefix().to_ascii_uppercase())
    }
}

/// Min-max normalize a band to [1, 2]: 1 + (x - min) / (max - min).
///
/// A constant band yields 0/0 = NaN everywhere, which propagates per the
/// numeric policy.
fn normalize_band(band: &BandArray) -> BandArray {
    let min = band.iter().fold(f32::INFINITY, |a, &b| a.min(b));
    let max = band.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let range = max - min;
    band.mapv(|v| 1.0 + (v - min) / range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;
    use approx::assert_relative_eq;
    use ndarray::Array2;

    fn tile_from_constant(r: f32, g: f32, b: f32, n: f32) -> NaipTile {
        NaipTile {
            red: Array2::from_elem((2, 2), r),
            green: Array2::from_elem((2, 2), g),
            blue: Array2::from_elem((2, 2), b),
            nir: Array2::from_elem((2, 2), n),
            transform: GeoTransform::from_gdal([0.0, 1.0, 0.0, 2.0, 0.0, -1.0]),
            projection: "EPSG:5070".to_string(),
        }
    }

    #[test]
    fn test_arvi_exact() {
        // (50 - 20 + 5) / (50 + 20 + 5) = 35/75
        let tile = tile_from_constant(10.0, 20.0, 5.0, 50.0);
        let arvi = VegetationIndex::Arvi.compute(&tile);
        assert_relative_eq!(arvi[[0, 0]], 35.0 / 75.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vdvi_exact() {
        // (40 - 15) / (40 + 15) = 25/55
        let tile = tile_from_constant(10.0, 20.0, 5.0, 50.0);
        let vdvi = VegetationIndex::Vdvi.compute(&tile);
        assert_relative_eq!(vdvi[[0, 0]], 25.0 / 55.0, epsilon = 1e-6);
    }

    #[test]
    fn test_all_zero_pixel_is_nan_not_error() {
        let tile = tile_from_constant(0.0, 0.0, 0.0, 0.0);
        for index in [
            VegetationIndex::Arvi,
            VegetationIndex::Vari,
            VegetationIndex::Vdvi,
        ] {
            let out = index.compute(&tile);
            assert!(
                !out[[0, 0]].is_finite(),
                "{:?} on all-zero bands must be NaN/Inf, got {}",
                index,
                out[[0, 0]]
            );
        }
    }

    #[test]
    fn test_vari_normalization() {
        // Bands with min 0 and max 10 normalize to 1 + x/10.
        let mut tile = tile_from_constant(0.0, 0.0, 0.0, 0.0);
        tile.red = ndarray::array![[0.0, 10.0], [5.0, 10.0]];
        tile.green = ndarray::array![[10.0, 0.0], [5.0, 0.0]];
        tile.blue = ndarray::array![[0.0, 10.0], [0.0, 10.0]];
        let vari = VegetationIndex::Vari.compute(&tile);
        // Pixel (0,0): r'=1, g'=2, b'=1 -> (2-1)/(2+1-1) = 0.5
        assert_relative_eq!(vari[[0, 0]], 0.5, epsilon = 1e-6);
        // Pixel (0,1): r'=2, g'=1, b'=2 -> (1-2)/(1+2-2) = -1
        assert_relative_eq!(vari[[0, 1]], -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_vari_constant_band_propagates_nan() {
        // A constant band has max == min; the normalization is 0/0 = NaN.
        let tile = tile_from_constant(3.0, 7.0, 2.0, 9.0);
        let vari = VegetationIndex::Vari.compute(&tile);
        assert!(vari[[0, 0]].is_nan());
    }

    #[test]
    fn test_prefix_parse_roundtrip() {
        for index in [
            VegetationIndex::Arvi,
            VegetationIndex::Vari,
            VegetationIndex::Vdvi,
        ] {
            assert_eq!(index.prefix().parse::<VegetationIndex>().unwrap(), index);
        }
        assert!("ndvi".parse::<VegetationIndex>().is_err());
    }
}
