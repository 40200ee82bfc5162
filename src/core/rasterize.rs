use crate::types::{CanopyError, CanopyResult, ClassArray, Georeferenced, LabelGrid};

/// A training polygon in world coordinates, ready to burn.
///
/// `rings[0]` is the exterior ring; any further rings are holes. The class
/// is the feature's integer attribute value, or 1 when no attribute field
/// was requested.
#[derive(Debug, Clone)]
pub struct TrainingPolygon {
    pub rings: Vec<Vec<(f64, f64)>>,
    pub class: u8,
}

/// Burn training polygons onto the grid of a reference raster.
///
/// Each pixel whose center falls inside a polygon (even-odd rule over all
/// rings, so interior rings punch holes) takes that polygon's class value.
/// Polygons burn in slice order and later polygons overwrite earlier ones;
/// uncovered pixels stay 0.
pub fn rasterize_polygons(
    polygons: &[TrainingPolygon],
    reference: &impl Georeferenced,
) -> CanopyResult<LabelGrid> {
    let (height, width) = reference.shape();
    if height == 0 || width == 0 {
        return Err(CanopyError::AlignmentMismatch {
            reason: format!("reference grid is empty ({}x{})", height, width),
        });
    }
    let transform = *reference.transform();
    if transform.world_to_pixel(0.0, 0.0).is_none() {
        return Err(CanopyError::AlignmentMismatch {
            reason: "reference geotransform is not invertible".to_string(),
        });
    }

    log::info!(
        "Rasterizing {} polygons onto {}x{} reference grid",
        polygons.len(),
        width,
        height
    );

    let mut labels = ClassArray::zeros((height, width));

    for polygon in polygons {
        // Rings in fractional pixel space; the even-odd test runs there so
        // holes and rotated transforms need no special casing.
        let rings: Vec<Vec<(f64, f64)>> = polygon
            .rings
            .iter()
            .map(|ring| {
                ring.iter()
                    .filter_map(|&(x, y)| transform.world_to_pixel(x, y))
                    .collect()
            })
            .collect();

        if rings.iter().all(|r| r.len() < 3) {
            log::warn!("Skipping degenerate polygon with no valid ring");
            continue;
        }

        // Clamped pixel bounding box over all rings
        let (mut col_min, mut col_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut row_min, mut row_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(c, r) in rings.iter().flatten() {
            col_min = col_min.min(c);
            col_max = col_max.max(c);
            row_min = row_min.min(r);
            row_max = row_max.max(r);
        }
        let col_lo = col_min.floor().max(0.0) as usize;
        let row_lo = row_min.floor().max(0.0) as usize;
        if col_min >= width as f64 || row_min >= height as f64 || col_max < 0.0 || row_max < 0.0 {
            continue;
        }
        let col_hi = (col_max.ceil() as usize).min(width - 1);
        let row_hi = (row_max.ceil() as usize).min(height - 1);

        for row in row_lo..=row_hi {
            for col in col_lo..=col_hi {
                let cx = col as f64 + 0.5;
                let cy = row as f64 + 0.5;
                if point_in_rings(&rings, cx, cy) {
                    labels[[row, col]] = polygon.class;
                }
            }
        }
    }

    Ok(LabelGrid::new(
        labels,
        transform,
        reference.projection().to_string(),
    ))
}

/// Even-odd point-in-polygon test over every ring of one polygon
fn point_in_rings(rings: &[Vec<(f64, f64)>], x: f64, y: f64) -> bool {
    let mut inside = false;
    for ring in rings {
        if ring.len() < 3 {
            continue;
        }
        let mut j = ring.len() - 1;
        for i in 0..ring.len() {
            let (xi, yi) = ring[i];
            let (xj, yj) = ring[j];
            if (yi > y) != (yj > y) {
                let x_inter = (xj - xi) * (y - yi) / (yj - yi) + xi;
                if x < x_inter {
                    inside = !inside;
                }
            }
            j = i;
        }
    }
    inside
}
