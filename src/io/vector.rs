use crate::core::rasterize::TrainingPolygon;
use crate::types::{CanopyError, CanopyResult};
use gdal::vector::{Geometry, LayerAccess};
use gdal::Dataset;
use gdal_sys::OGRwkbGeometryType;
use std::path::Path;

/// Read a polygon layer into training polygons, in layer (draw) order.
///
/// With `field` set, each feature's class is its integer attribute value;
/// without it every polygon burns class 1. Features with non-polygon
/// geometry, a null attribute, or an attribute outside 1..=255 are skipped
/// with a warning — the layer is training data, not a place to crash.
pub fn read_training_polygons<P: AsRef<Path>>(
    path: P,
    field: Option<&str>,
) -> CanopyResult<Vec<TrainingPolygon>> {
    let path = path.as_ref();
    log::info!(
        "Reading training polygons from {} (field: {})",
        path.display(),
        field.unwrap_or("<none>, burning 1")
    );

    if !path.exists() {
        return Err(CanopyError::InputNotFound {
            path: path.to_path_buf(),
        });
    }
    let dataset = Dataset::open(path).map_err(|e| CanopyError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut layer = dataset.layer(0).map_err(|e| CanopyError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason: format!("no vector layer: {}", e),
    })?;

    if let Some(field_name) = field {
        let present = layer.defn().fields().any(|f| f.name() == field_name);
        if !present {
            return Err(CanopyError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("attribute field {:?} not found in layer", field_name),
            });
        }
    }

    let mut polygons = Vec::new();
    for feature in layer.features() {
        let class = match field {
            Some(field_name) => match feature.field_as_integer_by_name(field_name)? {
                Some(value) if (1..=255).contains(&value) => value as u8,
                Some(value) => {
                    log::warn!("Skipping feature with out-of-range class {}", value);
                    continue;
                }
                None => {
                    log::warn!("Skipping feature with null {:?} attribute", field_name);
                    continue;
                }
            },
            None => 1,
        };

        let Some(geometry) = feature.geometry() else {
            log::warn!("Skipping feature without geometry");
            continue;
        };
        collect_polygons(geometry, class, &mut polygons);
    }

    log::info!("Read {} training polygons", polygons.len());
    Ok(polygons)
}

/// Flatten Polygon / MultiPolygon geometry into ring lists; other geometry
/// types are skipped with a warning
fn collect_polygons(geometry: &Geometry, class: u8, out: &mut Vec<TrainingPolygon>) {
    // Mask off the 2.5D bit so wkbPolygon25D et al. match their 2D base.
    let base_type = geometry.geometry_type() & 0xff;
    if base_type == OGRwkbGeometryType::wkbPolygon {
        let rings: Vec<Vec<(f64, f64)>> = (0..geometry.geometry_count())
            .map(|i| {
                geometry
                    .get_geometry(i)
                    .get_point_vec()
                    .into_iter()
                    .map(|(x, y, _z)| (x, y))
                    .collect()
            })
            .collect();
        if rings.is_empty() {
            log::warn!("Skipping polygon without rings");
            return;
        }
        out.push(TrainingPolygon { rings, class });
    } else if base_type == OGRwkbGeometryType::wkbMultiPolygon {
        for i in 0..geometry.geometry_count() {
            collect_polygons(&geometry.get_geometry(i), class, out);
        }
    } else {
        log::warn!(
            "Skipping non-polygon geometry (type {})",
            geometry.geometry_type()
        );
    }
}
