use crate::types::{CanopyError, CanopyResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Static pipeline configuration, read once at process start and passed by
/// reference into jobs. Never mutated.
///
/// This is a convenience surface for driving a whole workspace; every
/// operation also accepts explicit paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Output projection identifier, e.g. "EPSG:5070"
    pub projection: String,
    /// Workspace root the pipeline reads from and writes under
    pub workspace: PathBuf,
    /// Directory tree containing the NAIP imagery tiles
    pub imagery_dir: PathBuf,
    /// Directory classified results are written under
    pub results_dir: PathBuf,
    /// Polygon layer with training data
    pub training_vector: PathBuf,
    /// Integer attribute field carrying class ids; `None` burns 1
    #[serde(default)]
    pub training_field: Option<String>,
    /// Rasterized training labels (output of the rasterize step)
    pub training_raster: PathBuf,
    /// Index raster the training labels align to
    pub training_feature: PathBuf,
}

impl PipelineConfig {
    /// Load the configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> CanopyResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CanopyError::InputNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            CanopyError::Processing(format!("invalid config {}: {}", path.display(), e))
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
