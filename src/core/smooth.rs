use crate::types::{CanopyError, CanopyResult, ClassArray, ClassGrid};

/// Default smoothing window edge length
pub const DEFAULT_WINDOW: usize = 5;

/// Spatial noise filter for classified rasters.
///
/// Replaces each pixel with the median class of its square neighborhood,
/// mirroring indices at the raster edges so the output keeps the input
/// shape. Deterministic, no learned state. For the binary canopy /
/// non-canopy case the median is the local majority.
#[derive(Debug, Clone)]
pub struct Smoother {
    window: usize,
}

impl Smoother {
    /// Smoother with the default 5x5 window
    pub fn new() -> Self {
        Self {
            window: DEFAULT_WINDOW,
        }
    }

    /// Smoother with a custom window edge length (must be odd)
    pub fn with_window(window: usize) -> CanopyResult<Self> {
        if window % 2 == 0 || window == 0 {
            return Err(CanopyError::Processing(format!(
                "smoothing window must be odd, got {}",
                window
            )));
        }
        Ok(Self { window })
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Apply the filter, producing a class raster of identical shape and
    /// georeferencing
    pub fn apply(&self, classified: &ClassGrid) -> ClassGrid {
        let (height, width) = classified.data.dim();
        log::debug!(
            "Smoothing {}x{} class raster with {}x{} median window",
            height,
            width,
            self.window,
            self.window
        );

        let half = (self.window / 2) as isize;
        let mut filtered = ClassArray::zeros((height, width));
        let mut window_values = Vec::with_capacity(self.window * self.window);

        for row in 0..height {
            for col in 0..width {
                window_values.clear();
                for dr in -half..=half {
                    for dc in -half..=half {
                        let r = reflect(row as isize + dr, height);
                        let c = reflect(col as isize + dc, width);
                        window_values.push(classified.data[[r, c]]);
                    }
                }
                window_values.sort_unstable();
                filtered[[row, col]] = window_values[window_values.len() / 2];
            }
        }

        ClassGrid::new(
            filtered,
            classified.transform,
            classified.projection.clone(),
        )
    }
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

/// Symmetric mirror indexing: (d c b a | a b c d | d c b a)
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let mut i = index;
    // A couple of folds suffice for any window smaller than the raster,
    // and the loop also covers tiny rasters.
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= len {
            i = 2 * len - i - 1;
        } else {
            return i as usize;
        }
    }
}
