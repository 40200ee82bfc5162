use crate::types::{
    ensure_aligned, CanopyError, CanopyResult, ClassArray, ClassGrid, IndexGrid, LabelGrid,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::str::FromStr;

/// Trees per ensemble (fixed policy, not exposed per call)
pub const TREE_COUNT: usize = 50;

/// Minimum samples per leaf (fixed policy)
pub const MIN_LEAF_SAMPLES: usize = 10;

// Base seed for per-tree RNGs. Fixed so repeated jobs over the same inputs
// produce byte-identical class rasters.
const ENSEMBLE_SEED: u64 = 0x5EED_CA11;

/// Ensemble-of-trees strategy variants behind one fit/predict contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsembleKind {
    /// Bootstrap-sampled trees with exhaustive Gini threshold search
    RandomForest,
    /// Full-sample trees with uniformly random split thresholds
    ExtraTrees,
}

impl EnsembleKind {
    /// Output filename prefix for classified rasters
    pub fn prefix(&self) -> &'static str {
        match self {
            EnsembleKind::RandomForest => "rf",
            EnsembleKind::ExtraTrees => "erf",
        }
    }
}

impl FromStr for EnsembleKind {
    type Err = CanopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random-forest" | "rf" => Ok(EnsembleKind::RandomForest),
            "extra-trees" | "erf" => Ok(EnsembleKind::ExtraTrees),
            other => Err(CanopyError::Processing(format!(
                "unknown classifier strategy: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EnsembleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnsembleKind::RandomForest => write!(f, "random-forest"),
            EnsembleKind::ExtraTrees => write!(f, "extra-trees"),
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    /// Index into the ensemble's class table
    Leaf { class: usize },
    Split {
        threshold: f32,
        left: usize,
        right: usize,
    },
}

/// One threshold tree over the single feature, nodes in an arena
#[derive(Debug, Clone)]
struct ThresholdTree {
    nodes: Vec<Node>,
}

impl ThresholdTree {
    /// NaN feature values fail the `<=` comparison and fall through to the
    /// right subtree, so prediction stays deterministic under the NaN
    /// policy.
    fn predict(&self, x: f32) -> usize {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { class } => return *class,
                Node::Split {
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Supervised ensemble-of-trees pixel classifier.
///
/// A `TreeEnsemble` is ephemeral: fit once per classification job from the
/// pixels where the label raster is positive, used for one or more predict
/// calls within that job, then dropped. It is never persisted or shared
/// across jobs.
#[derive(Debug)]
pub struct TreeEnsemble {
    kind: EnsembleKind,
    classes: Vec<u8>,
    trees: Vec<ThresholdTree>,
}

impl TreeEnsemble {
    /// Fit an ensemble from a label raster and an aligned feature raster.
    ///
    /// Training pairs are `(features[p], labels[p])` for every pixel `p`
    /// with `labels[p] > 0`. Non-finite feature values are excluded from
    /// training (the index NaN policy); fewer than 2 distinct surviving
    /// label values is an `InsufficientClasses` error.
    pub fn fit(
        kind: EnsembleKind,
        labels: &LabelGrid,
        features: &IndexGrid,
    ) -> CanopyResult<TreeEnsemble> {
        ensure_aligned(labels, features)?;

        let mut dropped = 0usize;
        let mut samples: Vec<(f32, u8)> = Vec::new();
        for (&y, &x) in labels.data.iter().zip(features.data.iter()) {
            if y == 0 {
                continue;
            }
            if !x.is_finite() {
                dropped += 1;
                continue;
            }
            samples.push((x, y));
        }
        if dropped > 0 {
            log::warn!("Excluded {} non-finite feature samples from training", dropped);
        }

        let mut classes: Vec<u8> = samples.iter().map(|&(_, y)| y).collect();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(CanopyError::InsufficientClasses {
                found: classes.len(),
            });
        }

        log::info!(
            "Fitting {} ensemble: {} samples, {} classes, {} trees",
            kind,
            samples.len(),
            classes.len(),
            TREE_COUNT
        );

        // Class ids -> dense indices for counting
        let mut class_index = [0usize; 256];
        for (i, &c) in classes.iter().enumerate() {
            class_index[c as usize] = i;
        }
        let mut indexed: Vec<(f32, usize)> = samples
            .into_iter()
            .map(|(x, y)| (x, class_index[y as usize]))
            .collect();
        indexed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let num_classes = classes.len();
        let trees = Self::grow_trees(kind, &indexed, num_classes);

        Ok(TreeEnsemble {
            kind,
            classes,
            trees,
        })
    }

    #[cfg(feature = "parallel")]
    fn grow_trees(
        kind: EnsembleKind,
        sorted: &[(f32, usize)],
        num_classes: usize,
    ) -> Vec<ThresholdTree> {
        use rayon::prelude::*;
        (0..TREE_COUNT)
            .into_par_iter()
            .map(|t| Self::grow_tree(kind, sorted, num_classes, t))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn grow_trees(
        kind: EnsembleKind,
        sorted: &[(f32, usize)],
        num_classes: usize,
    ) -> Vec<ThresholdTree> {
        (0..TREE_COUNT)
            .map(|t| Self::grow_tree(kind, sorted, num_classes, t))
            .collect()
    }

    fn grow_tree(
        kind: EnsembleKind,
        sorted: &[(f32, usize)],
        num_classes: usize,
        tree_index: usize,
    ) -> ThresholdTree {
        let mut rng = StdRng::seed_from_u64(ENSEMBLE_SEED.wrapping_add(tree_index as u64));
        match kind {
            EnsembleKind::RandomForest => {
                // Bootstrap: n draws with replacement, re-sorted for the
                // contiguous-range splitter.
                let n = sorted.len();
                let mut sample: Vec<(f32, usize)> =
                    (0..n).map(|_| sorted[rng.gen_range(0..n)]).collect();
                sample.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
                build_cart_tree(&sample, num_classes)
            }
            EnsembleKind::ExtraTrees => build_extra_tree(sorted, num_classes, &mut rng),
        }
    }

    /// Predict a class raster over a feature raster.
    ///
    /// Every pixel is voted on by all trees (ties resolve toward the
    /// smallest class id) and the result inherits the feature raster's
    /// georeferencing. The output class domain is exactly the set of
    /// training labels; the model never invents unseen classes.
    pub fn predict(&self, features: &IndexGrid) -> CanopyResult<ClassGrid> {
        let dim = features.data.dim();
        log::info!(
            "Predicting {}x{} pixels with {} {} trees",
            dim.0,
            dim.1,
            self.trees.len(),
            self.kind
        );

        let values: Vec<f32> = features.data.iter().copied().collect();
        let predicted = self.vote_all(&values);

        let data = ClassArray::from_shape_vec(dim, predicted)
            .map_err(|e| CanopyError::Processing(format!("failed to reshape prediction: {}", e)))?;
        Ok(ClassGrid::new(
            data,
            features.transform,
            features.projection.clone(),
        ))
    }

    #[cfg(feature = "parallel")]
    fn vote_all(&self, values: &[f32]) -> Vec<u8> {
        use rayon::prelude::*;
        values.par_iter().map(|&x| self.vote(x)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn vote_all(&self, values: &[f32]) -> Vec<u8> {
        values.iter().map(|&x| self.vote(x)).collect()
    }

    fn vote(&self, x: f32) -> u8 {
        let mut counts = [0u16; 256];
        for tree in &self.trees {
            counts[tree.predict(x)] += 1;
        }
        let mut best = 0;
        for i in 1..self.classes.len() {
            if counts[i] > counts[best] {
                best = i;
            }
        }
        self.classes[best]
    }

    pub fn kind(&self) -> EnsembleKind {
        self.kind
    }

    /// Distinct training label values, ascending
    pub fn classes(&self) -> &[u8] {
        &self.classes
    }
}

fn majority_class(counts: &[usize]) -> usize {
    let mut best = 0;
    for i in 1..counts.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    best
}

fn class_counts(samples: &[(f32, usize)], num_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; num_classes];
    for &(_, y) in samples {
        counts[y] += 1;
    }
    counts
}

fn is_pure(counts: &[usize]) -> bool {
    counts.iter().filter(|&&c| c > 0).count() <= 1
}

/// Exhaustive Gini threshold search over a sorted sample.
///
/// Returns the split position `i` (left = `[0..=i]`, right = `[i+1..]`)
/// and midpoint threshold, or `None` when no split satisfies the minimum
/// leaf size.
fn best_gini_split(samples: &[(f32, usize)], num_classes: usize) -> Option<(usize, f32)> {
    let n = samples.len();
    if n < 2 * MIN_LEAF_SAMPLES {
        return None;
    }
    let total = class_counts(samples, num_classes);
    if is_pure(&total) {
        return None;
    }

    let mut left = vec![0usize; num_classes];
    let mut best: Option<(usize, f32, f64)> = None;

    for i in 0..n - 1 {
        left[samples[i].1] += 1;
        let left_n = i + 1;
        let right_n = n - left_n;
        if left_n < MIN_LEAF_SAMPLES || right_n < MIN_LEAF_SAMPLES {
            continue;
        }
        // Identical feature values cannot be separated by a threshold
        if samples[i].0 >= samples[i + 1].0 {
            continue;
        }

        // Weighted Gini impurity: minimizing it is maximizing
        // sum(counts^2)/size on each side.
        let mut left_sq = 0.0f64;
        let mut right_sq = 0.0f64;
        for c in 0..num_classes {
            let l = left[c] as f64;
            let r = (total[c] - left[c]) as f64;
            left_sq += l * l;
            right_sq += r * r;
        }
        let score = left_sq / left_n as f64 + right_sq / right_n as f64;

        let improved = match best {
            Some((_, _, s)) => score > s,
            None => true,
        };
        if improved {
            let threshold = (samples[i].0 + samples[i + 1].0) / 2.0;
            best = Some((i, threshold, score));
        }
    }

    best.map(|(i, t, _)| (i, t))
}

/// Grow a CART threshold tree over a sorted bootstrap sample, iteratively
/// with a worklist (training sets can be large enough to overflow a
/// recursive build).
fn build_cart_tree(sorted: &[(f32, usize)], num_classes: usize) -> ThresholdTree {
    let mut nodes = vec![Node::Leaf { class: 0 }];
    let mut work = vec![(0usize, 0usize, sorted.len())];

    while let Some((slot, lo, hi)) = work.pop() {
        let range = &sorted[lo..hi];
        match best_gini_split(range, num_classes) {
            Some((split, threshold)) => {
                let left = nodes.len();
                nodes.push(Node::Leaf { class: 0 });
                let right = nodes.len();
                nodes.push(Node::Leaf { class: 0 });
                nodes[slot] = Node::Split {
                    threshold,
                    left,
                    right,
                };
                work.push((left, lo, lo + split + 1));
                work.push((right, lo + split + 1, hi));
            }
            None => {
                nodes[slot] = Node::Leaf {
                    class: majority_class(&class_counts(range, num_classes)),
                };
            }
        }
    }

    ThresholdTree { nodes }
}

/// Grow an extremely randomized tree: full sample, one uniformly random
/// threshold per node, split rejected (node becomes a leaf) if it would
/// violate the minimum leaf size.
fn build_extra_tree(
    sorted: &[(f32, usize)],
    num_classes: usize,
    rng: &mut StdRng,
) -> ThresholdTree {
    let mut nodes = vec![Node::Leaf { class: 0 }];
    let mut work = vec![(0usize, 0usize, sorted.len())];

    while let Some((slot, lo, hi)) = work.pop() {
        let range = &sorted[lo..hi];
        let counts = class_counts(range, num_classes);

        let mut split = None;
        if range.len() >= 2 * MIN_LEAF_SAMPLES && !is_pure(&counts) {
            let lo_x = range[0].0;
            let hi_x = range[range.len() - 1].0;
            if lo_x < hi_x {
                let threshold = rng.gen_range(lo_x..hi_x);
                let pivot = range.partition_point(|&(x, _)| x <= threshold);
                if pivot >= MIN_LEAF_SAMPLES && range.len() - pivot >= MIN_LEAF_SAMPLES {
                    split = Some((pivot, threshold));
                }
            }
        }

        match split {
            Some((pivot, threshold)) => {
                let left = nodes.len();
                nodes.push(Node::Leaf { class: 0 });
                let right = nodes.len();
                nodes.push(Node::Leaf { class: 0 });
                nodes[slot] = Node::Split {
                    threshold,
                    left,
                    right,
                };
                work.push((left, lo, lo + pivot));
                work.push((right, lo + pivot, hi));
            }
            None => {
                nodes[slot] = Node::Leaf {
                    class: majority_class(&counts),
                };
            }
        }
    }

    ThresholdTree { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoTransform, RasterGrid};
    use ndarray::Array2;

    fn north_up() -> GeoTransform {
        GeoTransform::from_gdal([0.0, 1.0, 0.0, 40.0, 0.0, -1.0])
    }

    /// 40x40 training pair: left half class 1 with low index values, right
    /// half class 2 with high values.
    fn training_pair() -> (LabelGrid, IndexGrid) {
        let mut labels = Array2::<u8>::zeros((40, 40));
        let mut feature = Array2::<f32>::zeros((40, 40));
        for row in 0..40 {
            for col in 0..40 {
                if col < 20 {
                    labels[[row, col]] = 1;
                    feature[[row, col]] = -0.5 + 0.001 * row as f32;
                } else {
                    labels[[row, col]] = 2;
                    feature[[row, col]] = 0.5 + 0.001 * row as f32;
                }
            }
        }
        (
            RasterGrid::new(labels, north_up(), "EPSG:5070"),
            RasterGrid::new(feature, north_up(), "EPSG:5070"),
        )
    }

    #[test]
    fn test_fit_predict_separable() {
        let (labels, feature) = training_pair();
        let model = TreeEnsemble::fit(EnsembleKind::RandomForest, &labels, &feature).unwrap();
        let predicted = model.predict(&feature).unwrap();
        assert_eq!(predicted.data[[5, 5]], 1);
        assert_eq!(predicted.data[[5, 35]], 2);
    }

    #[test]
    fn test_predicted_classes_stay_in_training_domain() {
        let (labels, feature) = training_pair();
        for kind in [EnsembleKind::RandomForest, EnsembleKind::ExtraTrees] {
            let model = TreeEnsemble::fit(kind, &labels, &feature).unwrap();
            // Evaluate far outside the training range as well.
            let mut wild = feature.clone();
            wild.data[[0, 0]] = 1e9;
            wild.data[[0, 1]] = -1e9;
            wild.data[[0, 2]] = f32::NAN;
            let predicted = model.predict(&wild).unwrap();
            assert!(
                predicted.data.iter().all(|c| model.classes().contains(c)),
                "{:?} predicted a class outside the training domain",
                kind
            );
        }
    }

    #[test]
    fn test_insufficient_classes() {
        let labels: LabelGrid =
            RasterGrid::new(Array2::from_elem((10, 10), 1u8), north_up(), "EPSG:5070");
        let feature: IndexGrid =
            RasterGrid::new(Array2::from_elem((10, 10), 0.3f32), north_up(), "EPSG:5070");
        assert!(matches!(
            TreeEnsemble::fit(EnsembleKind::RandomForest, &labels, &feature),
            Err(CanopyError::InsufficientClasses { found: 1 })
        ));
    }

    #[test]
    fn test_fit_alignment_mismatch() {
        let labels: LabelGrid =
            RasterGrid::new(Array2::zeros((100, 100)), north_up(), "EPSG:5070");
        let feature: IndexGrid =
            RasterGrid::new(Array2::zeros((50, 50)), north_up(), "EPSG:5070");
        assert!(matches!(
            TreeEnsemble::fit(EnsembleKind::RandomForest, &labels, &feature),
            Err(CanopyError::AlignmentMismatch { .. })
        ));
    }

    #[test]
    fn test_nonfinite_training_samples_excluded() {
        let (labels, mut feature) = training_pair();
        feature.data[[0, 0]] = f32::NAN;
        feature.data[[0, 39]] = f32::INFINITY;
        let model = TreeEnsemble::fit(EnsembleKind::RandomForest, &labels, &feature).unwrap();
        assert_eq!(model.classes(), &[1, 2]);
    }

    #[test]
    fn test_all_nonfinite_features_is_insufficient() {
        let labels: LabelGrid =
            RasterGrid::new(Array2::from_elem((10, 10), 1u8), north_up(), "EPSG:5070");
        let feature: IndexGrid = RasterGrid::new(
            Array2::from_elem((10, 10), f32::NAN),
            north_up(),
            "EPSG:5070",
        );
        assert!(matches!(
            TreeEnsemble::fit(EnsembleKind::RandomForest, &labels, &feature),
            Err(CanopyError::InsufficientClasses { found: 0 })
        ));
    }

    #[test]
    fn test_deterministic_across_fits() {
        let (labels, feature) = training_pair();
        let a = TreeEnsemble::fit(EnsembleKind::ExtraTrees, &labels, &feature)
            .unwrap()
            .predict(&feature)
            .unwrap();
        let b = TreeEnsemble::fit(EnsembleKind::ExtraTrees, &labels, &feature)
            .unwrap()
            .predict(&feature)
            .unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn test_prefixes() {
        assert_eq!(EnsembleKind::RandomForest.prefix(), "rf");
        assert_eq!(EnsembleKind::ExtraTrees.prefix(), "erf");
        assert_eq!(
            "extra-trees".parse::<EnsembleKind>().unwrap(),
            EnsembleKind::ExtraTrees
        );
    }

    #[test]
    fn test_gini_split_separates_clean_data() {
        let mut samples = Vec::new();
        for i in 0..20 {
            samples.push((i as f32 * 0.01, 0usize));
            samples.push((1.0 + i as f32 * 0.01, 1usize));
        }
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let (split, threshold) = best_gini_split(&samples, 2).unwrap();
        assert_eq!(split, 19);
        assert!(threshold > 0.19 && threshold < 1.0);
    }

    #[test]
    fn test_gini_split_respects_min_leaf() {
        // 19 samples can never produce two leaves of 10.
        let samples: Vec<(f32, usize)> = (0..19).map(|i| (i as f32, (i % 2) as usize)).collect();
        assert!(best_gini_split(&samples, 2).is_none());
    }
}
