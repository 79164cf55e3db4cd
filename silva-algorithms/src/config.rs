/// Tunable parameters of the segmentation pipeline.
///
/// The defaults reproduce the parameter set the pipeline was calibrated with
/// on boreal forest plots. Distances marked "radius-normalized" are measured
/// in units of the target cluster's radius rather than meters.
#[derive(Debug, Clone)]
pub struct SegmentationParams {
    /// Lower bound of the lowest clustered height layer (m).
    pub min_h: f64,
    /// Upper bound for clustered layers (m).
    pub max_h: f64,
    /// Maximum radius-normalized distance from a cluster center to a trunk
    /// line for the cluster to be assigned to the line during fitting.
    pub dist_max: f64,
    /// Like `dist_max`, but for the refit pass after line fitting.
    pub refit_dist_max: f64,
    /// Minimum distance between two trunk lines (m). Lines closer than this
    /// are merged.
    pub tree_dist_min: f64,
    /// Planar distance gap that marks outlier points during segment
    /// refinement (m).
    pub outlier_thresh: f64,
    /// Vertical gaps longer than this cut off the top of a tree's training
    /// cylinder (m).
    pub gap_max: f64,
    /// Vertical gaps longer than this (but at most `gap_max`) are filled by
    /// data augmentation (m).
    pub gap_min: f64,
    /// Length of the donor slices above and below a gap used to synthesize
    /// augmentation points (m).
    pub augment_dist: f64,
    /// Maximum cluster radius (m). Larger clusters are capped at this value.
    pub max_cluster_radius: f64,
    /// Minimum class probability for a voxel to be assigned to a tree. Voxels
    /// below this probability for every tree are discarded.
    pub min_prob: f64,
    /// Voxel edge length used by the voxel segmenter (m).
    pub voxel_resolution: f64,
    /// Cell size of the canopy height raster (m).
    pub resolution: f64,
    /// Standard deviation of the Gaussian filter applied to the canopy
    /// raster.
    pub sigma: f64,
    /// Window size for filtering the canopy raster, in cells. Must be odd.
    pub window_size: usize,
    /// Maximum difference between a raster cell and its max-filtered value
    /// for the cell to count as a local maximum.
    pub max_point_diff: f64,
    /// Cells at or below this height are background and never local maxima
    /// (m).
    pub background_thresh: f64,
    /// Number of neighbours consulted by the voxel classifier.
    pub n_neighbors: usize,
    /// Absolute lower bound on cluster support below which trunk line search
    /// terminates.
    pub abs_min_clusters: usize,
    /// Seed for all randomized steps (training data augmentation).
    pub seed: u64,
    /// Worker threads for layer clustering. Zero uses the global rayon pool.
    pub num_threads: usize,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            min_h: 0.0,
            max_h: 15.0,
            dist_max: 0.5,
            refit_dist_max: 0.75,
            tree_dist_min: 0.5,
            outlier_thresh: 0.2,
            gap_max: 1.0,
            gap_min: 0.3,
            augment_dist: 0.4,
            max_cluster_radius: 2.5,
            min_prob: 0.9,
            voxel_resolution: 0.1,
            resolution: 0.3,
            sigma: 0.7,
            window_size: 5,
            max_point_diff: 1e-4,
            background_thresh: 2.0,
            n_neighbors: 7,
            abs_min_clusters: 5,
            seed: 33,
            num_threads: 0,
        }
    }
}
