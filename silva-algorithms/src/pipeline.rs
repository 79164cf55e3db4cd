//! Full segmentation pipeline.
//!
//! Ties the stages together in the order the algorithm requires: layer
//! clustering and canopy maxima feed the trunk locator, whose locations are
//! refined into per-tree training data; the voxel segmenter grows tree
//! memberships over the plot grid; the refiner strips outliers from the
//! resulting segments.

use crate::canopy::add_maxima_clusters;
use crate::config::SegmentationParams;
use crate::layers::cluster_layers;
use crate::refine::refine_segment;
use crate::segment::segment_trees;
use crate::training::{refine_training_data, GROUND_OFFSET};
use crate::trunk::find_tree_locations;
use anyhow::{Context, Result};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector2;
use silva_core::voxel::VoxelGrid;

/// One segmented tree: its points, trunk location and apex height.
#[derive(Debug, Clone)]
pub struct SegmentedTree {
    pub location: Vector2<f64>,
    pub apex_height: f64,
    pub points: PointCloud,
}

/// Result of [`segment_plot`]: the segmented trees, in the order their trunk
/// lines were finalized.
#[derive(Debug, Clone, Default)]
pub struct PlotSegmentation {
    pub trees: Vec<SegmentedTree>,
}

impl PlotSegmentation {
    /// `(x, y, apex height)` per tree, parallel to `trees`.
    pub fn locations(&self) -> Vec<(f64, f64, f64)> {
        self.trees
            .iter()
            .map(|t| (t.location.x, t.location.y, t.apex_height))
            .collect()
    }
}

/// Segments every tree out of a normalized forest plot point cloud.
///
/// Points below 2 m are stripped first; the ground region contributes no
/// trunk evidence and would only feed noise into the layer clustering.
/// Trees whose final point set comes up empty are excluded from the output.
pub fn segment_plot(cloud: &PointCloud, params: &SegmentationParams) -> Result<PlotSegmentation> {
    let cloud = cloud.filter(|p| p.height() >= GROUND_OFFSET);
    if cloud.is_empty() {
        return Ok(PlotSegmentation::default());
    }

    info!("clustering layers over {} points", cloud.len());
    let mut clusters = if params.num_threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.num_threads)
            .build()
            .context("building the layer clustering thread pool")?;
        pool.install(|| cluster_layers(&cloud, params))
    } else {
        cluster_layers(&cloud, params)
    };
    info!("{} layer clusters", clusters.len());

    add_maxima_clusters(&cloud, &mut clusters, params);

    let locations = find_tree_locations(clusters, params)?;
    info!("{} tree locations", locations.len());

    let mut rng = StdRng::seed_from_u64(params.seed);
    let training = refine_training_data(&locations, params, &mut rng);

    let grid = VoxelGrid::build_cubic(&cloud, params.voxel_resolution, None)
        .context("voxelizing the plot")?;
    let segments =
        segment_trees(&training, &cloud, &grid, params).context("voxelizing training data")?;

    let mut trees = Vec::new();
    for (location, segment) in locations.iter().zip(segments) {
        if segment.is_empty() {
            continue;
        }
        let refined = refine_segment(&segment, location.position, params.outlier_thresh);
        if refined.is_empty() {
            continue;
        }
        let apex_height = refined.max_height().unwrap();
        trees.push(SegmentedTree {
            location: location.position,
            apex_height,
            points: refined,
        });
    }
    info!("{} trees segmented", trees.len());
    Ok(PlotSegmentation { trees })
}
