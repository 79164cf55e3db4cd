//! Voxel-level region growing.
//!
//! Both the plot and every tree's refined training set are voxelized at the
//! same resolution over the plot extent, so cell coordinates are directly
//! comparable. The segmenter then walks the plot's voxel layers bottom to
//! top; after each layer the freshly labeled voxels are folded into the
//! training set and the classifier is rebuilt. The ascending order is part of
//! the algorithm's contract, not an optimization: a layer's labels depend on
//! every layer accepted below it, which is what lets tree memberships grow
//! upward along the trunks.

use crate::classify::FuzzyKnn;
use crate::config::SegmentationParams;
use log::debug;
use silva_core::cloud::PointCloud;
use silva_core::voxel::{Voxel, VoxelGrid, VoxelGridError};

fn cell_coords(voxel: &Voxel) -> [f64; 3] {
    [
        voxel.cell[0] as f64,
        voxel.cell[1] as f64,
        voxel.cell[2] as f64,
    ]
}

/// Grows per-tree voxel memberships over the plot grid and expands them back
/// to point sets.
///
/// `training` holds one refined point cloud per tree; `grid` is the plot
/// voxelization the memberships grow over. The output is index-parallel to
/// `training`; trees that never won a voxel get an empty cloud. Voxels whose
/// best class probability stays below `min_prob` are discarded and never
/// revisited.
pub fn segment_trees(
    training: &[PointCloud],
    plot: &PointCloud,
    grid: &VoxelGrid,
    params: &SegmentationParams,
) -> Result<Vec<PointCloud>, VoxelGridError> {
    let n_trees = training.len();
    let mut samples: Vec<([f64; 3], usize)> = Vec::new();
    for (label, tree_cloud) in training.iter().enumerate() {
        if tree_cloud.is_empty() {
            continue;
        }
        let tree_grid = VoxelGrid::build(tree_cloud, grid.resolution(), Some(*grid.extent()))?;
        samples.extend(
            tree_grid
                .voxels()
                .iter()
                .map(|voxel| (cell_coords(voxel), label)),
        );
    }
    if samples.is_empty() {
        return Ok(vec![PointCloud::new(); n_trees]);
    }

    let mut assigned_ids: Vec<Vec<u64>> = vec![Vec::new(); n_trees];
    let mut classifier = FuzzyKnn::fit(&samples, n_trees, params.n_neighbors);
    for layer in 0..grid.layer_count() {
        let mut new_samples: Vec<([f64; 3], usize)> = Vec::new();
        for voxel in grid.voxels_in_layer(layer) {
            let query = cell_coords(voxel);
            let probabilities = classifier.predict_proba(query);
            let mut best = 0;
            let mut best_prob = probabilities[0];
            for (label, &p) in probabilities.iter().enumerate().skip(1) {
                if p > best_prob {
                    best = label;
                    best_prob = p;
                }
            }
            if best_prob >= params.min_prob {
                assigned_ids[best].push(voxel.id);
                new_samples.push((query, best));
            }
        }
        if !new_samples.is_empty() {
            samples.extend(new_samples);
            classifier = FuzzyKnn::fit(&samples, n_trees, params.n_neighbors);
        }
        debug!(
            "layer {}/{}: training set now {} voxels",
            layer + 1,
            grid.layer_count(),
            classifier.len()
        );
    }

    Ok(assigned_ids
        .into_iter()
        .map(|ids| {
            let mut indices = Vec::new();
            for id in ids {
                if let Some(voxel) = grid.voxel_by_id(id) {
                    indices.extend_from_slice(grid.points_in_voxel(voxel));
                }
            }
            plot.select(&indices)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use silva_core::math::AABB;
    use silva_core::nalgebra::{Point3, Vector3};

    /// A vertical column of points at (x, y) from z = 2 to z = 10.
    fn column(x: f64, y: f64) -> Vec<Vector3<f64>> {
        (0..160)
            .map(|i| Vector3::new(x, y, 2.0 + 0.05 * i as f64))
            .collect()
    }

    #[test]
    fn two_columns_are_segmented_apart() {
        let mut positions = column(0.0, 0.0);
        positions.extend(column(8.0, 0.0));
        let plot = PointCloud::from_positions(positions);
        let grid = VoxelGrid::build_cubic(&plot, 0.1, None).unwrap();

        // training data: the lower half of each column
        let training = vec![
            plot.filter(|p| p.position.x < 1.0 && p.height() < 6.0),
            plot.filter(|p| p.position.x > 1.0 && p.height() < 6.0),
        ];
        let params = SegmentationParams::default();
        let segments = segment_trees(&training, &plot, &grid, &params).unwrap();

        assert_eq!(segments.len(), 2);
        // every plot point is recovered and assigned to its own column
        assert_eq!(segments[0].len(), 160);
        assert_eq!(segments[1].len(), 160);
        assert!(segments[0].iter().all(|p| p.position.x < 1.0));
        assert!(segments[1].iter().all(|p| p.position.x > 1.0));
    }

    #[test]
    fn empty_training_yields_empty_segments() {
        let plot = PointCloud::from_positions(column(0.0, 0.0));
        let grid = VoxelGrid::build_cubic(&plot, 0.1, None).unwrap();
        let training = vec![PointCloud::new(), PointCloud::new()];
        let params = SegmentationParams::default();
        let segments = segment_trees(&training, &plot, &grid, &params).unwrap();
        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn ambiguous_voxels_are_discarded() {
        // two 3-column tree blocks plus a single column exactly halfway
        // between them: its class probabilities split and never reach
        // min_prob, so its voxels are dropped
        let mut positions = Vec::new();
        for y in 0..3 {
            positions.extend(column(1.5, 0.5 + y as f64));
            positions.extend(column(7.5, 0.5 + y as f64));
        }
        positions.extend(column(4.5, 1.5));
        let plot = PointCloud::from_positions(positions);
        let extent = AABB::from_min_max(Point3::new(0.0, 0.0, 2.0), Point3::new(10.0, 3.0, 10.0));
        let grid = VoxelGrid::build_cubic(&plot, 1.0, Some(extent)).unwrap();

        let training = vec![
            plot.filter(|p| p.position.x < 4.0 && p.height() < 6.0),
            plot.filter(|p| p.position.x > 5.0 && p.height() < 6.0),
        ];
        let params = SegmentationParams::default();
        let segments = segment_trees(&training, &plot, &grid, &params).unwrap();
        let total: usize = segments.iter().map(|s| s.len()).sum();
        assert_eq!(total, 960);
        assert!(segments
            .iter()
            .flat_map(|s| s.iter())
            .all(|p| (p.position.x - 4.5).abs() > 0.1));
    }
}
