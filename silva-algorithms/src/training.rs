//! Training data refinement.
//!
//! The point set a trunk line collects is noisy training data: it may include
//! the crown of an overhanging neighbour (separated by a large vertical gap)
//! and it may have sparsely sampled stretches (small vertical gaps) that
//! starve the voxel classifier of low-level training voxels. Refinement clips
//! each tree to a cylinder, trims everything above the first large gap, and
//! fills small gaps with resampled synthetic points.

use crate::config::SegmentationParams;
use crate::trunk::TreeLocation;
use float_ord::FloatOrd;
use rand::rngs::StdRng;
use rand::Rng;
use silva_core::cloud::{PlotPoint, PointCloud};

/// Height of the ground strip removed before segmentation; the implicit
/// bottom gap starts here.
pub const GROUND_OFFSET: f64 = 2.0;

/// Refines the training data of every tree. The output is index-parallel to
/// `locations`; a tree whose clip comes up empty keeps an empty cloud.
pub fn refine_training_data(
    locations: &[TreeLocation],
    params: &SegmentationParams,
    rng: &mut StdRng,
) -> Vec<PointCloud> {
    locations
        .iter()
        .map(|location| refine_tree(location, params, rng))
        .collect()
}

fn refine_tree(
    location: &TreeLocation,
    params: &SegmentationParams,
    rng: &mut StdRng,
) -> PointCloud {
    // Cylinder radius: half the distance to the furthest assigned point.
    let max_dist = location
        .points
        .iter()
        .map(|p| (p.planar() - location.position).norm())
        .max_by_key(|&d| FloatOrd(d))
        .unwrap_or(0.0);
    let cylinder_radius = 0.5 * max_dist;
    let clipped = location
        .points
        .filter(|p| (p.planar() - location.position).norm() <= cylinder_radius);
    if clipped.is_empty() {
        return clipped;
    }
    let (trimmed, gaps) = find_gaps(&clipped, params.gap_max, params.gap_min);
    augment_gaps(trimmed, &gaps, params.augment_dist, rng)
}

/// Scans the sorted point heights for vertical gaps.
///
/// The first height difference exceeding `gap_max` is a large gap: every
/// point above it is removed (it most likely belongs to a tree overhanging
/// this one). Differences above `gap_min` below the large gap are recorded as
/// `(start, end)` intervals for augmentation. If the lowest point hangs more
/// than `gap_min` above the ground strip, an implicit bottom gap is recorded
/// down to [`GROUND_OFFSET`].
fn find_gaps(cloud: &PointCloud, gap_max: f64, gap_min: f64) -> (PointCloud, Vec<(f64, f64)>) {
    let mut heights: Vec<f64> = cloud.iter().map(|p| p.height()).collect();
    heights.sort_by_key(|&h| FloatOrd(h));

    let mut cutoff = f64::INFINITY;
    let mut gaps = Vec::new();
    for pair in heights.windows(2) {
        let diff = pair[1] - pair[0];
        if diff > gap_max {
            cutoff = pair[0];
            break;
        }
        if diff > gap_min {
            gaps.push((pair[0], pair[1]));
        }
    }
    let trimmed = cloud.filter(|p| p.height() <= cutoff);

    let lowest = heights[0];
    if lowest - GROUND_OFFSET > gap_min {
        gaps.insert(0, (GROUND_OFFSET, lowest));
    }
    (trimmed, gaps)
}

/// Fills the recorded gaps with synthetic points.
///
/// For each gap, points from `augment_dist`-long slices directly above and
/// below the gap form a donor pool. The number of synthesized points is
/// proportional to the donor density times the gap length (at least one).
/// Each synthetic point is a donor drawn with replacement, re-homed to a
/// uniformly random height inside the gap. Gaps with an empty donor pool are
/// skipped.
fn augment_gaps(
    cloud: PointCloud,
    gaps: &[(f64, f64)],
    augment_dist: f64,
    rng: &mut StdRng,
) -> PointCloud {
    let mut augmented = cloud.clone();
    for &(start, end) in gaps {
        let above = cloud.filter(|p| p.height() >= end && p.height() <= end + augment_dist);
        let below = cloud.filter(|p| p.height() <= start && p.height() >= start - augment_dist);
        let mut donors = above;
        donors.extend_from(&below);
        if donors.is_empty() {
            continue;
        }
        let density = donors.len() as f64 / (2.0 * augment_dist);
        let n_points = ((density * (end - start)) as usize).max(1);
        let indices: Vec<usize> = (0..n_points)
            .map(|_| rng.gen_range(0..donors.len()))
            .collect();
        let heights: Vec<f64> = (0..n_points).map(|_| rng.gen_range(start..end)).collect();
        for (&index, &height) in indices.iter().zip(&heights) {
            let mut point: PlotPoint = *donors.point(index);
            point.position.z = height;
            augmented.push(point);
        }
    }
    augmented
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use silva_core::nalgebra::{Vector2, Vector3};

    fn column(heights: &[f64]) -> PointCloud {
        PointCloud::from_positions(heights.iter().map(|&z| Vector3::new(0.0, 0.0, z)).collect::<Vec<_>>())
    }

    #[test]
    fn large_gap_removes_everything_above() {
        // dense column 2..6 m, then a 2 m jump, then more points
        let mut heights: Vec<f64> = (0..40).map(|i| 2.0 + 0.1 * i as f64).collect();
        heights.extend((0..10).map(|i| 8.0 + 0.1 * i as f64));
        let cloud = column(&heights);
        let (trimmed, _) = find_gaps(&cloud, 1.0, 0.3);
        assert_eq!(trimmed.len(), 40);
        assert!(trimmed.max_height().unwrap() < 6.1);
    }

    #[test]
    fn small_gaps_are_recorded_not_removed() {
        // 0.5 m gap between 3.0 and 3.5: small, kept and recorded
        let heights = [2.0, 2.1, 2.2, 2.3, 3.0, 3.5, 3.6, 3.7];
        let cloud = column(&heights);
        let (trimmed, gaps) = find_gaps(&cloud, 1.0, 0.3);
        assert_eq!(trimmed.len(), heights.len());
        assert!(gaps.contains(&(3.0, 3.5)));
        // 2.3 -> 3.0 is 0.7, also a small gap
        assert!(gaps.contains(&(2.3, 3.0)));
    }

    #[test]
    fn implicit_ground_gap_when_lowest_point_hangs_high() {
        let heights = [4.0, 4.1, 4.2, 4.3];
        let cloud = column(&heights);
        let (_, gaps) = find_gaps(&cloud, 1.0, 0.3);
        assert_eq!(gaps.first(), Some(&(GROUND_OFFSET, 4.0)));

        // lowest point close to the ground strip: no implicit gap
        let low = [2.1, 2.2, 2.3];
        let (_, gaps) = find_gaps(&column(&low), 1.0, 0.3);
        assert!(gaps.is_empty());
    }

    #[test]
    fn augmentation_fills_gap_proportionally_to_density() {
        let mut heights: Vec<f64> = (0..20).map(|i| 2.0 + 0.02 * i as f64).collect();
        heights.extend((0..20).map(|i| 3.0 + 0.02 * i as f64));
        let cloud = column(&heights);
        let gap = (2.38, 3.0);
        let mut rng = StdRng::seed_from_u64(33);
        let augmented = augment_gaps(cloud.clone(), &[gap], 0.4, &mut rng);
        // donors: all 40 points lie within 0.4 m of the gap; density = 50/m,
        // so ~31 synthetic points are added
        let added = augmented.len() - cloud.len();
        assert!(added >= 25 && added <= 35, "added {}", added);
        for point in augmented.iter().skip(cloud.len()) {
            assert!(point.height() > gap.0 && point.height() < gap.1);
        }
    }

    #[test]
    fn augmentation_is_deterministic_for_a_fixed_seed() {
        let heights: Vec<f64> = (0..30).map(|i| 2.0 + 0.05 * i as f64).collect();
        let location = TreeLocation {
            position: Vector2::new(0.0, 0.0),
            points: column(&heights),
        };
        let params = SegmentationParams::default();
        let mut rng_a = StdRng::seed_from_u64(params.seed);
        let mut rng_b = StdRng::seed_from_u64(params.seed);
        let a = refine_training_data(std::slice::from_ref(&location), &params, &mut rng_a);
        let b = refine_training_data(std::slice::from_ref(&location), &params, &mut rng_b);
        assert_eq!(a, b);
    }

    #[test]
    fn cylinder_clip_uses_half_the_furthest_distance() {
        // points at planar distances 0, 1 and 4: radius is 2, so the point
        // at distance 4 (and only it) is clipped away
        let positions = vec![
            Vector3::new(0.0, 0.0, 3.0),
            Vector3::new(1.0, 0.0, 3.1),
            Vector3::new(4.0, 0.0, 3.2),
        ];
        let location = TreeLocation {
            position: Vector2::new(0.0, 0.0),
            points: PointCloud::from_positions(positions),
        };
        let params = SegmentationParams::default();
        let mut rng = StdRng::seed_from_u64(1);
        let refined = refine_tree(&location, &params, &mut rng);
        assert!(refined.iter().all(|p| p.position.x <= 2.0));
        assert!(refined.len() >= 2);
    }
}
