//! Per-tree outlier removal.
//!
//! A point that is far from the trunk is an outlier near the ground but
//! perfectly normal inside the crown, so outliers are removed per height
//! window rather than over the whole tree: within each window, points are
//! ordered by planar distance to the trunk and everything beyond the first
//! distance gap larger than the threshold is dropped.

use float_ord::FloatOrd;
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector2;

/// Removes outliers from one tree's point cloud.
///
/// The cloud is walked bottom to top in windows: 2 m for the first window,
/// 4 m steps afterwards. The last window is open-ended upward so boundary
/// points cannot fall between windows. Window results are concatenated in
/// order.
pub fn refine_segment(cloud: &PointCloud, trunk: Vector2<f64>, outlier_thresh: f64) -> PointCloud {
    let mut start = match cloud.min_height() {
        Some(h) => h,
        None => return PointCloud::new(),
    };
    let height = cloud.max_height().unwrap();
    let mut end = start + 2.0;

    let mut refined = PointCloud::new();
    loop {
        let last = end >= height;
        let window = cloud.filter(|p| p.height() >= start && (last || p.height() < end));
        refined.extend_from(&remove_outliers(&window, trunk, outlier_thresh));
        if last {
            break;
        }
        start = end;
        end += 4.0;
    }
    refined
}

/// Drops every point beyond the first consecutive gap larger than `thresh`
/// in the sorted distances-to-trunk. Point order is preserved.
fn remove_outliers(window: &PointCloud, trunk: Vector2<f64>, thresh: f64) -> PointCloud {
    if window.is_empty() {
        return PointCloud::new();
    }
    let distances: Vec<f64> = window
        .iter()
        .map(|p| (p.planar() - trunk).norm())
        .collect();
    let mut sorted = distances.clone();
    sorted.sort_by_key(|&d| FloatOrd(d));

    let mut cutoff = f64::INFINITY;
    for pair in sorted.windows(2) {
        if pair[1] - pair[0] > thresh {
            cutoff = pair[0];
            break;
        }
    }
    let keep: Vec<usize> = (0..window.len())
        .filter(|&i| distances[i] <= cutoff)
        .collect();
    window.select(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use silva_core::nalgebra::Vector3;

    #[test]
    fn distant_points_beyond_gap_are_dropped() {
        // ring of points near the trunk plus a clump 2 m out
        let mut positions: Vec<Vector3<f64>> = (0..20)
            .map(|i| Vector3::new(0.01 * i as f64, 0.0, 3.0))
            .collect();
        positions.push(Vector3::new(2.0, 0.0, 3.1));
        positions.push(Vector3::new(2.05, 0.0, 3.2));
        let cloud = PointCloud::from_positions(positions);
        let refined = refine_segment(&cloud, Vector2::new(0.0, 0.0), 0.2);
        assert_eq!(refined.len(), 20);
        assert!(refined.iter().all(|p| p.position.x < 1.0));
    }

    #[test]
    fn wide_crowns_survive_when_distances_grade_smoothly() {
        // crown points spread to 3 m but with no gap larger than the
        // threshold anywhere
        let positions: Vec<Vector3<f64>> = (0..100)
            .map(|i| Vector3::new(0.03 * i as f64, 0.0, 12.0))
            .collect();
        let cloud = PointCloud::from_positions(positions);
        let refined = refine_segment(&cloud, Vector2::new(0.0, 0.0), 0.2);
        assert_eq!(refined.len(), 100);
    }

    #[test]
    fn outliers_are_judged_per_window() {
        // at 3 m height, 1.5 m from the trunk is an outlier (stem region is
        // tight); at 12 m the crown legitimately reaches that far
        let mut positions: Vec<Vector3<f64>> = (0..30)
            .map(|i| Vector3::new(0.005 * i as f64, 0.0, 3.0))
            .collect();
        positions.push(Vector3::new(1.5, 0.0, 3.0));
        // crown window: smooth spread out to 1.5 m
        positions.extend((0..50).map(|i| Vector3::new(0.03 * i as f64, 0.0, 12.0)));
        let cloud = PointCloud::from_positions(positions);
        let refined = refine_segment(&cloud, Vector2::new(0.0, 0.0), 0.2);
        // the stem outlier is gone, the whole crown survives
        assert_eq!(refined.len(), 80);
        assert!(refined
            .iter()
            .all(|p| p.height() > 10.0 || p.position.x < 1.0));
    }

    #[test]
    fn every_point_lands_in_exactly_one_window() {
        // no outliers at all: refinement must be a permutation-free identity
        // on the point count, including the points at window boundaries
        let positions: Vec<Vector3<f64>> = (0..120)
            .map(|i| Vector3::new(0.001 * i as f64, 0.0, 2.0 + 0.1 * i as f64))
            .collect();
        let cloud = PointCloud::from_positions(positions);
        let refined = refine_segment(&cloud, Vector2::new(0.0, 0.0), 0.2);
        assert_eq!(refined.len(), 120);
    }

    #[test]
    fn empty_cloud_stays_empty() {
        let refined = refine_segment(&PointCloud::new(), Vector2::new(0.0, 0.0), 0.2);
        assert!(refined.is_empty());
    }
}
