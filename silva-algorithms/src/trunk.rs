//! Vertical trunk line fitting.
//!
//! Stacked over height layers, the density clusters of a single tree line up
//! along its trunk. The fitting loop greedily extracts the best-supported
//! vertical line from the cluster table, merges lines that land closer than
//! the minimum tree distance, and finally redistributes all clusters (and,
//! where a cluster serves several lines, its individual points) among the
//! fitted lines.

use crate::config::SegmentationParams;
use crate::layers::Cluster;
use float_ord::FloatOrd;
use log::debug;
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrunkError {
    /// The minimum-support table only covers layers up to 26. Extending it is
    /// a calibration decision, so higher layers abort the run.
    #[error("no minimum cluster support configured for layer {0}")]
    UnsupportedLayer(usize),
}

/// A detected tree: planar trunk position plus the points assigned to it.
#[derive(Debug, Clone)]
pub struct TreeLocation {
    pub position: Vector2<f64>,
    pub points: PointCloud,
}

/// Minimum number of clusters a line needs, given the highest layer among its
/// matched clusters. Low trees only produce clusters on the lowest layers, so
/// the requirement relaxes for lines that never reach high layers.
fn min_cluster_support(highest_layer: usize) -> Result<usize, TrunkError> {
    if highest_layer <= 10 {
        Ok(5)
    } else if highest_layer <= 26 {
        Ok(8)
    } else {
        Err(TrunkError::UnsupportedLayer(highest_layer))
    }
}

/// Inverse-radius²-weighted mean of cluster centers: tight clusters pin the
/// line down, sprawling ones barely pull on it.
fn weighted_center<'a, I: Iterator<Item = &'a Cluster>>(clusters: I) -> Vector2<f64> {
    let mut weighted_sum = Vector2::zeros();
    let mut weight_sum = 0.0;
    for cluster in clusters {
        let w = cluster.radius.powi(-2);
        weighted_sum += cluster.center * w;
        weight_sum += w;
    }
    weighted_sum / weight_sum
}

/// Detects tree locations in the combined cluster table.
///
/// Runs the greedy line fitting and then the refit/split pass. The resulting
/// locations each own a disjoint point set; lines that end up with no points
/// are discarded.
pub fn find_tree_locations(
    clusters: Vec<Cluster>,
    params: &SegmentationParams,
) -> Result<Vec<TreeLocation>, TrunkError> {
    let lines = fit_vertical_lines(&clusters, params)?;
    debug!("fitted {} vertical lines", lines.len());
    Ok(refit_clusters(clusters, &lines, params))
}

/// Greedy vertical line extraction.
///
/// Distances between cluster centers are normalized by the radius of the
/// target cluster. Each iteration restricts every cluster's view of a layer
/// to its single nearest cluster there (one trunk cannot own two clusters of
/// the same layer), then seeds a line at the cluster with the most matches
/// within `dist_max`. Seeds with enough support become lines; seeds above the
/// absolute floor but below the layer-dependent minimum are discarded so the
/// search can continue; anything weaker ends the loop.
fn fit_vertical_lines(
    clusters: &[Cluster],
    params: &SegmentationParams,
) -> Result<Vec<Vector2<f64>>, TrunkError> {
    let n = clusters.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    // Row i, column j: distance from cluster i to cluster j in units of
    // cluster j's radius.
    let mut dist = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            dist[i * n + j] = (clusters[i].center - clusters[j].center).norm() / clusters[j].radius;
        }
    }

    let mut available = vec![true; n];
    let mut lines: Vec<Vector2<f64>> = Vec::new();

    loop {
        let active: Vec<usize> = (0..n).filter(|&i| available[i]).collect();
        if active.is_empty() {
            break;
        }
        let m = active.len();
        let mut active_dist = vec![0.0; m * m];
        for (r, &i) in active.iter().enumerate() {
            for (c, &j) in active.iter().enumerate() {
                active_dist[r * m + c] = dist[i * n + j];
            }
        }

        // Per layer, keep only each cluster's nearest neighbour as a
        // candidate; suppress the rest for this iteration.
        let mut layer_ids: Vec<usize> = active.iter().map(|&i| clusters[i].layer).collect();
        layer_ids.sort_unstable();
        layer_ids.dedup();
        for &layer in &layer_ids {
            let cols: Vec<usize> = (0..m)
                .filter(|&c| clusters[active[c]].layer == layer)
                .collect();
            for r in 0..m {
                let nearest = cols
                    .iter()
                    .copied()
                    .min_by_key(|&c| FloatOrd(active_dist[r * m + c]))
                    .unwrap();
                for &c in &cols {
                    if c != nearest {
                        active_dist[r * m + c] = params.dist_max + 1.0;
                    }
                }
            }
        }

        // Seed selection: the cluster with the most matches wins. Ties go to
        // the earliest cluster.
        let mut seed = 0;
        let mut support = 0;
        for r in 0..m {
            let s = (0..m)
                .filter(|&c| active_dist[r * m + c] <= params.dist_max)
                .count();
            if s > support {
                support = s;
                seed = r;
            }
        }

        let matched: Vec<usize> = (0..m)
            .filter(|&c| active_dist[seed * m + c] <= params.dist_max)
            .map(|c| active[c])
            .collect();
        let highest_layer = matched.iter().map(|&i| clusters[i].layer).max().unwrap();
        let required = min_cluster_support(highest_layer)?;

        if support >= required {
            for &i in &matched {
                available[i] = false;
            }
            let mut location = weighted_center(matched.iter().map(|&i| &clusters[i]));
            // Fuse with previously fitted lines until the closest one is at
            // least tree_dist_min away.
            loop {
                let closest = lines
                    .iter()
                    .enumerate()
                    .map(|(idx, line)| (idx, (line - location).norm()))
                    .min_by_key(|&(_, d)| FloatOrd(d));
                match closest {
                    Some((idx, d)) if d < params.tree_dist_min => {
                        let fused = lines.remove(idx);
                        location = (location + fused) * 0.5;
                    }
                    _ => break,
                }
            }
            lines.push(location);
        } else if support < params.abs_min_clusters {
            break;
        } else {
            // Not enough support for a line, but enough that retrying without
            // these clusters may still find one.
            for &i in &matched {
                available[i] = false;
            }
        }
    }

    Ok(lines)
}

/// Redistributes clusters among the fitted lines and computes final tree
/// locations and point sets.
///
/// Every (line, cluster) pair within `refit_dist_max` (normalized) is an
/// assignment. Clusters matched to exactly one line transfer whole; clusters
/// matched to several lines are split point by point, each point going to the
/// planar-nearest line. Points of radius-capped clusters are only kept within
/// the cap distance of the final line location, so an oversized cluster
/// cannot drag a neighbouring tree's points in.
fn refit_clusters(
    clusters: Vec<Cluster>,
    lines: &[Vector2<f64>],
    params: &SegmentationParams,
) -> Vec<TreeLocation> {
    if lines.is_empty() {
        return Vec::new();
    }
    let mut assigned: Vec<Vec<Cluster>> = vec![Vec::new(); lines.len()];

    for cluster in clusters {
        let matched: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| (*line - cluster.center).norm() / cluster.radius <= params.refit_dist_max)
            .map(|(idx, _)| idx)
            .collect();
        match matched.len() {
            0 => {}
            1 => assigned[matched[0]].push(cluster),
            _ => split_cluster(cluster, &matched, lines, params, &mut assigned),
        }
    }

    let mut locations = Vec::new();
    for line_clusters in &assigned {
        if line_clusters.is_empty() {
            continue;
        }
        let location = weighted_center(line_clusters.iter());
        let mut points = PointCloud::new();
        for cluster in line_clusters {
            if cluster.radius < params.max_cluster_radius {
                points.extend_from(&cluster.points);
            } else {
                for point in &cluster.points {
                    if (point.planar() - location).norm() <= params.max_cluster_radius {
                        points.push(*point);
                    }
                }
            }
        }
        if points.is_empty() {
            continue;
        }
        locations.push(TreeLocation {
            position: location,
            points,
        });
    }
    locations
}

/// Splits a multiply-matched cluster by assigning each of its points to the
/// nearest matched line, then registers the non-degenerate sub-clusters.
fn split_cluster(
    cluster: Cluster,
    matched: &[usize],
    lines: &[Vector2<f64>],
    params: &SegmentationParams,
    assigned: &mut Vec<Vec<Cluster>>,
) {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); matched.len()];
    for (pi, point) in cluster.points.iter().enumerate() {
        let planar = point.planar();
        let nearest = matched
            .iter()
            .enumerate()
            .min_by_key(|&(_, &line)| FloatOrd((lines[line] - planar).norm()))
            .map(|(group, _)| group)
            .unwrap();
        groups[nearest].push(pi);
    }
    for (group, indices) in groups.iter().enumerate() {
        // sub-clusters with fewer than two points have no defined radius
        if indices.len() < 2 {
            continue;
        }
        let points = cluster.points.select(indices);
        let center = points
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.planar())
            / points.len() as f64;
        let radius = points
            .iter()
            .map(|p| (p.planar() - center).norm())
            .max_by_key(|&d| FloatOrd(d))
            .unwrap()
            .min(params.max_cluster_radius);
        assigned[matched[group]].push(Cluster {
            layer: cluster.layer,
            center,
            radius,
            points,
        });
    }
}
