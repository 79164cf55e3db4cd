//! Height-layered density clustering.
//!
//! The plot is cut into horizontal bands whose thickness and clustering
//! parameters depend on height: points are scarce near the ground and above
//! the dominant canopy, so those bands are thicker and use laxer density
//! requirements. Each band is clustered independently in the xy-plane, which
//! makes this stage embarrassingly parallel; results are merged in ascending
//! band order so cluster ids stay reproducible.

use crate::config::SegmentationParams;
use float_ord::FloatOrd;
use kd_tree::{KdPoint, KdTree};
use rayon::prelude::*;
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector2;
use std::collections::VecDeque;

/// Density clustering parameters for one height band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerParams {
    /// Thickness of the band (m).
    pub layer_height: f64,
    /// Neighbourhood radius for density clustering (m).
    pub epsilon: f64,
    /// Neighbours required (query point included) for a core point.
    pub min_samples: usize,
}

/// Clustering parameters for a band starting at height `h`.
///
/// Points are scarce in the lowermost region of a forest plot (trunks only)
/// and above 25 m, so those bands are thick with low density requirements;
/// the 10–25 m region holds the bulk of the crowns and uses thin bands.
pub fn clustering_params_at(h: f64) -> LayerParams {
    let (layer_height, epsilon, min_samples) = if h < 6.0 {
        (0.8, 0.1, 12)
    } else if h < 10.0 {
        (0.6, 0.1, 16)
    } else if h < 25.0 {
        (0.4, 0.1, 10)
    } else {
        (0.8, 0.3, 15)
    };
    LayerParams {
        layer_height,
        epsilon,
        min_samples,
    }
}

/// A density-connected group of points within one height band.
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Index of the band the cluster was found in.
    pub layer: usize,
    /// Mean xy position of the member points.
    pub center: Vector2<f64>,
    /// Distance from the center to the furthest member, capped at the
    /// configured maximum cluster radius.
    pub radius: f64,
    /// The member points. Empty for synthetic clusters (canopy maxima).
    pub points: PointCloud,
}

struct Site {
    position: [f64; 2],
    index: usize,
}

impl KdPoint for Site {
    type Scalar = f64;
    type Dim = typenum::U2;
    fn at(&self, k: usize) -> f64 {
        self.position[k]
    }
}

/// Planar DBSCAN. Returns one label per input point; `None` marks noise.
///
/// A point is a core point if at least `min_samples` points (itself included)
/// lie within `epsilon` of it; clusters are the maximal sets reachable from
/// core points through core points.
fn dbscan_planar(points: &[[f64; 2]], epsilon: f64, min_samples: usize) -> Vec<Option<usize>> {
    let sites: Vec<Site> = points
        .iter()
        .enumerate()
        .map(|(index, &position)| Site { position, index })
        .collect();
    let tree = KdTree::build_by_ordered_float(sites);

    let neighborhoods: Vec<Vec<usize>> = points
        .iter()
        .map(|p| {
            tree.within_radius(p, epsilon)
                .into_iter()
                .map(|site| site.index)
                .collect()
        })
        .collect();
    let core: Vec<bool> = neighborhoods
        .iter()
        .map(|n| n.len() >= min_samples)
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut next_label = 0;
    let mut queue = VecDeque::new();
    for start in 0..points.len() {
        if labels[start].is_some() || !core[start] {
            continue;
        }
        let label = next_label;
        next_label += 1;
        labels[start] = Some(label);
        queue.push_back(start);
        while let Some(p) = queue.pop_front() {
            for &q in &neighborhoods[p] {
                if labels[q].is_none() {
                    labels[q] = Some(label);
                    if core[q] {
                        queue.push_back(q);
                    }
                }
            }
        }
    }
    labels
}

fn band_points(cloud: &PointCloud, lower: f64, upper: f64) -> PointCloud {
    cloud.filter(|p| p.height() >= lower && p.height() < upper)
}

/// Clusters one band and computes per-cluster center and capped radius.
/// Single-point clusters have no defined radius and are dropped.
fn cluster_band(
    band: &PointCloud,
    epsilon: f64,
    min_samples: usize,
    layer: usize,
    max_radius: f64,
) -> Vec<Cluster> {
    let planar: Vec<[f64; 2]> = band.iter().map(|p| [p.position.x, p.position.y]).collect();
    let labels = dbscan_planar(&planar, epsilon, min_samples);
    let n_labels = labels.iter().flatten().max().map_or(0, |&m| m + 1);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_labels];
    for (i, label) in labels.iter().enumerate() {
        if let Some(l) = label {
            members[*l].push(i);
        }
    }

    let mut clusters = Vec::new();
    for member_indices in &members {
        if member_indices.len() < 2 {
            continue;
        }
        let center = member_indices
            .iter()
            .fold(Vector2::zeros(), |acc, &i| acc + band.point(i).planar())
            / member_indices.len() as f64;
        let radius = member_indices
            .iter()
            .map(|&i| (band.point(i).planar() - center).norm())
            .max_by_key(|&d| FloatOrd(d))
            .unwrap()
            .min(max_radius);
        clusters.push(Cluster {
            layer,
            center,
            radius,
            points: band.select(member_indices),
        });
    }
    clusters
}

/// Cuts the cloud into height bands and density-clusters each band.
///
/// Band boundaries are computed first: starting from `min_h`, each band grows
/// upward in `layer_height` steps until it contains at least one point or
/// passes `max_h`. Bands are then clustered concurrently and the results
/// concatenated in band order.
pub fn cluster_layers(cloud: &PointCloud, params: &SegmentationParams) -> Vec<Cluster> {
    let mut bands: Vec<(PointCloud, LayerParams)> = Vec::new();
    let mut h = params.min_h;
    while h <= params.max_h {
        let layer_params = clustering_params_at(h);
        let mut upper = h + layer_params.layer_height;
        let mut band = band_points(cloud, h, upper);
        while band.is_empty() && upper <= params.max_h {
            upper += layer_params.layer_height;
            band = band_points(cloud, h, upper);
        }
        if band.is_empty() {
            break;
        }
        bands.push((band, layer_params));
        h = upper;
    }

    bands
        .par_iter()
        .enumerate()
        .map(|(layer, (band, layer_params))| {
            cluster_band(
                band,
                layer_params.epsilon,
                layer_params.min_samples,
                layer,
                params.max_cluster_radius,
            )
        })
        .collect::<Vec<_>>()
        .into_iter()
        .flatten()
        .collect()
}
