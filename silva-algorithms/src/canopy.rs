//! Canopy height raster and local maxima detection.
//!
//! The highest first-return point per cell gives a coarse canopy height
//! model. After infill of empty cells and Gaussian smoothing, cells that
//! survive a max-filter comparison are tree apex candidates; each becomes a
//! synthetic cluster that seeds the trunk line fitting alongside the real
//! density clusters.

use crate::config::SegmentationParams;
use crate::layers::Cluster;
use silva_core::cloud::PointCloud;
use silva_core::nalgebra::Vector2;

/// A 2D raster over the plot, row-major with the origin at the top-left
/// (north-west) corner: row 0 holds the highest y coordinates.
#[derive(Debug, Clone)]
pub struct Raster {
    nrow: usize,
    ncol: usize,
    data: Vec<f64>,
    resolution: f64,
    x_min: f64,
    y_max: f64,
}

impl Raster {
    fn new(nrow: usize, ncol: usize, resolution: f64, x_min: f64, y_max: f64) -> Self {
        Self {
            nrow,
            ncol,
            data: vec![f64::NAN; nrow * ncol],
            resolution,
            x_min,
            y_max,
        }
    }

    pub fn nrow(&self) -> usize {
        self.nrow
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.ncol + col]
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.ncol + col] = value;
    }

    /// World coordinates of a cell center.
    pub fn cell_center(&self, row: usize, col: usize) -> Vector2<f64> {
        Vector2::new(
            self.x_min + (col as f64 + 0.5) * self.resolution,
            self.y_max - (row as f64 + 0.5) * self.resolution,
        )
    }
}

/// Rasterizes the plot, fills empty cells from their neighbours and smooths
/// with a Gaussian filter. Returns `None` for an empty cloud.
///
/// Cell values are the height of the highest first-return point in the cell.
pub fn create_canopy_raster(
    cloud: &PointCloud,
    resolution: f64,
    sigma: f64,
    window_size: usize,
) -> Option<Raster> {
    let bounds = cloud.bounds()?;
    let x_min = (bounds.min().x / resolution).floor() * resolution;
    let y_min = (bounds.min().y / resolution).floor() * resolution;
    let x_max = ((bounds.max().x / resolution).floor() + 1.0) * resolution;
    let y_max = ((bounds.max().y / resolution).floor() + 1.0) * resolution;
    let ncol = ((x_max - x_min) / resolution).round() as usize;
    let nrow = ((y_max - y_min) / resolution).round() as usize;

    let mut raster = Raster::new(nrow, ncol, resolution, x_min, y_max);
    for point in cloud {
        if !point.attributes.is_first_return() {
            continue;
        }
        let col = ((point.position.x - x_min) / resolution).floor() as isize;
        let row = ((y_max - point.position.y) / resolution).floor() as isize;
        if row < 0 || col < 0 || row >= nrow as isize || col >= ncol as isize {
            continue;
        }
        let (row, col) = (row as usize, col as usize);
        let current = raster.get(row, col);
        if current.is_nan() || point.position.z > current {
            raster.set(row, col, point.position.z);
        }
    }

    fill_empty_cells(&mut raster);
    Some(gaussian_smooth(&raster, sigma, window_size))
}

/// Iteratively replaces empty (NaN) cells with the mean of their non-empty
/// 8-neighbours until every reachable cell is filled.
fn fill_empty_cells(raster: &mut Raster) {
    loop {
        let mut updates: Vec<(usize, usize, f64)> = Vec::new();
        for row in 0..raster.nrow {
            for col in 0..raster.ncol {
                if !raster.get(row, col).is_nan() {
                    continue;
                }
                let mut sum = 0.0;
                let mut count = 0;
                for dr in -1isize..=1 {
                    for dc in -1isize..=1 {
                        if dr == 0 && dc == 0 {
                            continue;
                        }
                        let (r, c) = (row as isize + dr, col as isize + dc);
                        if r < 0 || c < 0 || r >= raster.nrow as isize || c >= raster.ncol as isize
                        {
                            continue;
                        }
                        let v = raster.get(r as usize, c as usize);
                        if !v.is_nan() {
                            sum += v;
                            count += 1;
                        }
                    }
                }
                if count > 0 {
                    updates.push((row, col, sum / count as f64));
                }
            }
        }
        if updates.is_empty() {
            break;
        }
        for (row, col, value) in updates {
            raster.set(row, col, value);
        }
    }
}

/// Separable Gaussian filter over a fixed window with replicated borders.
fn gaussian_smooth(raster: &Raster, sigma: f64, window_size: usize) -> Raster {
    let half = (window_size / 2) as isize;
    let kernel: Vec<f64> = (-half..=half)
        .map(|i| {
            let x = i as f64;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let norm: f64 = kernel.iter().sum();
    let kernel: Vec<f64> = kernel.iter().map(|v| v / norm).collect();

    let clamp = |v: isize, upper: usize| (v.max(0) as usize).min(upper - 1);

    // Horizontal pass
    let mut tmp = raster.clone();
    for row in 0..raster.nrow {
        for col in 0..raster.ncol {
            let mut sum = 0.0;
            for (ki, dc) in (-half..=half).enumerate() {
                sum += kernel[ki] * raster.get(row, clamp(col as isize + dc, raster.ncol));
            }
            tmp.set(row, col, sum);
        }
    }
    // Vertical pass
    let mut out = tmp.clone();
    for row in 0..raster.nrow {
        for col in 0..raster.ncol {
            let mut sum = 0.0;
            for (ki, dr) in (-half..=half).enumerate() {
                sum += kernel[ki] * tmp.get(clamp(row as isize + dr, raster.nrow), col);
            }
            out.set(row, col, sum);
        }
    }
    out
}

/// Finds local maxima of the raster.
///
/// A cell is a local maximum if a max-filter over `window_size` changes its
/// value by less than `max_point_diff` and its height exceeds
/// `background_thresh`.
pub fn find_local_maxima(
    raster: &Raster,
    window_size: usize,
    max_point_diff: f64,
    background_thresh: f64,
) -> Vec<(usize, usize, f64)> {
    let half = (window_size / 2) as isize;
    let mut maxima = Vec::new();
    for row in 0..raster.nrow() {
        for col in 0..raster.ncol() {
            let value = raster.get(row, col);
            if value.is_nan() || value <= background_thresh {
                continue;
            }
            let mut window_max = f64::NEG_INFINITY;
            for dr in -half..=half {
                for dc in -half..=half {
                    let (r, c) = (row as isize + dr, col as isize + dc);
                    if r < 0 || c < 0 || r >= raster.nrow() as isize || c >= raster.ncol() as isize
                    {
                        continue;
                    }
                    let v = raster.get(r as usize, c as usize);
                    if v > window_max {
                        window_max = v;
                    }
                }
            }
            if (window_max - value).abs() < max_point_diff {
                maxima.push((row, col, value));
            }
        }
    }
    maxima
}

/// Appends one synthetic cluster per canopy maximum to the cluster table.
///
/// Each maximum becomes a cluster of radius 0.5 m with an empty point set,
/// placed one layer above the highest real layer, so the trunk line fitting
/// can anchor on tree apexes that the density clustering missed.
pub fn add_maxima_clusters(
    cloud: &PointCloud,
    clusters: &mut Vec<Cluster>,
    params: &SegmentationParams,
) {
    let raster = match create_canopy_raster(cloud, params.resolution, params.sigma, params.window_size)
    {
        Some(r) => r,
        None => return,
    };
    let maxima = find_local_maxima(
        &raster,
        params.window_size,
        params.max_point_diff,
        params.background_thresh,
    );
    let layer = clusters.iter().map(|c| c.layer).max().map_or(0, |m| m + 1);
    for (row, col, _) in maxima {
        clusters.push(Cluster {
            layer,
            center: raster.cell_center(row, col),
            radius: 0.5,
            points: PointCloud::new(),
        });
    }
}
