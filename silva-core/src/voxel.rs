use crate::cloud::PointCloud;
use crate::math::AABB;
use itertools::Itertools;
use nalgebra::Vector3;
use thiserror::Error;

/// Errors raised while building a [`VoxelGrid`].
#[derive(Debug, Error)]
pub enum VoxelGridError {
    #[error("voxel resolution must be positive and finite, got {0}")]
    InvalidResolution(f64),
    #[error("invalid voxel grid extent: {0}")]
    InvalidExtent(&'static str),
}

/// One occupied cell of a [`VoxelGrid`].
///
/// `start..end` is this voxel's slice of the grid's sorted point-index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voxel {
    /// Linear voxel id, packed as `x + nx * (y + ny * z)`.
    pub id: u64,
    /// Cell coordinate along each axis.
    pub cell: [usize; 3],
    /// Number of points inside the voxel. Always >= 1.
    pub count: usize,
    pub start: usize,
    pub end: usize,
}

/// A uniform 3D grid over a point cloud.
///
/// Only occupied cells are stored. The grid keeps, per voxel, the range of a
/// point-index list sorted by voxel id, so the original points of any voxel
/// can be recovered without copying the cloud. Points outside the configured
/// extent are excluded from the index entirely.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    resolution: Vector3<f64>,
    extent: AABB,
    dims: [usize; 3],
    voxels: Vec<Voxel>,
    point_indices: Vec<usize>,
    point_to_voxel: Vec<Option<u64>>,
}

impl VoxelGrid {
    /// Builds a grid with cubic voxels of edge length `resolution`.
    ///
    /// If `extent` is `None`, the bounding box of the cloud is used. See
    /// [`VoxelGrid::build`].
    pub fn build_cubic(
        cloud: &PointCloud,
        resolution: f64,
        extent: Option<AABB>,
    ) -> Result<Self, VoxelGridError> {
        Self::build(
            cloud,
            Vector3::new(resolution, resolution, resolution),
            extent,
        )
    }

    /// Builds a grid with per-axis voxel edge lengths.
    ///
    /// Each point within `extent` is assigned to the cell found by floor
    /// division of its offset from the extent minimum. Points outside the
    /// extent are left unassigned.
    pub fn build(
        cloud: &PointCloud,
        resolution: Vector3<f64>,
        extent: Option<AABB>,
    ) -> Result<Self, VoxelGridError> {
        for &r in &[resolution.x, resolution.y, resolution.z] {
            if !(r.is_finite() && r > 0.0) {
                return Err(VoxelGridError::InvalidResolution(r));
            }
        }
        let extent = match extent.or_else(|| cloud.bounds()) {
            Some(e) => e,
            None => {
                return Err(VoxelGridError::InvalidExtent(
                    "no extent given and the point cloud is empty",
                ))
            }
        };

        let range = extent.extent();
        let dims = [
            ((range.x / resolution.x).ceil() as usize).max(1),
            ((range.y / resolution.y).ceil() as usize).max(1),
            ((range.z / resolution.z).ceil() as usize).max(1),
        ];

        // Pair every in-extent point with its voxel id, then sort by id. The
        // sort is stable so points inside one voxel keep their cloud order.
        let mut point_to_voxel = vec![None; cloud.len()];
        let mut pairs: Vec<(u64, usize)> = Vec::with_capacity(cloud.len());
        for (i, position) in cloud.positions().enumerate() {
            if !extent.contains(&position) {
                continue;
            }
            let offset = position - extent.min().coords;
            let cell = [
                (((offset.x / resolution.x).floor() as usize).min(dims[0] - 1)),
                (((offset.y / resolution.y).floor() as usize).min(dims[1] - 1)),
                (((offset.z / resolution.z).floor() as usize).min(dims[2] - 1)),
            ];
            let id = Self::pack(cell, dims);
            point_to_voxel[i] = Some(id);
            pairs.push((id, i));
        }
        pairs.sort_by_key(|&(id, _)| id);

        let mut voxels = Vec::new();
        let mut point_indices = Vec::with_capacity(pairs.len());
        for (id, group) in &pairs.iter().group_by(|&&(id, _)| id) {
            let start = point_indices.len();
            point_indices.extend(group.map(|&(_, point)| point));
            let end = point_indices.len();
            voxels.push(Voxel {
                id,
                cell: Self::unpack(id, dims),
                count: end - start,
                start,
                end,
            });
        }

        Ok(Self {
            resolution,
            extent,
            dims,
            voxels,
            point_indices,
            point_to_voxel,
        })
    }

    fn pack(cell: [usize; 3], dims: [usize; 3]) -> u64 {
        cell[0] as u64 + dims[0] as u64 * (cell[1] as u64 + dims[1] as u64 * cell[2] as u64)
    }

    fn unpack(id: u64, dims: [usize; 3]) -> [usize; 3] {
        let nx = dims[0] as u64;
        let ny = dims[1] as u64;
        let z = id / (nx * ny);
        let rem = id % (nx * ny);
        [(rem % nx) as usize, (rem / nx) as usize, z as usize]
    }

    pub fn resolution(&self) -> Vector3<f64> {
        self.resolution
    }

    pub fn extent(&self) -> &AABB {
        &self.extent
    }

    /// Number of cells along each axis.
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of height bands (cells along the z axis).
    pub fn layer_count(&self) -> usize {
        self.dims[2]
    }

    /// The occupied voxels, sorted by id.
    pub fn voxels(&self) -> &[Voxel] {
        &self.voxels
    }

    /// The point-index list, sorted by voxel id.
    pub fn point_indices(&self) -> &[usize] {
        &self.point_indices
    }

    /// Indices (into the source cloud) of the points inside `voxel`.
    pub fn points_in_voxel(&self, voxel: &Voxel) -> &[usize] {
        &self.point_indices[voxel.start..voxel.end]
    }

    /// Looks up an occupied voxel by id.
    pub fn voxel_by_id(&self, id: u64) -> Option<&Voxel> {
        self.voxels
            .binary_search_by_key(&id, |v| v.id)
            .ok()
            .map(|i| &self.voxels[i])
    }

    /// The voxel id a source point was assigned to, or `None` if the point
    /// lies outside the grid extent.
    pub fn voxel_of_point(&self, point_index: usize) -> Option<u64> {
        self.point_to_voxel[point_index]
    }

    /// Occupied voxels whose cell lies in height band `layer`.
    pub fn voxels_in_layer(&self, layer: usize) -> impl Iterator<Item = &Voxel> {
        self.voxels.iter().filter(move |v| v.cell[2] == layer)
    }

    /// Dense point-count volume, indexed by voxel id. Cells without points
    /// hold zero.
    pub fn count_volume(&self) -> Vec<u32> {
        let mut counts = vec![0u32; self.dims[0] * self.dims[1] * self.dims[2]];
        for v in &self.voxels {
            counts[v.id as usize] = v.count as u32;
        }
        counts
    }
}
