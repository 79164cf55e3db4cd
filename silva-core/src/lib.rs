#![warn(clippy::all)]

//! Core data structures for forest plot point cloud segmentation
//!
//! Silva works on terrestrial/aerial laser scans of forest plots. This crate
//! provides the in-memory point cloud container used throughout the project,
//! together with the spatial primitives the segmentation algorithms are built
//! on: axis-aligned bounding boxes and a uniform voxel grid with a sorted
//! voxel-to-point index.

pub extern crate nalgebra;

/// Point cloud container with opaque pass-through attributes
pub mod cloud;
/// Mathematical tools for working with point cloud data
pub mod math;
/// Uniform voxel grid builder and voxel-to-point index
pub mod voxel;

pub use cloud::{PlotPoint, PointAttributes, PointCloud};
pub use math::AABB;
pub use voxel::{Voxel, VoxelGrid, VoxelGridError};
