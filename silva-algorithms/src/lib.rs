#![warn(clippy::all)]

//! Tree detection and segmentation for forest plot point clouds.
//!
//! Given a normalized plot scan (heights relative to ground), the pipeline in
//! this crate recovers individual trees: it density-clusters horizontal
//! layers of the cloud, stacks the clusters into vertical trunk lines, builds
//! per-tree training data, then grows tree memberships voxel by voxel with an
//! iteratively retrained nearest-neighbour classifier. The entry point is
//! [`pipeline::segment_plot`].

/// Pipeline configuration
pub mod config;
/// Height-layered density clustering
pub mod layers;
/// Canopy height raster and local maxima detection
pub mod canopy;
/// Vertical trunk line fitting
pub mod trunk;
/// Training data refinement (gap trimming and augmentation)
pub mod training;
/// Distance-weighted nearest-neighbour voxel classifier
pub mod classify;
/// Voxel-level region growing
pub mod segment;
/// Per-tree outlier removal
pub mod refine;
/// Full segmentation pipeline
pub mod pipeline;

pub use config::SegmentationParams;
pub use pipeline::{segment_plot, PlotSegmentation, SegmentedTree};
pub use trunk::TreeLocation;
