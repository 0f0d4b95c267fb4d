//! # scanmesh-algorithms
//!
//! Spatial indexing and per-point algorithms for the scanmesh pipeline:
//! the adaptive octree, point cloud preprocessing, RANSAC normal estimation
//! and voxel-occupancy coverage tracking.

pub mod coverage;
pub mod normals;
pub mod octree;
pub mod preprocessing;

// Re-export commonly used items
pub use coverage::*;
pub use normals::*;
pub use octree::*;
pub use preprocessing::*;
