//! Core data structures and traits for scanmesh
//!
//! This crate provides the fundamental types shared by the reconstruction
//! pipeline: points and point clouds, triangle meshes, bounding boxes,
//! quality metrics, reconstruction tiers and the typed error model.

pub mod bounds;
pub mod error;
pub mod mesh;
pub mod point;
pub mod point_cloud;
pub mod quality;
pub mod traits;

pub use bounds::*;
pub use error::*;
pub use mesh::*;
pub use point::*;
pub use point_cloud::*;
pub use quality::*;
pub use traits::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Point3, Vector3};
