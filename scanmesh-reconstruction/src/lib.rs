//! # scanmesh-reconstruction
//!
//! The surface reconstruction pipeline: implicit-surface solving, mesh
//! cleanup, smoothing and the multi-metric quality gate, orchestrated per
//! call by [`SurfaceReconstructor`] and [`reconstruct_scan`].

pub mod optimizer;
pub mod pipeline;
pub mod smoothing;
pub mod solver;
pub mod validation;

// Re-export commonly used items
pub use optimizer::*;
pub use pipeline::*;
pub use smoothing::*;
pub use solver::*;
pub use validation::*;
