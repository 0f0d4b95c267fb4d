//! Quality metrics and reconstruction quality tiers

use serde::{Deserialize, Serialize};

/// Multi-metric quality assessment of a reconstructed mesh
///
/// All component scores are in [0, 1]. `overall_quality` is the weighted
/// combination used by the acceptance gate; `is_acceptable` is the gate
/// verdict itself so downstream consumers never re-derive it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub point_density: f32,
    pub surface_completeness: f32,
    pub noise_level: f32,
    pub feature_preservation: f32,
    pub surface_continuity: f32,
    pub geometric_quality: f32,
    pub overall_quality: f32,
    pub is_acceptable: bool,
}

/// Weight of the density score in the overall quality combination
pub const DENSITY_WEIGHT: f32 = 0.3;
/// Weight of the continuity score in the overall quality combination
pub const CONTINUITY_WEIGHT: f32 = 0.4;
/// Weight of the geometric score in the overall quality combination
pub const GEOMETRIC_WEIGHT: f32 = 0.3;

impl QualityMetrics {
    /// Weighted combination of the three gate scores
    pub fn combine(density: f32, continuity: f32, geometric: f32) -> f32 {
        DENSITY_WEIGHT * density + CONTINUITY_WEIGHT * continuity + GEOMETRIC_WEIGHT * geometric
    }
}

/// Reconstruction quality tier trading latency for fidelity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconstructionQuality {
    /// Fast preview-grade reconstruction
    Low,
    /// Balanced speed and fidelity
    Medium,
    /// Full-fidelity reconstruction for final output
    High,
}

impl ReconstructionQuality {
    /// Minimum octree depth, enforced regardless of point density
    pub fn base_octree_depth(self) -> u32 {
        match self {
            Self::Low => 3,
            Self::Medium => 4,
            Self::High => 5,
        }
    }

    /// Hard cap on octree depth
    pub fn max_octree_depth(self) -> u32 {
        match self {
            Self::Low => 6,
            Self::Medium => 8,
            Self::High => 10,
        }
    }

    /// Density above which a node splits once past the base depth,
    /// in points per unit volume
    pub fn split_threshold(self) -> f32 {
        match self {
            Self::Low => 50_000.0,
            Self::Medium => 20_000.0,
            Self::High => 10_000.0,
        }
    }

    /// Target sample count per solver octree node
    pub fn samples_per_node(self) -> usize {
        match self {
            Self::Low => 10,
            Self::Medium => 5,
            Self::High => 2,
        }
    }

    /// Relaxation iterations granted to the implicit-surface solver
    pub fn solver_iterations(self) -> usize {
        match self {
            Self::Low => 4,
            Self::Medium => 8,
            Self::High => 12,
        }
    }

    /// Minimum input size; smaller clouds are rejected before any work begins
    pub fn min_points(self) -> usize {
        match self {
            Self::Low => 100,
            Self::Medium => 500,
            Self::High => 1000,
        }
    }

    /// Minimum ratio of mesh vertices to input points accepted from the solver
    pub fn min_vertex_ratio(self) -> f32 {
        match self {
            Self::Low => 0.01,
            Self::Medium => 0.02,
            Self::High => 0.05,
        }
    }

    /// Minimum fraction of the input extent the mesh must span
    pub fn min_surface_completeness(self) -> f32 {
        match self {
            Self::Low => 0.3,
            Self::Medium => 0.5,
            Self::High => 0.6,
        }
    }

    /// Minimum fraction of faces whose normal agrees with its vertex normals
    pub fn min_normal_consistency(self) -> f32 {
        match self {
            Self::Low => 0.5,
            Self::Medium => 0.7,
            Self::High => 0.8,
        }
    }
}
