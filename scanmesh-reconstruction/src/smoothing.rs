//! Iterative mesh smoothing
//!
//! Laplacian, Taubin and HC-Laplacian relaxation over vertex positions.
//! Neighborhoods come from a fixed-radius search over the *current*
//! positions and are rebuilt every step, so this is a dynamic relaxation:
//! vertices that drift apart stop influencing each other. Freezing the
//! neighbor topology across iterations would change convergence behavior.
//!
//! Smoothing never touches vertex count or triangle indices; only positions
//! move, and vertex normals are refreshed from the final positions.

use rayon::prelude::*;
use scanmesh_algorithms::{Octree, OctreeConfig};
use scanmesh_core::{Error, Point3f, Result, TriangleMesh};

/// Selectable smoothing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingAlgorithm {
    /// Move each vertex toward its neighborhood centroid by `lambda`.
    /// Fast, but shrinks enclosed volume.
    Laplacian,
    /// Alternate a positive `lambda` step with a negative `mu` step
    /// (`|mu| > lambda`) to smooth without the shrinkage
    Taubin,
    /// Displace along an inverse-distance-weighted curvature vector
    HcLaplacian,
}

/// Parameters shared by all smoothing algorithms
#[derive(Debug, Clone, Copy)]
pub struct SmoothingParams {
    pub algorithm: SmoothingAlgorithm,
    /// Positive relaxation factor in (0, 1]
    pub lambda: f32,
    /// Negative counter-step factor, Taubin only
    pub mu: f32,
    /// Fixed neighborhood radius
    pub neighbor_radius: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            algorithm: SmoothingAlgorithm::Taubin,
            lambda: 0.5,
            mu: -0.53,
            neighbor_radius: 0.1,
        }
    }
}

impl SmoothingParams {
    fn validate(&self) -> Result<()> {
        if !(self.lambda > 0.0 && self.lambda <= 1.0) {
            return Err(Error::InvalidParameter(
                "lambda must be in (0, 1]".to_string(),
            ));
        }
        if self.algorithm == SmoothingAlgorithm::Taubin
            && !(self.mu < 0.0 && self.mu.abs() > self.lambda)
        {
            return Err(Error::InvalidParameter(
                "Taubin requires mu < 0 with |mu| > lambda".to_string(),
            ));
        }
        if !(self.neighbor_radius > 0.0 && self.neighbor_radius.is_finite()) {
            return Err(Error::InvalidParameter(
                "neighbor_radius must be positive and finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Smooth a mesh for `iterations` rounds of the selected algorithm
///
/// Pure with respect to the input: the mesh is never mutated, a relaxed copy
/// is returned.
pub fn smooth_mesh(
    mesh: &TriangleMesh,
    iterations: usize,
    params: &SmoothingParams,
) -> Result<TriangleMesh> {
    params.validate()?;
    mesh.validate()?;
    if mesh.vertices.len() < 2 || iterations == 0 {
        return Ok(mesh.clone());
    }

    let mut positions = mesh.vertices.clone();
    for _ in 0..iterations {
        match params.algorithm {
            SmoothingAlgorithm::Laplacian => {
                positions = centroid_step(&positions, params.lambda, params.neighbor_radius)?;
            }
            SmoothingAlgorithm::Taubin => {
                positions = centroid_step(&positions, params.lambda, params.neighbor_radius)?;
                positions = centroid_step(&positions, params.mu, params.neighbor_radius)?;
            }
            SmoothingAlgorithm::HcLaplacian => {
                positions = curvature_step(&positions, params.lambda, params.neighbor_radius)?;
            }
        }
    }

    let mut smoothed = TriangleMesh {
        vertices: positions,
        normals: mesh.normals.clone(),
        triangles: mesh.triangles.clone(),
        confidence: mesh.confidence.clone(),
        metadata: mesh.metadata.clone(),
    };
    smoothed.recompute_vertex_normals();
    Ok(smoothed)
}

/// Move every vertex toward its radius-neighborhood centroid by `factor`
///
/// A negative factor moves away from the centroid, which is how the Taubin
/// counter-step reuses this.
fn centroid_step(positions: &[Point3f], factor: f32, radius: f32) -> Result<Vec<Point3f>> {
    let index = Octree::build(positions, OctreeConfig::default())?;
    Ok(positions
        .par_iter()
        .map(|vertex| {
            let neighbors = index.find_neighbors(vertex, radius);
            if neighbors.is_empty() {
                return *vertex;
            }
            let mut centroid = nalgebra::Vector3::zeros();
            for (neighbor, _) in &neighbors {
                centroid += positions[*neighbor].coords;
            }
            centroid /= neighbors.len() as f32;
            vertex + (centroid - vertex.coords) * factor
        })
        .collect())
}

/// Displace every vertex along its inverse-distance-weighted curvature
/// vector, scaled by `factor`
fn curvature_step(positions: &[Point3f], factor: f32, radius: f32) -> Result<Vec<Point3f>> {
    let index = Octree::build(positions, OctreeConfig::default())?;
    Ok(positions
        .par_iter()
        .map(|vertex| {
            let neighbors = index.find_neighbors(vertex, radius);
            if neighbors.is_empty() {
                return *vertex;
            }
            let mut curvature = nalgebra::Vector3::zeros();
            let mut weight_sum = 0.0f32;
            for &(neighbor, distance) in &neighbors {
                // Radius search guarantees distance > 0.
                let weight = 1.0 / distance;
                curvature += (positions[neighbor] - vertex) * weight;
                weight_sum += weight;
            }
            if weight_sum <= f32::EPSILON {
                return *vertex;
            }
            vertex + curvature / weight_sum * factor
        })
        .collect())
}
