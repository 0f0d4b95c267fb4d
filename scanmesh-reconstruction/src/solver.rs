//! Implicit-surface solver
//!
//! The numerical backend is pluggable behind [`ImplicitSolver`]; the default
//! implementation adapts the `poisson_reconstruction` crate. Only the solver
//! contract is fixed here: an oriented point set in, a triangle mesh out,
//! with typed failures instead of degraded output.

use poisson_reconstruction::PoissonReconstruction;
use rayon::prelude::*;
use scanmesh_core::{Error, OrientedCloud, Point3f, Result, TriangleMesh};

/// Minimum oriented points any solver backend is asked to handle
pub const MIN_SOLVER_POINTS: usize = 10;

/// Tier-derived tunables handed to the solver backend
#[derive(Debug, Clone, Copy)]
pub struct SolverParams {
    /// Depth of the solver's internal octree
    pub octree_depth: u32,
    /// Target sample count per solver octree node; deeper octrees are
    /// clamped so nodes keep at least this many samples
    pub samples_per_node: usize,
    /// Relaxation iterations granted to the solver
    pub iterations: usize,
}

/// Strategy interface for implicit-surface reconstruction
pub trait ImplicitSolver {
    /// Triangulate the zero level set of a scalar field fitted to the
    /// oriented point set
    fn reconstruct(&self, cloud: &OrientedCloud, params: &SolverParams) -> Result<TriangleMesh>;
}

/// Screened Poisson surface reconstruction backend
#[derive(Debug, Clone, Copy)]
pub struct PoissonSolver {
    /// Screening weight balancing point interpolation against smoothness
    pub screening: f64,
}

impl Default for PoissonSolver {
    fn default() -> Self {
        Self { screening: 1.1 }
    }
}

impl PoissonSolver {
    /// Clamp the requested depth so occupied nodes keep roughly
    /// `samples_per_node` samples
    ///
    /// Scan input samples a surface, so octree occupancy grows with the
    /// squared branching factor rather than the cubed one.
    fn effective_depth(&self, point_count: usize, params: &SolverParams) -> usize {
        let samples = params.samples_per_node.max(1);
        let cap = if point_count > samples {
            ((point_count as f32 / samples as f32).log2() / 2.0).floor() as u32
        } else {
            1
        };
        params.octree_depth.min(cap).max(1) as usize
    }
}

impl ImplicitSolver for PoissonSolver {
    fn reconstruct(&self, cloud: &OrientedCloud, params: &SolverParams) -> Result<TriangleMesh> {
        if cloud.len() < MIN_SOLVER_POINTS {
            return Err(Error::InsufficientPoints {
                required: MIN_SOLVER_POINTS,
                actual: cloud.len(),
            });
        }

        let points: Vec<nalgebra::Point3<f64>> = cloud
            .points
            .par_iter()
            .map(|p| nalgebra::Point3::new(
                p.position.x as f64,
                p.position.y as f64,
                p.position.z as f64,
            ))
            .collect();
        let normals: Vec<nalgebra::Vector3<f64>> = cloud
            .points
            .par_iter()
            .map(|p| nalgebra::Vector3::new(
                p.normal.x as f64,
                p.normal.y as f64,
                p.normal.z as f64,
            ))
            .collect();

        for (i, normal) in normals.iter().enumerate() {
            let magnitude = normal.magnitude();
            if magnitude < 1e-6 || (magnitude - 1.0).abs() > 0.1 {
                return Err(Error::InvalidGeometry(format!(
                    "non-unit normal at point {i} (magnitude {magnitude})"
                )));
            }
        }

        let depth = self.effective_depth(points.len(), params);
        let poisson = PoissonReconstruction::from_points_and_normals(
            &points,
            &normals,
            self.screening,
            depth,
            params.iterations,
            0, // max memory usage (0 = unlimited)
        );
        let buffers = poisson.reconstruct_mesh_buffers();

        if buffers.vertices().is_empty() {
            return Err(Error::ReconstructionFailed(
                "solver produced no vertices".to_string(),
            ));
        }
        let indices = buffers.indices();
        if indices.is_empty() || indices.len() % 3 != 0 {
            return Err(Error::ReconstructionFailed(
                "solver produced a degenerate index buffer".to_string(),
            ));
        }

        let vertices: Vec<Point3f> = buffers
            .vertices()
            .par_iter()
            .map(|v| Point3f::new(v.x as f32, v.y as f32, v.z as f32))
            .collect();
        let triangles: Vec<[usize; 3]> = indices
            .chunks(3)
            .map(|chunk| [chunk[0] as usize, chunk[1] as usize, chunk[2] as usize])
            .collect();
        if triangles
            .iter()
            .any(|t| t.iter().any(|&i| i >= vertices.len()))
        {
            return Err(Error::ReconstructionFailed(
                "solver index buffer references missing vertices".to_string(),
            ));
        }

        let mut mesh = TriangleMesh::from_vertices_and_triangles(vertices, triangles);
        // Solver output has no per-vertex provenance; carry the input cloud's
        // mean confidence uniformly.
        let mean_confidence = cloud.iter().map(|p| p.confidence).sum::<f32>()
            / cloud.len() as f32;
        mesh.confidence = vec![mean_confidence; mesh.vertex_count()];
        mesh.validate()?;
        Ok(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::{OrientedPoint, Vector3f};

    #[test]
    fn test_too_few_points_rejected() {
        let cloud = OrientedCloud::from_points(vec![OrientedPoint::default(); 3]);
        let solver = PoissonSolver::default();
        let params = SolverParams {
            octree_depth: 6,
            samples_per_node: 2,
            iterations: 8,
        };
        assert!(matches!(
            solver.reconstruct(&cloud, &params),
            Err(Error::InsufficientPoints { required: 10, actual: 3 })
        ));
    }

    #[test]
    fn test_non_unit_normal_rejected() {
        let mut points = vec![OrientedPoint::default(); 12];
        points[5].normal = Vector3f::new(0.0, 0.0, 3.0);
        let cloud = OrientedCloud::from_points(points);
        let solver = PoissonSolver::default();
        let params = SolverParams {
            octree_depth: 6,
            samples_per_node: 2,
            iterations: 8,
        };
        assert!(matches!(
            solver.reconstruct(&cloud, &params),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_effective_depth_respects_samples_per_node() {
        let solver = PoissonSolver::default();
        let params = SolverParams {
            octree_depth: 10,
            samples_per_node: 2,
            iterations: 8,
        };
        // 10_000 points / 2 per node supports ~2^(log2(5000)/2) nodes per
        // axis, which is depth 6.
        assert_eq!(solver.effective_depth(10_000, &params), 6);
        // The requested depth still wins when it is smaller.
        let shallow = SolverParams {
            octree_depth: 3,
            ..params
        };
        assert_eq!(solver.effective_depth(10_000, &shallow), 3);
        // Tiny inputs never go below depth 1.
        assert_eq!(solver.effective_depth(2, &params), 1);
    }
}
