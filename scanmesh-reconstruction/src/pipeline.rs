//! Reconstruction orchestration
//!
//! [`SurfaceReconstructor`] owns one reconstruction call end to end: input
//! validation, spatial index build, normal estimation, the implicit-surface
//! solve and structural validation of the result. All configuration is
//! captured in the reconstructor value itself, so a call shares no state
//! with any other call.
//!
//! [`reconstruct_scan`] wires the full pipeline together the way the
//! scanning flow runs it: preprocess, reconstruct, optimize, smooth, gate.

use crate::optimizer::{optimize_mesh, OptimizerConfig};
use crate::smoothing::{smooth_mesh, SmoothingParams};
use crate::solver::{ImplicitSolver, PoissonSolver, SolverParams};
use crate::validation::{MeshQualityValidator, ValidatorConfig};
use rayon::prelude::*;
use scanmesh_algorithms::{
    estimate_normals, remove_statistical_outliers, voxel_downsample, NormalEstimationConfig,
    Octree, OctreeConfig,
};
use scanmesh_core::{
    Bounded, BoundingBox, Error, QualityMetrics, ReconstructionQuality, Result, ScanCloud,
    TriangleMesh,
};

/// A validated mesh together with its quality assessment
#[derive(Debug, Clone)]
pub struct ReconstructionOutput {
    pub mesh: TriangleMesh,
    pub metrics: QualityMetrics,
}

/// One-call surface reconstruction context
pub struct SurfaceReconstructor<S = PoissonSolver> {
    tier: ReconstructionQuality,
    normal_config: NormalEstimationConfig,
    solver: S,
}

impl SurfaceReconstructor<PoissonSolver> {
    /// Reconstructor with the default Poisson backend
    pub fn new(tier: ReconstructionQuality, normal_config: NormalEstimationConfig) -> Self {
        Self {
            tier,
            normal_config,
            solver: PoissonSolver::default(),
        }
    }
}

impl<S: ImplicitSolver> SurfaceReconstructor<S> {
    /// Reconstructor with a custom solver backend
    pub fn with_solver(
        tier: ReconstructionQuality,
        normal_config: NormalEstimationConfig,
        solver: S,
    ) -> Self {
        Self {
            tier,
            normal_config,
            solver,
        }
    }

    pub fn tier(&self) -> ReconstructionQuality {
        self.tier
    }

    /// Reconstruct a triangle mesh from a preprocessed point cloud
    ///
    /// Ingestion failures (`InvalidGeometry`, `InsufficientPoints`) are
    /// raised before any expensive work. A structurally deficient solver
    /// result raises `ReconstructionFailed` instead of returning a degraded
    /// mesh.
    pub fn reconstruct(&self, cloud: &ScanCloud) -> Result<TriangleMesh> {
        self.validate_input(cloud)?;
        let bounds = cloud
            .bounds()
            .ok_or_else(|| Error::InvalidGeometry("empty point cloud".to_string()))?;
        let depth = self.adaptive_depth(cloud.len(), &bounds);

        let positions = cloud.positions();
        let index = Octree::build(
            &positions,
            OctreeConfig {
                base_depth: self.tier.base_octree_depth().min(depth),
                max_depth: depth,
                ..OctreeConfig::from(self.tier)
            },
        )?;
        let oriented = estimate_normals(cloud, &index, &self.normal_config)?;
        // The index exists for normal estimation only; reconstruction and
        // every later stage work from the oriented cloud.
        drop(index);

        let params = SolverParams {
            octree_depth: depth,
            samples_per_node: self.tier.samples_per_node(),
            iterations: self.tier.solver_iterations(),
        };
        let mut mesh = self.solver.reconstruct(&oriented, &params)?;
        mesh.metadata.source = "scanmesh/reconstruction".to_string();

        self.validate_structure(&mesh, cloud.len(), &bounds)?;
        Ok(mesh)
    }

    /// Octree and solver depth adapted to the input density:
    /// `min(base_depth + log2(density), max_depth)`
    fn adaptive_depth(&self, point_count: usize, bounds: &BoundingBox) -> u32 {
        let volume = bounds.volume().max(f32::MIN_POSITIVE);
        let density = point_count as f32 / volume;
        let bonus = density.max(1.0).log2().floor() as u32;
        (self.tier.base_octree_depth() + bonus).min(self.tier.max_octree_depth())
    }

    fn validate_input(&self, cloud: &ScanCloud) -> Result<()> {
        if let Some(bad) = cloud.iter().position(|p| !p.is_finite()) {
            return Err(Error::InvalidGeometry(format!(
                "non-finite coordinate at point {bad}"
            )));
        }
        if let Some(bad) = cloud
            .iter()
            .position(|p| p.confidence.is_some_and(|c| !(0.0..=1.0).contains(&c)))
        {
            return Err(Error::InvalidGeometry(format!(
                "confidence out of [0, 1] at point {bad}"
            )));
        }
        let required = self.tier.min_points();
        if cloud.len() < required {
            return Err(Error::InsufficientPoints {
                required,
                actual: cloud.len(),
            });
        }
        Ok(())
    }

    /// Tier-threshold checks on the solver output: vertex yield, spanned
    /// extent and face/vertex normal agreement
    fn validate_structure(
        &self,
        mesh: &TriangleMesh,
        input_points: usize,
        input_bounds: &BoundingBox,
    ) -> Result<()> {
        mesh.validate()?;
        if mesh.is_empty() {
            return Err(Error::ReconstructionFailed(
                "solver returned an empty mesh".to_string(),
            ));
        }

        let vertex_ratio = mesh.vertex_count() as f32 / input_points as f32;
        if vertex_ratio < self.tier.min_vertex_ratio() {
            return Err(Error::ReconstructionFailed(format!(
                "vertex yield {vertex_ratio:.4} below tier minimum {:.4}",
                self.tier.min_vertex_ratio()
            )));
        }

        let completeness = extent_coverage(mesh, input_bounds);
        if completeness < self.tier.min_surface_completeness() {
            return Err(Error::ReconstructionFailed(format!(
                "mesh spans {completeness:.2} of the scanned extent, tier minimum {:.2}",
                self.tier.min_surface_completeness()
            )));
        }

        let consistency = normal_consistency(mesh);
        if consistency < self.tier.min_normal_consistency() {
            return Err(Error::ReconstructionFailed(format!(
                "normal consistency {consistency:.2} below tier minimum {:.2}",
                self.tier.min_normal_consistency()
            )));
        }
        Ok(())
    }
}

/// Fraction of the input extent the mesh spans, as the worst per-axis ratio
fn extent_coverage(mesh: &TriangleMesh, input_bounds: &BoundingBox) -> f32 {
    let Some(mesh_bounds) = mesh.bounding_box() else {
        return 0.0;
    };
    let input_size = input_bounds.size();
    let mesh_size = mesh_bounds.size();
    let mut worst = 1.0f32;
    for axis in 0..3 {
        if input_size[axis] > f32::EPSILON {
            worst = worst.min((mesh_size[axis] / input_size[axis]).min(1.0));
        }
    }
    worst
}

/// Fraction of non-degenerate faces whose normal agrees with the mean of
/// its vertex normals
fn normal_consistency(mesh: &TriangleMesh) -> f32 {
    let agreements: Vec<bool> = mesh
        .triangles
        .par_iter()
        .enumerate()
        .filter_map(|(i, tri)| {
            let face_normal = mesh.face_normal(i)?;
            let vertex_mean =
                mesh.normals[tri[0]] + mesh.normals[tri[1]] + mesh.normals[tri[2]];
            Some(face_normal.dot(&vertex_mean) > 0.0)
        })
        .collect();
    if agreements.is_empty() {
        return 0.0;
    }
    agreements.iter().filter(|&&a| a).count() as f32 / agreements.len() as f32
}

/// Full-pipeline configuration, immutable for the duration of one call
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub tier: ReconstructionQuality,
    pub normal_estimation: NormalEstimationConfig,
    /// Downsampling grid size; `None` skips downsampling
    pub preprocess_voxel_size: Option<f32>,
    /// Sigma cutoff for point outlier removal during preprocessing
    pub outlier_std_multiplier: f32,
    pub optimizer: OptimizerConfig,
    /// Smoothing pass; `None` skips smoothing
    pub smoothing: Option<SmoothingParams>,
    pub smoothing_iterations: usize,
    pub validator: ValidatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tier: ReconstructionQuality::Medium,
            normal_estimation: NormalEstimationConfig::default(),
            preprocess_voxel_size: None,
            outlier_std_multiplier: 2.0,
            optimizer: OptimizerConfig::default(),
            smoothing: Some(SmoothingParams::default()),
            smoothing_iterations: 3,
            validator: ValidatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_tier(tier: ReconstructionQuality) -> Self {
        Self {
            tier,
            ..Default::default()
        }
    }
}

/// Run the complete scan pipeline: preprocess, reconstruct, optimize,
/// smooth, gate
///
/// Returns the cleaned mesh and its quality metrics, or
/// `QualityBelowThreshold` carrying the metrics when the gate fails; the
/// caller decides whether to retry with a relaxed tier or gather more data.
pub fn reconstruct_scan(cloud: &ScanCloud, config: &PipelineConfig) -> Result<ReconstructionOutput> {
    let mut cloud = match config.preprocess_voxel_size {
        Some(voxel_size) => voxel_downsample(cloud, voxel_size)?,
        None => cloud.clone(),
    };
    if cloud.len() > 1 {
        cloud = remove_statistical_outliers(&cloud, config.outlier_std_multiplier)?;
    }

    let reconstructor = SurfaceReconstructor::new(config.tier, config.normal_estimation);
    let mesh = reconstructor.reconstruct(&cloud)?;
    let mesh = optimize_mesh(&mesh, &config.optimizer)?;
    let mesh = match &config.smoothing {
        Some(params) => smooth_mesh(&mesh, config.smoothing_iterations, params)?,
        None => mesh,
    };

    let validator = MeshQualityValidator::new(config.validator)?;
    let metrics = validator.check(&mesh)?;
    Ok(ReconstructionOutput { mesh, metrics })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::{OrientedCloud, Point3f, ScanPoint};

    /// Solver stub that returns a fixed mesh, for orchestration tests
    struct FixedMeshSolver {
        mesh: TriangleMesh,
    }

    impl ImplicitSolver for FixedMeshSolver {
        fn reconstruct(&self, _cloud: &OrientedCloud, _params: &SolverParams) -> Result<TriangleMesh> {
            Ok(self.mesh.clone())
        }
    }

    fn dense_plane(n: usize) -> ScanCloud {
        let mut cloud = ScanCloud::new();
        for i in 0..n {
            for j in 0..n {
                cloud.push(ScanPoint::new(i as f32 / n as f32, j as f32 / n as f32, 0.0));
            }
        }
        cloud
    }

    fn plane_mesh(n: usize) -> TriangleMesh {
        let mut vertices = Vec::new();
        for i in 0..n {
            for j in 0..n {
                vertices.push(Point3f::new(i as f32 / n as f32, j as f32 / n as f32, 0.0));
            }
        }
        let mut triangles = Vec::new();
        for i in 0..n - 1 {
            for j in 0..n - 1 {
                let a = i * n + j;
                triangles.push([a, a + 1, a + n]);
                triangles.push([a + 1, a + n + 1, a + n]);
            }
        }
        TriangleMesh::from_vertices_and_triangles(vertices, triangles)
    }

    #[test]
    fn test_insufficient_points_rejected_before_work() {
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(0.0, 0.0, 0.0),
            ScanPoint::new(1.0, 0.0, 0.0),
            ScanPoint::new(0.0, 1.0, 0.0),
        ]);
        let reconstructor = SurfaceReconstructor::new(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
        );
        assert!(matches!(
            reconstructor.reconstruct(&cloud),
            Err(Error::InsufficientPoints { required: 100, actual: 3 })
        ));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut cloud = dense_plane(20);
        cloud.push(ScanPoint::new(f32::NAN, 0.0, 0.0));
        let reconstructor = SurfaceReconstructor::new(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
        );
        assert!(matches!(
            reconstructor.reconstruct(&cloud),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_out_of_range_confidence_rejected() {
        let mut cloud = dense_plane(20);
        cloud.push(ScanPoint::with_confidence(0.5, 0.5, 0.0, 1.5));
        let reconstructor = SurfaceReconstructor::new(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
        );
        assert!(matches!(
            reconstructor.reconstruct(&cloud),
            Err(Error::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_degraded_solver_output_raises_reconstruction_failed() {
        // A solver that yields a single triangle for a 400-point input
        // fails the vertex-yield threshold.
        let stub = FixedMeshSolver {
            mesh: TriangleMesh::from_vertices_and_triangles(
                vec![
                    Point3f::new(0.0, 0.0, 0.0),
                    Point3f::new(1.0, 0.0, 0.0),
                    Point3f::new(0.0, 1.0, 0.0),
                ],
                vec![[0, 1, 2]],
            ),
        };
        let reconstructor = SurfaceReconstructor::with_solver(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
            stub,
        );
        assert!(matches!(
            reconstructor.reconstruct(&dense_plane(20)),
            Err(Error::ReconstructionFailed(_))
        ));
    }

    #[test]
    fn test_structural_validation_accepts_matching_mesh() {
        let stub = FixedMeshSolver {
            mesh: plane_mesh(20),
        };
        let reconstructor = SurfaceReconstructor::with_solver(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
            stub,
        );
        let mesh = reconstructor.reconstruct(&dense_plane(20)).unwrap();
        assert_eq!(mesh.vertex_count(), 400);
        assert_eq!(mesh.metadata.source, "scanmesh/reconstruction");
    }

    #[test]
    fn test_adaptive_depth_is_clamped_to_tier_max() {
        let reconstructor = SurfaceReconstructor::new(
            ReconstructionQuality::Low,
            NormalEstimationConfig::default(),
        );
        // A tiny, extremely dense volume maxes out the bonus.
        let bounds = BoundingBox::new(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.01, 0.01, 0.01),
        );
        let depth = reconstructor.adaptive_depth(1_000_000, &bounds);
        assert_eq!(depth, ReconstructionQuality::Low.max_octree_depth());

        // A sparse cloud stays at the base depth.
        let bounds = BoundingBox::new(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(100.0, 100.0, 100.0),
        );
        let depth = reconstructor.adaptive_depth(100, &bounds);
        assert_eq!(depth, ReconstructionQuality::Low.base_octree_depth());
    }

    #[test]
    fn test_full_pipeline_rejects_tiny_input() {
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(0.0, 0.0, 0.0),
            ScanPoint::new(1.0, 0.0, 0.0),
            ScanPoint::new(0.0, 1.0, 0.0),
        ]);
        let config = PipelineConfig::default();
        assert!(matches!(
            reconstruct_scan(&cloud, &config),
            Err(Error::InsufficientPoints { .. })
        ));
    }
}
