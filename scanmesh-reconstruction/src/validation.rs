//! Mesh quality assessment and acceptance gate
//!
//! Scores a reconstructed mesh along density, continuity and local geometry
//! and combines them into the overall acceptance verdict. Assessment is
//! read-only; the mesh is never mutated.

use rayon::prelude::*;
use scanmesh_algorithms::{Octree, OctreeConfig};
use scanmesh_core::{
    Error, Point3f, QualityMetrics, Result, TriangleMesh, Vector3f,
};

/// Thresholds and search parameters for quality assessment
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    /// Fixed radius for all per-vertex neighbor searches
    pub neighbor_radius: f32,
    /// Required vertex density in vertices per unit of X/Y footprint area.
    /// The footprint (not the volume) is the reference area; scans are
    /// captured roughly front-on, so the X/Y extent tracks the scanned
    /// surface well enough for a density gate.
    pub min_density: f32,
    /// Neighbor spacing treated as a definite hole when reached
    pub max_hole_size: f32,
    /// Hard floor on vertex count; below it a mesh is never acceptable
    pub min_vertex_count: usize,
    /// Overall quality required to pass the gate
    pub acceptance_threshold: f32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            neighbor_radius: 0.1,
            min_density: 100.0,
            max_hole_size: 0.25,
            min_vertex_count: 1000,
            acceptance_threshold: 0.7,
        }
    }
}

impl ValidatorConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("neighbor_radius", self.neighbor_radius),
            ("min_density", self.min_density),
            ("max_hole_size", self.max_hole_size),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(Error::InvalidParameter(format!(
                    "{name} must be positive and finite"
                )));
            }
        }
        if !(self.acceptance_threshold > 0.0 && self.acceptance_threshold <= 1.0) {
            return Err(Error::InvalidParameter(
                "acceptance_threshold must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Multi-metric mesh quality gate
#[derive(Debug, Clone)]
pub struct MeshQualityValidator {
    config: ValidatorConfig,
}

/// Per-vertex measurements folded into the aggregate metrics
struct VertexScores {
    continuity: f32,
    avg_neighbor_distance: Option<f32>,
    /// Local planarity and normal alignment, present with >= 3 neighbors
    geometry: Option<(f32, f32)>,
    connected: bool,
}

impl MeshQualityValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Score a mesh without mutating it
    pub fn assess(&self, mesh: &TriangleMesh) -> QualityMetrics {
        let vertex_count = mesh.vertex_count();
        if vertex_count < 2 {
            return self.finish(vertex_count, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        }
        // Built once; the index is read-only for the parallel queries below.
        let index = match Octree::build(&mesh.vertices, OctreeConfig::default()) {
            Ok(index) => index,
            Err(_) => return self.finish(vertex_count, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0),
        };

        let scores: Vec<VertexScores> = mesh
            .vertices
            .par_iter()
            .zip(&mesh.normals)
            .map(|(vertex, normal)| self.score_vertex(vertex, normal, &mesh.vertices, &index))
            .collect();

        let continuity =
            scores.iter().map(|s| s.continuity).sum::<f32>() / scores.len() as f32;
        let geometry: Vec<(f32, f32)> = scores.iter().filter_map(|s| s.geometry).collect();
        let geometric_quality = if geometry.is_empty() {
            0.0
        } else {
            geometry.iter().map(|(planarity, _)| planarity).sum::<f32>() / geometry.len() as f32
        };
        let feature_preservation = if geometry.is_empty() {
            0.0
        } else {
            geometry.iter().map(|(_, alignment)| alignment).sum::<f32>() / geometry.len() as f32
        };
        let surface_completeness =
            scores.iter().filter(|s| s.connected).count() as f32 / scores.len() as f32;
        let noise_level = noise_from_spacing(&scores);

        let density = match mesh.bounding_box() {
            Some(bounds) if bounds.footprint_area() > f32::EPSILON => {
                let per_area = vertex_count as f32 / bounds.footprint_area();
                (per_area / self.config.min_density).min(1.0)
            }
            _ => 0.0,
        };

        self.finish(
            vertex_count,
            density,
            continuity,
            geometric_quality,
            noise_level,
            feature_preservation,
            surface_completeness,
        )
    }

    /// Assess and enforce the gate, returning the metrics on success and
    /// `QualityBelowThreshold` carrying them on failure
    pub fn check(&self, mesh: &TriangleMesh) -> Result<QualityMetrics> {
        let metrics = self.assess(mesh);
        if metrics.is_acceptable {
            Ok(metrics)
        } else {
            Err(Error::QualityBelowThreshold(metrics))
        }
    }

    fn score_vertex(
        &self,
        vertex: &Point3f,
        normal: &Vector3f,
        vertices: &[Point3f],
        index: &Octree,
    ) -> VertexScores {
        let neighbors = index.find_neighbors(vertex, self.config.neighbor_radius);
        if neighbors.is_empty() {
            return VertexScores {
                continuity: 0.0,
                avg_neighbor_distance: None,
                geometry: None,
                connected: false,
            };
        }
        let avg_distance =
            neighbors.iter().map(|&(_, d)| d).sum::<f32>() / neighbors.len() as f32;
        let continuity = 1.0 - (avg_distance / self.config.max_hole_size).min(1.0);
        let connected = neighbors.len() >= 3;
        let geometry = if connected {
            fan_geometry(vertex, normal, vertices, &neighbors)
        } else {
            None
        };

        VertexScores {
            continuity,
            avg_neighbor_distance: Some(avg_distance),
            geometry,
            connected,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        vertex_count: usize,
        density: f32,
        continuity: f32,
        geometric: f32,
        noise: f32,
        feature_preservation: f32,
        completeness: f32,
    ) -> QualityMetrics {
        let overall = QualityMetrics::combine(density, continuity, geometric);
        QualityMetrics {
            point_density: density,
            surface_completeness: completeness,
            noise_level: noise,
            feature_preservation,
            surface_continuity: continuity,
            geometric_quality: geometric,
            overall_quality: overall,
            is_acceptable: overall >= self.config.acceptance_threshold
                && vertex_count >= self.config.min_vertex_count,
        }
    }
}

/// Dispersion of the per-vertex mean neighbor spacing, as a 0..1 noise proxy
fn noise_from_spacing(scores: &[VertexScores]) -> f32 {
    let spacings: Vec<f32> = scores
        .iter()
        .filter_map(|s| s.avg_neighbor_distance)
        .collect();
    if spacings.len() < 2 {
        return 1.0;
    }
    let mean = spacings.iter().sum::<f32>() / spacings.len() as f32;
    if mean <= f32::EPSILON {
        return 1.0;
    }
    let variance =
        spacings.iter().map(|&d| (d - mean).powi(2)).sum::<f32>() / spacings.len() as f32;
    (variance.sqrt() / mean).min(1.0)
}

/// Local planarity and stored-normal alignment from an angle-ordered
/// neighbor fan
///
/// Neighbor order affects the fan's cross-product accumulation, so offsets
/// are canonicalized by angle around the vertex before the normal is
/// accumulated; this makes the score independent of index iteration order.
fn fan_geometry(
    vertex: &Point3f,
    stored_normal: &Vector3f,
    vertices: &[Point3f],
    neighbors: &[(usize, f32)],
) -> Option<(f32, f32)> {
    let offsets: Vec<Vector3f> = neighbors
        .iter()
        .map(|&(i, _)| vertices[i] - vertex)
        .collect();

    let axis = provisional_axis(&offsets)?;

    // Tangent frame around the provisional axis.
    let mut u = offsets
        .iter()
        .map(|o| o - axis * o.dot(&axis))
        .find(|t| t.magnitude() > 1e-9)?;
    u = u.normalize();
    let w = axis.cross(&u);

    let mut ordered = offsets;
    ordered.sort_by(|a, b| {
        let angle_a = a.dot(&w).atan2(a.dot(&u));
        let angle_b = b.dot(&w).atan2(b.dot(&u));
        angle_a
            .partial_cmp(&angle_b)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Successive cross products around the ordered fan.
    let mut accumulated = Vector3f::zeros();
    for i in 0..ordered.len() {
        accumulated += ordered[i].cross(&ordered[(i + 1) % ordered.len()]);
    }
    if accumulated.magnitude() < 1e-12 {
        return None;
    }
    let local_normal = accumulated.normalize();

    // Mean out-of-plane component of the neighbor directions; flatter
    // neighborhoods score closer to 1.
    let deviation = ordered
        .iter()
        .filter(|o| o.magnitude() > 1e-9)
        .map(|o| o.normalize().dot(&local_normal).abs())
        .sum::<f32>()
        / ordered.len() as f32;
    let planarity = 1.0 - deviation.min(1.0);
    let alignment = stored_normal.dot(&local_normal).abs().min(1.0);
    Some((planarity, alignment))
}

/// First usable rotation axis for the fan ordering: the accumulated cross
/// product of consecutive offsets, falling back to any non-degenerate pair
fn provisional_axis(offsets: &[Vector3f]) -> Option<Vector3f> {
    let mut axis = Vector3f::zeros();
    for pair in offsets.windows(2) {
        axis += pair[0].cross(&pair[1]);
    }
    if axis.magnitude() > 1e-9 {
        return Some(axis.normalize());
    }
    for a in offsets {
        for b in offsets {
            let cross = a.cross(b);
            if cross.magnitude() > 1e-9 {
                return Some(cross.normalize());
            }
        }
    }
    None
}
