//! Post-reconstruction mesh cleanup
//!
//! Removes stray vertices the solver hallucinated away from the surface,
//! collapses exact duplicates and applies a light positional relaxation.
//! Each pass consumes a mesh and produces a new one.

use rayon::prelude::*;
use scanmesh_algorithms::{Octree, OctreeConfig};
use scanmesh_core::{Error, NeighborSearch, Point3f, Result, TriangleMesh};
use std::collections::HashMap;

/// Number of nearest neighbors considered per vertex by outlier removal
const OUTLIER_NEIGHBOR_COUNT: usize = 20;

/// Cleanup parameters
#[derive(Debug, Clone, Copy)]
pub struct OptimizerConfig {
    /// Sigma multiplier for vertex outlier removal. Deliberately looser than
    /// the preprocessor's 2-sigma point cutoff; the two are tuned
    /// independently against the quality gate and must not be unified.
    pub outlier_std_multiplier: f32,
    /// Radius of the positional relaxation neighborhood
    pub min_point_distance: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            outlier_std_multiplier: 3.0,
            min_point_distance: 0.05,
        }
    }
}

impl OptimizerConfig {
    fn validate(&self) -> Result<()> {
        if !(self.outlier_std_multiplier > 0.0 && self.outlier_std_multiplier.is_finite()) {
            return Err(Error::InvalidParameter(
                "outlier_std_multiplier must be positive and finite".to_string(),
            ));
        }
        if !(self.min_point_distance > 0.0 && self.min_point_distance.is_finite()) {
            return Err(Error::InvalidParameter(
                "min_point_distance must be positive and finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Run the full cleanup chain: outlier removal, exact-duplicate removal,
/// positional relaxation
pub fn optimize_mesh(mesh: &TriangleMesh, config: &OptimizerConfig) -> Result<TriangleMesh> {
    config.validate()?;
    mesh.validate()?;
    if mesh.vertices.is_empty() {
        return Ok(mesh.clone());
    }
    let mesh = remove_outlier_vertices(mesh, config.outlier_std_multiplier)?;
    let mesh = remove_duplicate_vertices(&mesh)?;
    relax_positions(&mesh, config.min_point_distance)
}

/// Drop vertices whose mean nearest-neighbor distance exceeds
/// `mean + std_multiplier * stddev` over the whole mesh
pub fn remove_outlier_vertices(
    mesh: &TriangleMesh,
    std_multiplier: f32,
) -> Result<TriangleMesh> {
    if mesh.vertices.len() < 2 {
        return Ok(mesh.clone());
    }
    let index = Octree::build(&mesh.vertices, OctreeConfig::default())?;
    let k = OUTLIER_NEIGHBOR_COUNT.min(mesh.vertices.len() - 1);
    let mean_distances: Vec<f32> = mesh
        .vertices
        .par_iter()
        .map(|vertex| {
            let neighbors = index.find_k_nearest(vertex, k);
            if neighbors.is_empty() {
                return 0.0;
            }
            neighbors.iter().map(|&(_, d)| d).sum::<f32>() / neighbors.len() as f32
        })
        .collect();

    let mean = mean_distances.iter().sum::<f32>() / mean_distances.len() as f32;
    let variance = mean_distances
        .iter()
        .map(|&d| (d - mean).powi(2))
        .sum::<f32>()
        / mean_distances.len() as f32;
    let threshold = mean + std_multiplier * variance.sqrt();

    let keep: Vec<bool> = mean_distances.iter().map(|&d| d <= threshold).collect();
    Ok(rebuild_mesh(mesh, &keep))
}

/// Collapse vertices with bit-exact equal coordinates
///
/// Equality is on the raw f32 bit patterns; there is intentionally no
/// epsilon tolerance here, near-duplicates are the relaxation pass's job.
pub fn remove_duplicate_vertices(mesh: &TriangleMesh) -> Result<TriangleMesh> {
    let mut first_occurrence: HashMap<[u32; 3], usize> = HashMap::new();
    let mut remap = vec![0usize; mesh.vertices.len()];
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    let mut confidence = Vec::new();

    for (i, vertex) in mesh.vertices.iter().enumerate() {
        let key = [
            vertex.x.to_bits(),
            vertex.y.to_bits(),
            vertex.z.to_bits(),
        ];
        match first_occurrence.get(&key) {
            Some(&kept) => remap[i] = kept,
            None => {
                let kept = vertices.len();
                first_occurrence.insert(key, kept);
                vertices.push(*vertex);
                normals.push(mesh.normals[i]);
                confidence.push(mesh.confidence[i]);
                remap[i] = kept;
            }
        }
    }

    let triangles = remap_triangles(&mesh.triangles, |i| Some(remap[i]));
    Ok(TriangleMesh {
        vertices,
        normals,
        triangles,
        confidence,
        metadata: mesh.metadata.clone(),
    })
}

/// Displace every vertex to the average of itself and all neighbors within
/// `min_point_distance`
///
/// This is the light positional relaxation the pipeline runs after duplicate
/// removal; it moves positions only and leaves topology alone.
pub fn relax_positions(mesh: &TriangleMesh, min_point_distance: f32) -> Result<TriangleMesh> {
    if mesh.vertices.len() < 2 {
        return Ok(mesh.clone());
    }
    let index = Octree::build(&mesh.vertices, OctreeConfig::default())?;
    let vertices: Vec<Point3f> = mesh
        .vertices
        .par_iter()
        .map(|vertex| {
            let neighbors = index.find_radius_neighbors(vertex, min_point_distance);
            if neighbors.is_empty() {
                return *vertex;
            }
            let mut sum = vertex.coords;
            for (neighbor, _) in &neighbors {
                sum += mesh.vertices[*neighbor].coords;
            }
            Point3f::from(sum / (neighbors.len() + 1) as f32)
        })
        .collect();

    let mut relaxed = TriangleMesh {
        vertices,
        normals: mesh.normals.clone(),
        triangles: mesh.triangles.clone(),
        confidence: mesh.confidence.clone(),
        metadata: mesh.metadata.clone(),
    };
    relaxed.recompute_vertex_normals();
    Ok(relaxed)
}

/// Filter vertices by a keep mask and remap triangle indices, dropping
/// triangles that lost a vertex or became degenerate
fn rebuild_mesh(mesh: &TriangleMesh, keep: &[bool]) -> TriangleMesh {
    let mut remap = vec![None; mesh.vertices.len()];
    let mut vertices = Vec::new();
    let mut normals = Vec::new();
    let mut confidence = Vec::new();
    for (i, &kept) in keep.iter().enumerate() {
        if kept {
            remap[i] = Some(vertices.len());
            vertices.push(mesh.vertices[i]);
            normals.push(mesh.normals[i]);
            confidence.push(mesh.confidence[i]);
        }
    }
    let triangles = remap_triangles(&mesh.triangles, |i| remap[i]);
    TriangleMesh {
        vertices,
        normals,
        triangles,
        confidence,
        metadata: mesh.metadata.clone(),
    }
}

fn remap_triangles<F>(triangles: &[[usize; 3]], remap: F) -> Vec<[usize; 3]>
where
    F: Fn(usize) -> Option<usize>,
{
    triangles
        .iter()
        .filter_map(|&[a, b, c]| {
            let (a, b, c) = (remap(a)?, remap(b)?, remap(c)?);
            // Degenerate after remapping.
            if a == b || b == c || a == c {
                return None;
            }
            Some([a, b, c])
        })
        .collect()
}
