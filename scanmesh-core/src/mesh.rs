//! Triangle mesh data structures

use crate::bounds::BoundingBox;
use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// A single triangle with a unit face normal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub vertices: [Point3f; 3],
    pub normal: Vector3f,
}

impl Triangle {
    /// Build a triangle, deriving the face normal from the winding order
    ///
    /// Returns `None` for degenerate (zero-area) triangles.
    pub fn from_vertices(a: Point3f, b: Point3f, c: Point3f) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        if normal.magnitude() < f32::EPSILON {
            return None;
        }
        Some(Self {
            vertices: [a, b, c],
            normal: normal.normalize(),
        })
    }

    pub fn area(&self) -> f32 {
        let [a, b, c] = self.vertices;
        (b - a).cross(&(c - a)).magnitude() / 2.0
    }
}

/// Opaque provenance carried alongside a mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshMetadata {
    /// Identifier of the producing stage or device
    pub source: String,
    /// Capture timestamp in milliseconds, if known
    pub timestamp_ms: Option<u64>,
}

/// A triangle mesh with per-vertex normals and confidence
///
/// Invariant: `vertices`, `normals` and `confidence` have equal length and
/// every triangle index is in range. Meshes are produced once by the
/// reconstructor and treated as immutable value data; cleanup stages consume
/// a mesh and return a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub normals: Vec<Vector3f>,
    pub triangles: Vec<[usize; 3]>,
    pub confidence: Vec<f32>,
    pub metadata: MeshMetadata,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            normals: Vec::new(),
            triangles: Vec::new(),
            confidence: Vec::new(),
            metadata: MeshMetadata::default(),
        }
    }

    /// Build a mesh from vertices and triangles, deriving vertex normals from
    /// incident faces and assigning uniform confidence
    pub fn from_vertices_and_triangles(
        vertices: Vec<Point3f>,
        triangles: Vec<[usize; 3]>,
    ) -> Self {
        let normals = compute_vertex_normals(&vertices, &triangles);
        let confidence = vec![1.0; vertices.len()];
        Self {
            vertices,
            normals,
            triangles,
            confidence,
            metadata: MeshMetadata::default(),
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.triangles.is_empty()
    }

    /// Materialize triangle `index` with its face normal
    ///
    /// Returns `None` when the index is out of range or the triangle is
    /// degenerate.
    pub fn triangle(&self, index: usize) -> Option<Triangle> {
        let [i, j, k] = *self.triangles.get(index)?;
        Triangle::from_vertices(self.vertices[i], self.vertices[j], self.vertices[k])
    }

    /// Unit normal of triangle `index`, `None` if degenerate or out of range
    pub fn face_normal(&self, index: usize) -> Option<Vector3f> {
        self.triangle(index).map(|t| t.normal)
    }

    /// Sum of all triangle areas
    pub fn surface_area(&self) -> f32 {
        (0..self.triangles.len())
            .filter_map(|i| self.triangle(i))
            .map(|t| t.area())
            .sum()
    }

    /// Bounding box of the vertices, `None` for an empty mesh
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.vertices.iter().copied())
    }

    /// Recompute per-vertex normals from incident face normals
    pub fn recompute_vertex_normals(&mut self) {
        self.normals = compute_vertex_normals(&self.vertices, &self.triangles);
    }

    /// Check the structural invariant
    ///
    /// Attribute arrays must have equal length, every index must be in range
    /// and every coordinate finite.
    pub fn validate(&self) -> Result<()> {
        if self.normals.len() != self.vertices.len() || self.confidence.len() != self.vertices.len()
        {
            return Err(Error::InvalidGeometry(format!(
                "attribute length mismatch: {} vertices, {} normals, {} confidence values",
                self.vertices.len(),
                self.normals.len(),
                self.confidence.len()
            )));
        }
        for (i, v) in self.vertices.iter().enumerate() {
            if !v.coords.iter().all(|c| c.is_finite()) {
                return Err(Error::InvalidGeometry(format!(
                    "non-finite coordinate at vertex {i}"
                )));
            }
        }
        for (i, tri) in self.triangles.iter().enumerate() {
            if tri.iter().any(|&idx| idx >= self.vertices.len()) {
                return Err(Error::InvalidGeometry(format!(
                    "triangle {i} references vertex out of range"
                )));
            }
        }
        Ok(())
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-vertex normals as the normalized sum of incident face normals,
/// weighted by face area
///
/// Vertices without incident faces fall back to +Z.
pub fn compute_vertex_normals(vertices: &[Point3f], triangles: &[[usize; 3]]) -> Vec<Vector3f> {
    let mut sums = vec![Vector3f::zeros(); vertices.len()];
    for tri in triangles {
        let [i, j, k] = *tri;
        // Area-weighted: the unnormalized cross product is twice the face area.
        let normal = (vertices[j] - vertices[i]).cross(&(vertices[k] - vertices[i]));
        sums[i] += normal;
        sums[j] += normal;
        sums[k] += normal;
    }
    sums.into_iter()
        .map(|n| {
            if n.magnitude() > f32::EPSILON {
                n.normalize()
            } else {
                Vector3f::new(0.0, 0.0, 1.0)
            }
        })
        .collect()
}
