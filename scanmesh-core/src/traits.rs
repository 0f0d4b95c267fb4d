//! Core traits for scanmesh

use crate::{bounds::BoundingBox, mesh::TriangleMesh, point::Point3f, point_cloud::PointCloud};

/// Trait for neighbor search over an indexed point set
///
/// Implemented by the spatial index; pipeline stages depend on this trait so
/// the index structure stays swappable.
pub trait NeighborSearch {
    /// Find all neighbors strictly within `0 < distance <= radius` of the
    /// query point, as `(point index, distance)` pairs
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;

    /// Find the k nearest neighbors to a query point, excluding any point at
    /// distance zero, ordered nearest first
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;
}

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Axis-aligned bounds, `None` when the object holds no geometry
    fn bounds(&self) -> Option<BoundingBox>;
}

impl<T> Bounded for PointCloud<T>
where
    T: Clone + Copy,
    Point3f: From<T>,
{
    fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.points.iter().map(|p| Point3f::from(*p)))
    }
}

impl Bounded for TriangleMesh {
    fn bounds(&self) -> Option<BoundingBox> {
        self.bounding_box()
    }
}
