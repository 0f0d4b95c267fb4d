//! Axis-aligned bounding boxes

use crate::point::Point3f;
use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in min/max corner representation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3f,
    pub max: Point3f,
}

impl BoundingBox {
    /// Create a bounding box from corner points
    pub fn new(min: Point3f, max: Point3f) -> Self {
        Self { min, max }
    }

    /// Compute the bounding box of a set of points, `None` if empty
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point3f>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut min = first;
        let mut max = first;
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some(Self { min, max })
    }

    /// Center point of the box
    pub fn center(&self) -> Point3f {
        Point3f::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Edge lengths along each axis
    pub fn size(&self) -> [f32; 3] {
        [
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        ]
    }

    /// Enclosed volume
    pub fn volume(&self) -> f32 {
        let [sx, sy, sz] = self.size();
        sx * sy * sz
    }

    /// Area of the X/Y footprint of the box
    pub fn footprint_area(&self) -> f32 {
        let [sx, sy, _] = self.size();
        sx * sy
    }

    /// Total surface area of the box
    pub fn surface_area(&self) -> f32 {
        let [sx, sy, sz] = self.size();
        2.0 * (sx * sy + sy * sz + sx * sz)
    }

    /// Grow the box by `margin` on every side
    pub fn padded(&self, margin: f32) -> Self {
        Self {
            min: Point3f::new(self.min.x - margin, self.min.y - margin, self.min.z - margin),
            max: Point3f::new(self.max.x + margin, self.max.y + margin, self.max.z + margin),
        }
    }

    /// Inclusive containment test
    pub fn contains(&self, point: &Point3f) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }

    /// Test whether a sphere overlaps the box
    pub fn intersects_sphere(&self, center: &Point3f, radius: f32) -> bool {
        let mut dist_sq = 0.0f32;
        for axis in 0..3 {
            let c = center.coords[axis];
            let lo = self.min.coords[axis];
            let hi = self.max.coords[axis];
            if c < lo {
                dist_sq += (lo - c) * (lo - c);
            } else if c > hi {
                dist_sq += (c - hi) * (c - hi);
            }
        }
        dist_sq <= radius * radius
    }

    /// One of the eight half-size boxes tiling this box
    ///
    /// Bit 0 of `index` selects the upper X half, bit 1 the upper Y half,
    /// bit 2 the upper Z half.
    pub fn octant(&self, index: usize) -> Self {
        let c = self.center();
        let (min_x, max_x) = if index & 1 == 0 {
            (self.min.x, c.x)
        } else {
            (c.x, self.max.x)
        };
        let (min_y, max_y) = if index & 2 == 0 {
            (self.min.y, c.y)
        } else {
            (c.y, self.max.y)
        };
        let (min_z, max_z) = if index & 4 == 0 {
            (self.min.z, c.z)
        } else {
            (c.z, self.max.z)
        };
        Self {
            min: Point3f::new(min_x, min_y, min_z),
            max: Point3f::new(max_x, max_y, max_z),
        }
    }

    /// Index of the octant whose half-open region contains `point`
    ///
    /// Points exactly on a splitting plane land in the upper octant, so every
    /// contained point maps to exactly one child.
    pub fn octant_index(&self, point: &Point3f) -> usize {
        let c = self.center();
        let mut index = 0;
        if point.x >= c.x {
            index |= 1;
        }
        if point.y >= c.y {
            index |= 2;
        }
        if point.z >= c.z {
            index |= 4;
        }
        index
    }
}
