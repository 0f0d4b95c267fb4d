//! Point types and related functionality

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A raw depth-sensor sample with an optional per-point confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanPoint {
    pub position: Point3f,
    pub confidence: Option<f32>,
}

impl ScanPoint {
    /// Create a sample without confidence information
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            position: Point3f::new(x, y, z),
            confidence: None,
        }
    }

    /// Create a sample with a confidence value
    pub fn with_confidence(x: f32, y: f32, z: f32, confidence: f32) -> Self {
        Self {
            position: Point3f::new(x, y, z),
            confidence: Some(confidence),
        }
    }

    /// Confidence value, treating missing confidence as full confidence
    pub fn confidence_or_default(&self) -> f32 {
        self.confidence.unwrap_or(1.0)
    }

    /// Check that all coordinates are finite
    pub fn is_finite(&self) -> bool {
        self.position.coords.iter().all(|c| c.is_finite())
    }
}

impl From<Point3f> for ScanPoint {
    fn from(position: Point3f) -> Self {
        Self {
            position,
            confidence: None,
        }
    }
}

impl From<ScanPoint> for Point3f {
    fn from(point: ScanPoint) -> Self {
        point.position
    }
}

/// A point with an estimated surface normal, the input to surface reconstruction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientedPoint {
    pub position: Point3f,
    pub normal: Vector3f,
    pub confidence: f32,
}

impl OrientedPoint {
    pub fn new(position: Point3f, normal: Vector3f, confidence: f32) -> Self {
        Self {
            position,
            normal,
            confidence,
        }
    }
}

impl Default for OrientedPoint {
    fn default() -> Self {
        Self {
            position: Point3f::origin(),
            normal: Vector3f::new(0.0, 0.0, 1.0),
            confidence: 1.0,
        }
    }
}

impl From<OrientedPoint> for Point3f {
    fn from(point: OrientedPoint) -> Self {
        point.position
    }
}
