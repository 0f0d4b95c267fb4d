//! Voxel-occupancy scan coverage tracking
//!
//! An independent completeness estimate over raw sensor samples, consumed by
//! the guidance layer. It never looks at reconstructed mesh geometry.

use scanmesh_core::{BoundingBox, Error, Result, ScanCloud};
use std::collections::HashSet;

/// Configuration for [`CoverageTracker`]
#[derive(Debug, Clone, Copy)]
pub struct CoverageConfig {
    /// Edge length of the occupancy voxels
    pub voxel_size: f32,
    /// Region the scan is expected to cover; samples outside are ignored
    pub target_bounds: BoundingBox,
    /// Completeness ratio at which the scan counts as complete
    pub completeness_threshold: f32,
    /// Expected number of occupied voxels for a complete scan; when absent
    /// it is derived from the target region's surface area in voxel units
    pub expected_voxels: Option<usize>,
}

impl CoverageConfig {
    pub fn new(voxel_size: f32, target_bounds: BoundingBox) -> Self {
        Self {
            voxel_size,
            target_bounds,
            completeness_threshold: 0.7,
            expected_voxels: None,
        }
    }
}

/// Voxel-occupancy estimate of scan completeness
///
/// Occupied voxels accumulate across [`CoverageTracker::update_coverage`]
/// calls until [`CoverageTracker::reset`].
#[derive(Debug, Clone)]
pub struct CoverageTracker {
    config: CoverageConfig,
    occupied: HashSet<(i64, i64, i64)>,
}

impl CoverageTracker {
    pub fn new(config: CoverageConfig) -> Result<Self> {
        if !(config.voxel_size > 0.0 && config.voxel_size.is_finite()) {
            return Err(Error::InvalidParameter(
                "voxel_size must be positive and finite".to_string(),
            ));
        }
        if !(config.completeness_threshold > 0.0 && config.completeness_threshold <= 1.0) {
            return Err(Error::InvalidParameter(
                "completeness_threshold must be in (0, 1]".to_string(),
            ));
        }
        Ok(Self {
            config,
            occupied: HashSet::new(),
        })
    }

    /// Fold a batch of samples into the occupancy grid and return the
    /// updated completeness ratio in [0, 1]
    pub fn update_coverage(&mut self, cloud: &ScanCloud) -> f32 {
        let voxel = self.config.voxel_size;
        for point in cloud {
            if !self.config.target_bounds.contains(&point.position) {
                continue;
            }
            self.occupied.insert((
                (point.position.x / voxel).floor() as i64,
                (point.position.y / voxel).floor() as i64,
                (point.position.z / voxel).floor() as i64,
            ));
        }
        self.completeness()
    }

    /// Current completeness ratio in [0, 1]
    pub fn completeness(&self) -> f32 {
        let expected = self.expected_voxels().max(1);
        (self.occupied.len() as f32 / expected as f32).min(1.0)
    }

    /// Whether the completeness ratio has reached the configured threshold
    pub fn is_complete(&self) -> bool {
        self.completeness() >= self.config.completeness_threshold
    }

    /// Drop all accumulated occupancy
    pub fn reset(&mut self) {
        self.occupied.clear();
    }

    /// Number of distinct occupied voxels
    pub fn occupied_voxels(&self) -> usize {
        self.occupied.len()
    }

    fn expected_voxels(&self) -> usize {
        match self.config.expected_voxels {
            Some(expected) => expected,
            None => {
                // A scanned surface is a sheet through the target volume, so
                // the expectation scales with area rather than volume. Half
                // the box boundary approximates a convex surface inscribed
                // in the target region (a sphere covers ~52% of its box).
                let area = self.config.target_bounds.surface_area() / 2.0;
                (area / (self.config.voxel_size * self.config.voxel_size)).ceil() as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanmesh_core::{Point3f, ScanPoint};

    fn unit_bounds() -> BoundingBox {
        BoundingBox::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_coverage_grows_and_saturates() {
        let config = CoverageConfig {
            expected_voxels: Some(4),
            ..CoverageConfig::new(0.5, unit_bounds())
        };
        let mut tracker = CoverageTracker::new(config).unwrap();
        assert_eq!(tracker.completeness(), 0.0);
        assert!(!tracker.is_complete());

        let batch = ScanCloud::from_points(vec![
            ScanPoint::new(0.1, 0.1, 0.1),
            ScanPoint::new(0.9, 0.1, 0.1),
        ]);
        let ratio = tracker.update_coverage(&batch);
        assert!((ratio - 0.5).abs() < 1e-6);

        // Re-scanning the same voxels does not inflate coverage.
        let ratio = tracker.update_coverage(&batch);
        assert!((ratio - 0.5).abs() < 1e-6);

        let more = ScanCloud::from_points(vec![
            ScanPoint::new(0.1, 0.9, 0.1),
            ScanPoint::new(0.9, 0.9, 0.1),
        ]);
        let ratio = tracker.update_coverage(&more);
        assert!((ratio - 1.0).abs() < 1e-6);
        assert!(tracker.is_complete());
    }

    #[test]
    fn test_points_outside_target_are_ignored() {
        let config = CoverageConfig {
            expected_voxels: Some(10),
            ..CoverageConfig::new(0.5, unit_bounds())
        };
        let mut tracker = CoverageTracker::new(config).unwrap();
        let outside = ScanCloud::from_points(vec![ScanPoint::new(5.0, 5.0, 5.0)]);
        assert_eq!(tracker.update_coverage(&outside), 0.0);
        assert_eq!(tracker.occupied_voxels(), 0);
    }

    #[test]
    fn test_reset_clears_occupancy() {
        let mut tracker =
            CoverageTracker::new(CoverageConfig::new(0.5, unit_bounds())).unwrap();
        tracker.update_coverage(&ScanCloud::from_points(vec![ScanPoint::new(0.1, 0.1, 0.1)]));
        assert!(tracker.occupied_voxels() > 0);
        tracker.reset();
        assert_eq!(tracker.occupied_voxels(), 0);
        assert_eq!(tracker.completeness(), 0.0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CoverageConfig::new(0.0, unit_bounds());
        assert!(CoverageTracker::new(config).is_err());
        config.voxel_size = 0.1;
        config.completeness_threshold = 1.5;
        assert!(CoverageTracker::new(config).is_err());
    }
}
