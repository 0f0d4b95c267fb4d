//! RANSAC normal estimation
//!
//! Per-point plane fitting over octree neighborhoods. This is the dominant
//! cost center for large point clouds; the per-point loop has no shared
//! mutable state beyond the read-only index and runs in parallel.

use crate::octree::Octree;
use rand::prelude::*;
use rayon::prelude::*;
use scanmesh_core::{
    Error, NeighborSearch, OrientedCloud, OrientedPoint, Point3f, Result, ScanCloud, Vector3f,
};
use std::collections::HashSet;

/// Normal assigned to points whose neighborhood is too sparse to fit a plane
pub fn fallback_normal() -> Vector3f {
    Vector3f::new(0.0, 0.0, 1.0)
}

/// Confidence assigned alongside [`fallback_normal`]; exactly zero so
/// downstream consumers can detect undefined normals instead of trusting a
/// plausible-looking default
pub const FALLBACK_CONFIDENCE: f32 = 0.0;

/// Parameters for RANSAC plane fitting
#[derive(Debug, Clone, Copy)]
pub struct NormalEstimationConfig {
    /// Fixed neighborhood radius around each point
    pub search_radius: f32,
    /// Maximum RANSAC iterations per point
    pub max_iterations: usize,
    /// Maximum perpendicular distance for a neighbor to count as an inlier
    pub ransac_threshold: f32,
    /// Inlier ratio at which the loop stops early
    pub min_inlier_ratio: f32,
    /// Sensor position normals are oriented toward; when absent, normals are
    /// oriented away from the cloud centroid instead
    pub viewpoint: Option<Point3f>,
}

impl Default for NormalEstimationConfig {
    fn default() -> Self {
        Self {
            search_radius: 0.1,
            max_iterations: 50,
            ransac_threshold: 0.01,
            min_inlier_ratio: 0.8,
            viewpoint: None,
        }
    }
}

impl NormalEstimationConfig {
    fn validate(&self) -> Result<()> {
        if !(self.search_radius > 0.0 && self.search_radius.is_finite()) {
            return Err(Error::InvalidParameter(
                "search_radius must be positive and finite".to_string(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter(
                "max_iterations must be greater than 0".to_string(),
            ));
        }
        if !(self.ransac_threshold > 0.0 && self.ransac_threshold.is_finite()) {
            return Err(Error::InvalidParameter(
                "ransac_threshold must be positive and finite".to_string(),
            ));
        }
        if !(self.min_inlier_ratio > 0.0 && self.min_inlier_ratio <= 1.0) {
            return Err(Error::InvalidParameter(
                "min_inlier_ratio must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Estimate a surface normal for every point in the cloud
///
/// `index` must have been built over `cloud`'s positions in order, so that
/// neighbor indices map back into the cloud. Points with fewer than 3
/// neighbors inside the search radius receive [`fallback_normal`] with
/// [`FALLBACK_CONFIDENCE`]; all other points carry the best plane's inlier
/// ratio (scaled by the input confidence) as their confidence.
pub fn estimate_normals(
    cloud: &ScanCloud,
    index: &Octree,
    config: &NormalEstimationConfig,
) -> Result<OrientedCloud> {
    config.validate()?;
    if index.len() != cloud.len() {
        return Err(Error::InvalidParameter(format!(
            "index covers {} points but the cloud holds {}",
            index.len(),
            cloud.len()
        )));
    }
    if cloud.is_empty() {
        return Ok(OrientedCloud::new());
    }

    let centroid = cloud_centroid(cloud);
    let points: Vec<OrientedPoint> = cloud
        .points
        .par_iter()
        .map(|point| {
            let neighbors = index.find_radius_neighbors(&point.position, config.search_radius);
            match fit_plane_normal(cloud, &neighbors, config) {
                Some((normal, inlier_ratio)) => {
                    let oriented = orient(normal, &point.position, config.viewpoint, &centroid);
                    OrientedPoint::new(
                        point.position,
                        oriented,
                        inlier_ratio * point.confidence_or_default(),
                    )
                }
                None => {
                    OrientedPoint::new(point.position, fallback_normal(), FALLBACK_CONFIDENCE)
                }
            }
        })
        .collect();
    Ok(OrientedCloud::from_points(points))
}

/// RANSAC over one neighborhood; `None` when the neighborhood is degenerate
fn fit_plane_normal(
    cloud: &ScanCloud,
    neighbors: &[(usize, f32)],
    config: &NormalEstimationConfig,
) -> Option<(Vector3f, f32)> {
    if neighbors.len() < 3 {
        return None;
    }
    let positions: Vec<Point3f> = neighbors.iter().map(|&(i, _)| cloud[i].position).collect();

    let mut rng = thread_rng();
    let mut best_normal: Option<Vector3f> = None;
    let mut best_inliers = 0usize;

    for _ in 0..config.max_iterations {
        let mut picks = HashSet::new();
        while picks.len() < 3 {
            picks.insert(rng.gen_range(0..positions.len()));
        }
        let picks: Vec<usize> = picks.into_iter().collect();
        let anchor = positions[picks[0]];
        let candidate = (positions[picks[1]] - anchor).cross(&(positions[picks[2]] - anchor));
        if candidate.magnitude() < 1e-8 {
            continue;
        }
        let candidate = candidate.normalize();

        let inliers = positions
            .iter()
            .filter(|p| ((*p - anchor).dot(&candidate)).abs() < config.ransac_threshold)
            .count();
        if inliers > best_inliers {
            best_inliers = inliers;
            best_normal = Some(candidate);
        }
        if best_inliers as f32 / positions.len() as f32 > config.min_inlier_ratio {
            break;
        }
    }

    best_normal.map(|normal| (normal, best_inliers as f32 / positions.len() as f32))
}

/// Flip a normal to the consistent side: toward the viewpoint when one is
/// configured, away from the cloud centroid otherwise
fn orient(
    normal: Vector3f,
    position: &Point3f,
    viewpoint: Option<Point3f>,
    centroid: &Point3f,
) -> Vector3f {
    let reference = match viewpoint {
        Some(vp) => vp - position,
        None => position - centroid,
    };
    if normal.dot(&reference) < 0.0 {
        -normal
    } else {
        normal
    }
}

fn cloud_centroid(cloud: &ScanCloud) -> Point3f {
    let sum = cloud
        .iter()
        .fold(nalgebra::Vector3::<f64>::zeros(), |acc, p| {
            acc + p.position.coords.cast::<f64>()
        });
    Point3f::from((sum / cloud.len() as f64).cast::<f32>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::OctreeConfig;
    use rand::prelude::*;
    use scanmesh_core::ScanPoint;

    fn build_index(cloud: &ScanCloud) -> Octree {
        Octree::build(&cloud.positions(), OctreeConfig::default()).unwrap()
    }

    #[test]
    fn test_planar_patch_normals_point_up() {
        // A regular grid keeps every point, corners included, above the
        // 3-neighbor floor inside the default search radius.
        let mut cloud = ScanCloud::new();
        for i in 0..22 {
            for j in 0..22 {
                cloud.push(ScanPoint::new(i as f32 * 0.045, j as f32 * 0.045, 0.0));
            }
        }
        let index = build_index(&cloud);
        let config = NormalEstimationConfig {
            viewpoint: Some(Point3f::new(0.5, 0.5, 10.0)),
            ..Default::default()
        };

        let oriented = estimate_normals(&cloud, &index, &config).unwrap();
        for point in &oriented {
            assert!(
                point.normal.z > 0.99,
                "expected +Z normal, got {:?}",
                point.normal
            );
            assert!(point.confidence > 0.5);
        }
    }

    #[test]
    fn test_sparse_neighborhood_gets_fallback() {
        // Two far-apart points have no neighbors inside the search radius.
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(0.0, 0.0, 0.0),
            ScanPoint::new(10.0, 0.0, 0.0),
        ]);
        let index = build_index(&cloud);
        let oriented =
            estimate_normals(&cloud, &index, &NormalEstimationConfig::default()).unwrap();

        for point in &oriented {
            assert_eq!(point.normal, fallback_normal());
            assert_eq!(point.confidence, FALLBACK_CONFIDENCE);
        }
    }

    #[test]
    fn test_sphere_normals_point_outward() {
        let mut rng = StdRng::seed_from_u64(9);
        let cloud: ScanCloud = (0..2000)
            .map(|_| {
                let v = Vector3f::new(
                    rng.gen::<f32>() - 0.5,
                    rng.gen::<f32>() - 0.5,
                    rng.gen::<f32>() - 0.5,
                )
                .normalize();
                ScanPoint::new(v.x, v.y, v.z)
            })
            .collect();
        let index = build_index(&cloud);
        let config = NormalEstimationConfig {
            search_radius: 0.15,
            ..Default::default()
        };
        let oriented = estimate_normals(&cloud, &index, &config).unwrap();

        let mut outward = 0usize;
        for point in &oriented {
            if point.confidence > 0.0 && point.normal.dot(&point.position.coords) > 0.0 {
                outward += 1;
            }
        }
        // Without a viewpoint, orientation falls back to away-from-centroid,
        // which is outward for a sphere around the origin.
        assert!(outward as f32 > oriented.len() as f32 * 0.9);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let cloud = ScanCloud::from_points(vec![ScanPoint::new(0.0, 0.0, 0.0)]);
        let index = build_index(&cloud);
        let bad = NormalEstimationConfig {
            search_radius: -1.0,
            ..Default::default()
        };
        assert!(estimate_normals(&cloud, &index, &bad).is_err());
    }

    #[test]
    fn test_index_size_mismatch_rejected() {
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(0.0, 0.0, 0.0),
            ScanPoint::new(1.0, 0.0, 0.0),
        ]);
        let smaller = Octree::build(&[Point3f::new(0.0, 0.0, 0.0)], OctreeConfig::default())
            .unwrap();
        let result = estimate_normals(&cloud, &smaller, &NormalEstimationConfig::default());
        assert!(result.is_err());
    }
}
