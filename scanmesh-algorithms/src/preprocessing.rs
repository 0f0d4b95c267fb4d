//! Point cloud preprocessing
//!
//! Cleanup passes that run before surface reconstruction: voxel
//! downsampling, statistical outlier removal and connectivity clustering.

use crate::octree::{Octree, OctreeConfig};
use rayon::prelude::*;
use scanmesh_core::{Error, NeighborSearch, Point3f, Result, ScanCloud, ScanPoint};
use std::collections::HashMap;

/// Number of nearest neighbors considered per point by outlier removal
const OUTLIER_NEIGHBOR_COUNT: usize = 20;

/// Input size above which neighbor lookups route through the octree
/// instead of the quadratic brute-force scan
const BRUTE_FORCE_CUTOFF: usize = 2000;

/// Clusters smaller than this are discarded as disconnected debris
const MIN_CLUSTER_SIZE: usize = 3;

/// Downsample a cloud on a regular voxel grid
///
/// Points are bucketed by `floor(coord / voxel_size)` per axis and each
/// occupied voxel is replaced by the centroid of its members. Flooring (not
/// truncation) keeps buckets consistent across the origin for negative
/// coordinates. Centroid confidence is the mean of the members' confidences,
/// absent when no member carried one.
///
/// # Example
/// ```rust
/// use scanmesh_core::{ScanCloud, ScanPoint};
/// use scanmesh_algorithms::voxel_downsample;
///
/// fn main() -> scanmesh_core::Result<()> {
///     let cloud = ScanCloud::from_points(vec![
///         ScanPoint::new(0.01, 0.0, 0.0),
///         ScanPoint::new(0.03, 0.0, 0.0),
///         ScanPoint::new(0.92, 0.0, 0.0),
///     ]);
///     let filtered = voxel_downsample(&cloud, 0.1)?;
///     assert_eq!(filtered.len(), 2);
///     Ok(())
/// }
/// ```
pub fn voxel_downsample(cloud: &ScanCloud, voxel_size: f32) -> Result<ScanCloud> {
    if !(voxel_size > 0.0 && voxel_size.is_finite()) {
        return Err(Error::InvalidParameter(
            "voxel_size must be positive and finite".to_string(),
        ));
    }
    if cloud.is_empty() {
        return Ok(ScanCloud::new());
    }

    struct Bucket {
        sum: nalgebra::Vector3<f64>,
        confidence_sum: f32,
        with_confidence: usize,
        count: usize,
    }

    let mut buckets: HashMap<(i64, i64, i64), Bucket> = HashMap::new();
    for point in cloud {
        let key = (
            (point.position.x / voxel_size).floor() as i64,
            (point.position.y / voxel_size).floor() as i64,
            (point.position.z / voxel_size).floor() as i64,
        );
        let bucket = buckets.entry(key).or_insert_with(|| Bucket {
            sum: nalgebra::Vector3::zeros(),
            confidence_sum: 0.0,
            with_confidence: 0,
            count: 0,
        });
        bucket.sum += point.position.coords.cast::<f64>();
        if let Some(confidence) = point.confidence {
            bucket.confidence_sum += confidence;
            bucket.with_confidence += 1;
        }
        bucket.count += 1;
    }

    let points = buckets
        .into_values()
        .map(|bucket| {
            let centroid = (bucket.sum / bucket.count as f64).cast::<f32>();
            ScanPoint {
                position: Point3f::from(centroid),
                confidence: (bucket.with_confidence > 0)
                    .then(|| bucket.confidence_sum / bucket.with_confidence as f32),
            }
        })
        .collect();
    Ok(ScanCloud::from_points(points))
}

/// Remove statistical outliers by mean neighbor distance
///
/// For each point, the mean distance to its `min(20, n-1)` nearest neighbors
/// (excluding itself) is computed; points whose value exceeds
/// `global_mean + std_multiplier * stddev` are discarded. The reconstruction
/// pipeline runs this with a 2-sigma cutoff; the mesh optimizer applies the
/// same technique to vertices with its own 3-sigma cutoff, and the two are
/// deliberately not unified.
pub fn remove_statistical_outliers(cloud: &ScanCloud, std_multiplier: f32) -> Result<ScanCloud> {
    if !(std_multiplier > 0.0 && std_multiplier.is_finite()) {
        return Err(Error::InvalidParameter(
            "std_multiplier must be positive and finite".to_string(),
        ));
    }
    if cloud.len() < 2 {
        return Ok(cloud.clone());
    }

    let positions = cloud.positions();
    let k = OUTLIER_NEIGHBOR_COUNT.min(cloud.len() - 1);
    let mean_distances = mean_neighbor_distances(&positions, k)?;

    let global_mean = mean_distances.iter().sum::<f32>() / mean_distances.len() as f32;
    let variance = mean_distances
        .iter()
        .map(|&d| (d - global_mean).powi(2))
        .sum::<f32>()
        / mean_distances.len() as f32;
    let threshold = global_mean + std_multiplier * variance.sqrt();

    let points = cloud
        .iter()
        .zip(&mean_distances)
        .filter(|(_, &d)| d <= threshold)
        .map(|(p, _)| *p)
        .collect();
    Ok(ScanCloud::from_points(points))
}

/// Mean distance from each point to its k nearest neighbors, excluding the
/// point itself (and exact duplicates at distance zero)
fn mean_neighbor_distances(positions: &[Point3f], k: usize) -> Result<Vec<f32>> {
    if positions.len() <= BRUTE_FORCE_CUTOFF {
        return Ok(positions
            .par_iter()
            .map(|query| {
                let mut distances: Vec<f32> = positions
                    .iter()
                    .map(|p| (p - query).magnitude())
                    .filter(|&d| d > 0.0)
                    .collect();
                distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                distances.truncate(k);
                mean_of(&distances)
            })
            .collect());
    }

    let index = Octree::build(positions, OctreeConfig::default())?;
    Ok(positions
        .par_iter()
        .map(|query| {
            let neighbors = index.find_k_nearest(query, k);
            let distances: Vec<f32> = neighbors.into_iter().map(|(_, d)| d).collect();
            mean_of(&distances)
        })
        .collect())
}

fn mean_of(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Coarsen a cloud into connected-component centroids
///
/// Region growing over a fixed distance threshold: two points connect when
/// they sit within `distance_threshold` of each other. Components smaller
/// than 3 points are discarded, and each surviving component is replaced by
/// its centroid. This is a lossy coarsening step for guidance-level summaries,
/// not a general clustering utility; the output has one point per component.
pub fn cluster_points(cloud: &ScanCloud, distance_threshold: f32) -> Result<ScanCloud> {
    if !(distance_threshold > 0.0 && distance_threshold.is_finite()) {
        return Err(Error::InvalidParameter(
            "distance_threshold must be positive and finite".to_string(),
        ));
    }
    if cloud.is_empty() {
        return Ok(ScanCloud::new());
    }

    let positions = cloud.positions();
    let index = Octree::build(&positions, OctreeConfig::default())?;

    let mut visited = vec![false; positions.len()];
    let mut centroids = Vec::new();
    for seed in 0..positions.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let mut members = vec![seed];
        let mut frontier = vec![seed];
        while let Some(current) = frontier.pop() {
            for (neighbor, _) in index.find_radius_neighbors(&positions[current], distance_threshold)
            {
                if !visited[neighbor] {
                    visited[neighbor] = true;
                    members.push(neighbor);
                    frontier.push(neighbor);
                }
            }
        }
        if members.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        let mut sum = nalgebra::Vector3::<f64>::zeros();
        let mut confidence_sum = 0.0f32;
        let mut with_confidence = 0usize;
        for &member in &members {
            sum += positions[member].coords.cast::<f64>();
            if let Some(confidence) = cloud[member].confidence {
                confidence_sum += confidence;
                with_confidence += 1;
            }
        }
        let centroid = (sum / members.len() as f64).cast::<f32>();
        centroids.push(ScanPoint {
            position: Point3f::from(centroid),
            confidence: (with_confidence > 0).then(|| confidence_sum / with_confidence as f32),
        });
    }
    Ok(ScanCloud::from_points(centroids))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn uniform_cloud(n: usize, seed: u64) -> ScanCloud {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| ScanPoint::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()))
            .collect()
    }

    #[test]
    fn test_voxel_downsample_merges_buckets() {
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(0.01, 0.01, 0.01),
            ScanPoint::new(0.02, 0.02, 0.02),
            ScanPoint::new(0.51, 0.01, 0.01),
        ]);
        let filtered = voxel_downsample(&cloud, 0.1).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_voxel_downsample_floors_negative_coordinates() {
        // Truncation would merge these across the origin; flooring keeps
        // them in separate buckets.
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::new(-0.05, 0.0, 0.0),
            ScanPoint::new(0.05, 0.0, 0.0),
        ]);
        let filtered = voxel_downsample(&cloud, 0.1).unwrap();
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn test_voxel_downsample_is_near_idempotent() {
        // Each centroid stays inside its own (convex) voxel, so a second
        // pass at the same grid size leaves the count essentially unchanged;
        // a tiny slack covers float rounding on bucket boundaries.
        let cloud = uniform_cloud(5000, 3);
        let once = voxel_downsample(&cloud, 0.05).unwrap();
        let twice = voxel_downsample(&once, 0.05).unwrap();
        let drift = once.len().abs_diff(twice.len());
        assert!(
            drift <= once.len() / 100,
            "second pass changed {} of {} points",
            drift,
            once.len()
        );
    }

    #[test]
    fn test_voxel_downsample_averages_confidence() {
        let cloud = ScanCloud::from_points(vec![
            ScanPoint::with_confidence(0.01, 0.0, 0.0, 0.4),
            ScanPoint::with_confidence(0.02, 0.0, 0.0, 0.8),
        ]);
        let filtered = voxel_downsample(&cloud, 0.1).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_relative_eq!(filtered[0].confidence.unwrap(), 0.6, epsilon = 1e-6);

        // Confidence stays absent when no member carried one.
        let plain = ScanCloud::from_points(vec![ScanPoint::new(0.0, 0.0, 0.0)]);
        assert_eq!(voxel_downsample(&plain, 0.1).unwrap()[0].confidence, None);
    }

    #[test]
    fn test_voxel_downsample_invalid_size() {
        let cloud = ScanCloud::from_points(vec![ScanPoint::new(0.0, 0.0, 0.0)]);
        assert!(voxel_downsample(&cloud, 0.0).is_err());
        assert!(voxel_downsample(&cloud, -1.0).is_err());
    }

    #[test]
    fn test_outlier_removal_drops_isolated_point() {
        let mut cloud = ScanCloud::new();
        for i in 0..10 {
            for j in 0..10 {
                cloud.push(ScanPoint::new(i as f32 * 0.1, j as f32 * 0.1, 0.0));
            }
        }
        cloud.push(ScanPoint::new(10.0, 10.0, 10.0));

        let filtered = remove_statistical_outliers(&cloud, 2.0).unwrap();
        assert!(filtered.len() < cloud.len());
        assert!(!filtered
            .iter()
            .any(|p| (p.position - Point3f::new(10.0, 10.0, 10.0)).magnitude() < 0.1));
    }

    #[test]
    fn test_outlier_removal_keeps_most_of_uniform_cloud() {
        // Routes through the octree path (n > brute-force cutoff).
        let cloud = uniform_cloud(10_000, 5);
        let filtered = remove_statistical_outliers(&cloud, 2.0).unwrap();
        assert!(filtered.len() > cloud.len() / 2);
    }

    #[test]
    fn test_outlier_removal_invalid_multiplier() {
        let cloud = uniform_cloud(10, 1);
        assert!(remove_statistical_outliers(&cloud, 0.0).is_err());
        assert!(remove_statistical_outliers(&cloud, -2.0).is_err());
    }

    #[test]
    fn test_cluster_points_discards_small_components() {
        let mut cloud = ScanCloud::new();
        // A 5-point component around the origin.
        for i in 0..5 {
            cloud.push(ScanPoint::new(i as f32 * 0.05, 0.0, 0.0));
        }
        // A 2-point component far away, below the size floor.
        cloud.push(ScanPoint::new(5.0, 5.0, 5.0));
        cloud.push(ScanPoint::new(5.05, 5.0, 5.0));

        let centroids = cluster_points(&cloud, 0.1).unwrap();
        assert_eq!(centroids.len(), 1);
        assert!((centroids[0].position - Point3f::new(0.1, 0.0, 0.0)).magnitude() < 1e-5);
    }

    #[test]
    fn test_cluster_points_separates_distant_components() {
        let mut cloud = ScanCloud::new();
        for i in 0..4 {
            cloud.push(ScanPoint::new(i as f32 * 0.05, 0.0, 0.0));
            cloud.push(ScanPoint::new(3.0 + i as f32 * 0.05, 0.0, 0.0));
        }
        let centroids = cluster_points(&cloud, 0.1).unwrap();
        assert_eq!(centroids.len(), 2);
    }
}
