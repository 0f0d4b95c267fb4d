//! Adaptive octree spatial index
//!
//! Nodes live in a flat arena and reference their children by index, so the
//! tree has no ownership cycles and queries can run concurrently from
//! multiple threads once the build is done. The build itself is sequential:
//! child creation depends on the parent's point redistribution.

use scanmesh_core::{BoundingBox, Error, NeighborSearch, Point3f, ReconstructionQuality, Result};

/// Split policy parameters for the adaptive octree
#[derive(Debug, Clone, Copy)]
pub struct OctreeConfig {
    /// Depth down to which occupied nodes always split, guaranteeing a
    /// minimum index resolution independent of point density
    pub base_depth: u32,
    /// Depth at which splitting stops unconditionally
    pub max_depth: u32,
    /// Density (points per unit volume) above which a node past the base
    /// depth splits
    pub split_threshold: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            base_depth: 4,
            max_depth: 8,
            split_threshold: 20_000.0,
        }
    }
}

impl From<ReconstructionQuality> for OctreeConfig {
    fn from(tier: ReconstructionQuality) -> Self {
        Self {
            base_depth: tier.base_octree_depth(),
            max_depth: tier.max_octree_depth(),
            split_threshold: tier.split_threshold(),
        }
    }
}

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: BoundingBox,
    depth: u32,
    /// Owned points, only populated at leaves; cleared on split
    points: Vec<(usize, Point3f)>,
    /// Exactly 8 arena indices, or none for a leaf
    children: Option<[usize; 8]>,
}

/// Point-density-adaptive octree over a fixed point set
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<OctreeNode>,
    config: OctreeConfig,
    len: usize,
}

impl Octree {
    /// Build an index over `points` with bounds derived from the data
    ///
    /// The root box is padded slightly so points on the upper faces are
    /// contained and degenerate (coplanar) inputs still get positive volume.
    pub fn build(points: &[Point3f], config: OctreeConfig) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidParameter(
                "cannot build an octree over an empty point set".to_string(),
            ));
        }
        if config.base_depth > config.max_depth {
            return Err(Error::InvalidParameter(format!(
                "base depth {} exceeds max depth {}",
                config.base_depth, config.max_depth
            )));
        }
        let bounds = BoundingBox::from_points(points.iter().copied())
            .ok_or_else(|| Error::InvalidParameter("empty point set".to_string()))?;
        let extent = bounds.size().into_iter().fold(0.0f32, f32::max);
        let bounds = bounds.padded((extent * 1e-3).max(1e-4));

        let mut tree = Self {
            nodes: vec![OctreeNode {
                bounds,
                depth: 0,
                points: Vec::new(),
                children: None,
            }],
            config,
            len: 0,
        };
        for &point in points {
            tree.insert(point)?;
        }
        Ok(tree)
    }

    /// Insert one point, returning its index in query results
    ///
    /// Descends to the containing leaf, appends the point and applies the
    /// split policy.
    pub fn insert(&mut self, point: Point3f) -> Result<usize> {
        if !point.coords.iter().all(|c| c.is_finite()) {
            return Err(Error::InvalidGeometry(
                "non-finite coordinate inserted into octree".to_string(),
            ));
        }
        if !self.nodes[0].bounds.contains(&point) {
            return Err(Error::InvalidGeometry(
                "point lies outside the octree bounds".to_string(),
            ));
        }
        let mut node = 0;
        while let Some(children) = self.nodes[node].children {
            node = children[self.nodes[node].bounds.octant_index(&point)];
        }
        let index = self.len;
        self.nodes[node].points.push((index, point));
        self.len += 1;
        self.maybe_split(node);
        Ok(index)
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of arena nodes, including interior ones
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root node
    pub fn bounds(&self) -> BoundingBox {
        self.nodes[0].bounds
    }

    fn should_split(&self, node: usize) -> bool {
        let node = &self.nodes[node];
        if node.children.is_some() || node.depth >= self.config.max_depth || node.points.is_empty()
        {
            return false;
        }
        if node.depth < self.config.base_depth {
            return true;
        }
        let volume = node.bounds.volume().max(f32::MIN_POSITIVE);
        node.points.len() as f32 / volume > self.config.split_threshold
    }

    fn maybe_split(&mut self, node: usize) {
        if !self.should_split(node) {
            return;
        }
        let bounds = self.nodes[node].bounds;
        let depth = self.nodes[node].depth;
        let first_child = self.nodes.len();
        for octant in 0..8 {
            self.nodes.push(OctreeNode {
                bounds: bounds.octant(octant),
                depth: depth + 1,
                points: Vec::new(),
                children: None,
            });
        }
        let mut children = [0usize; 8];
        for (octant, child) in children.iter_mut().enumerate() {
            *child = first_child + octant;
        }
        let points = std::mem::take(&mut self.nodes[node].points);
        for (index, point) in points {
            let child = children[bounds.octant_index(&point)];
            self.nodes[child].points.push((index, point));
        }
        self.nodes[node].children = Some(children);
        for child in children {
            self.maybe_split(child);
        }
    }

    /// All points with `0 < distance(query, point) <= radius`
    ///
    /// The strict `distance > 0` check excludes the query point itself when
    /// it is part of the indexed set, and consequently also excludes exact
    /// duplicates sitting at distance zero.
    pub fn find_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        let mut found = Vec::new();
        if radius <= 0.0 || self.len == 0 {
            return found;
        }
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if !node.bounds.intersects_sphere(query, radius) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend(children),
                None => {
                    for &(point_index, point) in &node.points {
                        let distance = (point - query).magnitude();
                        if distance > 0.0 && distance <= radius {
                            found.push((point_index, distance));
                        }
                    }
                }
            }
        }
        found
    }
}

impl NeighborSearch for Octree {
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        self.find_neighbors(query, radius)
    }

    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || self.len == 0 {
            return Vec::new();
        }
        let bounds = self.bounds();
        let diagonal = (bounds.max - bounds.min).magnitude();
        let limit = diagonal + (query - bounds.center()).magnitude();
        // Start from the expected spacing of a uniform distribution and widen
        // until enough candidates are in range.
        let mut radius = (bounds.volume() / self.len as f32)
            .cbrt()
            .max(diagonal * 1e-3);
        let mut found = self.find_neighbors(query, radius);
        while found.len() < k && radius < limit {
            radius *= 2.0;
            found = self.find_neighbors(query, radius);
        }
        found.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(k);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;

    fn random_points(n: usize, seed: u64) -> Vec<Point3f> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| Point3f::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>()))
            .collect()
    }

    #[test]
    fn test_build_rejects_empty_input() {
        let result = Octree::build(&[], OctreeConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_forced_split_reaches_base_depth() {
        // A single point forces splits down to the base depth.
        let config = OctreeConfig {
            base_depth: 3,
            max_depth: 8,
            split_threshold: f32::INFINITY,
        };
        let points = vec![Point3f::new(0.1, 0.2, 0.3), Point3f::new(0.9, 0.8, 0.7)];
        let tree = Octree::build(&points, config).unwrap();
        // Root plus at least one full split chain per base level.
        assert!(tree.node_count() >= 1 + 8 * 3);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_duplicates_stop_splitting_at_max_depth() {
        // Identical points can never be separated; the split policy must
        // stop at max depth instead of recursing forever.
        let config = OctreeConfig {
            base_depth: 2,
            max_depth: 4,
            split_threshold: 0.0,
        };
        let points = vec![Point3f::new(0.5, 0.5, 0.5); 50];
        let tree = Octree::build(&points, config).unwrap();
        assert_eq!(tree.len(), 50);
        // 4 levels of 8 children plus the root is the ceiling.
        assert!(tree.node_count() <= 1 + 8 + 64 + 512 + 4096);
    }

    #[test]
    fn test_radius_search_matches_brute_force() {
        let points = random_points(500, 7);
        let tree = Octree::build(&points, OctreeConfig::default()).unwrap();
        let query = Point3f::new(0.5, 0.5, 0.5);
        let radius = 0.2;

        let mut expected: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                let d = (*p - query).magnitude();
                d > 0.0 && d <= radius
            })
            .map(|(i, _)| i)
            .collect();
        expected.sort_unstable();

        let mut found: Vec<usize> = tree
            .find_neighbors(&query, radius)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        found.sort_unstable();

        assert_eq!(found, expected);
    }

    #[test]
    fn test_query_point_and_duplicates_excluded() {
        let points = vec![
            Point3f::new(0.5, 0.5, 0.5),
            Point3f::new(0.5, 0.5, 0.5), // exact duplicate
            Point3f::new(0.6, 0.5, 0.5),
        ];
        let tree = Octree::build(&points, OctreeConfig::default()).unwrap();
        let found = tree.find_neighbors(&Point3f::new(0.5, 0.5, 0.5), 0.5);
        // Both zero-distance points are excluded; only the offset point remains.
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 2);
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0)];
        let tree = Octree::build(&points, OctreeConfig::default()).unwrap();
        let found = tree.find_neighbors(&Point3f::new(0.0, 0.0, 0.0), 1.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, 1);
    }

    #[test]
    fn test_k_nearest_ordering() {
        let points = random_points(300, 11);
        let tree = Octree::build(&points, OctreeConfig::default()).unwrap();
        let query = Point3f::new(0.3, 0.3, 0.3);
        let found = tree.find_k_nearest(&query, 10);
        assert_eq!(found.len(), 10);
        for pair in found.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }

        // Spot-check against a brute-force nearest.
        let nearest_brute = points
            .iter()
            .map(|p| (p - query).magnitude())
            .filter(|&d| d > 0.0)
            .fold(f32::INFINITY, f32::min);
        assert_eq!(found[0].1, nearest_brute);
    }

    #[test]
    fn test_insert_outside_bounds_rejected() {
        let points = vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0)];
        let mut tree = Octree::build(&points, OctreeConfig::default()).unwrap();
        assert!(tree.insert(Point3f::new(10.0, 0.0, 0.0)).is_err());
        assert!(tree.insert(Point3f::new(f32::NAN, 0.0, 0.0)).is_err());
    }
}
