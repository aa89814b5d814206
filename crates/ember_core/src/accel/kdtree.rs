//! k-d tree nearest-neighbor index over cluster centers.
//!
//! The hierarchy builder keeps one of these over the centers of all live
//! clusters, so finding the closest merge partner stays O(log n) instead of
//! a linear scan.

use ember_math::Vec3;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        id: usize,
        center: Vec3,
    },
    Split {
        /// Split axis, cycling x -> y -> z with depth.
        axis: usize,
        median: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn placeholder() -> Node {
        Node::Leaf {
            id: usize::MAX,
            center: Vec3::ZERO,
        }
    }
}

/// A dynamic point index keyed by element id.
///
/// Elements on the left of a split satisfy `coord <= median`, elements on
/// the right `coord >= median`; removal navigates by the element's center,
/// so the caller must pass the same center it inserted.
#[derive(Debug, Clone, Default)]
pub struct KdTree {
    root: Option<Box<Node>>,
    len: usize,
}

impl KdTree {
    /// Build a balanced tree by recursively splitting at the median element.
    pub fn build(items: &[(usize, Vec3)]) -> Self {
        if items.is_empty() {
            return Self::default();
        }
        Self {
            root: Some(Box::new(Self::build_rec(items.to_vec(), 0))),
            len: items.len(),
        }
    }

    fn build_rec(mut items: Vec<(usize, Vec3)>, depth: usize) -> Node {
        if items.len() == 1 {
            let (id, center) = items.pop().expect("non-empty set");
            return Node::Leaf { id, center };
        }

        let axis = depth % 3;
        items.sort_by(|a, b| a.1[axis].partial_cmp(&b.1[axis]).unwrap_or(Ordering::Equal));

        let half = items.len() / 2;
        let right = items.split_off(half);
        let median = (items.last().expect("non-empty left").1[axis]
            + right.first().expect("non-empty right").1[axis])
            / 2.0;

        Node::Split {
            axis,
            median,
            left: Box::new(Self::build_rec(items, depth + 1)),
            right: Box::new(Self::build_rec(right, depth + 1)),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The element closest to `point`, excluding the element with id
    /// `exclude`. Returns the id and the squared distance.
    pub fn nearest_neighbor(&self, point: Vec3, exclude: usize) -> Option<(usize, f32)> {
        let mut best: Option<(usize, f32)> = None;
        if let Some(root) = &self.root {
            Self::nearest_rec(root, point, exclude, &mut best);
        }
        best
    }

    fn nearest_rec(node: &Node, point: Vec3, exclude: usize, best: &mut Option<(usize, f32)>) {
        match node {
            Node::Leaf { id, center } => {
                if *id == exclude {
                    return;
                }
                let dist = center.distance_squared(point);
                if best.map_or(true, |(_, d)| dist < d) {
                    *best = Some((*id, dist));
                }
            }
            Node::Split {
                axis,
                median,
                left,
                right,
            } => {
                let coord = point[*axis];
                let (primary, secondary) = if coord <= *median {
                    (left, right)
                } else {
                    (right, left)
                };

                Self::nearest_rec(primary, point, exclude, best);

                // Step into the far side only if the splitting plane is
                // closer than the best distance found so far
                let bound = (coord - median) * (coord - median);
                if best.map_or(true, |(_, d)| bound < d) {
                    Self::nearest_rec(secondary, point, exclude, best);
                }
            }
        }
    }

    /// Add an element by splitting the leaf closest to its center.
    pub fn insert(&mut self, id: usize, center: Vec3) {
        self.len += 1;
        match &mut self.root {
            None => self.root = Some(Box::new(Node::Leaf { id, center })),
            Some(root) => Self::insert_rec(root, id, center, 0),
        }
    }

    fn insert_rec(node: &mut Node, id: usize, center: Vec3, parent_axis: usize) {
        match node {
            Node::Split {
                axis,
                median,
                left,
                right,
            } => {
                let a = *axis;
                if center[a] <= *median {
                    Self::insert_rec(left, id, center, a);
                } else {
                    Self::insert_rec(right, id, center, a);
                }
            }
            Node::Leaf {
                id: old_id,
                center: old_center,
            } => {
                let (old_id, old_center) = (*old_id, *old_center);

                // Split this leaf on the next axis in the cycle
                let axis = (parent_axis + 1) % 3;
                let median = (old_center[axis] + center[axis]) / 2.0;
                let old_leaf = Node::Leaf {
                    id: old_id,
                    center: old_center,
                };
                let new_leaf = Node::Leaf { id, center };
                let (left, right) = if old_center[axis] > center[axis] {
                    (new_leaf, old_leaf)
                } else {
                    (old_leaf, new_leaf)
                };

                *node = Node::Split {
                    axis,
                    median,
                    left: Box::new(left),
                    right: Box::new(right),
                };
            }
        }
    }

    /// Remove the element with the given id, collapsing its parent split
    /// into the surviving sibling. Returns whether the element was found.
    pub fn remove(&mut self, id: usize, center: Vec3) -> bool {
        let removed = match &mut self.root {
            None => false,
            Some(root) => {
                if Self::leaf_matches(root, id) {
                    self.root = None;
                    true
                } else {
                    Self::remove_rec(root, id, center)
                }
            }
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn leaf_matches(node: &Node, id: usize) -> bool {
        matches!(node, Node::Leaf { id: leaf_id, .. } if *leaf_id == id)
    }

    fn remove_rec(node: &mut Box<Node>, id: usize, center: Vec3) -> bool {
        let (axis, median) = match node.as_ref() {
            Node::Split { axis, median, .. } => (*axis, *median),
            Node::Leaf { .. } => return false,
        };
        let coord = center[axis];

        let (left_match, right_match) = match node.as_ref() {
            Node::Split { left, right, .. } => (
                coord <= median && Self::leaf_matches(left, id),
                coord >= median && Self::leaf_matches(right, id),
            ),
            Node::Leaf { .. } => unreachable!(),
        };

        if left_match || right_match {
            // Replace this split with the surviving sibling
            let Node::Split { left, right, .. } =
                std::mem::replace(node.as_mut(), Node::placeholder())
            else {
                unreachable!();
            };
            *node = if left_match { right } else { left };
            return true;
        }

        let Node::Split { left, right, .. } = node.as_mut() else {
            unreachable!();
        };
        // On an exact median match the element can live on either side
        (coord <= median && Self::remove_rec(left, id, center))
            || (coord >= median && Self::remove_rec(right, id, center))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_points(rng: &mut StdRng, count: usize) -> Vec<(usize, Vec3)> {
        (0..count)
            .map(|id| {
                (
                    id,
                    Vec3::new(
                        rng.gen_range(-100.0..100.0),
                        rng.gen_range(-100.0..100.0),
                        rng.gen_range(-100.0..100.0),
                    ),
                )
            })
            .collect()
    }

    fn brute_force(points: &[(usize, Vec3)], query: Vec3, exclude: usize) -> Option<(usize, f32)> {
        points
            .iter()
            .filter(|(id, _)| *id != exclude)
            .map(|(id, center)| (*id, center.distance_squared(query)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
    }

    #[test]
    fn test_nearest_neighbor_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let points = random_points(&mut rng, 1000);
        let tree = KdTree::build(&points);

        for _ in 0..25 {
            let query_index = rng.gen_range(0..points.len());
            let (query_id, query_center) = points[query_index];

            let (_, fast) = tree.nearest_neighbor(query_center, query_id).unwrap();
            let (_, slow) = brute_force(&points, query_center, query_id).unwrap();

            // Squared distances must agree within relative tolerance
            assert!(
                (fast - slow).abs() <= 1e-4 * slow.max(1.0),
                "fast {fast} vs brute force {slow}"
            );
        }
    }

    #[test]
    fn test_excludes_query_element() {
        let points = vec![(0, Vec3::ZERO), (1, Vec3::X), (2, Vec3::splat(5.0))];
        let tree = KdTree::build(&points);

        let (id, _) = tree.nearest_neighbor(Vec3::ZERO, 0).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_insert_then_query() {
        let mut tree = KdTree::build(&[(0, Vec3::ZERO)]);
        tree.insert(1, Vec3::new(10.0, 0.0, 0.0));
        tree.insert(2, Vec3::new(0.1, 0.0, 0.0));
        assert_eq!(tree.len(), 3);

        let (id, _) = tree.nearest_neighbor(Vec3::ZERO, 0).unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn test_remove_collapses_to_sibling() {
        let points = vec![(0, Vec3::ZERO), (1, Vec3::X), (2, Vec3::splat(5.0))];
        let mut tree = KdTree::build(&points);

        assert!(tree.remove(1, Vec3::X));
        assert_eq!(tree.len(), 2);
        let (id, _) = tree.nearest_neighbor(Vec3::ZERO, 0).unwrap();
        assert_eq!(id, 2);

        // Removing again fails cleanly
        assert!(!tree.remove(1, Vec3::X));
    }

    #[test]
    fn test_remove_root_leaf() {
        let mut tree = KdTree::build(&[(0, Vec3::ZERO)]);
        assert!(tree.remove(0, Vec3::ZERO));
        assert!(tree.is_empty());
        assert!(tree.nearest_neighbor(Vec3::ZERO, usize::MAX).is_none());
    }

    #[test]
    fn test_churn_keeps_answers_correct() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut points = random_points(&mut rng, 200);
        let mut tree = KdTree::build(&points);

        // Remove half of the elements, then insert fresh ones
        for _ in 0..100 {
            let index = rng.gen_range(0..points.len());
            let (id, center) = points.swap_remove(index);
            assert!(tree.remove(id, center), "failed to remove element {id}");
        }
        for id in 1000..1050 {
            let center = Vec3::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            tree.insert(id, center);
            points.push((id, center));
        }
        assert_eq!(tree.len(), points.len());

        for _ in 0..25 {
            let query = Vec3::new(
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
                rng.gen_range(-100.0..100.0),
            );
            let (_, fast) = tree.nearest_neighbor(query, usize::MAX).unwrap();
            let (_, slow) = brute_force(&points, query, usize::MAX).unwrap();
            assert!((fast - slow).abs() <= 1e-4 * slow.max(1.0));
        }
    }
}
