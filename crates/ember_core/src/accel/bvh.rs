//! Bounding-volume hierarchy built by agglomerative clustering.
//!
//! Leaves wrap one bounded object each; branches hold exactly two children
//! and the box enclosing both. Construction repeatedly merges the pair of
//! clusters whose combined box has the lowest surface area, using a
//! strategy picked by input size (the naive pairwise search is O(n^3)).

use std::cmp::Ordering;

use ember_math::{Aabb, Bounded, Ray, Vec3};
use log::debug;

use super::{heap::Heap, kdtree::KdTree};

/// Inputs at or below this size use the exhaustive pairwise search.
const EXHAUSTIVE_MAX: usize = 20;
/// Inputs at or below this size use heap-accelerated clustering; anything
/// larger falls back to the nearest-neighbor chain walk.
const CLUSTERED_MAX: usize = 200_000;

/// A leaf whose volume the ray passed through, with the slab distances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafHit {
    pub id: usize,
    pub near: f32,
    pub far: f32,
}

/// A node of the finished hierarchy. Immutable after construction.
#[derive(Debug, Clone)]
pub enum BvhNode {
    Leaf {
        /// Stable id of the wrapped object (its index in the input slice).
        id: usize,
        volume: Aabb,
        /// Set when this volume equals the parent's exactly, letting
        /// traversal reuse the parent's slab result.
        skip_volume: bool,
    },
    Branch {
        volume: Aabb,
        skip_volume: bool,
        /// Surface-area cost of this grouping, fixed at construction.
        cost: f32,
        left: Box<BvhNode>,
        right: Box<BvhNode>,
    },
}

impl BvhNode {
    pub fn volume(&self) -> &Aabb {
        match self {
            BvhNode::Leaf { volume, .. } | BvhNode::Branch { volume, .. } => volume,
        }
    }

    pub fn skip_volume(&self) -> bool {
        match self {
            BvhNode::Leaf { skip_volume, .. } | BvhNode::Branch { skip_volume, .. } => *skip_volume,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, BvhNode::Leaf { .. })
    }

    /// Surface-area cost of a branch; leaves have no grouping cost.
    pub fn cost(&self) -> Option<f32> {
        match self {
            BvhNode::Leaf { .. } => None,
            BvhNode::Branch { cost, .. } => Some(*cost),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            BvhNode::Leaf { .. } => 1,
            BvhNode::Branch { left, right, .. } => left.leaf_count() + right.leaf_count(),
        }
    }
}

/// The hierarchy over one scene's primitives.
#[derive(Debug, Clone)]
pub struct Bvh {
    root: BvhNode,
    leaf_count: usize,
}

// Intermediate cluster storage used while building; indices into the arena
// are handles, the finished tree is frozen out of it afterwards.
//
// The clustering center is tracked per object rather than read off the
// volume: an unbounded primitive (an infinite plane) still has a finite
// anchor point, while its box center would be indeterminate.
struct Cluster {
    volume: Aabb,
    center: Vec3,
    leaf_count: usize,
    kind: ClusterKind,
    alive: bool,
}

enum ClusterKind {
    Leaf(usize),
    Branch(usize, usize),
}

/// A candidate merge waiting in the heap.
struct Pair {
    a: usize,
    b: usize,
    cost: f32,
    leaves: usize,
}

fn leaves_of<B: Bounded>(objects: &[B]) -> Vec<Cluster> {
    objects
        .iter()
        .enumerate()
        .map(|(id, object)| Cluster {
            volume: Aabb::from_bounded(object),
            center: object.center(),
            leaf_count: 1,
            kind: ClusterKind::Leaf(id),
            alive: true,
        })
        .collect()
}

fn cluster_center(arena: &[Cluster], index: usize) -> Vec3 {
    arena[index].center
}

fn pair_cost(arena: &[Cluster], a: usize, b: usize) -> f32 {
    Aabb::combine(&arena[a].volume, &arena[b].volume).surface_area()
}

fn make_pair(arena: &[Cluster], a: usize, b: usize) -> Pair {
    Pair {
        a,
        b,
        cost: pair_cost(arena, a, b),
        leaves: arena[a].leaf_count + arena[b].leaf_count,
    }
}

/// Retire both sides and append their parent cluster.
fn merge(arena: &mut Vec<Cluster>, a: usize, b: usize) -> usize {
    let volume = Aabb::combine(&arena[a].volume, &arena[b].volume);
    let center = (arena[a].center + arena[b].center) / 2.0;
    let leaf_count = arena[a].leaf_count + arena[b].leaf_count;
    arena[a].alive = false;
    arena[b].alive = false;
    arena.push(Cluster {
        volume,
        center,
        leaf_count,
        kind: ClusterKind::Branch(a, b),
        alive: true,
    });
    arena.len() - 1
}

/// Repeatedly scan every pair and merge the cheapest one. Ties prefer
/// pairing two leaves, keeping the tree shallow.
fn build_exhaustive(arena: &mut Vec<Cluster>) -> usize {
    let mut roots: Vec<usize> = (0..arena.len()).collect();

    while roots.len() > 1 {
        let mut best: Option<(usize, usize, f32, bool)> = None;

        for i in 0..roots.len() {
            for j in (i + 1)..roots.len() {
                let cost = pair_cost(arena, roots[i], roots[j]);
                let both_leaves = matches!(arena[roots[i]].kind, ClusterKind::Leaf(_))
                    && matches!(arena[roots[j]].kind, ClusterKind::Leaf(_));
                let better = match best {
                    None => true,
                    Some((_, _, best_cost, best_leaves)) => {
                        cost < best_cost || (cost == best_cost && both_leaves && !best_leaves)
                    }
                };
                if better {
                    best = Some((i, j, cost, both_leaves));
                }
            }
        }

        let (i, j, _, _) = best.expect("at least one pair");
        let parent = merge(arena, roots[i], roots[j]);
        roots.swap_remove(j);
        roots[i] = parent;
    }

    roots[0]
}

/// Heap-accelerated nearest-neighbor clustering.
///
/// Every live cluster keeps one candidate pair with its current nearest
/// neighbor in the heap. Popped candidates whose partner was already
/// consumed lazily re-derive a fresh neighbor instead of being discarded
/// outright.
fn build_clustered(arena: &mut Vec<Cluster>) -> usize {
    let n = arena.len();
    let centers: Vec<(usize, Vec3)> = (0..n).map(|i| (i, cluster_center(arena, i))).collect();
    let mut index = KdTree::build(&centers);

    // Cheapest combined surface area first; ties prefer more leaf
    // descendants, flattening the tree
    let compare = |x: &Pair, y: &Pair| {
        x.cost
            .partial_cmp(&y.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| y.leaves.cmp(&x.leaves))
    };

    let mut pending = Heap::new(compare);
    for i in 0..n {
        if let Some((neighbor, _)) = index.nearest_neighbor(cluster_center(arena, i), i) {
            pending.push(make_pair(arena, i, neighbor));
        }
    }

    let mut remaining = n;
    let mut root = 0;

    while remaining > 1 {
        let Some(pair) = pending.pop() else {
            debug_assert!(false, "candidate heap drained with {remaining} clusters left");
            break;
        };

        if !arena[pair.a].alive {
            continue;
        }
        if !arena[pair.b].alive {
            // Partner was consumed by an earlier merge: re-derive
            let center = cluster_center(arena, pair.a);
            if let Some((neighbor, _)) = index.nearest_neighbor(center, pair.a) {
                pending.push(make_pair(arena, pair.a, neighbor));
            }
            continue;
        }

        index.remove(pair.a, cluster_center(arena, pair.a));
        index.remove(pair.b, cluster_center(arena, pair.b));
        let parent = merge(arena, pair.a, pair.b);
        remaining -= 1;
        root = parent;

        if remaining > 1 {
            let center = cluster_center(arena, parent);
            index.insert(parent, center);
            if let Some((neighbor, _)) = index.nearest_neighbor(center, parent) {
                pending.push(make_pair(arena, parent, neighbor));
            }
        }
    }

    root
}

/// Local agglomerative clustering: walk nearest-neighbor links until two
/// clusters point at each other, merge them, continue from the merge.
/// Avoids the heap overhead entirely at very large input counts.
fn build_chained(arena: &mut Vec<Cluster>) -> usize {
    let n = arena.len();
    let centers: Vec<(usize, Vec3)> = (0..n).map(|i| (i, cluster_center(arena, i))).collect();
    let mut index = KdTree::build(&centers);

    let mut remaining = n;
    let mut current = 0;
    let mut root = 0;

    while remaining > 1 {
        let (next, _) = index
            .nearest_neighbor(cluster_center(arena, current), current)
            .expect("more than one cluster left");
        let (back, _) = index
            .nearest_neighbor(cluster_center(arena, next), next)
            .expect("more than one cluster left");

        if back != current {
            // Not mutual yet: advance the walk
            current = next;
            continue;
        }

        index.remove(current, cluster_center(arena, current));
        index.remove(next, cluster_center(arena, next));
        let parent = merge(arena, current, next);
        remaining -= 1;
        root = parent;

        if remaining == 1 {
            break;
        }
        index.insert(parent, cluster_center(arena, parent));
        current = parent;
    }

    root
}

impl Bvh {
    /// Build the hierarchy. The leaf ids are the objects' indices in the
    /// input slice.
    pub fn build<B: Bounded>(objects: &[B]) -> Bvh {
        assert!(
            !objects.is_empty(),
            "cannot build a hierarchy over zero objects"
        );

        let mut arena = leaves_of(objects);
        let n = arena.len();

        let root = if n == 1 {
            0
        } else if n <= EXHAUSTIVE_MAX {
            debug!("building hierarchy over {n} objects (exhaustive)");
            build_exhaustive(&mut arena)
        } else if n <= CLUSTERED_MAX {
            debug!("building hierarchy over {n} objects (heap clustering)");
            build_clustered(&mut arena)
        } else {
            debug!("building hierarchy over {n} objects (chain clustering)");
            build_chained(&mut arena)
        };

        let bvh = Bvh {
            root: Self::freeze(&arena, root, None),
            leaf_count: n,
        };
        debug_assert_eq!(
            bvh.root.leaf_count(),
            n,
            "hierarchy must contain every input exactly once"
        );
        bvh
    }

    // Turn the build arena into the immutable node tree, marking children
    // whose volume matches their parent's.
    fn freeze(arena: &[Cluster], index: usize, parent_volume: Option<&Aabb>) -> BvhNode {
        let cluster = &arena[index];
        let skip_volume = parent_volume.map_or(false, |parent| *parent == cluster.volume);

        match cluster.kind {
            ClusterKind::Leaf(id) => BvhNode::Leaf {
                id,
                volume: cluster.volume,
                skip_volume,
            },
            ClusterKind::Branch(left, right) => BvhNode::Branch {
                volume: cluster.volume,
                skip_volume,
                cost: cluster.volume.surface_area(),
                left: Box::new(Self::freeze(arena, left, Some(&cluster.volume))),
                right: Box::new(Self::freeze(arena, right, Some(&cluster.volume))),
            },
        }
    }

    pub fn root(&self) -> &BvhNode {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Ids of every leaf, in traversal order.
    pub fn leaf_ids(&self) -> Vec<usize> {
        let mut ids = Vec::with_capacity(self.leaf_count);
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                BvhNode::Leaf { id, .. } => ids.push(*id),
                BvhNode::Branch { left, right, .. } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        ids
    }

    /// All leaves whose volume the ray passes through, closest first.
    ///
    /// Candidates come back sorted by `near` ascending so callers can stop
    /// as soon as a confirmed hit is closer than the next candidate's
    /// `near`. Nodes flagged `skip_volume` inherit the parent's slab
    /// result instead of re-testing an identical box.
    pub fn intersect_leaves(&self, ray: &Ray) -> Vec<LeafHit> {
        let mut hits = Vec::new();
        let mut stack: Vec<(&BvhNode, (f32, f32))> = vec![(&self.root, (f32::NAN, f32::NAN))];

        while let Some((node, inherited)) = stack.pop() {
            let span = if node.skip_volume() {
                inherited
            } else {
                node.volume().intersect(ray)
            };

            // Missed (NaN) or entirely behind the ray
            if !(span.1 >= 0.0) {
                continue;
            }

            match node {
                BvhNode::Leaf { id, .. } => hits.push(LeafHit {
                    id: *id,
                    near: span.0,
                    far: span.1,
                }),
                BvhNode::Branch { left, right, .. } => {
                    stack.push((right, span));
                    stack.push((left, span));
                }
            }
        }

        hits.sort_by(|x, y| x.near.partial_cmp(&y.near).unwrap_or(Ordering::Equal));
        hits
    }

    /// Number of nodes whose volume the ray passes through; feeds the
    /// debug-overlay heat map.
    pub fn intersection_count(&self, ray: &Ray) -> usize {
        let mut count = 0;
        let mut stack: Vec<(&BvhNode, (f32, f32))> = vec![(&self.root, (f32::NAN, f32::NAN))];

        while let Some((node, inherited)) = stack.pop() {
            let span = if node.skip_volume() {
                inherited
            } else {
                node.volume().intersect(ray)
            };
            if !(span.1 >= 0.0) {
                continue;
            }

            count += 1;
            if let BvhNode::Branch { left, right, .. } = node {
                stack.push((right, span));
                stack.push((left, span));
            }
        }

        count
    }
}
