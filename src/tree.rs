//! Spatial partition tree over borrowed feature vectors.
//!
//! The tree recursively bisects a contiguous range of point references at
//! the midpoint of one dimension's extent, in the manner of a k-d tree with
//! data-driven (rather than median) cuts. Nodes are stored in an arena and
//! refer to their children by [`NodeId`]; every node covers a contiguous range
//! of the tree's internal point ordering, so a subtree's items are a slice.
//!
//! Each node records its tight bounding box, point count and mean, which is
//! everything the density evaluator needs to bound a subtree's contribution
//! without touching its points.

use core::fmt;

use crate::bbox::BoundingBox;
use crate::error::{Error, Result, check_points};

/// Index of a node in the tree's arena.
pub type NodeId = usize;

/// What a node is: a split with two children, or a leaf holding its range.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// An internal node split along one dimension.
    Internal {
        /// Dimension the range was cut along.
        split_dim: usize,
        /// Cut position. Points below it went low, unless the cut degenerated
        /// and the range was halved by index instead.
        split_value: f64,
        /// Child holding the low side.
        lo: NodeId,
        /// Child holding the high side.
        hi: NodeId,
    },
    /// A leaf holding at most `leaf_capacity` points (unless it is the root).
    Leaf,
}

/// A node of the [`SpatialPartitionTree`] arena.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    bbox: BoundingBox,
    mean: Vec<f64>,
    start: usize,
    end: usize,
    kind: NodeKind,
}

impl Node {
    /// Tight bounding box of the node's points.
    #[must_use]
    pub fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Per-dimension mean of the node's points.
    #[must_use]
    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    /// Number of points below this node.
    #[must_use]
    pub fn count(&self) -> usize {
        self.end - self.start
    }

    /// Internal or leaf.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Whether this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf)
    }

    /// The node's range in the tree's internal point ordering.
    #[must_use]
    pub fn range(&self) -> core::ops::Range<usize> {
        self.start..self.end
    }
}

/// A k-d style partition tree built once over borrowed points and read-only
/// afterwards.
///
/// Points are identified by their position in the vector given to
/// [`build`](Self::build); that id is what [`items`](Self::items) yields and
/// what the evaluator uses to leave a query point out of its own density.
///
/// # Examples
///
/// ```
/// use treekde::tree::SpatialPartitionTree;
///
/// let rows = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![5.0, 5.0], vec![6.0, 5.0]];
/// let tree = SpatialPartitionTree::from_rows(&rows, 2, false).unwrap();
///
/// assert_eq!(tree.count(tree.root()), 4);
/// let (lo, hi) = tree.children(tree.root()).unwrap();
/// assert_eq!(tree.count(lo) + tree.count(hi), 4);
/// ```
#[derive(Clone, Debug)]
pub struct SpatialPartitionTree<'a> {
    /// Point references, permuted so every node covers a contiguous range.
    points: Vec<&'a [f64]>,
    /// `ids[pos]` is the caller-facing id of the point at `pos`.
    ids: Vec<usize>,
    /// `positions[id]` is the position of point `id` in `points`.
    positions: Vec<usize>,
    nodes: Vec<Node>,
    root: NodeId,
    dim: usize,
    leaf_capacity: usize,
    split_by_width: bool,
}

impl<'a> SpatialPartitionTree<'a> {
    /// Builds a tree over `points`.
    ///
    /// With `split_by_width`, each range is cut along its widest dimension;
    /// otherwise the cut dimension cycles with depth.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidLeafCapacity` if `leaf_capacity` is zero,
    /// `Error::EmptyInput` if there are no points, and
    /// `Error::ZeroDimensions` / `Error::DimensionMismatch` for malformed points.
    pub fn build(
        points: Vec<&'a [f64]>,
        leaf_capacity: usize,
        split_by_width: bool,
    ) -> Result<Self> {
        if leaf_capacity == 0 {
            return Err(Error::InvalidLeafCapacity);
        }
        let dim = check_points(&points)?;
        let n = points.len();

        let mut tree = Self {
            points,
            ids: (0..n).collect(),
            positions: Vec::new(),
            nodes: Vec::with_capacity(2 * n.div_ceil(leaf_capacity)),
            root: 0,
            dim,
            leaf_capacity,
            split_by_width,
        };
        tree.root = tree.build_node(0, n, 0);

        tree.positions = vec![0; n];
        for (pos, &id) in tree.ids.iter().enumerate() {
            tree.positions[id] = pos;
        }

        trace_debug!(
            n_points = n,
            n_nodes = tree.nodes.len(),
            leaf_capacity,
            split_by_width,
            "partition tree built"
        );
        Ok(tree)
    }

    /// Builds a tree over a slice of rows without copying them.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn from_rows<P: AsRef<[f64]>>(
        rows: &'a [P],
        leaf_capacity: usize,
        split_by_width: bool,
    ) -> Result<Self> {
        Self::build(
            rows.iter().map(AsRef::as_ref).collect(),
            leaf_capacity,
            split_by_width,
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn build_node(&mut self, start: usize, end: usize, depth: usize) -> NodeId {
        let count = end - start;

        if count <= self.leaf_capacity {
            let bbox = self.range_bbox(start, end);
            let mut mean = vec![0.0; self.dim];
            for p in &self.points[start..end] {
                for (m, x) in mean.iter_mut().zip(p.iter()) {
                    *m += x;
                }
            }
            for m in &mut mean {
                *m /= count as f64;
            }
            return self.push(Node {
                bbox,
                mean,
                start,
                end,
                kind: NodeKind::Leaf,
            });
        }

        let split_dim = if self.split_by_width {
            self.range_bbox(start, end).widest_dimension()
        } else {
            depth % self.dim
        };
        let (lo_value, hi_value) = self.axis_extent(start, end, split_dim);
        let mut split_value = f64::midpoint(lo_value, hi_value);
        let mut mid = self.partition(start, end, split_dim, split_value);

        // An empty side means the cut sat on an extreme value: halve by index.
        if mid == start || mid == end {
            mid = start + count / 2;
            split_value = self.points[mid][split_dim];
        }

        let lo = self.build_node(start, mid, depth + 1);
        let hi = self.build_node(mid, end, depth + 1);

        let (lo_node, hi_node) = (&self.nodes[lo], &self.nodes[hi]);
        let bbox = lo_node.bbox.union(&hi_node.bbox);
        let (lo_n, hi_n) = (lo_node.count() as f64, hi_node.count() as f64);
        let mean = lo_node
            .mean
            .iter()
            .zip(&hi_node.mean)
            .map(|(a, b)| (a * lo_n + b * hi_n) / (lo_n + hi_n))
            .collect();

        self.push(Node {
            bbox,
            mean,
            start,
            end,
            kind: NodeKind::Internal {
                split_dim,
                split_value,
                lo,
                hi,
            },
        })
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(node);
        id
    }

    /// Two-pointer partition of `start..end` so values `< split` come first.
    /// Returns the index of the first element of the high side.
    fn partition(&mut self, start: usize, end: usize, dim: usize, split: f64) -> usize {
        let mut l = start;
        let mut r = end - 1;
        loop {
            while l < r && self.points[l][dim] < split {
                l += 1;
            }
            while l < r && self.points[r][dim] >= split {
                r -= 1;
            }
            if l < r {
                self.points.swap(l, r);
                self.ids.swap(l, r);
            } else {
                break;
            }
        }
        if self.points[l][dim] < split { l + 1 } else { l }
    }

    fn axis_extent(&self, start: usize, end: usize, dim: usize) -> (f64, f64) {
        self.points[start..end]
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[dim]), hi.max(p[dim]))
            })
    }

    fn range_bbox(&self, start: usize, end: usize) -> BoundingBox {
        let mut bbox = BoundingBox::from_point(self.points[start]);
        for p in &self.points[start + 1..end] {
            bbox.extend(p);
        }
        bbox
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The node with the given id.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a node of this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// All nodes of the arena.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether `id` is a leaf.
    #[must_use]
    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].is_leaf()
    }

    /// Bounding box of node `id`.
    #[must_use]
    pub fn bounds(&self, id: NodeId) -> &BoundingBox {
        &self.nodes[id].bbox
    }

    /// Mean of node `id`.
    #[must_use]
    pub fn mean(&self, id: NodeId) -> &[f64] {
        &self.nodes[id].mean
    }

    /// Number of points below node `id`.
    #[must_use]
    pub fn count(&self, id: NodeId) -> usize {
        self.nodes[id].count()
    }

    /// The `(lo, hi)` children of an internal node, `None` for leaves.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Option<(NodeId, NodeId)> {
        match self.nodes[id].kind {
            NodeKind::Internal { lo, hi, .. } => Some((lo, hi)),
            NodeKind::Leaf => None,
        }
    }

    /// The `(point_id, point)` pairs below node `id`.
    pub fn items(&self, id: NodeId) -> impl Iterator<Item = (usize, &'a [f64])> + '_ {
        let range = self.nodes[id].range();
        self.ids[range.clone()]
            .iter()
            .copied()
            .zip(self.points[range].iter().copied())
    }

    /// Whether point `point_id` lies below node `id`.
    #[must_use]
    pub fn contains_point(&self, id: NodeId, point_id: usize) -> bool {
        self.positions
            .get(point_id)
            .is_some_and(|pos| self.nodes[id].range().contains(pos))
    }

    /// Minimum and maximum squared distance from `q` to node `id`'s box.
    #[must_use]
    pub fn distance_bounds(&self, id: NodeId, q: &[f64]) -> (f64, f64) {
        self.nodes[id].bbox.distance_bounds(q)
    }

    /// Minimum and maximum squared distance from `q` to node `id`'s box after
    /// scaling each dimension's offset by `scale`.
    #[must_use]
    pub fn scaled_distance_bounds(&self, id: NodeId, q: &[f64], scale: &[f64]) -> (f64, f64) {
        self.nodes[id].bbox.scaled_distance_bounds(q, scale)
    }

    /// The point with caller-facing id `point_id`.
    ///
    /// # Panics
    ///
    /// Panics if `point_id >= self.len()`.
    #[must_use]
    pub fn point(&self, point_id: usize) -> &'a [f64] {
        self.points[self.positions[point_id]]
    }

    /// Number of points in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`: building over an empty set is rejected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point dimension.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of nodes in the arena.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Length of the longest root-to-leaf path, counting edges.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0)];
        while let Some((id, d)) = stack.pop() {
            deepest = deepest.max(d);
            if let Some((lo, hi)) = self.children(id) {
                stack.push((lo, d + 1));
                stack.push((hi, d + 1));
            }
        }
        deepest
    }

    /// Maximum number of points per leaf.
    #[must_use]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    /// Whether ranges are cut along their widest dimension.
    #[must_use]
    pub fn split_by_width(&self) -> bool {
        self.split_by_width
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, indent: usize) -> fmt::Result {
        let pad = " ".repeat(indent + 1);
        match self.nodes[id].kind {
            NodeKind::Internal {
                split_dim,
                split_value,
                lo,
                hi,
            } => {
                writeln!(f, "node: dim={split_dim} split={split_value:.3}")?;
                write!(f, "{pad}lo: ")?;
                self.fmt_node(f, lo, indent + 1)?;
                write!(f, "{pad}hi: ")?;
                self.fmt_node(f, hi, indent + 1)
            }
            NodeKind::Leaf => {
                writeln!(f, "leaf:")?;
                for (_, p) in self.items(id) {
                    writeln!(f, "{pad} - {p:?}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for SpatialPartitionTree<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, 0)
    }
}
