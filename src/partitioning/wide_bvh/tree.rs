use crate::bounding_volume::Aabb;
use alloc::vec::Vec;
use core::mem::size_of;

#[cfg(not(feature = "std"))]
use na::ComplexField; // For `ln` in no-std builds.

/// An object indexable by the tree.
///
/// The box is read once on insertion and once per leaf during
/// [`WideBvh::refit`]. The implementation must be a pure function of the
/// object's current state; it must not touch the tree.
pub trait BoundedObject {
    /// The object's current axis-aligned bounding box.
    fn bounding_box(&self) -> Aabb;
}

impl BoundedObject for Aabb {
    #[inline]
    fn bounding_box(&self) -> Aabb {
        *self
    }
}

/// Child slot code marking an empty slot.
///
/// Slot codes are tri-state: `-1` is empty, a non-negative value indexes the
/// node arena one level deeper, and any value `<= -2` is an encoded leaf.
pub(super) const EMPTY_SLOT: i32 = -1;

#[inline]
pub(super) const fn encode_leaf(leaf: u32) -> i32 {
    -(leaf as i32) - 2
}

#[inline]
pub(super) const fn decode_leaf(code: i32) -> u32 {
    (-code - 2) as u32
}

/// A tree node with a compile-time fan-out of `K` child slots.
///
/// Slots `[0, child_count)` hold live children. The remaining slots hold the
/// empty code and the invalid AABB sentinel, so scanning past `child_count`
/// reads valid (if useless) data.
#[derive(Copy, Clone, Debug)]
pub struct Node<const K: usize> {
    pub(super) bounds: [Aabb; K],
    pub(super) children: [i32; K],
    pub(super) child_count: u32,
}

impl<const K: usize> Node<K> {
    #[inline]
    pub(super) fn empty() -> Self {
        Self {
            bounds: [Aabb::new_invalid(); K],
            children: [EMPTY_SLOT; K],
            child_count: 0,
        }
    }

    /// The number of live children of this node.
    #[inline]
    pub fn child_count(&self) -> usize {
        self.child_count as usize
    }

    /// The bounds stored for child slot `i`.
    #[inline]
    pub fn child_bounds(&self, i: usize) -> &Aabb {
        &self.bounds[i]
    }

    /// The raw code stored in child slot `i`: `-1` if the slot is empty, the
    /// next-level node index if non-negative, an encoded leaf otherwise.
    #[inline]
    pub fn child_code(&self, i: usize) -> i32 {
        self.children[i]
    }

    /// Decodes slot `i` as a leaf index. Only meaningful if `child_code(i) <= -2`.
    #[inline]
    pub fn child_leaf(&self, i: usize) -> u32 {
        decode_leaf(self.children[i])
    }
}

/// The node arena for one tree depth.
#[derive(Clone, Debug)]
pub struct Level<const K: usize> {
    pub(super) nodes: Vec<Node<K>>,
}

impl<const K: usize> Level<K> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Appends `node` and returns its index in this level.
    #[inline]
    pub(super) fn add(&mut self, node: Node<K>) -> u32 {
        let index = self.nodes.len() as u32;
        self.nodes.push(node);
        index
    }

    /// The number of nodes in this level.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Is this level empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The address of one node: its depth, and its index inside that depth's arena.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeId {
    /// The depth of the level holding the node.
    pub level: u32,
    /// The index of the node inside its level.
    pub node: u32,
}

impl NodeId {
    /// The root node's address.
    pub const ROOT: NodeId = NodeId { level: 0, node: 0 };

    /// The address of node `node` at depth `level`.
    #[inline]
    pub fn new(level: u32, node: u32) -> Self {
        Self { level, node }
    }
}

/// One inserted object together with the node child slot owning its box.
#[derive(Copy, Clone, Debug)]
pub(super) struct LeafRecord<T> {
    pub(super) object: T,
    pub(super) level: u32,
    pub(super) node: u32,
    pub(super) child: u32,
}

/// Construction parameters for [`WideBvh`].
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct WideBvhDesc {
    /// Starting capacity of the leaf array and of the per-level node arenas
    /// (the latter clamped by the number of nodes a depth can hold). Must be positive.
    pub initial_leaf_capacity: usize,
    /// The number of levels preallocated at construction. Must be positive.
    pub initial_tree_depth: usize,
}

impl Default for WideBvhDesc {
    fn default() -> Self {
        Self {
            initial_leaf_capacity: 4096,
            initial_tree_depth: 8,
        }
    }
}

/// A bounding volume hierarchy whose nodes hold up to `K` children each.
///
/// `K` is a compile-time choice of 2, 4, 8, 16, or 32. Nodes live in one
/// contiguous arena per depth; leaves know the node child slot that owns their
/// box, and every slot knows whether it holds a leaf, a node one level deeper,
/// or nothing.
///
/// The tree is built incrementally with [`WideBvh::insert`], kept tight with
/// [`WideBvh::refit`], and queried with [`WideBvh::intersect_aabb`]. Mutation
/// is single-threaded; concurrent read-only queries of an otherwise untouched
/// tree are safe.
#[derive(Clone, Debug)]
pub struct WideBvh<T, const K: usize> {
    pub(super) levels: Vec<Level<K>>,
    pub(super) leaves: Vec<LeafRecord<T>>,
    pub(super) maximum_depth: usize,
}

/// A wide BVH with binary nodes.
pub type WideBvh2<T> = WideBvh<T, 2>;
/// A wide BVH with 4-wide nodes.
pub type WideBvh4<T> = WideBvh<T, 4>;
/// A wide BVH with 8-wide nodes.
pub type WideBvh8<T> = WideBvh<T, 8>;
/// A wide BVH with 16-wide nodes.
pub type WideBvh16<T> = WideBvh<T, 16>;
/// A wide BVH with 32-wide nodes.
pub type WideBvh32<T> = WideBvh<T, 32>;

impl<T, const K: usize> WideBvh<T, K> {
    /// An empty tree with the default construction parameters.
    pub fn new() -> Self {
        Self::with_desc(WideBvhDesc::default())
    }

    /// An empty tree sized according to `desc`.
    ///
    /// Panics if the fan-out is not one of 2, 4, 8, 16, or 32, or if either
    /// capacity parameter is zero.
    pub fn with_desc(desc: WideBvhDesc) -> Self {
        assert!(matches!(K, 2 | 4 | 8 | 16 | 32), "unsupported fan-out: {}", K);
        assert!(desc.initial_leaf_capacity > 0);
        assert!(desc.initial_tree_depth > 0);

        let mut levels = Vec::with_capacity(desc.initial_tree_depth);
        for depth in 0..desc.initial_tree_depth {
            levels.push(Level::with_capacity(Self::level_capacity_hint(
                desc.initial_leaf_capacity,
                depth,
            )));
        }

        // The root exists from the start, childless.
        let _ = levels[0].add(Node::empty());

        Self {
            levels,
            leaves: Vec::with_capacity(desc.initial_leaf_capacity),
            maximum_depth: 0,
        }
    }

    // A depth holds at most K^depth nodes; past roughly 1e10 potential nodes
    // the clamp no longer matters and the exponent is capped to avoid overflow.
    fn level_capacity_hint(initial_leaf_capacity: usize, depth: usize) -> usize {
        let max_exponent = (1e10f64.ln() / (K as f64).ln()) as u32;
        let width = (K as u64).saturating_pow((depth as u32).min(max_exponent));
        initial_leaf_capacity.min(width.min(usize::MAX as u64) as usize)
    }

    /// The number of leaves in this tree.
    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Does this tree contain no leaf?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// The index of the deepest level currently holding any node.
    #[inline]
    pub fn maximum_depth(&self) -> usize {
        self.maximum_depth
    }

    /// Reference to the object inserted as leaf `leaf`.
    #[inline]
    pub fn leaf(&self, leaf: u32) -> &T {
        &self.leaves[leaf as usize].object
    }

    /// Mutable reference to the object inserted as leaf `leaf`.
    ///
    /// A changed bounding box takes effect at the next [`WideBvh::refit`];
    /// until then, queries observe the previously stored box.
    #[inline]
    pub fn leaf_mut(&mut self, leaf: u32) -> &mut T {
        &mut self.leaves[leaf as usize].object
    }

    /// The box currently stored for leaf `leaf`.
    #[inline]
    pub fn leaf_aabb(&self, leaf: u32) -> Aabb {
        let record = &self.leaves[leaf as usize];
        self.levels[record.level as usize].nodes[record.node as usize].bounds
            [record.child as usize]
    }

    /// The address of the node child slot owning leaf `leaf`.
    #[inline]
    pub fn leaf_owner(&self, leaf: u32) -> (NodeId, u32) {
        let record = &self.leaves[leaf as usize];
        (NodeId::new(record.level, record.node), record.child)
    }

    /// Iterates through every leaf index and its object.
    pub fn leaves(&self) -> impl Iterator<Item = (u32, &T)> {
        self.leaves
            .iter()
            .enumerate()
            .map(|(i, record)| (i as u32, &record.object))
    }

    /// Reference to the node at `id`. Panics if no such node exists.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<K> {
        &self.levels[id.level as usize].nodes[id.node as usize]
    }

    /// The AABB bounding everything contained by this tree.
    pub fn root_aabb(&self) -> Aabb {
        let root = &self.levels[0].nodes[0];
        let mut aabb = Aabb::new_invalid();
        for i in 0..root.child_count as usize {
            aabb.merge(&root.bounds[i]);
        }
        aabb
    }

    /// Makes sure the level at `depth` exists, growing the level array by
    /// doubling if needed. New arenas inherit the deepest pre-existing
    /// level's capacity as their initial capacity.
    pub(super) fn ensure_level(&mut self, depth: usize) {
        if depth >= self.levels.len() {
            let carried = self.levels.last().map(|l| l.nodes.capacity()).unwrap_or(1);
            let target = (self.levels.len() * 2).max(depth + 1);
            while self.levels.len() < target {
                self.levels.push(Level::with_capacity(carried));
            }
        }
        if depth > self.maximum_depth {
            self.maximum_depth = depth;
        }
    }

    /// An approximation of the memory usage (in bytes) for this struct plus
    /// the memory it allocates dynamically.
    pub fn total_memory_size(&self) -> usize {
        size_of::<Self>() + self.heap_memory_size()
    }

    /// An approximation of the memory dynamically-allocated by this struct.
    pub fn heap_memory_size(&self) -> usize {
        let Self {
            levels,
            leaves,
            maximum_depth: _,
        } = self;
        levels
            .iter()
            .map(|level| level.nodes.capacity() * size_of::<Node<K>>())
            .sum::<usize>()
            + levels.capacity() * size_of::<Level<K>>()
            + leaves.capacity() * size_of::<LeafRecord<T>>()
    }
}

impl<T, const K: usize> Default for WideBvh<T, K> {
    fn default() -> Self {
        Self::new()
    }
}
