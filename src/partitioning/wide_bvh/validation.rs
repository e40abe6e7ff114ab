use super::tree::{encode_leaf, WideBvh, EMPTY_SLOT};
use alloc::vec::Vec;

/// A structural defect found by the tree's integrity checker.
///
/// Any violation means the tree is corrupt: callers may log it and continue,
/// but no guarantee holds for further operations on the tree.
#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum TreeIntegrityError {
    /// A node advertises more children than the fan-out allows.
    #[error("node ({level}, {node}) has child count {child_count} above the fan-out")]
    ChildCountAboveFanOut {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
        /// The out-of-range child count.
        child_count: u32,
    },
    /// An empty slot code inside the live child range.
    #[error("node ({level}, {node}) slot {child} is empty inside the live range")]
    EmptySlotInLiveRange {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
        /// The offending slot.
        child: u32,
    },
    /// A live child code past the live child range.
    #[error("node ({level}, {node}) slot {child} holds a live code past the child count")]
    LiveCodePastChildCount {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
        /// The offending slot.
        child: u32,
    },
    /// A child code pointing outside the next level's arena, or a leaf code
    /// past the leaf array.
    #[error("node ({level}, {node}) slot {child} points to a missing target")]
    ChildOutOfBounds {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
        /// The offending slot.
        child: u32,
    },
    /// A node that is not referenced by exactly one parent slot.
    #[error("node ({level}, {node}) is not referenced by exactly one parent slot")]
    NodeNotUniquelyReferenced {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
    },
    /// A leaf whose back-reference and owning slot disagree.
    #[error("leaf {leaf} and its owner slot ({level}, {node}, {child}) disagree")]
    BackReferenceMismatch {
        /// The offending leaf.
        leaf: u32,
        /// Depth of the owner node.
        level: u32,
        /// Index of the owner node in its level.
        node: u32,
        /// The owner slot.
        child: u32,
    },
    /// A stored bound that does not enclose the bounds of the node it points to.
    #[error("node ({level}, {node}) slot {child} does not enclose its child node")]
    BoundsNotEnclosing {
        /// Depth of the offending node.
        level: u32,
        /// Index of the offending node in its level.
        node: u32,
        /// The offending slot.
        child: u32,
    },
}

impl<T, const K: usize> WideBvh<T, K> {
    /// Checks that the tree is topologically correct: child counts in range,
    /// slot codes partitioned around the child count, child indices in
    /// bounds, every node referenced by exactly one parent slot, and leaf
    /// back-references agreeing with their owner slots.
    pub fn check_well_formed_topology_only(&self) -> Result<(), TreeIntegrityError> {
        // Per-level counts of how many parent slots point at each node.
        let mut referenced: Vec<Vec<u32>> = self
            .levels
            .iter()
            .map(|level| alloc::vec![0; level.len()])
            .collect();

        for (depth, level) in self.levels.iter().enumerate() {
            for (n, node) in level.nodes.iter().enumerate() {
                let id = (depth as u32, n as u32);

                if node.child_count as usize > K {
                    return Err(TreeIntegrityError::ChildCountAboveFanOut {
                        level: id.0,
                        node: id.1,
                        child_count: node.child_count,
                    });
                }

                for i in 0..K {
                    let code = node.children[i];
                    let live = i < node.child_count as usize;

                    if !live {
                        if code != EMPTY_SLOT {
                            return Err(TreeIntegrityError::LiveCodePastChildCount {
                                level: id.0,
                                node: id.1,
                                child: i as u32,
                            });
                        }
                        continue;
                    }

                    if code == EMPTY_SLOT {
                        return Err(TreeIntegrityError::EmptySlotInLiveRange {
                            level: id.0,
                            node: id.1,
                            child: i as u32,
                        });
                    }

                    if code >= 0 {
                        let child_level = depth + 1;
                        if child_level >= self.levels.len()
                            || code as usize >= self.levels[child_level].len()
                        {
                            return Err(TreeIntegrityError::ChildOutOfBounds {
                                level: id.0,
                                node: id.1,
                                child: i as u32,
                            });
                        }
                        referenced[child_level][code as usize] += 1;
                    } else {
                        let leaf = node.child_leaf(i);
                        if leaf as usize >= self.leaves.len() {
                            return Err(TreeIntegrityError::ChildOutOfBounds {
                                level: id.0,
                                node: id.1,
                                child: i as u32,
                            });
                        }
                        let record = &self.leaves[leaf as usize];
                        if (record.level, record.node, record.child) != (id.0, id.1, i as u32) {
                            return Err(TreeIntegrityError::BackReferenceMismatch {
                                leaf,
                                level: id.0,
                                node: id.1,
                                child: i as u32,
                            });
                        }
                    }
                }
            }
        }

        // The root is the only node without a parent.
        for (depth, counts) in referenced.iter().enumerate().skip(1) {
            for (n, count) in counts.iter().enumerate() {
                if *count != 1 {
                    return Err(TreeIntegrityError::NodeNotUniquelyReferenced {
                        level: depth as u32,
                        node: n as u32,
                    });
                }
            }
        }

        // Every leaf must point at a slot holding its own code.
        for (leaf, record) in self.leaves.iter().enumerate() {
            let err = TreeIntegrityError::BackReferenceMismatch {
                leaf: leaf as u32,
                level: record.level,
                node: record.node,
                child: record.child,
            };
            let level = record.level as usize;
            if level >= self.levels.len() || record.node as usize >= self.levels[level].len() {
                return Err(err);
            }
            let node = &self.levels[level].nodes[record.node as usize];
            if record.child >= node.child_count
                || node.children[record.child as usize] != encode_leaf(leaf as u32)
            {
                return Err(err);
            }
        }

        Ok(())
    }

    /// Checks topology plus the geometry: every internal slot bound must
    /// enclose the live bounds of the node it points to.
    ///
    /// Enclosure holds after any public operation; it becomes an exact union
    /// only after [`WideBvh::refit`](crate::partitioning::WideBvh::refit).
    pub fn check_well_formed(&self) -> Result<(), TreeIntegrityError> {
        self.check_well_formed_topology_only()?;

        for depth in 0..self.maximum_depth {
            let level = &self.levels[depth];
            let child_level = &self.levels[depth + 1];
            for (n, node) in level.nodes.iter().enumerate() {
                for i in 0..node.child_count as usize {
                    let code = node.children[i];
                    if code >= 0 {
                        let child_node = &child_level.nodes[code as usize];
                        for j in 0..child_node.child_count as usize {
                            if !node.bounds[i].contains(&child_node.bounds[j]) {
                                return Err(TreeIntegrityError::BoundsNotEnclosing {
                                    level: depth as u32,
                                    node: n as u32,
                                    child: i as u32,
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Panics if the tree isn't well-formed. See [`Self::check_well_formed`].
    pub fn assert_well_formed(&self) {
        if let Err(error) = self.check_well_formed() {
            panic!("{error}");
        }
    }

    /// Panics if the tree isn't topologically correct.
    /// See [`Self::check_well_formed_topology_only`].
    pub fn assert_well_formed_topology_only(&self) {
        if let Err(error) = self.check_well_formed_topology_only() {
            panic!("{error}");
        }
    }
}
