//! In-memory mirror of the top tree levels.
//!
//! After build, the topmost `levels` of the arena tree are relabeled in
//! level order into one flat array with a contiguous float buffer, so the
//! upper descent touches sequential memory instead of scattered arena
//! offsets. Every mirror node remembers the arena id it was copied from.
//!
//! Child fields of relabeled nodes hold mirror positions. Nodes on the
//! deepest mirrored level are left unprocessed and keep their arena child
//! ids; a search that runs past the mirror depth therefore resumes in the
//! arena exactly where the mirror stopped.
//!
//! The transform is pure and idempotent: rebuilding from the same built
//! tree yields identical contents.

use std::collections::VecDeque;

use crate::arena::{DurableArena, NO_CHILD};
use crate::error::Result;

/// A flattened copy of one arena node.
#[derive(Debug, Clone, Copy)]
pub struct MirrorNode {
    /// Left child: mirror position, or an arena id on the deepest level.
    pub left: i32,
    /// Right child: mirror position, or an arena id on the deepest level.
    pub right: i32,
    /// Originating arena node id.
    pub origin: i32,
    /// Hyperplane offset term.
    pub alpha: f32,
}

/// Compact level-order copy of the tree's top levels.
pub struct MirrorTree {
    levels: u32,
    dimensionality: usize,
    nodes: Vec<MirrorNode>,
    values: Vec<f32>,
}

impl MirrorTree {
    /// Breadth-first relabeling of the built tree's top `levels` levels.
    pub fn build(arena: &DurableArena, levels: u32) -> Result<Self> {
        let dimensionality = arena.dimensionality();
        let mut mirror = Self {
            levels,
            dimensionality,
            nodes: Vec::new(),
            values: Vec::new(),
        };

        let root_slot = mirror.copy_node(arena, arena.root())?;
        debug_assert_eq!(root_slot, 0);

        let mut queue = VecDeque::new();
        queue.push_back(root_slot);

        let mut current_level = 1u32;
        while !queue.is_empty() && current_level < levels {
            for _ in 0..queue.len() {
                let Some(slot) = queue.pop_front() else {
                    break;
                };
                let left = mirror.nodes[slot].left;
                if left != NO_CHILD {
                    let child_slot = mirror.copy_node(arena, left as i64)?;
                    mirror.nodes[slot].left = child_slot as i32;
                    queue.push_back(child_slot);
                }
                let right = mirror.nodes[slot].right;
                if right != NO_CHILD {
                    let child_slot = mirror.copy_node(arena, right as i64)?;
                    mirror.nodes[slot].right = child_slot as i32;
                    queue.push_back(child_slot);
                }
            }
            current_level += 1;
        }

        tracing::debug!(
            nodes = mirror.nodes.len(),
            levels = current_level,
            "built mirror tree"
        );
        Ok(mirror)
    }

    fn copy_node(&mut self, arena: &DurableArena, arena_id: i64) -> Result<usize> {
        let node = arena.node(arena_id)?;
        let slot = self.nodes.len();
        self.nodes.push(MirrorNode {
            left: node.left,
            right: node.right,
            origin: arena_id as i32,
            alpha: node.alpha,
        });
        self.values.extend_from_slice(node.vector);
        Ok(slot)
    }

    /// Mirrored level bound.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Number of mirrored nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the mirror holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at a mirror position.
    #[inline]
    pub fn node(&self, slot: usize) -> &MirrorNode {
        &self.nodes[slot]
    }

    /// Float payload of the node at a mirror position.
    #[inline]
    pub fn vector(&self, slot: usize) -> &[f32] {
        let start = slot * self.dimensionality;
        &self.values[start..start + self.dimensionality]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    /// Arena with three leaves and two splits:
    ///
    /// ```text
    ///        4
    ///       / \
    ///      3   2
    ///     / \
    ///    0   1
    /// ```
    fn build_fixture(path: &std::path::Path) -> DurableArena {
        let config = IndexConfig::new(2).with_capacity(8);
        let mut arena = DurableArena::open(path, &config).unwrap();
        for i in 0..3 {
            let id = arena.allocate_node().unwrap();
            arena.write_leaf(id, &[i as f32, 0.0]).unwrap();
        }
        arena.set_n_items(3);
        let inner = arena.allocate_node().unwrap();
        arena.write_split(inner, 0, 1, 0.5, &[1.0, 0.0]).unwrap();
        let root = arena.allocate_node().unwrap();
        arena
            .write_split(root, inner as i32, 2, -0.5, &[0.0, 1.0])
            .unwrap();
        arena.commit_build(root).unwrap();
        arena
    }

    #[test]
    fn test_level_order_relabeling() {
        let dir = tempfile::tempdir().unwrap();
        let arena = build_fixture(&dir.path().join("arena.pann"));

        let mirror = MirrorTree::build(&arena, 22).unwrap();
        assert_eq!(mirror.len(), 5);

        // Root is slot 0 and keeps its arena identity in `origin`.
        let root = mirror.node(0);
        assert_eq!(root.origin, 4);
        // Level order: root's children fill slots 1 and 2.
        assert_eq!(root.left, 1);
        assert_eq!(root.right, 2);
        assert_eq!(mirror.node(1).origin, 3);
        assert_eq!(mirror.node(2).origin, 2);
        // The leaf copied from arena node 2 keeps its sentinel children.
        assert_eq!(mirror.node(2).left, NO_CHILD);
        assert_eq!(mirror.node(2).right, NO_CHILD);
        // Vectors travel with the nodes.
        assert_eq!(mirror.vector(2), &[2.0, 0.0]);
        assert_eq!(mirror.vector(0), &[0.0, 1.0]);
    }

    #[test]
    fn test_frontier_keeps_arena_child_ids() {
        let dir = tempfile::tempdir().unwrap();
        let arena = build_fixture(&dir.path().join("arena.pann"));

        // Two levels: root (level 1) is processed, its children (level 2)
        // are copied but not processed.
        let mirror = MirrorTree::build(&arena, 2).unwrap();
        assert_eq!(mirror.len(), 3);
        // Slot 1 mirrors arena node 3; its children still point into the
        // arena (leaves 0 and 1) so search can fall through.
        assert_eq!(mirror.node(1).origin, 3);
        assert_eq!(mirror.node(1).left, 0);
        assert_eq!(mirror.node(1).right, 1);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let arena = build_fixture(&dir.path().join("arena.pann"));

        let a = MirrorTree::build(&arena, 22).unwrap();
        let b = MirrorTree::build(&arena, 22).unwrap();
        assert_eq!(a.len(), b.len());
        for slot in 0..a.len() {
            let (x, y) = (a.node(slot), b.node(slot));
            assert_eq!(x.left, y.left);
            assert_eq!(x.right, y.right);
            assert_eq!(x.origin, y.origin);
            assert_eq!(x.alpha, y.alpha);
            assert_eq!(a.vector(slot), b.vector(slot));
        }
    }

    #[test]
    fn test_single_leaf_tree() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::new(2).with_capacity(4);
        let mut arena = DurableArena::open(&dir.path().join("arena.pann"), &config).unwrap();
        let id = arena.allocate_node().unwrap();
        arena.write_leaf(id, &[7.0, 7.0]).unwrap();
        arena.set_n_items(1);
        arena.commit_build(id).unwrap();

        let mirror = MirrorTree::build(&arena, 22).unwrap();
        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.node(0).left, NO_CHILD);
        assert_eq!(mirror.node(0).origin, 0);
    }
}
