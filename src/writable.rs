//! The arena-indexed node shared by every object in the hierarchy.
//!
//! Grounded on `original_source/include/openPMD/backend/Writable.hpp`: the
//! C++ type links every frontend object (`Iteration`, `Mesh`,
//! `RecordComponent`, …) to its backend counterpart through a shared
//! position, a dirty/written bookkeeping pair, and a parent pointer. Here
//! the graph of parent pointers becomes a graph of [`WritableId`]s into a
//! single [`Arena`] owned by the `Series`, following the teacher's
//! preference for numeric-id-keyed storage (`storage_v2`'s segment/record
//! ids) over a pointer/`Rc` graph.

use std::collections::HashMap;

use crate::task::IOTask;

/// Opaque index into a [`Arena`]. Stable for the lifetime of the arena;
/// never reused even after the referenced node is logically removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WritableId(u32);

impl WritableId {
    /// The id of the `Series` root, always the first node allocated.
    pub const ROOT: WritableId = WritableId(0);
}

/// Mirrors the structure of logical data against persistent data in a
/// backend: a dirty/written state pair plus a link to the parent node.
#[derive(Debug, Clone)]
pub struct Writable {
    pub parent: Option<WritableId>,
    /// Key such that `arena[parent].child(own_key_within_parent) == self`.
    pub own_key_within_parent: String,
    /// Unwritten changes exist for this node specifically.
    pub dirty_self: bool,
    /// Unwritten changes exist somewhere in the subtree rooted here.
    ///
    /// Invariant: `dirty_self` on any descendant implies `dirty_recursive`
    /// on every ancestor up to the root.
    pub dirty_recursive: bool,
    /// The backend has been made aware of this node (its path/group/dataset
    /// has been created). Monotonic: once `true`, never reset to `false`.
    pub written: bool,
}

impl Writable {
    fn new(parent: Option<WritableId>, own_key_within_parent: impl Into<String>) -> Self {
        Writable {
            parent,
            own_key_within_parent: own_key_within_parent.into(),
            dirty_self: true,
            dirty_recursive: true,
            written: false,
        }
    }
}

/// Owns every [`Writable`] in a `Series`, addressed by [`WritableId`].
///
/// A plain `Vec` rather than a generational slab: nodes are never removed
/// from the arena (erasing a container entry removes it from its parent's
/// `Container` but the `Writable` bookkeeping entry is retained so that any
/// already-issued [`WritableId`] stays valid for the remainder of the
/// `Series`'s lifetime, matching `written`'s monotonic "never unwritten"
/// contract).
#[derive(Debug, Default)]
pub struct Arena {
    nodes: Vec<Writable>,
    /// Delete tasks for children already removed from their logical
    /// container (`erase_*` methods) but whose backend object, if any, is
    /// only actually torn down the next time [`crate::series::Series::flush`]
    /// runs. Stored here rather than on the now-detached child itself,
    /// since the child's own `Writable` entry is never removed (see the
    /// struct docs above).
    pending_deletes: Vec<IOTask>,
}

impl Arena {
    pub fn new() -> Self {
        Arena {
            nodes: Vec::new(),
            pending_deletes: Vec::new(),
        }
    }

    /// Allocate the `Series` root node. Must be called exactly once, first.
    pub fn insert_root(&mut self) -> WritableId {
        assert!(self.nodes.is_empty(), "arena root already allocated");
        self.nodes.push(Writable::new(None, ""));
        WritableId::ROOT
    }

    pub fn insert(&mut self, parent: WritableId, own_key_within_parent: impl Into<String>) -> WritableId {
        let id = WritableId(self.nodes.len() as u32);
        self.nodes.push(Writable::new(Some(parent), own_key_within_parent));
        id
    }

    pub fn get(&self, id: WritableId) -> &Writable {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: WritableId) -> &mut Writable {
        &mut self.nodes[id.0 as usize]
    }

    /// Mark `id` dirty, then walk ancestors marking `dirty_recursive` until
    /// reaching a node that is already `dirty_recursive` (already implies
    /// the rest of the chain up to the root is too).
    pub fn mark_dirty(&mut self, id: WritableId) {
        self.get_mut(id).dirty_self = true;
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            let node = self.get_mut(node_id);
            if node.dirty_recursive {
                break;
            }
            node.dirty_recursive = true;
            cur = node.parent;
        }
    }

    /// Clear `dirty_self` and, if no children remain dirty, `dirty_recursive`
    /// too. `children` enumerates the ids to check for remaining dirt; the
    /// flush engine calls this bottom-up after a node's own writes and all
    /// of its children's flushes have succeeded.
    pub fn clear_dirty(&mut self, id: WritableId, children: &[WritableId]) {
        let any_child_dirty = children.iter().any(|&c| self.get(c).dirty_recursive);
        let node = self.get_mut(id);
        node.dirty_self = false;
        if !any_child_dirty {
            node.dirty_recursive = false;
        }
    }

    pub fn mark_written(&mut self, id: WritableId) {
        self.get_mut(id).written = true;
    }

    /// Queue a delete task for a child already removed from its container.
    /// Per the ordering guarantee that a node's delete drains any prior
    /// pending tasks on that same node, any earlier pending delete for the
    /// same [`WritableId`] is dropped in favor of this one.
    pub fn queue_delete(&mut self, task: IOTask) {
        let node = task.node();
        self.pending_deletes.retain(|t| t.node() != node);
        self.pending_deletes.push(task);
    }

    /// Drain every delete task queued by `erase_*` methods since the last
    /// flush, in the order they were queued.
    pub fn take_pending_deletes(&mut self) -> Vec<IOTask> {
        std::mem::take(&mut self.pending_deletes)
    }

    pub fn path_components(&self, id: WritableId) -> Vec<String> {
        let mut parts = Vec::new();
        let mut cur = Some(id);
        while let Some(node_id) = cur {
            let node = self.get(node_id);
            if node.parent.is_some() {
                parts.push(node.own_key_within_parent.clone());
            }
            cur = node.parent;
        }
        parts.reverse();
        parts
    }

    /// Slash-joined path from the root, e.g. `/data/0/meshes/E/x`.
    pub fn path(&self, id: WritableId) -> String {
        format!("/{}", self.path_components(id).join("/"))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Child-name to [`WritableId`] lookup kept alongside each container node;
/// separate from [`Arena`] since not every `Writable` owns a `Container`.
pub type ChildIndex = HashMap<String, WritableId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent_and_empty_path() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        assert_eq!(arena.get(root).parent, None);
        assert_eq!(arena.path(root), "/");
    }

    #[test]
    fn dirty_propagates_to_root() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let iter0 = arena.insert(root, "0");
        let mesh = arena.insert(iter0, "E");
        arena.clear_dirty(mesh, &[]);
        arena.clear_dirty(iter0, &[mesh]);
        arena.clear_dirty(root, &[iter0]);
        assert!(!arena.get(root).dirty_recursive);

        arena.mark_dirty(mesh);
        assert!(arena.get(mesh).dirty_self);
        assert!(arena.get(iter0).dirty_recursive);
        assert!(arena.get(root).dirty_recursive);
        assert!(!arena.get(iter0).dirty_self);
    }

    #[test]
    fn clear_dirty_respects_remaining_dirty_children() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let a = arena.insert(root, "a");
        let b = arena.insert(root, "b");
        arena.clear_dirty(a, &[]);
        // b still dirty: root must stay dirty_recursive.
        arena.clear_dirty(root, &[a, b]);
        assert!(arena.get(root).dirty_recursive);
    }

    #[test]
    fn path_joins_keys_from_root() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let iter0 = arena.insert(root, "0");
        let mesh = arena.insert(iter0, "E");
        let comp = arena.insert(mesh, "x");
        assert_eq!(arena.path(comp), "/0/E/x");
    }

    #[test]
    fn written_is_tracked_per_node() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        assert!(!arena.get(root).written);
        arena.mark_written(root);
        assert!(arena.get(root).written);
    }
}
