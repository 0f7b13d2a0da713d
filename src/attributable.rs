//! Base capability embedded by every hierarchy node: the attribute map
//! plus the bookkeeping `flush_attributes` needs to emit only the
//! attributes that actually changed since the last successful flush.
//!
//! Grounded on `original_source/include/openPMD/backend/Attributable.hpp`.
//! Per the REDESIGN FLAGS in `spec.md` §9, this is a plain struct embedded
//! by value rather than a base class; `Mesh`, `Iteration`, `Series`, …
//! each hold one as a field and forward to it, the same way the teacher's
//! `storage_v2::shard::Shard` embeds a `ShardStats` value instead of
//! inheriting behavior from a trait object.

use crate::attribute::{Attribute, FromAttribute};
use crate::task::IOTask;
use crate::writable::{Arena, WritableId};

/// Reserved attribute name for the `comment`/`set_comment` sugar.
const COMMENT_ATTR: &str = "comment";

/// Attribute map plus the snapshot needed to diff against on flush.
#[derive(Debug, Clone, Default)]
pub struct Attributable {
    attributes: crate::container::Container<String, Attribute>,
    /// Attribute values as of the last successful flush; `flush_attributes`
    /// only emits `WriteAttribute` tasks for names whose value differs
    /// from (or is absent from) this snapshot.
    last_flushed: std::collections::HashMap<String, Attribute>,
}

impl Attributable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite `name`, marking `id` (and transitively every
    /// ancestor) dirty.
    pub fn set_attribute(
        &mut self,
        arena: &mut Arena,
        id: WritableId,
        name: impl Into<String>,
        value: impl Into<Attribute>,
    ) {
        self.attributes.insert(name.into(), value.into());
        arena.mark_dirty(id);
    }

    pub fn delete_attribute(&mut self, arena: &mut Arena, id: WritableId, name: &str) -> bool {
        let removed = self.attributes.remove(&name.to_string()).is_some();
        if removed {
            self.last_flushed.remove(name);
            arena.mark_dirty(id);
        }
        removed
    }

    /// Adopt a value read back from a backend: stored both in the live map
    /// and in the last-flushed snapshot, so it does not appear as a pending
    /// write on the very next flush. Unlike [`Attributable::set_attribute`]
    /// this does not mark `id` dirty — the node mirrors the backend exactly
    /// as of this call, used while reparsing an existing hierarchy.
    pub fn load_attribute(&mut self, name: impl Into<String>, value: impl Into<Attribute>) {
        let name = name.into();
        let value = value.into();
        self.attributes.insert(name.clone(), value.clone());
        self.last_flushed.insert(name, value);
    }

    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(&name.to_string())
    }

    /// Typed read via the conversion rules of `Attribute::get`.
    pub fn get_attribute_as<U: FromAttribute>(&self, name: &str) -> Option<U> {
        self.attributes.get(&name.to_string())?.get_optional()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes.keys().cloned().collect()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(&name.to_string())
    }

    pub fn set_comment(&mut self, arena: &mut Arena, id: WritableId, comment: impl Into<String>) {
        self.set_attribute(arena, id, COMMENT_ATTR, comment.into());
    }

    pub fn comment(&self) -> Option<String> {
        self.get_attribute_as(COMMENT_ATTR)
    }

    /// Attributes whose current value differs from the last-flushed
    /// snapshot (including ones never flushed at all), as `WriteAttribute`
    /// tasks ready to enqueue against `path`/`id`.
    pub fn pending_attribute_writes(&self, id: WritableId, path: &str) -> Vec<IOTask> {
        self.attributes
            .iter()
            .filter(|(name, value)| self.last_flushed.get(*name) != Some(value))
            .map(|(name, value)| IOTask::WriteAttribute {
                node: id,
                path: path.to_string(),
                name: name.clone(),
                value: value.clone(),
            })
            .collect()
    }

    /// Call once the tasks from [`Attributable::pending_attribute_writes`]
    /// have been handed to the backend and the enclosing flush succeeded:
    /// takes a fresh snapshot so the next flush only emits further deltas.
    pub fn mark_attributes_flushed(&mut self) {
        self.last_flushed = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
    }

    pub fn has_pending_attribute_writes(&self) -> bool {
        self.attributes
            .iter()
            .any(|(name, value)| self.last_flushed.get(name) != Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Arena;

    #[test]
    fn set_attribute_marks_dirty() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        arena.clear_dirty(root, &[]);
        let mut a = Attributable::new();
        a.set_attribute(&mut arena, root, "unitSI", 1.0f64);
        assert!(arena.get(root).dirty_self);
    }

    #[test]
    fn flush_attributes_only_emits_deltas() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let mut a = Attributable::new();
        a.set_attribute(&mut arena, root, "time", 0.5f64);
        let tasks = a.pending_attribute_writes(root, "/data/0");
        assert_eq!(tasks.len(), 1);
        a.mark_attributes_flushed();
        assert!(a.pending_attribute_writes(root, "/data/0").is_empty());

        a.set_attribute(&mut arena, root, "time", 1.0f64);
        assert_eq!(a.pending_attribute_writes(root, "/data/0").len(), 1);
    }

    #[test]
    fn comment_sugar_roundtrips() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let mut a = Attributable::new();
        a.set_comment(&mut arena, root, "test run");
        assert_eq!(a.comment(), Some("test run".to_string()));
    }

    #[test]
    fn delete_attribute_reports_whether_it_existed() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let mut a = Attributable::new();
        assert!(!a.delete_attribute(&mut arena, root, "missing"));
        a.set_attribute(&mut arena, root, "unitSI", 2.0f64);
        assert!(a.delete_attribute(&mut arena, root, "unitSI"));
        assert!(a.get_attribute("unitSI").is_none());
    }
}
