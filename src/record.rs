//! Shared shape of `Mesh` and per-quantity particle records: a named set
//! of one-or-more typed [`RecordComponent`] axes.
//!
//! Grounded on `original_source/include/openPMD/backend/BaseRecord.hpp`,
//! the common ancestor of `Mesh` and the record type returned by
//! `ParticleSpecies::operator[]`. `spec.md` §4.5's serialization rule
//! (single scalar component shares the record's own path; multiple
//! components get a group with per-axis children) is enforced by the
//! flush engine in `series.rs`, which inspects [`Record::is_scalar`]; this
//! module only maintains the component container and the reserved-name
//! invariant.

use crate::container::Container;
use crate::error::{Error, Result};
use crate::record_component::{RecordComponent, SCALAR};
use crate::task::IOTask;
use crate::writable::{Arena, WritableId};

/// A named physical quantity composed of one or more typed components.
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) writable_id: WritableId,
    pub(crate) components: Container<String, RecordComponent>,
}

impl Record {
    pub fn new(writable_id: WritableId) -> Self {
        Record {
            writable_id,
            components: Container::new(),
        }
    }

    pub fn writable_id(&self) -> WritableId {
        self.writable_id
    }

    /// Exactly one child named `SCALAR`, or any number of non-`SCALAR`
    /// children — never both (`spec.md` §4.4).
    pub fn is_scalar(&self) -> bool {
        self.components.len() == 1 && self.components.contains_key(&SCALAR.to_string())
    }

    pub fn component(&self, name: &str) -> Option<&RecordComponent> {
        self.components.get(&name.to_string())
    }

    pub fn component_mut(&mut self, name: &str) -> Option<&mut RecordComponent> {
        self.components.get_mut(&name.to_string())
    }

    pub fn component_names(&self) -> Vec<String> {
        self.components.keys().cloned().collect()
    }

    pub fn component_ids(&self) -> Vec<WritableId> {
        self.components.values().map(|c| c.writable_id()).collect()
    }

    /// Get-or-create `name` as a fresh, not-yet-configured component.
    /// Enforces the scalar/non-scalar exclusivity: creating `SCALAR` when
    /// other components already exist (or vice versa) fails.
    pub fn component_or_insert(
        &mut self,
        arena: &mut Arena,
        name: &str,
    ) -> Result<&mut RecordComponent> {
        if !self.components.contains_key(&name.to_string()) {
            if name == SCALAR && !self.components.is_empty() {
                return Err(Error::wrong_api_usage(
                    arena.path(self.writable_id),
                    "cannot add a SCALAR component to a record that already has named components",
                ));
            }
            if name != SCALAR && self.components.contains_key(&SCALAR.to_string()) {
                return Err(Error::wrong_api_usage(
                    arena.path(self.writable_id),
                    "cannot add a named component to a record that already has a SCALAR component",
                ));
            }
            let id = arena.insert(self.writable_id, name);
            self.components.insert(name.to_string(), RecordComponent::new(id));
            arena.mark_dirty(self.writable_id);
        }
        Ok(self.components.get_mut(&name.to_string()).unwrap())
    }

    /// Remove `name` from this record. If its backend object was already
    /// written, queues a delete task (`DeletePath` for constant/empty
    /// components, which never have a real dataset; `DeleteDataset`
    /// otherwise) so the next flush tears it down (`spec.md` §4.3, §4.2
    /// guarantee 4).
    pub fn erase_component(&mut self, arena: &mut Arena, name: &str) -> Option<RecordComponent> {
        let flatten = self.is_scalar() && name == SCALAR;
        if let Some(comp) = self.components.get(&name.to_string()) {
            let id = comp.writable_id();
            if arena.get(id).written {
                let path_id = if flatten { self.writable_id } else { id };
                let path = arena.path(path_id);
                let task = if comp.is_constant() || comp.is_empty() {
                    IOTask::DeletePath { node: id, path }
                } else {
                    IOTask::DeleteDataset { node: id, path }
                };
                arena.queue_delete(task);
            }
        }
        self.components.remove(&name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Arena;

    fn new_record() -> (Arena, Record) {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let id = arena.insert(root, "E");
        (arena, Record::new(id))
    }

    #[test]
    fn scalar_and_named_components_are_mutually_exclusive() {
        let (mut arena, mut r) = new_record();
        r.component_or_insert(&mut arena, "x").unwrap();
        assert!(r.component_or_insert(&mut arena, SCALAR).is_err());
    }

    #[test]
    fn scalar_component_detection() {
        let (mut arena, mut r) = new_record();
        r.component_or_insert(&mut arena, SCALAR).unwrap();
        assert!(r.is_scalar());
    }

    #[test]
    fn named_components_reject_scalar_after_the_fact() {
        let (mut arena, mut r) = new_record();
        r.component_or_insert(&mut arena, SCALAR).unwrap();
        assert!(r.component_or_insert(&mut arena, "x").is_err());
    }

    #[test]
    fn erase_unwritten_component_queues_no_delete() {
        let (mut arena, mut r) = new_record();
        r.component_or_insert(&mut arena, "x").unwrap();
        r.erase_component(&mut arena, "x");
        assert!(arena.take_pending_deletes().is_empty());
    }

    #[test]
    fn erase_written_component_queues_delete_dataset() {
        let (mut arena, mut r) = new_record();
        let comp = r.component_or_insert(&mut arena, "x").unwrap();
        comp.reset_dataset(&mut arena, crate::datatype::Datatype::Double, vec![4], None)
            .unwrap();
        let id = comp.writable_id();
        arena.mark_written(id);

        r.erase_component(&mut arena, "x");

        let deletes = arena.take_pending_deletes();
        assert_eq!(deletes.len(), 1);
        assert!(matches!(deletes[0], IOTask::DeleteDataset { .. }));
    }

    #[test]
    fn erase_written_constant_component_queues_delete_path_not_dataset() {
        let (mut arena, mut r) = new_record();
        let comp = r.component_or_insert(&mut arena, "x").unwrap();
        comp.reset_dataset(&mut arena, crate::datatype::Datatype::Double, vec![4], None)
            .unwrap();
        comp.make_constant(&mut arena, 1.0f64).unwrap();
        let id = comp.writable_id();
        arena.mark_written(id);

        r.erase_component(&mut arena, "x");

        let deletes = arena.take_pending_deletes();
        assert_eq!(deletes.len(), 1);
        assert!(matches!(deletes[0], IOTask::DeletePath { .. }));
    }
}
