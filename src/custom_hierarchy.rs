//! Arbitrary user-named subgroups discovered at read time, outside the
//! standard `meshes`/`particles` paths.
//!
//! Grounded on `original_source/src/CustomHierarchy.cpp`: a hierarchy
//! node that recursively holds either further named subgroups or leaf
//! datasets, with meshes/particles path detection done by the parser
//! (here: `Series::parse_iteration`) rather than by this type itself —
//! `CustomHierarchy` only models the generic recursive shape.

use crate::attributable::Attributable;
use crate::container::Container;
use crate::error::Result;
use crate::record_component::RecordComponent;
use crate::writable::{Arena, WritableId};

#[derive(Debug, Clone)]
pub struct CustomHierarchy {
    pub(crate) writable_id: WritableId,
    pub(crate) attrs: Attributable,
    pub(crate) groups: Container<String, CustomHierarchy>,
    pub(crate) datasets: Container<String, RecordComponent>,
}

impl CustomHierarchy {
    pub fn new(writable_id: WritableId) -> Self {
        CustomHierarchy {
            writable_id,
            attrs: Attributable::new(),
            groups: Container::new(),
            datasets: Container::new(),
        }
    }

    pub fn writable_id(&self) -> WritableId {
        self.writable_id
    }

    pub fn group(&self, name: &str) -> Option<&CustomHierarchy> {
        self.groups.get(&name.to_string())
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut CustomHierarchy> {
        self.groups.get_mut(&name.to_string())
    }

    pub fn group_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn group_or_insert(&mut self, arena: &mut Arena, name: &str) -> Result<&mut CustomHierarchy> {
        if !self.groups.contains_key(&name.to_string()) {
            let id = arena.insert(self.writable_id, name);
            self.groups.insert(name.to_string(), CustomHierarchy::new(id));
            arena.mark_dirty(self.writable_id);
        }
        Ok(self.groups.get_mut(&name.to_string()).unwrap())
    }

    pub fn dataset(&self, name: &str) -> Option<&RecordComponent> {
        self.datasets.get(&name.to_string())
    }

    pub fn dataset_mut(&mut self, name: &str) -> Option<&mut RecordComponent> {
        self.datasets.get_mut(&name.to_string())
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.datasets.keys().cloned().collect()
    }

    pub fn dataset_or_insert(&mut self, arena: &mut Arena, name: &str) -> Result<&mut RecordComponent> {
        if !self.datasets.contains_key(&name.to_string()) {
            let id = arena.insert(self.writable_id, name);
            self.datasets.insert(name.to_string(), RecordComponent::new(id));
            arena.mark_dirty(self.writable_id);
        }
        Ok(self.datasets.get_mut(&name.to_string()).unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.datasets.is_empty()
    }

    /// Writable ids of every direct child, for the flush engine's bottom-up
    /// `Arena::clear_dirty` bookkeeping.
    pub fn child_ids(&self) -> Vec<WritableId> {
        self.groups
            .values()
            .map(|g| g.writable_id())
            .chain(self.datasets.values().map(|d| d.writable_id()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Arena;

    #[test]
    fn nested_groups_and_datasets_coexist() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let id = arena.insert(root, "extra");
        let mut h = CustomHierarchy::new(id);
        h.group_or_insert(&mut arena, "sub").unwrap();
        h.dataset_or_insert(&mut arena, "leaf").unwrap();
        assert_eq!(h.group_names(), vec!["sub".to_string()]);
        assert_eq!(h.dataset_names(), vec!["leaf".to_string()]);
        assert!(!h.is_empty());
    }
}
