//! Particle species and their per-subdomain patch metadata.
//!
//! Grounded on `original_source/include/openPMD/ParticleSpecies.hpp` and
//! `include/ParticlePatches.hpp`.

use crate::attributable::Attributable;
use crate::container::Container;
use crate::error::Result;
use crate::record::Record;
use crate::task::IOTask;
use crate::writable::{Arena, WritableId};

/// A set of records keyed by particle identity (`position`, `momentum`,
/// `id`, `charge`, …) plus per-subdomain patch metadata.
#[derive(Debug, Clone)]
pub struct ParticleSpecies {
    pub(crate) writable_id: WritableId,
    pub(crate) attrs: Attributable,
    pub(crate) records: Container<String, Record>,
    pub(crate) particle_patches: ParticlePatches,
}

impl ParticleSpecies {
    pub fn new(writable_id: WritableId, patches_id: WritableId) -> Self {
        ParticleSpecies {
            writable_id,
            attrs: Attributable::new(),
            records: Container::new(),
            particle_patches: ParticlePatches::new(patches_id),
        }
    }

    pub fn writable_id(&self) -> WritableId {
        self.writable_id
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.get(&name.to_string())
    }

    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.get_mut(&name.to_string())
    }

    pub fn record_names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn record_or_insert(&mut self, arena: &mut Arena, name: &str) -> Result<&mut Record> {
        if !self.records.contains_key(&name.to_string()) {
            let id = arena.insert(self.writable_id, name);
            self.records.insert(name.to_string(), Record::new(id));
            arena.mark_dirty(self.writable_id);
        }
        Ok(self.records.get_mut(&name.to_string()).unwrap())
    }

    /// Remove `name` from this species. If its backend object was already
    /// written, queues a delete task before the removal (`spec.md` §4.3,
    /// §4.2 guarantee 4): `DeleteDataset` if the record is a scalar record
    /// backed by a real (non-constant, non-empty) component, `DeletePath`
    /// otherwise (a group of named components, or a constant/empty scalar
    /// that never had a backend dataset).
    pub fn erase_record(&mut self, arena: &mut Arena, name: &str) -> Option<Record> {
        if let Some(rec) = self.records.get(&name.to_string()) {
            let id = rec.writable_id();
            if arena.get(id).written {
                let path = arena.path(id);
                let is_real_dataset = rec
                    .component(crate::record_component::SCALAR)
                    .map(|c| !(c.is_constant() || c.is_empty()))
                    .unwrap_or(false);
                let task = if is_real_dataset {
                    IOTask::DeleteDataset { node: id, path }
                } else {
                    IOTask::DeletePath { node: id, path }
                };
                arena.queue_delete(task);
            }
        }
        self.records.remove(&name.to_string())
    }

    pub fn record_ids(&self) -> Vec<WritableId> {
        self.records.values().map(|r| r.writable_id()).collect()
    }

    pub fn particle_patches(&self) -> &ParticlePatches {
        &self.particle_patches
    }

    pub fn particle_patches_mut(&mut self) -> &mut ParticlePatches {
        &mut self.particle_patches
    }
}

/// Per-patch scalar records: how many particles of this species live in
/// each domain decomposition patch, and where that patch starts, as
/// openPMD standard record names (`numParticles`, `numParticlesOffset`,
/// `offset`, `extent`).
#[derive(Debug, Clone)]
pub struct ParticlePatches {
    pub(crate) writable_id: WritableId,
    pub(crate) records: Container<String, Record>,
}

pub const NUM_PARTICLES: &str = "numParticles";
pub const NUM_PARTICLES_OFFSET: &str = "numParticlesOffset";
pub const PATCH_OFFSET: &str = "offset";
pub const PATCH_EXTENT: &str = "extent";

impl ParticlePatches {
    pub fn new(writable_id: WritableId) -> Self {
        ParticlePatches {
            writable_id,
            records: Container::new(),
        }
    }

    pub fn writable_id(&self) -> WritableId {
        self.writable_id
    }

    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.get(&name.to_string())
    }

    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.get_mut(&name.to_string())
    }

    pub fn record_names(&self) -> Vec<String> {
        self.records.keys().cloned().collect()
    }

    pub fn record_or_insert(&mut self, arena: &mut Arena, name: &str) -> Result<&mut Record> {
        if !self.records.contains_key(&name.to_string()) {
            let id = arena.insert(self.writable_id, name);
            self.records.insert(name.to_string(), Record::new(id));
            arena.mark_dirty(self.writable_id);
        }
        Ok(self.records.get_mut(&name.to_string()).unwrap())
    }

    /// Number of patches, inferred from the extent of the `numParticles`
    /// scalar-component record (one value per patch).
    pub fn num_patches(&self) -> u64 {
        self.record(NUM_PARTICLES)
            .and_then(|r| r.component(crate::record_component::SCALAR))
            .map(|c| c.extent().first().copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn record_ids(&self) -> Vec<WritableId> {
        self.records.values().map(|r| r.writable_id()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writable::Arena;

    #[test]
    fn record_or_insert_creates_and_reuses() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let species_id = arena.insert(root, "e");
        let patches_id = arena.insert(species_id, "particlePatches");
        let mut species = ParticleSpecies::new(species_id, patches_id);
        species.record_or_insert(&mut arena, "position").unwrap();
        assert_eq!(species.record_names(), vec!["position".to_string()]);
        species.record_or_insert(&mut arena, "position").unwrap();
        assert_eq!(species.record_names().len(), 1);
    }

    #[test]
    fn erase_written_record_queues_a_delete_task() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let species_id = arena.insert(root, "e");
        let patches_id = arena.insert(species_id, "particlePatches");
        let mut species = ParticleSpecies::new(species_id, patches_id);
        let rec = species.record_or_insert(&mut arena, "position").unwrap();
        let comp = rec
            .component_or_insert(&mut arena, crate::record_component::SCALAR)
            .unwrap();
        comp.reset_dataset(&mut arena, crate::datatype::Datatype::Double, vec![4], None)
            .unwrap();
        let rec_id = species.record("position").unwrap().writable_id();
        arena.mark_written(rec_id);

        species.erase_record(&mut arena, "position");

        let deletes = arena.take_pending_deletes();
        assert_eq!(deletes.len(), 1);
        assert!(matches!(deletes[0], IOTask::DeleteDataset { .. }));
    }

    #[test]
    fn num_patches_reads_scalar_component_extent() {
        let mut arena = Arena::new();
        let root = arena.insert_root();
        let species_id = arena.insert(root, "e");
        let patches_id = arena.insert(species_id, "particlePatches");
        let mut patches = ParticlePatches::new(patches_id);
        let rec = patches.record_or_insert(&mut arena, NUM_PARTICLES).unwrap();
        let comp = rec
            .component_or_insert(&mut arena, crate::record_component::SCALAR)
            .unwrap();
        comp.reset_dataset(&mut arena, crate::datatype::Datatype::Ulong, vec![4], None)
            .unwrap();
        assert_eq!(patches.num_patches(), 4);
    }
}
