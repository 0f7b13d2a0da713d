//! A single simulation snapshot and its open/close/step state machine.
//!
//! Grounded on `original_source/include/openPMD/Iteration.hpp` and
//! `include/openPMD/IterationState.hpp` equivalents. `spec.md` §3 and §4.6
//! name overlapping but slightly different state vocabularies (`Created`/
//! `Opened`/`Parsed` vs. the streaming-focused `Default`/`Parsing`/
//! `BeginStepOngoing`); this implementation uses the §4.6 state set as the
//! single source of truth (`DESIGN.md` records this as an Open Question
//! resolution) since it is the one the transition table is actually
//! specified against.

use crate::attributable::Attributable;
use crate::container::Container;
use crate::custom_hierarchy::CustomHierarchy;
use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::particle::ParticleSpecies;
use crate::task::{AdvanceStatus, IOTask};
use crate::writable::{Arena, WritableId};

/// `spec.md` §4.6 step state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationState {
    Default,
    Parsing,
    BeginStepOngoing,
    ActiveInStep,
    ClosedInFrontend,
    ClosedInBackend,
}

#[derive(Debug, Clone)]
pub struct Iteration {
    pub(crate) writable_id: WritableId,
    pub(crate) attrs: Attributable,
    meshes_group_id: WritableId,
    particles_group_id: WritableId,
    pub(crate) meshes: Container<String, Mesh>,
    pub(crate) particles: Container<String, ParticleSpecies>,
    pub(crate) custom: CustomHierarchy,
    state: IterationState,
}

impl Iteration {
    pub fn new(
        writable_id: WritableId,
        meshes_group_id: WritableId,
        particles_group_id: WritableId,
        custom_root: WritableId,
    ) -> Self {
        Iteration {
            writable_id,
            attrs: Attributable::new(),
            meshes_group_id,
            particles_group_id,
            meshes: Container::new(),
            particles: Container::new(),
            custom: CustomHierarchy::new(custom_root),
            state: IterationState::Default,
        }
    }

    pub fn meshes_group_id(&self) -> WritableId {
        self.meshes_group_id
    }

    pub fn particles_group_id(&self) -> WritableId {
        self.particles_group_id
    }

    pub fn writable_id(&self) -> WritableId {
        self.writable_id
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn time(&self) -> Option<f64> {
        self.attrs.get_attribute_as("time")
    }

    pub fn set_time(&mut self, arena: &mut Arena, time: f64) {
        self.attrs.set_attribute(arena, self.writable_id, "time", time);
    }

    pub fn dt(&self) -> Option<f64> {
        self.attrs.get_attribute_as("dt")
    }

    pub fn set_dt(&mut self, arena: &mut Arena, dt: f64) {
        self.attrs.set_attribute(arena, self.writable_id, "dt", dt);
    }

    pub fn time_unit_si(&self) -> Option<f64> {
        self.attrs.get_attribute_as("timeUnitSI")
    }

    pub fn set_time_unit_si(&mut self, arena: &mut Arena, unit_si: f64) {
        self.attrs
            .set_attribute(arena, self.writable_id, "timeUnitSI", unit_si);
    }

    pub fn mesh(&self, name: &str) -> Option<&Mesh> {
        self.meshes.get(&name.to_string())
    }

    pub fn mesh_mut(&mut self, name: &str) -> Option<&mut Mesh> {
        self.meshes.get_mut(&name.to_string())
    }

    pub fn mesh_names(&self) -> Vec<String> {
        self.meshes.keys().cloned().collect()
    }

    pub fn mesh_or_insert(&mut self, arena: &mut Arena, name: &str) -> &mut Mesh {
        if !self.meshes.contains_key(&name.to_string()) {
            let id = arena.insert(self.meshes_group_id, name);
            self.meshes.insert(name.to_string(), Mesh::new(id));
            arena.mark_dirty(self.writable_id);
        }
        self.meshes.get_mut(&name.to_string()).unwrap()
    }

    /// Remove `name` from this iteration's meshes. If its backend object was
    /// already written, queues a delete task before the removal (`spec.md`
    /// §4.3, §4.2 guarantee 4): `DeleteDataset` if the mesh is a scalar
    /// record backed by a real (non-constant, non-empty) component,
    /// `DeletePath` otherwise.
    pub fn erase_mesh(&mut self, arena: &mut Arena, name: &str) -> Option<Mesh> {
        if let Some(mesh) = self.meshes.get(&name.to_string()) {
            let id = mesh.writable_id();
            if arena.get(id).written {
                let path = arena.path(id);
                let is_real_dataset = mesh
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
        self.meshes.remove(&name.to_string())
    }

    pub fn particle_species(&self, name: &str) -> Option<&ParticleSpecies> {
        self.particles.get(&name.to_string())
    }

    pub fn particle_species_mut(&mut self, name: &str) -> Option<&mut ParticleSpecies> {
        self.particles.get_mut(&name.to_string())
    }

    pub fn particle_species_names(&self) -> Vec<String> {
        self.particles.keys().cloned().collect()
    }

    pub fn particle_species_or_insert(&mut self, arena: &mut Arena, name: &str) -> &mut ParticleSpecies {
        if !self.particles.contains_key(&name.to_string()) {
            let id = arena.insert(self.particles_group_id, name);
            let patches_id = arena.insert(id, "particlePatches");
            self.particles
                .insert(name.to_string(), ParticleSpecies::new(id, patches_id));
            arena.mark_dirty(self.writable_id);
        }
        self.particles.get_mut(&name.to_string()).unwrap()
    }

    /// Remove `name` from this iteration's particle species. A species is
    /// always a group (it holds one or more records plus `particlePatches`,
    /// never a lone scalar dataset itself), so an already-written species
    /// always queues a `DeletePath`, never a `DeleteDataset`.
    pub fn erase_particle_species(&mut self, arena: &mut Arena, name: &str) -> Option<ParticleSpecies> {
        if let Some(species) = self.particles.get(&name.to_string()) {
            let id = species.writable_id();
            if arena.get(id).written {
                let path = arena.path(id);
                arena.queue_delete(IOTask::DeletePath { node: id, path });
            }
        }
        self.particles.remove(&name.to_string())
    }

    pub fn custom(&self) -> &CustomHierarchy {
        &self.custom
    }

    pub fn custom_mut(&mut self) -> &mut CustomHierarchy {
        &mut self.custom
    }

    fn path_for_errors(&self, arena: &Arena) -> String {
        arena.path(self.writable_id)
    }

    /// Open this iteration. Fails if it was already closed in a streaming
    /// `Series` (`spec.md` §8 "Iteration monotonicity"); random-access
    /// `Series`es may reopen freely (`allow_reopen`).
    pub fn open(&mut self, arena: &Arena, allow_reopen: bool) -> Result<()> {
        if self.state == IterationState::ClosedInBackend && !allow_reopen {
            return Err(Error::wrong_api_usage(
                self.path_for_errors(arena),
                "cannot reopen an iteration already closed in a streaming Series",
            ));
        }
        self.state = IterationState::ActiveInStep;
        Ok(())
    }

    pub fn begin_step(&mut self) {
        self.state = IterationState::BeginStepOngoing;
    }

    pub fn end_step_to_active(&mut self) {
        self.state = IterationState::ActiveInStep;
    }

    /// Transition to `ClosedInFrontend` immediately; the caller advances
    /// to `ClosedInBackend` via [`Iteration::mark_closed_in_backend`] only
    /// after the backend's flush for this iteration actually succeeds.
    pub fn begin_close(&mut self) {
        self.state = IterationState::ClosedInFrontend;
    }

    pub fn mark_closed_in_backend(&mut self) {
        self.state = IterationState::ClosedInBackend;
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self.state,
            IterationState::ClosedInFrontend | IterationState::ClosedInBackend
        )
    }
}

/// Interprets a backend's response to an `Advance` task for the
/// stateful-iterator loop (`spec.md` §4.8).
pub fn advance_allows_more_steps(status: AdvanceStatus) -> bool {
    !matches!(status, AdvanceStatus::Over)
}
