//! Per-subdomain particle storage for a single species, and the lifecycle
//! operations driving it.

pub mod injection;
pub mod restart;

use crate::{
    deposit::{CurrentDepositor3, EsirkepovDepositor},
    error::{ContainerError, ParticleFault},
    evolve::{EvolveReport, EvolveSettings, LevelCoordinator, MigrationRecord},
    field::{BoxArray3, BoxFields, CurrentArrays},
    grid::decomposition::{Decomposition, MeshContext},
    num::fpa,
    particles::{Particle, ParticleId, ParticleTile},
    push::{ParticleConstants, PusherKind},
    shape::ShapeOrder,
};
use injection::ParticleInjector;
use rayon::prelude::*;
use restart::{ParticleCheckpoint, RestartRequirement};
use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// How particles of a species interact with the fields.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum SpeciesKind {
    /// Charged particles pushed by the fields and depositing current.
    Physical,
    /// Particles moving ballistically without field coupling or deposition
    /// until they reach the given z-coordinate.
    RigidInjected { injection_plane_z: fpa },
    /// Uncharged particles moving at the speed of light along their momentum.
    Photon,
}

impl SpeciesKind {
    /// What the kind needs by default after a restart.
    pub fn default_restart_requirement(&self) -> RestartRequirement {
        match self {
            Self::Physical | Self::Photon => RestartRequirement::RepopulateOnly,
            Self::RigidInjected { .. } => RestartRequirement::RepopulateAndRecompute,
        }
    }
}

impl fmt::Display for SpeciesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Physical => write!(f, "physical"),
            Self::RigidInjected { injection_plane_z } => {
                write!(f, "rigid-injected (plane at z = {})", injection_plane_z)
            }
            Self::Photon => write!(f, "photon"),
        }
    }
}

/// Immutable properties of a species.
#[derive(Clone, Debug, PartialEq)]
pub struct SpeciesProperties {
    name: String,
    kind: SpeciesKind,
    constants: ParticleConstants,
    shape_order: ShapeOrder,
    pusher: PusherKind,
    restart_requirement: RestartRequirement,
}

impl SpeciesProperties {
    /// Creates properties using the Boris pusher and the default restart
    /// requirement of the species kind.
    pub fn new<S: Into<String>>(
        name: S,
        kind: SpeciesKind,
        constants: ParticleConstants,
        shape_order: ShapeOrder,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            constants,
            shape_order,
            pusher: PusherKind::default(),
            restart_requirement: kind.default_restart_requirement(),
        }
    }

    pub fn with_pusher(mut self, pusher: PusherKind) -> Self {
        self.pusher = pusher;
        self
    }

    pub fn with_restart_requirement(mut self, restart_requirement: RestartRequirement) -> Self {
        self.restart_requirement = restart_requirement;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SpeciesKind {
        self.kind
    }

    pub fn constants(&self) -> &ParticleConstants {
        &self.constants
    }

    pub fn shape_order(&self) -> ShapeOrder {
        self.shape_order
    }

    pub fn pusher(&self) -> PusherKind {
        self.pusher
    }

    pub fn restart_requirement(&self) -> RestartRequirement {
        self.restart_requirement
    }
}

/// Lifecycle state of a species container.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerState {
    Uninitialized,
    Allocated,
    Populated,
    Evolving,
    Restarted,
}

impl ContainerState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Allocated => "allocated",
            Self::Populated => "populated",
            Self::Evolving => "evolving",
            Self::Restarted => "restarted",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Particle storage of one species on the calling rank, with one tile per
/// locally owned box on every level.
#[derive(Clone, Debug)]
pub struct SpeciesContainer {
    properties: SpeciesProperties,
    state: ContainerState,
    tiles: Vec<Vec<ParticleTile>>,
    decomposition: Option<Decomposition>,
    next_particle_number: u64,
}

impl SpeciesContainer {
    pub fn new(properties: SpeciesProperties) -> Self {
        Self {
            properties,
            state: ContainerState::Uninitialized,
            tiles: Vec::new(),
            decomposition: None,
            next_particle_number: 0,
        }
    }

    pub fn properties(&self) -> &SpeciesProperties {
        &self.properties
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    pub fn number_of_levels(&self) -> usize {
        self.tiles.len()
    }

    /// Returns the tiles of the given level in local box order, or an empty
    /// slice if the level has no storage.
    pub fn tiles(&self, level: usize) -> &[ParticleTile] {
        self.tiles.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn number_of_particles(&self) -> usize {
        self.tiles
            .iter()
            .flatten()
            .map(ParticleTile::len)
            .sum()
    }

    /// Returns an iterator over all particles on all levels.
    pub fn particles(&self) -> impl Iterator<Item = &Particle> {
        self.tiles
            .iter()
            .flatten()
            .flat_map(|tile| tile.particles().iter())
    }

    /// (Re)creates the tiles for the local boxes of the given mesh context.
    ///
    /// Does nothing if the storage already matches the decomposition. Otherwise
    /// existing particles are re-binned into the new tiles.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the particles not owned by the calling rank under the
    /// new decomposition, which must be redistributed by the caller.
    /// - `Err`: Never returned for a consistent mesh context.
    pub fn alloc_data(&mut self, context: &MeshContext) -> Result<Vec<Particle>, ContainerError> {
        if self.decomposition.as_ref() == Some(context.decomposition()) {
            return Ok(Vec::new());
        }
        let existing: Vec<(usize, Vec<Particle>)> = self
            .tiles
            .iter_mut()
            .enumerate()
            .flat_map(|(level, level_tiles)| {
                level_tiles
                    .iter_mut()
                    .map(move |tile| (level, tile.take_all()))
            })
            .collect();

        self.tiles = (0..context.number_of_levels())
            .map(|level| {
                context
                    .local_box_indices(level)
                    .into_iter()
                    .map(|box_index| ParticleTile::new(level, box_index))
                    .collect()
            })
            .collect();
        self.decomposition = Some(context.decomposition().clone());

        let mut unowned = Vec::new();
        for (level, particles) in existing {
            unowned.extend(self.insert_particles(context, level, particles)?);
        }

        if self.state == ContainerState::Uninitialized {
            self.state = ContainerState::Allocated;
        }
        Ok(unowned)
    }

    /// Populates the local tiles with particles produced by the given injector.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the number of injected particles.
    /// - `Err`: The container is not allocated for the current decomposition,
    /// or the injector placed a particle outside its box or produced a
    /// non-positive weight or a non-finite momentum. Particles injected
    /// before the failure are kept.
    pub fn init_data<I: ParticleInjector>(
        &mut self,
        context: &MeshContext,
        injector: &mut I,
    ) -> Result<usize, ContainerError> {
        self.require_state("initialize data", &[
            ContainerState::Allocated,
            ContainerState::Populated,
            ContainerState::Evolving,
            ContainerState::Restarted,
        ])?;
        self.require_current_decomposition(context)?;

        let origin = context.rank() as u32;
        let mut n_injected = 0;
        for (level, level_tiles) in self.tiles.iter_mut().enumerate() {
            let geometry = context.level(level);
            for tile in level_tiles.iter_mut() {
                let index_box = *context.decomposition().boxes(level)[tile.box_index()].index_box();
                for injected in injector.inject(level, geometry, &index_box) {
                    if !index_box.contains_cell_coords(&geometry.cell_coords(&injected.position)) {
                        return Err(ContainerError::InjectionOutsideBox {
                            level,
                            box_index: tile.box_index(),
                            position: injected.position,
                        });
                    }
                    if !(injected.weight > 0.0) || !injected.momentum.is_finite() {
                        return Err(ContainerError::InvalidInjectedParticle {
                            level,
                            box_index: tile.box_index(),
                            position: injected.position,
                            momentum: injected.momentum,
                            weight: injected.weight,
                        });
                    }
                    tile.push(Particle::new(
                        injected.position,
                        injected.momentum,
                        injected.weight,
                        ParticleId::new(self.next_particle_number, origin),
                    ));
                    self.next_particle_number += 1;
                    n_injected += 1;
                }
            }
        }

        if self.state == ContainerState::Allocated {
            self.state = ContainerState::Populated;
        }
        Ok(n_injected)
    }

    /// Advances all particles on the given level by one time step, adding
    /// their currents to the given arrays.
    ///
    /// # Parameters
    ///
    /// - `context`: Mesh context the storage was allocated for.
    /// - `level`: Refinement level to evolve.
    /// - `fields`: Field views of the local boxes of the level, in local box order.
    /// - `currents`: Current arrays of the local boxes of the level, in local box order.
    /// - `settings`: Time step, boundary conditions and fault policy.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains a report of flagged migrations, absorbed particles and
    /// aggregated faults.
    /// - `Err`: The container or inputs are inconsistent, or a particle fault
    /// aborted the step. Nothing was changed in that case.
    pub fn evolve(
        &mut self,
        context: &MeshContext,
        level: usize,
        fields: &[BoxFields],
        currents: &mut [CurrentArrays],
        settings: &EvolveSettings,
    ) -> Result<EvolveReport, ContainerError> {
        self.require_state("evolve", &[
            ContainerState::Populated,
            ContainerState::Evolving,
            ContainerState::Restarted,
        ])?;
        self.require_current_decomposition(context)?;
        if level >= context.number_of_levels() || level >= self.tiles.len() {
            return Err(ContainerError::MissingLevel { level });
        }
        let level_tiles = &mut self.tiles[level];
        for actual in [fields.len(), currents.len()] {
            if actual != level_tiles.len() {
                return Err(ContainerError::MismatchedBoxData {
                    level,
                    expected: level_tiles.len(),
                    actual,
                });
            }
        }

        let report = LevelCoordinator::for_species(&self.properties).evolve_level(
            &self.properties,
            context,
            level,
            level_tiles,
            fields,
            currents,
            settings,
        )?;
        self.state = ContainerState::Evolving;
        Ok(report)
    }

    /// Replaces the particles with those of the given checkpoint.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the restart requirement of the species. If it asks for
    /// recomputation, the next particle number has been raised above every
    /// restored number of this rank, and the caller should recompute grid
    /// quantities like the charge density.
    /// - `Err`: The container is not allocated for the current decomposition,
    /// the checkpoint does not match it, or it holds a particle with a
    /// non-positive weight or a non-finite position or momentum. The
    /// container is left unchanged in that case.
    pub fn post_restart(
        &mut self,
        context: &MeshContext,
        checkpoint: ParticleCheckpoint,
    ) -> Result<RestartRequirement, ContainerError> {
        self.require_state("restart", &[
            ContainerState::Allocated,
            ContainerState::Populated,
            ContainerState::Evolving,
            ContainerState::Restarted,
        ])?;
        self.require_current_decomposition(context)?;
        if checkpoint.species_name() != self.properties.name() {
            return Err(ContainerError::InconsistentCheckpoint(format!(
                "checkpoint is for species {}, not {}",
                checkpoint.species_name(),
                self.properties.name()
            )));
        }

        let mut restored: Vec<Vec<ParticleTile>> = self
            .tiles
            .iter()
            .map(|level_tiles| {
                level_tiles
                    .iter()
                    .map(|tile| ParticleTile::new(tile.level(), tile.box_index()))
                    .collect()
            })
            .collect();
        let stored_next_number = checkpoint.next_particle_number();

        for tile in checkpoint.into_tiles() {
            let (level, box_index) = (tile.level(), tile.box_index());
            let slot = restored
                .get(level)
                .and_then(|level_tiles| {
                    level_tiles
                        .iter()
                        .position(|restored_tile| restored_tile.box_index() == box_index)
                })
                .ok_or_else(|| {
                    ContainerError::InconsistentCheckpoint(format!(
                        "box {} on level {} is not owned by rank {}",
                        box_index,
                        level,
                        context.rank()
                    ))
                })?;
            let target = &mut restored[level][slot];
            if !target.is_empty() {
                return Err(ContainerError::InconsistentCheckpoint(format!(
                    "box {} on level {} is stored more than once",
                    box_index, level
                )));
            }
            let geometry = context.level(level);
            let index_box = context.decomposition().boxes(level)[box_index].index_box();
            if let Some(stray) = tile
                .particles()
                .iter()
                .find(|particle| !index_box.contains_cell_coords(&geometry.cell_coords(&particle.position)))
            {
                return Err(ContainerError::InconsistentCheckpoint(format!(
                    "particle {} at {} lies outside box {} on level {}",
                    stray.id, stray.position, box_index, level
                )));
            }
            if let Some(invalid) = tile.particles().iter().find(|particle| {
                !(particle.weight > 0.0) || !particle.momentum.is_finite()
            }) {
                return Err(ContainerError::InconsistentCheckpoint(format!(
                    "particle {} in box {} on level {} has weight {} and momentum {}",
                    invalid.id, box_index, level, invalid.weight, invalid.momentum
                )));
            }
            target.extend(tile.particles().iter().copied());
        }

        let requirement = self.properties.restart_requirement();
        self.next_particle_number = if requirement.requires_recompute() {
            let origin = context.rank() as u32;
            restored
                .iter()
                .flatten()
                .flat_map(|tile| tile.particles().iter())
                .filter(|particle| particle.id.origin == origin)
                .map(|particle| particle.id.number + 1)
                .max()
                .unwrap_or(0)
                .max(stored_next_number)
        } else {
            stored_next_number
        };
        self.tiles = restored;
        self.state = ContainerState::Restarted;
        Ok(requirement)
    }

    /// Creates the external representation of the particle state.
    pub fn checkpoint(&self) -> ParticleCheckpoint {
        ParticleCheckpoint::new(
            self.properties.name().to_string(),
            self.next_particle_number,
            self.tiles.iter().flatten().cloned().collect(),
        )
    }

    /// Adds the charge density of all particles on the given level to the
    /// given nodal arrays, one per local box in local box order.
    pub fn deposit_charge_density(
        &self,
        context: &MeshContext,
        level: usize,
        densities: &mut [BoxArray3],
    ) -> Result<(), ContainerError> {
        self.require_current_decomposition(context)?;
        let level_tiles = self
            .tiles
            .get(level)
            .filter(|_| level < context.number_of_levels())
            .ok_or(ContainerError::MissingLevel { level })?;
        if densities.len() != level_tiles.len() {
            return Err(ContainerError::MismatchedBoxData {
                level,
                expected: level_tiles.len(),
                actual: densities.len(),
            });
        }
        let geometry = context.level(level);
        let depositor = EsirkepovDepositor::new(self.properties.shape_order());
        let charge = self.properties.constants().charge();

        level_tiles
            .par_iter()
            .zip(densities.par_iter_mut())
            .try_for_each(|(tile, density)| -> Result<(), ContainerError> {
                let mut accumulator = density.accumulator();
                for particle in tile.particles() {
                    depositor
                        .deposit_charge(geometry, &particle.position, particle.weight, charge, &mut accumulator)
                        .map_err(|kind| ParticleFault {
                            id: particle.id,
                            level,
                            box_index: tile.box_index(),
                            kind,
                        })?;
                }
                Ok(())
            })
    }

    /// Removes the particles named by the given migration records from their
    /// tiles on the given level.
    ///
    /// The records must refer to the current particle indices, as reported by
    /// the latest step.
    pub fn extract_particles(&mut self, level: usize, records: &[MigrationRecord]) -> Vec<Particle> {
        let Some(level_tiles) = self.tiles.get_mut(level) else {
            return Vec::new();
        };
        level_tiles
            .iter_mut()
            .flat_map(|tile| {
                let indices: Vec<usize> = records
                    .iter()
                    .filter(|record| record.level == level && record.source_box == tile.box_index())
                    .map(|record| record.particle_index)
                    .collect();
                tile.remove_indices(&indices)
            })
            .collect()
    }

    /// Places the given particles into the local tiles of the boxes containing them.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the particles not contained in any locally owned box.
    /// - `Err`: The container is not allocated for the current decomposition.
    pub fn insert_particles(
        &mut self,
        context: &MeshContext,
        level: usize,
        particles: Vec<Particle>,
    ) -> Result<Vec<Particle>, ContainerError> {
        self.require_current_decomposition(context)?;
        if level >= context.number_of_levels() || level >= self.tiles.len() {
            return Ok(particles);
        }
        let geometry = context.level(level);
        let decomposition = context.decomposition();
        let level_tiles = &mut self.tiles[level];

        let mut unowned = Vec::new();
        for particle in particles {
            let slot = decomposition
                .find_box(level, &geometry.cell_coords(&particle.position))
                .and_then(|box_index| level_tiles.iter().position(|tile| tile.box_index() == box_index));
            match slot {
                Some(slot) => level_tiles[slot].push(particle),
                None => unowned.push(particle),
            }
        }
        Ok(unowned)
    }

    fn require_state(&self, operation: &'static str, allowed: &[ContainerState]) -> Result<(), ContainerError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ContainerError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    fn require_current_decomposition(&self, context: &MeshContext) -> Result<(), ContainerError> {
        if self.decomposition.as_ref() == Some(context.decomposition()) {
            Ok(())
        } else {
            Err(ContainerError::StaleDecomposition)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{In3D, Point3, Vec3},
        grid::LevelGeometry,
        species::injection::ManualInjector,
    };

    fn properties() -> SpeciesProperties {
        SpeciesProperties::new(
            "electrons",
            SpeciesKind::Physical,
            ParticleConstants::with_speed_of_light(-1.0, 1.0, 10.0, true),
            ShapeOrder::One,
        )
    }

    fn context(max_box: usize) -> MeshContext {
        MeshContext::single_level(
            LevelGeometry::from_bounds(In3D::same(4), Vec3::zero(), Vec3::equal_components(4.0)),
            &In3D::same(max_box),
        )
    }

    #[test]
    fn operations_respect_the_lifecycle() {
        let context = context(4);
        let mut container = SpeciesContainer::new(properties());
        let result = container.init_data(&context, &mut ManualInjector::default());
        assert!(matches!(
            result,
            Err(ContainerError::InvalidState {
                state: "uninitialized",
                ..
            })
        ));
        container.alloc_data(&context).unwrap();
        assert_eq!(container.state(), ContainerState::Allocated);
        let result = container.evolve(&context, 0, &[], &mut [], &EvolveSettings::new(0.1));
        assert!(matches!(result, Err(ContainerError::InvalidState { .. })));
        container.init_data(&context, &mut ManualInjector::default()).unwrap();
        assert_eq!(container.state(), ContainerState::Populated);
    }

    #[test]
    fn injected_particles_get_unique_ids() {
        let context = context(2);
        let mut container = SpeciesContainer::new(properties());
        container.alloc_data(&context).unwrap();
        let mut injector = ManualInjector::new(
            [0.5, 1.5, 2.5, 3.5]
                .iter()
                .map(|&x| injection::InjectedParticle {
                    position: Point3::new(x, 0.5, 0.5),
                    momentum: Vec3::zero(),
                    weight: 1.0,
                })
                .collect(),
        );
        assert_eq!(container.init_data(&context, &mut injector).unwrap(), 4);
        let mut numbers: Vec<_> = container.particles().map(|particle| particle.id.number).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert_eq!(container.tiles(0).len(), 8);
        assert_eq!(container.tiles(0)[0].len(), 2);
        assert_eq!(container.tiles(0)[1].len(), 2);
    }

    struct WeightlessInjector;

    impl ParticleInjector for WeightlessInjector {
        fn inject(
            &mut self,
            _level: usize,
            geometry: &LevelGeometry,
            index_box: &crate::grid::IndexBox,
        ) -> Vec<injection::InjectedParticle> {
            vec![injection::InjectedParticle {
                position: geometry.position(&Point3::with_each_component(|dim| {
                    index_box.lower()[dim] as fpa + 0.5
                })),
                momentum: Vec3::zero(),
                weight: 0.0,
            }]
        }
    }

    #[test]
    fn injecting_non_positive_weight_fails() {
        let context = context(4);
        let mut container = SpeciesContainer::new(properties());
        container.alloc_data(&context).unwrap();
        let result = container.init_data(&context, &mut WeightlessInjector);
        assert!(matches!(
            result,
            Err(ContainerError::InvalidInjectedParticle {
                level: 0,
                box_index: 0,
                weight,
                ..
            }) if weight == 0.0
        ));
        assert_eq!(container.number_of_particles(), 0);
        assert_eq!(container.state(), ContainerState::Allocated);
    }

    #[test]
    fn injecting_non_finite_momentum_fails() {
        let context = context(4);
        let mut container = SpeciesContainer::new(properties());
        container.alloc_data(&context).unwrap();
        let mut injector = ManualInjector::new(vec![injection::InjectedParticle {
            position: Point3::new(1.0, 1.0, 1.0),
            momentum: Vec3::new(fpa::NAN, 0.0, 0.0),
            weight: 1.0,
        }]);
        let result = container.init_data(&context, &mut injector);
        assert!(matches!(result, Err(ContainerError::InvalidInjectedParticle { .. })));
    }

    #[test]
    fn restoring_invalid_weights_or_momenta_fails() {
        let context = context(4);
        let invalid_particles = [
            (-2.0, Vec3::zero()),
            (0.0, Vec3::zero()),
            (fpa::NAN, Vec3::zero()),
            (1.0, Vec3::new(0.0, fpa::INFINITY, 0.0)),
        ];
        for (weight, momentum) in invalid_particles {
            let mut container = SpeciesContainer::new(properties());
            container.alloc_data(&context).unwrap();
            let mut tile = ParticleTile::new(0, 0);
            tile.push(Particle::at_rest(Point3::new(0.5, 0.5, 0.5), 1.0, ParticleId::new(0, 0)));
            tile.push(Particle {
                position: Point3::new(1.5, 0.5, 0.5),
                momentum,
                weight,
                id: ParticleId::new(1, 0),
            });
            let checkpoint = ParticleCheckpoint::new("electrons".to_string(), 2, vec![tile]);
            let result = container.post_restart(&context, checkpoint);
            assert!(matches!(result, Err(ContainerError::InconsistentCheckpoint(_))));
            assert_eq!(container.number_of_particles(), 0);
            assert_eq!(container.state(), ContainerState::Allocated);
        }
    }

    #[test]
    fn evolving_with_a_stale_decomposition_fails() {
        let mut container = SpeciesContainer::new(properties());
        container.alloc_data(&context(4)).unwrap();
        container.init_data(&context(4), &mut ManualInjector::default()).unwrap();
        let result = container.evolve(&context(2), 0, &[], &mut [], &EvolveSettings::new(0.1));
        assert!(matches!(result, Err(ContainerError::StaleDecomposition)));
        let result = container.evolve(&context(4), 1, &[], &mut [], &EvolveSettings::new(0.1));
        assert!(matches!(result, Err(ContainerError::MissingLevel { level: 1 })));
        let result = container.evolve(&context(4), 0, &[], &mut [], &EvolveSettings::new(0.1));
        assert!(matches!(
            result,
            Err(ContainerError::MismatchedBoxData {
                expected: 1,
                actual: 0,
                ..
            })
        ));
    }
}
