//! Advancing the particles of a species on one refinement level through a time step.

use crate::{
    boundary::{BoundaryOutcome, DomainBoundaries},
    deposit::{deposit_currents_in_parallel, CurrentDepositor3, EsirkepovDepositor, Trajectory},
    error::{ContainerError, FaultKind, FaultPolicy, ParticleFault},
    field::{BoxFields, CurrentArrays},
    gather::{FieldGatherer3, ShapeFactorGatherer},
    geometry::{Dim3::Z, Point3, Vec3},
    grid::{
        decomposition::{Decomposition, MeshContext},
        LevelGeometry,
    },
    num::fpa,
    particles::{Particle, ParticleTile},
    push::{drift, drift_at_speed_of_light, ParticlePusher, PusherKind},
    species::{SpeciesKind, SpeciesProperties},
};
use rayon::prelude::*;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Parameters shared by all particles advanced in a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EvolveSettings {
    time_step: fpa,
    boundaries: DomainBoundaries,
    fault_policy: FaultPolicy,
}

impl EvolveSettings {
    /// Creates settings for the given time step with periodic boundaries and
    /// aborting fault policy.
    ///
    /// # Panics
    ///
    /// If the time step is not positive and finite.
    pub fn new(time_step: fpa) -> Self {
        assert!(
            time_step > 0.0 && time_step.is_finite(),
            "Time step must be positive and finite"
        );
        Self {
            time_step,
            boundaries: DomainBoundaries::default(),
            fault_policy: FaultPolicy::default(),
        }
    }

    pub fn with_boundaries(mut self, boundaries: DomainBoundaries) -> Self {
        self.boundaries = boundaries;
        self
    }

    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    pub fn time_step(&self) -> fpa {
        self.time_step
    }

    pub fn boundaries(&self) -> &DomainBoundaries {
        &self.boundaries
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }
}

/// A particle that ended the step outside the box of the tile holding it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct MigrationRecord {
    pub level: usize,
    /// Index of the box currently holding the particle.
    pub source_box: usize,
    /// Index of the particle in the tile of the source box.
    pub particle_index: usize,
    /// Index of the box containing the new position, if any box on the level does.
    pub destination_box: Option<usize>,
}

/// Summary of an evolved step on one level.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvolveReport {
    migrations: Vec<MigrationRecord>,
    absorbed: usize,
    faults: Vec<ParticleFault>,
    particle_counts: Vec<usize>,
}

impl EvolveReport {
    /// Particles flagged for migration, ordered by box and particle index.
    pub fn migrations(&self) -> &[MigrationRecord] {
        &self.migrations
    }

    /// Number of particles removed through absorbing boundaries.
    pub fn absorbed(&self) -> usize {
        self.absorbed
    }

    /// Faults of particles that were left unchanged under the aggregating policy.
    pub fn faults(&self) -> &[ParticleFault] {
        &self.faults
    }

    /// Number of particles in each local box after the step, in local box order.
    pub fn particle_counts(&self) -> &[usize] {
        &self.particle_counts
    }

    pub fn total_particles(&self) -> usize {
        self.particle_counts.iter().sum()
    }
}

/// New state of a particle advanced without faults.
#[derive(Clone, Copy, Debug)]
struct AdvancedParticle {
    position: Point3<fpa>,
    momentum: Vec3<fpa>,
    trajectory: Option<Trajectory>,
    absorbed: bool,
}

/// What happened in one tile when its results were committed.
#[derive(Debug, Default)]
struct TileSummary {
    migrations: Vec<MigrationRecord>,
    absorbed: usize,
    faults: Vec<ParticleFault>,
}

/// Runs gather, push and deposit for every particle of a level.
#[derive(Clone, Debug)]
pub struct LevelCoordinator<G, P, D> {
    gatherer: G,
    pusher: P,
    depositor: D,
}

impl LevelCoordinator<ShapeFactorGatherer, PusherKind, EsirkepovDepositor> {
    /// Creates the coordinator configured by the shape order and pusher of a species.
    pub fn for_species(properties: &SpeciesProperties) -> Self {
        Self::new(
            ShapeFactorGatherer::new(properties.shape_order()),
            properties.pusher(),
            EsirkepovDepositor::new(properties.shape_order()),
        )
    }
}

impl<G, P, D> LevelCoordinator<G, P, D>
where
    G: FieldGatherer3,
    P: ParticlePusher,
    D: CurrentDepositor3,
{
    pub fn new(gatherer: G, pusher: P, depositor: D) -> Self {
        Self {
            gatherer,
            pusher,
            depositor,
        }
    }

    /// Advances all particles in the given tiles by one time step.
    ///
    /// The tiles, field views and current arrays are matched by position and
    /// must all belong to the same boxes. Particles are first advanced without
    /// touching any storage. Under the aborting policy the first fault is
    /// returned before anything has changed. Otherwise the currents of all
    /// non-faulty particles are deposited, the particles are updated, absorbed
    /// particles are removed and particles outside their box are flagged.
    ///
    /// # Parameters
    ///
    /// - `properties`: Properties of the species the particles belong to.
    /// - `context`: Mesh context holding the geometry and decomposition.
    /// - `level`: Refinement level of the tiles.
    /// - `tiles`: Particle tiles of the local boxes.
    /// - `fields`: Field views of the local boxes, including ghost cells.
    /// - `currents`: Current arrays of the local boxes to add to.
    /// - `settings`: Time step, boundary conditions and fault policy.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains a report of the step.
    /// - `Err`: Contains the fault that aborted the step.
    ///
    /// # Panics
    ///
    /// If the numbers of tiles, field views and current arrays differ.
    #[allow(clippy::too_many_arguments)]
    pub fn evolve_level(
        &self,
        properties: &SpeciesProperties,
        context: &MeshContext,
        level: usize,
        tiles: &mut [ParticleTile],
        fields: &[BoxFields],
        currents: &mut [CurrentArrays],
        settings: &EvolveSettings,
    ) -> Result<EvolveReport, ContainerError> {
        assert_eq!(tiles.len(), fields.len(), "Need field views for every tile");
        assert_eq!(tiles.len(), currents.len(), "Need current arrays for every tile");

        let geometry = context.level(level);
        let decomposition = context.decomposition();

        let outcomes: Vec<Vec<Result<AdvancedParticle, FaultKind>>> = tiles
            .par_iter()
            .zip(fields.par_iter())
            .zip(currents.par_iter())
            .map(|((tile, box_fields), box_currents)| {
                tile.particles()
                    .par_iter()
                    .map(|particle| {
                        self.advance_particle(
                            properties,
                            geometry,
                            box_fields,
                            box_currents,
                            particle,
                            settings,
                        )
                    })
                    .collect()
            })
            .collect();

        if settings.fault_policy() == FaultPolicy::AbortStep {
            for (tile, tile_outcomes) in tiles.iter().zip(&outcomes) {
                if let Some((idx, kind)) = tile_outcomes
                    .iter()
                    .enumerate()
                    .find_map(|(idx, outcome)| outcome.as_ref().err().map(|kind| (idx, kind)))
                {
                    return Err(ParticleFault {
                        id: tile.particles()[idx].id,
                        level,
                        box_index: tile.box_index(),
                        kind: kind.clone(),
                    }
                    .into());
                }
            }
        }

        let summaries = tiles
            .par_iter_mut()
            .zip(outcomes.into_par_iter())
            .zip(currents.par_iter_mut())
            .map(|((tile, tile_outcomes), box_currents)| {
                self.complete_tile(
                    properties,
                    geometry,
                    decomposition,
                    level,
                    tile,
                    tile_outcomes,
                    box_currents,
                    settings,
                )
            })
            .collect::<Result<Vec<_>, ContainerError>>()?;

        let mut report = EvolveReport {
            particle_counts: tiles.iter().map(ParticleTile::len).collect(),
            ..EvolveReport::default()
        };
        for summary in summaries {
            report.migrations.extend(summary.migrations);
            report.absorbed += summary.absorbed;
            report.faults.extend(summary.faults);
        }
        Ok(report)
    }

    fn advance_particle(
        &self,
        properties: &SpeciesProperties,
        geometry: &LevelGeometry,
        fields: &BoxFields,
        currents: &CurrentArrays,
        particle: &Particle,
        settings: &EvolveSettings,
    ) -> Result<AdvancedParticle, FaultKind> {
        let constants = properties.constants();
        let time_step = settings.time_step();

        let (pushed_position, pushed_momentum, coupled) = match properties.kind() {
            SpeciesKind::Photon => {
                let (position, momentum) = drift_at_speed_of_light(
                    constants.speed_of_light(),
                    &particle.position,
                    &particle.momentum,
                    time_step,
                )?;
                (position, momentum, false)
            }
            SpeciesKind::RigidInjected { injection_plane_z }
                if particle.position[Z] < injection_plane_z =>
            {
                let (position, momentum) =
                    drift(constants, &particle.position, &particle.momentum, time_step)?;
                (position, momentum, false)
            }
            _ => {
                let gathered = self
                    .gatherer
                    .gather(fields, &geometry.cell_coords(&particle.position))?;
                let (position, momentum) = self.pusher.push(
                    constants,
                    &particle.position,
                    &particle.momentum,
                    &gathered,
                    time_step,
                )?;
                (position, momentum, true)
            }
        };

        let trajectory = if coupled && constants.charge() != 0.0 {
            let trajectory = Trajectory::new(particle.position, pushed_position, particle.weight);
            let (first, end) = self.depositor.current_window(geometry, &trajectory);
            if !currents.covers(&first, &end) {
                return Err(FaultKind::StencilOutOfBounds {
                    cell_coords: geometry.cell_coords(&pushed_position),
                    array: "current density",
                });
            }
            Some(trajectory)
        } else {
            None
        };

        let mut position = pushed_position;
        let mut momentum = pushed_momentum;
        let outcome = settings
            .boundaries()
            .apply(geometry, &mut position, &mut momentum)?;

        Ok(AdvancedParticle {
            position,
            momentum,
            trajectory,
            absorbed: outcome == BoundaryOutcome::Absorbed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn complete_tile(
        &self,
        properties: &SpeciesProperties,
        geometry: &LevelGeometry,
        decomposition: &Decomposition,
        level: usize,
        tile: &mut ParticleTile,
        outcomes: Vec<Result<AdvancedParticle, FaultKind>>,
        currents: &mut CurrentArrays,
        settings: &EvolveSettings,
    ) -> Result<TileSummary, ContainerError> {
        let box_index = tile.box_index();
        let index_box = *decomposition
            .boxes(level)
            .get(box_index)
            .ok_or(ContainerError::StaleDecomposition)?
            .index_box();

        let (deposited_indices, trajectories): (Vec<usize>, Vec<Trajectory>) = outcomes
            .iter()
            .enumerate()
            .filter_map(|(idx, outcome)| match outcome {
                Ok(AdvancedParticle {
                    trajectory: Some(trajectory),
                    ..
                }) => Some((idx, *trajectory)),
                _ => None,
            })
            .unzip();
        deposit_currents_in_parallel(
            &self.depositor,
            geometry,
            &trajectories,
            properties.constants().charge(),
            settings.time_step(),
            currents,
        )
        .map_err(|(idx, kind)| ParticleFault {
            id: tile.particles()[deposited_indices[idx]].id,
            level,
            box_index,
            kind,
        })?;

        let mut summary = TileSummary::default();
        let mut keep = Vec::with_capacity(tile.len());
        for (particle, outcome) in tile.particles_mut().iter_mut().zip(outcomes) {
            match outcome {
                Ok(advanced) => {
                    particle.position = advanced.position;
                    particle.momentum = advanced.momentum;
                    keep.push(!advanced.absorbed);
                }
                Err(kind) => {
                    summary.faults.push(ParticleFault {
                        id: particle.id,
                        level,
                        box_index,
                        kind,
                    });
                    keep.push(true);
                }
            }
        }
        summary.absorbed = keep.iter().filter(|&&kept| !kept).count();
        tile.retain_marked(&keep);

        summary.migrations = tile
            .particles()
            .iter()
            .enumerate()
            .filter_map(|(particle_index, particle)| {
                let cell_coords = geometry.cell_coords(&particle.position);
                if index_box.contains_cell_coords(&cell_coords) {
                    None
                } else {
                    Some(MigrationRecord {
                        level,
                        source_box: box_index,
                        particle_index,
                        destination_box: decomposition.find_box(level, &cell_coords),
                    })
                }
            })
            .collect();

        Ok(summary)
    }
}
