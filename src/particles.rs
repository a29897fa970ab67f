//! Macro-particles and the tiles they are stored in.

use crate::{
    geometry::{Point3, Vec3},
    num::fpa,
};
use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Globally unique particle identity: a running number together with the
/// rank that created the particle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct ParticleId {
    pub number: u64,
    pub origin: u32,
}

impl ParticleId {
    pub fn new(number: u64, origin: u32) -> Self {
        Self { number, origin }
    }
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.number)
    }
}

/// A macro-particle representing `weight` physical particles.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Particle {
    /// Physical position.
    pub position: Point3<fpa>,
    /// Momentum per unit rest mass, `u = γv`.
    pub momentum: Vec3<fpa>,
    pub weight: fpa,
    pub id: ParticleId,
}

impl Particle {
    /// Creates a new particle.
    ///
    /// # Panics
    ///
    /// If the weight is not positive.
    pub fn new(position: Point3<fpa>, momentum: Vec3<fpa>, weight: fpa, id: ParticleId) -> Self {
        assert!(weight > 0.0, "Particle weight must be positive");
        Self {
            position,
            momentum,
            weight,
            id,
        }
    }

    /// Creates a particle at rest.
    pub fn at_rest(position: Point3<fpa>, weight: fpa, id: ParticleId) -> Self {
        Self::new(position, Vec3::zero(), weight, id)
    }
}

/// The particles of one subdomain box on one refinement level.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct ParticleTile {
    level: usize,
    box_index: usize,
    particles: Vec<Particle>,
}

impl ParticleTile {
    /// Creates an empty tile for the given box.
    pub fn new(level: usize, box_index: usize) -> Self {
        Self {
            level,
            box_index,
            particles: Vec::new(),
        }
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Index of the owning box in the decomposition of the level.
    pub fn box_index(&self) -> usize {
        self.box_index
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    pub fn push(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn extend<I: IntoIterator<Item = Particle>>(&mut self, particles: I) {
        self.particles.extend(particles);
    }

    /// Removes and returns all particles in the tile.
    pub fn take_all(&mut self) -> Vec<Particle> {
        std::mem::take(&mut self.particles)
    }

    /// Removes the particles at the given indices and returns them in the order
    /// the indices are given.
    ///
    /// Remaining particles may be reordered. Repeated indices and indices past
    /// the end of the tile are ignored.
    pub fn remove_indices(&mut self, indices: &[usize]) -> Vec<Particle> {
        let n_particles = self.particles.len();
        let mut sorted: Vec<(usize, usize)> = indices
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, idx)| idx < n_particles)
            .collect();
        sorted.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        sorted.dedup_by_key(|&mut (_, idx)| idx);
        let mut removed: Vec<(usize, Particle)> = sorted
            .into_iter()
            .map(|(order, idx)| (order, self.particles.swap_remove(idx)))
            .collect();
        removed.sort_unstable_by_key(|&(order, _)| order);
        removed.into_iter().map(|(_, particle)| particle).collect()
    }

    /// Keeps only the particles whose entry in `keep` is `true`, preserving
    /// their order.
    ///
    /// # Panics
    ///
    /// If `keep` does not have one entry per particle.
    pub fn retain_marked(&mut self, keep: &[bool]) {
        assert_eq!(keep.len(), self.particles.len(), "Need one mark per particle");
        let mut marks = keep.iter();
        self.particles.retain(|_| marks.next().copied().unwrap_or(true));
    }

    /// Sum of the weights of all particles in the tile.
    pub fn total_weight(&self) -> fpa {
        self.particles.iter().map(|particle| particle.weight).sum()
    }
}
