//! Checkpoint representation of a species and restart capabilities.

use crate::{error::ConfigError, particles::ParticleTile};
use std::{fmt, str::FromStr};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// What a species needs after its particles have been reloaded from a checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum RestartRequirement {
    /// The reloaded particles are complete; the stored particle counter is reused.
    RepopulateOnly,
    /// Derived species state is recomputed from the reloaded particles, and
    /// the caller is asked to recompute grid quantities such as the charge density.
    RepopulateAndRecompute,
}

impl RestartRequirement {
    pub fn requires_recompute(self) -> bool {
        self == Self::RepopulateAndRecompute
    }
}

impl FromStr for RestartRequirement {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "repopulate" => Ok(Self::RepopulateOnly),
            "recompute" => Ok(Self::RepopulateAndRecompute),
            _ => Err(ConfigError::InvalidParameter {
                name: "restart".to_string(),
                message: format!("expected repopulate or recompute, got {}", s),
            }),
        }
    }
}

impl fmt::Display for RestartRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RepopulateOnly => write!(f, "repopulate"),
            Self::RepopulateAndRecompute => write!(f, "recompute"),
        }
    }
}

/// Externally stored particle state of a species on one rank.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct ParticleCheckpoint {
    species_name: String,
    next_particle_number: u64,
    tiles: Vec<ParticleTile>,
}

impl ParticleCheckpoint {
    pub fn new(species_name: String, next_particle_number: u64, tiles: Vec<ParticleTile>) -> Self {
        Self {
            species_name,
            next_particle_number,
            tiles,
        }
    }

    pub fn species_name(&self) -> &str {
        &self.species_name
    }

    /// Number to give the next particle created on this rank.
    pub fn next_particle_number(&self) -> u64 {
        self.next_particle_number
    }

    pub fn tiles(&self) -> &[ParticleTile] {
        &self.tiles
    }

    pub fn into_tiles(self) -> Vec<ParticleTile> {
        self.tiles
    }

    pub fn number_of_particles(&self) -> usize {
        self.tiles.iter().map(ParticleTile::len).sum()
    }
}
