//! Treatment of particles leaving the physical domain.

use crate::{
    error::{ConfigError, FaultKind},
    geometry::{Dim3, In3D, Point3, Vec3},
    grid::LevelGeometry,
    num::fpa,
};
use std::{fmt, str::FromStr};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// What happens to a particle crossing one side of the physical domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum BoundaryCondition {
    /// The particle re-enters through the opposite side.
    Periodic,
    /// The particle is mirrored back into the domain with the normal
    /// momentum component flipped.
    Reflecting,
    /// The particle is removed from the simulation.
    Absorbing,
    /// Crossing the side is a fault.
    None,
}

impl FromStr for BoundaryCondition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "periodic" => Ok(Self::Periodic),
            "reflecting" => Ok(Self::Reflecting),
            "absorbing" => Ok(Self::Absorbing),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidParameter {
                name: "boundary".to_string(),
                message: format!("unknown boundary condition {}", s),
            }),
        }
    }
}

impl fmt::Display for BoundaryCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Periodic => "periodic",
            Self::Reflecting => "reflecting",
            Self::Absorbing => "absorbing",
            Self::None => "none",
        };
        write!(f, "{}", name)
    }
}

/// Result of confronting a particle with the domain boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryOutcome {
    /// The particle stayed inside the domain.
    Inside,
    /// The particle was brought back inside through periodic wrapping or reflection.
    Returned,
    /// The particle left through an absorbing side.
    Absorbed,
}

/// Boundary conditions for the lower and upper side of each dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct DomainBoundaries {
    lower: In3D<BoundaryCondition>,
    upper: In3D<BoundaryCondition>,
}

impl DomainBoundaries {
    /// Creates a new set of boundary conditions.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the boundary conditions.
    /// - `Err`: Only one side of some dimension is periodic.
    pub fn new(lower: In3D<BoundaryCondition>, upper: In3D<BoundaryCondition>) -> Result<Self, ConfigError> {
        for dim in Dim3::slice() {
            if (lower[dim] == BoundaryCondition::Periodic) != (upper[dim] == BoundaryCondition::Periodic) {
                return Err(ConfigError::InvalidParameter {
                    name: format!("boundary_{}", dim),
                    message: "periodicity must apply to both sides".to_string(),
                });
            }
        }
        Ok(Self { lower, upper })
    }

    /// Uses the same boundary condition on all sides.
    pub fn uniform(condition: BoundaryCondition) -> Self {
        Self {
            lower: In3D::same(condition),
            upper: In3D::same(condition),
        }
    }

    pub fn lower(&self) -> &In3D<BoundaryCondition> {
        &self.lower
    }

    pub fn upper(&self) -> &In3D<BoundaryCondition> {
        &self.upper
    }

    /// Applies the boundary conditions to a particle that may have left the
    /// physical domain of the given level, updating its position and momentum.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains what happened to the particle.
    /// - `Err`: Contains a `DomainViolation` fault if the particle left through
    /// a side without boundary condition, or could not be brought back inside.
    pub fn apply(
        &self,
        geometry: &LevelGeometry,
        position: &mut Point3<fpa>,
        momentum: &mut Vec3<fpa>,
    ) -> Result<BoundaryOutcome, FaultKind> {
        let lower_bounds = geometry.lower_bounds();
        let upper_bounds = geometry.upper_bounds();
        let mut outcome = BoundaryOutcome::Inside;

        for dim in Dim3::slice() {
            let (lower, upper) = (lower_bounds[dim], upper_bounds[dim]);
            let condition = if position[dim] < lower {
                self.lower[dim]
            } else if position[dim] >= upper {
                self.upper[dim]
            } else {
                continue;
            };
            match condition {
                BoundaryCondition::Absorbing => return Ok(BoundaryOutcome::Absorbed),
                BoundaryCondition::None => {
                    return Err(FaultKind::DomainViolation {
                        position: *position,
                        dim,
                    })
                }
                BoundaryCondition::Periodic => {
                    let extent = upper - lower;
                    let mut offset = (position[dim] - lower).rem_euclid(extent);
                    if offset >= extent {
                        offset = 0.0;
                    }
                    position[dim] = lower + offset;
                }
                BoundaryCondition::Reflecting => {
                    position[dim] = if position[dim] < lower {
                        2.0 * lower - position[dim]
                    } else {
                        // Reflect about the upper bound while keeping the
                        // result strictly below it.
                        fpa::min(2.0 * upper - position[dim], upper - fpa::EPSILON * upper.abs().max(1.0))
                    };
                    momentum[dim] = -momentum[dim];
                }
            }
            if !(position[dim] >= lower && position[dim] < upper) {
                return Err(FaultKind::DomainViolation {
                    position: *position,
                    dim,
                });
            }
            outcome = BoundaryOutcome::Returned;
        }
        Ok(outcome)
    }
}

impl Default for DomainBoundaries {
    fn default() -> Self {
        Self::uniform(BoundaryCondition::Periodic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Dim3::{X, Y, Z};

    fn geometry() -> LevelGeometry {
        LevelGeometry::from_bounds(In3D::same(4), Vec3::zero(), Vec3::new(4.0, 2.0, 1.0))
    }

    #[test]
    fn periodic_boundaries_wrap_positions() {
        let boundaries = DomainBoundaries::uniform(BoundaryCondition::Periodic);
        let mut position = Point3::new(4.25, -0.5, 0.5);
        let mut momentum = Vec3::new(1.0, -1.0, 0.0);
        let outcome = boundaries.apply(&geometry(), &mut position, &mut momentum).unwrap();
        assert_eq!(outcome, BoundaryOutcome::Returned);
        assert!((position[X] - 0.25).abs() < 1e-15);
        assert!((position[Y] - 1.5).abs() < 1e-15);
        assert_eq!(momentum, Vec3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn reflecting_boundaries_mirror_particles() {
        let boundaries = DomainBoundaries::uniform(BoundaryCondition::Reflecting);
        let mut position = Point3::new(1.0, 1.0, -0.25);
        let mut momentum = Vec3::new(0.5, 0.0, -2.0);
        let outcome = boundaries.apply(&geometry(), &mut position, &mut momentum).unwrap();
        assert_eq!(outcome, BoundaryOutcome::Returned);
        assert_eq!(position[Z], 0.25);
        assert_eq!(momentum[Z], 2.0);
        assert_eq!(momentum[X], 0.5);
    }

    #[test]
    fn absorbing_and_missing_boundaries() {
        let boundaries = DomainBoundaries::new(
            In3D::new(BoundaryCondition::Absorbing, BoundaryCondition::None, BoundaryCondition::None),
            In3D::new(BoundaryCondition::Absorbing, BoundaryCondition::None, BoundaryCondition::None),
        )
        .unwrap();
        let mut momentum = Vec3::zero();
        let outcome = boundaries
            .apply(&geometry(), &mut Point3::new(-0.1, 1.0, 0.5), &mut momentum)
            .unwrap();
        assert_eq!(outcome, BoundaryOutcome::Absorbed);
        let result = boundaries.apply(&geometry(), &mut Point3::new(1.0, 2.0, 0.5), &mut momentum);
        assert!(matches!(result, Err(FaultKind::DomainViolation { dim: Y, .. })));
        let outcome = boundaries
            .apply(&geometry(), &mut Point3::new(1.0, 1.0, 0.5), &mut momentum)
            .unwrap();
        assert_eq!(outcome, BoundaryOutcome::Inside);
    }

    #[test]
    fn one_sided_periodicity_is_rejected() {
        let result = DomainBoundaries::new(
            In3D::same(BoundaryCondition::Periodic),
            In3D::new(BoundaryCondition::Periodic, BoundaryCondition::Absorbing, BoundaryCondition::Periodic),
        );
        assert!(result.is_err());
        assert_eq!("Reflecting".parse::<BoundaryCondition>().unwrap(), BoundaryCondition::Reflecting);
    }
}
