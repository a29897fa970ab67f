//! Integration of the equations of motion of charged particles.

use crate::{
    constants::SPEED_OF_LIGHT,
    error::{ConfigError, FaultKind},
    gather::GatheredFields,
    geometry::{Point3, Vec3},
    num::fpa,
};
use std::{fmt, str::FromStr};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Constants determining how a particle of a given species responds to fields.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct ParticleConstants {
    charge: fpa,
    mass: fpa,
    speed_of_light: fpa,
    relativistic: bool,
}

impl ParticleConstants {
    /// Creates constants for a relativistic species in SI units.
    ///
    /// # Panics
    ///
    /// If the mass is not positive.
    pub fn new(charge: fpa, mass: fpa) -> Self {
        Self::with_speed_of_light(charge, mass, SPEED_OF_LIGHT, true)
    }

    /// Creates constants with an explicit speed of light and relativistic flag.
    ///
    /// # Panics
    ///
    /// If the mass or speed of light is not positive.
    pub fn with_speed_of_light(charge: fpa, mass: fpa, speed_of_light: fpa, relativistic: bool) -> Self {
        assert!(mass > 0.0, "Mass must be positive");
        assert!(speed_of_light > 0.0, "Speed of light must be positive");
        Self {
            charge,
            mass,
            speed_of_light,
            relativistic,
        }
    }

    pub fn charge(&self) -> fpa {
        self.charge
    }

    pub fn mass(&self) -> fpa {
        self.mass
    }

    pub fn speed_of_light(&self) -> fpa {
        self.speed_of_light
    }

    pub fn is_relativistic(&self) -> bool {
        self.relativistic
    }

    /// Computes the Lorentz factor for the given momentum per unit rest mass.
    ///
    /// Computed as `hypot(1, |u|/c)`, which neither overflows for
    /// ultra-relativistic momenta nor loses precision for tiny ones.
    /// Always unity for non-relativistic species.
    pub fn lorentz_factor(&self, momentum: &Vec3<fpa>) -> fpa {
        if self.relativistic {
            fpa::hypot(1.0, momentum.length() / self.speed_of_light)
        } else {
            1.0
        }
    }

    fn inverse_squared_speed_of_light(&self) -> fpa {
        if self.relativistic {
            1.0 / (self.speed_of_light * self.speed_of_light)
        } else {
            0.0
        }
    }
}

/// Defines the properties of an integrator advancing a particle through one time step.
pub trait ParticlePusher: Clone + Sync + Send {
    /// Advances the momentum and position of a particle by one time step.
    ///
    /// # Parameters
    ///
    /// - `constants`: Charge, mass and relativistic treatment of the particle.
    /// - `position`: Physical position at the start of the step.
    /// - `momentum`: Momentum per unit rest mass, `u = γv`, at the start of the step.
    /// - `fields`: Electric and magnetic field at the particle position.
    /// - `time_step`: Duration of the step.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the new position and momentum.
    /// - `Err`: Contains a `NumericOverflow` fault if any updated quantity became non-finite.
    fn push(
        &self,
        constants: &ParticleConstants,
        position: &Point3<fpa>,
        momentum: &Vec3<fpa>,
        fields: &GatheredFields,
        time_step: fpa,
    ) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind>;
}

/// The Boris scheme: a half electric kick, an exact magnetic rotation and a
/// second half electric kick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BorisPusher;

impl ParticlePusher for BorisPusher {
    fn push(
        &self,
        constants: &ParticleConstants,
        position: &Point3<fpa>,
        momentum: &Vec3<fpa>,
        fields: &GatheredFields,
        time_step: fpa,
    ) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
        let half_kick_factor = 0.5 * constants.charge * time_step / constants.mass;
        let electric_kick = fields.electric * half_kick_factor;

        let momentum_minus = *momentum + electric_kick;
        let gamma = checked_finite(constants.lorentz_factor(&momentum_minus), "Lorentz factor")?;

        let t = fields.magnetic * (half_kick_factor / gamma);
        let s = t * (2.0 / (1.0 + t.squared_length()));
        let momentum_prime = momentum_minus + momentum_minus.cross(&t);
        let momentum_plus = momentum_minus + momentum_prime.cross(&s);

        advance_position(constants, position, momentum_plus + electric_kick, time_step)
    }
}

/// The Vay scheme, which keeps the E×B drift of relativistic particles
/// correct when the electric and magnetic forces nearly cancel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VayPusher;

impl ParticlePusher for VayPusher {
    fn push(
        &self,
        constants: &ParticleConstants,
        position: &Point3<fpa>,
        momentum: &Vec3<fpa>,
        fields: &GatheredFields,
        time_step: fpa,
    ) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
        let half_kick_factor = 0.5 * constants.charge * time_step / constants.mass;
        let inverse_c2 = constants.inverse_squared_speed_of_light();

        let gamma = checked_finite(constants.lorentz_factor(momentum), "Lorentz factor")?;
        let velocity = *momentum / gamma;
        let momentum_half = *momentum
            + (fields.electric + velocity.cross(&fields.magnetic)) * half_kick_factor;
        let momentum_prime = momentum_half + fields.electric * half_kick_factor;

        let tau = fields.magnetic * half_kick_factor;
        let tau_squared = tau.squared_length();
        let gamma_prime_squared = 1.0 + momentum_prime.squared_length() * inverse_c2;
        let u_star = momentum_prime.dot(&tau);
        let sigma = gamma_prime_squared - tau_squared;
        let new_gamma = fpa::sqrt(
            0.5 * (sigma + fpa::sqrt(sigma * sigma + 4.0 * (tau_squared + u_star * u_star * inverse_c2))),
        );
        let new_gamma = checked_finite(new_gamma, "Lorentz factor")?;

        let t = tau / new_gamma;
        let s = 1.0 / (1.0 + t.squared_length());
        let new_momentum =
            (momentum_prime + t * momentum_prime.dot(&t) + momentum_prime.cross(&t)) * s;

        advance_position(constants, position, new_momentum, time_step)
    }
}

/// Selectable particle integrator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum PusherKind {
    #[default]
    Boris,
    Vay,
}

impl ParticlePusher for PusherKind {
    fn push(
        &self,
        constants: &ParticleConstants,
        position: &Point3<fpa>,
        momentum: &Vec3<fpa>,
        fields: &GatheredFields,
        time_step: fpa,
    ) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
        match self {
            Self::Boris => BorisPusher.push(constants, position, momentum, fields, time_step),
            Self::Vay => VayPusher.push(constants, position, momentum, fields, time_step),
        }
    }
}

impl FromStr for PusherKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boris" => Ok(Self::Boris),
            "vay" => Ok(Self::Vay),
            _ => Err(ConfigError::InvalidParameter {
                name: "pusher".to_string(),
                message: format!("unknown pusher {}", s),
            }),
        }
    }
}

impl fmt::Display for PusherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boris => write!(f, "boris"),
            Self::Vay => write!(f, "vay"),
        }
    }
}

/// Moves a particle with its current momentum, ignoring any fields.
pub fn drift(
    constants: &ParticleConstants,
    position: &Point3<fpa>,
    momentum: &Vec3<fpa>,
    time_step: fpa,
) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
    advance_position(constants, position, *momentum, time_step)
}

/// Moves a massless particle at the speed of light along its momentum.
pub fn drift_at_speed_of_light(
    speed_of_light: fpa,
    position: &Point3<fpa>,
    momentum: &Vec3<fpa>,
    time_step: fpa,
) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
    let momentum_magnitude = momentum.length();
    if momentum_magnitude == 0.0 || !momentum_magnitude.is_finite() {
        return Err(FaultKind::NumericOverflow {
            quantity: "photon direction",
        });
    }
    let new_position = *position + *momentum * (speed_of_light * time_step / momentum_magnitude);
    if !new_position.is_finite() {
        return Err(FaultKind::NumericOverflow { quantity: "position" });
    }
    Ok((new_position, *momentum))
}

fn advance_position(
    constants: &ParticleConstants,
    position: &Point3<fpa>,
    new_momentum: Vec3<fpa>,
    time_step: fpa,
) -> Result<(Point3<fpa>, Vec3<fpa>), FaultKind> {
    if !new_momentum.is_finite() {
        return Err(FaultKind::NumericOverflow { quantity: "momentum" });
    }
    let new_gamma = checked_finite(constants.lorentz_factor(&new_momentum), "Lorentz factor")?;
    let new_position = *position + new_momentum * (time_step / new_gamma);
    if !new_position.is_finite() {
        return Err(FaultKind::NumericOverflow { quantity: "position" });
    }
    Ok((new_position, new_momentum))
}

fn checked_finite(value: fpa, quantity: &'static str) -> Result<fpa, FaultKind> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FaultKind::NumericOverflow { quantity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Dim3::{X, Y, Z};

    const PUSHERS: [PusherKind; 2] = [PusherKind::Boris, PusherKind::Vay];

    fn unit_constants() -> ParticleConstants {
        ParticleConstants::new(1.0, 1.0)
    }

    #[test]
    fn constant_electric_field_accelerates_linearly() {
        let fields = GatheredFields::new(Vec3::new(1.0, 0.0, 0.0), Vec3::zero());
        for pusher in PUSHERS {
            let mut position = Point3::origin();
            let mut momentum = Vec3::zero();
            for _ in 0..100 {
                let (x, u) = pusher
                    .push(&unit_constants(), &position, &momentum, &fields, 0.01)
                    .unwrap();
                position = x;
                momentum = u;
            }
            assert!((momentum[X] - 1.0).abs() < 1e-6, "{}", pusher);
            assert_eq!(momentum[Y], 0.0);
            assert!(position[X] > 0.0);
        }
    }

    #[test]
    fn zero_magnetic_field_gives_pure_electric_kick() {
        let constants = ParticleConstants::with_speed_of_light(-2.0, 4.0, 10.0, true);
        let fields = GatheredFields::new(Vec3::new(0.5, -1.0, 2.0), Vec3::zero());
        let momentum = Vec3::new(3.0, 1.0, -1.0);
        let (_, new_momentum) = BorisPusher
            .push(&constants, &Point3::origin(), &momentum, &fields, 0.1)
            .unwrap();
        let expected = momentum + fields.electric * (-2.0 * 0.1 / 4.0);
        for dim in [X, Y, Z] {
            assert!((new_momentum[dim] - expected[dim]).abs() < 1e-14);
        }
    }

    #[test]
    fn magnetic_gyration_preserves_momentum_magnitude() {
        let constants = ParticleConstants::with_speed_of_light(1.0, 1.0, 3.0, true);
        let fields = GatheredFields::new(Vec3::zero(), Vec3::new(0.3, -1.0, 2.0));
        for pusher in PUSHERS {
            let mut position = Point3::origin();
            let mut momentum = Vec3::new(1.0, 2.0, 0.5);
            let initial_magnitude = momentum.length();
            for _ in 0..1000 {
                let (x, u) = pusher
                    .push(&constants, &position, &momentum, &fields, 0.1)
                    .unwrap();
                position = x;
                momentum = u;
            }
            assert!(
                (momentum.length() - initial_magnitude).abs() < 1e-12 * initial_magnitude,
                "{}",
                pusher
            );
        }
    }

    #[test]
    fn motion_without_fields_is_ballistic_and_reversible() {
        let constants = ParticleConstants::new(1.0, 1.0);
        let speed_of_light = constants.speed_of_light();
        let initial_position = Point3::new(1.0, -2.0, 0.5);
        let initial_momentum = Vec3::new(2.0, -0.5, 1.5) * speed_of_light;
        let gamma = constants.lorentz_factor(&initial_momentum);
        let time_step = 1e-9;

        let mut position = initial_position;
        let mut momentum = initial_momentum;
        for _ in 0..50 {
            let (x, u) = BorisPusher
                .push(&constants, &position, &momentum, &GatheredFields::zero(), time_step)
                .unwrap();
            position = x;
            momentum = u;
        }
        assert_eq!(momentum, initial_momentum);
        for dim in [X, Y, Z] {
            let expected = initial_position[dim] + 50.0 * time_step * initial_momentum[dim] / gamma;
            assert!((position[dim] - expected).abs() <= 1e-12 * expected.abs().max(1.0));
        }

        momentum = -momentum;
        for _ in 0..50 {
            let (x, u) = BorisPusher
                .push(&constants, &position, &momentum, &GatheredFields::zero(), time_step)
                .unwrap();
            position = x;
            momentum = u;
        }
        for dim in [X, Y, Z] {
            assert!(
                (position[dim] - initial_position[dim]).abs()
                    <= 1e-12 * initial_position[dim].abs().max(1.0)
            );
        }
    }

    #[test]
    fn non_relativistic_species_have_unit_lorentz_factor() {
        let constants = ParticleConstants::with_speed_of_light(1.0, 1.0, 1.0, false);
        assert_eq!(constants.lorentz_factor(&Vec3::new(10.0, 0.0, 0.0)), 1.0);
        let (position, _) = drift(&constants, &Point3::origin(), &Vec3::new(10.0, 0.0, 0.0), 0.5).unwrap();
        assert_eq!(position[X], 5.0);
    }

    #[test]
    fn lorentz_factor_is_stable_for_extreme_momenta() {
        let constants = ParticleConstants::with_speed_of_light(1.0, 1.0, 1.0, true);
        assert_eq!(constants.lorentz_factor(&Vec3::new(1e-20, 0.0, 0.0)), 1.0);
        let gamma = constants.lorentz_factor(&Vec3::new(1e200, 0.0, 0.0));
        assert!(gamma.is_finite());
        assert!((gamma / 1e200 - 1.0).abs() < 1e-15);
    }

    #[test]
    fn non_finite_momentum_is_reported() {
        let fields = GatheredFields::new(Vec3::new(fpa::INFINITY, 0.0, 0.0), Vec3::zero());
        let result = BorisPusher.push(&unit_constants(), &Point3::origin(), &Vec3::zero(), &fields, 1.0);
        assert!(matches!(result, Err(FaultKind::NumericOverflow { .. })));
    }

    #[test]
    fn photons_move_at_the_speed_of_light() {
        let (position, momentum) =
            drift_at_speed_of_light(2.0, &Point3::origin(), &Vec3::new(0.0, 3.0, 4.0), 0.5).unwrap();
        assert!((position[Y] - 0.6).abs() < 1e-15);
        assert!((position[Z] - 0.8).abs() < 1e-15);
        assert_eq!(momentum, Vec3::new(0.0, 3.0, 4.0));
        assert!(drift_at_speed_of_light(2.0, &Point3::origin(), &Vec3::zero(), 0.5).is_err());
    }

    #[test]
    fn pusher_names_are_parsed() {
        assert_eq!("Vay".parse::<PusherKind>().unwrap(), PusherKind::Vay);
        assert!("leapfrog".parse::<PusherKind>().is_err());
    }
}
