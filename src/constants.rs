//! Physical constants in SI units.

use crate::num::fpa;

/// Speed of light in vacuum [m/s].
pub const SPEED_OF_LIGHT: fpa = 2.997_924_58e8;
/// Elementary charge [C].
pub const ELEMENTARY_CHARGE: fpa = 1.602_176_634e-19;
/// Electron mass [kg].
pub const ELECTRON_MASS: fpa = 9.109_383_701_5e-31;
/// Proton mass [kg].
pub const PROTON_MASS: fpa = 1.672_621_923_69e-27;
