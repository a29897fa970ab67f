//! Error types and error reporting macros.

use crate::{
    geometry::{Dim3, Point3, Vec3},
    num::fpa,
    particles::ParticleId,
};
use std::{io, str::FromStr};
use thiserror::Error;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

#[cfg(not(feature = "for-testing"))]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        eprintln!($($print_arg)*);
        quit::with_code(1);
    }};
}

#[cfg(feature = "for-testing")]
#[macro_export]
macro_rules! exit_with_error {
    ($($print_arg:tt)*) => {{
        panic!($($print_arg)*);
    }};
}

#[macro_export]
macro_rules! exit_on_error {
    ($result:expr, $($print_arg:tt)*) => {
        match $result {
            Ok(value) => value,
            Err(err) => {
                $crate::exit_with_error!($($print_arg)*, err)
            }
        }
    };
}

#[macro_export]
macro_rules! exit_on_false {
    ($logic:expr, $($print_arg:tt)*) => {
        if $logic {
            true
        } else {
            $crate::exit_with_error!($($print_arg)*)
        }
    };
}

#[macro_export]
macro_rules! exit_on_none {
    ($option:expr, $($print_arg:tt)*) => {
        $option.unwrap_or_else(|| $crate::exit_with_error!($($print_arg)*))
    };
}

/// What went wrong while processing a single particle.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum FaultKind {
    #[error("position {position} is outside the physical domain along {dim} and no boundary condition applies")]
    DomainViolation { position: Point3<fpa>, dim: Dim3 },

    #[error("{quantity} became non-finite")]
    NumericOverflow { quantity: &'static str },

    #[error("shape stencil at cell coordinates {cell_coords} reaches outside the supplied {array} array")]
    StencilOutOfBounds {
        cell_coords: Point3<fpa>,
        array: &'static str,
    },
}

/// A fault attributed to a specific particle in a specific subdomain.
#[derive(Error, Clone, Debug, PartialEq)]
#[error("Particle {id} in box {box_index} on level {level}: {kind}")]
pub struct ParticleFault {
    pub id: ParticleId,
    pub level: usize,
    pub box_index: usize,
    pub kind: FaultKind,
}

/// How faults in individual particles affect the rest of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum FaultPolicy {
    /// The first fault makes the whole step fail.
    #[default]
    AbortStep,
    /// Faulty particles keep their state from before the step and are not
    /// deposited; the faults are reported once the step completes.
    Aggregate,
}

impl FromStr for FaultPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::AbortStep),
            "aggregate" => Ok(Self::Aggregate),
            _ => Err(ConfigError::InvalidParameter {
                name: "fault_policy".to_string(),
                message: format!("expected abort or aggregate, got {}", s),
            }),
        }
    }
}

/// Errors in species or simulation setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Shape order {0} is not supported (supported orders are 0 to 3)")]
    ShapeOrderUnsupported(u32),

    #[error("Invalid value for parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Missing parameter {0}")]
    MissingParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors returned by the species container operations.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Cannot {operation} while species is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Level {level} does not exist in the mesh context")]
    MissingLevel { level: usize },

    #[error("Expected data for {expected} local boxes on level {level}, got {actual}")]
    MismatchedBoxData {
        level: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Particle storage was allocated for a different decomposition; call alloc_data first")]
    StaleDecomposition,

    #[error("Injected particle at {position} lies outside box {box_index} on level {level}")]
    InjectionOutsideBox {
        level: usize,
        box_index: usize,
        position: Point3<fpa>,
    },

    #[error("Injected particle at {position} in box {box_index} on level {level} has weight {weight} and momentum {momentum}; the weight must be positive and the momentum finite")]
    InvalidInjectedParticle {
        level: usize,
        box_index: usize,
        position: Point3<fpa>,
        momentum: Vec3<fpa>,
        weight: fpa,
    },

    #[error("Inconsistent checkpoint: {0}")]
    InconsistentCheckpoint(String),

    #[error("{0}")]
    Fault(#[from] ParticleFault),
}
