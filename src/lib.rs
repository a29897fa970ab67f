//! The `picore` crate advances the macro-particles of a particle-in-cell plasma species
//! through one time step, coupling them to the electromagnetic field grid.

#[macro_use]
pub mod error;

pub mod boundary;
pub mod config;
pub mod constants;
pub mod deposit;
pub mod evolve;
pub mod field;
pub mod gather;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod num;
pub mod particles;
pub mod push;
pub mod shape;
pub mod species;

#[cfg(feature = "cli")]
pub mod cli;
