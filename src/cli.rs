//! Command line interface.

pub mod build;
pub mod evolve;
pub mod run;
pub mod utils;
