//! Functions for running the command line program.

use super::{build, evolve::run_evolve_subcommand};
use clap::ArgMatches;
use std::time::Instant;

/// Runs the `picore` command line program.
pub fn run() {
    let command = build::build();
    run_with_args(command.get_matches());
}

/// Runs the `picore` command line program with the given parsed arguments.
pub fn run_with_args(arguments: ArgMatches) {
    let start_instant = Instant::now();

    if let Some(evolve_arguments) = arguments.subcommand_matches("evolve") {
        run_evolve_subcommand(evolve_arguments);
    }

    if arguments.is_present("timing") {
        println!("Elapsed time: {} s", start_instant.elapsed().as_secs_f64());
    }
}
