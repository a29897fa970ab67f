//! Command line interface for evolving a species through a number of time steps.

use super::utils;
use crate::{
    config::{read_species_properties, ParameterSet, SimulationConfig},
    evolve::EvolveReport,
    field::{required_ghost_cells, BoxFields, CurrentArrays, ElectromagneticArrays},
    geometry::Dim3::{X, Y, Z},
    io::{utils as io_utils, OverwriteMode, Verbosity},
    particles::Particle,
    species::{injection::ManualInjector, SpeciesContainer},
};
use clap::{Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};

#[cfg(feature = "seeding")]
use crate::{geometry::Vec3, num::fpa, species::injection::RandomInjector};

/// Builds a representation of the `evolve` command line subcommand.
pub fn create_evolve_subcommand() -> Command<'static> {
    let command = Command::new("evolve")
        .about("Evolve a particle species in prescribed uniform fields")
        .long_about(
            "Evolve a particle species in prescribed uniform fields.\n\
             The simulation domain, fields, time stepping and species properties\n\
             are read from a parameter file with lines of the form `name = value`.",
        )
        .arg(
            Arg::new("param-file")
                .value_name("PARAM_FILE")
                .help("Path to the parameter file describing the simulation and species")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new("particle-file")
                .long("particle-file")
                .require_equals(true)
                .value_name("PATH")
                .help(
                    "Path to a CSV file with one particle per line: x,y,z[,ux,uy,uz[,weight]]",
                )
                .takes_value(true),
        )
        .arg(
            Arg::new("weight")
                .long("weight")
                .require_equals(true)
                .value_name("VALUE")
                .help("Weight of injected particles without explicit weight")
                .takes_value(true)
                .default_value("1.0"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .require_equals(true)
                .value_name("PATH")
                .help(
                    "Path where the final particles should be written\n\
                     (.csv, or .json/.pickle when compiled with serialization support)",
                )
                .takes_value(true),
        )
        .arg(
            Arg::new("overwrite")
                .long("overwrite")
                .help("Automatically overwrite any existing files")
                .conflicts_with("no-overwrite"),
        )
        .arg(
            Arg::new("no-overwrite")
                .long("no-overwrite")
                .help("Do not overwrite any existing files"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print status messages while evolving"),
        )
        .arg(
            Arg::new("progress")
                .short('p')
                .long("progress")
                .help("Show a progress bar over the time steps (implies `verbose`)"),
        );

    #[cfg(feature = "seeding")]
    let command = command
        .arg(
            Arg::new("particles-per-cell")
                .long("particles-per-cell")
                .require_equals(true)
                .value_name("NUMBER")
                .help("Inject this many particles at random positions in every cell")
                .takes_value(true)
                .conflicts_with("particle-file"),
        )
        .arg(
            Arg::new("drift-momentum")
                .long("drift-momentum")
                .require_equals(true)
                .use_value_delimiter(true)
                .require_value_delimiter(true)
                .value_name("UX,UY,UZ")
                .help("Mean momentum per unit rest mass of randomly injected particles")
                .takes_value(true)
                .number_of_values(3)
                .default_value("0,0,0"),
        )
        .arg(
            Arg::new("momentum-spread")
                .long("momentum-spread")
                .require_equals(true)
                .value_name("VALUE")
                .help("Largest deviation of each randomly injected momentum component from the mean")
                .takes_value(true)
                .default_value("0"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .require_equals(true)
                .value_name("NUMBER")
                .help("Seed for the random number generator")
                .takes_value(true)
                .default_value("0"),
        );

    command
}

/// Runs the actions for the `evolve` subcommand using the given arguments.
pub fn run_evolve_subcommand(arguments: &ArgMatches) {
    let param_file_path = Path::new(
        arguments
            .value_of("param-file")
            .expect("No value for required argument"),
    );
    let verbosity = utils::parse_verbosity(arguments, true);
    let overwrite_mode = utils::overwrite_mode_from_arguments(arguments);

    if verbosity.print_messages() {
        println!("Reading parameters from {}", param_file_path.display());
    }
    let parameters = exit_on_error!(
        ParameterSet::from_file(param_file_path),
        "Error: Could not read parameter file: {}"
    );
    let config = exit_on_error!(
        SimulationConfig::from_parameters(&parameters),
        "Error: Invalid simulation parameters: {}"
    );
    let properties = exit_on_error!(
        read_species_properties(&parameters),
        "Error: Invalid species parameters: {}"
    );

    let context = config.mesh_context();
    let mut container = SpeciesContainer::new(properties);
    exit_on_error!(
        container.alloc_data(&context),
        "Error: Could not allocate particle storage: {}"
    );

    let default_weight = utils::get_value_from_parseable_argument_with_default(arguments, "weight", 1.0);
    let n_injected = if let Some(particle_file_path) = arguments.value_of("particle-file") {
        let mut injector = exit_on_error!(
            ManualInjector::from_file(particle_file_path, default_weight),
            "Error: Could not read particle file: {}"
        );
        let n_outside = injector.number_outside_domain(context.level(0));
        if n_outside > 0 {
            eprintln!(
                "Warning: {} of {} particles in {} lie outside the domain and are ignored",
                n_outside,
                injector.number_of_particles(),
                particle_file_path
            );
        }
        exit_on_error!(
            container.init_data(&context, &mut injector),
            "Error: Could not inject particles: {}"
        )
    } else {
        inject_random_particles(arguments, &context, &mut container, default_weight)
    };

    if verbosity.print_messages() {
        println!(
            "Injected {} {} particles into {} boxes",
            n_injected,
            container.properties().name(),
            container.tiles(0).len()
        );
    }

    let (total_absorbed, total_faults) = evolve_steps(&config, &context, &mut container, &verbosity);

    if verbosity.print_messages() {
        println!(
            "Finished {} steps: {} particles remain, {} absorbed, {} faults",
            config.n_steps(),
            container.number_of_particles(),
            total_absorbed,
            total_faults
        );
    }

    if let Some(output_file_path) = arguments.value_of("output-file") {
        write_particles(&container, PathBuf::from(output_file_path), overwrite_mode, &verbosity);
    }
}

#[cfg(feature = "seeding")]
fn inject_random_particles(
    arguments: &ArgMatches,
    context: &crate::grid::decomposition::MeshContext,
    container: &mut SpeciesContainer,
    weight: fpa,
) -> usize {
    let particles_per_cell: usize =
        utils::get_value_from_parseable_argument_with_default(arguments, "particles-per-cell", 0);
    if particles_per_cell == 0 {
        exit_with_error!("Error: No particles to evolve (use --particle-file or --particles-per-cell)");
    }
    let drift_momentum: Vec<fpa> =
        utils::get_values_from_parseable_argument(arguments, "drift-momentum").unwrap_or_default();
    if drift_momentum.len() != 3 {
        exit_with_error!("Error: drift-momentum must have 3 values, got {}", drift_momentum.len());
    }
    let momentum_spread: fpa = utils::get_value_from_parseable_argument_with_default(arguments, "momentum-spread", 0.0);
    if !(weight > 0.0) || !(momentum_spread >= 0.0) {
        exit_with_error!("Error: Weight must be positive and momentum spread non-negative");
    }
    let seed: u64 = utils::get_value_from_parseable_argument_with_default(arguments, "seed", 0);

    let mut injector = RandomInjector::new(
        particles_per_cell,
        weight,
        Vec3::new(drift_momentum[0], drift_momentum[1], drift_momentum[2]),
        momentum_spread,
        seed,
    );
    exit_on_error!(
        container.init_data(context, &mut injector),
        "Error: Could not inject particles: {}"
    )
}

#[cfg(not(feature = "seeding"))]
fn inject_random_particles(
    _arguments: &ArgMatches,
    _context: &crate::grid::decomposition::MeshContext,
    _container: &mut SpeciesContainer,
    _weight: crate::num::fpa,
) -> usize {
    exit_with_error!("Error: No particle file specified")
}

/// Runs all time steps, executing the migrations flagged in each step.
fn evolve_steps(
    config: &SimulationConfig,
    context: &crate::grid::decomposition::MeshContext,
    container: &mut SpeciesContainer,
    verbosity: &Verbosity,
) -> (usize, usize) {
    let n_ghost = required_ghost_cells(container.properties().shape_order());
    let index_boxes: Vec<_> = context
        .local_box_indices(0)
        .into_iter()
        .map(|box_index| *context.decomposition().boxes(0)[box_index].index_box())
        .collect();
    let field_arrays: Vec<_> = index_boxes
        .iter()
        .map(|index_box| {
            ElectromagneticArrays::uniform(
                index_box,
                n_ghost,
                config.field_layout(),
                config.electric_field(),
                config.magnetic_field(),
            )
        })
        .collect();
    let fields: Vec<BoxFields> = field_arrays.iter().map(ElectromagneticArrays::view).collect();
    let mut currents: Vec<_> = index_boxes
        .iter()
        .map(|index_box| CurrentArrays::zeros(index_box, n_ghost))
        .collect();
    let settings = config.evolve_settings();

    let (mut total_absorbed, mut total_faults) = (0, 0);
    let progress_bar = verbosity.create_progress_bar(config.n_steps());
    for step in 0..config.n_steps() {
        currents.iter_mut().for_each(CurrentArrays::reset);
        let report = exit_on_error!(
            container.evolve(context, 0, &fields, &mut currents, &settings),
            "Error: Step {} failed: {}",
            step
        );
        total_absorbed += report.absorbed();
        total_faults += report.faults().len();
        if matches!(verbosity, Verbosity::Messages) {
            print_step_summary(step, &report);
        }

        let migrating = container.extract_particles(0, report.migrations());
        let lost = exit_on_error!(
            container.insert_particles(context, 0, migrating),
            "Error: Could not migrate particles: {}"
        );
        if !lost.is_empty() {
            eprintln!(
                "Warning: {} particles left every box in step {} and were dropped",
                lost.len(),
                step
            );
        }
        progress_bar.inc(1);
    }
    progress_bar.finish();
    (total_absorbed, total_faults)
}

fn print_step_summary(step: usize, report: &EvolveReport) {
    println!(
        "Step {}: {} particles, {} migrating, {} absorbed",
        step,
        report.total_particles(),
        report.migrations().len(),
        report.absorbed()
    );
    for fault in report.faults() {
        println!("  {}", fault);
    }
}

fn write_particles(
    container: &SpeciesContainer,
    mut output_file_path: PathBuf,
    overwrite_mode: OverwriteMode,
    verbosity: &Verbosity,
) {
    if output_file_path.extension().is_none() {
        output_file_path.set_extension("csv");
    }
    if !exit_on_error!(
        io_utils::write_allowed(&output_file_path, overwrite_mode),
        "Error: Could not check for existing output file: {}"
    ) {
        return;
    }
    if verbosity.print_messages() {
        println!("Writing particles to {}", output_file_path.display());
    }
    let extension = output_file_path
        .extension()
        .map(|extension| extension.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => exit_on_error!(
            io_utils::write_text_file(&particles_as_csv(container.particles()), &output_file_path),
            "Error: Could not write particle file: {}"
        ),
        #[cfg(feature = "json")]
        "json" => exit_on_error!(
            io_utils::save_data_as_json(&output_file_path, &container.checkpoint()),
            "Error: Could not write particle file: {}"
        ),
        #[cfg(feature = "pickle")]
        "pickle" => exit_on_error!(
            io_utils::save_data_as_pickle(&output_file_path, &container.checkpoint()),
            "Error: Could not write particle file: {}"
        ),
        _ => exit_with_error!(
            "Error: Unsupported output format for {}",
            output_file_path.display()
        ),
    }
}

/// Formats particles in the CSV format read by the manual injector.
fn particles_as_csv<'a, I: Iterator<Item = &'a Particle>>(particles: I) -> String {
    let mut text = String::from("# x,y,z,ux,uy,uz,weight\n");
    for particle in particles {
        let (position, momentum) = (particle.position, particle.momentum);
        text.push_str(&format!(
            "{:e},{:e},{:e},{:e},{:e},{:e},{:e}\n",
            position[X], position[Y], position[Z], momentum[X], momentum[Y], momentum[Z], particle.weight
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{Point3, Vec3},
        particles::ParticleId,
    };

    #[test]
    fn written_particles_can_be_read_back() {
        let particles = [
            Particle::new(
                Point3::new(0.25, -1.5e-3, 7.0),
                Vec3::new(1.0, 0.0, -2.5),
                3.0,
                ParticleId::new(0, 0),
            ),
            Particle::at_rest(Point3::new(1.0, 2.0, 3.0), 0.5, ParticleId::new(1, 0)),
        ];
        let text = particles_as_csv(particles.iter());
        let injector = ManualInjector::from_text(&text, 1.0).unwrap();
        assert_eq!(injector.number_of_particles(), 2);
    }
}
