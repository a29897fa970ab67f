//! Simulation and species configuration read from `name = value` parameter files.

use crate::{
    boundary::{BoundaryCondition, DomainBoundaries},
    constants::{ELECTRON_MASS, ELEMENTARY_CHARGE, PROTON_MASS, SPEED_OF_LIGHT},
    error::{ConfigError, FaultPolicy},
    evolve::EvolveSettings,
    field::FieldLayout,
    geometry::{Dim3, In3D, Vec3},
    grid::{decomposition::MeshContext, LevelGeometry},
    io::utils,
    num::fpa,
    push::{ParticleConstants, PusherKind},
    shape::ShapeOrder,
    species::{restart::RestartRequirement, SpeciesKind, SpeciesProperties},
};
use regex::Regex;
use std::{collections::HashMap, convert::TryFrom, io, path::Path, str, string};

/// Set of parameter names and values read from a parameter file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: HashMap<String, String>,
}

impl ParameterSet {
    /// Reads and parses the parameter file at the given path.
    pub fn from_file<P: AsRef<Path>>(param_file_path: P) -> io::Result<Self> {
        let text = utils::read_text_file(param_file_path)?;
        Ok(Self::from_text(&text))
    }

    /// Parses every line of the form `name = value` in the given text.
    ///
    /// Other lines, such as comments, are ignored.
    pub fn from_text(text: &str) -> Self {
        let regex = Regex::new(r"(?m)^\s*([_\w]+)\s*=\s*(.+?)\s*$").unwrap();
        Self {
            values: regex
                .captures_iter(text)
                .map(|captures| (captures[1].to_string(), captures[2].to_string()))
                .collect(),
        }
    }

    /// Returns a list of all parameter names in the parameter set.
    pub fn parameter_names(&self) -> Vec<&str> {
        self.values.keys().map(|s| s.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns the value of the string parameter with the given name.
    pub fn get_str_param<'a, 'b>(&'a self, name: &'b str) -> io::Result<&'a str> {
        match self.values.get(name) {
            Some(value) => Ok(value.trim_matches('"')),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Parameter {} not found in parameter file", name),
            )),
        }
    }

    /// Returns the value of the numerical parameter with the given name.
    pub fn get_numerical_param<T>(&self, name: &str) -> io::Result<T>
    where
        T: num::Num + str::FromStr,
        T::Err: string::ToString,
    {
        let str_value = self.get_str_param(name)?;
        match str_value.parse::<T>() {
            Ok(value) => Ok(value),
            Err(err) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Failed parsing string {} for parameter {}: {}",
                    str_value,
                    name,
                    err.to_string()
                ),
            )),
        }
    }

    /// Returns the value of the numerical parameter with the given name, or
    /// the given default if the parameter is absent.
    pub fn get_numerical_param_or<T>(&self, name: &str, default: T) -> io::Result<T>
    where
        T: num::Num + str::FromStr,
        T::Err: string::ToString,
    {
        if self.contains(name) {
            self.get_numerical_param(name)
        } else {
            Ok(default)
        }
    }

    /// Returns the value of the boolean parameter with the given name, or the
    /// given default if the parameter is absent.
    ///
    /// Accepts `true`/`false`, `yes`/`no` and `1`/`0`.
    pub fn get_bool_param_or(&self, name: &str, default: bool) -> io::Result<bool> {
        if !self.contains(name) {
            return Ok(default);
        }
        let str_value = self.get_str_param(name)?;
        match str_value.to_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed parsing string {} for parameter {} as boolean", str_value, name),
            )),
        }
    }

    /// Parses the parameter with the given name through its `FromStr`
    /// implementation, or returns the given default if it is absent.
    pub fn get_parsed_param_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: str::FromStr<Err = ConfigError>,
    {
        if self.contains(name) {
            self.get_str_param(name)?.parse()
        } else {
            Ok(default)
        }
    }

    /// Reads the three components `{prefix}_x`, `{prefix}_y` and `{prefix}_z`,
    /// using the given default for absent components.
    fn get_vector_param_or(&self, prefix: &str, default: fpa) -> io::Result<Vec3<fpa>> {
        let mut vector = Vec3::zero();
        for dim in Dim3::slice() {
            vector[dim] = self.get_numerical_param_or(&format!("{}_{}", prefix, dim), default)?;
        }
        Ok(vector)
    }
}

fn invalid<S: Into<String>>(name: &str, message: S) -> ConfigError {
    ConfigError::InvalidParameter {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Setup of a single-level simulation with externally prescribed uniform fields.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    cells: In3D<usize>,
    lower_bounds: Vec3<fpa>,
    upper_bounds: Vec3<fpa>,
    max_box_shape: In3D<usize>,
    boundaries: DomainBoundaries,
    time_step: fpa,
    n_steps: usize,
    field_layout: FieldLayout,
    electric_field: Vec3<fpa>,
    magnetic_field: Vec3<fpa>,
    fault_policy: FaultPolicy,
}

impl SimulationConfig {
    /// Reads the simulation setup from the given parameters.
    ///
    /// Recognized parameters (defaults in parentheses):
    ///
    /// - `cells_x`, `cells_y`, `cells_z`: Number of grid cells.
    /// - `lower_x`, ... (0) and `upper_x`, ... (1): Physical domain bounds.
    /// - `max_box_x`, ... (number of cells): Largest subdomain box extent.
    /// - `boundary_x_lower`, `boundary_x_upper`, ... (periodic): Boundary conditions.
    /// - `dt`: Time step.
    /// - `n_steps` (1): Number of steps to run.
    /// - `field_layout` (yee): `collocated` or `yee`.
    /// - `e_x`, ..., `b_x`, ... (0): Uniform electric and magnetic field.
    /// - `fault_policy` (abort): `abort` or `aggregate`.
    pub fn from_parameters(parameters: &ParameterSet) -> Result<Self, ConfigError> {
        let mut cells = In3D::same(0);
        let mut max_box_shape = In3D::same(0);
        for dim in Dim3::slice() {
            let name = format!("cells_{}", dim);
            cells[dim] = parameters.get_numerical_param::<usize>(&name)?;
            if cells[dim] == 0 {
                return Err(invalid(&name, "number of cells must be positive"));
            }
            let name = format!("max_box_{}", dim);
            max_box_shape[dim] = parameters.get_numerical_param_or::<usize>(&name, cells[dim])?;
            if max_box_shape[dim] == 0 {
                return Err(invalid(&name, "box extent must be positive"));
            }
        }

        let lower_bounds = parameters.get_vector_param_or("lower", 0.0)?;
        let upper_bounds = parameters.get_vector_param_or("upper", 1.0)?;
        for dim in Dim3::slice() {
            if !(upper_bounds[dim] > lower_bounds[dim]) || !upper_bounds[dim].is_finite() || !lower_bounds[dim].is_finite() {
                return Err(invalid(
                    &format!("upper_{}", dim),
                    format!(
                        "domain bounds [{}, {}] are not a finite non-empty interval",
                        lower_bounds[dim], upper_bounds[dim]
                    ),
                ));
            }
        }

        let mut lower_conditions = In3D::same(BoundaryCondition::Periodic);
        let mut upper_conditions = In3D::same(BoundaryCondition::Periodic);
        for dim in Dim3::slice() {
            lower_conditions[dim] = parameters
                .get_parsed_param_or(&format!("boundary_{}_lower", dim), BoundaryCondition::Periodic)?;
            upper_conditions[dim] = parameters
                .get_parsed_param_or(&format!("boundary_{}_upper", dim), BoundaryCondition::Periodic)?;
        }
        let boundaries = DomainBoundaries::new(lower_conditions, upper_conditions)?;

        let time_step = parameters.get_numerical_param::<fpa>("dt")?;
        if !(time_step > 0.0 && time_step.is_finite()) {
            return Err(invalid("dt", "time step must be positive and finite"));
        }
        let n_steps = parameters.get_numerical_param_or::<usize>("n_steps", 1)?;

        let electric_field = parameters.get_vector_param_or("e", 0.0)?;
        let magnetic_field = parameters.get_vector_param_or("b", 0.0)?;

        Ok(Self {
            cells,
            lower_bounds,
            upper_bounds,
            max_box_shape,
            boundaries,
            time_step,
            n_steps,
            field_layout: parameters.get_parsed_param_or("field_layout", FieldLayout::Yee)?,
            electric_field,
            magnetic_field,
            fault_policy: parameters.get_parsed_param_or("fault_policy", FaultPolicy::AbortStep)?,
        })
    }

    pub fn cells(&self) -> &In3D<usize> {
        &self.cells
    }

    pub fn max_box_shape(&self) -> &In3D<usize> {
        &self.max_box_shape
    }

    pub fn boundaries(&self) -> &DomainBoundaries {
        &self.boundaries
    }

    pub fn time_step(&self) -> fpa {
        self.time_step
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn field_layout(&self) -> FieldLayout {
        self.field_layout
    }

    pub fn electric_field(&self) -> &Vec3<fpa> {
        &self.electric_field
    }

    pub fn magnetic_field(&self) -> &Vec3<fpa> {
        &self.magnetic_field
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        self.fault_policy
    }

    /// Creates the geometry of the simulation domain.
    pub fn geometry(&self) -> LevelGeometry {
        LevelGeometry::from_bounds(self.cells, self.lower_bounds, self.upper_bounds)
    }

    /// Creates a single-rank mesh context with the domain chopped into boxes.
    pub fn mesh_context(&self) -> MeshContext {
        MeshContext::single_level(self.geometry(), &self.max_box_shape)
    }

    pub fn evolve_settings(&self) -> EvolveSettings {
        EvolveSettings::new(self.time_step)
            .with_boundaries(self.boundaries)
            .with_fault_policy(self.fault_policy)
    }
}

/// Reads the properties of a species from the given parameters.
///
/// Recognized parameters (defaults in parentheses):
///
/// - `species_name` (electrons): Name of the species.
/// - `species_kind` (physical): `physical`, `rigid` or `photon`.
/// - `injection_plane_z`: Plane where rigid-injected particles start to couple.
/// - `particle` (electron): `electron`, `positron` or `proton`, giving default
/// charge and mass.
/// - `charge`, `mass`: Explicit charge and mass of a physical particle.
/// - `relativistic` (true): Whether the Lorentz factor is accounted for.
/// - `speed_of_light` (SI value).
/// - `shape_order` (1): Order of the particle shape, 0 to 3.
/// - `pusher` (boris): `boris` or `vay`.
/// - `restart` (depends on kind): `repopulate` or `recompute`.
pub fn read_species_properties(parameters: &ParameterSet) -> Result<SpeciesProperties, ConfigError> {
    let name = if parameters.contains("species_name") {
        parameters.get_str_param("species_name")?.to_string()
    } else {
        "electrons".to_string()
    };

    let kind = if parameters.contains("species_kind") {
        match parameters.get_str_param("species_kind")?.to_lowercase().as_str() {
            "physical" => SpeciesKind::Physical,
            "rigid" | "rigid_injected" => SpeciesKind::RigidInjected {
                injection_plane_z: parameters.get_numerical_param("injection_plane_z")?,
            },
            "photon" => SpeciesKind::Photon,
            other => {
                return Err(invalid(
                    "species_kind",
                    format!("expected physical, rigid or photon, got {}", other),
                ))
            }
        }
    } else {
        SpeciesKind::Physical
    };

    let (default_charge, default_mass) = if parameters.contains("particle") {
        match parameters.get_str_param("particle")?.to_lowercase().as_str() {
            "electron" => (-ELEMENTARY_CHARGE, ELECTRON_MASS),
            "positron" => (ELEMENTARY_CHARGE, ELECTRON_MASS),
            "proton" => (ELEMENTARY_CHARGE, PROTON_MASS),
            other => {
                return Err(invalid(
                    "particle",
                    format!("expected electron, positron or proton, got {}", other),
                ))
            }
        }
    } else {
        (-ELEMENTARY_CHARGE, ELECTRON_MASS)
    };

    let charge = if kind == SpeciesKind::Photon {
        if parameters.get_numerical_param_or::<fpa>("charge", 0.0)? != 0.0 {
            return Err(invalid("charge", "photons cannot carry charge"));
        }
        0.0
    } else {
        parameters.get_numerical_param_or("charge", default_charge)?
    };
    if !charge.is_finite() {
        return Err(invalid("charge", "charge must be finite"));
    }
    let mass = parameters.get_numerical_param_or("mass", default_mass)?;
    if !(mass > 0.0 && mass.is_finite()) {
        return Err(invalid("mass", "mass must be positive and finite"));
    }
    let speed_of_light = parameters.get_numerical_param_or("speed_of_light", SPEED_OF_LIGHT)?;
    if !(speed_of_light > 0.0 && speed_of_light.is_finite()) {
        return Err(invalid("speed_of_light", "speed of light must be positive and finite"));
    }
    let relativistic = parameters.get_bool_param_or("relativistic", true)?;

    let shape_order = ShapeOrder::try_from(parameters.get_numerical_param_or::<u32>("shape_order", 1)?)?;

    Ok(SpeciesProperties::new(
        name,
        kind,
        ParticleConstants::with_speed_of_light(charge, mass, speed_of_light, relativistic),
        shape_order,
    )
    .with_pusher(parameters.get_parsed_param_or("pusher", PusherKind::default())?)
    .with_restart_requirement(
        parameters.get_parsed_param_or::<RestartRequirement>("restart", kind.default_restart_requirement())?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Dim3::{X, Z};

    #[test]
    fn param_parsing_works() {
        #![allow(clippy::float_cmp)]
        let text = "int = 12 \n file_str=\"file.ext\"\nfloat =  -1.02E-07\ninvalid = number\n;comment";
        let parameters = ParameterSet::from_text(text);
        assert_eq!(parameters.parameter_names().len(), 4);
        assert_eq!(parameters.get_str_param("file_str").unwrap(), "file.ext");
        assert_eq!(parameters.get_numerical_param::<u32>("int").unwrap(), 12);
        assert_eq!(parameters.get_numerical_param::<f64>("float").unwrap(), -1.02e-7);
        assert!(parameters.get_numerical_param::<f64>("invalid").is_err());
        assert!(parameters.get_numerical_param::<f64>("missing").is_err());
        assert_eq!(parameters.get_numerical_param_or::<u32>("missing", 3).unwrap(), 3);
    }

    #[test]
    fn simulation_setup_is_read_with_defaults() {
        let parameters = ParameterSet::from_text(
            "cells_x = 8\ncells_y = 4\ncells_z = 2\nupper_x = 2.0\nmax_box_x = 4\n\
             boundary_z_lower = reflecting\nboundary_z_upper = absorbing\n\
             dt = 0.01\nn_steps = 100\ne_x = 1.0\nfault_policy = aggregate\n",
        );
        let config = SimulationConfig::from_parameters(&parameters).unwrap();
        assert_eq!(config.cells(), &In3D::new(8, 4, 2));
        assert_eq!(config.max_box_shape(), &In3D::new(4, 4, 2));
        assert_eq!(config.boundaries().lower()[Z], BoundaryCondition::Reflecting);
        assert_eq!(config.boundaries().upper()[Z], BoundaryCondition::Absorbing);
        assert_eq!(config.boundaries().upper()[X], BoundaryCondition::Periodic);
        assert_eq!(config.n_steps(), 100);
        assert_eq!(config.field_layout(), FieldLayout::Yee);
        assert_eq!(config.electric_field(), &Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(config.fault_policy(), FaultPolicy::Aggregate);
        assert_eq!(config.geometry().cell_extents()[X], 0.25);
        assert_eq!(config.mesh_context().decomposition().boxes(0).len(), 2);
    }

    #[test]
    fn invalid_simulation_setups_are_rejected() {
        let base = "cells_x = 8\ncells_y = 4\ncells_z = 2\ndt = 0.1\n";
        for extra in [
            "dt = -1.0\n",
            "lower_y = 2.0\n",
            "boundary_x_lower = absorbing\n",
            "field_layout = staggered\n",
            "cells_z = 0\n",
        ] {
            let parameters = ParameterSet::from_text(&format!("{}{}", base, extra));
            assert!(SimulationConfig::from_parameters(&parameters).is_err(), "{}", extra);
        }
        assert!(SimulationConfig::from_parameters(&ParameterSet::from_text("cells_x = 8\n")).is_err());
    }

    #[test]
    fn species_properties_are_read() {
        let parameters = ParameterSet::from_text(
            "species_name = \"beam\"\nspecies_kind = rigid\ninjection_plane_z = 0.5\n\
             particle = proton\nshape_order = 3\npusher = vay\nrelativistic = no\n",
        );
        let properties = read_species_properties(&parameters).unwrap();
        assert_eq!(properties.name(), "beam");
        assert_eq!(properties.kind(), SpeciesKind::RigidInjected { injection_plane_z: 0.5 });
        assert_eq!(properties.constants().mass(), PROTON_MASS);
        assert_eq!(properties.constants().charge(), ELEMENTARY_CHARGE);
        assert!(!properties.constants().is_relativistic());
        assert_eq!(properties.shape_order(), ShapeOrder::Three);
        assert_eq!(properties.pusher(), PusherKind::Vay);
        assert_eq!(properties.restart_requirement(), RestartRequirement::RepopulateAndRecompute);
    }

    #[test]
    fn invalid_species_are_rejected() {
        for text in [
            "shape_order = 4\n",
            "species_kind = photon\ncharge = 1.0\n",
            "species_kind = rigid\n",
            "mass = 0\n",
            "pusher = leapfrog\n",
            "restart = never\n",
        ] {
            assert!(read_species_properties(&ParameterSet::from_text(text)).is_err(), "{}", text);
        }
        let photons = read_species_properties(&ParameterSet::from_text("species_kind = photon\n")).unwrap();
        assert_eq!(photons.constants().charge(), 0.0);
        assert_eq!(photons.restart_requirement(), RestartRequirement::RepopulateOnly);
        let electrons = read_species_properties(&ParameterSet::default()).unwrap();
        assert_eq!(electrons.constants().charge(), -ELEMENTARY_CHARGE);
        assert_eq!(electrons.pusher(), PusherKind::Boris);
        assert_eq!(electrons.constants().speed_of_light(), SPEED_OF_LIGHT);
    }
}
