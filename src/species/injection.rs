//! Injection policies populating species containers with particles.

use crate::{
    geometry::{Dim3, Point3, Vec3},
    grid::{IndexBox, LevelGeometry},
    io::utils,
    num::fpa,
};
use std::{io, path::Path};

#[cfg(feature = "seeding")]
use crate::geometry::Dim3::{X, Y, Z};
#[cfg(feature = "seeding")]
use rand::{
    distributions::{Distribution, Uniform},
    rngs::StdRng,
    SeedableRng,
};

/// Initial state of a particle produced by an injector.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InjectedParticle {
    pub position: Point3<fpa>,
    pub momentum: Vec3<fpa>,
    pub weight: fpa,
}

/// Defines the properties of a policy deciding where particles are created.
pub trait ParticleInjector {
    /// Produces the particles to add to the given subdomain box.
    ///
    /// # Parameters
    ///
    /// - `level`: Refinement level of the box.
    /// - `geometry`: Geometry of the level.
    /// - `index_box`: Box of cells to inject into.
    ///
    /// # Returns
    ///
    /// The injected particles, all of which must lie inside the physical
    /// bounds of the box and have a positive weight and a finite momentum.
    fn inject(&mut self, level: usize, geometry: &LevelGeometry, index_box: &IndexBox) -> Vec<InjectedParticle>;
}

/// Whether the given position lies inside the physical bounds of the box.
fn box_contains(geometry: &LevelGeometry, index_box: &IndexBox, position: &Point3<fpa>) -> bool {
    index_box.contains_cell_coords(&geometry.cell_coords(position))
}

/// Injector placing explicitly listed particles on level zero.
#[derive(Clone, Debug, Default)]
pub struct ManualInjector {
    particles: Vec<InjectedParticle>,
}

impl ManualInjector {
    pub fn new(particles: Vec<InjectedParticle>) -> Self {
        Self { particles }
    }

    /// Creates a new injector with particles read from an input file.
    ///
    /// The input file is assumed to be in CSV format, with each line holding the
    /// comma-separated position of a particle, optionally followed by the three
    /// momentum components and the weight. Empty lines and lines starting with
    /// `#` are skipped.
    ///
    /// # Parameters
    ///
    /// - `input_file_path`: Path to the input file.
    /// - `default_weight`: Weight of particles whose line has no weight.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains a new `ManualInjector`.
    /// - `Err`: Contains an error encountered while trying to read or parse the input file.
    pub fn from_file<P: AsRef<Path>>(input_file_path: P, default_weight: fpa) -> io::Result<Self> {
        let text = utils::read_text_file(input_file_path)?;
        Self::from_text(&text, default_weight)
    }

    /// Parses particles from CSV text in the format described for [`Self::from_file`].
    pub fn from_text(text: &str, default_weight: fpa) -> io::Result<Self> {
        let particles = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| parse_particle_line(line, default_weight))
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self::new(particles))
    }

    pub fn number_of_particles(&self) -> usize {
        self.particles.len()
    }

    /// Returns the number of particles lying outside the domain of the given
    /// level-zero geometry, which no box will ever receive.
    pub fn number_outside_domain(&self, geometry: &LevelGeometry) -> usize {
        self.particles
            .iter()
            .filter(|particle| !box_contains(geometry, geometry.domain(), &particle.position))
            .count()
    }
}

fn parse_particle_line(line: &str, default_weight: fpa) -> io::Result<InjectedParticle> {
    let values = line
        .split(',')
        .map(|value_str| {
            value_str.trim().parse::<fpa>().map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed parsing value {} in input file: {}", value_str, err),
                )
            })
        })
        .collect::<io::Result<Vec<fpa>>>()?;
    let (momentum, weight) = match values.len() {
        3 => (Vec3::zero(), default_weight),
        6 => (Vec3::with_each_component(|dim| values[3 + dim.num()]), default_weight),
        7 => (Vec3::with_each_component(|dim| values[3 + dim.num()]), values[6]),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Expected 3, 6 or 7 values in input file line: {}", line),
            ))
        }
    };
    if !(weight > 0.0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Particle weight must be positive in input file line: {}", line),
        ));
    }
    Ok(InjectedParticle {
        position: Point3::with_each_component(|dim: Dim3| values[dim.num()]),
        momentum,
        weight,
    })
}

impl ParticleInjector for ManualInjector {
    fn inject(&mut self, level: usize, geometry: &LevelGeometry, index_box: &IndexBox) -> Vec<InjectedParticle> {
        if level != 0 {
            return Vec::new();
        }
        self.particles
            .iter()
            .filter(|particle| box_contains(geometry, index_box, &particle.position))
            .copied()
            .collect()
    }
}

/// Injector placing a fixed number of particles at random positions in every
/// cell of level zero, with momenta drawn uniformly around a drift momentum.
#[cfg(feature = "seeding")]
#[derive(Clone, Debug)]
pub struct RandomInjector {
    particles_per_cell: usize,
    weight: fpa,
    drift_momentum: Vec3<fpa>,
    momentum_spread: fpa,
    rng: StdRng,
}

#[cfg(feature = "seeding")]
impl RandomInjector {
    /// Creates a new random injector.
    ///
    /// # Parameters
    ///
    /// - `particles_per_cell`: Number of particles to create in each cell.
    /// - `weight`: Weight of each particle.
    /// - `drift_momentum`: Mean momentum per unit rest mass.
    /// - `momentum_spread`: Largest deviation of each momentum component from the mean.
    /// - `seed`: Seed for the random number generator, making injection reproducible.
    ///
    /// # Panics
    ///
    /// If the weight is not positive or the momentum spread is negative.
    pub fn new(
        particles_per_cell: usize,
        weight: fpa,
        drift_momentum: Vec3<fpa>,
        momentum_spread: fpa,
        seed: u64,
    ) -> Self {
        assert!(weight > 0.0, "Particle weight must be positive");
        assert!(momentum_spread >= 0.0, "Momentum spread must not be negative");
        Self {
            particles_per_cell,
            weight,
            drift_momentum,
            momentum_spread,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

#[cfg(feature = "seeding")]
impl ParticleInjector for RandomInjector {
    fn inject(&mut self, level: usize, geometry: &LevelGeometry, index_box: &IndexBox) -> Vec<InjectedParticle> {
        if level != 0 || self.particles_per_cell == 0 {
            return Vec::new();
        }
        let unit_offsets = Uniform::<fpa>::new(0.0, 1.0);
        let lower = index_box.lower();
        let shape = index_box.shape();
        let mut particles = Vec::with_capacity(index_box.number_of_cells() * self.particles_per_cell);
        for k in 0..shape[Z] as isize {
            for j in 0..shape[Y] as isize {
                for i in 0..shape[X] as isize {
                    for _ in 0..self.particles_per_cell {
                        let cell_coords = Point3::new(
                            (lower[X] + i) as fpa + unit_offsets.sample(&mut self.rng),
                            (lower[Y] + j) as fpa + unit_offsets.sample(&mut self.rng),
                            (lower[Z] + k) as fpa + unit_offsets.sample(&mut self.rng),
                        );
                        let position = geometry.position(&cell_coords);
                        let momentum = if self.momentum_spread > 0.0 {
                            let deviations = Uniform::new_inclusive(-self.momentum_spread, self.momentum_spread);
                            self.drift_momentum
                                + Vec3::with_each_component(|_| deviations.sample(&mut self.rng))
                        } else {
                            self.drift_momentum
                        };
                        if box_contains(geometry, index_box, &position) {
                            particles.push(InjectedParticle {
                                position,
                                momentum,
                                weight: self.weight,
                            });
                        }
                    }
                }
            }
        }
        particles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Idx3, In3D};

    fn geometry() -> LevelGeometry {
        LevelGeometry::from_bounds(In3D::same(4), Vec3::zero(), Vec3::equal_components(1.0))
    }

    #[test]
    fn manual_particles_are_parsed_from_csv() {
        let text = "# x, y, z, ux, uy, uz, w\n0.1, 0.2, 0.3\n\n0.6,0.6,0.6, 1.0, 0.0, -1.0\n0.9, 0.1, 0.1, 0, 0, 0, 2.5\n";
        let injector = ManualInjector::from_text(text, 1.5).unwrap();
        assert_eq!(injector.number_of_particles(), 3);
        assert_eq!(injector.particles[0].weight, 1.5);
        assert_eq!(injector.particles[1].momentum, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(injector.particles[2].weight, 2.5);
    }

    #[test]
    fn malformed_lines_are_rejected() {
        assert!(ManualInjector::from_text("0.1, 0.2\n", 1.0).is_err());
        assert!(ManualInjector::from_text("0.1, 0.2, zero\n", 1.0).is_err());
        assert!(ManualInjector::from_text("0.1, 0.2, 0.3, 0, 0, 0, -1\n", 1.0).is_err());
    }

    #[test]
    fn manual_injection_only_fills_containing_box() {
        let mut injector = ManualInjector::from_text("0.1, 0.1, 0.1\n0.6, 0.1, 0.1\n", 1.0).unwrap();
        let lower_box = IndexBox::new(Idx3::same(0), In3D::new(2, 4, 4));
        let upper_box = IndexBox::new(Idx3::new(2, 0, 0), In3D::new(2, 4, 4));
        assert_eq!(injector.inject(0, &geometry(), &lower_box).len(), 1);
        assert_eq!(injector.inject(0, &geometry(), &upper_box)[0].position[Dim3::X], 0.6);
        assert!(injector.inject(1, &geometry(), &upper_box).is_empty());
    }

    #[test]
    fn particles_outside_domain_are_counted() {
        let injector =
            ManualInjector::from_text("0.5, 0.5, 0.5\n1.5, 0.5, 0.5\n0.2, -0.1, 0.9\n", 1.0).unwrap();
        assert_eq!(injector.number_outside_domain(&geometry()), 2);
        let mut injector = injector;
        assert_eq!(injector.inject(0, &geometry(), geometry().domain()).len(), 1);
    }

    #[cfg(feature = "seeding")]
    #[test]
    fn random_injection_is_reproducible_and_inside_box() {
        let index_box = IndexBox::new(Idx3::new(1, 0, 2), In3D::new(2, 2, 2));
        let mut first = RandomInjector::new(3, 1.0, Vec3::new(0.0, 0.0, 1.0), 0.1, 42);
        let mut second = RandomInjector::new(3, 1.0, Vec3::new(0.0, 0.0, 1.0), 0.1, 42);
        let particles = first.inject(0, &geometry(), &index_box);
        assert_eq!(particles.len(), 24);
        assert_eq!(particles, second.inject(0, &geometry(), &index_box));
        for particle in &particles {
            assert!(box_contains(&geometry(), &index_box, &particle.position));
            assert!((particle.momentum[Dim3::Z] - 1.0).abs() <= 0.1);
        }
    }
}
