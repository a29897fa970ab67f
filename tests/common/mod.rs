#![allow(dead_code)]

use lazy_static::lazy_static;
use picore::{
    cli,
    field::{required_ghost_cells, BoxArray3, Centering, CurrentArrays, ElectromagneticArrays, FieldLayout},
    geometry::{In3D, Point3, Vec3},
    grid::{
        decomposition::{Decomposition, MeshContext, SubdomainBox},
        IndexBox, LevelGeometry,
    },
    io::utils as io_utils,
    num::fpa,
    push::ParticleConstants,
    shape::ShapeOrder,
    species::{
        injection::{InjectedParticle, ManualInjector},
        SpeciesContainer, SpeciesKind, SpeciesProperties,
    },
};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

pub fn run<I, T>(args: I)
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    cli::run::run_with_args(COMMAND.clone().get_matches_from(args));
}

/// Temporary directory holding the input and output files of one test.
#[derive(Debug)]
pub struct Test {
    dir: TempDir,
}

impl Test {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("Could not create temporary directory"),
        }
    }

    pub fn path<S: AsRef<str>>(&self, file_name: S) -> PathBuf {
        self.dir.path().join(file_name.as_ref())
    }

    /// Writes the given text to a file in the test directory and returns its path.
    pub fn write_file<S: AsRef<str>>(&self, file_name: S, text: &str) -> PathBuf {
        let path = self.path(file_name);
        io_utils::write_text_file(text, &path).expect("Could not write test input file");
        path
    }
}

pub fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Reads particles written as CSV by the `evolve` command, as rows of
/// `x, y, z, ux, uy, uz, weight`.
pub fn read_particle_rows<P: AsRef<Path>>(file_path: P) -> Vec<[fpa; 7]> {
    let text = fs::read_to_string(file_path).expect("Could not read particle file");
    text.lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|line| {
            let values: Vec<fpa> = line
                .split(',')
                .map(|value| value.trim().parse().expect("Invalid number in particle file"))
                .collect();
            assert_eq!(values.len(), 7, "Unexpected particle line {}", line);
            [values[0], values[1], values[2], values[3], values[4], values[5], values[6]]
        })
        .collect()
}

/// Cubic domain of `n_cells` unit cells per dimension starting at the origin,
/// chopped into boxes of at most `max_box` cells.
pub fn unit_cell_context(n_cells: usize, max_box: usize) -> MeshContext {
    MeshContext::single_level(
        LevelGeometry::from_bounds(
            In3D::same(n_cells),
            Vec3::zero(),
            Vec3::equal_components(n_cells as fpa),
        ),
        &In3D::same(max_box),
    )
}

/// Two levels over the same cubic domain of `n_cells` unit coarse cells, the
/// second refined by a factor of two. Both levels are chopped into boxes of
/// at most `max_box` cells.
pub fn two_level_context(n_cells: usize, max_box: usize) -> MeshContext {
    let coarse = LevelGeometry::from_bounds(
        In3D::same(n_cells),
        Vec3::zero(),
        Vec3::equal_components(n_cells as fpa),
    );
    let fine = coarse.refined(2);
    let mut decomposition = Decomposition::uniform(coarse.domain(), &In3D::same(max_box), 1);
    let fine_level = decomposition.push_level(
        fine.domain()
            .chopped(&In3D::same(max_box))
            .into_iter()
            .map(|index_box| SubdomainBox::new(index_box, 0))
            .collect(),
    );
    assert_eq!(fine_level, 1);
    MeshContext::new(vec![coarse, fine], decomposition, 0)
}

pub fn species(
    kind: SpeciesKind,
    charge: fpa,
    speed_of_light: fpa,
    relativistic: bool,
    order: ShapeOrder,
) -> SpeciesProperties {
    SpeciesProperties::new(
        "test",
        kind,
        ParticleConstants::with_speed_of_light(charge, 1.0, speed_of_light, relativistic),
        order,
    )
}

pub fn injected(position: Point3<fpa>, momentum: Vec3<fpa>, weight: fpa) -> InjectedParticle {
    InjectedParticle {
        position,
        momentum,
        weight,
    }
}

/// Creates a container holding the given particles, ready to evolve.
pub fn populated_container(
    properties: SpeciesProperties,
    context: &MeshContext,
    particles: Vec<InjectedParticle>,
) -> SpeciesContainer {
    let mut container = SpeciesContainer::new(properties);
    container.alloc_data(context).unwrap();
    container
        .init_data(context, &mut ManualInjector::new(particles))
        .unwrap();
    container
}

/// Field and current arrays for every local box on one level.
pub struct LevelArrays {
    pub index_boxes: Vec<IndexBox>,
    pub n_ghost: usize,
    pub fields: Vec<ElectromagneticArrays>,
    pub currents: Vec<CurrentArrays>,
}

impl LevelArrays {
    /// Uniform fields on level zero.
    pub fn uniform(
        context: &MeshContext,
        order: ShapeOrder,
        electric: Vec3<fpa>,
        magnetic: Vec3<fpa>,
    ) -> Self {
        Self::uniform_on_level(context, 0, order, electric, magnetic)
    }

    pub fn uniform_on_level(
        context: &MeshContext,
        level: usize,
        order: ShapeOrder,
        electric: Vec3<fpa>,
        magnetic: Vec3<fpa>,
    ) -> Self {
        let n_ghost = required_ghost_cells(order);
        let index_boxes: Vec<_> = context
            .local_box_indices(level)
            .into_iter()
            .map(|box_index| *context.decomposition().boxes(level)[box_index].index_box())
            .collect();
        Self {
            n_ghost,
            fields: index_boxes
                .iter()
                .map(|index_box| {
                    ElectromagneticArrays::uniform(index_box, n_ghost, FieldLayout::Yee, &electric, &magnetic)
                })
                .collect(),
            currents: index_boxes
                .iter()
                .map(|index_box| CurrentArrays::zeros(index_box, n_ghost))
                .collect(),
            index_boxes,
        }
    }

    /// Creates zeroed nodal charge density arrays covering the same nodes
    /// as the current arrays.
    pub fn zeroed_densities(&self) -> Vec<BoxArray3> {
        self.index_boxes
            .iter()
            .map(|index_box| BoxArray3::zeros(index_box, self.n_ghost, Centering::nodal()))
            .collect()
    }

    pub fn reset_currents(&mut self) {
        self.currents.iter_mut().for_each(CurrentArrays::reset);
    }
}

lazy_static! {
    static ref COMMAND: clap::Command<'static> = cli::build::build().no_binary_name(true);
}
