//! Grid arrays for the fields and currents of a subdomain box.
//!
//! Field data is handed to the particle kernels as read-only [`FieldView3`]s,
//! while currents and charge are written through exclusive
//! [`ScalarAccumulator3`]s. Both carry the global index of their first
//! element, so kernels work in the global index space of the level.

use crate::{
    error::ConfigError,
    geometry::{
        Dim3::{self, X, Y, Z},
        Idx3, In3D, Vec3,
    },
    grid::IndexBox,
    num::fpa,
    shape::ShapeOrder,
};
use ndarray::prelude::*;
use std::str::FromStr;

/// Location of array samples relative to the grid nodes, per dimension.
///
/// A staggered dimension has its samples half a cell above the nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Centering(In3D<bool>);

impl Centering {
    /// Samples located on the grid nodes.
    pub fn nodal() -> Self {
        Self(In3D::same(false))
    }

    /// Samples staggered along the given dimension only, like an edge-centered
    /// electric field or current component.
    pub fn edge(dim: Dim3) -> Self {
        Self(In3D::with_each_component(|d| d == dim))
    }

    /// Samples staggered along every dimension except the given one, like a
    /// face-centered magnetic field component.
    pub fn face(dim: Dim3) -> Self {
        Self(In3D::with_each_component(|d| d != dim))
    }

    pub fn is_staggered(&self, dim: Dim3) -> bool {
        self.0[dim]
    }

    /// Offset of the samples from the nodes in cell units.
    pub fn offset(&self, dim: Dim3) -> fpa {
        if self.0[dim] {
            0.5
        } else {
            0.0
        }
    }
}

/// How the components of the electromagnetic field are placed on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldLayout {
    /// All components on the nodes.
    Collocated,
    /// Yee staggering: E on cell edges, B on cell faces.
    Yee,
}

impl FieldLayout {
    pub fn electric_centering(self, dim: Dim3) -> Centering {
        match self {
            Self::Collocated => Centering::nodal(),
            Self::Yee => Centering::edge(dim),
        }
    }

    pub fn magnetic_centering(self, dim: Dim3) -> Centering {
        match self {
            Self::Collocated => Centering::nodal(),
            Self::Yee => Centering::face(dim),
        }
    }
}

impl FromStr for FieldLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "collocated" => Ok(Self::Collocated),
            "yee" => Ok(Self::Yee),
            _ => Err(ConfigError::InvalidParameter {
                name: "field_layout".to_string(),
                message: format!("expected collocated or yee, got {}", s),
            }),
        }
    }
}

/// Number of ghost cells box arrays need so that particles inside the box,
/// or at most one cell outside it after a push, stay within reach of every
/// stencil of the given order.
pub fn required_ghost_cells(order: ShapeOrder) -> usize {
    order.stencil_half_width() + 1
}

/// An owned array of samples covering a box and its ghost cells.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxArray3 {
    values: Array3<fpa>,
    lower: Idx3<isize>,
    centering: Centering,
}

impl BoxArray3 {
    /// Creates a zeroed array with one sample per node of the given box grown
    /// by the given number of ghost cells.
    pub fn zeros(index_box: &IndexBox, n_ghost: usize, centering: Centering) -> Self {
        let grown = index_box.grown(n_ghost);
        let shape = grown.shape();
        Self {
            values: Array3::zeros((shape[X] + 1, shape[Y] + 1, shape[Z] + 1)),
            lower: *grown.lower(),
            centering,
        }
    }

    /// Creates an array over the given box and ghost cells with every sample
    /// set to the given value.
    pub fn constant(index_box: &IndexBox, n_ghost: usize, centering: Centering, value: fpa) -> Self {
        let mut array = Self::zeros(index_box, n_ghost, centering);
        array.values.fill(value);
        array
    }

    /// Creates an array over the given box and ghost cells with samples
    /// computed from their global indices.
    pub fn from_fn<C>(index_box: &IndexBox, n_ghost: usize, centering: Centering, compute: C) -> Self
    where
        C: Fn(Idx3<isize>) -> fpa,
    {
        let mut array = Self::zeros(index_box, n_ghost, centering);
        let lower = array.lower;
        array.values.indexed_iter_mut().for_each(|((i, j, k), value)| {
            *value = compute(Idx3::new(
                lower[X] + i as isize,
                lower[Y] + j as isize,
                lower[Z] + k as isize,
            ))
        });
        array
    }

    /// Global index of the first sample.
    pub fn lower(&self) -> &Idx3<isize> {
        &self.lower
    }

    pub fn centering(&self) -> Centering {
        self.centering
    }

    pub fn values(&self) -> &Array3<fpa> {
        &self.values
    }

    /// Returns the sample at the given global index, if covered by the array.
    pub fn get(&self, idx: &Idx3<isize>) -> Option<fpa> {
        self.view().get(idx)
    }

    /// Sets every sample to zero.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
    }

    /// Adds the samples of the given array, which must cover the same indices.
    pub fn add_assign(&mut self, other: &Self) {
        assert_eq!(self.lower, other.lower, "Array extents must match");
        self.values += &other.values;
    }

    /// Creates a zeroed array with the same extent and centering.
    pub fn zeros_like(&self) -> Self {
        Self {
            values: Array3::zeros(self.values.raw_dim()),
            lower: self.lower,
            centering: self.centering,
        }
    }

    /// Borrows the array as a read-only field view.
    pub fn view(&self) -> FieldView3<'_> {
        FieldView3::new(self.values.view(), self.lower, self.centering)
    }

    /// Borrows the array as an additive write target.
    pub fn accumulator(&mut self) -> ScalarAccumulator3<'_> {
        ScalarAccumulator3::new(self.values.view_mut(), self.lower)
    }
}

/// Checks that the node window `[first, end)` along each dimension lies
/// inside an array of the given shape starting at `lower`.
fn window_is_inside(lower: &Idx3<isize>, shape: &[usize], first: &Idx3<isize>, end: &Idx3<isize>) -> bool {
    Dim3::slice().into_iter().all(|dim| {
        first[dim] >= lower[dim] && end[dim] <= lower[dim] + shape[dim.num()] as isize
    })
}

/// Read-only view of one field component over a box and its ghost cells.
#[derive(Clone, Debug)]
pub struct FieldView3<'a> {
    values: ArrayView3<'a, fpa>,
    lower: Idx3<isize>,
    centering: Centering,
}

impl<'a> FieldView3<'a> {
    /// Wraps the given array, whose first element has global index `lower`.
    pub fn new(values: ArrayView3<'a, fpa>, lower: Idx3<isize>, centering: Centering) -> Self {
        Self {
            values,
            lower,
            centering,
        }
    }

    pub fn lower(&self) -> &Idx3<isize> {
        &self.lower
    }

    pub fn centering(&self) -> Centering {
        self.centering
    }

    pub fn values(&self) -> &ArrayView3<'a, fpa> {
        &self.values
    }

    /// Whether the node window `[first, end)` is covered by the view.
    pub fn covers(&self, first: &Idx3<isize>, end: &Idx3<isize>) -> bool {
        window_is_inside(&self.lower, self.values.shape(), first, end)
    }

    /// Returns the sample at the given global index, if covered by the view.
    pub fn get(&self, idx: &Idx3<isize>) -> Option<fpa> {
        let local = self.local_index(idx)?;
        self.values.get(local).copied()
    }

    /// Returns the sample at the given global index.
    ///
    /// # Panics
    ///
    /// If the index is not covered by the view.
    pub fn at(&self, idx: &Idx3<isize>) -> fpa {
        self.values[[
            (idx[X] - self.lower[X]) as usize,
            (idx[Y] - self.lower[Y]) as usize,
            (idx[Z] - self.lower[Z]) as usize,
        ]]
    }

    fn local_index(&self, idx: &Idx3<isize>) -> Option<(usize, usize, usize)> {
        let i = usize::try_from(idx[X] - self.lower[X]).ok()?;
        let j = usize::try_from(idx[Y] - self.lower[Y]).ok()?;
        let k = usize::try_from(idx[Z] - self.lower[Z]).ok()?;
        Some((i, j, k))
    }
}

/// Read-only views of the electric and magnetic field components of one box.
#[derive(Clone, Debug)]
pub struct BoxFields<'a> {
    pub electric: In3D<FieldView3<'a>>,
    pub magnetic: In3D<FieldView3<'a>>,
}

/// Owned electric and magnetic field arrays of one box.
#[derive(Clone, Debug, PartialEq)]
pub struct ElectromagneticArrays {
    pub electric: In3D<BoxArray3>,
    pub magnetic: In3D<BoxArray3>,
}

impl ElectromagneticArrays {
    /// Creates arrays holding spatially uniform fields.
    pub fn uniform(
        index_box: &IndexBox,
        n_ghost: usize,
        layout: FieldLayout,
        electric: &Vec3<fpa>,
        magnetic: &Vec3<fpa>,
    ) -> Self {
        Self {
            electric: In3D::with_each_component(|dim| {
                BoxArray3::constant(index_box, n_ghost, layout.electric_centering(dim), electric[dim])
            }),
            magnetic: In3D::with_each_component(|dim| {
                BoxArray3::constant(index_box, n_ghost, layout.magnetic_centering(dim), magnetic[dim])
            }),
        }
    }

    /// Borrows the arrays as read-only field views.
    pub fn view(&self) -> BoxFields<'_> {
        BoxFields {
            electric: self.electric.map(BoxArray3::view),
            magnetic: self.magnetic.map(BoxArray3::view),
        }
    }
}

/// Additive write target covering a box and its ghost cells.
#[derive(Debug)]
pub struct ScalarAccumulator3<'a> {
    values: ArrayViewMut3<'a, fpa>,
    lower: Idx3<isize>,
}

impl<'a> ScalarAccumulator3<'a> {
    /// Wraps the given array, whose first element has global index `lower`.
    pub fn new(values: ArrayViewMut3<'a, fpa>, lower: Idx3<isize>) -> Self {
        Self { values, lower }
    }

    pub fn lower(&self) -> &Idx3<isize> {
        &self.lower
    }

    /// Whether the node window `[first, end)` is covered by the target.
    pub fn covers(&self, first: &Idx3<isize>, end: &Idx3<isize>) -> bool {
        window_is_inside(&self.lower, self.values.shape(), first, end)
    }

    /// Adds the given value to the sample at the given global index.
    ///
    /// # Panics
    ///
    /// If the index is not covered by the target.
    pub fn add(&mut self, idx: &Idx3<isize>, value: fpa) {
        self.values[[
            (idx[X] - self.lower[X]) as usize,
            (idx[Y] - self.lower[Y]) as usize,
            (idx[Z] - self.lower[Z]) as usize,
        ]] += value;
    }
}

/// Owned current density arrays of one box, with `J_d` staggered along `d`.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrentArrays {
    components: In3D<BoxArray3>,
}

impl CurrentArrays {
    /// Creates zeroed current arrays over the given box and ghost cells.
    pub fn zeros(index_box: &IndexBox, n_ghost: usize) -> Self {
        Self {
            components: In3D::with_each_component(|dim| {
                BoxArray3::zeros(index_box, n_ghost, Centering::edge(dim))
            }),
        }
    }

    /// Creates zeroed arrays with the same extents, used as a worker-local buffer.
    pub fn zeros_like(&self) -> Self {
        Self {
            components: self.components.map(BoxArray3::zeros_like),
        }
    }

    pub fn component(&self, dim: Dim3) -> &BoxArray3 {
        &self.components[dim]
    }

    /// Whether the node window `[first, end)` is covered by every component.
    pub fn covers(&self, first: &Idx3<isize>, end: &Idx3<isize>) -> bool {
        self.components.iter().all(|component| component.view().covers(first, end))
    }

    /// Sets all components to zero.
    pub fn reset(&mut self) {
        self.components.iter_mut().for_each(BoxArray3::reset);
    }

    /// Adds the currents of another set of arrays with the same extents.
    pub fn add_assign(&mut self, other: &Self) {
        for dim in Dim3::slice() {
            self.components[dim].add_assign(&other.components[dim]);
        }
    }

    /// Merges two buffers additively, consuming both.
    pub fn merged(mut self, other: Self) -> Self {
        self.add_assign(&other);
        self
    }

    /// Borrows all components as additive write targets.
    pub fn accumulator(&mut self) -> CurrentAccumulator3<'_> {
        CurrentAccumulator3 {
            components: self.components.map_mut(BoxArray3::accumulator),
        }
    }
}

/// Additive write targets for the three current density components of a box.
#[derive(Debug)]
pub struct CurrentAccumulator3<'a> {
    components: In3D<ScalarAccumulator3<'a>>,
}

impl<'a> CurrentAccumulator3<'a> {
    pub fn component(&self, dim: Dim3) -> &ScalarAccumulator3<'a> {
        &self.components[dim]
    }

    pub fn component_mut(&mut self, dim: Dim3) -> &mut ScalarAccumulator3<'a> {
        &mut self.components[dim]
    }
}
