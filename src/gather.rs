//! Interpolation of grid fields to particle positions.

use crate::{
    error::FaultKind,
    field::{BoxFields, FieldView3},
    geometry::{
        Dim3::{self, X, Y, Z},
        Idx3, In3D, Point3, Vec3,
    },
    num::fpa,
    shape::ShapeOrder,
};

/// Electric and magnetic field vectors at a particle position.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GatheredFields {
    pub electric: Vec3<fpa>,
    pub magnetic: Vec3<fpa>,
}

impl GatheredFields {
    pub fn new(electric: Vec3<fpa>, magnetic: Vec3<fpa>) -> Self {
        Self { electric, magnetic }
    }

    /// Fields that exert no force.
    pub fn zero() -> Self {
        Self::new(Vec3::zero(), Vec3::zero())
    }
}

/// Defines the properties of a gatherer of fields to particle positions.
pub trait FieldGatherer3: Clone + Sync + Send {
    /// Computes the value of a single field component at the given cell coordinates.
    ///
    /// # Parameters
    ///
    /// - `field`: View of the field component, including ghost cells.
    /// - `cell_coords`: Continuous cell coordinates of the particle in the
    /// global index space of the level.
    ///
    /// # Returns
    ///
    /// The interpolated value, or `None` if the stencil reaches outside the view.
    fn gather_component(&self, field: &FieldView3, cell_coords: &Point3<fpa>) -> Option<fpa>;

    /// Computes the electric and magnetic field vectors at the given cell coordinates.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: Contains the gathered fields.
    /// - `Err`: Contains a `StencilOutOfBounds` fault naming the offending field.
    fn gather(&self, fields: &BoxFields, cell_coords: &Point3<fpa>) -> Result<GatheredFields, FaultKind> {
        Ok(GatheredFields::new(
            gather_vector(self, &fields.electric, cell_coords, "electric field")?,
            gather_vector(self, &fields.magnetic, cell_coords, "magnetic field")?,
        ))
    }
}

fn gather_vector<G: FieldGatherer3>(
    gatherer: &G,
    components: &In3D<FieldView3<'_>>,
    cell_coords: &Point3<fpa>,
    array: &'static str,
) -> Result<Vec3<fpa>, FaultKind> {
    let mut vector = Vec3::zero();
    for dim in Dim3::slice() {
        vector[dim] = gatherer
            .gather_component(&components[dim], cell_coords)
            .ok_or(FaultKind::StencilOutOfBounds {
                cell_coords: *cell_coords,
                array,
            })?;
    }
    Ok(vector)
}

/// Gatherer weighting the surrounding samples with separable B-spline shape factors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeFactorGatherer {
    order: ShapeOrder,
}

impl ShapeFactorGatherer {
    pub fn new(order: ShapeOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ShapeOrder {
        self.order
    }
}

impl FieldGatherer3 for ShapeFactorGatherer {
    fn gather_component(&self, field: &FieldView3, cell_coords: &Point3<fpa>) -> Option<fpa> {
        let centering = field.centering();
        let factors = In3D::with_each_component(|dim| {
            self.order
                .compute_factors(cell_coords[dim] - centering.offset(dim))
        });
        let first = Idx3::with_each_component(|dim| factors[dim].first());
        let end = Idx3::with_each_component(|dim| factors[dim].end());
        if !field.covers(&first, &end) {
            return None;
        }
        let mut value = 0.0;
        for (k, weight_z) in factors[Z].iter() {
            for (j, weight_y) in factors[Y].iter() {
                let weight_yz = weight_y * weight_z;
                for (i, weight_x) in factors[X].iter() {
                    value += weight_x * weight_yz * field.at(&Idx3::new(i, j, k));
                }
            }
        }
        Some(value)
    }
}
