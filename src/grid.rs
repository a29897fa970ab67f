//! Index-space boxes and level geometry of the mesh the particles live on.

pub mod decomposition;

use crate::{
    geometry::{
        Dim3::{self, X, Y, Z},
        Idx3, In3D, Point3, Vec3,
    },
    num::fpa,
};
use std::fmt;

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// A box of grid cells in the global index space of a refinement level.
///
/// Cell `i` spans the cell coordinates `[i, i + 1)`, and node `i` sits at
/// cell coordinate `i`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct IndexBox {
    lower: Idx3<isize>,
    shape: In3D<usize>,
}

impl IndexBox {
    /// Creates a new box with the given lower cell index and number of cells.
    pub fn new(lower: Idx3<isize>, shape: In3D<usize>) -> Self {
        assert!(
            shape.iter().all(|&size| size > 0),
            "Cannot create box with size zero along any dimension"
        );
        Self { lower, shape }
    }

    /// Returns the index of the lowest cell.
    pub fn lower(&self) -> &Idx3<isize> {
        &self.lower
    }

    /// Returns the number of cells along each dimension.
    pub fn shape(&self) -> &In3D<usize> {
        &self.shape
    }

    /// Returns the index one past the highest cell along each dimension.
    pub fn upper(&self) -> Idx3<isize> {
        Idx3::with_each_component(|dim| self.lower[dim] + self.shape[dim] as isize)
    }

    /// Returns the total number of cells in the box.
    pub fn number_of_cells(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns a copy of the box extended by the given number of cells on all sides.
    pub fn grown(&self, n_cells: usize) -> Self {
        Self::new(
            Idx3::with_each_component(|dim| self.lower[dim] - n_cells as isize),
            In3D::with_each_component(|dim| self.shape[dim] + 2 * n_cells),
        )
    }

    /// Whether the given cell coordinates lie inside the box.
    pub fn contains_cell_coords(&self, coords: &Point3<fpa>) -> bool {
        let upper = self.upper();
        Dim3::slice().into_iter().all(|dim| {
            coords[dim] >= self.lower[dim] as fpa && coords[dim] < upper[dim] as fpa
        })
    }

    /// Splits the box into boxes with at most the given number of cells along each dimension.
    ///
    /// Boxes are ordered with x varying fastest.
    pub fn chopped(&self, max_shape: &In3D<usize>) -> Vec<Self> {
        let splits = In3D::with_each_component(|dim| {
            let max_size = max_shape[dim].max(1);
            let mut sizes = Vec::new();
            let mut remaining = self.shape[dim];
            let mut offset = self.lower[dim];
            while remaining > 0 {
                let size = remaining.min(max_size);
                sizes.push((offset, size));
                offset += size as isize;
                remaining -= size;
            }
            sizes
        });
        let mut boxes = Vec::with_capacity(splits[X].len() * splits[Y].len() * splits[Z].len());
        for &(lower_z, size_z) in &splits[Z] {
            for &(lower_y, size_y) in &splits[Y] {
                for &(lower_x, size_x) in &splits[X] {
                    boxes.push(Self::new(
                        Idx3::new(lower_x, lower_y, lower_z),
                        In3D::new(size_x, size_y, size_z),
                    ));
                }
            }
        }
        boxes
    }
}

impl fmt::Display for IndexBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.lower, self.upper())
    }
}

/// Geometry of one refinement level: the index box covering the physical
/// domain and the mapping between index space and physical coordinates.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct LevelGeometry {
    domain: IndexBox,
    lower_bounds: Vec3<fpa>,
    cell_extents: Vec3<fpa>,
}

impl LevelGeometry {
    /// Creates the geometry of a level covering the given physical bounds with
    /// a domain box starting at index zero.
    pub fn from_bounds(shape: In3D<usize>, lower_bounds: Vec3<fpa>, upper_bounds: Vec3<fpa>) -> Self {
        let domain = IndexBox::new(Idx3::same(0), shape);
        let cell_extents = Vec3::with_each_component(|dim| {
            assert!(
                upper_bounds[dim] > lower_bounds[dim],
                "Upper bound must be larger than lower bound"
            );
            (upper_bounds[dim] - lower_bounds[dim]) / shape[dim] as fpa
        });
        Self {
            domain,
            lower_bounds,
            cell_extents,
        }
    }

    /// Creates a level refined by the given integer ratio relative to this level,
    /// covering the same physical domain.
    pub fn refined(&self, ratio: usize) -> Self {
        assert!(ratio > 0, "Refinement ratio must be positive");
        Self {
            domain: IndexBox::new(
                Idx3::with_each_component(|dim| self.domain.lower[dim] * ratio as isize),
                In3D::with_each_component(|dim| self.domain.shape[dim] * ratio),
            ),
            lower_bounds: self.lower_bounds,
            cell_extents: self.cell_extents / ratio as fpa,
        }
    }

    /// Returns the box of cells covering the physical domain.
    pub fn domain(&self) -> &IndexBox {
        &self.domain
    }

    /// Returns the lower physical bounds of the domain.
    pub fn lower_bounds(&self) -> &Vec3<fpa> {
        &self.lower_bounds
    }

    /// Returns the upper physical bounds of the domain.
    pub fn upper_bounds(&self) -> Vec3<fpa> {
        Vec3::with_each_component(|dim| {
            self.lower_bounds[dim] + self.domain.shape[dim] as fpa * self.cell_extents[dim]
        })
    }

    /// Returns the extent of a grid cell in each dimension.
    pub fn cell_extents(&self) -> &Vec3<fpa> {
        &self.cell_extents
    }

    /// Returns the volume of a grid cell.
    pub fn cell_volume(&self) -> fpa {
        self.cell_extents[X] * self.cell_extents[Y] * self.cell_extents[Z]
    }

    /// Converts a physical position into continuous cell coordinates in the
    /// global index space of the level.
    pub fn cell_coords(&self, position: &Point3<fpa>) -> Point3<fpa> {
        Point3::with_each_component(|dim| {
            self.domain.lower[dim] as fpa
                + (position[dim] - self.lower_bounds[dim]) / self.cell_extents[dim]
        })
    }

    /// Converts continuous cell coordinates back into a physical position.
    pub fn position(&self, cell_coords: &Point3<fpa>) -> Point3<fpa> {
        Point3::with_each_component(|dim| {
            self.lower_bounds[dim]
                + (cell_coords[dim] - self.domain.lower[dim] as fpa) * self.cell_extents[dim]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chopping_covers_box_exactly() {
        let index_box = IndexBox::new(Idx3::new(-2, 0, 3), In3D::new(10, 4, 5));
        let boxes = index_box.chopped(&In3D::new(4, 4, 2));
        assert_eq!(boxes.len(), 9);
        let total: usize = boxes.iter().map(IndexBox::number_of_cells).sum();
        assert_eq!(total, index_box.number_of_cells());
        assert_eq!(boxes[0].lower(), &Idx3::new(-2, 0, 3));
        assert_eq!(boxes[2].shape(), &In3D::new(2, 4, 2));
        assert_eq!(boxes.last().unwrap().upper(), index_box.upper());
    }

    #[test]
    fn cell_coords_round_trip_through_positions() {
        let geometry = LevelGeometry::from_bounds(
            In3D::new(8, 4, 2),
            Vec3::new(-1.0, 0.0, 2.0),
            Vec3::new(1.0, 2.0, 3.0),
        );
        assert_eq!(geometry.cell_extents(), &Vec3::new(0.25, 0.5, 0.5));
        let position = Point3::new(0.3, 1.1, 2.9);
        let coords = geometry.cell_coords(&position);
        assert!((coords[X] - 5.2).abs() < 1e-12);
        let back = geometry.position(&coords);
        for dim in Dim3::slice() {
            assert!((back[dim] - position[dim]).abs() < 1e-12);
        }
    }

    #[test]
    fn refined_level_has_smaller_cells() {
        let coarse = LevelGeometry::from_bounds(
            In3D::same(4),
            Vec3::zero(),
            Vec3::equal_components(1.0),
        );
        let fine = coarse.refined(2);
        assert_eq!(fine.domain().shape(), &In3D::same(8));
        assert_eq!(fine.cell_extents(), &Vec3::equal_components(0.125));
        assert_eq!(fine.upper_bounds(), coarse.upper_bounds());
    }
}
