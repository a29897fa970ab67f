//! Decomposition of each refinement level into subdomain boxes, and the
//! mesh context handed explicitly to every particle operation.

use super::{IndexBox, LevelGeometry};
use crate::{geometry::In3D, geometry::Point3, num::fpa};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// A subdomain box together with the rank owning it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct SubdomainBox {
    index_box: IndexBox,
    owner: usize,
}

impl SubdomainBox {
    pub fn new(index_box: IndexBox, owner: usize) -> Self {
        Self { index_box, owner }
    }

    pub fn index_box(&self) -> &IndexBox {
        &self.index_box
    }

    pub fn owner(&self) -> usize {
        self.owner
    }
}

/// Layout of subdomain boxes on every refinement level.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub struct Decomposition {
    levels: Vec<Vec<SubdomainBox>>,
}

impl Decomposition {
    /// Creates a decomposition from explicit per-level box lists.
    pub fn new(levels: Vec<Vec<SubdomainBox>>) -> Self {
        Self { levels }
    }

    /// Creates a single-level decomposition by chopping the domain into boxes of
    /// at most the given shape, distributed round-robin over the given number of ranks.
    pub fn uniform(domain: &IndexBox, max_box_shape: &In3D<usize>, number_of_ranks: usize) -> Self {
        let number_of_ranks = number_of_ranks.max(1);
        Self::new(vec![domain
            .chopped(max_box_shape)
            .into_iter()
            .enumerate()
            .map(|(idx, index_box)| SubdomainBox::new(index_box, idx % number_of_ranks))
            .collect()])
    }

    /// Adds a level with the given boxes and returns its level number.
    pub fn push_level(&mut self, boxes: Vec<SubdomainBox>) -> usize {
        self.levels.push(boxes);
        self.levels.len() - 1
    }

    pub fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the boxes of the given level, or an empty slice if the level does not exist.
    pub fn boxes(&self, level: usize) -> &[SubdomainBox] {
        self.levels.get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Finds the index of the box on the given level containing the given cell coordinates.
    pub fn find_box(&self, level: usize, cell_coords: &Point3<fpa>) -> Option<usize> {
        self.boxes(level)
            .iter()
            .position(|subdomain| subdomain.index_box().contains_cell_coords(cell_coords))
    }
}

/// Everything the particle operations need to know about the mesh, passed
/// explicitly instead of through a shared global handle.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshContext {
    levels: Vec<LevelGeometry>,
    decomposition: Decomposition,
    rank: usize,
}

impl MeshContext {
    /// Creates a new mesh context.
    ///
    /// # Panics
    ///
    /// If the decomposition does not have one box list per level geometry.
    pub fn new(levels: Vec<LevelGeometry>, decomposition: Decomposition, rank: usize) -> Self {
        assert_eq!(
            levels.len(),
            decomposition.number_of_levels(),
            "Decomposition must cover every level"
        );
        Self {
            levels,
            decomposition,
            rank,
        }
    }

    /// Creates a single-level, single-rank context with a uniform decomposition.
    pub fn single_level(geometry: LevelGeometry, max_box_shape: &In3D<usize>) -> Self {
        let decomposition = Decomposition::uniform(geometry.domain(), max_box_shape, 1);
        Self::new(vec![geometry], decomposition, 0)
    }

    pub fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    /// Returns the geometry of the given level.
    ///
    /// # Panics
    ///
    /// If the level does not exist.
    pub fn level(&self, level: usize) -> &LevelGeometry {
        &self.levels[level]
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    /// Returns the rank of the calling process.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Returns the indices of the boxes on the given level owned by the calling rank.
    pub fn local_box_indices(&self, level: usize) -> Vec<usize> {
        self.decomposition
            .boxes(level)
            .iter()
            .enumerate()
            .filter(|(_, subdomain)| subdomain.owner() == self.rank)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Replaces the decomposition, as done after remeshing.
    pub fn set_decomposition(&mut self, decomposition: Decomposition) {
        assert_eq!(
            self.levels.len(),
            decomposition.number_of_levels(),
            "Decomposition must cover every level"
        );
        self.decomposition = decomposition;
    }
}
