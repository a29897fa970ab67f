//! B-spline shape functions used both for gathering fields to particles and
//! for depositing particle quantities onto the grid.

use crate::{error::ConfigError, num::fpa};
use std::{convert::TryFrom, fmt};

#[cfg(feature = "serialization")]
use serde::{Deserialize, Serialize};

/// Largest number of grid nodes a shape function can touch along one dimension.
pub const MAX_SHAPE_POINTS: usize = 4;

/// Order of the particle shape function along each dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(Serialize, Deserialize))]
pub enum ShapeOrder {
    /// Nearest grid point.
    Zero = 0,
    /// Linear (cloud-in-cell).
    One = 1,
    /// Quadratic (triangular-shaped cloud).
    Two = 2,
    /// Cubic.
    Three = 3,
}

impl ShapeOrder {
    /// Returns the polynomial order as a number.
    pub fn value(self) -> usize {
        self as usize
    }

    /// Number of grid nodes with nonzero weight along one dimension.
    pub fn number_of_points(self) -> usize {
        self.value() + 1
    }

    /// Number of cells the stencil reaches away from the particle's cell,
    /// which is the minimum number of ghost cells gathering requires.
    pub fn stencil_half_width(self) -> usize {
        (self.value() + 2) / 2
    }

    /// Computes the shape factors for the given coordinate in cell units.
    pub fn compute_factors(self, coord: fpa) -> ShapeFactors {
        let mut weights = [0.0; MAX_SHAPE_POINTS];
        let first = match self {
            Self::Zero => {
                weights[0] = 1.0;
                (coord + 0.5).floor() as isize
            }
            Self::One => {
                let node = coord.floor();
                let f = coord - node;
                weights[0] = 1.0 - f;
                weights[1] = f;
                node as isize
            }
            Self::Two => {
                let node = (coord + 0.5).floor();
                let d = coord - node;
                weights[0] = 0.5 * (0.5 - d) * (0.5 - d);
                weights[1] = 0.75 - d * d;
                weights[2] = 0.5 * (0.5 + d) * (0.5 + d);
                node as isize - 1
            }
            Self::Three => {
                let node = coord.floor();
                let f = coord - node;
                let g = 1.0 - f;
                let f2 = f * f;
                let f3 = f2 * f;
                weights[0] = g * g * g / 6.0;
                weights[1] = (4.0 - 6.0 * f2 + 3.0 * f3) / 6.0;
                weights[2] = (1.0 + 3.0 * f + 3.0 * f2 - 3.0 * f3) / 6.0;
                weights[3] = f3 / 6.0;
                node as isize - 1
            }
        };
        ShapeFactors {
            first,
            weights,
            len: self.number_of_points(),
        }
    }
}

impl TryFrom<u32> for ShapeOrder {
    type Error = ConfigError;

    fn try_from(order: u32) -> Result<Self, Self::Error> {
        match order {
            0 => Ok(Self::Zero),
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(ConfigError::ShapeOrderUnsupported(order)),
        }
    }
}

impl fmt::Display for ShapeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// Weights of a shape function along one dimension, for consecutive nodes
/// starting at `first`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeFactors {
    first: isize,
    weights: [fpa; MAX_SHAPE_POINTS],
    len: usize,
}

impl ShapeFactors {
    /// Index of the first node with a weight.
    pub fn first(&self) -> isize {
        self.first
    }

    /// Index one past the last node with a weight.
    pub fn end(&self) -> isize {
        self.first + self.len as isize
    }

    /// The weights of the nodes `first..end`.
    pub fn weights(&self) -> &[fpa] {
        &self.weights[..self.len]
    }

    /// Weight of the given node, zero outside the support.
    pub fn weight_at(&self, node: isize) -> fpa {
        if node >= self.first && node < self.end() {
            self.weights[(node - self.first) as usize]
        } else {
            0.0
        }
    }

    /// Iterates over `(node, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (isize, fpa)> + '_ {
        self.weights()
            .iter()
            .enumerate()
            .map(move |(offset, &weight)| (self.first + offset as isize, weight))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: [ShapeOrder; 4] = [
        ShapeOrder::Zero,
        ShapeOrder::One,
        ShapeOrder::Two,
        ShapeOrder::Three,
    ];

    #[test]
    fn weights_sum_to_one() {
        for order in ORDERS {
            for &coord in &[0.0, 0.25, 0.5, 0.999, 3.7, -2.3, 17.5] {
                let sum: fpa = order.compute_factors(coord).weights().iter().sum();
                assert!((sum - 1.0).abs() < 1e-15, "order {} at {}", order, coord);
            }
        }
    }

    #[test]
    fn order_zero_on_node_gives_full_weight_to_node() {
        let factors = ShapeOrder::Zero.compute_factors(3.0);
        assert_eq!(factors.weight_at(3), 1.0);
        assert_eq!(factors.weight_at(2), 0.0);
        assert_eq!(factors.weight_at(4), 0.0);
    }

    #[test]
    fn order_one_at_midpoint_splits_evenly() {
        let factors = ShapeOrder::One.compute_factors(2.5);
        assert_eq!(factors.weight_at(2), 0.5);
        assert_eq!(factors.weight_at(3), 0.5);
    }

    #[test]
    fn order_one_on_node_does_not_split() {
        let factors = ShapeOrder::One.compute_factors(2.0);
        assert_eq!(factors.weight_at(2), 1.0);
        assert_eq!(factors.weight_at(3), 0.0);
    }

    #[test]
    fn higher_orders_are_symmetric_about_nodes() {
        let factors = ShapeOrder::Two.compute_factors(5.0);
        assert_eq!(factors.first(), 4);
        assert_eq!(factors.weight_at(4), factors.weight_at(6));
        assert_eq!(factors.weight_at(5), 0.75);

        let factors = ShapeOrder::Three.compute_factors(5.0);
        assert!((factors.weight_at(4) - 1.0 / 6.0).abs() < 1e-16);
        assert!((factors.weight_at(5) - 2.0 / 3.0).abs() < 1e-16);
        assert_eq!(factors.weight_at(7), 0.0);
    }

    #[test]
    fn stencil_half_widths_match_orders() {
        let widths: Vec<_> = ORDERS.iter().map(|order| order.stencil_half_width()).collect();
        assert_eq!(widths, vec![1, 1, 2, 2]);
    }

    #[test]
    fn unsupported_order_is_rejected() {
        assert!(ShapeOrder::try_from(4).is_err());
        assert_eq!(ShapeOrder::try_from(2).unwrap(), ShapeOrder::Two);
    }
}
