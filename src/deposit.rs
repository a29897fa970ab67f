//! Charge-conserving deposition of particle currents onto the grid.
//!
//! Each particle trajectory is split wherever it crosses a cell boundary,
//! and the current of every sub-segment is obtained from the change in the
//! particle's shape factors between the segment end points (the Esirkepov
//! decomposition). The discrete divergence of the deposited current then
//! balances the change in deposited charge exactly.

use crate::{
    error::FaultKind,
    field::{CurrentAccumulator3, CurrentArrays, ScalarAccumulator3},
    geometry::{
        Dim3::{self, X, Y, Z},
        Idx3, In3D, Point3,
    },
    grid::LevelGeometry,
    num::fpa,
    shape::{ShapeOrder, MAX_SHAPE_POINTS},
};
use rayon::prelude::*;

/// Largest number of nodes the shape factors at the two end points of a
/// sub-segment can span together along one dimension.
const WINDOW_CAPACITY: usize = MAX_SHAPE_POINTS + 2;

/// The straight path of a particle through one time step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trajectory {
    pub old_position: Point3<fpa>,
    pub new_position: Point3<fpa>,
    pub weight: fpa,
}

impl Trajectory {
    pub fn new(old_position: Point3<fpa>, new_position: Point3<fpa>, weight: fpa) -> Self {
        Self {
            old_position,
            new_position,
            weight,
        }
    }
}

/// Defines the properties of a scheme depositing particle currents and charges.
pub trait CurrentDepositor3: Clone + Sync + Send {
    /// Returns the node window `[first, end)` the current of the given
    /// trajectory is deposited into.
    fn current_window(&self, geometry: &LevelGeometry, trajectory: &Trajectory) -> (Idx3<isize>, Idx3<isize>);

    /// Adds the current density of a particle moving along the given trajectory
    /// during one time step.
    ///
    /// # Parameters
    ///
    /// - `geometry`: Geometry of the level the particle lives on.
    /// - `trajectory`: Old and new position and weight of the particle.
    /// - `charge`: Charge of a single physical particle.
    /// - `time_step`: Duration of the step.
    /// - `currents`: Current density components to add to.
    ///
    /// # Returns
    ///
    /// A `Result` which is either:
    ///
    /// - `Ok`: The current was deposited.
    /// - `Err`: Contains a `StencilOutOfBounds` fault. Nothing was deposited.
    fn deposit_current(
        &self,
        geometry: &LevelGeometry,
        trajectory: &Trajectory,
        charge: fpa,
        time_step: fpa,
        currents: &mut CurrentAccumulator3,
    ) -> Result<(), FaultKind>;

    /// Adds the charge density of a particle at the given position.
    fn deposit_charge(
        &self,
        geometry: &LevelGeometry,
        position: &Point3<fpa>,
        weight: fpa,
        charge: fpa,
        density: &mut ScalarAccumulator3,
    ) -> Result<(), FaultKind>;
}

/// Shape factors at the start of a sub-segment and their change over it,
/// on a common window of nodes.
#[derive(Clone, Copy, Debug)]
struct WindowFactors {
    first: isize,
    len: usize,
    initial: [fpa; WINDOW_CAPACITY],
    difference: [fpa; WINDOW_CAPACITY],
}

impl WindowFactors {
    fn new(order: ShapeOrder, start_coord: fpa, end_coord: fpa) -> Self {
        let start = order.compute_factors(start_coord);
        let end = order.compute_factors(end_coord);
        let first = start.first().min(end.first());
        let len = (start.end().max(end.end()) - first) as usize;
        let mut initial = [0.0; WINDOW_CAPACITY];
        let mut difference = [0.0; WINDOW_CAPACITY];
        for offset in 0..len {
            let node = first + offset as isize;
            initial[offset] = start.weight_at(node);
            difference[offset] = end.weight_at(node) - initial[offset];
        }
        Self {
            first,
            len,
            initial,
            difference,
        }
    }
}

/// Esirkepov's charge-conserving scheme for B-spline shapes of any supported order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EsirkepovDepositor {
    order: ShapeOrder,
}

impl EsirkepovDepositor {
    pub fn new(order: ShapeOrder) -> Self {
        Self { order }
    }

    pub fn order(&self) -> ShapeOrder {
        self.order
    }

    fn deposit_segment(
        &self,
        start: &Point3<fpa>,
        end: &Point3<fpa>,
        prefactors: &In3D<fpa>,
        currents: &mut CurrentAccumulator3,
    ) {
        let factors = In3D::with_each_component(|dim| WindowFactors::new(self.order, start[dim], end[dim]));
        for dim in Dim3::slice() {
            deposit_component(dim, &factors, prefactors[dim], currents.component_mut(dim));
        }
    }
}

/// Accumulates the current component along `dim` from the density
/// decomposition, summing the flux along `dim` from the lower window edge.
fn deposit_component(
    dim: Dim3,
    factors: &In3D<WindowFactors>,
    prefactor: fpa,
    accumulator: &mut ScalarAccumulator3,
) {
    let [a, b] = Dim3::slice_except(dim);
    let (along, across_a, across_b) = (&factors[dim], &factors[a], &factors[b]);
    let mut idx = Idx3::same(0);
    for ib in 0..across_b.len {
        idx[b] = across_b.first + ib as isize;
        let (s_b, ds_b) = (across_b.initial[ib], across_b.difference[ib]);
        for ia in 0..across_a.len {
            idx[a] = across_a.first + ia as isize;
            let (s_a, ds_a) = (across_a.initial[ia], across_a.difference[ia]);
            let transverse = s_a * s_b + 0.5 * (ds_a * s_b + s_a * ds_b) + ds_a * ds_b / 3.0;
            if transverse == 0.0 {
                continue;
            }
            let mut flux = 0.0;
            for i in 0..along.len {
                flux += along.difference[i] * transverse;
                idx[dim] = along.first + i as isize;
                accumulator.add(&idx, prefactor * flux);
            }
        }
    }
}

impl CurrentDepositor3 for EsirkepovDepositor {
    fn current_window(&self, geometry: &LevelGeometry, trajectory: &Trajectory) -> (Idx3<isize>, Idx3<isize>) {
        let start = geometry.cell_coords(&trajectory.old_position);
        let end = geometry.cell_coords(&trajectory.new_position);
        let first = Idx3::with_each_component(|dim| {
            self.order.compute_factors(fpa::min(start[dim], end[dim])).first()
        });
        let window_end = Idx3::with_each_component(|dim| {
            self.order.compute_factors(fpa::max(start[dim], end[dim])).end()
        });
        (first, window_end)
    }

    fn deposit_current(
        &self,
        geometry: &LevelGeometry,
        trajectory: &Trajectory,
        charge: fpa,
        time_step: fpa,
        currents: &mut CurrentAccumulator3,
    ) -> Result<(), FaultKind> {
        let start = geometry.cell_coords(&trajectory.old_position);
        let end = geometry.cell_coords(&trajectory.new_position);

        let (first, window_end) = self.current_window(geometry, trajectory);
        if !Dim3::slice()
            .into_iter()
            .all(|dim| currents.component(dim).covers(&first, &window_end))
        {
            return Err(FaultKind::StencilOutOfBounds {
                cell_coords: end,
                array: "current density",
            });
        }

        let density = charge * trajectory.weight / geometry.cell_volume();
        let cell_extents = geometry.cell_extents();
        let prefactors = In3D::with_each_component(|dim| -cell_extents[dim] * density / time_step);

        let points = split_at_cell_boundaries(&start, &end);
        for segment in points.windows(2) {
            self.deposit_segment(&segment[0], &segment[1], &prefactors, currents);
        }
        Ok(())
    }

    fn deposit_charge(
        &self,
        geometry: &LevelGeometry,
        position: &Point3<fpa>,
        weight: fpa,
        charge: fpa,
        density: &mut ScalarAccumulator3,
    ) -> Result<(), FaultKind> {
        let cell_coords = geometry.cell_coords(position);
        let factors = In3D::with_each_component(|dim| self.order.compute_factors(cell_coords[dim]));
        let first = Idx3::with_each_component(|dim| factors[dim].first());
        let end = Idx3::with_each_component(|dim| factors[dim].end());
        if !density.covers(&first, &end) {
            return Err(FaultKind::StencilOutOfBounds {
                cell_coords,
                array: "charge density",
            });
        }
        let charge_density = charge * weight / geometry.cell_volume();
        for (k, weight_z) in factors[Z].iter() {
            for (j, weight_y) in factors[Y].iter() {
                for (i, weight_x) in factors[X].iter() {
                    density.add(
                        &Idx3::new(i, j, k),
                        charge_density * weight_x * weight_y * weight_z,
                    );
                }
            }
        }
        Ok(())
    }
}

/// Splits the straight path between the given cell coordinates at every
/// integer coordinate it crosses, returning the sequence of segment end points.
///
/// Every segment lies within a single cell along each dimension.
pub fn split_at_cell_boundaries(start: &Point3<fpa>, end: &Point3<fpa>) -> Vec<Point3<fpa>> {
    let mut fractions = Vec::new();
    for dim in Dim3::slice() {
        let (a, b) = (start[dim], end[dim]);
        if a == b {
            continue;
        }
        let (low, high) = (fpa::min(a, b), fpa::max(a, b));
        let mut boundary = low.floor() + 1.0;
        while boundary < high {
            fractions.push((boundary - a) / (b - a));
            boundary += 1.0;
        }
    }
    fractions.sort_by(fpa::total_cmp);
    fractions.dedup();

    let mut points = Vec::with_capacity(fractions.len() + 2);
    points.push(*start);
    points.extend(fractions.into_iter().map(|fraction| {
        let point = start.lerp(end, fraction);
        // Rounding must not move a split point outside the path's bounding box.
        Point3::with_each_component(|dim| {
            point[dim].clamp(fpa::min(start[dim], end[dim]), fpa::max(start[dim], end[dim]))
        })
    }));
    points.push(*end);
    points
}

/// Deposits the currents of all given trajectories, distributing them over
/// the available threads. Each thread accumulates into a private buffer, and
/// the buffers are added to `currents` once all threads are done.
///
/// # Returns
///
/// A `Result` which is either:
///
/// - `Ok`: All currents were deposited.
/// - `Err`: Contains the index of a trajectory that failed to deposit together
/// with its fault. `currents` is left unchanged.
pub fn deposit_currents_in_parallel<D: CurrentDepositor3>(
    depositor: &D,
    geometry: &LevelGeometry,
    trajectories: &[Trajectory],
    charge: fpa,
    time_step: fpa,
    currents: &mut CurrentArrays,
) -> Result<(), (usize, FaultKind)> {
    if trajectories.is_empty() {
        return Ok(());
    }
    let n_threads = rayon::current_num_threads();
    let chunk_len = if trajectories.len() > n_threads {
        trajectories.len() / n_threads
    } else {
        trajectories.len()
    };
    let template = currents.zeros_like();

    let buffers = trajectories
        .par_chunks(chunk_len)
        .enumerate()
        .map(|(chunk_idx, chunk)| -> Result<CurrentArrays, (usize, FaultKind)> {
            let mut buffer = template.clone();
            let mut accumulator = buffer.accumulator();
            for (offset, trajectory) in chunk.iter().enumerate() {
                depositor
                    .deposit_current(geometry, trajectory, charge, time_step, &mut accumulator)
                    .map_err(|fault| (chunk_idx * chunk_len + offset, fault))?;
            }
            drop(accumulator);
            Ok(buffer)
        })
        .collect::<Result<Vec<_>, _>>()?;

    buffers.iter().for_each(|buffer| currents.add_assign(buffer));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::{BoxArray3, Centering},
        geometry::Vec3,
        grid::IndexBox,
    };

    const ORDERS: [ShapeOrder; 4] = [
        ShapeOrder::Zero,
        ShapeOrder::One,
        ShapeOrder::Two,
        ShapeOrder::Three,
    ];

    fn geometry() -> LevelGeometry {
        LevelGeometry::from_bounds(
            In3D::same(8),
            Vec3::new(0.0, -1.0, 2.0),
            Vec3::new(8.0, 3.0, 10.0),
        )
    }

    fn index_box() -> IndexBox {
        IndexBox::new(Idx3::same(0), In3D::same(8))
    }

    fn charge_density(order: ShapeOrder, geometry: &LevelGeometry, position: &Point3<fpa>) -> BoxArray3 {
        let mut density = BoxArray3::zeros(&index_box(), 4, Centering::nodal());
        EsirkepovDepositor::new(order)
            .deposit_charge(geometry, position, 0.7, -1.3, &mut density.accumulator())
            .unwrap();
        density
    }

    /// Largest absolute residual of the discrete continuity equation over all nodes.
    fn continuity_residual(order: ShapeOrder, trajectory: &Trajectory, time_step: fpa) -> fpa {
        let geometry = geometry();
        let mut currents = CurrentArrays::zeros(&index_box(), 4);
        EsirkepovDepositor::new(order)
            .deposit_current(&geometry, trajectory, -1.3, time_step, &mut currents.accumulator())
            .unwrap();
        let rho_old = charge_density(order, &geometry, &trajectory.old_position);
        let rho_new = charge_density(order, &geometry, &trajectory.new_position);

        let cell_extents = geometry.cell_extents();
        let lower = *rho_old.lower();
        let shape = rho_old.values().shape().to_vec();
        let mut max_residual: fpa = 0.0;
        for i in 1..shape[0] as isize {
            for j in 1..shape[1] as isize {
                for k in 1..shape[2] as isize {
                    let idx = Idx3::new(lower[X] + i, lower[Y] + j, lower[Z] + k);
                    let mut residual = (rho_new.view().at(&idx) - rho_old.view().at(&idx)) / time_step;
                    for dim in Dim3::slice() {
                        let mut below = idx;
                        below[dim] -= 1;
                        let component = currents.component(dim).view();
                        residual += (component.at(&idx) - component.at(&below)) / cell_extents[dim];
                    }
                    max_residual = max_residual.max(residual.abs());
                }
            }
        }
        max_residual
    }

    #[test]
    fn deposited_current_conserves_charge() {
        let time_step = 0.25;
        let trajectories = [
            Trajectory::new(Point3::new(3.2, 0.7, 5.1), Point3::new(3.6, 0.9, 5.05), 0.7),
            Trajectory::new(Point3::new(3.9, 0.9, 5.9), Point3::new(4.2, 1.1, 6.3), 0.7),
            Trajectory::new(Point3::new(4.0, 1.0, 6.0), Point3::new(4.0, 1.0, 6.0), 0.7),
            Trajectory::new(Point3::new(4.5, 1.0, 6.0), Point3::new(3.5, 0.5, 7.0), 0.7),
        ];
        for order in ORDERS {
            for trajectory in &trajectories {
                let residual = continuity_residual(order, trajectory, time_step);
                assert!(residual < 1e-13, "order {}: residual {}", order, residual);
            }
        }
    }

    #[test]
    fn multi_cell_displacements_conserve_charge() {
        let trajectory = Trajectory::new(Point3::new(2.3, -0.4, 4.1), Point3::new(5.7, 1.6, 8.9), 0.7);
        for order in ORDERS {
            let residual = continuity_residual(order, &trajectory, 0.5);
            assert!(residual < 1e-13, "order {}: residual {}", order, residual);
        }
    }

    #[test]
    fn trajectories_are_split_at_every_crossing() {
        let points = split_at_cell_boundaries(&Point3::new(0.5, 0.5, 0.5), &Point3::new(2.5, 0.5, 1.5));
        assert_eq!(points.len(), 5);
        assert_eq!(points[1], Point3::new(1.0, 0.5, 0.75));
        assert_eq!(points[2], Point3::new(1.5, 0.5, 1.0));
        assert_eq!(points[3], Point3::new(2.0, 0.5, 1.25));
        for segment in points.windows(2) {
            for dim in Dim3::slice() {
                let low = fpa::min(segment[0][dim], segment[1][dim]);
                let high = fpa::max(segment[0][dim], segment[1][dim]);
                assert!(high - low.floor() <= 1.0);
            }
        }
    }

    #[test]
    fn motion_within_a_cell_gives_uniform_linear_current() {
        let geometry = LevelGeometry::from_bounds(In3D::same(8), Vec3::zero(), Vec3::equal_components(8.0));
        let mut currents = CurrentArrays::zeros(&index_box(), 2);
        EsirkepovDepositor::new(ShapeOrder::One)
            .deposit_current(
                &geometry,
                &Trajectory::new(Point3::new(2.25, 3.5, 4.0), Point3::new(2.75, 3.5, 4.0), 1.0),
                1.0,
                1.0,
                &mut currents.accumulator(),
            )
            .unwrap();
        let jx = currents.component(X).view();
        assert!((jx.at(&Idx3::new(2, 3, 4)) - 0.25).abs() < 1e-15);
        assert!((jx.at(&Idx3::new(2, 4, 4)) - 0.25).abs() < 1e-15);
        assert!(jx.at(&Idx3::new(1, 3, 4)).abs() < 1e-15);
        assert!(jx.at(&Idx3::new(3, 3, 4)).abs() < 1e-15);
        assert_eq!(currents.component(Y).view().at(&Idx3::new(2, 3, 4)), 0.0);
    }

    #[test]
    fn charge_on_a_midpoint_is_split_evenly() {
        let geometry = LevelGeometry::from_bounds(In3D::same(8), Vec3::zero(), Vec3::equal_components(8.0));
        let mut density = BoxArray3::zeros(&index_box(), 2, Centering::nodal());
        EsirkepovDepositor::new(ShapeOrder::One)
            .deposit_charge(&geometry, &Point3::new(2.5, 3.0, 4.0), 1.0, 1.0, &mut density.accumulator())
            .unwrap();
        assert_eq!(density.get(&Idx3::new(2, 3, 4)), Some(0.5));
        assert_eq!(density.get(&Idx3::new(3, 3, 4)), Some(0.5));
        assert_eq!(density.get(&Idx3::new(2, 4, 4)), Some(0.0));
    }

    #[test]
    fn out_of_bounds_stencils_leave_currents_untouched() {
        let geometry = geometry();
        let mut currents = CurrentArrays::zeros(&index_box(), 1);
        let result = EsirkepovDepositor::new(ShapeOrder::Three).deposit_current(
            &geometry,
            &Trajectory::new(Point3::new(0.2, 0.0, 3.0), Point3::new(-0.3, 0.0, 3.0), 1.0),
            1.0,
            1.0,
            &mut currents.accumulator(),
        );
        assert!(matches!(result, Err(FaultKind::StencilOutOfBounds { .. })));
        assert_eq!(currents, CurrentArrays::zeros(&index_box(), 1));
    }

    #[test]
    fn parallel_deposition_matches_serial_deposition() {
        let geometry = geometry();
        let depositor = EsirkepovDepositor::new(ShapeOrder::Two);
        let trajectories: Vec<_> = (0..200)
            .map(|n| {
                let offset = n as fpa * 0.013;
                Trajectory::new(
                    Point3::new(2.0 + offset, 0.1 + 0.5 * offset, 3.0 + offset),
                    Point3::new(2.4 + offset, 0.3 + 0.4 * offset, 2.7 + 1.1 * offset),
                    0.5 + 0.001 * n as fpa,
                )
            })
            .collect();

        let mut serial = CurrentArrays::zeros(&index_box(), 4);
        {
            let mut accumulator = serial.accumulator();
            for trajectory in &trajectories {
                depositor
                    .deposit_current(&geometry, trajectory, 2.0, 0.1, &mut accumulator)
                    .unwrap();
            }
        }
        let mut parallel = CurrentArrays::zeros(&index_box(), 4);
        deposit_currents_in_parallel(&depositor, &geometry, &trajectories, 2.0, 0.1, &mut parallel).unwrap();

        let mut untouched = CurrentArrays::zeros(&index_box(), 1);
        let failing = vec![
            trajectories[0],
            Trajectory::new(Point3::new(0.2, 0.0, 3.0), Point3::new(-1.3, 0.0, 3.0), 1.0),
        ];
        let result = deposit_currents_in_parallel(&depositor, &geometry, &failing, 2.0, 0.1, &mut untouched);
        assert!(matches!(result, Err((1, FaultKind::StencilOutOfBounds { .. }))));
        assert_eq!(untouched, CurrentArrays::zeros(&index_box(), 1));

        for dim in Dim3::slice() {
            let difference = serial.component(dim).values() - parallel.component(dim).values();
            let max_difference = difference.iter().fold(0.0, |max: fpa, value| max.max(value.abs()));
            assert!(max_difference < 1e-10, "{}", max_difference);
        }
    }
}
