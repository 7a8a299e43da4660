// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Region-of-interest filtering and driveable surface classification.
//!
//! 1. **Region of interest**: [`RoiFilter`] discards points behind the
//!    vehicle, beyond the forward range, outside the lateral band, or above
//!    the height limit.
//!
//! 2. **Driveable surface**: [`DriveableClassifier`] bins the remaining
//!    points on a Cartesian grid in front of the vehicle. A cell is flat when
//!    its height spread is within `max_diff`. Starting from the row nearest
//!    the vehicle, a flat cell is driveable when it connects to a driveable
//!    neighbour (the nearest earlier row with ground in that column, or the
//!    same row sideways) whose ground height differs by at most `max_incline`
//!    per metre. Rows without returns, common between distant rings, are
//!    bridged. Walls, curbs, embankments and steep ramps break the chain,
//!    and anything behind them is rejected.

use crate::lidar::Frame;

/// Grid cell edge length (metres).
const CELL_SIZE: f32 = 0.5;

/// A stage that turns one frame into another.
///
/// Implementations may keep scratch buffers across calls; the result must
/// depend only on the input frame.
pub trait FrameTransform: Send {
    fn apply(&mut self, frame: Frame) -> Frame;
}

impl<F> FrameTransform for F
where
    F: FnMut(Frame) -> Frame + Send,
{
    fn apply(&mut self, frame: Frame) -> Frame {
        self(frame)
    }
}

/// Axis-aligned region of interest in the vehicle frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoiFilter {
    /// Maximum distance ahead (x).
    pub forward: f32,
    /// Maximum lateral offset either side (|y|).
    pub side: f32,
    /// Maximum height (z).
    pub top: f32,
}

impl Default for RoiFilter {
    fn default() -> Self {
        Self {
            forward: 30.0,
            side: 15.0,
            top: 2.0,
        }
    }
}

impl RoiFilter {
    #[inline]
    pub fn contains(&self, x: f32, y: f32, z: f32) -> bool {
        (0.0..=self.forward).contains(&x) && y.abs() <= self.side && z <= self.top
    }
}

impl FrameTransform for RoiFilter {
    fn apply(&mut self, mut frame: Frame) -> Frame {
        frame.points.retain(|p| self.contains(p.x, p.y, p.z));
        frame
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum CellState {
    /// Driveable with this ground height.
    Ground(f32),
    Blocked,
}

#[derive(Clone, Copy, Debug)]
struct Cell {
    count: u32,
    min_z: f32,
    max_z: f32,
}

impl Cell {
    const EMPTY: Cell = Cell {
        count: 0,
        min_z: f32::INFINITY,
        max_z: f32::NEG_INFINITY,
    };
}

/// Grid-based driveable surface classifier.
#[derive(Clone, Debug)]
pub struct DriveableClassifier {
    /// Maximum distance ahead (x).
    pub forward: f32,
    /// Maximum lateral offset either side (|y|).
    pub side: f32,
    /// Maximum height spread inside one cell (metres).
    pub max_diff: f32,
    /// Maximum ground slope between neighbouring cells (rise over run).
    pub max_incline: f32,
    cells: Vec<Cell>,
    states: Vec<CellState>,
    point_cells: Vec<Option<usize>>,
    /// Row and height of the latest ground cell per column.
    last_ground: Vec<Option<(usize, f32)>>,
}

impl Default for DriveableClassifier {
    fn default() -> Self {
        Self::new(30.0, 15.0, 0.5, 0.15)
    }
}

impl DriveableClassifier {
    #[must_use]
    pub fn new(forward: f32, side: f32, max_diff: f32, max_incline: f32) -> Self {
        Self {
            forward,
            side,
            max_diff,
            max_incline,
            cells: Vec::new(),
            states: Vec::new(),
            point_cells: Vec::new(),
            last_ground: Vec::new(),
        }
    }

    fn rows(&self) -> usize {
        (self.forward / CELL_SIZE).ceil().max(0.0) as usize
    }

    fn cols(&self) -> usize {
        (2.0 * self.side / CELL_SIZE).ceil().max(0.0) as usize
    }

    fn cell_index(&self, x: f32, y: f32, rows: usize, cols: usize) -> Option<usize> {
        if !(0.0..self.forward).contains(&x) || y.abs() > self.side {
            return None;
        }
        let row = ((x / CELL_SIZE) as usize).min(rows - 1);
        let col = (((y + self.side) / CELL_SIZE) as usize).min(cols - 1);
        Some(row * cols + col)
    }

    /// Mark every cell as ground or blocked, row by row outwards.
    ///
    /// The first row with returns directly ahead of the vehicle seeds the
    /// surface. A later cell is reached from the most recent ground in the
    /// same or a diagonal column, with the allowed step scaled by the distance
    /// between the two rows, and then spread sideways within the row. Rows
    /// without returns are skipped over; returns that are not ground cut the
    /// column off.
    fn propagate(&mut self, rows: usize, cols: usize) {
        let axis = cols / 2;
        let mut seeded = false;
        self.last_ground.clear();
        self.last_ground.resize(cols, None);

        for row in 0..rows {
            let base = row * cols;

            for col in 0..cols {
                let cell = self.cells[base + col];
                let state = if !self.is_flat(&cell) {
                    CellState::Blocked
                } else if !seeded {
                    if col.abs_diff(axis) <= 1 {
                        CellState::Ground(cell.min_z)
                    } else {
                        CellState::Blocked
                    }
                } else {
                    let lo = col.saturating_sub(1);
                    let hi = (col + 1).min(cols - 1);
                    let reachable = self.last_ground[lo..=hi].iter().flatten().any(|&(r, h)| {
                        let run = (row - r) as f32 * CELL_SIZE;
                        (cell.min_z - h).abs() <= self.max_incline * run
                    });
                    if reachable {
                        CellState::Ground(cell.min_z)
                    } else {
                        CellState::Blocked
                    }
                };
                self.states[base + col] = state;
            }

            // Sideways: left to right, then right to left.
            let max_step = self.max_incline * CELL_SIZE;
            for col in 1..cols {
                self.spread(base + col, base + col - 1, max_step);
            }
            for col in (0..cols - 1).rev() {
                self.spread(base + col, base + col + 1, max_step);
            }

            for col in 0..cols {
                match self.states[base + col] {
                    CellState::Ground(h) => self.last_ground[col] = Some((row, h)),
                    CellState::Blocked if self.cells[base + col].count > 0 => {
                        self.last_ground[col] = None
                    }
                    CellState::Blocked => {}
                }
            }

            if !seeded {
                seeded = self.states[base..base + cols]
                    .iter()
                    .any(|s| matches!(s, CellState::Ground(_)));
            }
        }
    }

    #[inline]
    fn is_flat(&self, cell: &Cell) -> bool {
        cell.count > 0 && cell.max_z - cell.min_z <= self.max_diff
    }

    /// Extend ground from `from` into the blocked neighbour `to`.
    fn spread(&mut self, to: usize, from: usize, max_step: f32) {
        let cell = self.cells[to];
        if self.states[to] != CellState::Blocked || !self.is_flat(&cell) {
            return;
        }
        if let CellState::Ground(h) = self.states[from] {
            if (cell.min_z - h).abs() <= max_step {
                self.states[to] = CellState::Ground(cell.min_z);
            }
        }
    }
}

impl FrameTransform for DriveableClassifier {
    fn apply(&mut self, frame: Frame) -> Frame {
        let rows = self.rows();
        let cols = self.cols();
        if rows == 0 || cols == 0 {
            return frame.derive(Vec::new());
        }

        self.cells.clear();
        self.cells.resize(rows * cols, Cell::EMPTY);
        self.states.clear();
        self.states.resize(rows * cols, CellState::Blocked);
        self.point_cells.clear();
        self.point_cells.reserve(frame.len());

        for p in &frame.points {
            let idx = self.cell_index(p.x, p.y, rows, cols);
            if let Some(idx) = idx {
                let cell = &mut self.cells[idx];
                cell.count += 1;
                cell.min_z = cell.min_z.min(p.z);
                cell.max_z = cell.max_z.max(p.z);
            }
            self.point_cells.push(idx);
        }

        self.propagate(rows, cols);

        let points = frame
            .points
            .iter()
            .zip(self.point_cells.iter())
            .filter(|(_, idx)| {
                matches!(idx, Some(i) if matches!(self.states[*i], CellState::Ground(_)))
            })
            .map(|(p, _)| *p)
            .collect();

        frame.derive(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lidar::Point3D;

    /// Flat road at `z` on cell centres covering `rows` x `cols` cells,
    /// centred on the vehicle axis.
    fn road(rows: usize, cols: usize, z: impl Fn(f32) -> f32) -> Vec<Point3D> {
        let mut points = Vec::with_capacity(rows * cols);
        let half = cols as f32 * CELL_SIZE / 2.0;
        for i in 0..rows {
            for j in 0..cols {
                let x = 0.25 + CELL_SIZE * i as f32;
                let y = -half + 0.25 + CELL_SIZE * j as f32;
                points.push(Point3D::new(x, y, z(x)));
            }
        }
        points
    }

    #[test]
    fn test_roi_bounds() {
        let mut roi = RoiFilter::default();
        let frame = Frame::from_points(vec![
            Point3D::new(10.0, 0.0, -1.5),  // kept
            Point3D::new(-1.0, 0.0, -1.5),  // behind
            Point3D::new(31.0, 0.0, -1.5),  // too far
            Point3D::new(10.0, -16.0, 0.0), // too wide
            Point3D::new(10.0, 2.0, 2.5),   // too high
            Point3D::new(30.0, 15.0, 2.0),  // on the boundary
        ]);

        let out = roi.apply(frame);
        assert_eq!(
            out.points,
            vec![Point3D::new(10.0, 0.0, -1.5), Point3D::new(30.0, 15.0, 2.0)]
        );
    }

    #[test]
    fn test_roi_keeps_metadata() {
        let mut roi = RoiFilter::default();
        let mut frame = Frame::from_points(vec![Point3D::new(1.0, 1.0, 0.0)]);
        frame.seq = 12;
        frame.timestamp = 99;
        let out = roi.apply(frame);
        assert_eq!((out.seq, out.timestamp), (12, 99));
    }

    #[test]
    fn test_flat_road_is_driveable() {
        let points = road(40, 20, |_| -1.5);
        let n = points.len();
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert_eq!(out.len(), n);
    }

    #[test]
    fn test_gentle_slope_is_driveable() {
        // 10% grade is under the 15% incline limit.
        let points = road(40, 10, |x| -1.5 + 0.1 * x);
        let n = points.len();
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert_eq!(out.len(), n);
    }

    #[test]
    fn test_steep_ramp_is_rejected() {
        // Flat for 5 m then a 50% ramp.
        let points = road(40, 10, |x| if x < 5.0 { -1.5 } else { -1.5 + 0.5 * (x - 5.0) });
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert!(out.points.iter().all(|p| p.x < 5.0));
        assert_eq!(out.len(), 10 * 10);
    }

    #[test]
    fn test_sparse_rows_flat_road() {
        // Ground rings 1 m apart leave every other grid row empty.
        let points: Vec<Point3D> = road(60, 20, |_| -1.5)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| (i / 20) % 2 == 0)
            .map(|(_, p)| p)
            .collect();
        assert_eq!(points.len(), 600);
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert_eq!(out.len(), 600);
    }

    #[test]
    fn test_sparse_rows_gentle_slope() {
        // 10% grade sampled every 1.5 m.
        let points: Vec<Point3D> = road(60, 10, |x| -1.5 + 0.1 * x)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| (i / 10) % 3 == 0)
            .map(|(_, p)| p)
            .collect();
        let n = points.len();
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert_eq!(out.len(), n);
    }

    #[test]
    fn test_step_across_empty_rows_is_rejected() {
        // Flat up to 5 m, nothing for 1 m, then 0.5 m higher.
        let points: Vec<Point3D> = road(40, 10, |x| if x < 5.0 { -1.5 } else { -1.0 })
            .into_iter()
            .filter(|p| !(5.0..6.0).contains(&p.x))
            .collect();
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert!(out.points.iter().all(|p| p.x < 5.0));
        assert_eq!(out.len(), 10 * 10);
    }

    #[test]
    fn test_wall_blocks_road_behind_it() {
        let mut points = road(40, 20, |_| -1.5);
        // Full-width wall in the row covering x in [10, 10.5).
        for j in 0..20 {
            let y = -5.0 + 0.25 + CELL_SIZE * j as f32;
            for k in 0..10 {
                points.push(Point3D::new(10.25, y, -1.5 + 0.25 * k as f32));
            }
        }
        let mut classifier = DriveableClassifier::default();

        let out = classifier.apply(Frame::from_points(points));
        assert!(!out.is_empty());
        assert!(out.points.iter().all(|p| p.x < 10.0));
        assert_eq!(out.len(), 20 * 20);
    }

    #[test]
    fn test_points_outside_bounds_are_rejected() {
        let mut classifier = DriveableClassifier::new(10.0, 2.0, 0.5, 0.15);
        let mut points = road(20, 8, |_| -1.5);
        points.push(Point3D::new(12.0, 0.0, -1.5));
        points.push(Point3D::new(1.0, 6.0, -1.5));

        let out = classifier.apply(Frame::from_points(points));
        assert!(out.points.iter().all(|p| p.x < 10.0 && p.y.abs() <= 2.0));
        assert_eq!(out.len(), 20 * 8);
    }

    #[test]
    fn test_scratch_reuse_across_frames() {
        let mut classifier = DriveableClassifier::default();
        let first = classifier.apply(Frame::from_points(road(10, 10, |_| -1.5)));
        assert_eq!(first.len(), 100);

        let second = classifier.apply(Frame::from_points(road(4, 4, |_| -2.0)));
        assert_eq!(second.len(), 16);
    }
}
