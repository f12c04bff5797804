use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position};

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({row}, {col}) are out of bounds for grid size ({rows}, {cols})")]
    OutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Dimensions are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    rows: usize,
    cols: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn new(rows: usize, cols: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        Grid {
            rows,
            cols,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a new grid with the specified dimensions, filled by a generator function.
    ///
    /// The generator function `f` receives each cell's `Position` in row-major order.
    ///
    /// # Panics
    ///
    /// Panics if `rows * cols` overflows `usize`.
    pub fn from_generator<F>(rows: usize, cols: usize, mut f: F) -> Self
    where
        F: FnMut(Position) -> T,
    {
        let size = rows.checked_mul(cols).expect("Grid size overflow");
        let mut cells = Vec::with_capacity(size);
        for row in 0..rows {
            for col in 0..cols {
                cells.push(f(Position { row, col }));
            }
        }
        Grid { rows, cols, cells }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Returns `(rows, cols)`.
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn position_to_index(&self, pos: Position) -> Option<usize> {
        if self.is_valid(pos) {
            Some(pos.row * self.cols + pos.col)
        } else {
            None
        }
    }

    #[inline]
    fn index_to_position(cols: usize, index: usize) -> Position {
        Position {
            row: index / cols,
            col: index % cols,
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn is_valid(&self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    fn out_of_bounds(&self, pos: Position) -> GridError {
        GridError::OutOfBounds {
            row: pos.row,
            col: pos.col,
            rows: self.rows,
            cols: self.cols,
        }
    }

    /// Gets an immutable reference to the cell at the given position.
    pub fn get(&self, pos: Position) -> Result<&T, GridError> {
        let index = self
            .position_to_index(pos)
            .ok_or_else(|| self.out_of_bounds(pos))?;
        Ok(&self.cells[index])
    }

    /// Gets a mutable reference to the cell at the given position.
    pub fn get_mut(&mut self, pos: Position) -> Result<&mut T, GridError> {
        let index = self
            .position_to_index(pos)
            .ok_or_else(|| self.out_of_bounds(pos))?;
        Ok(&mut self.cells[index])
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        *self.get_mut(pos)? = value;
        Ok(())
    }

    /// Position one step away in `direction`, or `pos` itself when that step
    /// would leave the grid.
    pub fn clamped_neighbor(&self, direction: Direction, pos: Position) -> Position {
        let (d_row, d_col) = direction.offset();
        let target = pos
            .row
            .checked_add_signed(d_row)
            .zip(pos.col.checked_add_signed(d_col))
            .map(|(row, col)| Position { row, col });
        match target {
            Some(target) if self.is_valid(target) => target,
            _ => pos,
        }
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let cols = self.cols;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Self::index_to_position(cols, index), cell))
    }

    /// Positions of every cell matching `predicate`, in row-major order.
    pub fn positions_of<P>(&self, mut predicate: P) -> Vec<Position>
    where
        P: FnMut(&T) -> bool,
    {
        self.enumerate()
            .filter_map(|(pos, cell)| predicate(cell).then_some(pos))
            .collect()
    }

    /// Returns the cells of one row as a slice.
    ///
    /// # Panics
    ///
    /// Panics if `row` is out of bounds.
    pub fn row(&self, row: usize) -> &[T] {
        assert!(
            row < self.rows,
            "Grid row {} out of bounds for grid size ({}, {})",
            row,
            self.rows,
            self.cols
        );
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.position_to_index(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.row, pos.col, self.rows, self.cols
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        let rows = self.rows;
        let cols = self.cols;
        match self.position_to_index(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.row, pos.col, rows, cols
            ),
        }
    }
}
