use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod map;
pub mod planet;
pub mod simulation;

/// Represents a 2D coordinate on the planet as `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// The four axis-aligned directions the agent can move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Unit offset as `(d_row, d_col)`.
    pub fn offset(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }
}

pub use agent::AgentState;
pub use config::{IdleBehavior, SimulationConfig};
pub use map::{Grid, GridError};
pub use planet::{Cell, MapError, PlanetLayout, load_planet_from_string};
pub use simulation::{InvariantViolation, Simulation, SimulationError, StepOutcome};
