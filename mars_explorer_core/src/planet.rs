use serde::{Deserialize, Serialize};

use crate::{Position, map::Grid};

/// Contents of a single planet cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Sample,
    Obstacle,
    Agent,
    /// The deposit point, with the number of samples delivered so far.
    Ship { collected: u32 },
}

impl Cell {
    /// Display glyph for this cell.
    pub fn glyph(&self) -> char {
        match self {
            Cell::Empty => ' ',
            Cell::Sample => 'S',
            Cell::Obstacle => 'O',
            Cell::Agent => 'A',
            Cell::Ship { .. } => 'N',
        }
    }

    pub fn from_glyph(glyph: char) -> Option<Cell> {
        match glyph {
            ' ' | '.' => Some(Cell::Empty),
            'S' => Some(Cell::Sample),
            'O' => Some(Cell::Obstacle),
            'A' => Some(Cell::Agent),
            'N' => Some(Cell::Ship { collected: 0 }),
            _ => None,
        }
    }

    pub fn is_sample(&self) -> bool {
        matches!(self, Cell::Sample)
    }

    pub fn is_obstacle(&self) -> bool {
        matches!(self, Cell::Obstacle)
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, Cell::Agent)
    }

    pub fn is_ship(&self) -> bool {
        matches!(self, Cell::Ship { .. })
    }
}

impl Grid<Cell> {
    /// Projects the grid to glyph rows, one string per row.
    pub fn render(&self) -> Vec<String> {
        (0..self.rows())
            .map(|row| self.row(row).iter().map(Cell::glyph).collect())
            .collect()
    }
}

/// Errors raised while parsing a text map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapError {
    #[error("Map string is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map glyph '{glyph}' at position ({row}, {col})")]
    UnknownGlyph { glyph: char, row: usize, col: usize },
    #[error("Map has no agent ('A')")]
    MissingAgent,
    #[error("Map has more than one agent ('A')")]
    MultipleAgents,
    #[error("Map has no ship ('N')")]
    MissingShip,
    #[error("Map has more than one ship ('N')")]
    MultipleShips,
}

/// A parsed planet: the grid plus the positions of its agent and ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanetLayout {
    pub grid: Grid<Cell>,
    pub agent: Position,
    pub ship: Position,
}

/// Loads a planet from its text form, one line per row, using the render
/// glyphs. `.` is accepted as an empty cell so trailing blanks survive editors.
///
/// Zero-length lines around the map are ignored; a line of spaces is a row
/// of empty cells.
pub fn load_planet_from_string(map_string: &str) -> Result<PlanetLayout, MapError> {
    let lines: Vec<&str> = map_string
        .lines()
        .skip_while(|line| line.is_empty())
        .collect();
    let lines: Vec<&str> = match lines.iter().rposition(|line| !line.is_empty()) {
        Some(last) => lines[..=last].to_vec(),
        None => return Err(MapError::Empty),
    };

    let cols = lines[0].chars().count();

    let mut parsed_rows: Vec<Vec<Cell>> = Vec::with_capacity(lines.len());
    let mut agent: Option<Position> = None;
    let mut ship: Option<Position> = None;

    for (row, line) in lines.iter().enumerate() {
        let found = line.chars().count();
        if found != cols {
            return Err(MapError::InconsistentWidth {
                row,
                expected: cols,
                found,
            });
        }
        let mut cells = Vec::with_capacity(cols);
        for (col, glyph) in line.chars().enumerate() {
            let cell =
                Cell::from_glyph(glyph).ok_or(MapError::UnknownGlyph { glyph, row, col })?;
            let pos = Position { row, col };
            match cell {
                Cell::Agent => {
                    if agent.replace(pos).is_some() {
                        return Err(MapError::MultipleAgents);
                    }
                }
                Cell::Ship { .. } => {
                    if ship.replace(pos).is_some() {
                        return Err(MapError::MultipleShips);
                    }
                }
                _ => {}
            }
            cells.push(cell);
        }
        parsed_rows.push(cells);
    }

    let agent = agent.ok_or(MapError::MissingAgent)?;
    let ship = ship.ok_or(MapError::MissingShip)?;
    let grid = Grid::from_generator(parsed_rows.len(), cols, |pos| parsed_rows[pos.row][pos.col]);

    Ok(PlanetLayout { grid, agent, ship })
}
