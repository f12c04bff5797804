use std::fmt;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, info};

use crate::{
    AgentState, Direction, Position,
    config::{IdleBehavior, SimulationConfig},
    map::Grid,
    planet::{Cell, PlanetLayout},
};

/// Neighbor order used when looking for a sample to pick up.
const SEARCH_ORDER: [Direction; 4] = [
    Direction::Down,
    Direction::Up,
    Direction::Right,
    Direction::Left,
];

/// Errors that prevent a simulation from being built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    #[error("Planet of size ({rows}, {cols}) cannot hold both an agent and a ship")]
    GridTooSmall { rows: usize, cols: usize },
}

/// A broken internal invariant. Never produced by a correct simulation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("Expected exactly one agent cell, found {found}")]
    AgentCount { found: usize },
    #[error("Agent cell at {found:?} but agent is tracked at {tracked:?}")]
    AgentMisplaced { tracked: Position, found: Position },
    #[error("Expected exactly one ship cell, found {found}")]
    ShipCount { found: usize },
    #[error("Ship cell at {found:?} but ship is tracked at {tracked:?}")]
    ShipMisplaced { tracked: Position, found: Position },
    #[error("Ship cell holds {found} samples but {tracked} were delivered")]
    ShipCountMismatch { tracked: u32, found: u32 },
}

/// What a single call to [`Simulation::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The agent stayed where it was.
    Idle { at: Position },
    /// The agent carries samples but every neighbor is off limits.
    Blocked { at: Position },
    Moved { from: Position, to: Position },
    /// The agent stepped onto a sample and picked it up.
    PickedUp { at: Position },
    /// The agent unloaded `amount` samples at the ship.
    Deposited { amount: u32, total: u32 },
}

/// The planet plus the explorer's decision policy.
#[derive(Debug, Clone)]
pub struct Simulation {
    grid: Grid<Cell>,
    agent: AgentState,
    ship: Position,
    collected: u32,
    /// Directions tried first while carrying. Shuffled once per run and
    /// consumed across steps.
    preferences: Vec<Direction>,
    idle: IdleBehavior,
    rng: StdRng,
    ticks: u64,
}

impl Simulation {
    /// Builds a randomly populated planet with the default entity counts,
    /// seeded from OS entropy.
    pub fn initialize(rows: usize, cols: usize) -> Result<Self, SimulationError> {
        Self::from_config(&SimulationConfig::new(rows, cols))
    }

    /// Same as [`Simulation::initialize`] with a fixed seed.
    pub fn with_seed(rows: usize, cols: usize, seed: u64) -> Result<Self, SimulationError> {
        Self::from_config(&SimulationConfig::new(rows, cols).with_seed(seed))
    }

    /// Builds a randomly populated planet.
    ///
    /// Samples, then obstacles, then the agent are dropped at uniformly random
    /// cells with no collision checks, so later entities may cover earlier
    /// ones. The ship always sits in the bottom-right corner; the agent is
    /// never placed there.
    pub fn from_config(config: &SimulationConfig) -> Result<Self, SimulationError> {
        let (rows, cols) = (config.rows, config.cols);
        if rows.saturating_mul(cols) < 2 {
            return Err(SimulationError::GridTooSmall { rows, cols });
        }

        let mut rng = seeded_rng(config.seed);
        let mut grid = Grid::new(rows, cols);

        for _ in 0..config.samples {
            grid[random_position(&mut rng, rows, cols)] = Cell::Sample;
        }
        for _ in 0..config.obstacles {
            grid[random_position(&mut rng, rows, cols)] = Cell::Obstacle;
        }

        let ship = Position::new(rows - 1, cols - 1);
        let agent = loop {
            let pos = random_position(&mut rng, rows, cols);
            if pos != ship {
                break pos;
            }
        };
        grid[agent] = Cell::Agent;
        grid[ship] = Cell::Ship { collected: 0 };

        info!(
            rows,
            cols,
            seed = ?config.seed,
            agent = ?agent,
            "planet initialized"
        );

        Ok(Self::assemble(grid, agent, ship, config.idle, rng))
    }

    /// Builds a simulation around a pre-made planet, e.g. one parsed with
    /// [`crate::load_planet_from_string`]. Only `seed` and `idle` are read
    /// from `config`.
    pub fn from_layout(layout: PlanetLayout, config: &SimulationConfig) -> Self {
        let PlanetLayout {
            mut grid,
            agent,
            ship,
        } = layout;
        grid[ship] = Cell::Ship { collected: 0 };
        let rng = seeded_rng(config.seed);
        Self::assemble(grid, agent, ship, config.idle, rng)
    }

    fn assemble(
        grid: Grid<Cell>,
        agent: Position,
        ship: Position,
        idle: IdleBehavior,
        mut rng: StdRng,
    ) -> Self {
        let mut preferences = vec![Direction::Right, Direction::Down];
        preferences.shuffle(&mut rng);
        Self {
            grid,
            agent: AgentState::new(agent),
            ship,
            collected: 0,
            preferences,
            idle,
            rng,
            ticks: 0,
        }
    }

    pub fn grid(&self) -> &Grid<Cell> {
        &self.grid
    }

    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    pub fn agent_position(&self) -> Position {
        self.agent.position
    }

    pub fn carried(&self) -> u32 {
        self.agent.carried()
    }

    /// Samples delivered to the ship so far.
    pub fn collected(&self) -> u32 {
        self.collected
    }

    pub fn ship_position(&self) -> Position {
        self.ship
    }

    /// Remaining carry preferences; popped from the back.
    pub fn preferences(&self) -> &[Direction] {
        &self.preferences
    }

    pub fn idle_behavior(&self) -> IdleBehavior {
        self.idle
    }

    /// Number of steps taken so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Neighbor of `pos` in `direction`, or `pos` when that would leave the planet.
    pub fn clamped_neighbor(&self, direction: Direction, pos: Position) -> Position {
        self.grid.clamped_neighbor(direction, pos)
    }

    /// Runs one decision and applies it to the planet.
    pub fn step(&mut self) -> StepOutcome {
        let outcome = if self.agent.is_loaded() {
            self.step_carrying()
        } else {
            self.step_searching()
        };
        self.ticks += 1;
        debug!(tick = self.ticks, ?outcome, carried = self.carried(), "step");

        if cfg!(debug_assertions) {
            if let Err(violation) = self.check_invariants() {
                panic!("simulation invariant violated: {violation}");
            }
        }

        outcome
    }

    fn step_carrying(&mut self) -> StepOutcome {
        let here = self.agent.position;
        let can_move = Direction::ALL
            .iter()
            .any(|&dir| self.accepts_while_carrying(self.clamped_neighbor(dir, here)));
        if !can_move {
            return StepOutcome::Blocked { at: here };
        }

        let mut candidate = here;
        while candidate == here {
            match self.preferences.pop() {
                Some(dir) => candidate = self.clamped_neighbor(dir, here),
                None => break,
            }
        }
        while !self.accepts_while_carrying(candidate) {
            candidate = self.random_neighbor(here);
        }

        if self.grid[candidate].is_ship() {
            let amount = self.agent.unload();
            self.collected += amount;
            self.grid[self.ship] = Cell::Ship {
                collected: self.collected,
            };
            info!(amount, total = self.collected, "samples delivered to ship");
            StepOutcome::Deposited {
                amount,
                total: self.collected,
            }
        } else {
            self.move_agent(candidate);
            StepOutcome::Moved {
                from: here,
                to: candidate,
            }
        }
    }

    fn step_searching(&mut self) -> StepOutcome {
        let here = self.agent.position;
        let sample = SEARCH_ORDER
            .iter()
            .map(|&dir| self.clamped_neighbor(dir, here))
            .find(|&pos| self.grid[pos].is_sample());

        if let Some(target) = sample {
            self.agent.load(1);
            self.move_agent(target);
            debug!(at = ?target, "sample picked up");
            return StepOutcome::PickedUp { at: target };
        }

        match self.idle {
            IdleBehavior::Stay => {
                self.move_agent(here);
                StepOutcome::Idle { at: here }
            }
            IdleBehavior::Wander => self.wander(),
        }
    }

    fn wander(&mut self) -> StepOutcome {
        let here = self.agent.position;
        let open = |sim: &Self, pos: Position| pos != here && !sim.grid[pos].is_obstacle();
        let can_move = Direction::ALL
            .iter()
            .any(|&dir| open(self, self.clamped_neighbor(dir, here)));
        if !can_move {
            return StepOutcome::Idle { at: here };
        }

        let mut candidate = self.random_neighbor(here);
        while !open(self, candidate) {
            candidate = self.random_neighbor(here);
        }
        self.move_agent(candidate);

        if self.agent.position == here {
            StepOutcome::Idle { at: here }
        } else {
            StepOutcome::Moved {
                from: here,
                to: candidate,
            }
        }
    }

    fn accepts_while_carrying(&self, pos: Position) -> bool {
        pos != self.agent.position
            && !matches!(self.grid[pos], Cell::Obstacle | Cell::Sample)
    }

    fn random_neighbor(&mut self, pos: Position) -> Position {
        let dir = Direction::ALL[self.rng.random_range(0..Direction::ALL.len())];
        self.clamped_neighbor(dir, pos)
    }

    /// Moves the agent cell onto `target`, leaving an empty cell behind.
    ///
    /// Does nothing when `target` is the agent's own cell or the ship.
    ///
    /// # Panics
    ///
    /// Panics if `target` lies outside the planet.
    pub fn move_agent(&mut self, target: Position) {
        let here = self.agent.position;
        if target == here || self.grid[target].is_ship() {
            return;
        }
        self.grid[target] = std::mem::take(&mut self.grid[here]);
        self.agent.position = target;
    }

    /// Steps repeatedly while `keep_running` returns true, reporting every
    /// outcome to `on_tick`. Returns the number of steps taken.
    pub fn run<K, T>(&mut self, mut keep_running: K, mut on_tick: T) -> u64
    where
        K: FnMut(&Simulation) -> bool,
        T: FnMut(&Simulation, StepOutcome),
    {
        let mut steps = 0;
        while keep_running(self) {
            let outcome = self.step();
            steps += 1;
            on_tick(self, outcome);
        }
        steps
    }

    /// Header line followed by a blank line and one glyph row per grid row.
    pub fn render_frame(&self) -> Vec<String> {
        let mut frame = Vec::with_capacity(self.grid.rows() + 2);
        frame.push(format!("Amostras coletadas: {}", self.collected));
        frame.push(String::new());
        frame.extend(self.grid.render());
        frame
    }

    /// Checks that the grid agrees with the tracked agent and ship state.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        let agents = self.grid.positions_of(Cell::is_agent);
        match agents.as_slice() {
            [found] if *found == self.agent.position => {}
            [found] => {
                return Err(InvariantViolation::AgentMisplaced {
                    tracked: self.agent.position,
                    found: *found,
                });
            }
            _ => {
                return Err(InvariantViolation::AgentCount {
                    found: agents.len(),
                });
            }
        }

        let ships = self.grid.positions_of(Cell::is_ship);
        match ships.as_slice() {
            [found] if *found == self.ship => {}
            [found] => {
                return Err(InvariantViolation::ShipMisplaced {
                    tracked: self.ship,
                    found: *found,
                });
            }
            _ => {
                return Err(InvariantViolation::ShipCount {
                    found: ships.len(),
                });
            }
        }

        match self.grid[self.ship] {
            Cell::Ship { collected } if collected != self.collected => {
                Err(InvariantViolation::ShipCountMismatch {
                    tracked: self.collected,
                    found: collected,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.render_frame() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn random_position(rng: &mut StdRng, rows: usize, cols: usize) -> Position {
    Position::new(rng.random_range(0..rows), rng.random_range(0..cols))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_planet_from_string;
    use proptest::prelude::*;

    fn simulation(map: &str) -> Simulation {
        let layout = load_planet_from_string(map).expect("valid map");
        Simulation::from_layout(layout, &SimulationConfig::default().with_seed(7))
    }

    fn count(sim: &Simulation, predicate: fn(&Cell) -> bool) -> usize {
        sim.grid().iter().filter(|cell| predicate(cell)).count()
    }

    #[test]
    fn picks_up_sample_to_the_right_when_down_and_up_are_empty() {
        let mut sim = simulation("AS.\n...\n..N");

        assert_eq!(
            sim.step(),
            StepOutcome::PickedUp {
                at: Position::new(0, 1)
            }
        );
        assert_eq!(sim.agent_position(), Position::new(0, 1));
        assert_eq!(sim.carried(), 1);
        assert_eq!(sim.grid()[Position::new(0, 1)], Cell::Agent);
        assert_eq!(sim.grid()[Position::new(0, 0)], Cell::Empty);
    }

    #[test]
    fn down_sample_wins_over_up_sample() {
        let mut sim = simulation(".S.\n.A.\n.SN");

        sim.step();
        assert_eq!(sim.agent_position(), Position::new(2, 1));
        assert_eq!(sim.grid()[Position::new(2, 1)], Cell::Agent);
        assert_eq!(sim.grid()[Position::new(0, 1)], Cell::Sample);
        assert_eq!(sim.carried(), 1);
    }

    #[test]
    fn stays_put_without_adjacent_sample() {
        let mut sim = simulation("A..\n..S\n..N");
        let before = sim.grid().clone();

        assert_eq!(
            sim.step(),
            StepOutcome::Idle {
                at: Position::new(0, 0)
            }
        );
        assert_eq!(sim.grid(), &before);
    }

    #[test]
    fn delivers_after_pickup_next_to_ship() {
        // Down leads off the planet, so either preference order ends at the ship.
        let mut sim = simulation("...\n.A.\n.SN");

        sim.step();
        assert_eq!(sim.agent_position(), Position::new(2, 1));
        assert_eq!(
            sim.step(),
            StepOutcome::Deposited {
                amount: 1,
                total: 1
            }
        );
        assert_eq!(sim.agent_position(), Position::new(2, 1));
        assert_eq!(sim.carried(), 0);
        assert_eq!(sim.collected(), 1);
        assert_eq!(
            sim.grid()[sim.ship_position()],
            Cell::Ship { collected: 1 }
        );
        assert!(sim.render_frame()[0].ends_with(": 1"));
    }

    #[test]
    fn deposit_transfers_the_whole_load() {
        let mut sim = simulation("...\n.AN\n...");
        sim.agent.load(2);
        sim.preferences = vec![Direction::Down, Direction::Right];

        assert_eq!(
            sim.step(),
            StepOutcome::Deposited {
                amount: 2,
                total: 2
            }
        );
        assert_eq!(sim.agent_position(), Position::new(1, 1));
        assert_eq!(sim.carried(), 0);
        assert_eq!(sim.preferences(), &[Direction::Down]);
    }

    #[test]
    fn preferred_direction_is_consumed_once() {
        let mut sim = simulation("A...\n....\n...N");
        sim.agent.load(1);
        sim.preferences = vec![Direction::Down, Direction::Right];

        assert_eq!(
            sim.step(),
            StepOutcome::Moved {
                from: Position::new(0, 0),
                to: Position::new(0, 1)
            }
        );
        assert_eq!(sim.preferences(), &[Direction::Down]);

        sim.step();
        assert!(sim.preferences().is_empty());
    }

    #[test]
    fn carrying_agent_is_blocked_by_obstacles_and_samples() {
        let mut sim = simulation("AO.\nS..\n..N");
        sim.agent.load(1);
        let before = sim.grid().clone();

        assert_eq!(
            sim.step(),
            StepOutcome::Blocked {
                at: Position::new(0, 0)
            }
        );
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.preferences().len(), 2);
    }

    #[test]
    fn carrying_agent_takes_the_only_open_neighbor() {
        let mut sim = simulation("OSO\nOA.\nOON");
        sim.agent.load(1);

        for _ in 0..3 {
            sim.step();
            assert!([Position::new(1, 1), Position::new(1, 2)].contains(&sim.agent_position()));
        }
        // From (1,2) the only legal moves are back to (1,1) or onto the ship.
        assert!(sim.collected() > 0 || sim.carried() == 1);
        assert_eq!(count(&sim, Cell::is_obstacle), 5);
        assert_eq!(count(&sim, Cell::is_sample), 1);
    }

    #[test]
    fn move_agent_to_itself_changes_nothing() {
        let mut sim = simulation("S.A\nO..\n..N");
        let before = sim.grid().clone();

        sim.move_agent(sim.agent_position());
        assert_eq!(sim.grid(), &before);
        assert_eq!(sim.agent_position(), Position::new(0, 2));
    }

    #[test]
    fn move_agent_never_enters_the_ship() {
        let mut sim = simulation("...\n...\n.AN");
        let before = sim.grid().clone();

        sim.move_agent(sim.ship_position());
        assert_eq!(sim.grid(), &before);
    }

    #[test]
    fn wandering_agent_avoids_obstacles() {
        let layout = load_planet_from_string("AO\n.N").unwrap();
        let config = SimulationConfig::default()
            .with_seed(3)
            .with_idle(IdleBehavior::Wander);
        let mut sim = Simulation::from_layout(layout, &config);

        assert_eq!(
            sim.step(),
            StepOutcome::Moved {
                from: Position::new(0, 0),
                to: Position::new(1, 0)
            }
        );
    }

    #[test]
    fn initialization_places_entities() {
        let sim = Simulation::with_seed(10, 20, 42).unwrap();

        assert_eq!(sim.grid().dimensions(), (10, 20));
        assert_eq!(sim.ship_position(), Position::new(9, 19));
        assert_eq!(sim.grid()[Position::new(9, 19)], Cell::Ship { collected: 0 });
        assert_eq!(count(&sim, Cell::is_agent), 1);
        assert!(count(&sim, Cell::is_sample) <= 5);
        assert!(count(&sim, Cell::is_obstacle) <= 5);
        assert_eq!(sim.carried(), 0);
        assert_eq!(sim.collected(), 0);
        assert_eq!(sim.preferences().len(), 2);
        assert!(sim.preferences().contains(&Direction::Right));
        assert!(sim.preferences().contains(&Direction::Down));
        assert_eq!(sim.check_invariants(), Ok(()));
    }

    #[test]
    fn same_seed_same_planet() {
        let a = Simulation::with_seed(10, 20, 9).unwrap();
        let b = Simulation::with_seed(10, 20, 9).unwrap();
        assert_eq!(a.render_frame(), b.render_frame());
    }

    #[test]
    fn rejects_planets_without_room_for_agent_and_ship() {
        assert_eq!(
            Simulation::with_seed(1, 1, 0).unwrap_err(),
            SimulationError::GridTooSmall { rows: 1, cols: 1 }
        );
        assert!(Simulation::initialize(0, 5).is_err());
        assert!(Simulation::with_seed(1, 2, 0).is_ok());
    }

    #[test]
    fn render_frame_has_header_and_rows() {
        let sim = simulation("AS\nON");
        assert_eq!(
            sim.render_frame(),
            vec!["Amostras coletadas: 0", "", "AS", "ON"]
        );
        assert_eq!(sim.to_string(), "Amostras coletadas: 0\n\nAS\nON\n");
    }

    #[test]
    fn run_stops_when_asked() {
        let mut sim = simulation("A..\n...\n..N");
        let mut seen = 0;
        let steps = sim.run(|sim| sim.ticks() < 7, |_, _| seen += 1);
        assert_eq!(steps, 7);
        assert_eq!(seen, 7);
        assert_eq!(sim.ticks(), 7);
    }

    #[test]
    fn invariant_check_reports_stray_agent() {
        let mut sim = simulation("A..\n...\n..N");
        sim.grid[Position::new(1, 1)] = Cell::Agent;
        assert_eq!(
            sim.check_invariants(),
            Err(InvariantViolation::AgentCount { found: 2 })
        );
    }

    proptest! {
        #[test]
        fn random_runs_keep_invariants(
            rows in 2..12usize,
            cols in 2..12usize,
            seed in any::<u64>(),
            steps in 0..200usize,
            wander in any::<bool>(),
        ) {
            let idle = if wander { IdleBehavior::Wander } else { IdleBehavior::Stay };
            let config = SimulationConfig {
                rows,
                cols,
                samples: 8,
                obstacles: 4,
                seed: Some(seed),
                idle,
            };
            let mut sim = Simulation::from_config(&config).unwrap();
            let obstacles = sim.grid().positions_of(Cell::is_obstacle);
            let total = count(&sim, Cell::is_sample) as u32;

            for _ in 0..steps {
                let before = sim.collected();
                sim.step();
                prop_assert_eq!(sim.check_invariants(), Ok(()));
                prop_assert!(!obstacles.contains(&sim.agent_position()));
                prop_assert!(sim.collected() >= before);
                let on_grid = count(&sim, Cell::is_sample) as u32;
                prop_assert_eq!(on_grid + sim.carried() + sim.collected(), total);
            }
            prop_assert_eq!(sim.grid().positions_of(Cell::is_obstacle), obstacles);
        }
    }
}
