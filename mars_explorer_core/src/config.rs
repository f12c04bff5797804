use serde::{Deserialize, Serialize};

/// What the agent does on a step where it carries nothing and no sample is adjacent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleBehavior {
    /// Stay in place until a sample appears next to the agent.
    #[default]
    Stay,
    /// Step to a random neighbor that is not an obstacle.
    Wander,
}

/// Parameters for building a randomly populated planet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub rows: usize,
    pub cols: usize,
    pub samples: usize,
    pub obstacles: usize,
    /// Fixed RNG seed. `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub idle: IdleBehavior,
}

impl SimulationConfig {
    pub const DEFAULT_ROWS: usize = 10;
    pub const DEFAULT_COLS: usize = Self::DEFAULT_ROWS * 2;
    pub const DEFAULT_SAMPLES: usize = 5;
    pub const DEFAULT_OBSTACLES: usize = 5;

    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_idle(mut self, idle: IdleBehavior) -> Self {
        self.idle = idle;
        self
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            rows: Self::DEFAULT_ROWS,
            cols: Self::DEFAULT_COLS,
            samples: Self::DEFAULT_SAMPLES,
            obstacles: Self::DEFAULT_OBSTACLES,
            seed: None,
            idle: IdleBehavior::Stay,
        }
    }
}
