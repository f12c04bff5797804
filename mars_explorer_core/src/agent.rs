use serde::{Deserialize, Serialize};

use crate::Position;

/// Logical state of the explorer agent.
///
/// `position` mirrors the location of the single `Cell::Agent` on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    carried: u32,
}

impl AgentState {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            carried: 0,
        }
    }

    /// Number of samples currently carried.
    pub fn carried(&self) -> u32 {
        self.carried
    }

    pub fn is_loaded(&self) -> bool {
        self.carried > 0
    }

    pub fn load(&mut self, samples: u32) {
        self.carried += samples;
    }

    /// Empties the agent's hold, returning how many samples it carried.
    pub fn unload(&mut self) -> u32 {
        std::mem::take(&mut self.carried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unload_returns_everything_carried() {
        let mut agent = AgentState::new(Position::new(1, 1));
        assert!(!agent.is_loaded());
        agent.load(1);
        agent.load(2);
        assert!(agent.is_loaded());
        assert_eq!(agent.unload(), 3);
        assert_eq!(agent.carried(), 0);
    }
}
