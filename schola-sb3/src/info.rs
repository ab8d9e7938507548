//! Per-slot info.
use schola_core::{Info, Point};

/// Info of one slot, as returned by [`VecEnv::step`](crate::VecEnv::step).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sb3Info {
    /// Info reported by the simulator.
    pub info: Info,

    /// Last observation of the episode that ended in this step.
    pub terminal_observation: Option<Point>,

    /// For an episode that ended in this step, `true` if it was truncated
    /// without reaching a terminal state.
    pub time_limit_truncated: Option<bool>,
}

impl Sb3Info {
    /// Info of a slot whose episode goes on.
    pub fn new(info: Info) -> Self {
        Self {
            info,
            ..Default::default()
        }
    }

    /// Returns `true` if the episode of the slot ended in this step.
    pub fn is_terminal(&self) -> bool {
        self.terminal_observation.is_some()
    }
}
