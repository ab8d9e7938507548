//! Liveness of the agents of one environment.
use schola_core::{AgentId, EnvId};
use std::collections::{BTreeMap, BTreeSet};

/// Tracks which agents of an environment are active, terminated or truncated.
///
/// The tracker refers to its environment by id only; the owning adapter holds
/// the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTracker {
    env_id: EnvId,
    active: BTreeSet<AgentId>,
    terminated: BTreeSet<AgentId>,
    truncated: BTreeSet<AgentId>,
    reset_on_next_step: bool,
}

impl AgentTracker {
    /// Tracker of environment `env_id`, with no agent yet.
    pub fn new(env_id: EnvId) -> Self {
        Self {
            env_id,
            active: BTreeSet::new(),
            terminated: BTreeSet::new(),
            truncated: BTreeSet::new(),
            reset_on_next_step: false,
        }
    }

    /// Starts a new episode in which the observed agents are active.
    pub fn reset<T>(&mut self, observations: &BTreeMap<AgentId, T>) {
        self.active = observations.keys().cloned().collect();
        self.terminated.clear();
        self.truncated.clear();
        self.reset_on_next_step = false;
    }

    /// Updates the sets with the result of a step and returns the
    /// `(terminated, truncated)` flags of the whole environment.
    ///
    /// If the previous step ended the episode, this step carries the first
    /// observation of the next one and is handled as a reset. An agent seen
    /// for the first time, at reset or later, becomes active.
    pub fn step<T>(
        &mut self,
        observations: &BTreeMap<AgentId, T>,
        terminateds: &BTreeMap<AgentId, bool>,
        truncateds: &BTreeMap<AgentId, bool>,
    ) -> (bool, bool) {
        if self.reset_on_next_step {
            self.reset(observations);
        } else {
            let flagged = |flags: &BTreeMap<AgentId, bool>| {
                flags
                    .iter()
                    .filter(|(_, v)| **v)
                    .map(|(k, _)| k.clone())
                    .collect::<Vec<_>>()
            };
            self.terminated.extend(flagged(terminateds));
            self.truncated.extend(flagged(truncateds));
            let done = self.done();
            self.active = self
                .active
                .iter()
                .chain(observations.keys())
                .filter(|a| !done.contains(*a))
                .cloned()
                .collect();
        }

        let done = self.done();
        let total = self.active.union(&done).count();
        let terminated_all = total > 0 && done.len() == total;
        let truncated_all = total > 0 && self.truncated.len() == total;
        if terminated_all || truncated_all {
            self.reset_on_next_step = true;
        }
        (terminated_all, truncated_all)
    }

    fn done(&self) -> BTreeSet<AgentId> {
        self.terminated.union(&self.truncated).cloned().collect()
    }

    /// Environment id.
    pub fn env_id(&self) -> EnvId {
        self.env_id
    }

    /// Agents that are active, in id order.
    pub fn agents(&self) -> Vec<AgentId> {
        self.active.iter().cloned().collect()
    }

    /// Agents terminated in the current episode.
    pub fn terminated(&self) -> &BTreeSet<AgentId> {
        &self.terminated
    }

    /// Agents truncated in the current episode.
    pub fn truncated(&self) -> &BTreeSet<AgentId> {
        &self.truncated
    }

    /// Returns `true` if the episode ended and the next step starts a new one.
    pub fn reset_on_next_step(&self) -> bool {
        self.reset_on_next_step
    }
}
