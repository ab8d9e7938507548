//! Deterministic environments for tests of the framework adapters.
use super::{AgentDefinition, LocalEnv};
use crate::{
    protocol::{EnvReset, EnvStep},
    AgentId, Info, Options, Point, Space,
};
use anyhow::Result;
use std::collections::BTreeMap;

/// Counts its steps.
///
/// Every agent observes the counter and is rewarded with its discrete action.
/// An agent terminates when the counter reaches its threshold. The counter
/// restarts at the reset seed, or 0 without a seed.
#[derive(Debug, Clone)]
pub struct CountEnv {
    thresholds: Vec<(AgentId, i64)>,
    count: i64,
}

impl CountEnv {
    /// Agent id used by [`CountEnv::single`].
    pub const AGENT: &'static str = "agent_0";

    /// Environment with one agent terminating at `threshold`.
    pub fn single(threshold: i64) -> Self {
        Self::new(vec![(Self::AGENT, threshold)])
    }

    /// Environment with one agent per `(agent_id, threshold)` pair.
    pub fn new<S: Into<AgentId>>(thresholds: Vec<(S, i64)>) -> Self {
        Self {
            thresholds: thresholds.into_iter().map(|(a, t)| (a.into(), t)).collect(),
            count: 0,
        }
    }

    /// Observation space shared by every agent.
    pub fn observation_space() -> Space {
        Space::discrete(16)
    }

    /// Action space shared by every agent.
    pub fn action_space() -> Space {
        Space::discrete(5)
    }

    /// Steps taken since the last reset, offset by the reset seed.
    pub fn count(&self) -> i64 {
        self.count
    }
}

impl LocalEnv for CountEnv {
    fn agents(&self) -> Vec<AgentDefinition> {
        self.thresholds
            .iter()
            .map(|(a, _)| AgentDefinition::new(a.clone(), Self::observation_space(), Self::action_space()))
            .collect()
    }

    fn reset(&mut self, seed: Option<u64>, _options: &Options) -> Result<EnvReset> {
        self.count = seed.map_or(0, |s| s as i64);
        let mut reset = EnvReset::default();
        for (agent_id, _) in self.thresholds.iter() {
            reset
                .observations
                .insert(agent_id.clone(), Point::Discrete(self.count));
            reset.infos.insert(agent_id.clone(), Info::new());
        }
        Ok(reset)
    }

    fn step(&mut self, actions: &BTreeMap<AgentId, Point>) -> Result<EnvStep> {
        self.count += 1;
        let mut step = EnvStep::default();
        for (agent_id, threshold) in self.thresholds.iter() {
            let reward = actions
                .get(agent_id)
                .and_then(Point::as_discrete)
                .unwrap_or(0);
            step.observations
                .insert(agent_id.clone(), Point::Discrete(self.count));
            step.rewards.insert(agent_id.clone(), reward as f32);
            step.terminateds
                .insert(agent_id.clone(), self.count == *threshold);
            step.truncateds.insert(agent_id.clone(), false);
            step.infos.insert(agent_id.clone(), Info::new());
        }
        Ok(step)
    }
}

/// Environment whose population changes within an episode.
///
/// [`DynamicEnv::RUNNER`] acts from the start and is truncated at
/// `truncate_at`. [`DynamicEnv::SPAWNED`] appears at `spawn_at` and terminates
/// at `terminate_at`. Agents are reported on the step they finish and never
/// after. Observations are the step counter.
#[derive(Debug, Clone)]
pub struct DynamicEnv {
    spawn_at: i64,
    terminate_at: i64,
    truncate_at: i64,
    count: i64,
}

impl DynamicEnv {
    /// Agent present from the first step.
    pub const RUNNER: &'static str = "runner";

    /// Agent spawned within the episode.
    pub const SPAWNED: &'static str = "spawned";

    /// Creates the environment.
    pub fn new(spawn_at: i64, terminate_at: i64, truncate_at: i64) -> Self {
        Self {
            spawn_at,
            terminate_at,
            truncate_at,
            count: 0,
        }
    }

    fn observe(&self, step: &mut EnvStep, agent_id: &str, terminated: bool, truncated: bool) {
        let agent_id = agent_id.to_string();
        step.observations
            .insert(agent_id.clone(), Point::Discrete(self.count));
        step.rewards.insert(agent_id.clone(), 1.0);
        step.terminateds.insert(agent_id.clone(), terminated);
        step.truncateds.insert(agent_id.clone(), truncated);
        step.infos.insert(agent_id, Info::new());
    }
}

impl LocalEnv for DynamicEnv {
    fn agents(&self) -> Vec<AgentDefinition> {
        vec![
            AgentDefinition::new(Self::RUNNER, Space::discrete(64), Space::discrete(2)),
            AgentDefinition::new(Self::SPAWNED, Space::discrete(64), Space::discrete(3)),
        ]
    }

    fn reset(&mut self, _seed: Option<u64>, _options: &Options) -> Result<EnvReset> {
        self.count = 0;
        let mut reset = EnvReset::default();
        reset
            .observations
            .insert(Self::RUNNER.to_string(), Point::Discrete(0));
        reset.infos.insert(Self::RUNNER.to_string(), Info::new());
        Ok(reset)
    }

    fn step(&mut self, _actions: &BTreeMap<AgentId, Point>) -> Result<EnvStep> {
        self.count += 1;
        let mut step = EnvStep::default();
        if self.count <= self.truncate_at {
            self.observe(&mut step, Self::RUNNER, false, self.count == self.truncate_at);
        }
        if self.count >= self.spawn_at && self.count <= self.terminate_at {
            self.observe(&mut step, Self::SPAWNED, self.count == self.terminate_at, false);
        }
        Ok(step)
    }
}
