//! Connection and spaces shared by [`RayEnv`](crate::RayEnv) and
//! [`RayVecEnv`](crate::RayVecEnv).
use crate::AgentTracker;
use anyhow::Result;
use log::{info, trace};
use schola_core::{
    validate_definition, AgentId, AutoResetType, Definition, EnvId, IdManager, Info, Nested,
    Point, RlProtocol, ScholaError, Session, Simulator, Space, StepResponse,
};
use std::collections::{BTreeMap, BTreeSet};

/// Key of the environment-wide entry in the terminal and truncation maps.
pub const ALL_AGENTS: &str = "__all__";

/// Result of a step of one environment, keyed by agent id.
///
/// `terminateds` and `truncateds` also hold an [`ALL_AGENTS`] entry that
/// tells whether the environment as a whole finished.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiAgentStep {
    /// Observations.
    pub observations: BTreeMap<AgentId, Point>,

    /// Rewards.
    pub rewards: BTreeMap<AgentId, f32>,

    /// Terminal flags.
    pub terminateds: BTreeMap<AgentId, bool>,

    /// Truncation flags.
    pub truncateds: BTreeMap<AgentId, bool>,

    /// Infos.
    pub infos: BTreeMap<AgentId, Info>,
}

/// Population and per-agent spaces of a connected simulator.
pub(crate) struct RayDefinition {
    pub id_manager: IdManager,
    pub agent_types: Nested<String>,
    pub possible_agents: BTreeSet<AgentId>,
    pub observation_spaces: BTreeMap<AgentId, Space>,
    pub action_spaces: BTreeMap<AgentId, Space>,
}

impl RayDefinition {
    fn new(definition: Definition) -> Result<Self> {
        validate_definition(&definition)?;
        let possible_agents = definition.ids.iter().flatten().cloned().collect();

        // Per-agent spaces are taken from the first environment.
        let first = |spaces: &Nested<Space>| spaces.get(&0).cloned().unwrap_or_default();
        Ok(Self {
            observation_spaces: first(&definition.observation_spaces),
            action_spaces: first(&definition.action_spaces),
            id_manager: IdManager::new(definition.ids),
            agent_types: definition.agent_types,
            possible_agents,
        })
    }

    /// Connects to the simulator under next-step auto-reset and reads the
    /// population. Fails, after teardown, if there is no environment or an
    /// environment without agents.
    pub fn connect<P: RlProtocol, S: Simulator>(
        protocol: P,
        simulator: S,
    ) -> Result<(Session<P, S>, Self)> {
        let mut session = Session::connect(protocol, simulator)?;

        let startup = session
            .protocol_mut()
            .send_startup_msg(AutoResetType::NextStep);
        session.guard(startup)?;

        let definition = session
            .protocol_mut()
            .get_definition()
            .and_then(Self::new);
        let definition = session.guard(definition)?;
        info!(
            "Connected to {} environments with {} possible agents",
            definition.id_manager.num_envs(),
            definition.possible_agents.len()
        );
        Ok((session, definition))
    }

    pub fn single_observation_space(&self) -> Space {
        Space::dict(self.observation_spaces.clone())
    }

    pub fn single_action_space(&self) -> Space {
        Space::dict(self.action_spaces.clone())
    }
}

/// Fails with [`ScholaError::Environment`] if `n` environments were expected
/// in a response but it has fewer.
pub(crate) fn check_envs<T>(items: &[T], n: usize) -> Result<()> {
    match items.len() >= n {
        true => Ok(()),
        false => Err(ScholaError::Environment(format!(
            "Expected results for {} environments, got {}",
            n,
            items.len()
        ))
        .into()),
    }
}

fn take<T>(items: &mut [BTreeMap<AgentId, T>], env_id: EnvId) -> BTreeMap<AgentId, T> {
    items.get_mut(env_id).map(std::mem::take).unwrap_or_default()
}

/// Moves the results of `env_id` out of `response` and updates `tracker`
/// with them.
pub(crate) fn env_step(
    response: &mut StepResponse,
    env_id: EnvId,
    tracker: &mut AgentTracker,
) -> MultiAgentStep {
    let mut step = MultiAgentStep {
        observations: take(&mut response.observations, env_id),
        rewards: take(&mut response.rewards, env_id),
        terminateds: take(&mut response.terminateds, env_id),
        truncateds: take(&mut response.truncateds, env_id),
        infos: take(&mut response.infos, env_id),
    };
    let (terminated, truncated) =
        tracker.step(&step.observations, &step.terminateds, &step.truncateds);
    if terminated || truncated {
        trace!("Env {} finished, it restarts on the next step", env_id);
    }
    step.terminateds.insert(ALL_AGENTS.to_string(), terminated);
    step.truncateds.insert(ALL_AGENTS.to_string(), truncated);
    step
}
