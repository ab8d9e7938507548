//! Single-agent environment.
use anyhow::Result;
use log::{info, trace};
use schola_core::{
    validate_definition, ActionSpaces, AgentId, AutoResetType, IdManager, Info, Nested, Options,
    Point, RlProtocol, ScholaError, Session, Simulator, Space,
};
use std::collections::BTreeMap;

/// Result of [`GymEnv::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct GymStep {
    /// Observation after the action.
    pub obs: Point,

    /// Reward.
    pub reward: f32,

    /// `true` if the episode reached a terminal state.
    pub terminated: bool,

    /// `true` if the episode was cut short, e.g. by a time limit.
    pub truncated: bool,

    /// Info.
    pub info: Info,
}

/// A simulator holding exactly one agent, exposed as a single-agent environment.
///
/// The protocol runs with [`AutoResetType::Disabled`]: once an episode ends,
/// [`GymEnv::reset`] must be called before stepping again.
pub struct GymEnv<P: RlProtocol, S: Simulator> {
    session: Session<P, S>,
    agent_id: AgentId,
    agent_types: Nested<String>,
    observation_space: Space,
    action_space: Space,
}

impl<P: RlProtocol, S: Simulator> GymEnv<P, S> {
    /// Connects to the simulator and checks that it holds a single agent.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S) -> Result<Self> {
        let mut session = Session::connect(protocol, simulator)?;

        let startup = session
            .protocol_mut()
            .send_startup_msg(AutoResetType::Disabled);
        session.guard(startup)?;

        let definition = session.protocol_mut().get_definition();
        let definition = session.guard(definition)?;
        let checked = validate_definition(&definition).and_then(|_| {
            let id_manager = IdManager::new(definition.ids.clone());
            match id_manager.num_ids() {
                1 => Ok(id_manager),
                _ => Err(ScholaError::WrongArity(
                    "GymEnv is designed for single-agent non-vectorized environments only. \
                     Please use GymVectorEnv for multi-agent or vectorized environments."
                        .to_string(),
                )
                .into()),
            }
        });
        let id_manager = session.guard(checked)?;

        let (env_id, agent_id) = id_manager.to_nested(0)?;
        let spaces = (
            definition.observation_spaces.get(&env_id).and_then(|m| m.get(agent_id)),
            definition.action_spaces.get(&env_id).and_then(|m| m.get(agent_id)),
        );
        let (observation_space, action_space) = match spaces {
            (Some(obs), Some(act)) => (obs.clone(), act.clone()),
            _ => {
                let err = ScholaError::UnknownId {
                    env_id,
                    agent_id: agent_id.to_string(),
                };
                return session.guard(Err(err.into()));
            }
        };
        info!("GymEnv connected to agent {}", agent_id);

        Ok(Self {
            agent_id: agent_id.to_string(),
            agent_types: definition.agent_types,
            observation_space,
            action_space,
            session,
        })
    }

    /// Starts a new episode.
    pub fn reset(&mut self, seed: Option<u64>, options: Option<&Options>) -> Result<(Point, Info)> {
        let seeds = seed.map(|s| vec![s]);
        let options = options.map(|o| vec![o.clone()]);
        let mut response = self
            .session
            .protocol_mut()
            .send_reset_msg(seeds.as_deref(), options.as_deref())?;

        let obs = response
            .observations
            .get_mut(0)
            .and_then(|m| m.remove(&self.agent_id))
            .ok_or_else(|| self.missing("observation"))?;
        let info = response
            .infos
            .get_mut(0)
            .and_then(|m| m.remove(&self.agent_id))
            .unwrap_or_default();
        Ok((obs, info))
    }

    /// Applies `action` and returns the outcome.
    pub fn step(&mut self, action: Point) -> Result<GymStep> {
        let mut agents = BTreeMap::new();
        agents.insert(self.agent_id.clone(), action);
        let mut actions = Nested::new();
        actions.insert(0, agents);

        // Auto-reset is disabled, so no initial state comes back.
        let mut response = self
            .session
            .protocol_mut()
            .send_action_msg(&actions, ActionSpaces::Shared(&self.action_space))?;
        trace!("Step reward: {:?}", response.rewards.get(0));

        let agent_id = &self.agent_id;
        let obs = response
            .observations
            .get_mut(0)
            .and_then(|m| m.remove(agent_id))
            .ok_or_else(|| self.missing("observation"))?;
        let flag = |flags: &[BTreeMap<AgentId, bool>]| {
            flags
                .get(0)
                .and_then(|m| m.get(agent_id))
                .copied()
                .unwrap_or(false)
        };

        Ok(GymStep {
            obs,
            reward: response
                .rewards
                .get(0)
                .and_then(|m| m.get(agent_id))
                .copied()
                .unwrap_or(0.0),
            terminated: flag(&response.terminateds),
            truncated: flag(&response.truncateds),
            info: response
                .infos
                .get_mut(0)
                .and_then(|m| m.remove(agent_id))
                .unwrap_or_default(),
        })
    }

    /// Closes the protocol and stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Id of the agent.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Type labels reported by the simulator.
    pub fn agent_types(&self) -> &Nested<String> {
        &self.agent_types
    }

    /// Observation space.
    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// Action space.
    pub fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn missing(&self, what: &str) -> anyhow::Error {
        ScholaError::Environment(format!(
            "Env 0 reported no {} for agent {}",
            what, self.agent_id
        ))
        .into()
    }
}
