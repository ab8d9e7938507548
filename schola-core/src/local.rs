//! In-process transport.
//!
//! [`LocalProtocol`] runs a set of [`LocalEnv`]s inside the current process
//! and applies the auto-reset policy the same way a remote simulator does.
//! It backs tests and lets Rust environments be used through the framework
//! adapters without a simulator process.
mod imitation;
pub mod testing;
pub use imitation::{Expert, LocalImitationProtocol};

use crate::{
    error::ScholaError,
    protocol::{
        ActionSpaces, AutoResetType, Definition, EnvReset, EnvStep, Lifecycle, Properties,
        Protocol, ProtocolKind, ResetResponse, RlProtocol, StepResponse,
    },
    AgentId, Nested, Options, Point, Space,
};
use anyhow::Result;
use log::{debug, info, trace};
use std::collections::BTreeMap;

/// Definition of an agent in a [`LocalEnv`].
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    /// Agent id.
    pub id: AgentId,

    /// Type label.
    pub agent_type: String,

    /// Observation space.
    pub observation_space: Space,

    /// Action space.
    pub action_space: Space,
}

impl AgentDefinition {
    /// Agent with the default type label.
    pub fn new(id: impl Into<AgentId>, observation_space: Space, action_space: Space) -> Self {
        Self {
            id: id.into(),
            agent_type: "default".to_string(),
            observation_space,
            action_space,
        }
    }
}

/// An environment served by [`LocalProtocol`].
pub trait LocalEnv {
    /// Agents that may appear in the environment, in a fixed order.
    fn agents(&self) -> Vec<AgentDefinition>;

    /// Starts a new episode.
    fn reset(&mut self, seed: Option<u64>, options: &Options) -> Result<EnvReset>;

    /// Advances the episode. Agents without an entry in `actions` did not act.
    fn step(&mut self, actions: &BTreeMap<AgentId, Point>) -> Result<EnvStep>;
}

pub(crate) fn check_len<T>(items: Option<&[T]>, expected: usize) -> Result<()> {
    match items {
        Some(items) if items.len() != expected => Err(ScholaError::InvalidSeeds {
            expected,
            got: items.len(),
        }
        .into()),
        _ => Ok(()),
    }
}

pub(crate) fn definition<E: LocalEnv>(envs: &[E]) -> Definition {
    let mut definition = Definition::default();
    for (env_id, env) in envs.iter().enumerate() {
        let agents = env.agents();
        definition
            .ids
            .push(agents.iter().map(|a| a.id.clone()).collect());
        for agent in agents.into_iter() {
            definition
                .agent_types
                .entry(env_id)
                .or_default()
                .insert(agent.id.clone(), agent.agent_type);
            definition
                .observation_spaces
                .entry(env_id)
                .or_default()
                .insert(agent.id.clone(), agent.observation_space);
            definition
                .action_spaces
                .entry(env_id)
                .or_default()
                .insert(agent.id, agent.action_space);
        }
    }
    definition
}

/// Serves a set of [`LocalEnv`]s through [`RlProtocol`].
pub struct LocalProtocol<E: LocalEnv> {
    envs: Vec<E>,
    open: bool,
    auto_reset: Option<AutoResetType>,
    autoreset_envs: Vec<bool>,
}

impl<E: LocalEnv> LocalProtocol<E> {
    /// Serves `envs`, the index in the vector being the environment id.
    pub fn new(envs: Vec<E>) -> Self {
        let n = envs.len();
        Self {
            envs,
            open: false,
            auto_reset: None,
            autoreset_envs: vec![false; n],
        }
    }

    /// The served environments.
    pub fn envs(&self) -> &[E] {
        &self.envs
    }

    /// Auto-reset policy declared by the startup message.
    pub fn auto_reset(&self) -> Option<AutoResetType> {
        self.auto_reset
    }

    fn ensure_open(&self) -> Result<()> {
        match self.open {
            true => Ok(()),
            false => Err(ScholaError::ProtocolClosed.into()),
        }
    }

    fn validate_actions(
        env_id: usize,
        actions: &BTreeMap<AgentId, Point>,
        action_spaces: &ActionSpaces<'_>,
    ) -> Result<()> {
        for (agent_id, action) in actions.iter() {
            let reason = match action_spaces.get(agent_id) {
                None => "no action space".to_string(),
                Some(space) if !space.contains(action) => {
                    format!("{} value is not in {}", action.kind(), space)
                }
                Some(_) => continue,
            };
            return Err(ScholaError::InvalidAction {
                env_id,
                agent_id: agent_id.clone(),
                reason,
            }
            .into());
        }
        Ok(())
    }
}

impl<E: LocalEnv> Lifecycle for LocalProtocol<E> {
    fn start(&mut self) -> Result<()> {
        if !self.open {
            info!("Starting local protocol with {} environments", self.envs.len());
            self.open = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            info!("Closing local protocol");
            self.open = false;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl<E: LocalEnv> Properties for LocalProtocol<E> {
    fn properties(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl<E: LocalEnv> Protocol for LocalProtocol<E> {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::InProcess
    }
}

impl<E: LocalEnv> RlProtocol for LocalProtocol<E> {
    fn send_startup_msg(&mut self, auto_reset: AutoResetType) -> Result<()> {
        self.ensure_open()?;
        debug!("Auto-reset policy: {}", auto_reset);
        self.auto_reset = Some(auto_reset);
        self.autoreset_envs = vec![false; self.envs.len()];
        Ok(())
    }

    fn get_definition(&mut self) -> Result<Definition> {
        self.ensure_open()?;
        Ok(definition(&self.envs))
    }

    fn send_reset_msg(
        &mut self,
        seeds: Option<&[u64]>,
        options: Option<&[Options]>,
    ) -> Result<ResetResponse> {
        self.ensure_open()?;
        self.auto_reset.ok_or(ScholaError::StartupNotSent)?;
        check_len(seeds, self.envs.len())?;
        check_len(options, self.envs.len())?;

        let empty = Options::new();
        let mut response = ResetResponse::default();
        for (env_id, env) in self.envs.iter_mut().enumerate() {
            let seed = seeds.map(|s| s[env_id]);
            let options = options.map_or(&empty, |o| &o[env_id]);
            trace!("Reset env {} with seed {:?}", env_id, seed);
            response.push(env.reset(seed, options)?);
            self.autoreset_envs[env_id] = false;
        }
        Ok(response)
    }

    fn send_action_msg(
        &mut self,
        actions: &Nested<Point>,
        action_spaces: ActionSpaces<'_>,
    ) -> Result<StepResponse> {
        self.ensure_open()?;
        let auto_reset = self.auto_reset.ok_or(ScholaError::StartupNotSent)?;

        let no_actions = BTreeMap::new();

        // Every environment is checked before any of them advances.
        for env_id in 0..self.envs.len() {
            let env_actions = actions.get(&env_id).unwrap_or(&no_actions);
            Self::validate_actions(env_id, env_actions, &action_spaces)?;
            if self.autoreset_envs[env_id] && auto_reset != AutoResetType::NextStep {
                return Err(ScholaError::StepAfterEpisodeEnd(env_id).into());
            }
        }

        let empty = Options::new();
        let mut response = StepResponse::default();
        for (env_id, env) in self.envs.iter_mut().enumerate() {
            if self.autoreset_envs[env_id] {
                trace!("Env {} reset on the step after its episode ended", env_id);
                response.push(EnvStep::from_reset(env.reset(None, &empty)?));
                self.autoreset_envs[env_id] = false;
                continue;
            }

            let env_actions = actions.get(&env_id).unwrap_or(&no_actions);
            let step = env.step(env_actions)?;
            let done = step.is_done();
            response.push(step);
            if done && auto_reset == AutoResetType::SameStep {
                trace!("Env {} reset within the step", env_id);
                response.push_initial(env_id, env.reset(None, &empty)?);
            } else {
                self.autoreset_envs[env_id] = done;
            }
        }
        Ok(response)
    }
}
