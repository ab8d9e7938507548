//! Replays a rollout of the simulator into an [`OfflineCollector`].
use crate::{DataCollectorConfig, OfflineCollector, Transition};
use anyhow::Result;
use log::{info, trace};
use schola_core::{
    nested_get, validate_definition, AgentId, EnvId, IdManager, ImitationProtocol, Info,
    ScholaError, Session, Simulator, Space,
};
use std::collections::BTreeMap;

/// Pulls timesteps of a policy running in the simulator and pushes them to a
/// collector.
///
/// The simulator must hold a single environment with a single agent. It
/// resets on its own: the first observation of an episode arrives with the
/// first timestep of that episode and is pushed as a
/// [`OfflineCollector::reset`] right before it.
pub struct DataCollector<P: ImitationProtocol, S: Simulator, C: OfflineCollector> {
    session: Session<P, S>,
    collector: C,
    env_id: EnvId,
    agent_id: AgentId,
    observation_space: Space,
    action_space: Space,
    needs_reset: bool,
}

impl<P, S, C> DataCollector<P, S, C>
where
    P: ImitationProtocol,
    S: Simulator,
    C: OfflineCollector,
{
    /// Connects to the simulator and starts the rollout.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S, collector: C, config: &DataCollectorConfig) -> Result<Self> {
        let mut session = Session::connect(protocol, simulator)?;

        let definition = session.protocol_mut().get_definition();
        let definition = session.guard(definition)?;
        let checked = validate_definition(&definition).and_then(|_| {
            let id_manager = IdManager::new(definition.ids.clone());
            match id_manager.num_ids() {
                1 => Ok(id_manager),
                _ => Err(ScholaError::WrongArity(
                    "Minari Integration only supports one environment and one agent".to_string(),
                )
                .into()),
            }
        });
        let id_manager = session.guard(checked)?;
        let (env_id, agent_id) = id_manager.to_nested(0)?;
        let agent_id = agent_id.to_string();

        let spaces = match (
            definition.observation_spaces.get(&env_id).and_then(|m| m.get(&agent_id)),
            definition.action_spaces.get(&env_id).and_then(|m| m.get(&agent_id)),
        ) {
            (Some(obs), Some(act)) => Ok((obs.clone(), act.clone())),
            _ => Err(ScholaError::UnknownId {
                env_id,
                agent_id: agent_id.clone(),
            }
            .into()),
        };
        let (observation_space, action_space) = session.guard(spaces)?;

        let seeds = config.seed.map(|s| vec![s]);
        let options = config.options.clone().map(|o| vec![o]);
        let startup = session
            .protocol_mut()
            .send_startup_msg(seeds.as_deref(), options.as_deref());
        session.guard(startup)?;
        info!("Collecting demonstrations of agent {} in env {}", agent_id, env_id);

        Ok(Self {
            session,
            collector,
            env_id,
            agent_id,
            observation_space,
            action_space,
            needs_reset: true,
        })
    }

    /// Not supported, the simulator resets on its own.
    pub fn reset(&mut self) -> Result<()> {
        Err(ScholaError::NotImplemented(
            "Reset is not implemented for Minari DataCollection with Schola. \
             The Environment will reset itself."
                .to_string(),
        )
        .into())
    }

    /// Pulls one timestep and pushes it to the collector.
    ///
    /// Returns the pushed transition.
    pub fn step(&mut self) -> Result<Transition> {
        let mut data = self.session.protocol_mut().get_data()?;
        let (env_id, agent_id) = (self.env_id, self.agent_id.as_str());

        let initial_obs = data
            .step
            .initial_observations
            .get_mut(&env_id)
            .and_then(|m| m.remove(agent_id));
        match initial_obs {
            Some(obs) => {
                trace!("New episode");
                let no_info = Info::new();
                let info = nested_get(&data.step.initial_infos, env_id, agent_id, &no_info);
                self.collector.reset(obs, info.clone())?;
                self.needs_reset = false;
            }
            None if self.needs_reset => {
                return Err(ScholaError::Environment(
                    "Received a timestep without the first observation of its episode".to_string(),
                )
                .into())
            }
            None => {}
        }

        let transition = Transition {
            action: take(&mut data.actions, env_id, agent_id)
                .ok_or_else(|| self.missing("action"))?,
            observation: take(&mut data.step.observations, env_id, agent_id)
                .ok_or_else(|| self.missing("observation"))?,
            reward: take(&mut data.step.rewards, env_id, agent_id).unwrap_or(0.0),
            terminated: take(&mut data.step.terminateds, env_id, agent_id).unwrap_or(false),
            truncated: take(&mut data.step.truncateds, env_id, agent_id).unwrap_or(false),
            info: take(&mut data.step.infos, env_id, agent_id).unwrap_or_default(),
        };
        self.collector.step(transition.clone())?;
        self.needs_reset = transition.terminated || transition.truncated;
        Ok(transition)
    }

    /// Closes the protocol and stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// The collector.
    pub fn collector(&self) -> &C {
        &self.collector
    }

    /// Observation space of the agent.
    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// Action space of the agent.
    pub fn action_space(&self) -> &Space {
        &self.action_space
    }

    fn missing(&self, what: &str) -> anyhow::Error {
        ScholaError::Environment(format!(
            "Env {} reported no {} for agent {}",
            self.env_id, what, self.agent_id
        ))
        .into()
    }
}

fn take<T>(items: &mut [BTreeMap<AgentId, T>], env_id: EnvId, agent_id: &str) -> Option<T> {
    items.get_mut(env_id).and_then(|m| m.remove(agent_id))
}
