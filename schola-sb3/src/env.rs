//! Synchronous vectorized environment with one slot per agent.
use crate::{merge_spaces, split_value, Sb3Info};
use anyhow::Result;
use log::{debug, info, trace};
use schola_core::{
    nested_get,
    space::{concatenate, unbatch},
    uniform_spaces, validate_definition, ActionSpaces, AgentId, AutoResetType, IdManager, Info,
    Nested, Options, Point, RlProtocol, ScholaError, Session, Simulator, Space,
};
use std::collections::BTreeMap;

/// Result of [`VecEnv::step_wait`], one entry per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Sb3Step {
    /// Stacked observations. A slot whose episode ended holds the first
    /// observation of the next one.
    pub obs: Point,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// `true` if the episode of the slot ended, whether terminated or truncated.
    pub dones: Vec<bool>,

    /// Infos.
    pub infos: Vec<Sb3Info>,
}

/// Every `(env_id, agent_id)` pair of the simulator exposed as one slot of a
/// Stable-Baselines3-style vectorized environment.
///
/// The simulator runs under [`AutoResetType::SameStep`]. Seeds and options
/// set with [`VecEnv::seed`] and [`VecEnv::set_options`] apply to the next
/// [`VecEnv::reset`] only.
pub struct VecEnv<P: RlProtocol, S: Simulator> {
    session: Session<P, S>,
    id_manager: IdManager,
    agent_types: Nested<String>,
    observation_space: Space,
    action_space: Space,
    flat_action_space: Option<Space>,
    seeds: Option<Vec<u64>>,
    options: Option<Vec<Options>>,
    reset_infos: Vec<Info>,
    pending_actions: Option<Nested<Point>>,
}

impl<P: RlProtocol, S: Simulator> VecEnv<P, S> {
    /// Connects to the simulator and checks that every agent shares one
    /// observation space and one action space.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S) -> Result<Self> {
        let mut session = Session::connect(protocol, simulator)?;

        let startup = session
            .protocol_mut()
            .send_startup_msg(AutoResetType::SameStep);
        session.guard(startup)?;

        let definition = session.protocol_mut().get_definition();
        let definition = session.guard(definition)?;
        let id_manager = IdManager::new(definition.ids.clone());
        let spaces = validate_definition(&definition)
            .and_then(|_| uniform_spaces(&id_manager, &definition));
        let (observation_space, action_space) = session.guard(spaces)?;
        info!(
            "VecEnv with {} slots over {} environments",
            id_manager.num_ids(),
            id_manager.num_envs()
        );

        Ok(Self {
            session,
            reset_infos: vec![Info::new(); id_manager.num_ids()],
            agent_types: definition.agent_types,
            observation_space,
            action_space,
            flat_action_space: None,
            seeds: None,
            options: None,
            pending_actions: None,
            id_manager,
        })
    }

    /// Exposes a dict action space as the flat space built by
    /// [`merge_spaces`]. Actions passed to [`VecEnv::step_async`] are then
    /// flat and split back into dicts before they are sent.
    ///
    /// Fails if the action space is not a dict or its parts can not be merged.
    pub fn merge_dict_actions(mut self) -> Result<Self> {
        let merged = match &self.action_space {
            Space::Dict(parts) => merge_spaces(parts)?,
            space => {
                return Err(ScholaError::Environment(format!(
                    "Only dict action spaces can be merged, got {}",
                    space
                ))
                .into())
            }
        };
        info!("Dict actions merged into {}", merged);
        self.flat_action_space = Some(merged);
        Ok(self)
    }

    /// Sets the seeds of the next reset to `seed + uid` for every slot and
    /// returns them. Without a seed a random one is drawn.
    pub fn seed(&mut self, seed: Option<u64>) -> Vec<u64> {
        let seed = seed.unwrap_or_else(|| fastrand::u32(..) as u64);
        let seeds = (0..self.num_envs())
            .map(|uid| seed.wrapping_add(uid as u64))
            .collect::<Vec<_>>();
        self.seeds = Some(seeds.clone());
        seeds
    }

    /// Sets the options of the next reset for every slot.
    pub fn set_options(&mut self, options: Option<&Options>) {
        self.options = options.map(|o| vec![o.clone(); self.num_envs()]);
    }

    /// Resets every environment and returns the stacked observations.
    ///
    /// An environment receives the seed and options of its first slot. The
    /// pending seeds and options are cleared.
    pub fn reset(&mut self) -> Result<Point> {
        let seeds = match self.seeds.take() {
            Some(seeds) => Some(self.id_manager.first_of_each_env(&seeds)?),
            None => None,
        };
        let options = match self.options.take() {
            Some(options) => Some(self.id_manager.first_of_each_env(&options)?),
            None => None,
        };
        debug!("Reset with seeds {:?}", seeds);

        let response = self
            .session
            .protocol_mut()
            .send_reset_msg(seeds.as_deref(), options.as_deref())?;
        self.reset_infos = self
            .id_manager
            .flatten_list_of_dicts(&response.infos, Info::new())?;
        self.stack_observations(&response.observations)
    }

    /// Infos returned by the simulator for the first observation of the
    /// current episode of each slot.
    pub fn reset_infos(&self) -> &[Info] {
        &self.reset_infos
    }

    /// Stores a batch of actions, one per slot, for [`VecEnv::step_wait`].
    pub fn step_async(&mut self, actions: &Point) -> Result<()> {
        let flat = unbatch(self.action_space(), actions)?;
        if flat.len() != self.num_envs() {
            return Err(ScholaError::Batch(format!(
                "expected {} actions, got {}",
                self.num_envs(),
                flat.len()
            ))
            .into());
        }
        let flat = match (&self.flat_action_space, &self.action_space) {
            (Some(_), Space::Dict(parts)) => flat
                .iter()
                .map(|action| split_value(action, parts))
                .collect::<Result<Vec<_>>>()?,
            _ => flat,
        };
        self.pending_actions = Some(self.id_manager.nest_list_to_dict_of_dicts(
            &flat,
            // Every slot has an action, so the default is never used.
            Point::Discrete(0),
        )?);
        Ok(())
    }

    /// Sends the actions stored by [`VecEnv::step_async`] and returns the
    /// outcome.
    ///
    /// Fails with [`ScholaError::Environment`] if the agents of an
    /// environment did not all finish on the same step.
    pub fn step_wait(&mut self) -> Result<Sb3Step> {
        let actions = self.pending_actions.take().ok_or_else(|| {
            ScholaError::Environment("step_wait called without pending actions".to_string())
        })?;
        let mut response = self
            .session
            .protocol_mut()
            .send_action_msg(&actions, ActionSpaces::Shared(&self.action_space))?;

        let rewards = self.id_manager.flatten_list_of_dicts(&response.rewards, 0.0)?;
        let terminateds = self
            .id_manager
            .flatten_list_of_dicts(&response.terminateds, false)?;
        let truncateds = self
            .id_manager
            .flatten_list_of_dicts(&response.truncateds, false)?;
        let dones = terminateds
            .iter()
            .zip(truncateds.iter())
            .map(|(term, trunc)| *term || *trunc)
            .collect::<Vec<_>>();
        self.check_completion(&dones)?;

        let mut infos = self
            .id_manager
            .flatten_list_of_dicts(&response.infos, Info::new())?
            .into_iter()
            .map(Sb3Info::new)
            .collect::<Vec<_>>();

        let no_info = Info::new();
        for (uid, (env_id, agent_id)) in self.id_manager.id_list().iter().enumerate() {
            let initial_obs = response
                .initial_observations
                .get_mut(env_id)
                .and_then(|m| m.remove(agent_id));
            let (initial_obs, observations) =
                match (initial_obs, response.observations.get_mut(*env_id)) {
                    (Some(initial_obs), Some(observations)) => (initial_obs, observations),
                    _ => continue,
                };

            trace!("Slot {} was reset within the step", uid);
            self.reset_infos[uid] =
                nested_get(&response.initial_infos, *env_id, agent_id, &no_info).clone();
            infos[uid].terminal_observation = observations.insert(agent_id.clone(), initial_obs);
            infos[uid].time_limit_truncated = Some(truncateds[uid] && !terminateds[uid]);
        }

        Ok(Sb3Step {
            obs: self.stack_observations(&response.observations)?,
            rewards,
            dones,
            infos,
        })
    }

    /// [`VecEnv::step_async`] followed by [`VecEnv::step_wait`].
    pub fn step(&mut self, actions: &Point) -> Result<Sb3Step> {
        self.step_async(actions)?;
        self.step_wait()
    }

    /// Closes the protocol and stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Attributes of the sub-environments, always `None` since they are not
    /// individually accessible.
    pub fn get_attr(&self, _name: &str) -> Vec<Option<String>> {
        vec![None; self.num_envs()]
    }

    /// Not supported.
    pub fn set_attr(&mut self, _name: &str, _value: &str) -> Result<()> {
        Err(ScholaError::NotImplemented(
            "set_attr is not implemented for Schola environments, as sub-environments are not individually accessible."
                .to_string(),
        )
        .into())
    }

    /// Not supported.
    pub fn env_method(&mut self, _name: &str) -> Result<Vec<String>> {
        Err(ScholaError::NotImplemented(
            "env_method is not implemented for Schola environments, as sub-environments are not individually accessible."
                .to_string(),
        )
        .into())
    }

    /// Always `false` for every slot.
    pub fn env_is_wrapped(&self, _wrapper: &str) -> Vec<bool> {
        vec![false; self.num_envs()]
    }

    /// Number of slots, i.e. the total number of agents.
    pub fn num_envs(&self) -> usize {
        self.id_manager.num_ids()
    }

    /// Mapping between slots and `(env_id, agent_id)` pairs.
    pub fn id_manager(&self) -> &IdManager {
        &self.id_manager
    }

    /// Type labels reported by the simulator.
    pub fn agent_types(&self) -> &Nested<String> {
        &self.agent_types
    }

    /// Observation space of one slot.
    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// Action space of one slot, flat after [`VecEnv::merge_dict_actions`].
    pub fn action_space(&self) -> &Space {
        self.flat_action_space.as_ref().unwrap_or(&self.action_space)
    }

    fn check_completion(&self, dones: &[bool]) -> Result<()> {
        for env_id in 0..self.id_manager.num_envs() {
            let agents = self.id_manager.partial_get(env_id);
            let done = agents
                .iter()
                .map(|agent_id| self.id_manager.to_flat(env_id, agent_id).map(|uid| dones[uid]))
                .collect::<Result<Vec<_>>>()?;
            if done.iter().any(|d| *d) && !done.iter().all(|d| *d) {
                return Err(ScholaError::Environment(format!(
                    "SB3 with multi-agent environments does not support agents completing at different steps. Env {} had agents in different completion states.",
                    env_id
                ))
                .into());
            }
        }
        Ok(())
    }

    fn stack_observations(&self, observations: &[BTreeMap<AgentId, Point>]) -> Result<Point> {
        let points = self
            .id_manager
            .partial_flatten_list_of_dicts(observations)?
            .into_iter()
            .enumerate()
            .map(|(uid, obs)| {
                obs.ok_or_else(|| {
                    ScholaError::Environment(format!("No observation for slot {}", uid)).into()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        concatenate(&self.observation_space, &points)
    }
}
