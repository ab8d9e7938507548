//! Vectorized environment with one slot per agent.
use crate::GymVectorEnvConfig;
use anyhow::Result;
use log::{debug, info, trace};
use schola_core::{
    space::{batch_space, concatenate, unbatch},
    uniform_spaces, validate_definition, ActionSpaces, AgentId, AutoResetType, IdManager, Info,
    Nested, Options, Point, RlProtocol, ScholaError, Seeds, Session, Simulator, Space, VecInfo,
};
use std::collections::BTreeMap;

/// Result of [`GymVectorEnv::step`], one entry per slot.
#[derive(Debug, Clone, PartialEq)]
pub struct GymVectorStep {
    /// Batched observations.
    pub obs: Point,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Terminal flags.
    pub terminateds: Vec<bool>,

    /// Truncation flags.
    pub truncateds: Vec<bool>,

    /// Infos, including `final_obs` and `final_info` for slots reset within the step.
    pub infos: VecInfo,
}

/// Every `(env_id, agent_id)` pair of the simulator exposed as one slot of a
/// vectorized environment.
///
/// Slots are ordered by flat index, so `num_envs` is the total number of
/// agents. All agents must share one observation space and one action space.
///
/// Under [`AutoResetType::SameStep`], a slot whose environment was reset within
/// a step reports the first observation of the new episode; the last
/// observation and info of the finished episode go to `final_obs` and
/// `final_info` in the infos. Under [`AutoResetType::NextStep`] the
/// observations are returned as received.
pub struct GymVectorEnv<P: RlProtocol, S: Simulator> {
    session: Session<P, S>,
    autoreset_mode: AutoResetType,
    id_manager: IdManager,
    agent_types: Nested<String>,
    single_observation_space: Space,
    single_action_space: Space,
    observation_space: Space,
    action_space: Space,
}

impl<P: RlProtocol, S: Simulator> GymVectorEnv<P, S> {
    /// Connects to the simulator and checks the definition.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S, config: &GymVectorEnvConfig) -> Result<Self> {
        let mut session = Session::connect(protocol, simulator)?;

        info!("Auto-reset mode: {}", config.autoreset_mode);
        let startup = session
            .protocol_mut()
            .send_startup_msg(config.autoreset_mode);
        session.guard(startup)?;

        let definition = session.protocol_mut().get_definition();
        let definition = session.guard(definition)?;
        let id_manager = IdManager::new(definition.ids.clone());
        let spaces = validate_definition(&definition)
            .and_then(|_| uniform_spaces(&id_manager, &definition));
        let (single_observation_space, single_action_space) = session.guard(spaces)?;

        let num_envs = id_manager.num_ids();
        debug!("{} slots over {} environments", num_envs, id_manager.num_envs());
        Ok(Self {
            session,
            autoreset_mode: config.autoreset_mode,
            observation_space: batch_space(&single_observation_space, num_envs),
            action_space: batch_space(&single_action_space, num_envs),
            single_observation_space,
            single_action_space,
            agent_types: definition.agent_types,
            id_manager,
        })
    }

    /// Resets every environment.
    ///
    /// A single seed is expanded into one seed per slot. The environments
    /// receive the seed of their first slot. Each option `key` is forwarded
    /// to every agent as `{agent_id}_{key}`.
    pub fn reset(
        &mut self,
        seed: Option<Seeds>,
        options: Option<&Options>,
    ) -> Result<(Point, VecInfo)> {
        let seeds = match seed {
            Some(seed) => {
                let slot_seeds = seed.resolve(self.num_envs())?;
                Some(self.id_manager.first_of_each_env(&slot_seeds)?)
            }
            None => None,
        };

        let options = match options {
            Some(options) if options.contains_key("reset_mask") => {
                return Err(ScholaError::NotImplemented(
                    "reset_mask option is not currently supported in Schola Vector Environments."
                        .to_string(),
                )
                .into())
            }
            Some(options) => Some(self.options_per_env(options)),
            None => None,
        };

        let response = self
            .session
            .protocol_mut()
            .send_reset_msg(seeds.as_deref(), options.as_deref())?;

        let mut infos = VecInfo::new(self.num_envs());
        for (env_id, agent_infos) in response.infos.iter().enumerate() {
            for (agent_id, info) in agent_infos.iter() {
                infos.add(self.id_manager.to_flat(env_id, agent_id)?, info);
            }
        }
        let obs = self.stack_observations(&response.observations)?;
        Ok((obs, infos))
    }

    /// Applies a batch of actions, one per slot.
    pub fn step(&mut self, actions: &Point) -> Result<GymVectorStep> {
        let actions = self.unbatch_actions(actions)?;
        let mut response = self.session.protocol_mut().send_action_msg(
            &actions,
            ActionSpaces::Shared(&self.single_action_space),
        )?;

        let rewards = self.id_manager.flatten_list_of_dicts(&response.rewards, 0.0)?;
        let terminateds = self
            .id_manager
            .flatten_list_of_dicts(&response.terminateds, false)?;
        let truncateds = self
            .id_manager
            .flatten_list_of_dicts(&response.truncateds, false)?;
        self.check_completion(&terminateds, &truncateds)?;

        let no_info = Info::new();
        let mut infos = VecInfo::new(self.num_envs());
        for (uid, (env_id, agent_id)) in self.id_manager.id_list().iter().enumerate() {
            let info = response
                .infos
                .get(*env_id)
                .and_then(|m| m.get(agent_id))
                .unwrap_or(&no_info);
            let initial_obs = response
                .initial_observations
                .get_mut(env_id)
                .and_then(|m| m.remove(agent_id));

            match (initial_obs, response.observations.get_mut(*env_id)) {
                (Some(initial_obs), Some(observations)) => {
                    trace!("Slot {} was reset within the step", uid);
                    if let Some(final_obs) = observations.insert(agent_id.clone(), initial_obs) {
                        infos.add_final(uid, final_obs, info);
                    }
                    let initial_info = schola_core::nested_get(
                        &response.initial_infos,
                        *env_id,
                        agent_id,
                        &no_info,
                    );
                    infos.add(uid, initial_info);
                }
                _ => infos.add(uid, info),
            }
        }

        Ok(GymVectorStep {
            obs: self.stack_observations(&response.observations)?,
            rewards,
            terminateds,
            truncateds,
            infos,
        })
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

    /// Number of slots, i.e. the total number of agents.
    pub fn num_envs(&self) -> usize {
        self.id_manager.num_ids()
    }

    /// Auto-reset policy declared to the simulator.
    pub fn autoreset_mode(&self) -> AutoResetType {
        self.autoreset_mode
    }

    /// Mapping between slots and `(env_id, agent_id)` pairs.
    pub fn id_manager(&self) -> &IdManager {
        &self.id_manager
    }

    /// Type labels reported by the simulator.
    pub fn agent_types(&self) -> &Nested<String> {
        &self.agent_types
    }

    /// Batched observation space.
    pub fn observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// Batched action space.
    pub fn action_space(&self) -> &Space {
        &self.action_space
    }

    /// Observation space of one slot.
    pub fn single_observation_space(&self) -> &Space {
        &self.single_observation_space
    }

    /// Action space of one slot.
    pub fn single_action_space(&self) -> &Space {
        &self.single_action_space
    }

    fn options_per_env(&self, options: &Options) -> Vec<Options> {
        (0..self.id_manager.num_envs())
            .map(|env_id| {
                let mut env_options = Options::new();
                for agent_id in self.id_manager.partial_get(env_id).iter() {
                    for (key, value) in options.iter() {
                        env_options.insert(format!("{}_{}", agent_id, key), value.clone());
                    }
                }
                env_options
            })
            .collect()
    }

    fn unbatch_actions(&self, actions: &Point) -> Result<Nested<Point>> {
        let flat = unbatch(&self.single_action_space, actions)?;
        if flat.len() != self.num_envs() {
            return Err(ScholaError::Batch(format!(
                "expected {} actions, got {}",
                self.num_envs(),
                flat.len()
            ))
            .into());
        }
        let flat = flat.into_iter().map(Some).collect::<Vec<_>>();
        Ok(self
            .id_manager
            .nest_list_to_dict_of_dicts(&flat, None)?
            .into_iter()
            .map(|(env_id, agents)| {
                let agents = agents
                    .into_iter()
                    .filter_map(|(agent_id, action)| action.map(|a| (agent_id, a)))
                    .collect::<BTreeMap<_, _>>();
                (env_id, agents)
            })
            .collect())
    }

    fn check_completion(&self, terminateds: &[bool], truncateds: &[bool]) -> Result<()> {
        for env_id in 0..self.id_manager.num_envs() {
            let mut any_done = false;
            let mut all_done = true;
            for agent_id in self.id_manager.partial_get(env_id).iter() {
                let uid = self.id_manager.to_flat(env_id, agent_id)?;
                let done = terminateds[uid] || truncateds[uid];
                any_done |= done;
                all_done &= done;
            }
            if any_done && !all_done {
                return Err(ScholaError::Environment(format!(
                    "GymVectorEnv with multi-agent environments does not support agents completing at different steps. Env {} had agents in different completion states.",
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
        concatenate(&self.single_observation_space, &points)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use schola_core::{
        error::SpaceKind,
        local::{
            testing::{CountEnv, DynamicEnv},
            LocalProtocol,
        },
        InProcessSimulator, Lifecycle,
    };
    use test_log::test;

    type Env<'a> = GymVectorEnv<&'a mut LocalProtocol<CountEnv>, &'a mut InProcessSimulator>;

    fn build<'a>(
        protocol: &'a mut LocalProtocol<CountEnv>,
        simulator: &'a mut InProcessSimulator,
        mode: AutoResetType,
    ) -> Result<Env<'a>> {
        let config = GymVectorEnvConfig::default().autoreset_mode(mode);
        GymVectorEnv::build(protocol, simulator, &config)
    }

    fn count_envs(thresholds: &[i64]) -> LocalProtocol<CountEnv> {
        LocalProtocol::new(thresholds.iter().map(|t| CountEnv::single(*t)).collect())
    }

    #[test]
    fn test_spaces() -> Result<()> {
        let mut protocol = count_envs(&[2, 3]);
        let mut simulator = InProcessSimulator::default();
        let env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;
        assert_eq!(env.num_envs(), 2);
        assert_eq!(env.single_action_space(), &CountEnv::action_space());
        assert_eq!(env.action_space(), &Space::multi_discrete(vec![5, 5]));
        assert_eq!(env.observation_space(), &Space::multi_discrete(vec![16, 16]));
        assert_eq!(env.get_attr("render_mode"), vec![None, None]);
        assert_eq!(env.autoreset_mode(), AutoResetType::SameStep);
        Ok(())
    }

    #[test]
    fn test_reset_seeds() -> Result<()> {
        let mut protocol = count_envs(&[2, 3, 3]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;

        let (obs, infos) = env.reset(Some(vec![1u64, 2, 3].into()), None)?;
        assert_eq!(obs, Point::multi_discrete(vec![1, 2, 3]));
        assert!(infos.is_empty());

        let (obs1, _) = env.reset(Some(7u64.into()), None)?;
        let (obs2, _) = env.reset(Some(7u64.into()), None)?;
        assert_eq!(obs1, obs2);

        let err = env.reset(Some(vec![1u64].into()), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::InvalidSeeds { expected: 3, got: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_reset_mask_is_not_supported() -> Result<()> {
        let mut protocol = count_envs(&[2]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;
        let mut options = Options::new();
        options.insert("reset_mask".to_string(), "1".to_string());
        let err = env.reset(None, Some(&options)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::NotImplemented(_))
        ));
        Ok(())
    }

    #[test]
    fn test_options_are_prefixed_with_agent_id() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::new(vec![("a", 2), ("b", 2)])]);
        let mut simulator = InProcessSimulator::default();
        let env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;
        let mut options = Options::new();
        options.insert("speed".to_string(), "2".to_string());
        let per_env = env.options_per_env(&options);
        assert_eq!(per_env.len(), 1);
        assert_eq!(
            per_env[0].keys().collect::<Vec<_>>(),
            vec!["a_speed", "b_speed"]
        );
        Ok(())
    }

    #[test]
    fn test_same_step_final_obs() -> Result<()> {
        let mut protocol = count_envs(&[2, 3]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;
        let actions = Point::multi_discrete(vec![1, 2]);
        env.reset(None, None)?;

        let step = env.step(&actions)?;
        assert_eq!(step.rewards, vec![1.0, 2.0]);
        assert!(step.infos.final_obs().is_none());

        let step = env.step(&actions)?;
        assert_eq!(step.obs, Point::multi_discrete(vec![0, 2]));
        assert_eq!(step.terminateds, vec![true, false]);
        let final_obs = step.infos.final_obs().map(|c| c.values().to_vec());
        assert_eq!(final_obs, Some(vec![Some(Point::Discrete(2)), None]));
        let final_info = step.infos.final_info().map(|f| f.mask().to_vec());
        assert_eq!(final_info, Some(vec![true, false]));
        Ok(())
    }

    #[test]
    fn test_step_rejects_wrong_batch_size() -> Result<()> {
        let mut protocol = count_envs(&[2, 3]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator, AutoResetType::SameStep)?;
        env.reset(None, None)?;
        assert!(env.step(&Point::multi_discrete(vec![1, 1, 1])).is_err());
        assert!(env.step(&Point::Discrete(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_rejects_space_mismatch() {
        let mut protocol = LocalProtocol::new(vec![DynamicEnv::new(1, 3, 5)]);
        let mut simulator = InProcessSimulator::default();
        let config = GymVectorEnvConfig::default();
        let err = GymVectorEnv::build(&mut protocol, &mut simulator, &config)
            .err()
            .and_then(|e| e.downcast::<ScholaError>().ok());
        match err {
            Some(ScholaError::SpaceMismatch { kind, agent_id, .. }) => {
                assert_eq!(kind, SpaceKind::Action);
                assert_eq!(agent_id, DynamicEnv::SPAWNED);
            }
            _ => panic!("expected a space mismatch"),
        }
        assert!(!protocol.is_open());
    }
}
