//! Multi-agent environment over several simulated environments.
use crate::{
    base::{check_envs, env_step, RayDefinition},
    AgentTracker, MultiAgentStep,
};
use anyhow::Result;
use log::debug;
use schola_core::{
    spawn_seeds, ActionSpaces, AgentId, AutoResetType, Info, Nested, Options, Point, RlProtocol,
    ScholaError, Seeds, Session, Simulator, Space,
};
use std::collections::{BTreeMap, BTreeSet};

/// Seeds spawned from a single seed are kept in the non-negative range of `i32`.
const SEED_MASK: u64 = 0x7FFF_FFFF;

/// Observations and infos of a reset, indexed by environment.
pub type VecReset = (Vec<BTreeMap<AgentId, Point>>, Vec<BTreeMap<AgentId, Info>>);

/// Every environment of a simulator, exposed as a vector of multi-agent
/// environments.
///
/// Calls take and return one map per environment, indexed by environment id.
/// Each environment keeps its own [`AgentTracker`] and restarts on the step
/// after it finishes.
pub struct RayVecEnv<P: RlProtocol, S: Simulator> {
    session: Session<P, S>,
    definition: RayDefinition,
    trackers: Vec<AgentTracker>,
}

impl<P: RlProtocol, S: Simulator> RayVecEnv<P, S> {
    /// Connects to the simulator.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S) -> Result<Self> {
        let (session, definition) = RayDefinition::connect(protocol, simulator)?;
        let trackers = (0..definition.id_manager.num_envs())
            .map(AgentTracker::new)
            .collect();
        Ok(Self {
            session,
            definition,
            trackers,
        })
    }

    /// Resets every environment.
    ///
    /// A single seed is expanded into one seed per environment; a list must
    /// hold exactly one seed per environment. `options` are sent to every
    /// environment.
    pub fn reset(&mut self, seed: Option<Seeds>, options: Option<&Options>) -> Result<VecReset> {
        let num_envs = self.num_envs();
        let seeds = match seed {
            Some(Seeds::Single(seed)) => Some(
                spawn_seeds(seed, num_envs)
                    .into_iter()
                    .map(|s| s & SEED_MASK)
                    .collect::<Vec<_>>(),
            ),
            Some(seeds) => Some(seeds.resolve(num_envs)?),
            None => None,
        };
        debug!("Reset {} environments with seeds {:?}", num_envs, seeds);
        let options = options.map(|o| vec![o.clone(); num_envs]);

        let response = self
            .session
            .protocol_mut()
            .send_reset_msg(seeds.as_deref(), options.as_deref())?;
        check_envs(&response.observations, num_envs)?;
        for (tracker, observations) in self.trackers.iter_mut().zip(response.observations.iter()) {
            tracker.reset(observations);
        }
        Ok((response.observations, response.infos))
    }

    /// Applies `actions`, indexed by environment, and returns one result per
    /// environment. Environments without an entry receive no action.
    pub fn step(&mut self, actions: &[BTreeMap<AgentId, Point>]) -> Result<Vec<MultiAgentStep>> {
        let num_envs = self.num_envs();
        if actions.len() > num_envs {
            return Err(ScholaError::Batch(format!(
                "Got actions for {} environments, expected at most {}",
                actions.len(),
                num_envs
            ))
            .into());
        }
        let nested = actions
            .iter()
            .cloned()
            .enumerate()
            .collect::<Nested<Point>>();

        let mut response = self.session.protocol_mut().send_action_msg(
            &nested,
            ActionSpaces::PerAgent(&self.definition.action_spaces),
        )?;
        check_envs(&response.observations, num_envs)?;
        Ok(self
            .trackers
            .iter_mut()
            .map(|tracker| {
                let env_id = tracker.env_id();
                env_step(&mut response, env_id, tracker)
            })
            .collect())
    }

    /// Closes the protocol and stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Auto-reset policy, always [`AutoResetType::NextStep`].
    pub fn autoreset_mode(&self) -> AutoResetType {
        AutoResetType::NextStep
    }

    /// Number of environments.
    pub fn num_envs(&self) -> usize {
        self.definition.id_manager.num_envs()
    }

    /// Liveness of the agents of each environment.
    pub fn trackers(&self) -> &[AgentTracker] {
        &self.trackers
    }

    /// Every agent that may appear in any environment.
    pub fn possible_agents(&self) -> &BTreeSet<AgentId> {
        &self.definition.possible_agents
    }

    /// Number of possible agents.
    pub fn num_agents(&self) -> usize {
        self.definition.possible_agents.len()
    }

    /// Same as [`RayVecEnv::num_agents`].
    pub fn max_num_agents(&self) -> usize {
        self.num_agents()
    }

    /// Type labels reported by the simulator.
    pub fn agent_types(&self) -> &Nested<String> {
        &self.definition.agent_types
    }

    /// Observation space of each agent of the first environment.
    pub fn single_observation_spaces(&self) -> &BTreeMap<AgentId, Space> {
        &self.definition.observation_spaces
    }

    /// Action space of each agent of the first environment.
    pub fn single_action_spaces(&self) -> &BTreeMap<AgentId, Space> {
        &self.definition.action_spaces
    }

    /// Dict of [`RayVecEnv::single_observation_spaces`].
    pub fn single_observation_space(&self) -> Space {
        self.definition.single_observation_space()
    }

    /// Dict of [`RayVecEnv::single_action_spaces`].
    pub fn single_action_space(&self) -> Space {
        self.definition.single_action_space()
    }

    /// Same as [`RayVecEnv::single_observation_space`].
    pub fn observation_space(&self) -> Space {
        self.single_observation_space()
    }

    /// Same as [`RayVecEnv::single_action_space`].
    pub fn action_space(&self) -> Space {
        self.single_action_space()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ALL_AGENTS;
    use schola_core::{
        local::{testing::CountEnv, LocalProtocol},
        InProcessSimulator,
    };
    use test_log::test;

    type Env<'a> = RayVecEnv<&'a mut LocalProtocol<CountEnv>, &'a mut InProcessSimulator>;

    fn build<'a>(
        protocol: &'a mut LocalProtocol<CountEnv>,
        simulator: &'a mut InProcessSimulator,
    ) -> Result<Env<'a>> {
        RayVecEnv::build(protocol, simulator)
    }

    fn act(value: i64) -> BTreeMap<AgentId, Point> {
        let mut actions = BTreeMap::new();
        actions.insert(CountEnv::AGENT.to_string(), Point::Discrete(value));
        actions
    }

    #[test]
    fn test_independent_episodes() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![
            CountEnv::single(2),
            CountEnv::single(3),
            CountEnv::single(3),
        ]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator)?;
        assert_eq!(env.num_envs(), 3);
        assert_eq!(env.num_agents(), 1);

        let (obs, infos) = env.reset(None, None)?;
        assert_eq!(obs.len(), 3);
        assert_eq!(infos.len(), 3);

        let steps = env.step(&[act(1), act(1), act(1)])?;
        assert!(steps.iter().all(|s| !s.terminateds[ALL_AGENTS]));

        let steps = env.step(&[act(1), act(1), act(1)])?;
        assert!(steps[0].terminateds[ALL_AGENTS]);
        assert!(!steps[1].terminateds[ALL_AGENTS]);
        assert!(env.trackers()[0].reset_on_next_step());

        let steps = env.step(&[act(4), act(1), act(1)])?;
        assert_eq!(steps[0].observations[CountEnv::AGENT], Point::Discrete(0));
        assert_eq!(steps[0].rewards[CountEnv::AGENT], 0.0);
        assert!(!steps[0].terminateds[ALL_AGENTS]);
        assert!(steps[1].terminateds[ALL_AGENTS]);
        assert!(steps[2].terminateds[ALL_AGENTS]);
        assert_eq!(steps[1].rewards[CountEnv::AGENT], 1.0);
        assert_eq!(env.trackers()[0].agents(), vec![CountEnv::AGENT]);
        Ok(())
    }

    #[test]
    fn test_reset_seeds() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::single(99), CountEnv::single(99)]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator)?;

        let (obs, _) = env.reset(Some(Seeds::from(vec![4u64, 7])), None)?;
        assert_eq!(obs[0][CountEnv::AGENT], Point::Discrete(4));
        assert_eq!(obs[1][CountEnv::AGENT], Point::Discrete(7));

        let (obs, _) = env.reset(Some(Seeds::from(11u64)), None)?;
        let spawned = spawn_seeds(11, 2);
        assert_eq!(
            obs[1][CountEnv::AGENT],
            Point::Discrete((spawned[1] & SEED_MASK) as i64)
        );

        let err = env.reset(Some(Seeds::from(vec![1u64])), None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::InvalidSeeds {
                expected: 2,
                got: 1
            })
        ));
        Ok(())
    }

    #[test]
    fn test_too_many_actions() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::single(2)]);
        let mut simulator = InProcessSimulator::default();
        let mut env = build(&mut protocol, &mut simulator)?;
        env.reset(None, None)?;
        let err = env.step(&[act(1), act(1)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::Batch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_spaces() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::single(2), CountEnv::single(2)]);
        let mut simulator = InProcessSimulator::default();
        let env = build(&mut protocol, &mut simulator)?;
        let expected = Space::dict(vec![(CountEnv::AGENT, CountEnv::observation_space())]);
        assert_eq!(env.single_observation_space(), expected);
        assert_eq!(env.observation_space(), expected);
        assert_eq!(env.autoreset_mode(), AutoResetType::NextStep);
        Ok(())
    }
}
