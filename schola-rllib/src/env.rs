//! Multi-agent environment over a single simulated environment.
use crate::{
    base::{check_envs, env_step, RayDefinition},
    AgentTracker, MultiAgentStep,
};
use anyhow::Result;
use schola_core::{
    ActionSpaces, AgentId, AutoResetType, Info, Nested, Options, Point, RlProtocol, ScholaError,
    Session, Simulator, Space,
};
use std::collections::{BTreeMap, BTreeSet};

/// A simulator holding exactly one environment, exposed as a multi-agent
/// environment.
///
/// Observations, rewards and flags are maps keyed by agent id. Agents may
/// join or leave during an episode; [`RayEnv::agents`] lists the active ones.
/// After the whole environment finishes, the next step returns the first
/// observation of a new episode.
pub struct RayEnv<P: RlProtocol, S: Simulator> {
    session: Session<P, S>,
    definition: RayDefinition,
    tracker: AgentTracker,
}

impl<P: RlProtocol, S: Simulator> RayEnv<P, S> {
    /// Connects to the simulator and checks that it holds one environment.
    ///
    /// On failure the protocol is closed and the simulator stopped.
    pub fn build(protocol: P, simulator: S) -> Result<Self> {
        let (mut session, definition) = RayDefinition::connect(protocol, simulator)?;
        let num_envs = definition.id_manager.num_envs();
        if num_envs != 1 {
            let err = ScholaError::WrongArity(format!(
                "Expected Environment to be non-vectorized but found {} environments. \
                 Use RayVecEnv for multiple environments.",
                num_envs
            ));
            return session.guard(Err(err.into()));
        }

        Ok(Self {
            session,
            definition,
            tracker: AgentTracker::new(0),
        })
    }

    /// Starts a new episode and returns the observations and infos of the
    /// agents present at its start.
    pub fn reset(
        &mut self,
        seed: Option<u64>,
        options: Option<&Options>,
    ) -> Result<(BTreeMap<AgentId, Point>, BTreeMap<AgentId, Info>)> {
        let seeds = seed.map(|s| vec![s]);
        let options = options.map(|o| vec![o.clone()]);
        let response = self
            .session
            .protocol_mut()
            .send_reset_msg(seeds.as_deref(), options.as_deref())?;
        check_envs(&response.observations, 1)?;

        let mut observations = response.observations.into_iter();
        let mut infos = response.infos.into_iter();
        let observations = observations.next().unwrap_or_default();
        let infos = infos.next().unwrap_or_default();
        self.tracker.reset(&observations);
        Ok((observations, infos))
    }

    /// Applies the actions of the agents that act in this step.
    pub fn step(&mut self, actions: &BTreeMap<AgentId, Point>) -> Result<MultiAgentStep> {
        let mut nested = Nested::new();
        nested.insert(0, actions.clone());
        let mut response = self.session.protocol_mut().send_action_msg(
            &nested,
            ActionSpaces::PerAgent(&self.definition.action_spaces),
        )?;
        check_envs(&response.observations, 1)?;
        Ok(env_step(&mut response, 0, &mut self.tracker))
    }

    /// Closes the protocol and stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Auto-reset policy, always [`AutoResetType::NextStep`].
    pub fn autoreset_mode(&self) -> AutoResetType {
        AutoResetType::NextStep
    }

    /// Agents active in the current episode.
    pub fn agents(&self) -> Vec<AgentId> {
        self.tracker.agents()
    }

    /// Every agent that may appear.
    pub fn possible_agents(&self) -> &BTreeSet<AgentId> {
        &self.definition.possible_agents
    }

    /// Number of possible agents.
    pub fn num_agents(&self) -> usize {
        self.definition.possible_agents.len()
    }

    /// Same as [`RayEnv::num_agents`].
    pub fn max_num_agents(&self) -> usize {
        self.num_agents()
    }

    /// Type labels reported by the simulator.
    pub fn agent_types(&self) -> &Nested<String> {
        &self.definition.agent_types
    }

    /// Observation space of each agent.
    pub fn observation_spaces(&self) -> &BTreeMap<AgentId, Space> {
        &self.definition.observation_spaces
    }

    /// Action space of each agent.
    pub fn action_spaces(&self) -> &BTreeMap<AgentId, Space> {
        &self.definition.action_spaces
    }

    /// Dict of the observation spaces, keyed by agent id.
    pub fn observation_space(&self) -> Space {
        self.definition.single_observation_space()
    }

    /// Dict of the action spaces, keyed by agent id.
    pub fn action_space(&self) -> Space {
        self.definition.single_action_space()
    }

    /// Liveness of the agents.
    pub fn tracker(&self) -> &AgentTracker {
        &self.tracker
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ALL_AGENTS;
    use schola_core::{
        local::{
            testing::{CountEnv, DynamicEnv},
            LocalProtocol,
        },
        InProcessSimulator, Lifecycle,
    };
    use test_log::test;

    fn actions(items: &[(&str, i64)]) -> BTreeMap<AgentId, Point> {
        items
            .iter()
            .map(|(a, v)| (a.to_string(), Point::Discrete(*v)))
            .collect()
    }

    #[test]
    fn test_definition() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::new(vec![("a", 2), ("b", 3)])]);
        let mut simulator = InProcessSimulator::default();
        let env = RayEnv::build(&mut protocol, &mut simulator)?;
        assert_eq!(env.num_agents(), 2);
        assert_eq!(env.max_num_agents(), 2);
        assert!(env.possible_agents().contains("b"));
        assert_eq!(
            env.action_space(),
            Space::dict(vec![
                ("a", CountEnv::action_space()),
                ("b", CountEnv::action_space())
            ])
        );
        assert_eq!(env.observation_spaces()["a"], CountEnv::observation_space());
        drop(env);
        assert_eq!(protocol.auto_reset(), Some(AutoResetType::NextStep));
        Ok(())
    }

    #[test]
    fn test_next_step_reset() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::new(vec![("a", 2), ("b", 2)])]);
        let mut simulator = InProcessSimulator::default();
        let mut env = RayEnv::build(&mut protocol, &mut simulator)?;

        let (obs, _) = env.reset(Some(0), None)?;
        assert_eq!(obs.len(), 2);
        assert_eq!(env.agents(), vec!["a", "b"]);

        let step = env.step(&actions(&[("a", 1), ("b", 2)]))?;
        assert_eq!(step.rewards["b"], 2.0);
        assert!(!step.terminateds[ALL_AGENTS]);

        let step = env.step(&actions(&[("a", 1), ("b", 1)]))?;
        assert!(step.terminateds["a"] && step.terminateds["b"]);
        assert!(step.terminateds[ALL_AGENTS]);
        assert!(!step.truncateds[ALL_AGENTS]);
        assert!(env.agents().is_empty());
        assert!(env.tracker().reset_on_next_step());

        let step = env.step(&BTreeMap::new())?;
        assert_eq!(step.observations["a"], Point::Discrete(0));
        assert_eq!(step.rewards["a"], 0.0);
        assert!(!step.terminateds[ALL_AGENTS]);
        assert_eq!(env.agents(), vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_spawned_agent() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![DynamicEnv::new(2, 3, 4)]);
        let mut simulator = InProcessSimulator::default();
        let mut env = RayEnv::build(&mut protocol, &mut simulator)?;

        env.reset(Some(1), None)?;
        assert_eq!(env.agents(), vec![DynamicEnv::RUNNER]);

        env.step(&actions(&[(DynamicEnv::RUNNER, 1)]))?;
        let step = env.step(&actions(&[(DynamicEnv::RUNNER, 1)]))?;
        assert!(step.observations.contains_key(DynamicEnv::SPAWNED));
        assert_eq!(env.agents(), vec![DynamicEnv::RUNNER, DynamicEnv::SPAWNED]);

        let step = env.step(&actions(&[(DynamicEnv::RUNNER, 1), (DynamicEnv::SPAWNED, 2)]))?;
        assert!(step.terminateds[DynamicEnv::SPAWNED]);
        assert!(!step.terminateds[ALL_AGENTS]);
        assert_eq!(env.agents(), vec![DynamicEnv::RUNNER]);

        let step = env.step(&actions(&[(DynamicEnv::RUNNER, 1)]))?;
        assert!(step.truncateds[DynamicEnv::RUNNER]);
        assert!(step.terminateds[ALL_AGENTS]);
        assert!(!step.truncateds[ALL_AGENTS]);
        Ok(())
    }

    #[test]
    fn test_invalid_action_is_rejected() -> Result<()> {
        let mut protocol = LocalProtocol::new(vec![CountEnv::single(3)]);
        let mut simulator = InProcessSimulator::default();
        let mut env = RayEnv::build(&mut protocol, &mut simulator)?;
        env.reset(None, None)?;
        let err = env.step(&actions(&[(CountEnv::AGENT, 9)])).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::InvalidAction { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_rejects_vectorized_simulator() {
        let mut protocol = LocalProtocol::new(vec![CountEnv::single(2), CountEnv::single(2)]);
        let mut simulator = InProcessSimulator::default();
        let err = RayEnv::build(&mut protocol, &mut simulator).err().map(|e| e.to_string());
        assert_eq!(
            err.as_deref(),
            Some(
                "Expected Environment to be non-vectorized but found 2 environments. \
                 Use RayVecEnv for multiple environments."
            )
        );
        assert!(!protocol.is_open());
        assert_eq!(simulator.stops(), 1);
    }

    #[test]
    fn test_rejects_environment_without_agents() {
        let mut protocol = LocalProtocol::new(vec![CountEnv::new(Vec::<(String, i64)>::new())]);
        let mut simulator = InProcessSimulator::default();
        let err = RayEnv::build(&mut protocol, &mut simulator)
            .err()
            .and_then(|e| e.downcast::<ScholaError>().ok());
        assert!(matches!(err, Some(ScholaError::NoAgents(0))));
        assert!(!simulator.is_running());
    }
}
