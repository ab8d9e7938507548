//! In-process transport for demonstrations.
use super::{check_len, definition, LocalEnv};
use crate::{
    error::ScholaError,
    protocol::{
        Definition, EnvReset, ImitationData, ImitationProtocol, Lifecycle, Properties, Protocol,
        ProtocolKind,
    },
    AgentId, EnvId, Options, Point,
};
use anyhow::Result;
use log::{info, trace};
use std::collections::BTreeMap;

/// Policy producing the demonstrated actions.
pub trait Expert {
    /// Action of `agent_id` in `env_id` given its latest observation.
    fn act(&mut self, env_id: EnvId, agent_id: &str, observation: &Point) -> Point;
}

impl<F> Expert for F
where
    F: FnMut(EnvId, &str, &Point) -> Point,
{
    fn act(&mut self, env_id: EnvId, agent_id: &str, observation: &Point) -> Point {
        self(env_id, agent_id, observation)
    }
}

struct Rollout {
    last_observations: BTreeMap<AgentId, Point>,
    pending_reset: Option<EnvReset>,
}

/// Rolls out an [`Expert`] in a set of [`LocalEnv`]s through [`ImitationProtocol`].
///
/// The initial state of an episode is delivered with the first timestep of
/// that episode. Finished environments reset automatically.
pub struct LocalImitationProtocol<E: LocalEnv, X: Expert> {
    envs: Vec<E>,
    expert: X,
    open: bool,
    rollouts: Option<Vec<Rollout>>,
}

impl<E: LocalEnv, X: Expert> LocalImitationProtocol<E, X> {
    /// Serves `envs` with actions chosen by `expert`.
    pub fn new(envs: Vec<E>, expert: X) -> Self {
        Self {
            envs,
            expert,
            open: false,
            rollouts: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        match self.open {
            true => Ok(()),
            false => Err(ScholaError::ProtocolClosed.into()),
        }
    }
}

impl<E: LocalEnv, X: Expert> Lifecycle for LocalImitationProtocol<E, X> {
    fn start(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.rollouts = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl<E: LocalEnv, X: Expert> Properties for LocalImitationProtocol<E, X> {
    fn properties(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

impl<E: LocalEnv, X: Expert> Protocol for LocalImitationProtocol<E, X> {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::InProcess
    }
}

impl<E: LocalEnv, X: Expert> ImitationProtocol for LocalImitationProtocol<E, X> {
    fn send_startup_msg(
        &mut self,
        seeds: Option<&[u64]>,
        options: Option<&[Options]>,
    ) -> Result<()> {
        self.ensure_open()?;
        check_len(seeds, self.envs.len())?;
        check_len(options, self.envs.len())?;
        info!("Starting rollout in {} environments", self.envs.len());

        let empty = Options::new();
        let mut rollouts = Vec::with_capacity(self.envs.len());
        for (env_id, env) in self.envs.iter_mut().enumerate() {
            let reset = env.reset(
                seeds.map(|s| s[env_id]),
                options.map_or(&empty, |o| &o[env_id]),
            )?;
            rollouts.push(Rollout {
                last_observations: reset.observations.clone(),
                pending_reset: Some(reset),
            });
        }
        self.rollouts = Some(rollouts);
        Ok(())
    }

    fn get_definition(&mut self) -> Result<Definition> {
        self.ensure_open()?;
        Ok(definition(&self.envs))
    }

    fn get_data(&mut self) -> Result<ImitationData> {
        self.ensure_open()?;
        let rollouts = self.rollouts.as_mut().ok_or(ScholaError::StartupNotSent)?;

        let empty = Options::new();
        let mut data = ImitationData::default();
        for (env_id, (env, rollout)) in self.envs.iter_mut().zip(rollouts.iter_mut()).enumerate() {
            let expert = &mut self.expert;
            let actions = rollout
                .last_observations
                .iter()
                .map(|(agent_id, obs)| (agent_id.clone(), expert.act(env_id, agent_id, obs)))
                .collect::<BTreeMap<_, _>>();
            let step = env.step(&actions)?;
            let done = step.is_done();

            if let Some(reset) = rollout.pending_reset.take() {
                data.step.push_initial(env_id, reset);
            }
            rollout.last_observations = step.observations.clone();
            data.step.push(step);
            data.actions.push(actions);

            if done {
                trace!("Env {} finished its episode, resetting", env_id);
                let reset = env.reset(None, &empty)?;
                rollout.last_observations = reset.observations.clone();
                rollout.pending_reset = Some(reset);
            }
        }
        Ok(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::local::testing::CountEnv;

    #[test]
    fn test_initial_state_is_sent_once_per_episode() -> Result<()> {
        let expert = |_: EnvId, _: &str, _: &Point| Point::Discrete(2);
        let mut protocol = LocalImitationProtocol::new(vec![CountEnv::single(2)], expert);
        protocol.start()?;
        assert!(protocol.get_data().is_err());
        ImitationProtocol::send_startup_msg(&mut protocol, Some(&[5u64][..]), None)?;

        let data = protocol.get_data()?;
        assert_eq!(
            data.step.initial_observations[&0][CountEnv::AGENT],
            Point::Discrete(5)
        );
        assert_eq!(data.step.observations[0][CountEnv::AGENT], Point::Discrete(6));
        assert_eq!(data.actions[0][CountEnv::AGENT], Point::Discrete(2));

        let data = protocol.get_data()?;
        assert!(data.step.initial_observations.is_empty());
        Ok(())
    }

    #[test]
    fn test_resets_after_episode_end() -> Result<()> {
        let expert = |_: EnvId, _: &str, _: &Point| Point::Discrete(1);
        let mut protocol = LocalImitationProtocol::new(vec![CountEnv::single(2)], expert);
        protocol.start()?;
        ImitationProtocol::send_startup_msg(&mut protocol, None, None)?;

        protocol.get_data()?;
        let data = protocol.get_data()?;
        assert!(data.step.terminateds[0][CountEnv::AGENT]);
        assert!(data.step.initial_observations.is_empty());

        let data = protocol.get_data()?;
        assert_eq!(
            data.step.initial_observations[&0][CountEnv::AGENT],
            Point::Discrete(0)
        );
        assert_eq!(data.step.observations[0][CountEnv::AGENT], Point::Discrete(1));
        Ok(())
    }
}
