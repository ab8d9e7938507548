use anyhow::Result;
use schola::{
    core::{
        error::SpaceKind,
        local::{AgentDefinition, LocalEnv, LocalProtocol},
        EnvReset, EnvStep, InProcessSimulator, Info, Lifecycle, Options, Point, ScholaError, Space,
    },
    gym::{GymVectorEnv, GymVectorEnvConfig},
    sb3::VecEnv,
};
use std::collections::BTreeMap;
use test_log::test;

/// Single-agent environment whose observation space has `n` values.
struct SizedEnv {
    n: i64,
}

impl LocalEnv for SizedEnv {
    fn agents(&self) -> Vec<AgentDefinition> {
        vec![AgentDefinition::new(
            "agent",
            Space::discrete(self.n),
            Space::discrete(2),
        )]
    }

    fn reset(&mut self, _seed: Option<u64>, _options: &Options) -> Result<EnvReset> {
        let mut reset = EnvReset::default();
        reset
            .observations
            .insert("agent".to_string(), Point::Discrete(0));
        reset.infos.insert("agent".to_string(), Info::new());
        Ok(reset)
    }

    fn step(&mut self, _actions: &BTreeMap<String, Point>) -> Result<EnvStep> {
        let reset = self.reset(None, &Options::new())?;
        Ok(EnvStep::from_reset(reset))
    }
}

fn expect_mismatch(err: Option<anyhow::Error>) {
    match err.and_then(|e| e.downcast::<ScholaError>().ok()) {
        Some(ScholaError::SpaceMismatch {
            kind,
            env_id,
            got,
            expected,
            ..
        }) => {
            assert_eq!(kind, SpaceKind::Observation);
            assert_eq!(env_id, 1);
            assert_eq!(got, "Discrete(8)");
            assert_eq!(expected, "Discrete(4)");
        }
        _ => panic!("expected an observation space mismatch"),
    }
}

fn sized_envs() -> LocalProtocol<SizedEnv> {
    LocalProtocol::new(vec![SizedEnv { n: 4 }, SizedEnv { n: 8 }])
}

#[test]
fn test_gym_vector_env_rejects_mismatch() {
    let mut protocol = sized_envs();
    let mut simulator = InProcessSimulator::default();
    let config = GymVectorEnvConfig::default();
    expect_mismatch(GymVectorEnv::build(&mut protocol, &mut simulator, &config).err());
    assert!(!protocol.is_open());
    assert_eq!(simulator.stops(), 1);
}

#[test]
fn test_sb3_vec_env_rejects_mismatch() {
    let mut protocol = sized_envs();
    let mut simulator = InProcessSimulator::default();
    expect_mismatch(VecEnv::build(&mut protocol, &mut simulator).err());
    assert!(!protocol.is_open());
    assert_eq!(simulator.stops(), 1);
}

#[test]
fn test_uniform_spaces_are_accepted() -> Result<()> {
    let protocol = LocalProtocol::new(vec![SizedEnv { n: 4 }, SizedEnv { n: 4 }]);
    let mut env = VecEnv::build(protocol, InProcessSimulator::default())?;
    assert_eq!(env.reset()?, Point::multi_discrete(vec![0, 0]));
    env.close()
}
