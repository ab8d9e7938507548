use anyhow::Result;
use schola::{
    core::{
        local::{testing::CountEnv, LocalProtocol},
        AgentId, InProcessSimulator, Point, ScholaError,
    },
    rllib::{RayVecEnv, ALL_AGENTS},
    sb3::VecEnv,
};
use std::collections::BTreeMap;
use test_log::test;

fn protocol() -> LocalProtocol<CountEnv> {
    LocalProtocol::new(vec![
        CountEnv::new(vec![("a", 1), ("b", 3)]),
        CountEnv::new(vec![("a", 3), ("b", 3)]),
    ])
}

#[test]
fn test_sb3_rejects_agents_completing_apart() -> Result<()> {
    let mut env = VecEnv::build(protocol(), InProcessSimulator::default())?;
    assert_eq!(env.num_envs(), 4);
    env.reset()?;
    let err = env.step(&Point::multi_discrete(vec![1, 1, 1, 1])).unwrap_err();
    match err.downcast_ref::<ScholaError>() {
        Some(ScholaError::Environment(msg)) => assert!(msg.contains("Env 0")),
        _ => panic!("expected an environment error, got {}", err),
    }
    Ok(())
}

#[test]
fn test_rllib_accepts_agents_completing_apart() -> Result<()> {
    let mut env = RayVecEnv::build(protocol(), InProcessSimulator::default())?;
    env.reset(None, None)?;
    let act = |agents: &[&str]| -> BTreeMap<AgentId, Point> {
        agents
            .iter()
            .map(|a| (a.to_string(), Point::Discrete(1)))
            .collect()
    };

    let steps = env.step(&[act(&["a", "b"]), act(&["a", "b"])])?;
    assert!(steps[0].terminateds["a"]);
    assert!(!steps[0].terminateds[ALL_AGENTS]);
    assert_eq!(env.trackers()[0].agents(), vec!["b"]);

    env.step(&[act(&["b"]), act(&["a", "b"])])?;
    let steps = env.step(&[act(&["b"]), act(&["a", "b"])])?;
    assert!(steps[0].terminateds[ALL_AGENTS]);
    assert!(steps[1].terminateds[ALL_AGENTS]);
    Ok(())
}
