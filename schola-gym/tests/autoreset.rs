use anyhow::Result;
use schola_core::{
    local::{testing::CountEnv, LocalProtocol},
    AutoResetType, InProcessSimulator, Point,
};
use schola_gym::{GymVectorEnv, GymVectorEnvConfig};
use test_log::test;

fn protocol() -> LocalProtocol<CountEnv> {
    LocalProtocol::new(vec![
        CountEnv::single(2),
        CountEnv::single(3),
        CountEnv::single(3),
    ])
}

#[test]
fn test_next_step_scenario() -> Result<()> {
    let config = GymVectorEnvConfig::default().autoreset_mode(AutoResetType::NextStep);
    let mut env = GymVectorEnv::build(protocol(), InProcessSimulator::default(), &config)?;
    let actions = Point::multi_discrete(vec![1, 2, 3]);

    let (obs, _) = env.reset(None, None)?;
    assert_eq!(obs, Point::multi_discrete(vec![0, 0, 0]));

    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![1, 1, 1]));
    assert_eq!(step.terminateds, vec![false, false, false]);

    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![2, 2, 2]));
    assert_eq!(step.terminateds, vec![true, false, false]);

    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![0, 3, 3]));
    assert_eq!(step.terminateds, vec![false, true, true]);
    assert_eq!(step.rewards, vec![0.0, 2.0, 3.0]);
    assert!(step.infos.final_obs().is_none());

    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![1, 0, 0]));
    assert_eq!(step.terminateds, vec![false, false, false]);
    env.close()
}

#[test]
fn test_same_step_scenario() -> Result<()> {
    let config = GymVectorEnvConfig::default().autoreset_mode(AutoResetType::SameStep);
    let mut env = GymVectorEnv::build(protocol(), InProcessSimulator::default(), &config)?;
    let actions = Point::multi_discrete(vec![1, 1, 1]);

    env.reset(None, None)?;
    env.step(&actions)?;
    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![0, 2, 2]));
    assert_eq!(step.terminateds, vec![true, false, false]);
    let final_obs = step.infos.final_obs().map(|c| c.values().to_vec());
    assert_eq!(final_obs, Some(vec![Some(Point::Discrete(2)), None, None]));
    let mask = step.infos.final_obs().map(|c| c.mask().to_vec());
    assert_eq!(mask, Some(vec![true, false, false]));

    let step = env.step(&actions)?;
    assert_eq!(step.obs, Point::multi_discrete(vec![1, 0, 0]));
    assert_eq!(step.terminateds, vec![false, true, true]);
    let mask = step.infos.final_obs().map(|c| c.mask().to_vec());
    assert_eq!(mask, Some(vec![false, true, true]));
    env.close()
}

#[test]
fn test_seeded_reset_is_deterministic() -> Result<()> {
    let config = GymVectorEnvConfig::default();
    let mut env = GymVectorEnv::build(protocol(), InProcessSimulator::default(), &config)?;
    let (obs1, _) = env.reset(Some(1234u64.into()), None)?;
    let (obs2, _) = env.reset(Some(1234u64.into()), None)?;
    assert_eq!(obs1, obs2);
    Ok(())
}
