#![warn(missing_docs)]
//! RLlib-style multi-agent environments backed by a Schola simulator.
//!
//! [`RayEnv`] wraps a simulator holding one environment and [`RayVecEnv`]
//! one holding any number of them. Both report results keyed by agent id and
//! run under next-step auto-reset.
//!
//! Agents may appear after the start of an episode and leave before its end.
//! An [`AgentTracker`] per environment keeps the active, terminated and
//! truncated agents and derives the [`ALL_AGENTS`] flags:
//!
//! * the environment is terminated when every agent seen in the episode is
//!   terminated or truncated,
//! * the environment is truncated when every such agent is truncated.
//!
//! ```no_run
//! use schola_core::{local::{testing::CountEnv, LocalProtocol}, InProcessSimulator, Point};
//! use schola_rllib::{RayVecEnv, ALL_AGENTS};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> anyhow::Result<()> {
//! let protocol = LocalProtocol::new(vec![CountEnv::single(2), CountEnv::single(3)]);
//! let mut env = RayVecEnv::build(protocol, InProcessSimulator::default())?;
//! let (obs, _infos) = env.reset(Some(7u64.into()), None)?;
//! let actions = obs
//!     .iter()
//!     .map(|agents| agents.keys().map(|a| (a.clone(), Point::Discrete(1))).collect())
//!     .collect::<Vec<BTreeMap<_, _>>>();
//! let steps = env.step(&actions)?;
//! let finished = steps.iter().filter(|s| s.terminateds[ALL_AGENTS]).count();
//! # Ok(())
//! # }
//! ```
mod base;
mod env;
mod tracker;
mod vec;
pub use base::{MultiAgentStep, ALL_AGENTS};
pub use env::RayEnv;
pub use tracker::AgentTracker;
pub use vec::{RayVecEnv, VecReset};
