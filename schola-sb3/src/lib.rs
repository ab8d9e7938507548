#![warn(missing_docs)]
//! Stable-Baselines3-style vectorized environment backed by a Schola simulator.
//!
//! [`VecEnv`] flattens the `(env_id, agent_id)` pairs of the simulator into
//! slots. When an environment finishes, its slots are reset within the same
//! step: the returned observation starts the next episode and the last one
//! goes to [`Sb3Info::terminal_observation`].
//!
//! ```no_run
//! use schola_core::{local::{testing::CountEnv, LocalProtocol}, InProcessSimulator, Point};
//! use schola_sb3::VecEnv;
//!
//! # fn main() -> anyhow::Result<()> {
//! let protocol = LocalProtocol::new(vec![CountEnv::single(2), CountEnv::single(3)]);
//! let mut env = VecEnv::build(protocol, InProcessSimulator::default())?;
//! env.seed(Some(0));
//! let _obs = env.reset()?;
//! let step = env.step(&Point::multi_discrete(vec![1, 1]))?;
//! for (uid, info) in step.infos.iter().enumerate() {
//!     if let Some(obs) = &info.terminal_observation {
//!         println!("slot {} ended with {:?}", uid, obs);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Agents acting in a dict space can be driven with flat actions after
//! [`VecEnv::merge_dict_actions`], see [`merge_spaces`].
mod dict;
mod env;
mod info;
pub use dict::{merge_spaces, split_value};
pub use env::{Sb3Step, VecEnv};
pub use info::Sb3Info;
