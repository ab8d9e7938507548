#![warn(missing_docs)]
//! Gymnasium-style environments backed by a Schola simulator.
//!
//! [`GymEnv`] wraps a simulator holding a single agent. [`GymVectorEnv`]
//! turns every `(env_id, agent_id)` pair into one slot of a vectorized
//! environment, batching observations and actions along a leading dimension
//! with [`schola_core::space::batch_space`].
//!
//! Both are generic over the transport ([`schola_core::RlProtocol`]) and the
//! process hosting the environments ([`schola_core::Simulator`]):
//!
//! ```no_run
//! use schola_core::{local::{testing::CountEnv, LocalProtocol}, InProcessSimulator, Point};
//! use schola_gym::{GymVectorEnv, GymVectorEnvConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let protocol = LocalProtocol::new(vec![CountEnv::single(2), CountEnv::single(3)]);
//! let mut env = GymVectorEnv::build(
//!     protocol,
//!     InProcessSimulator::default(),
//!     &GymVectorEnvConfig::default(),
//! )?;
//! let (obs, _infos) = env.reset(Some(42u64.into()), None)?;
//! let step = env.step(&Point::multi_discrete(vec![1, 1]))?;
//! # Ok(())
//! # }
//! ```
mod config;
mod env;
mod vec;
pub use config::GymVectorEnvConfig;
pub use env::{GymEnv, GymStep};
pub use vec::{GymVectorEnv, GymVectorStep};
