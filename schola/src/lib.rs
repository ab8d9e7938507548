#![warn(missing_docs)]
//! Bridge between environments running in a simulator and reinforcement
//! learning framework APIs.
//!
//! Schola consists of the following crates:
//!
//! * [schola-core](schola_core): id mapping between nested
//!   `(env_id, agent_id)` pairs and flat indices, spaces and their batching,
//!   the protocol and simulator traits, and an in-process transport.
//! * [schola-gym](schola_gym): single-agent and vectorized Gymnasium-style
//!   environments.
//! * [schola-rllib](schola_rllib): multi-agent environments with a dynamic
//!   population, single and vectorized.
//! * [schola-sb3](schola_sb3): a Stable-Baselines3-style vectorized
//!   environment.
//! * [schola-minari](schola_minari): collection of demonstrations into
//!   offline datasets.
pub use schola_core as core;
pub use schola_gym as gym;
pub use schola_minari as minari;
pub use schola_rllib as rllib;
pub use schola_sb3 as sb3;
