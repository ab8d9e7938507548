#![warn(missing_docs)]
//! Core of the Schola bridge between a simulator and reinforcement learning APIs.
//!
//! A simulator reports a population of environments, each holding a set of
//! agents. The framework adapters built on this crate (`schola-gym`,
//! `schola-rllib`, `schola-sb3`, `schola-minari`) reshape that nested
//! population into the containers their target framework expects, using
//! [`IdManager`] to move between nested `(env_id, agent_id)` ids and flat
//! indices.
//!
//! The transport to the simulator is abstracted by [`RlProtocol`] and
//! [`ImitationProtocol`]; the process hosting the simulator by [`Simulator`].
//! [`local`] provides an in-process transport running Rust environments.
pub mod error;
pub mod id_manager;
pub mod info;
pub mod lifecycle;
pub mod local;
pub mod protocol;
pub mod seeding;
pub mod simulator;
pub mod space;

use std::collections::BTreeMap;

pub use error::ScholaError;
pub use id_manager::{nested_get, IdManager};
pub use info::{FinalInfo, InfoColumn, VecInfo};
pub use lifecycle::{uniform_spaces, validate_definition, validate_population, Session};
pub use protocol::{
    ActionSpaces, AutoResetType, Definition, EnvReset, EnvStep, ImitationData, ImitationProtocol,
    Lifecycle, Properties, Protocol, ProtocolKind, ResetResponse, RlProtocol, StepResponse,
};
pub use seeding::{spawn_seeds, Seeds};
pub use simulator::{InProcessSimulator, Simulator};
pub use space::{DType, Point, Space};

/// Identifier of an environment, its index in the population.
pub type EnvId = usize;

/// Identifier of an agent, unique within its environment.
pub type AgentId = String;

/// Values keyed by environment id, then by agent id.
pub type Nested<T> = BTreeMap<EnvId, BTreeMap<AgentId, T>>;

/// Additional information attached to an observation.
pub type Info = BTreeMap<String, String>;

/// Options passed to an environment on reset.
pub type Options = BTreeMap<String, String>;
