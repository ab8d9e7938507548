//! Transport contracts between the framework adapters and a simulator.
//!
//! A protocol is driven in a fixed order: `start`, the startup message,
//! `get_definition` (once), then any number of resets and steps, then
//! `close`. Payloads are nested per environment and then per agent.
use crate::{AgentId, EnvId, Info, Nested, Options, Point, Space};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// How a finished environment is bridged into the next episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AutoResetType {
    /// The caller resets finished environments; stepping one is an error.
    Disabled,

    /// A finished environment is reset within the same step. The initial
    /// observation of the new episode is reported next to the terminal one.
    SameStep,

    /// A finished environment is reset on the following step, which reports
    /// the initial observation with a zero reward.
    NextStep,
}

impl fmt::Display for AutoResetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::SameStep => write!(f, "SameStep"),
            Self::NextStep => write!(f, "NextStep"),
        }
    }
}

/// Family of a protocol, used to check it against a [`Simulator`](crate::Simulator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Talks to a simulator process over a socket.
    Socket,

    /// Runs the environments in the current process.
    InProcess,
}

/// Opening and closing of a connection.
pub trait Lifecycle {
    /// Opens the connection.
    fn start(&mut self) -> Result<()>;

    /// Closes the connection. Closing a closed connection is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Returns `true` if the connection is open.
    fn is_open(&self) -> bool;
}

/// Properties handed to the simulator when it starts, e.g. the port to connect to.
pub trait Properties {
    /// Returns the properties.
    fn properties(&self) -> BTreeMap<String, String>;
}

/// A connection to a simulator.
pub trait Protocol: Lifecycle + Properties {
    /// Family of the protocol.
    fn kind(&self) -> ProtocolKind;
}

/// Population and spaces reported by a simulator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Definition {
    /// Agent ids, indexed by environment.
    pub ids: Vec<Vec<AgentId>>,

    /// Type label of each agent.
    pub agent_types: Nested<String>,

    /// Observation space of each agent.
    pub observation_spaces: Nested<Space>,

    /// Action space of each agent.
    pub action_spaces: Nested<Space>,
}

/// Lookup of the action space of an agent, used to encode actions.
#[derive(Debug, Clone, Copy)]
pub enum ActionSpaces<'a> {
    /// Every agent shares the same space.
    Shared(&'a Space),

    /// Spaces keyed by agent id.
    PerAgent(&'a BTreeMap<AgentId, Space>),
}

impl<'a> ActionSpaces<'a> {
    /// Action space of `agent_id`.
    pub fn get(&self, agent_id: &str) -> Option<&'a Space> {
        match self {
            Self::Shared(space) => Some(*space),
            Self::PerAgent(spaces) => spaces.get(agent_id),
        }
    }
}

/// Reset result of a single environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvReset {
    /// Initial observations.
    pub observations: BTreeMap<AgentId, Point>,

    /// Initial infos.
    pub infos: BTreeMap<AgentId, Info>,
}

/// Step result of a single environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvStep {
    /// Observations.
    pub observations: BTreeMap<AgentId, Point>,

    /// Rewards.
    pub rewards: BTreeMap<AgentId, f32>,

    /// Terminal flags.
    pub terminateds: BTreeMap<AgentId, bool>,

    /// Truncation flags.
    pub truncateds: BTreeMap<AgentId, bool>,

    /// Infos.
    pub infos: BTreeMap<AgentId, Info>,
}

impl EnvStep {
    /// The first step of a new episode: initial observations with zero rewards.
    pub fn from_reset(reset: EnvReset) -> Self {
        let agents = reset.observations.keys().cloned().collect::<Vec<_>>();
        Self {
            rewards: agents.iter().map(|a| (a.clone(), 0.0)).collect(),
            terminateds: agents.iter().map(|a| (a.clone(), false)).collect(),
            truncateds: agents.iter().map(|a| (a.clone(), false)).collect(),
            observations: reset.observations,
            infos: reset.infos,
        }
    }

    /// Returns `true` if at least one agent reported and every reported agent
    /// is terminated or truncated.
    pub fn is_done(&self) -> bool {
        let reported = self
            .terminateds
            .keys()
            .chain(self.truncateds.keys())
            .collect::<BTreeSet<_>>();
        !reported.is_empty()
            && reported.iter().all(|a| {
                self.terminateds.get(*a).copied().unwrap_or(false)
                    || self.truncateds.get(*a).copied().unwrap_or(false)
            })
    }
}

/// Result of a reset, one entry per environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResetResponse {
    /// Initial observations.
    pub observations: Vec<BTreeMap<AgentId, Point>>,

    /// Initial infos.
    pub infos: Vec<BTreeMap<AgentId, Info>>,
}

impl ResetResponse {
    /// Appends the result of the next environment.
    pub fn push(&mut self, reset: EnvReset) {
        self.observations.push(reset.observations);
        self.infos.push(reset.infos);
    }
}

/// Result of a step, one entry per environment.
///
/// `initial_observations` and `initial_infos` only hold the environments
/// that were reset within this step, which happens under
/// [`AutoResetType::SameStep`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StepResponse {
    /// Observations.
    pub observations: Vec<BTreeMap<AgentId, Point>>,

    /// Rewards.
    pub rewards: Vec<BTreeMap<AgentId, f32>>,

    /// Terminal flags.
    pub terminateds: Vec<BTreeMap<AgentId, bool>>,

    /// Truncation flags.
    pub truncateds: Vec<BTreeMap<AgentId, bool>>,

    /// Infos.
    pub infos: Vec<BTreeMap<AgentId, Info>>,

    /// Observations of the episodes started within this step.
    pub initial_observations: Nested<Point>,

    /// Infos of the episodes started within this step.
    pub initial_infos: Nested<Info>,
}

impl StepResponse {
    /// Appends the result of the next environment.
    pub fn push(&mut self, step: EnvStep) {
        self.observations.push(step.observations);
        self.rewards.push(step.rewards);
        self.terminateds.push(step.terminateds);
        self.truncateds.push(step.truncateds);
        self.infos.push(step.infos);
    }

    /// Records the reset of `env_id` that happened within this step.
    pub fn push_initial(&mut self, env_id: EnvId, reset: EnvReset) {
        self.initial_observations.insert(env_id, reset.observations);
        self.initial_infos.insert(env_id, reset.infos);
    }
}

/// One timestep of a passive rollout, as consumed by imitation learning.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImitationData {
    /// Step result, including initial states of new episodes.
    pub step: StepResponse,

    /// Actions that produced the step.
    pub actions: Vec<BTreeMap<AgentId, Point>>,
}

/// Transport for interactive training.
pub trait RlProtocol: Protocol {
    /// Declares the auto-reset policy. Must precede resets and steps.
    fn send_startup_msg(&mut self, auto_reset: AutoResetType) -> Result<()>;

    /// Returns the population and spaces.
    fn get_definition(&mut self) -> Result<Definition>;

    /// Resets every environment. `seeds` and `options`, if given, hold one
    /// entry per environment.
    fn send_reset_msg(
        &mut self,
        seeds: Option<&[u64]>,
        options: Option<&[Options]>,
    ) -> Result<ResetResponse>;

    /// Steps every environment with the given actions.
    fn send_action_msg(
        &mut self,
        actions: &Nested<Point>,
        action_spaces: ActionSpaces<'_>,
    ) -> Result<StepResponse>;
}

/// Transport for collecting demonstrations from a policy running in the simulator.
pub trait ImitationProtocol: Protocol {
    /// Starts the rollout with optional per-environment seeds and options.
    fn send_startup_msg(
        &mut self,
        seeds: Option<&[u64]>,
        options: Option<&[Options]>,
    ) -> Result<()>;

    /// Returns the population and spaces.
    fn get_definition(&mut self) -> Result<Definition>;

    /// Returns the next timestep.
    fn get_data(&mut self) -> Result<ImitationData>;
}

macro_rules! forward_protocol {
    ($ty:ty) => {
        impl<T: Lifecycle + ?Sized> Lifecycle for $ty {
            fn start(&mut self) -> Result<()> {
                (**self).start()
            }

            fn close(&mut self) -> Result<()> {
                (**self).close()
            }

            fn is_open(&self) -> bool {
                (**self).is_open()
            }
        }

        impl<T: Properties + ?Sized> Properties for $ty {
            fn properties(&self) -> BTreeMap<String, String> {
                (**self).properties()
            }
        }

        impl<T: Protocol + ?Sized> Protocol for $ty {
            fn kind(&self) -> ProtocolKind {
                (**self).kind()
            }
        }

        impl<T: RlProtocol + ?Sized> RlProtocol for $ty {
            fn send_startup_msg(&mut self, auto_reset: AutoResetType) -> Result<()> {
                (**self).send_startup_msg(auto_reset)
            }

            fn get_definition(&mut self) -> Result<Definition> {
                RlProtocol::get_definition(&mut **self)
            }

            fn send_reset_msg(
                &mut self,
                seeds: Option<&[u64]>,
                options: Option<&[Options]>,
            ) -> Result<ResetResponse> {
                (**self).send_reset_msg(seeds, options)
            }

            fn send_action_msg(
                &mut self,
                actions: &Nested<Point>,
                action_spaces: ActionSpaces<'_>,
            ) -> Result<StepResponse> {
                (**self).send_action_msg(actions, action_spaces)
            }
        }

        impl<T: ImitationProtocol + ?Sized> ImitationProtocol for $ty {
            fn send_startup_msg(
                &mut self,
                seeds: Option<&[u64]>,
                options: Option<&[Options]>,
            ) -> Result<()> {
                ImitationProtocol::send_startup_msg(&mut **self, seeds, options)
            }

            fn get_definition(&mut self) -> Result<Definition> {
                ImitationProtocol::get_definition(&mut **self)
            }

            fn get_data(&mut self) -> Result<ImitationData> {
                (**self).get_data()
            }
        }
    };
}

forward_protocol!(&mut T);
forward_protocol!(Box<T>);
