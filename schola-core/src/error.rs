//! Errors in the library.
use thiserror::Error;

/// Kind of space reported in [`ScholaError::SpaceMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Action space.
    Action,

    /// Observation space.
    Observation,
}

impl std::fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Action => write!(f, "Action"),
            Self::Observation => write!(f, "Observation"),
        }
    }
}

/// Errors in the library.
#[derive(Error, Debug)]
pub enum ScholaError {
    /// The simulator reported no environment.
    #[error("Connected to Unreal successfully but received no Environment Definitions. Check that there is an environment object in your map.")]
    NoEnvironments,

    /// An environment was reported without any agent.
    #[error("Connected to Unreal successfully but Env:{0} has no agents. Please register at least one agent to each environment.")]
    NoAgents(usize),

    /// An agent does not share the space of the first agent.
    #[error("{kind} Space Mismatch on Agent:{agent_id} in Env {env_id}.\nGot: {got}\nExpected:{expected}")]
    SpaceMismatch {
        /// Which space differs.
        kind: SpaceKind,
        /// Environment of the offending agent.
        env_id: usize,
        /// Offending agent.
        agent_id: String,
        /// Space of the offending agent.
        got: String,
        /// Space of the first agent.
        expected: String,
    },

    /// A space of the definition contains no point.
    #[error("{kind} Space of Agent:{agent_id} in Env {env_id} is empty: {space}")]
    EmptySpace {
        /// Which space is empty.
        kind: SpaceKind,
        /// Environment of the offending agent.
        env_id: usize,
        /// Offending agent.
        agent_id: String,
        /// The empty space.
        space: String,
    },

    /// The population does not have the number of pairs an adapter requires.
    #[error("{0}")]
    WrongArity(String),

    /// Runtime contract violation reported by an adapter.
    #[error("{0}")]
    Environment(String),

    /// The simulator can not be driven through the given protocol.
    #[error("{0}")]
    UnsupportedProtocol(String),

    /// Operation not supported by the adapter.
    #[error("{0}")]
    NotImplemented(String),

    /// An environment was stepped after its episode ended without a reset.
    #[error("Env {0} was stepped after its episode ended. Reset it first or enable auto-reset.")]
    StepAfterEpisodeEnd(usize),

    /// A nested id that is not part of the definition.
    #[error("Unknown id: agent {agent_id} in env {env_id}")]
    UnknownId {
        /// Environment id.
        env_id: usize,
        /// Agent id.
        agent_id: String,
    },

    /// A flat index outside of `[0, num_ids)`.
    #[error("Flat index {uid} is out of range for {num_ids} ids")]
    FlatIndexOutOfRange {
        /// Requested flat index.
        uid: usize,
        /// Number of ids.
        num_ids: usize,
    },

    /// The protocol has not been started or was closed.
    #[error("Protocol is not open")]
    ProtocolClosed,

    /// Reset or step was requested before the startup message.
    #[error("Startup message has not been sent")]
    StartupNotSent,

    /// An action does not belong to its action space.
    #[error("Invalid action for agent {agent_id} in env {env_id}: {reason}")]
    InvalidAction {
        /// Environment id.
        env_id: usize,
        /// Agent id.
        agent_id: String,
        /// What went wrong.
        reason: String,
    },

    /// A seed or option list whose length does not match the number of environments.
    #[error("Expected {expected} seeds or options, got {got}")]
    InvalidSeeds {
        /// Required length.
        expected: usize,
        /// Given length.
        got: usize,
    },

    /// Points can not be batched or unbatched with the given space.
    #[error("Batch error: {0}")]
    Batch(String),

    /// The simulator was started twice.
    #[error("Simulator is already running")]
    SimulatorAlreadyRunning,

    /// The simulator process exited unexpectedly.
    #[error("Simulator crashed: {0}")]
    SimulatorCrashed(String),
}
