//! Connection to a simulator shared by the framework adapters.
use crate::{
    error::{ScholaError, SpaceKind},
    protocol::{Definition, Protocol},
    simulator::Simulator,
    AgentId, IdManager, Space,
};
use anyhow::Result;
use log::{info, warn};

#[cfg_attr(doc, aquamarine::aquamarine)]
/// A protocol and the simulator it talks to.
///
/// Every framework adapter owns one session and drives it in a fixed order:
///
/// ```mermaid
/// sequenceDiagram
///     participant A as Adapter
///     participant P as Protocol
///     participant S as Simulator
///     A->>P: start
///     A->>S: start(properties)
///     A->>P: send_startup_msg
///     A->>P: get_definition
///     loop training
///         A->>P: send_reset_msg / send_action_msg
///     end
///     A->>P: close
///     A->>S: stop
/// ```
///
/// If the definition is rejected while the adapter is built, the session is
/// torn down with [`Session::guard`] before the error is returned, so no
/// connection or process outlives a failed construction.
pub struct Session<P: Protocol, S: Simulator> {
    protocol: P,
    simulator: S,
}

impl<P: Protocol, S: Simulator> Session<P, S> {
    /// Starts the protocol, then the simulator with the protocol's properties.
    ///
    /// Fails with [`ScholaError::UnsupportedProtocol`] if the simulator can not
    /// be driven through `protocol`. Nothing is started in that case.
    pub fn connect(mut protocol: P, mut simulator: S) -> Result<Self> {
        if !simulator.supports(protocol.kind()) {
            return Err(ScholaError::UnsupportedProtocol(format!(
                "Protocol {:?} is not supported by the simulator, expected one of {:?}.",
                protocol.kind(),
                simulator.supported_protocols()
            ))
            .into());
        }

        info!("...Starting Protocol and Simulator");
        if !protocol.is_open() {
            protocol.start()?;
        }
        let mut session = Self {
            protocol,
            simulator,
        };
        let properties = session.protocol.properties();
        let started = session.simulator.start(&properties);
        session.guard(started)?;
        Ok(session)
    }

    /// The protocol.
    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    /// The protocol, mutably.
    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    /// The simulator.
    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Tears the session down if `result` is an error, then returns `result`.
    ///
    /// Errors raised while tearing down are logged and dropped so the
    /// original error reaches the caller.
    pub fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(e) = self.protocol.close() {
                warn!("Failed to close the protocol: {}", e);
            }
            if let Err(e) = self.simulator.stop() {
                warn!("Failed to stop the simulator: {}", e);
            }
        }
        result
    }

    /// Closes the protocol, then stops the simulator.
    pub fn close(&mut self) -> Result<()> {
        info!("... closing environment");
        self.protocol.close()?;
        self.simulator.stop()
    }

    /// Returns the protocol and the simulator.
    pub fn into_parts(self) -> (P, S) {
        (self.protocol, self.simulator)
    }
}

/// Rejects an empty population and environments without agents.
pub fn validate_population(ids: &[Vec<AgentId>]) -> Result<()> {
    if ids.is_empty() {
        return Err(ScholaError::NoEnvironments.into());
    }
    match ids.iter().position(Vec::is_empty) {
        Some(env_id) => Err(ScholaError::NoAgents(env_id).into()),
        None => Ok(()),
    }
}

/// Runs [`validate_population`], then rejects [empty](Space::is_empty)
/// spaces, action spaces first.
pub fn validate_definition(definition: &Definition) -> Result<()> {
    validate_population(&definition.ids)?;
    for (kind, spaces) in [
        (SpaceKind::Action, &definition.action_spaces),
        (SpaceKind::Observation, &definition.observation_spaces),
    ]
    .iter()
    {
        for (env_id, agents) in spaces.iter() {
            if let Some((agent_id, space)) = agents.iter().find(|(_, s)| s.is_empty()) {
                return Err(ScholaError::EmptySpace {
                    kind: *kind,
                    env_id: *env_id,
                    agent_id: agent_id.clone(),
                    space: space.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

fn lookup<'a>(
    definition: &'a Definition,
    kind: SpaceKind,
    env_id: usize,
    agent_id: &str,
) -> Result<&'a Space> {
    let spaces = match kind {
        SpaceKind::Action => &definition.action_spaces,
        SpaceKind::Observation => &definition.observation_spaces,
    };
    spaces
        .get(&env_id)
        .and_then(|agents| agents.get(agent_id))
        .ok_or_else(|| {
            ScholaError::UnknownId {
                env_id,
                agent_id: agent_id.to_string(),
            }
            .into()
        })
}

/// Returns the observation and action space shared by every pair.
///
/// Each pair is compared against the first pair of `id_manager`, action space
/// first. The first mismatch fails with [`ScholaError::SpaceMismatch`].
/// The population must have passed [`validate_population`].
pub fn uniform_spaces(id_manager: &IdManager, definition: &Definition) -> Result<(Space, Space)> {
    let (first_env, first_agent) = id_manager.to_nested(0)?;
    let obs_space = lookup(definition, SpaceKind::Observation, first_env, first_agent)?;
    let action_space = lookup(definition, SpaceKind::Action, first_env, first_agent)?;

    for (env_id, agent_id) in id_manager.id_list().iter() {
        for (kind, expected) in [
            (SpaceKind::Action, action_space),
            (SpaceKind::Observation, obs_space),
        ]
        .iter()
        {
            let got = lookup(definition, *kind, *env_id, agent_id)?;
            if got != *expected {
                return Err(ScholaError::SpaceMismatch {
                    kind: *kind,
                    env_id: *env_id,
                    agent_id: agent_id.clone(),
                    got: got.to_string(),
                    expected: expected.to_string(),
                }
                .into());
            }
        }
    }
    Ok((obs_space.clone(), action_space.clone()))
}
