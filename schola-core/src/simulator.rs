//! Lifecycle of the process hosting the environments.
mod unreal;
pub use unreal::{UnrealEditor, UnrealExecutable, UnrealExecutableConfig};

use crate::protocol::ProtocolKind;
use anyhow::Result;
use std::collections::BTreeMap;

/// A simulator that is started before and stopped after a protocol session.
pub trait Simulator {
    /// Starts the simulator. `properties` come from the protocol, e.g. the port to listen on.
    fn start(&mut self, properties: &BTreeMap<String, String>) -> Result<()>;

    /// Stops the simulator.
    fn stop(&mut self) -> Result<()>;

    /// Returns `true` while the simulator runs.
    fn is_running(&self) -> bool;

    /// Protocol families the simulator can be driven through.
    fn supported_protocols(&self) -> &[ProtocolKind];

    /// Returns `true` if `kind` is in [`Simulator::supported_protocols`].
    fn supports(&self, kind: ProtocolKind) -> bool {
        self.supported_protocols().contains(&kind)
    }
}

impl<T: Simulator + ?Sized> Simulator for &mut T {
    fn start(&mut self, properties: &BTreeMap<String, String>) -> Result<()> {
        (**self).start(properties)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn supported_protocols(&self) -> &[ProtocolKind] {
        (**self).supported_protocols()
    }
}

impl<T: Simulator + ?Sized> Simulator for Box<T> {
    fn start(&mut self, properties: &BTreeMap<String, String>) -> Result<()> {
        (**self).start(properties)
    }

    fn stop(&mut self) -> Result<()> {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn supported_protocols(&self) -> &[ProtocolKind] {
        (**self).supported_protocols()
    }
}

/// Simulator for environments running in the current process.
///
/// There is no process to manage; the simulator only records whether it was started.
#[derive(Debug, Default, Clone)]
pub struct InProcessSimulator {
    running: bool,
    starts: usize,
    stops: usize,
}

impl InProcessSimulator {
    /// Number of calls to [`Simulator::start`].
    pub fn starts(&self) -> usize {
        self.starts
    }

    /// Number of calls to [`Simulator::stop`].
    pub fn stops(&self) -> usize {
        self.stops
    }
}

impl Simulator for InProcessSimulator {
    fn start(&mut self, _properties: &BTreeMap<String, String>) -> Result<()> {
        self.running = true;
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        self.stops += 1;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn supported_protocols(&self) -> &[ProtocolKind] {
        &[ProtocolKind::InProcess]
    }
}
