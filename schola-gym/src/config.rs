//! Configuration of [`GymVectorEnv`](crate::GymVectorEnv).
use anyhow::Result;
use schola_core::AutoResetType;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`GymVectorEnv`](crate::GymVectorEnv).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GymVectorEnvConfig {
    /// Auto-reset policy declared to the simulator.
    pub autoreset_mode: AutoResetType,
}

impl Default for GymVectorEnvConfig {
    fn default() -> Self {
        Self {
            autoreset_mode: AutoResetType::SameStep,
        }
    }
}

impl GymVectorEnvConfig {
    /// Sets the auto-reset policy.
    pub fn autoreset_mode(mut self, v: AutoResetType) -> Self {
        self.autoreset_mode = v;
        self
    }

    /// Constructs [`GymVectorEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GymVectorEnvConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
