//! Configuration of [`DataCollector`](crate::DataCollector).
use anyhow::Result;
use schola_core::Options;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`DataCollector`](crate::DataCollector).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataCollectorConfig {
    /// Seed of the rollout.
    pub seed: Option<u64>,

    /// Options of the rollout.
    pub options: Option<Options>,
}

impl DataCollectorConfig {
    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = Some(v);
        self
    }

    /// Sets the options.
    pub fn options(mut self, v: Options) -> Self {
        self.options = Some(v);
        self
    }

    /// Constructs [`DataCollectorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DataCollectorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_serde_data_collector_config() -> Result<()> {
        let mut options = Options::new();
        options.insert("map".to_string(), "Arena".to_string());
        let config = DataCollectorConfig::default().seed(7).options(options);
        let dir = TempDir::new("data_collector_config")?;
        let path = dir.path().join("data_collector_config.yaml");
        config.save(&path)?;
        let config_ = DataCollectorConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
