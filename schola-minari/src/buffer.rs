//! Push interface of offline dataset collectors and an in-memory implementation.
use anyhow::Result;
use log::debug;
use schola_core::{Info, Point, ScholaError};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// One timestep pushed to an [`OfflineCollector`].
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Action taken by the policy.
    pub action: Point,

    /// Observation after the action.
    pub observation: Point,

    /// Reward.
    pub reward: f32,

    /// `true` if the episode reached a terminal state.
    pub terminated: bool,

    /// `true` if the episode was cut short.
    pub truncated: bool,

    /// Info.
    pub info: Info,
}

/// Receives episodes one call at a time.
pub trait OfflineCollector {
    /// Starts an episode from its first observation.
    fn reset(&mut self, observation: Point, info: Info) -> Result<()>;

    /// Appends a timestep to the current episode.
    fn step(&mut self, transition: Transition) -> Result<()>;
}

impl<T: OfflineCollector + ?Sized> OfflineCollector for &mut T {
    fn reset(&mut self, observation: Point, info: Info) -> Result<()> {
        (**self).reset(observation, info)
    }

    fn step(&mut self, transition: Transition) -> Result<()> {
        (**self).step(transition)
    }
}

/// A recorded episode.
///
/// `observations` holds one more entry than the other fields: the first
/// observation comes from the reset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Episode {
    /// Observations.
    pub observations: Vec<Point>,

    /// Actions.
    pub actions: Vec<Point>,

    /// Rewards.
    pub rewards: Vec<f32>,

    /// Terminal flags.
    pub terminations: Vec<bool>,

    /// Truncation flags.
    pub truncations: Vec<bool>,

    /// Infos, the first one from the reset.
    pub infos: Vec<Info>,
}

impl Episode {
    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if no step was recorded.
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Returns `true` if the last step ended the episode.
    pub fn is_done(&self) -> bool {
        self.terminations.last().copied().unwrap_or(false)
            || self.truncations.last().copied().unwrap_or(false)
    }
}

/// Keeps the collected episodes in memory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EpisodeBuffer {
    episodes: Vec<Episode>,
}

impl EpisodeBuffer {
    /// Recorded episodes, the last one possibly unfinished.
    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// Number of timesteps over all episodes.
    pub fn num_transitions(&self) -> usize {
        self.episodes.iter().map(Episode::len).sum()
    }

    /// Saves the episodes as JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, &self)?;
        Ok(())
    }

    /// Loads episodes saved with [`EpisodeBuffer::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let rdr = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(rdr)?)
    }
}

impl OfflineCollector for EpisodeBuffer {
    fn reset(&mut self, observation: Point, info: Info) -> Result<()> {
        if let Some(episode) = self.episodes.last() {
            if !episode.is_done() {
                debug!("Episode {} left unfinished", self.episodes.len() - 1);
            }
        }
        self.episodes.push(Episode {
            observations: vec![observation],
            infos: vec![info],
            ..Default::default()
        });
        Ok(())
    }

    fn step(&mut self, transition: Transition) -> Result<()> {
        let episode = match self.episodes.last_mut() {
            Some(episode) if !episode.is_done() => episode,
            _ => {
                return Err(ScholaError::Environment(
                    "step called before the episode was reset".to_string(),
                )
                .into())
            }
        };
        episode.observations.push(transition.observation);
        episode.actions.push(transition.action);
        episode.rewards.push(transition.reward);
        episode.terminations.push(transition.terminated);
        episode.truncations.push(transition.truncated);
        episode.infos.push(transition.info);
        Ok(())
    }
}
