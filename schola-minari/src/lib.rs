#![warn(missing_docs)]
//! Collection of demonstrations from a policy running in a Schola simulator.
//!
//! [`DataCollector`] pulls timesteps from an [`ImitationProtocol`] and pushes
//! them to an [`OfflineCollector`], the interface of Minari-style dataset
//! collectors. [`EpisodeBuffer`] keeps the episodes in memory and saves them
//! as JSON.
//!
//! ```no_run
//! use schola_core::{local::{testing::CountEnv, LocalImitationProtocol}, InProcessSimulator, Point};
//! use schola_minari::{DataCollector, DataCollectorConfig, EpisodeBuffer};
//!
//! # fn main() -> anyhow::Result<()> {
//! let expert = |_: usize, _: &str, _: &Point| Point::Discrete(1);
//! let protocol = LocalImitationProtocol::new(vec![CountEnv::single(10)], expert);
//! let mut buffer = EpisodeBuffer::default();
//! let mut collector = DataCollector::build(
//!     protocol,
//!     InProcessSimulator::default(),
//!     &mut buffer,
//!     &DataCollectorConfig::default().seed(0),
//! )?;
//! for _ in 0..100 {
//!     collector.step()?;
//! }
//! collector.close()?;
//! drop(collector);
//! buffer.save("episodes.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ImitationProtocol`]: schola_core::ImitationProtocol
mod buffer;
mod collector;
mod config;
pub use buffer::{Episode, EpisodeBuffer, OfflineCollector, Transition};
pub use collector::DataCollector;
pub use config::DataCollectorConfig;
