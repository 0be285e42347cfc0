//! Offline simulator for a single Simons Stack node: replays a scenario of
//! input changes and pushed states against the builtin rig on a simulated
//! clock and traces every output level change.

pub mod scenario;
pub mod simulator;
pub mod trace;

use thiserror::Error;

use simons_stack::RigError;

pub use scenario::Scenario;
pub use simulator::{SimReport, Simulator};
pub use trace::{LevelRecord, TraceDriver, TraceWriter};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Rig error: {0}")]
    Rig(#[from] RigError),
    #[error("Invalid scenario: {0}")]
    Scenario(String),
}
