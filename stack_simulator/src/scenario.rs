//! # Simulation Scenarios
//!
//! A scenario names the node to simulate, how long to run it and what
//! happens to its inputs along the way.
//!
//! ```toml
//! [simulation]
//! address = 1
//! duration_ms = 20000
//! step_ms = 5
//! output = "sim_output/levels.csv"
//! random_trigger_rate = 0.0005
//! seed = 7
//!
//! [[sensor]]
//! at_ms = 1000
//! input_type_id = 2
//! asserted = true
//!
//! [[push]]
//! at_ms = 500
//! masks = [15, 0]
//! ```
use serde::Deserialize;

use simons_stack::Millis;
use simons_stack::topology::InputTypeId;

use crate::SimError;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub sensor: Vec<SensorEvent>,
    #[serde(default)]
    pub push: Vec<PushEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub address: u8,
    pub duration_ms: Millis,
    #[serde(default = "default_step_ms")]
    pub step_ms: Millis,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default)]
    pub time_delta_override_ms: Option<u32>,
    #[serde(default)]
    pub timeout_override_ms: Option<u32>,
    /// Chance per step that a released input is pressed.
    #[serde(default)]
    pub random_trigger_rate: f64,
    /// How long a random press is held.
    #[serde(default = "default_random_hold_ms")]
    pub random_hold_ms: Millis,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorEvent {
    pub at_ms: Millis,
    pub input_type_id: InputTypeId,
    pub asserted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    pub at_ms: Millis,
    pub masks: Vec<u32>,
}

fn default_step_ms() -> Millis { 5 }
fn default_output() -> String { "sim_output/levels.csv".to_string() }
fn default_random_hold_ms() -> Millis { 500 }

impl Scenario {
    pub fn from_toml(contents: &str) -> Result<Self, SimError> {
        let scenario: Scenario = toml::from_str(contents)?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &str) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!("Failed to read scenario '{}': {}", path, e);
            SimError::Io(e)
        })?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), SimError> {
        let sim = &self.simulation;
        if sim.step_ms == 0 {
            return Err(SimError::Scenario("step_ms must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&sim.random_trigger_rate) {
            return Err(SimError::Scenario(format!(
                "random_trigger_rate {} is not a probability",
                sim.random_trigger_rate
            )));
        }
        if sim.time_delta_override_ms == Some(0) || sim.timeout_override_ms == Some(0) {
            return Err(SimError::Scenario("timing overrides must be > 0".to_string()));
        }
        if let Some(push) = self.push.iter().find(|p| p.masks.len() > simons_stack::MAX_CHAINS_PER_NODE) {
            return Err(SimError::Scenario(format!(
                "push at {} ms carries {} masks",
                push.at_ms,
                push.masks.len()
            )));
        }
        Ok(())
    }
}
