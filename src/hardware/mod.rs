// src/hardware/mod.rs - Collaborator interfaces the node controller drives
pub mod logging;
pub mod pins;
pub mod recording;

use serde::Serialize;
use thiserror::Error;

use crate::topology::{ChainTypeId, InputTypeId};

pub use logging::{LoggingDriver, TracingReporter};
pub use recording::{RecordingDriver, RecordingReporter, ReportedError, ScriptedSampler};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("chain {chain} is not wired to this controller")]
    UnknownChain { chain: ChainTypeId },
    #[error("register {register} output {output} is out of range")]
    OutOfRange { register: u8, output: u8 },
    #[error("level {0} exceeds the PWM ceiling")]
    LevelTooHigh(u8),
    #[error("Driver error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SamplerError {
    /// A switch input read back an impossible state.
    #[error("switch reading implausible")]
    Switch,
    /// A sensor input produced no usable reading.
    #[error("sensor reading missing")]
    Sensor,
}

/// Fault categories, numbered by the flash count used on the board's error LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Program = 1,
    Switch,
    Sensor,
    Cycle,
    Default,
    Comm,
    Neighbour,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::Program,
        ErrorKind::Switch,
        ErrorKind::Sensor,
        ErrorKind::Cycle,
        ErrorKind::Default,
        ErrorKind::Comm,
        ErrorKind::Neighbour,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<SamplerError> for ErrorKind {
    fn from(err: SamplerError) -> Self {
        match err {
            SamplerError::Switch => ErrorKind::Switch,
            SamplerError::Sensor => ErrorKind::Sensor,
        }
    }
}

/// Writes a level to one physical output.
pub trait OutputDriver {
    fn set_level(
        &mut self,
        chain: ChainTypeId,
        register_index: u8,
        output_index: u8,
        level: u8,
    ) -> Result<(), DriverError>;
}

/// Reports the raw logic level of an input. Polarity is applied by the caller.
pub trait InputSampler {
    fn read_raw(&mut self, input: InputTypeId) -> Result<bool, SamplerError>;
}

/// Out-of-band fault channel; on the controller board this flashes an LED.
pub trait ErrorReporter {
    fn report(&mut self, kind: ErrorKind, context: u8, message: &'static str);
}
