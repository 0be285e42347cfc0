// src/hardware/recording.rs - In-memory collaborators for tests and simulation
use std::collections::{HashMap, HashSet};

use super::{DriverError, ErrorKind, ErrorReporter, InputSampler, OutputDriver, SamplerError};
use crate::topology::{ChainTypeId, InputTypeId};
use crate::{MAX_OUTPUTS_PER_REGISTER, MAX_PWM_BRIGHTNESS, MAX_REGISTERS_PER_CHAIN};

pub type OutputAddress = (ChainTypeId, u8, u8);

/// Keeps the last level written to every output.
#[derive(Debug, Clone, Default)]
pub struct RecordingDriver {
    levels: HashMap<OutputAddress, u8>,
    writes: u64,
    failing: HashSet<ChainTypeId>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, chain: ChainTypeId, register: u8, output: u8) -> Option<u8> {
        self.levels.get(&(chain, register, output)).copied()
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Makes every write to `chain` fail until cleared.
    pub fn fail_chain(&mut self, chain: ChainTypeId) {
        self.failing.insert(chain);
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }
}

impl OutputDriver for RecordingDriver {
    fn set_level(
        &mut self,
        chain: ChainTypeId,
        register_index: u8,
        output_index: u8,
        level: u8,
    ) -> Result<(), DriverError> {
        if self.failing.contains(&chain) {
            return Err(DriverError::UnknownChain { chain });
        }
        if usize::from(register_index) >= MAX_REGISTERS_PER_CHAIN
            || usize::from(output_index) >= MAX_OUTPUTS_PER_REGISTER
        {
            return Err(DriverError::OutOfRange {
                register: register_index,
                output: output_index,
            });
        }
        if level > MAX_PWM_BRIGHTNESS {
            return Err(DriverError::LevelTooHigh(level));
        }
        self.levels.insert((chain, register_index, output_index), level);
        self.writes += 1;
        Ok(())
    }
}

/// Input levels set by the caller. Unscripted inputs read low.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSampler {
    raw: HashMap<InputTypeId, bool>,
    faults: HashMap<InputTypeId, SamplerError>,
}

impl ScriptedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_raw(&mut self, input: InputTypeId, level: bool) {
        self.raw.insert(input, level);
    }

    pub fn set_fault(&mut self, input: InputTypeId, fault: SamplerError) {
        self.faults.insert(input, fault);
    }

    pub fn clear_fault(&mut self, input: InputTypeId) {
        self.faults.remove(&input);
    }
}

impl InputSampler for ScriptedSampler {
    fn read_raw(&mut self, input: InputTypeId) -> Result<bool, SamplerError> {
        if let Some(fault) = self.faults.get(&input) {
            return Err(*fault);
        }
        Ok(self.raw.get(&input).copied().unwrap_or(false))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub context: u8,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    reports: Vec<ReportedError>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> &[ReportedError] {
        &self.reports
    }

    pub fn count(&self, kind: ErrorKind) -> usize {
        self.reports.iter().filter(|r| r.kind == kind).count()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&mut self, kind: ErrorKind, context: u8, message: &'static str) {
        self.reports.push(ReportedError { kind, context, message });
    }
}
