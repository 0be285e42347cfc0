// src/hardware/logging.rs - Collaborators that report through tracing
use std::collections::HashMap;

use super::pins::ERROR_LED_PINS;
use super::{DriverError, ErrorKind, ErrorReporter, OutputDriver};
use crate::topology::ChainTypeId;
use crate::{MAX_OUTPUTS_PER_REGISTER, MAX_PWM_BRIGHTNESS, MAX_REGISTERS_PER_CHAIN};

/// Driver for hosts without register hardware attached. Level changes are
/// traced and each chain's on/off state is kept as the bytes that would be
/// shifted out.
#[derive(Debug, Clone, Default)]
pub struct LoggingDriver {
    levels: HashMap<(ChainTypeId, u8, u8), u8>,
    images: HashMap<ChainTypeId, [u8; MAX_REGISTERS_PER_CHAIN]>,
}

impl LoggingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for `chain`, first register first. Bit n is set while
    /// output n is lit.
    pub fn register_image(&self, chain: ChainTypeId) -> [u8; MAX_REGISTERS_PER_CHAIN] {
        self.images.get(&chain).copied().unwrap_or_default()
    }
}

impl OutputDriver for LoggingDriver {
    fn set_level(
        &mut self,
        chain: ChainTypeId,
        register_index: u8,
        output_index: u8,
        level: u8,
    ) -> Result<(), DriverError> {
        let register = usize::from(register_index);
        if register >= MAX_REGISTERS_PER_CHAIN || usize::from(output_index) >= MAX_OUTPUTS_PER_REGISTER {
            return Err(DriverError::OutOfRange {
                register: register_index,
                output: output_index,
            });
        }
        if level > MAX_PWM_BRIGHTNESS {
            return Err(DriverError::LevelTooHigh(level));
        }

        let previous = self.levels.insert((chain, register_index, output_index), level);
        if previous != Some(level) {
            tracing::trace!(chain, register = register_index, output = output_index, level, "Output level");
        }

        let image = self.images.entry(chain).or_default();
        let bit = 1u8 << output_index;
        if level > 0 {
            image[register] |= bit;
        } else {
            image[register] &= !bit;
        }
        Ok(())
    }
}

/// Logs every fault together with the LED flash code the board would show.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter {
    counts: HashMap<ErrorKind, u64>,
}

impl TracingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

impl ErrorReporter for TracingReporter {
    fn report(&mut self, kind: ErrorKind, context: u8, message: &'static str) {
        *self.counts.entry(kind).or_insert(0) += 1;
        let led = ERROR_LED_PINS[0].number();
        match kind {
            ErrorKind::Program | ErrorKind::Cycle => {
                tracing::error!(?kind, flashes = kind.code(), led, context, "{}", message)
            }
            _ => tracing::warn!(?kind, flashes = kind.code(), led, context, "{}", message),
        }
    }
}
