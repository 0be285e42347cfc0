// src/hardware/pins.rs - Controller board pin map

use serde::Serialize;

use crate::MAX_CHAINS_PER_NODE;

/// Digital pins on the Simons Stack controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DigitalPin {
    Rx = 0,
    Tx,
    /// RS-485 driver enable.
    De,
    LedR,
    LedY,
    SinLo,
    SinHi,
    ClkHi,
    ClkMd,
    ClkLo,
    Latch,
    Sout,
    Sin,
    Clk,
}

/// Analog sense inputs, one per chain slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnalogPin {
    Sns1 = 0,
    Sns2,
    Sns3,
    Sns4,
    Sns5,
    Sns6,
}

const SENSE_PINS: [AnalogPin; MAX_CHAINS_PER_NODE] = [
    AnalogPin::Sns1,
    AnalogPin::Sns2,
    AnalogPin::Sns3,
    AnalogPin::Sns4,
    AnalogPin::Sns5,
    AnalogPin::Sns6,
];

impl AnalogPin {
    /// Sense pin wired to the chain in `slot` of a node.
    pub fn for_chain_slot(slot: usize) -> Option<AnalogPin> {
        SENSE_PINS.get(slot).copied()
    }
}

impl DigitalPin {
    pub fn number(self) -> u8 {
        self as u8
    }
}

/// The yellow LED pin doubles as the node address sense line.
pub const ADDRESS_PIN: DigitalPin = DigitalPin::LedY;
/// Receive enable shares the red LED pin.
pub const RE: DigitalPin = DigitalPin::LedR;
/// LEDs that flash error codes.
pub const ERROR_LED_PINS: [DigitalPin; 1] = [DigitalPin::LedR];
