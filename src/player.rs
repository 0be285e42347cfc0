//! Pattern playback for one chain, with input-triggered overlay.
//!
//! The player walks the pattern store on a fixed frame period. Entering a
//! frame activates every output whose bit is set and lets every other output
//! fall. While the chain's input is asserted, the positions in the chain's
//! overlay mask are taken away from the pattern and cycled by the input
//! instead; they are handed back once the input is released and their last
//! cycle has run out.

use serde::Serialize;

use crate::Millis;
use crate::pattern::PatternStore;
use crate::timing::{Envelope, Phase};

/// Chain input after polarity correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputReading {
    Asserted,
    Released,
    /// No trustworthy reading this cycle.
    Faulted,
}

impl InputReading {
    pub fn from_level(asserted: bool) -> Self {
        if asserted {
            InputReading::Asserted
        } else {
            InputReading::Released
        }
    }
}

/// Activates the `set` positions and deactivates the `clear` positions.
/// Positions without an output are skipped.
pub fn drive_mask(now: Millis, set: u32, clear: u32, outputs: &mut [Option<Envelope>]) {
    for (position, slot) in outputs.iter_mut().enumerate().take(32) {
        let Some(envelope) = slot else { continue };
        let bit = 1u32 << position;
        if set & bit != 0 {
            envelope.activate(now);
        } else if clear & bit != 0 {
            envelope.deactivate(now);
        }
    }
}

/// Bitmask of positions that carry an output.
pub fn populated_mask(outputs: &[Option<Envelope>]) -> u32 {
    outputs
        .iter()
        .enumerate()
        .take(32)
        .filter(|(_, slot)| slot.is_some())
        .fold(0, |mask, (position, _)| mask | (1 << position))
}

#[derive(Debug, Clone)]
pub struct PatternPlayer {
    chain_slot: usize,
    do_overlay: u32,
    time_delta: Millis,
    cycle_start: Millis,
    /// Frame periods since `cycle_start` at the last frame entry.
    current_step: Option<u64>,
    current_frame: Option<usize>,
    overlay_active: u32,
    asserted_since: Option<Millis>,
    suppressed: bool,
}

impl PatternPlayer {
    /// `chain_slot` selects the chain's column in each pattern frame.
    pub fn new(chain_slot: usize, do_overlay: u32, time_delta: Millis, now: Millis) -> Self {
        Self {
            chain_slot,
            do_overlay,
            time_delta,
            cycle_start: now,
            current_step: None,
            current_frame: None,
            overlay_active: 0,
            asserted_since: None,
            suppressed: false,
        }
    }

    pub fn current_frame(&self) -> Option<usize> {
        self.current_frame
    }

    /// Positions currently driven by the overlay rather than the pattern.
    pub fn overlay_mask(&self) -> u32 {
        self.overlay_active
    }

    /// Assertion time of the input while it holds overlay positions.
    pub fn overlay_held_since(&self) -> Option<Millis> {
        if self.overlay_active == 0 {
            return None;
        }
        self.asserted_since
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Starts the pattern again from frame 0 and drops all overlay state.
    pub fn restart(&mut self, now: Millis) {
        self.cycle_start = now;
        self.current_step = None;
        self.current_frame = None;
        self.overlay_active = 0;
        self.asserted_since = None;
    }

    /// Ignores the input until it has been seen released once.
    pub fn suppress_overlay_until_release(&mut self) {
        self.suppressed = true;
        self.overlay_active = 0;
        self.asserted_since = None;
    }

    pub fn tick(
        &mut self,
        now: Millis,
        input: InputReading,
        patterns: &PatternStore,
        outputs: &mut [Option<Envelope>],
    ) {
        let populated = populated_mask(outputs);

        match input {
            InputReading::Asserted if !self.suppressed => {
                if self.asserted_since.is_none() {
                    tracing::debug!(chain_slot = self.chain_slot, now, "Overlay input asserted");
                    self.asserted_since = Some(now);
                }
            }
            InputReading::Released => {
                if self.asserted_since.take().is_some() {
                    tracing::debug!(chain_slot = self.chain_slot, now, "Overlay input released");
                }
                self.suppressed = false;
            }
            _ => {}
        }

        let overlay_live =
            input == InputReading::Asserted && !self.suppressed && self.do_overlay & populated != 0;

        if !overlay_live {
            self.release_finished_overlay(outputs);
        } else if let Some(since) = self.asserted_since {
            self.run_overlay(now, since, populated, outputs);
        }

        // a new period re-enters its frame even when the index is unchanged
        let step = PatternStore::step_at(now.saturating_sub(self.cycle_start), self.time_delta);
        if self.current_step != Some(step) {
            let frame = patterns.frame_for_step(step);
            self.current_step = Some(step);
            self.current_frame = Some(frame);
            let pattern_owned = populated & !self.overlay_active;
            let mask = patterns.mask(frame, self.chain_slot) & pattern_owned;
            tracing::debug!(chain_slot = self.chain_slot, frame, mask, "Entering frame");
            drive_mask(now, mask, pattern_owned & !mask, outputs);
        }
    }

    fn run_overlay(
        &mut self,
        now: Millis,
        since: Millis,
        populated: u32,
        outputs: &mut [Option<Envelope>],
    ) {
        let candidates = self.do_overlay & populated;
        for (position, slot) in outputs.iter_mut().enumerate().take(32) {
            let bit = 1u32 << position;
            if candidates & bit == 0 {
                continue;
            }
            let Some(envelope) = slot else { continue };
            if now.saturating_sub(since) < envelope.sensor_offset() {
                continue;
            }
            let newly_claimed = self.overlay_active & bit == 0;
            self.overlay_active |= bit;
            match envelope.phase() {
                // a fall in progress runs out before the overlay takes over
                Phase::Falling => {}
                Phase::Idle => {
                    envelope.activate_from(now, envelope.sensor_start());
                }
                Phase::Rising | Phase::Holding if newly_claimed => {
                    envelope.activate_from(now, envelope.sensor_start());
                }
                Phase::Rising | Phase::Holding => {}
            }
        }
    }

    fn release_finished_overlay(&mut self, outputs: &[Option<Envelope>]) {
        if self.overlay_active == 0 {
            return;
        }
        for (position, slot) in outputs.iter().enumerate().take(32) {
            let bit = 1u32 << position;
            if self.overlay_active & bit == 0 {
                continue;
            }
            if slot.as_ref().is_none_or(|envelope| envelope.is_idle()) {
                self.overlay_active &= !bit;
                tracing::debug!(chain_slot = self.chain_slot, position, "Overlay position handed back");
            }
        }
    }
}
