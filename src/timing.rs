//! Per-output rise/hold/fall envelope.
//!
//! An [`Envelope`] never sleeps or counts calls: every query recomputes the
//! phase and level from the time passed in, so a late or irregular poll lands
//! on the same level a regular one would have.

use serde::Serialize;

use crate::Millis;
use crate::topology::{OutputBehavior, OutputType, OutputTypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Rising,
    Holding,
    Falling,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    output_type_id: OutputTypeId,
    behavior: OutputBehavior,
    times: [u32; 3],
    sensor_start: Millis,
    sensor_offset: Millis,
    phase: Phase,
    /// Clock time of the last recompute.
    anchor: Millis,
    /// Time already spent in the current phase at `anchor`.
    carried: Millis,
    fall_from: u8,
    level: u8,
    busy_since: Option<Millis>,
}

impl Envelope {
    pub fn new(output: &OutputType) -> Self {
        Self {
            output_type_id: output.id,
            behavior: output.behavior,
            times: output.times,
            sensor_start: Millis::from(output.sensor_start_time),
            sensor_offset: Millis::from(output.sensor_offset_time),
            phase: Phase::Idle,
            anchor: 0,
            carried: 0,
            fall_from: 0,
            level: 0,
            busy_since: None,
        }
    }

    pub fn output_type_id(&self) -> OutputTypeId {
        self.output_type_id
    }

    /// Where in the cycle an input-triggered activation enters.
    pub fn sensor_start(&self) -> Millis {
        self.sensor_start
    }

    /// Delay between an input assertion and the activation it triggers.
    pub fn sensor_offset(&self) -> Millis {
        self.sensor_offset
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Level as of the last `advance`/`activate`/`deactivate`.
    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Idle
    }

    /// When the envelope last left `Idle`. Re-triggering does not move it.
    pub fn busy_since(&self) -> Option<Millis> {
        self.busy_since
    }

    /// Starts a new cycle from the beginning of the rise, whatever the
    /// current phase.
    pub fn activate(&mut self, now: Millis) -> u8 {
        self.activate_from(now, 0)
    }

    /// Starts a new cycle as if it had begun `start_offset` ms before `now`.
    pub fn activate_from(&mut self, now: Millis, start_offset: Millis) -> u8 {
        if self.phase == Phase::Idle {
            self.busy_since = Some(now);
        }
        self.phase = Phase::Rising;
        self.anchor = now;
        self.carried = start_offset;
        self.advance(now)
    }

    /// Cuts a rise or hold short and starts falling from the current level.
    /// A fall already in progress is left alone.
    pub fn deactivate(&mut self, now: Millis) -> u8 {
        self.advance(now);
        if matches!(self.phase, Phase::Rising | Phase::Holding) {
            self.fall_from = self.level;
            self.phase = Phase::Falling;
            self.anchor = now;
            self.carried = 0;
            self.level = self.level_at(0);
        }
        self.level
    }

    /// Immediate return to `Idle` at level 0.
    pub fn force_idle(&mut self) {
        self.phase = Phase::Idle;
        self.carried = 0;
        self.level = 0;
        self.busy_since = None;
    }

    /// Recomputes phase and level for `now`. A clock that went backwards
    /// counts as no time passing.
    pub fn advance(&mut self, now: Millis) -> u8 {
        if self.phase == Phase::Idle {
            self.level = 0;
            return 0;
        }

        let mut elapsed = self.carried + now.saturating_sub(self.anchor);
        loop {
            let duration = match self.phase {
                Phase::Idle => break,
                Phase::Rising => self.times[OutputType::RISE],
                Phase::Holding => self.times[OutputType::HOLD],
                Phase::Falling => self.times[OutputType::FALL],
            };
            let duration = Millis::from(duration);
            if elapsed < duration {
                break;
            }
            elapsed -= duration;
            self.phase = match self.phase {
                Phase::Rising => Phase::Holding,
                Phase::Holding => {
                    self.fall_from = self.behavior.peak();
                    Phase::Falling
                }
                Phase::Falling | Phase::Idle => Phase::Idle,
            };
        }

        if self.phase == Phase::Idle {
            self.force_idle();
        } else {
            self.anchor = now.max(self.anchor);
            self.carried = elapsed;
            self.level = self.level_at(elapsed);
        }
        self.level
    }

    fn level_at(&self, elapsed: Millis) -> u8 {
        let peak = self.behavior.peak();
        match (self.phase, self.behavior) {
            (Phase::Idle, _) => 0,
            (Phase::Holding, _) => peak,
            (Phase::Rising, OutputBehavior::Binary { .. }) => peak,
            (Phase::Falling, OutputBehavior::Binary { .. }) => 0,
            (Phase::Rising, OutputBehavior::Dimmable { .. }) => {
                let rise = Millis::from(self.times[OutputType::RISE]);
                scale(peak, elapsed, rise)
            }
            (Phase::Falling, OutputBehavior::Dimmable { .. }) => {
                let fall = Millis::from(self.times[OutputType::FALL]);
                scale(self.fall_from, fall.saturating_sub(elapsed), fall)
            }
        }
    }
}

/// `level * part / whole`, clamped to `level`.
fn scale(level: u8, part: Millis, whole: Millis) -> u8 {
    if whole == 0 {
        return level;
    }
    let scaled = u64::from(level) * part.min(whole) / whole;
    scaled as u8
}
