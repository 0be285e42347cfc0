// Output-level trace: a driver that remembers what changed, and its CSV sink
use std::collections::HashMap;
use std::io::Write;

use csv::Writer;
use serde::Serialize;

use simons_stack::topology::ChainTypeId;
use simons_stack::{DriverError, MAX_PWM_BRIGHTNESS, Millis, OutputDriver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelRecord {
    pub t_ms: Millis,
    pub chain_id: ChainTypeId,
    pub register: u8,
    pub output: u8,
    pub level: u8,
}

/// Driver that queues a record whenever an output's level differs from the
/// last one written. The first write to an output always counts as a change.
#[derive(Debug, Default)]
pub struct TraceDriver {
    now: Millis,
    levels: HashMap<(ChainTypeId, u8, u8), u8>,
    pending: Vec<LevelRecord>,
}

impl TraceDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp for records queued until the next call.
    pub fn set_time(&mut self, now: Millis) {
        self.now = now;
    }

    pub fn take_changes(&mut self) -> Vec<LevelRecord> {
        std::mem::take(&mut self.pending)
    }
}

impl OutputDriver for TraceDriver {
    fn set_level(
        &mut self,
        chain: ChainTypeId,
        register_index: u8,
        output_index: u8,
        level: u8,
    ) -> Result<(), DriverError> {
        if level > MAX_PWM_BRIGHTNESS {
            return Err(DriverError::LevelTooHigh(level));
        }
        let previous = self.levels.insert((chain, register_index, output_index), level);
        if previous != Some(level) {
            self.pending.push(LevelRecord {
                t_ms: self.now,
                chain_id: chain,
                register: register_index,
                output: output_index,
                level,
            });
        }
        Ok(())
    }
}

pub struct TraceWriter<W: Write> {
    writer: Writer<W>,
    rows: u64,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Writer::from_writer(inner),
            rows: 0,
        }
    }

    pub fn write_all(&mut self, records: &[LevelRecord]) -> Result<(), csv::Error> {
        for record in records {
            self.writer.serialize(record)?;
            self.rows += 1;
        }
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn finish(mut self) -> Result<u64, csv::Error> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}
