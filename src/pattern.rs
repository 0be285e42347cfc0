//! Pattern store: an ordered, cyclic sequence of per-chain output bitmasks.

use thiserror::Error;

use crate::{MAX_CHAINS_PER_NODE, Millis};

/// One pattern stage: an output bitmask per chain slot of the node.
pub type Frame = [u32; MAX_CHAINS_PER_NODE];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern has no frames")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternStore {
    frames: Vec<Frame>,
}

impl PatternStore {
    pub fn new(frames: &[Frame]) -> Result<Self, PatternError> {
        Self::from_frames(frames.to_vec())
    }

    pub fn from_frames(frames: Vec<Frame>) -> Result<Self, PatternError> {
        if frames.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Self { frames })
    }

    /// Number of stored frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Bitmask for `chain_slot` in frame `index`, wrapping the frame index.
    /// Chain slots outside the frame read as all-clear.
    pub fn mask(&self, index: usize, chain_slot: usize) -> u32 {
        let frame = &self.frames[index % self.frames.len()];
        frame.get(chain_slot).copied().unwrap_or(0)
    }

    /// Number of frame periods completed `elapsed` ms into playback. Unlike
    /// the frame index this never wraps.
    pub fn step_at(elapsed: Millis, time_delta: Millis) -> u64 {
        elapsed / time_delta.max(1)
    }

    /// Frame played at `step`. Playback repeats forever.
    pub fn frame_for_step(&self, step: u64) -> usize {
        (step % self.frames.len() as u64) as usize
    }
}
