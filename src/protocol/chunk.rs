// Per-read chunk sizing
//
// Each read draws a fresh size uniformly from [min, max], which makes the
// stream look like jittered network delivery rather than fixed-size blocks.

use ring::rand::{SecureRandom, SystemRandom};

use crate::common::error::{Error, Result};
use crate::common::types::{MAX_CHUNK_SIZE, MAX_DATAGRAM_SIZE, MIN_CHUNK_SIZE};

/// Draws chunk sizes uniformly from a closed interval.
pub struct ChunkSizer {
    min: usize,
    max: usize,
    rng: SystemRandom,
}

impl ChunkSizer {
    pub fn new(min: usize, max: usize) -> Result<Self> {
        if min == 0 || min > max || max > MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "Invalid chunk bounds {}..={}",
                min, max
            )));
        }
        Ok(Self {
            min,
            max,
            rng: SystemRandom::new(),
        })
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.min, self.max)
    }

    /// Next chunk size in `[min, max]`.
    pub fn next_size(&self) -> Result<usize> {
        if self.min == self.max {
            return Ok(self.min);
        }

        let span = (self.max - self.min + 1) as u32;
        // Reject draws from the incomplete top bucket so every size is equally likely.
        let zone = u32::MAX - (u32::MAX % span);
        loop {
            let mut bytes = [0u8; 4];
            self.rng
                .fill(&mut bytes)
                .map_err(|_| Error::Transport("system RNG unavailable".to_string()))?;
            let draw = u32::from_le_bytes(bytes);
            if draw < zone {
                return Ok(self.min + (draw % span) as usize);
            }
        }
    }
}

impl Default for ChunkSizer {
    fn default() -> Self {
        Self {
            min: MIN_CHUNK_SIZE,
            max: MAX_CHUNK_SIZE,
            rng: SystemRandom::new(),
        }
    }
}
