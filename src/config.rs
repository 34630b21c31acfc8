// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Tuning constants and runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Alignment of every frame in an input ring buffer.
///
/// Must be a power of two no smaller than a pointer, so that the dispatch
/// word of a frame (and the wraparound marker) always fits in one aligned
/// slot.
pub const FRAME_ALIGNMENT: usize = 16;

/// Default capacity of each thread's input ring buffer.
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 32 * 1024;

/// Default capacity of the output staging buffer.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 1024 * 1024;

/// Default capacity of the shared commit-extent queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Upper bound for the output thread's exponential back-off while the
/// commit-extent queue is empty.
pub(crate) const MAX_CONSUMER_BACKOFF_MS: u64 = 1000;

/// How long a producer sleeps per wait slice while blocked on a full ring
/// or a full extent queue. Producers re-check the shutdown flag between
/// slices so they cannot park forever against a torn-down logger.
pub(crate) const PRODUCER_WAIT_SLICE_MS: u64 = 50;

/// Buffer sizing for [`initialize_with`](crate::initialize_with).
///
/// The defaults match the constants above; override individual fields with
/// struct update syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capacity in bytes of each per-thread input ring buffer.
    pub input_buffer_size: usize,
    /// Capacity in bytes of the output staging buffer.
    pub output_buffer_size: usize,
    /// Capacity of the shared commit-extent queue, in extents.
    pub queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_buffer_size: DEFAULT_INPUT_BUFFER_SIZE,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Config {
    /// Check the configuration before it is used to build the logger.
    pub fn validate(&self) -> Result<(), Error> {
        if self.input_buffer_size % FRAME_ALIGNMENT != 0
            || self.input_buffer_size < 4 * FRAME_ALIGNMENT
        {
            return Err(Error::InvalidConfig(format!(
                "input_buffer_size must be a multiple of {FRAME_ALIGNMENT} and at least {}",
                4 * FRAME_ALIGNMENT
            )));
        }
        if self.output_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "output_buffer_size must be nonzero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
