// Error types for the logging pipeline

use std::io;

use thiserror::Error;

/// Errors surfaced at the logging entry points and at `cleanup`.
#[derive(Debug, Error)]
pub enum Error {
    /// `initialize` has not been called, or `cleanup` already ran.
    #[error("logger is not initialized")]
    NotInitialized,

    /// `initialize` was called while a logger instance is already running.
    #[error("logger is already initialized")]
    AlreadyInitialized,

    /// The logger was torn down while the operation was in flight.
    #[error("logger has been shut down")]
    ShutDown,

    /// A record's frame cannot fit the input ring buffer at any point.
    #[error("record frame of {size} bytes does not fit an input buffer of {capacity} bytes")]
    RecordTooLarge { size: usize, capacity: usize },

    /// Allocation of a thread's input ring buffer failed at first use.
    #[error("failed to allocate a {size}-byte input buffer")]
    InputBufferAlloc { size: usize },

    /// Rejected by [`Config::validate`](crate::Config::validate).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The writer reported an unclassified, unrecoverable failure.
    #[error("writer failed permanently: {0}")]
    Writer(#[source] io::Error),

    #[error("failed to start the output thread: {0}")]
    Io(#[from] io::Error),

    /// The output thread panicked; frames handed to it may be lost.
    #[error("output thread panicked")]
    ConsumerPanicked,
}

/// Errors local to the output buffer. Failing a single record this way never
/// corrupts the records around it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum OutputError {
    /// A single reservation exceeds the whole output buffer.
    #[error("reservation of {size} bytes exceeds output buffer capacity {capacity}")]
    RecordTooLarge { size: usize, capacity: usize },

    /// The buffer is full and the writer is not currently accepting data.
    #[error("output buffer full while the writer is backed up")]
    Backpressure,
}
