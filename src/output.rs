// Output staging buffer between the consumer and the writer

use std::io;

use crate::error::OutputError;
use crate::writer::{WriteError, Writer};

/// Bounded staging area feeding the [`Writer`].
///
/// Owned exclusively by the output thread. Records are rendered into it with
/// `reserve`/`commit` and pushed to the writer by `flush` after each drained
/// batch. Writer outcomes drive a small state machine: transient failures
/// keep the bytes buffered for the next flush, a permanent failure switches
/// the buffer into silent-discard mode, and the first unclassified failure
/// is kept for `cleanup` to report.
pub struct OutputBuffer {
    writer: Box<dyn Writer>,
    buf: Box<[u8]>,
    committed: usize,
    flush_epoch: u64,
    gave_up: bool,
    fatal: Option<io::Error>,
}

/// Snapshot of the buffer position at the start of a record, used to unwind
/// a record that failed mid-render.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RecordMark {
    committed: usize,
    flush_epoch: u64,
}

impl OutputBuffer {
    pub fn new(writer: Box<dyn Writer>, capacity: usize) -> Self {
        Self {
            writer,
            buf: vec![0u8; capacity].into_boxed_slice(),
            committed: 0,
            flush_epoch: 0,
            gave_up: false,
            fatal: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Return a writable region of at least `size` bytes, flushing first if
    /// the free tail is too small. Does not advance the commit cursor.
    pub fn reserve(&mut self, size: usize) -> Result<&mut [u8], OutputError> {
        if self.buf.len() - self.committed < size {
            if size > self.buf.len() {
                return Err(OutputError::RecordTooLarge {
                    size,
                    capacity: self.buf.len(),
                });
            }
            self.flush();
            if self.buf.len() - self.committed < size {
                // The flush retained its bytes (writer backed up); the
                // record loses this round rather than the whole buffer.
                return Err(OutputError::Backpressure);
            }
        }
        Ok(&mut self.buf[self.committed..self.committed + size])
    }

    /// Advance the commit cursor over `size` bytes previously written into
    /// the region returned by [`reserve`](Self::reserve).
    pub fn commit(&mut self, size: usize) {
        debug_assert!(self.committed + size <= self.buf.len());
        self.committed += size;
    }

    /// Reserve, copy, commit.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), OutputError> {
        let dst = self.reserve(bytes.len())?;
        dst.copy_from_slice(bytes);
        self.commit(bytes.len());
        Ok(())
    }

    /// Hand all committed bytes to the writer.
    pub fn flush(&mut self) {
        if self.committed == 0 {
            return;
        }
        if self.gave_up {
            self.committed = 0;
            self.flush_epoch += 1;
            return;
        }
        match self.writer.write(&self.buf[..self.committed]) {
            Ok(()) => {
                self.committed = 0;
                self.flush_epoch += 1;
            }
            // Retained; the next flush retries the whole committed region.
            Err(WriteError::TryLater) => {}
            Err(WriteError::GiveUp) => {
                self.gave_up = true;
                self.committed = 0;
                self.flush_epoch += 1;
            }
            Err(WriteError::Fatal(err)) => {
                self.gave_up = true;
                if self.fatal.is_none() {
                    self.fatal = Some(err);
                }
                self.committed = 0;
                self.flush_epoch += 1;
            }
        }
    }

    pub(crate) fn mark(&self) -> RecordMark {
        RecordMark {
            committed: self.committed,
            flush_epoch: self.flush_epoch,
        }
    }

    /// Unwind the bytes committed since `mark`, unless a flush has moved
    /// them out of the buffer already.
    pub(crate) fn rewind(&mut self, mark: RecordMark) {
        if mark.flush_epoch == self.flush_epoch {
            self.committed = mark.committed;
        }
    }

    pub(crate) fn take_fatal(&mut self) -> Option<io::Error> {
        self.fatal.take()
    }
}
