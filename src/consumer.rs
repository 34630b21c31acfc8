// Output thread: drains commit extents and feeds the writer

use std::sync::Arc;
use std::time::Duration;

use crate::config::MAX_CONSUMER_BACKOFF_MS;
use crate::error::Error;
use crate::frame::{DispatchFn, WRAPAROUND_MARKER};
use crate::output::OutputBuffer;
use crate::queue::SharedQueue;

/// Body of the output thread.
///
/// Pops commit extents, walks each extent's frames in order, dispatches
/// them into the output buffer and flushes after every drained extent.
/// Exits on the shutdown sentinel; everything queued before the sentinel is
/// drained first.
pub(crate) fn output_worker(shared: Arc<SharedQueue>, mut output: OutputBuffer) -> Result<(), Error> {
    loop {
        // Back-off while the queue is empty: indefinite on the first wait,
        // then 1 ms doubling up to a second. The budget resets for every
        // popped extent, so a spurious wake cannot leave us polling at 1 ms
        // forever.
        let mut backoff: Option<Duration> = None;
        let extent = loop {
            match shared.queue.pop() {
                Some(extent) => break extent,
                None => {
                    shared.queue_nonempty.wait(backoff);
                    backoff = Some(match backoff {
                        None => Duration::from_millis(1),
                        Some(wait) => {
                            (wait * 2).min(Duration::from_millis(MAX_CONSUMER_BACKOFF_MS))
                        }
                    });
                }
            }
        };
        // Unblock any producer stuck on a full queue.
        shared.consumed.signal();

        let Some(buffer) = extent.buffer else {
            // Shutdown sentinel.
            break;
        };

        let mut p = buffer.input_start();
        while p != extent.commit_end {
            // SAFETY: the acquire edge of the queue pop makes every byte up
            // to commit_end visible, and p only walks committed frames.
            let mut word = unsafe { (buffer.slot(p) as *const usize).read() };
            if word == WRAPAROUND_MARKER {
                p = buffer.wraparound();
                word = unsafe { (buffer.slot(p) as *const usize).read() };
            }
            // SAFETY: every non-marker dispatch word was written by
            // encode_frame from a dispatch function in this binary.
            let dispatch: DispatchFn = unsafe { std::mem::transmute(word) };
            let size = unsafe { dispatch(&mut output, buffer.slot(p)) };
            p = buffer.discard_input_frame(size);
        }
        output.flush();
    }

    output.flush();
    match output.take_fatal() {
        Some(err) => Err(Error::Writer(err)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::CommitExtent;
    use crate::writer::MemoryWriter;
    use std::thread;

    #[test]
    fn test_worker_exits_on_sentinel() {
        let shared = Arc::new(SharedQueue::new(4));
        let output = OutputBuffer::new(Box::new(MemoryWriter::new()), 64);

        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || output_worker(shared, output))
        };

        shared
            .queue
            .push(CommitExtent {
                buffer: None,
                commit_end: 0,
            })
            .ok()
            .unwrap();
        shared.queue_nonempty.signal();

        assert!(worker.join().unwrap().is_ok());
    }
}
