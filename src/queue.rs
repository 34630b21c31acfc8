// Shared commit-extent queue and its flow-control events

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

use crate::events::Event;
use crate::ringbuffer::InputBuffer;

/// What a producer hands to the output thread: which ring to read and how
/// far. A `None` buffer is the shutdown sentinel.
pub(crate) struct CommitExtent {
    pub buffer: Option<Arc<InputBuffer>>,
    pub commit_end: usize,
}

/// The process-wide handoff state between producers and the output thread.
///
/// The bounded queue push is the release edge that publishes a producer's
/// frame bytes; the matching pop is the acquire edge on the consumer side.
pub(crate) struct SharedQueue {
    pub queue: ArrayQueue<CommitExtent>,
    /// Signaled by producers after pushing (or failing to push) an extent;
    /// the output thread waits on it when the queue is empty.
    pub queue_nonempty: Event,
    /// Signaled by the output thread after popping an extent and after
    /// discarding each frame; producers blocked on a full ring or a full
    /// queue wait on it.
    pub consumed: Event,
    shutdown: AtomicBool,
}

impl SharedQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            queue_nonempty: Event::new(),
            consumed: Event::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Mark the logger torn down and wake anything still parked on either
    /// event so it can observe the flag.
    pub(crate) fn shut_down(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.consumed.signal();
        self.queue_nonempty.signal();
    }
}
