// Per-thread input ring buffer of variable-size frames
//
// Each producer thread owns one of these. The producer allocates frames at
// input_end and publishes them by snapshotting input_end into commit_end and
// enqueuing a commit extent; the output thread walks frames from input_start
// up to the extent's commit_end and discards them as it goes. Frames are
// never split across the ring boundary: when the tail cannot hold a frame,
// the producer leaves a wraparound marker and restarts at the base.

use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FRAME_ALIGNMENT, PRODUCER_WAIT_SLICE_MS};
use crate::error::Error;
use crate::frame::WRAPAROUND_MARKER;
use crate::queue::{CommitExtent, SharedQueue};

/// Cache-aligned wrapper to prevent false sharing between the producer's
/// and the consumer's cursors.
#[repr(align(64))]
struct CacheAligned<T>(T);

/// SPSC ring buffer of frames, created lazily the first time a thread logs.
///
/// All positions are byte offsets into the region, always aligned by
/// `FRAME_ALIGNMENT` and strictly less than the capacity (one-past-end
/// wraps to zero). The ring is empty iff `input_start == input_end`, and
/// the allocator keeps one alignment quantum free so that state can never
/// also mean "full".
pub(crate) struct InputBuffer {
    buf: *mut u8,
    capacity: usize,
    /// Next byte the output thread will read. Written only by the output
    /// thread, read by both sides.
    input_start: CacheAligned<AtomicUsize>,
    /// Next byte the producer will allocate into. Written only by the
    /// producer; the consumer sees it indirectly through commit extents.
    input_end: CacheAligned<AtomicUsize>,
    /// Last byte published to the consumer. Producer-private.
    commit_end: AtomicUsize,
    shared: Arc<SharedQueue>,
}

// SAFETY: the ring has exactly two accessors. The producer mutates
// input_end and commit_end and writes frame bytes ahead of input_end; the
// output thread mutates input_start and reads frame bytes behind the
// commit_end it received through the queue. The queue push/pop pair and the
// event signal/wait pair provide the synchronization edges; within them the
// relaxed cursor accesses cannot race.
unsafe impl Send for InputBuffer {}
unsafe impl Sync for InputBuffer {}

impl InputBuffer {
    pub(crate) fn new(shared: Arc<SharedQueue>, capacity: usize) -> Result<Arc<Self>, Error> {
        debug_assert!(capacity % FRAME_ALIGNMENT == 0 && capacity >= 4 * FRAME_ALIGNMENT);
        let layout = Layout::from_size_align(capacity, FRAME_ALIGNMENT)
            .map_err(|_| Error::InputBufferAlloc { size: capacity })?;
        // SAFETY: layout has nonzero size (validated capacity).
        let buf = unsafe { alloc(layout) };
        if buf.is_null() {
            return Err(Error::InputBufferAlloc { size: capacity });
        }
        Ok(Arc::new(Self {
            buf,
            capacity,
            input_start: CacheAligned(AtomicUsize::new(0)),
            input_end: CacheAligned(AtomicUsize::new(0)),
            commit_end: AtomicUsize::new(0),
            shared,
        }))
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn shared(&self) -> &Arc<SharedQueue> {
        &self.shared
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shared.is_shut_down()
    }

    /// Raw pointer to the byte at `offset`.
    pub(crate) fn slot(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.capacity);
        // SAFETY: offset is within the allocation.
        unsafe { self.buf.add(offset) }
    }

    /// Move a position forward by an aligned distance, wrapping the
    /// one-past-end position back to the base. The distance must not move
    /// past the end: frames are never discontinuous.
    fn advance(&self, offset: usize, distance: usize) -> usize {
        debug_assert_eq!(distance % FRAME_ALIGNMENT, 0);
        let next = offset + distance;
        debug_assert!(next <= self.capacity);
        if next == self.capacity {
            0
        } else {
            next
        }
    }

    /// Claim `size` contiguous bytes for a frame, blocking while the ring
    /// is full. `size` must be a nonzero multiple of `FRAME_ALIGNMENT` and
    /// at most `capacity - FRAME_ALIGNMENT`.
    pub(crate) fn allocate_input_frame(self: &Arc<Self>, size: usize) -> Result<*mut u8, Error> {
        debug_assert!(size > 0 && size % FRAME_ALIGNMENT == 0);
        debug_assert!(size <= self.capacity - FRAME_ALIGNMENT);
        loop {
            if self.shared.is_shut_down() {
                return Err(Error::ShutDown);
            }
            let end = self.input_end.0.load(Ordering::Relaxed);
            debug_assert!(end < self.capacity && end % FRAME_ALIGNMENT == 0);
            // A stale input_start only under-reports the free space; the
            // event wait below is a full barrier, so the retry sees a fresh
            // value. Relaxed is enough here.
            let start = self.input_start.0.load(Ordering::Relaxed);
            if start > end {
                // Free region is contiguous: [end, start). The strict
                // comparison keeps one quantum free, otherwise a claim
                // could end with input_start == input_end and "full" would
                // be indistinguishable from "empty".
                if size < start - end {
                    self.input_end.0.store(self.advance(end, size), Ordering::Relaxed);
                    return Ok(self.slot(end));
                }
            } else {
                // Free region wraps: [end, capacity) plus [0, start).
                let free_tail = self.capacity - end;
                if size < free_tail {
                    self.input_end.0.store(self.advance(end, size), Ordering::Relaxed);
                    return Ok(self.slot(end));
                } else if size < start {
                    // The tail cannot hold the frame; leave a marker so the
                    // output thread skips to the base. FRAME_ALIGNMENT is at
                    // least a word, so the marker always fits the leftover
                    // tail.
                    // SAFETY: end is in bounds and quantum-aligned; the
                    // consumer cannot read it until a later commit extent
                    // covers it.
                    unsafe { (self.slot(end) as *mut usize).write(WRAPAROUND_MARKER) };
                    self.input_end.0.store(self.advance(0, size), Ordering::Relaxed);
                    return Ok(self.slot(0));
                }
            }
            self.wait_input_consumed();
        }
    }

    /// Publish all allocated frames: snapshot `input_end` into `commit_end`
    /// and enqueue a commit extent. A commit with nothing new since the
    /// last publish is a no-op.
    pub(crate) fn commit(self: &Arc<Self>) {
        let end = self.input_end.0.load(Ordering::Relaxed);
        if self.commit_end.load(Ordering::Relaxed) == end {
            return;
        }
        self.commit_end.store(end, Ordering::Relaxed);
        let mut extent = CommitExtent {
            buffer: Some(Arc::clone(self)),
            commit_end: end,
        };
        // The push is the release edge publishing the frame bytes.
        loop {
            match self.shared.queue.push(extent) {
                Ok(()) => break,
                Err(rejected) => {
                    if self.shared.is_shut_down() {
                        return;
                    }
                    extent = rejected;
                    self.shared.queue_nonempty.signal();
                    self.shared
                        .consumed
                        .wait(Some(Duration::from_millis(PRODUCER_WAIT_SLICE_MS)));
                }
            }
        }
        self.shared.queue_nonempty.signal();
    }

    /// Block until the output thread consumes some input.
    fn wait_input_consumed(self: &Arc<Self>) {
        // If everything published so far has been drained, the ring is full
        // of frames the consumer has never been told about. Publish them
        // first or this wait can never be satisfied.
        if self.commit_end.load(Ordering::Relaxed) == self.input_start.0.load(Ordering::Relaxed) {
            self.commit();
        }
        // Kick the output thread in case it is sitting in its back-off
        // wait; otherwise a full ring can stall for a whole back-off cycle.
        self.shared.queue_nonempty.signal();
        self.shared
            .consumed
            .wait(Some(Duration::from_millis(PRODUCER_WAIT_SLICE_MS)));
    }

    /// Publish outstanding frames and wait for the output thread to drain
    /// them. Called when the owning thread exits.
    pub(crate) fn drain(self: &Arc<Self>) {
        self.commit();
        while self.input_start.0.load(Ordering::Relaxed) != self.input_end.0.load(Ordering::Relaxed)
        {
            if self.shared.is_shut_down() {
                return;
            }
            self.shared.queue_nonempty.signal();
            self.shared
                .consumed
                .wait(Some(Duration::from_millis(PRODUCER_WAIT_SLICE_MS)));
        }
    }

    /// Consumer-side read of the read cursor.
    pub(crate) fn input_start(&self) -> usize {
        self.input_start.0.load(Ordering::Relaxed)
    }

    /// Consumer-side: advance the read cursor past a dispatched frame and
    /// wake producers blocked on a full ring.
    pub(crate) fn discard_input_frame(&self, size: usize) -> usize {
        let start = self.input_start.0.load(Ordering::Relaxed);
        let next = self.advance(start, size);
        // Relaxed is fine: this only recycles space, it publishes no data.
        // The event signal is the edge the producer's wait pairs with.
        self.input_start.0.store(next, Ordering::Relaxed);
        self.shared.consumed.signal();
        next
    }

    /// Consumer-side: the current read position holds a wraparound marker;
    /// skip to the ring base.
    pub(crate) fn wraparound(&self) -> usize {
        debug_assert_eq!(
            // SAFETY: input_start is in bounds and the walk only lands here
            // after a commit extent covering the marker.
            unsafe { (self.slot(self.input_start.0.load(Ordering::Relaxed)) as *const usize).read() },
            WRAPAROUND_MARKER
        );
        self.input_start.0.store(0, Ordering::Relaxed);
        0
    }
}

impl Drop for InputBuffer {
    fn drop(&mut self) {
        // SAFETY: buf came from alloc with this exact layout.
        unsafe {
            dealloc(
                self.buf,
                Layout::from_size_align_unchecked(self.capacity, FRAME_ALIGNMENT),
            )
        };
    }
}
