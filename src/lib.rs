// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Asynchronous logging core for latency-sensitive producers.
//!
//! Producer threads move log records into thread-local ring buffers and a
//! single output thread serializes them to a pluggable [`Writer`]. The hot
//! path performs no locking, heap allocation or system calls: a record is
//! copied into the ring together with the address of its decoder, and the
//! output thread invokes that decoder later to render the bytes.
//!
//! Per-thread ordering is strict: records committed by one thread reach the
//! writer in commit order. Across threads there is no ordering beyond
//! whatever the application establishes itself.
//!
//! ```
//! use framelog::MemoryWriter;
//!
//! let writer = MemoryWriter::new();
//! framelog::initialize(Box::new(writer.clone()))?;
//! framelog::log!("listening on port %d\n", 8080)?;
//! framelog::cleanup()?;
//! assert_eq!(writer.contents(), b"listening on port 8080\n".to_vec());
//! # Ok::<(), framelog::Error>(())
//! ```

mod config;
mod consumer;
mod error;
mod events;
mod format;
mod frame;
#[macro_use]
mod macros;
mod output;
mod queue;
mod ringbuffer;
mod writer;

pub use config::{
    Config, DEFAULT_INPUT_BUFFER_SIZE, DEFAULT_OUTPUT_BUFFER_SIZE, DEFAULT_QUEUE_CAPACITY,
    FRAME_ALIGNMENT,
};
pub use error::{Error, OutputError};
pub use format::{template, Format, TemplateRecord};
pub use frame::Render;
pub use output::OutputBuffer;
pub use writer::{FileWriter, MemoryWriter, WriteError, Writer};

use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use config::PRODUCER_WAIT_SLICE_MS;
use queue::{CommitExtent, SharedQueue};
use ringbuffer::InputBuffer;

/// The process-wide logger instance: handoff state plus the output thread.
struct Core {
    shared: Arc<SharedQueue>,
    worker: JoinHandle<Result<(), Error>>,
    input_buffer_size: usize,
}

static CORE: Mutex<Option<Core>> = Mutex::new(None);

thread_local! {
    static THREAD_INPUT: RefCell<Option<ThreadInput>> = const { RefCell::new(None) };
}

/// The calling thread's handle to its input ring.
struct ThreadInput {
    buffer: Arc<InputBuffer>,
}

impl Drop for ThreadInput {
    fn drop(&mut self) {
        // Publish whatever is still buffered and wait for the output thread
        // to drain it. In-flight commit extents hold their own Arc, so the
        // ring memory outlives this handle either way.
        self.buffer.drain();
    }
}

/// Start the logger: create the output buffer and the output thread.
///
/// Uses the default [`Config`]; see [`initialize_with`] to tune sizes.
pub fn initialize(writer: Box<dyn Writer>) -> Result<(), Error> {
    initialize_with(writer, Config::default())
}

/// Start the logger with explicit buffer sizing.
pub fn initialize_with(writer: Box<dyn Writer>, config: Config) -> Result<(), Error> {
    config.validate()?;
    let mut core = CORE.lock().unwrap();
    if core.is_some() {
        return Err(Error::AlreadyInitialized);
    }
    let shared = Arc::new(SharedQueue::new(config.queue_capacity));
    let output = OutputBuffer::new(writer, config.output_buffer_size);
    let worker_shared = Arc::clone(&shared);
    let worker = thread::Builder::new()
        .name("framelog-output".into())
        .spawn(move || consumer::output_worker(worker_shared, output))?;
    *core = Some(Core {
        shared,
        worker,
        input_buffer_size: config.input_buffer_size,
    });
    Ok(())
}

/// Stop the logger: drain everything committed so far, join the output
/// thread and release the output buffer.
///
/// Records committed before this call are guaranteed to reach the writer.
/// Returns the writer's unrecoverable error, if it reported one.
pub fn cleanup() -> Result<(), Error> {
    let core = CORE.lock().unwrap().take().ok_or(Error::NotInitialized)?;

    // Publish the calling thread's outstanding frames ahead of the
    // sentinel.
    THREAD_INPUT.with(|slot| {
        if let Some(input) = slot.borrow().as_ref() {
            if Arc::ptr_eq(input.buffer.shared(), &core.shared) {
                input.buffer.commit();
            }
        }
    });

    let mut sentinel = CommitExtent {
        buffer: None,
        commit_end: 0,
    };
    loop {
        match core.shared.queue.push(sentinel) {
            Ok(()) => break,
            Err(rejected) => {
                sentinel = rejected;
                core.shared.queue_nonempty.signal();
                core.shared
                    .consumed
                    .wait(Some(Duration::from_millis(PRODUCER_WAIT_SLICE_MS)));
            }
        }
    }
    core.shared.queue_nonempty.signal();

    let joined = core.worker.join();
    // Wake any producer still parked against this instance so it observes
    // the shutdown flag instead of waiting for a consumer that is gone.
    core.shared.shut_down();
    joined.map_err(|_| Error::ConsumerPanicked)?
}

/// Move one record into the calling thread's input ring and publish it.
///
/// The thread's ring is created lazily on first use. The record value is
/// moved into the ring verbatim and rendered on the output thread, which is
/// why it must be `Send + 'static`.
pub fn write_record<R>(record: R) -> Result<(), Error>
where
    R: Render + Send + 'static,
{
    let size = frame::frame_size::<R>();
    THREAD_INPUT.with(|slot| {
        let mut slot = slot.borrow_mut();
        ensure_thread_buffer(&mut slot)?;
        let input = slot.as_ref().ok_or(Error::NotInitialized)?;
        let buffer = &input.buffer;
        if size > buffer.capacity() - FRAME_ALIGNMENT {
            return Err(Error::RecordTooLarge {
                size,
                capacity: buffer.capacity(),
            });
        }
        let frame = buffer.allocate_input_frame(size)?;
        // SAFETY: the region is ours until commit publishes it, and it is
        // frame-aligned with at least `size` bytes.
        unsafe { frame::encode_frame(frame, record) };
        buffer.commit();
        Ok(())
    })
}

/// Make sure the thread-local ring exists and belongs to the live logger
/// instance. A ring left over from a torn-down instance is replaced; its
/// drop drains against the old instance, which is a no-op after shutdown.
fn ensure_thread_buffer(slot: &mut Option<ThreadInput>) -> Result<(), Error> {
    if let Some(input) = slot.as_ref() {
        if !input.buffer.is_shut_down() {
            return Ok(());
        }
    }
    let core_guard = CORE.lock().unwrap();
    let core = core_guard.as_ref().ok_or(Error::NotInitialized)?;
    let buffer = InputBuffer::new(Arc::clone(&core.shared), core.input_buffer_size)?;
    *slot = Some(ThreadInput { buffer });
    Ok(())
}
