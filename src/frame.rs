// SPDX-License-Identifier: Apache-2.0 OR MIT
// Frame layout and dispatch protocol
//
// Every frame in an input ring buffer starts with one machine word: either
// the address of a monomorphized dispatch function, or WRAPAROUND_MARKER
// telling the output thread to skip back to the ring base. The payload that
// follows is the record value itself, moved into the ring byte-for-byte and
// moved back out on the consumer side.

use std::mem;

use crate::config::FRAME_ALIGNMENT;
use crate::error::OutputError;
use crate::output::OutputBuffer;

/// Decodes the frame at `frame` into the output buffer and returns the
/// frame's total size, so the consumer can advance past it.
pub(crate) type DispatchFn = unsafe fn(&mut OutputBuffer, *const u8) -> usize;

/// Dispatch-word sentinel marking "skip to ring base". All ones can never
/// collide with a real function address.
pub(crate) const WRAPAROUND_MARKER: usize = usize::MAX;

/// A record that can serialize itself into the output buffer.
///
/// Implementations run on the output thread, long after the producer's log
/// call returned, so a record owns everything it needs to render.
pub trait Render {
    fn render(&self, out: &mut OutputBuffer) -> Result<(), OutputError>;
}

/// Byte offset of the payload within a frame: past the dispatch word, at
/// the payload type's own alignment.
pub(crate) const fn payload_offset<T>() -> usize {
    let align = mem::align_of::<T>();
    let word = mem::size_of::<usize>();
    if align > word {
        align
    } else {
        word
    }
}

/// Total frame size for a payload of type `T`, rounded up to the frame
/// alignment.
pub(crate) const fn frame_size<T>() -> usize {
    let unpadded = payload_offset::<T>() + mem::size_of::<T>();
    (unpadded + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

/// Write the dispatch word and move `value` into the frame.
///
/// # Safety
///
/// `frame` must point at a writable, `FRAME_ALIGNMENT`-aligned region of at
/// least `frame_size::<T>()` bytes that no other thread is accessing.
pub(crate) unsafe fn encode_frame<T: Render>(frame: *mut u8, value: T) {
    assert!(
        mem::align_of::<T>() <= FRAME_ALIGNMENT,
        "record type is over-aligned for the frame protocol"
    );
    let dispatch: DispatchFn = dispatch_frame::<T>;
    (frame as *mut usize).write(dispatch as usize);
    frame.add(payload_offset::<T>()).cast::<T>().write(value);
}

/// Consumer-side counterpart of [`encode_frame`]: moves the payload back
/// out, renders it, and reports the frame size.
///
/// A record that fails to render (e.g. it does not fit the output buffer)
/// is unwound and dropped; the frame is consumed either way so the ring
/// keeps moving.
///
/// # Safety
///
/// `frame` must point at a frame previously written by `encode_frame::<T>`
/// with the same `T`, and must not be dispatched twice.
pub(crate) unsafe fn dispatch_frame<T: Render>(out: &mut OutputBuffer, frame: *const u8) -> usize {
    let value = frame.add(payload_offset::<T>()).cast::<T>().read();
    let mark = out.mark();
    if value.render(out).is_err() {
        out.rewind(mark);
    }
    frame_size::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemoryWriter;

    /// Backing storage with the alignment the ring would provide.
    #[repr(C, align(16))]
    struct FrameBuf([u8; 64]);

    struct ByteRecord(u8);

    impl Render for ByteRecord {
        fn render(&self, out: &mut OutputBuffer) -> Result<(), OutputError> {
            out.write_bytes(&[self.0])
        }
    }

    struct HugeRecord;

    impl Render for HugeRecord {
        fn render(&self, out: &mut OutputBuffer) -> Result<(), OutputError> {
            out.write_bytes(b"prefix ")?;
            let capacity = out.capacity();
            out.reserve(capacity + 1)?;
            Ok(())
        }
    }

    #[test]
    fn test_frame_size_is_aligned() {
        assert_eq!(frame_size::<()>() % FRAME_ALIGNMENT, 0);
        assert_eq!(frame_size::<u8>() % FRAME_ALIGNMENT, 0);
        assert_eq!(frame_size::<[u8; 40]>() % FRAME_ALIGNMENT, 0);
        assert!(frame_size::<u8>() >= mem::size_of::<usize>() + 1);
    }

    #[test]
    fn test_payload_offset_clears_dispatch_word() {
        assert!(payload_offset::<u8>() >= mem::size_of::<usize>());
        assert!(payload_offset::<u64>() >= mem::size_of::<usize>());
    }

    #[test]
    fn test_encode_dispatch_round_trip() {
        let mut frame = FrameBuf([0; 64]);
        let writer = MemoryWriter::new();
        let mut out = OutputBuffer::new(Box::new(writer.clone()), 64);

        unsafe { encode_frame(frame.0.as_mut_ptr(), ByteRecord(b'x')) };
        let word = unsafe { frame.0.as_ptr().cast::<usize>().read() };
        assert_ne!(word, WRAPAROUND_MARKER);

        let dispatch: DispatchFn = unsafe { mem::transmute(word) };
        let size = unsafe { dispatch(&mut out, frame.0.as_ptr()) };
        assert_eq!(size, frame_size::<ByteRecord>());

        out.flush();
        assert_eq!(writer.contents(), b"x".to_vec());
    }

    #[test]
    fn test_failed_render_is_unwound() {
        let mut frame = FrameBuf([0; 64]);
        let writer = MemoryWriter::new();
        let mut out = OutputBuffer::new(Box::new(writer.clone()), 64);

        unsafe { encode_frame(frame.0.as_mut_ptr(), HugeRecord) };
        let word = unsafe { frame.0.as_ptr().cast::<usize>().read() };
        let dispatch: DispatchFn = unsafe { mem::transmute(word) };
        unsafe { dispatch(&mut out, frame.0.as_ptr()) };

        // The partial "prefix " must not leak into the stream.
        out.write_bytes(b"next").unwrap();
        out.flush();
        assert_eq!(writer.contents(), b"next".to_vec());
    }
}
