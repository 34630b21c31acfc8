// SPDX-License-Identifier: Apache-2.0 OR MIT
// Pluggable byte sinks for the output thread

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write as _};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// How a write attempt failed.
///
/// Writers deal with transient interruptions (`EINTR` and friends)
/// internally; what they report here is what the output thread acts on.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Transient failure such as a full disk; the bytes stay buffered and
    /// the write is retried on the next flush.
    #[error("transient write failure, try again later")]
    TryLater,

    /// Permanent failure such as a broken pipe; the logger stops forwarding
    /// to the writer for the rest of the process.
    #[error("permanent write failure, giving up")]
    GiveUp,

    /// Unclassified failure; treated as an unrecoverable error of the
    /// logger and reported from `cleanup`.
    #[error("unclassified write failure: {0}")]
    Fatal(#[source] io::Error),
}

/// A byte sink fed by the output thread.
///
/// `write` either consumes the whole buffer or reports why it could not.
pub trait Writer: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), WriteError>;
}

/// Appends log output to a file, creating it with full access permissions
/// if it does not exist.
pub struct FileWriter {
    file: File,
}

impl FileWriter {
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .mode(0o777)
            .open(path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Self { file })
    }
}

impl Writer for FileWriter {
    fn write(&mut self, mut bytes: &[u8]) -> Result<(), WriteError> {
        while !bytes.is_empty() {
            match self.file.write(bytes) {
                Ok(0) => {
                    return Err(WriteError::Fatal(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "file writer made no progress",
                    )))
                }
                Ok(written) => bytes = &bytes[written..],
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(classify_errno(err)),
            }
        }
        Ok(())
    }
}

/// Map an OS write error to the writer contract.
fn classify_errno(err: io::Error) -> WriteError {
    match err.raw_os_error() {
        Some(
            libc::EFBIG | libc::EIO | libc::EPIPE | libc::ERANGE | libc::ECONNRESET
            | libc::EINVAL | libc::ENXIO | libc::EACCES | libc::ENETDOWN | libc::ENETUNREACH,
        ) => WriteError::GiveUp,
        Some(libc::ENOSPC) => WriteError::TryLater,
        _ => WriteError::Fatal(err),
    }
}

/// Collects log output in memory. Cloning yields a handle to the same
/// underlying buffer, so a test can keep one half and hand the other to
/// `initialize`.
#[derive(Clone, Default)]
pub struct MemoryWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap().clone()
    }
}

impl Writer for MemoryWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.buf.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_writer_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");

        let mut writer = FileWriter::new(&path).unwrap();
        writer.write(b"first ").unwrap();
        drop(writer);

        // Re-opening must append, not truncate.
        let mut writer = FileWriter::new(&path).unwrap();
        writer.write(b"second").unwrap();
        drop(writer);

        assert_eq!(std::fs::read(&path).unwrap(), b"first second");
    }

    #[test]
    fn test_memory_writer_accumulates() {
        let writer = MemoryWriter::new();
        let mut handle = writer.clone();
        handle.write(b"one ").unwrap();
        handle.write(b"two").unwrap();
        assert_eq!(writer.contents(), b"one two");
    }

    #[test]
    fn test_errno_classification() {
        let give_up = classify_errno(io::Error::from_raw_os_error(libc::EPIPE));
        assert!(matches!(give_up, WriteError::GiveUp));

        let try_later = classify_errno(io::Error::from_raw_os_error(libc::ENOSPC));
        assert!(matches!(try_later, WriteError::TryLater));

        let fatal = classify_errno(io::Error::from_raw_os_error(libc::EBADF));
        assert!(matches!(fatal, WriteError::Fatal(_)));
    }
}
