//! Bounded capture of streamed command output.
//!
//! The workload transport may close a process's stdout stream once the
//! process exits, so output is collected as it is written rather than read
//! back afterwards.

use std::io::{self, Write};

/// Default capture capacity: 4 MiB.
pub const DEFAULT_CAPTURE_LIMIT: usize = 4 * 1024 * 1024;

/// An in-memory sink with a fixed capacity.
///
/// Writes that would exceed the capacity fail with
/// [`io::ErrorKind::OutOfMemory`] and mark the buffer as overflowed; the
/// bytes captured so far are kept.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use calibre_library_provisioner::capture::CaptureBuffer;
///
/// let mut buffer = CaptureBuffer::with_limit(64);
/// buffer.write_all(b"Author\nmetadata.db\n")?;
/// assert_eq!(buffer.joined_lines(), "Author\nmetadata.db");
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug)]
pub struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: usize,
    overflowed: bool,
}

impl CaptureBuffer {
    /// Creates a buffer holding at most `limit` bytes.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            overflowed: false,
        }
    }

    /// Returns the capacity in bytes.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Returns `true` once a write has been refused.
    #[must_use]
    pub const fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Returns the captured lines joined by `\n`, without a trailing newline.
    #[must_use]
    pub fn joined_lines(&self) -> String {
        String::from_utf8_lossy(&self.bytes)
            .lines()
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Default for CaptureBuffer {
    fn default() -> Self {
        Self::with_limit(DEFAULT_CAPTURE_LIMIT)
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.overflowed || self.bytes.len().saturating_add(buf.len()) > self.limit {
            self.overflowed = true;
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("capture limit of {} bytes exceeded", self.limit),
            ));
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
