//! Captured standard streams.

use std::sync::{Arc, Mutex};

use bytes::{Bytes, BytesMut};

/// Shared byte buffer.
type SharedBuffer = Arc<Mutex<BytesMut>>;

/// Standard streams of a guest instance.
///
/// Cloning yields another handle to the same buffers, so the host can feed stdin or collect output from another
/// thread. Buffers are unbounded.
#[derive(Debug, Clone, Default)]
pub struct Stdio {
    /// Pending input, consumed by guest reads.
    stdin: SharedBuffer,

    /// Output of the guest to fd 1.
    stdout: SharedBuffer,

    /// Output of the guest to fd 2.
    stderr: SharedBuffer,
}

impl Stdio {
    /// Create empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace pending stdin content.
    pub fn set_stdin(&self, data: &[u8]) {
        let mut stdin = self.stdin.lock().expect("not poisoned");
        stdin.clear();
        stdin.extend_from_slice(data);
    }

    /// Append to pending stdin content.
    pub fn push_stdin(&self, data: &[u8]) {
        self.stdin
            .lock()
            .expect("not poisoned")
            .extend_from_slice(data);
    }

    /// Drain everything the guest wrote to stdout so far.
    pub fn take_stdout(&self) -> Bytes {
        drain(&self.stdout)
    }

    /// Drain everything the guest wrote to stderr so far.
    pub fn take_stderr(&self) -> Bytes {
        drain(&self.stderr)
    }

    /// Consume stdin into `buf`. Returns 0 once stdin is exhausted.
    pub(crate) fn read_stdin(&self, buf: &mut [u8]) -> usize {
        let mut stdin = self.stdin.lock().expect("not poisoned");
        let n = buf.len().min(stdin.len());
        buf[..n].copy_from_slice(&stdin.split_to(n));
        n
    }

    /// Append guest output to stdout.
    pub(crate) fn write_stdout(&self, data: &[u8]) {
        self.stdout
            .lock()
            .expect("not poisoned")
            .extend_from_slice(data);
    }

    /// Append guest output to stderr.
    pub(crate) fn write_stderr(&self, data: &[u8]) {
        self.stderr
            .lock()
            .expect("not poisoned")
            .extend_from_slice(data);
    }
}

/// Take buffer content, leaving it empty.
fn drain(buffer: &SharedBuffer) -> Bytes {
    buffer.lock().expect("not poisoned").split().freeze()
}
