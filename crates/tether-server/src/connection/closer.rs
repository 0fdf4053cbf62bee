//! Single-close guard shared by the two pumps.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio_util::sync::CancellationToken;

/// Closes the socket exactly once and wakes whoever is waiting on it.
///
/// Either pump (or teardown) may call [`SocketCloser::close`]; only the first
/// call wins. The read pump waits on [`SocketCloser::closed`] alongside its
/// blocking read, so a close from the write side unblocks it.
#[derive(Debug, Default)]
pub struct SocketCloser {
    closed: AtomicBool,
    signal: CancellationToken,
}

impl SocketCloser {
    /// Create an open guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the socket. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.signal.cancel();
        true
    }

    /// Whether the socket has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the socket is closed.
    pub async fn closed(&self) {
        self.signal.cancelled().await;
    }
}
