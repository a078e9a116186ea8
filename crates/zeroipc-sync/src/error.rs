use std::fmt;

/// Errors from the blocking synchronization primitives (Semaphore, Barrier,
/// Latch, Channel, and the codata waits in `zeroipc-codata`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    TimedOut,
    Overflow,
    Closed,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::TimedOut => write!(f, "operation timed out"),
            SyncError::Overflow => write!(f, "semaphore permit count would exceed max_count"),
            SyncError::Closed => write!(f, "channel is closed"),
        }
    }
}

impl std::error::Error for SyncError {}
