//! Cross-process synchronization primitives for ZeroIPC: semaphore,
//! barrier, latch, and channel, all built on a shared futex abstraction so
//! blocked waiters sleep instead of spinning.

pub mod barrier;
pub mod channel;
pub mod error;
pub mod futex;
pub mod latch;
pub mod semaphore;

pub use barrier::{Barrier, BarrierHeader, BARRIER_KIND};
pub use channel::{Channel, ChannelHeader, CHANNEL_KIND};
pub use error::SyncError;
pub use futex::{futex_wait, futex_wake, futex_wake_all, futex_wake_one, FutexWaitResult};
pub use latch::{Latch, LatchHeader, LATCH_KIND};
pub use semaphore::{Semaphore, SemaphoreHeader, SEMAPHORE_KIND};
