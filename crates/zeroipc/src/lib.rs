//! Typed, ergonomic handles over ZeroIPC's shared-memory structures.
//!
//! A [`Segment`] hosts a [`Directory`]; everything else in this crate is a
//! thin `create`/`open` wrapper that reserves (or looks up) a named
//! directory entry and attaches the right `shm-primitives` or
//! `zeroipc-sync`/`zeroipc-codata` structure over it.

pub mod codata;
pub mod error;
pub mod inspect;
pub mod kind;
pub mod pool;
pub mod ring;
pub mod structures;
pub mod sync;

pub use codata::{Future, Lazy};
pub use error::Error;
pub use kind::Kind;
pub use pool::Pool;
pub use ring::Ring;
pub use structures::{Array, Map, Queue, Set, Stack, Stream};
pub use sync::{select, Barrier, Channel, Latch, Semaphore};

pub use zeroipc_codata::Next;
pub use zeroipc_segment::{Directory, Segment, SegmentConfig};
pub use zeroipc_sync::SyncError;
