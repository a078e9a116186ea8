//! Codata for ZeroIPC: single-assignment futures, memoized lazy cells, and
//! multi-cast append-only streams, plus process-local combinators over
//! streams.

pub mod combinators;
pub mod future;
pub mod lazy;
pub mod stream;

pub use combinators::{filter, fold, map, window, Worker};
pub use future::{Future, FutureError, FutureHeader, FUTURE_KIND};
pub use lazy::{Lazy, LazyHeader, LAZY_KIND};
pub use stream::{Next, Stream, StreamHeader, STREAM_KIND};
