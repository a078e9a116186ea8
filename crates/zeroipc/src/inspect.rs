//! Read-only inspection surface: walks a segment's directory and decodes
//! each entry's header into a `Display`-able status snapshot, without
//! requiring the typed facade in [`crate::structures`] or any write access.
//! `zeroipc-cli` is the only consumer; nothing else in this crate depends
//! on this module, and this module never depends on anything in
//! `structures.rs`/`sync.rs`/`codata.rs` beyond the raw header types.
//!
//! Grounded on the `Display`-based status idiom used for read-only
//! diagnostics elsewhere in this stack (slot/ring occupancy snapshots),
//! generalized here to cover every kind this crate defines.

use std::fmt;
use std::sync::atomic::Ordering;

use shm_primitives::{ArrayHeader, MapHeader, QueueHeader, StackHeader};
use zeroipc_codata::{FutureHeader, LazyHeader, StreamHeader};
use zeroipc_segment::{Segment, SegmentConfig, SegmentError};
use zeroipc_sync::{BarrierHeader, ChannelHeader, LatchHeader, SemaphoreHeader};

use crate::kind::Kind;

/// Maps `name` `PROT_READ`-only and returns a handle for walking its
/// directory. Never acquires the creation lock and never writes.
pub fn open_readonly(name: &str) -> Result<SegmentView, SegmentError> {
    let segment = Segment::open_readonly(name, SegmentConfig::default())?;
    Ok(SegmentView::new(segment))
}

pub struct SegmentView {
    segment: Segment,
}

impl From<Segment> for SegmentView {
    /// Wraps an already-open handle, e.g. one pulled from a
    /// `zeroipc_segment::SegmentCache` by a polling caller that doesn't
    /// want to re-`mmap` on every tick.
    fn from(segment: Segment) -> Self {
        SegmentView::new(segment)
    }
}

impl SegmentView {
    pub fn new(segment: Segment) -> Self {
        Self { segment }
    }

    /// Every named entry in this segment's directory, each paired with a
    /// best-effort decode of its header.
    pub fn entries(&self) -> impl Iterator<Item = DirectoryEntryView> + '_ {
        self.segment.directory().list().into_iter().map(move |(name, offset, size)| {
            let status = self.status_at(offset);
            DirectoryEntryView { name, offset, size, status }
        })
    }

    /// Looks up one entry by name and decodes its header, if present.
    pub fn status(&self, name: &str) -> Option<StatusSnapshot> {
        let (offset, _size) = self.segment.directory().find(name)?;
        Some(self.status_at(offset))
    }

    fn status_at(&self, offset: u32) -> StatusSnapshot {
        let region = unsafe { self.segment.region() };
        let tag = unsafe { *region.get::<u32>(offset as usize) };
        match Kind::from_u32(tag) {
            Some(Kind::Array) => {
                let h = unsafe { region.get::<ArrayHeader>(offset as usize) };
                StatusSnapshot::Array { capacity: h.capacity, elem_size: h.elem_size }
            }
            Some(Kind::Queue) => {
                let h = unsafe { region.get::<QueueHeader>(offset as usize) };
                StatusSnapshot::Queue {
                    capacity: h.capacity,
                    head: h.head.load(Ordering::Relaxed),
                    tail: h.tail.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Stack) => {
                let h = unsafe { region.get::<StackHeader>(offset as usize) };
                StatusSnapshot::Stack { capacity: h.capacity }
            }
            Some(k @ (Kind::Map | Kind::Set)) => {
                let h = unsafe { region.get::<MapHeader>(offset as usize) };
                StatusSnapshot::Map {
                    is_set: k == Kind::Set,
                    capacity: h.capacity,
                    size: h.size.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Semaphore) => {
                let h = unsafe { region.get::<SemaphoreHeader>(offset as usize) };
                StatusSnapshot::Semaphore {
                    count: h.count.load(Ordering::Relaxed),
                    max_count: h.max_count,
                    waiters: h.waiters.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Barrier) => {
                let h = unsafe { region.get::<BarrierHeader>(offset as usize) };
                StatusSnapshot::Barrier {
                    n_participants: h.n_participants,
                    arrived: h.arrived.load(Ordering::Relaxed),
                    generation: h.generation.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Latch) => {
                let h = unsafe { region.get::<LatchHeader>(offset as usize) };
                StatusSnapshot::Latch {
                    initial_count: h.initial_count,
                    count: h.count.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Channel) => {
                let h = unsafe { region.get::<ChannelHeader>(offset as usize) };
                StatusSnapshot::Channel {
                    capacity: h.capacity,
                    closed: h.closed.load(Ordering::Relaxed) != 0,
                }
            }
            Some(Kind::Future) => {
                let h = unsafe { region.get::<FutureHeader>(offset as usize) };
                StatusSnapshot::Future { state: h.state.load(Ordering::Relaxed) }
            }
            Some(Kind::Lazy) => {
                let h = unsafe { region.get::<LazyHeader>(offset as usize) };
                StatusSnapshot::Lazy {
                    state: h.state.load(Ordering::Relaxed),
                    compute_count: h.compute_count.load(Ordering::Relaxed),
                }
            }
            Some(Kind::Stream) => {
                let h = unsafe { region.get::<StreamHeader>(offset as usize) };
                StatusSnapshot::Stream {
                    capacity: h.capacity,
                    write_seq: h.write_seq.load(Ordering::Relaxed),
                    closed: h.closed.load(Ordering::Relaxed) != 0,
                }
            }
            Some(Kind::Pool) | Some(Kind::Ring) | None => StatusSnapshot::Untyped,
        }
    }
}

pub struct DirectoryEntryView {
    pub name: String,
    pub offset: u32,
    pub size: u32,
    pub status: StatusSnapshot,
}

/// A point-in-time snapshot of one structure's header fields. `Pool` and
/// `Ring` predate the kind-tag convention (see the kind-tag design note)
/// and so always report [`StatusSnapshot::Untyped`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusSnapshot {
    Array { capacity: u64, elem_size: u64 },
    Queue { capacity: u64, head: u64, tail: u64 },
    Stack { capacity: u64 },
    Map { is_set: bool, capacity: u64, size: u64 },
    Semaphore { count: i64, max_count: i64, waiters: i64 },
    Barrier { n_participants: u64, arrived: u64, generation: u32 },
    Latch { initial_count: u64, count: u64 },
    Channel { capacity: u64, closed: bool },
    Future { state: u32 },
    Lazy { state: u32, compute_count: u64 },
    Stream { capacity: u64, write_seq: u64, closed: bool },
    Untyped,
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusSnapshot::Array { capacity, elem_size } => {
                write!(f, "array: capacity={capacity} elem_size={elem_size}")
            }
            StatusSnapshot::Queue { capacity, head, tail } => {
                write!(f, "queue: capacity={capacity} head={head} tail={tail}")
            }
            StatusSnapshot::Stack { capacity } => write!(f, "stack: capacity={capacity}"),
            StatusSnapshot::Map { is_set, capacity, size } => {
                write!(f, "{}: capacity={capacity} size={size}", if *is_set { "set" } else { "map" })
            }
            StatusSnapshot::Semaphore { count, max_count, waiters } => {
                write!(f, "semaphore: count={count} max_count={max_count} waiters={waiters}")
            }
            StatusSnapshot::Barrier { n_participants, arrived, generation } => {
                write!(f, "barrier: n_participants={n_participants} arrived={arrived} generation={generation}")
            }
            StatusSnapshot::Latch { initial_count, count } => {
                write!(f, "latch: initial_count={initial_count} count={count}")
            }
            StatusSnapshot::Channel { capacity, closed } => {
                write!(f, "channel: capacity={capacity} closed={closed}")
            }
            StatusSnapshot::Future { state } => write!(f, "future: state={state}"),
            StatusSnapshot::Lazy { state, compute_count } => {
                write!(f, "lazy: state={state} compute_count={compute_count}")
            }
            StatusSnapshot::Stream { capacity, write_seq, closed } => {
                write!(f, "stream: capacity={capacity} write_seq={write_seq} closed={closed}")
            }
            StatusSnapshot::Untyped => write!(f, "raw structure (no kind tag to decode, e.g. Pool/Ring)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::Array;
    use crate::sync::Semaphore;
    use zeroipc_segment::Segment as RawSegment;

    fn unique_name(tag: &str) -> String {
        format!("/zeroipc_inspect_{tag}_{}", std::process::id())
    }

    #[test]
    fn entries_decode_known_kinds_and_leave_untouched_ones_untyped() {
        let name = unique_name("entries");
        let segment = RawSegment::create(&name, 1 << 16, SegmentConfig::default()).unwrap();
        let _array = Array::<u8>::create(&segment, "a", 4).unwrap();
        let _sem = Semaphore::create(&segment, "s", 1, 4).unwrap();
        drop(segment);

        let view = open_readonly(&name).unwrap();
        let statuses: Vec<_> = view.entries().map(|e| (e.name, e.status)).collect();
        assert!(statuses.iter().any(|(n, s)| n == "a" && matches!(s, StatusSnapshot::Array { capacity: 4, .. })));
        assert!(statuses
            .iter()
            .any(|(n, s)| n == "s" && matches!(s, StatusSnapshot::Semaphore { count: 1, max_count: 4, .. })));

        assert!(matches!(view.status("a"), Some(StatusSnapshot::Array { .. })));
        assert!(view.status("missing").is_none());

        RawSegment::unlink(&name).unwrap();
    }
}
