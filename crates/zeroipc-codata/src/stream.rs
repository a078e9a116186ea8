//! Append-only multi-cast log. Each slot publishes its own sequence
//! number, so a reader can tell a slot it is about to read has already
//! been overwritten (it has fallen behind) rather than reading torn data.

use std::mem::size_of;
use std::sync::atomic::{AtomicU64, Ordering};

use shm_primitives::Region;
use static_assertions::const_assert_eq;

pub const STREAM_KIND: u32 = 14;

#[repr(C, align(64))]
pub struct StreamHeader {
    pub kind: u32,
    _pad0: u32,
    pub capacity: u64,
    pub write_seq: AtomicU64,
    pub closed: AtomicU64,
    _pad1: [u8; 32],
}

const_assert_eq!(size_of::<StreamHeader>(), 64);

#[repr(C)]
struct Slot<T> {
    seq: AtomicU64,
    value: std::mem::MaybeUninit<T>,
}

/// What `next(cursor)` returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Next<T> {
    Item(T),
    /// Stream closed and the reader has consumed everything up to `write_seq`.
    EndOfStream,
    /// The slot the reader wanted has already been overwritten; resume
    /// from `new_cursor`.
    Lagged { new_cursor: u64 },
    /// Reader is caught up to the writer; nothing new yet, not closed.
    WouldBlock,
}

pub struct Stream<T: Copy> {
    region: Region,
    header_offset: usize,
    slots_offset: usize,
    _marker: std::marker::PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for Stream<T> {}
unsafe impl<T: Copy + Send> Sync for Stream<T> {}

impl<T: Copy> Stream<T> {
    pub fn required_bytes(capacity: u64) -> usize {
        let slots_offset = align_up(size_of::<StreamHeader>(), std::mem::align_of::<Slot<T>>());
        slots_offset + capacity as usize * size_of::<Slot<T>>()
    }

    fn header(&self) -> &StreamHeader {
        unsafe { self.region.get::<StreamHeader>(self.header_offset) }
    }

    unsafe fn slot(&self, seq: u64) -> &Slot<T> {
        let index = (seq & (self.header().capacity - 1)) as usize;
        let off = self.slots_offset + index * size_of::<Slot<T>>();
        unsafe { self.region.get::<Slot<T>>(off) }
    }

    /// # Safety
    /// `header_offset` must be 64-byte aligned and exclusively reserved for
    /// `required_bytes(capacity)` bytes; `capacity` must be a power of two.
    pub unsafe fn init(region: Region, header_offset: usize, capacity: u64) -> Self {
        assert!(capacity.is_power_of_two() && capacity >= 2);
        let header = unsafe { region.get_mut::<StreamHeader>(header_offset) };
        header.kind = STREAM_KIND;
        header.capacity = capacity;
        header.write_seq = AtomicU64::new(0);
        header.closed = AtomicU64::new(0);

        let slots_offset = align_up(header_offset + size_of::<StreamHeader>(), std::mem::align_of::<Slot<T>>());
        for i in 0..capacity as usize {
            let slot = unsafe { region.get_mut::<Slot<T>>(slots_offset + i * size_of::<Slot<T>>()) };
            slot.seq = AtomicU64::new(u64::MAX); // never-written sentinel
        }

        Self { region, header_offset, slots_offset, _marker: std::marker::PhantomData }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed stream.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        let header = unsafe { region.get::<StreamHeader>(header_offset) };
        let slots_offset = align_up(header_offset + size_of::<StreamHeader>(), std::mem::align_of::<Slot<T>>());
        debug_assert!(header.capacity.is_power_of_two());
        Self { region, header_offset, slots_offset, _marker: std::marker::PhantomData }
    }

    pub fn capacity(&self) -> u64 {
        self.header().capacity
    }

    pub fn write_seq(&self) -> u64 {
        self.header().write_seq.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.header().closed.load(Ordering::Acquire) != 0
    }

    pub fn close(&self) {
        self.header().closed.store(1, Ordering::Release);
    }

    /// Append a value, returning the sequence number it was published at.
    pub fn emit(&self, value: T) -> u64 {
        let header = self.header();
        let seq = header.write_seq.fetch_add(1, Ordering::AcqRel);
        let slot = unsafe { self.slot(seq) };
        unsafe {
            std::ptr::write(slot.value.as_ptr().cast_mut(), value);
        }
        slot.seq.store(seq, Ordering::Release);
        seq
    }

    /// Returns a new cursor starting at the oldest value still in the
    /// window, for a reader with no prior cursor.
    pub fn cursor_at_tail(&self) -> u64 {
        let write_seq = self.write_seq();
        write_seq.saturating_sub(self.header().capacity)
    }

    /// Attempt to read the value at `cursor`. The cursor does not live in
    /// shared memory; callers own and advance it themselves.
    pub fn next(&self, cursor: u64) -> Next<T> {
        let write_seq = self.write_seq();
        if cursor >= write_seq {
            return if self.is_closed() { Next::EndOfStream } else { Next::WouldBlock };
        }
        let slot = unsafe { self.slot(cursor) };
        let published = slot.seq.load(Ordering::Acquire);
        if published != cursor {
            let oldest_available = write_seq.saturating_sub(self.header().capacity);
            return Next::Lagged { new_cursor: oldest_available.max(cursor + 1) };
        }
        let value = unsafe { std::ptr::read(slot.value.as_ptr()) };
        // Re-check after reading: if the writer lapped us mid-read, the
        // bytes we just copied may be torn. The slot's sequence will have
        // moved past `cursor` if so.
        if slot.seq.load(Ordering::Acquire) != cursor {
            let oldest_available = self.write_seq().saturating_sub(self.header().capacity);
            return Next::Lagged { new_cursor: oldest_available.max(cursor + 1) };
        }
        Next::Item(value)
    }
}

const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;

    fn fresh(capacity: u64) -> (HeapRegion, Stream<u32>) {
        let heap = HeapRegion::new_zeroed(Stream::<u32>::required_bytes(capacity));
        let region = heap.region();
        let stream = unsafe { Stream::<u32>::init(region, 0, capacity) };
        (heap, stream)
    }

    #[test]
    fn reader_that_keeps_up_sees_every_value_in_order() {
        let (_heap, stream) = fresh(8);
        for v in 0..5u32 {
            stream.emit(v);
        }
        let mut cursor = 0u64;
        let mut seen = Vec::new();
        loop {
            match stream.next(cursor) {
                Next::Item(v) => {
                    seen.push(v);
                    cursor += 1;
                }
                Next::WouldBlock => break,
                other => panic!("unexpected: {other:?}"),
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn slow_reader_gets_lagged_once_overwritten() {
        let (_heap, stream) = fresh(4);
        for v in 0..10u32 {
            stream.emit(v);
        }
        match stream.next(0) {
            Next::Lagged { new_cursor } => assert!(new_cursor > 0),
            other => panic!("expected Lagged, got {other:?}"),
        }
    }

    #[test]
    fn closed_stream_reports_end_of_stream_once_drained() {
        let (_heap, stream) = fresh(4);
        stream.emit(1);
        stream.close();
        assert_eq!(stream.next(0), Next::Item(1));
        assert_eq!(stream.next(1), Next::EndOfStream);
    }
}
