//! Bounded MPMC ring buffer (Queue<T>).
//!
//! Implements the slot-reservation protocol described by the spec: `head`
//! and `tail` are CAS-reserved first, payload IO happens second, then a
//! per-slot sequence number is published so a consumer can never observe a
//! reserved-but-not-yet-written slot. This closes the reserve-then-write
//! visibility gap the bare head/tail design leaves open for `T` wider than
//! a machine word.

use core::mem::{align_of, size_of};
use core::ptr;

use crate::region::Region;
use crate::sync::{AtomicU64, Ordering, spin_loop};

pub const QUEUE_KIND: u32 = 2;

/// Queue header. `head`/`tail` are monotonically increasing reservation
/// counters; the slot index is `counter & mask`.
#[repr(C, align(64))]
pub struct QueueHeader {
    pub kind: u32,
    _pad0: u32,
    pub capacity: u64,
    pub head: AtomicU64,
    pub tail: AtomicU64,
    _pad1: [u8; 32],
}

const _: () = assert!(core::mem::size_of::<QueueHeader>() == 64);

impl QueueHeader {
    fn init(&mut self, capacity: u64) {
        self.kind = QUEUE_KIND;
        self._pad0 = 0;
        self.capacity = capacity;
        self.head = AtomicU64::new(0);
        self.tail = AtomicU64::new(0);
        self._pad1 = [0; 32];
    }

    #[inline]
    fn mask(&self) -> u64 {
        self.capacity - 1
    }
}

#[repr(C)]
struct Slot<T> {
    sequence: AtomicU64,
    value: core::mem::MaybeUninit<T>,
}

/// Errors returned by queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    Full,
    Empty,
}

/// A lock-free bounded MPMC queue backed by a region.
pub struct Queue<T> {
    region: Region,
    header_offset: usize,
    slots_offset: usize,
    _marker: core::marker::PhantomData<T>,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T: Copy> Queue<T> {
    /// Initialize a new queue in the region.
    ///
    /// # Safety
    ///
    /// The region must be writable and exclusively owned during initialization.
    pub unsafe fn init(region: Region, header_offset: usize, capacity: u64) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "capacity must be a power of two >= 2"
        );
        assert!(
            header_offset.is_multiple_of(64),
            "header_offset must be 64-byte aligned"
        );
        assert!(align_of::<T>() <= 64, "entry alignment must be <= 64");

        let slots_offset = align_up(header_offset + size_of::<QueueHeader>(), align_of::<Slot<T>>());
        let required = slots_offset + (capacity as usize * size_of::<Slot<T>>());
        assert!(required <= region.len(), "region too small for queue");

        let header = unsafe { region.get_mut::<QueueHeader>(header_offset) };
        header.init(capacity);

        for i in 0..capacity as usize {
            let slot = unsafe { region.get_mut::<Slot<T>>(slots_offset + i * size_of::<Slot<T>>()) };
            slot.sequence = AtomicU64::new(0);
        }

        Self {
            region,
            header_offset,
            slots_offset,
            _marker: core::marker::PhantomData,
        }
    }

    /// Attach to an existing queue in the region.
    ///
    /// # Safety
    ///
    /// The region must contain a valid, initialized queue header.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        assert!(
            header_offset.is_multiple_of(64),
            "header_offset must be 64-byte aligned"
        );
        let header = unsafe { region.get::<QueueHeader>(header_offset) };
        let capacity = header.capacity;
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "invalid queue capacity"
        );
        let slots_offset = align_up(header_offset + size_of::<QueueHeader>(), align_of::<Slot<T>>());
        let required = slots_offset + (capacity as usize * size_of::<Slot<T>>());
        assert!(required <= region.len(), "region too small for queue");

        Self {
            region,
            header_offset,
            slots_offset,
            _marker: core::marker::PhantomData,
        }
    }

    #[inline]
    fn header(&self) -> &QueueHeader {
        unsafe { self.region.get::<QueueHeader>(self.header_offset) }
    }

    #[inline]
    unsafe fn slot(&self, index: u64) -> &Slot<T> {
        let off = self.slots_offset + (index & self.header().mask()) as usize * size_of::<Slot<T>>();
        unsafe { self.region.get::<Slot<T>>(off) }
    }

    /// Bytes needed for a queue header plus `capacity` slots, starting at a
    /// 64-byte-aligned `header_offset` of 0. Callers allocating at a
    /// non-zero offset should align that offset to 64 first.
    pub fn required_bytes(capacity: u64) -> usize {
        let slots_offset = align_up(size_of::<QueueHeader>(), align_of::<Slot<T>>());
        slots_offset + capacity as usize * size_of::<Slot<T>>()
    }

    /// Returns the queue capacity (including the one reserved slot).
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.header().capacity
    }

    /// Usable capacity: `capacity - 1` (one slot is reserved to
    /// distinguish full from empty).
    #[inline]
    pub fn usable_capacity(&self) -> u64 {
        self.header().capacity - 1
    }

    /// Push a value. Lock-free; many producers may call concurrently.
    pub fn push(&self, value: T) -> Result<(), RingError> {
        let header = self.header();
        let usable = header.capacity - 1;

        loop {
            let tail = header.tail.load(Ordering::Relaxed);
            let head = header.head.load(Ordering::Acquire);
            if tail.wrapping_sub(head) >= usable {
                return Err(RingError::Full);
            }
            let next = tail.wrapping_add(1);
            match header
                .tail
                .compare_exchange_weak(tail, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    let slot = unsafe { self.slot(tail) };
                    unsafe {
                        let ptr = slot.value.as_ptr() as *mut T;
                        ptr::write(ptr, value);
                    }
                    slot.sequence.store(tail.wrapping_add(1), Ordering::Release);
                    return Ok(());
                }
                Err(_) => {
                    spin_loop();
                    continue;
                }
            }
        }
    }

    /// Pop a value. Lock-free; many consumers may call concurrently.
    pub fn pop(&self) -> Result<T, RingError> {
        let header = self.header();

        loop {
            let head = header.head.load(Ordering::Relaxed);
            let tail = header.tail.load(Ordering::Acquire);
            if head == tail {
                return Err(RingError::Empty);
            }
            let next = head.wrapping_add(1);
            match header
                .head
                .compare_exchange_weak(head, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => {
                    let slot = unsafe { self.slot(head) };
                    let expected = head.wrapping_add(1);
                    while slot.sequence.load(Ordering::Acquire) != expected {
                        spin_loop();
                    }
                    let value = unsafe { ptr::read(slot.value.as_ptr()) };
                    return Ok(value);
                }
                Err(_) => {
                    spin_loop();
                    continue;
                }
            }
        }
    }

    /// Approximate number of elements currently enqueued.
    pub fn len_approx(&self) -> u64 {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let head = header.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty_approx(&self) -> bool {
        self.len_approx() == 0
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    (value + (align - 1)) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::HeapRegion;

    #[test]
    fn single_threaded_round_trip() {
        let heap = HeapRegion::new_zeroed(4096);
        let queue: Queue<u64> = unsafe { Queue::init(heap.region(), 0, 8) };
        for i in 0..7u64 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.push(99), Err(RingError::Full));
        for i in 0..7u64 {
            assert_eq!(queue.pop(), Ok(i));
        }
        assert_eq!(queue.pop(), Err(RingError::Empty));
    }

    #[test]
    fn boundary_accepts_exactly_capacity_minus_one() {
        let heap = HeapRegion::new_zeroed(4096);
        let queue: Queue<u8> = unsafe { Queue::init(heap.region(), 0, 16) };
        let mut accepted = 0;
        while queue.push(1).is_ok() {
            accepted += 1;
        }
        assert_eq!(accepted, 15);
    }
}
