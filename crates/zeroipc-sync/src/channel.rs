//! Cross-process channel: a bounded MPMC queue gated by two semaphores
//! (`slots_free` / `items_available`) plus an atomic close flag. Capacity 1
//! degenerates into a rendezvous (unbuffered) channel, since then a sender
//! blocks until the single slot frees, i.e. until a receiver has taken the
//! previous item.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use shm_primitives::{Queue, Region, RingError};
use static_assertions::const_assert_eq;

use crate::error::SyncError;
use crate::semaphore::Semaphore;

pub const CHANNEL_KIND: u32 = 11;

const CLOSED_NO: u32 = 0;
const CLOSED_YES: u32 = 1;

#[repr(C, align(64))]
pub struct ChannelHeader {
    pub kind: u32,
    _pad0: u32,
    pub capacity: u64,
    pub closed: AtomicU32,
    _pad1: [u8; 44],
}

const_assert_eq!(size_of::<ChannelHeader>(), 64);

/// Layout, in order: `ChannelHeader` (64B) · `slots_free` semaphore (64B) ·
/// `items_available` semaphore (64B) · `Queue<T>` header + slots.
pub struct Channel<T: Copy> {
    region: Region,
    header_offset: usize,
    queue: Queue<T>,
    slots_free: Semaphore,
    items_available: Semaphore,
}

unsafe impl<T: Copy + Send> Send for Channel<T> {}
unsafe impl<T: Copy + Send> Sync for Channel<T> {}

impl<T: Copy> Channel<T> {
    pub fn required_bytes(capacity: u64) -> usize {
        size_of::<ChannelHeader>()
            + Semaphore::required_bytes()
            + Semaphore::required_bytes()
            + Queue::<T>::required_bytes(capacity)
    }

    fn header(&self) -> &ChannelHeader {
        unsafe { self.region.get::<ChannelHeader>(self.header_offset) }
    }

    fn semaphore_offsets(header_offset: usize) -> (usize, usize, usize) {
        let slots_free_offset = header_offset + size_of::<ChannelHeader>();
        let items_available_offset = slots_free_offset + Semaphore::required_bytes();
        let queue_offset = items_available_offset + Semaphore::required_bytes();
        (slots_free_offset, items_available_offset, queue_offset)
    }

    /// # Safety
    /// `header_offset` must be 64-byte aligned and exclusively reserved for
    /// `required_bytes(capacity)` bytes.
    pub unsafe fn init(region: Region, header_offset: usize, capacity: u64) -> Self {
        debug_assert!(capacity.is_power_of_two() && capacity >= 2);
        let header = unsafe { region.get_mut::<ChannelHeader>(header_offset) };
        header.kind = CHANNEL_KIND;
        header.capacity = capacity;
        header.closed = AtomicU32::new(CLOSED_NO);

        let usable = capacity - 1;
        let (slots_free_offset, items_available_offset, queue_offset) =
            Self::semaphore_offsets(header_offset);
        let slots_free = unsafe { Semaphore::init(region, slots_free_offset, usable as i64, usable as i64) };
        let items_available = unsafe { Semaphore::init(region, items_available_offset, 0, usable as i64) };
        let queue = unsafe { Queue::<T>::init(region, queue_offset, capacity) };

        Self { region, header_offset, queue, slots_free, items_available }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed channel.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        let (slots_free_offset, items_available_offset, queue_offset) =
            Self::semaphore_offsets(header_offset);
        let slots_free = unsafe { Semaphore::attach(region, slots_free_offset) };
        let items_available = unsafe { Semaphore::attach(region, items_available_offset) };
        let queue = unsafe { Queue::<T>::attach(region, queue_offset) };
        Self { region, header_offset, queue, slots_free, items_available }
    }

    pub fn capacity(&self) -> u64 {
        self.header().capacity - 1
    }

    pub fn is_closed(&self) -> bool {
        self.header().closed.load(Ordering::Acquire) == CLOSED_YES
    }

    /// Marks the channel closed. Outstanding items may still be drained by
    /// `recv`; subsequent `send` calls fail with `Closed`. Wakes any `send`
    /// or `recv` currently blocked so they observe the close promptly
    /// instead of waiting out their full timeout (or forever, with none).
    pub fn close(&self) {
        self.header().closed.store(CLOSED_YES, Ordering::Release);
        self.slots_free.wake_all();
        self.items_available.wake_all();
    }

    pub fn send(&self, value: T) -> Result<(), SyncError> {
        self.send_for(value, None)
    }

    pub fn try_send(&self, value: T) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.slots_free.try_acquire()?;
        self.queue.push(value).expect("slot reserved by slots_free semaphore");
        let _ = self.items_available.release();
        Ok(())
    }

    pub fn send_for(&self, value: T, timeout: Option<Duration>) -> Result<(), SyncError> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        self.slots_free.acquire_for_cancellable(timeout, || self.is_closed())?;
        if self.is_closed() {
            let _ = self.slots_free.release();
            return Err(SyncError::Closed);
        }
        self.queue.push(value).expect("slot reserved by slots_free semaphore");
        let _ = self.items_available.release();
        Ok(())
    }

    pub fn recv(&self) -> Result<T, SyncError> {
        self.recv_for(None)
    }

    pub fn try_recv(&self) -> Result<T, SyncError> {
        self.items_available.try_acquire().map_err(|_| {
            if self.is_closed() {
                SyncError::Closed
            } else {
                SyncError::TimedOut
            }
        })?;
        let value = match self.queue.pop() {
            Ok(v) => v,
            Err(RingError::Empty) => unreachable!("item reserved by items_available semaphore"),
            Err(_) => unreachable!(),
        };
        let _ = self.slots_free.release();
        Ok(value)
    }

    pub fn recv_for(&self, timeout: Option<Duration>) -> Result<T, SyncError> {
        match self.items_available.acquire_for_cancellable(timeout, || self.is_closed()) {
            Ok(()) => {}
            Err(SyncError::TimedOut) if self.is_closed() => return Err(SyncError::Closed),
            Err(e) => return Err(e),
        }
        let value = self
            .queue
            .pop()
            .expect("item reserved by items_available semaphore");
        let _ = self.slots_free.release();
        Ok(value)
    }

    pub fn len_approx(&self) -> u64 {
        self.queue.len_approx()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;
    use std::sync::Arc;

    fn fresh(capacity: u64) -> (HeapRegion, Channel<i32>) {
        let heap = HeapRegion::new_zeroed(Channel::<i32>::required_bytes(capacity));
        let region = heap.region();
        let chan = unsafe { Channel::<i32>::init(region, 0, capacity) };
        (heap, chan)
    }

    #[test]
    fn send_then_recv_preserves_value() {
        let (_heap, chan) = fresh(4);
        chan.try_send(42).unwrap();
        assert_eq!(chan.try_recv().unwrap(), 42);
    }

    #[test]
    fn fifo_order_is_preserved() {
        let (_heap, chan) = fresh(8);
        for v in 0..3 {
            chan.try_send(v).unwrap();
        }
        for expected in 0..3 {
            assert_eq!(chan.try_recv().unwrap(), expected);
        }
    }

    #[test]
    fn capacity_one_is_rendezvous() {
        let (_heap, chan) = fresh(2); // usable capacity 1
        chan.try_send(1).unwrap();
        assert!(chan.try_send(2).is_err());
        assert_eq!(chan.try_recv().unwrap(), 1);
        chan.try_send(2).unwrap();
        assert_eq!(chan.try_recv().unwrap(), 2);
    }

    #[test]
    fn send_after_close_fails() {
        let (_heap, chan) = fresh(4);
        chan.close();
        let err = chan.try_send(1).unwrap_err();
        assert_eq!(err, SyncError::Closed);
    }

    #[test]
    fn close_does_not_drop_buffered_items() {
        let (_heap, chan) = fresh(4);
        chan.try_send(7).unwrap();
        chan.close();
        assert_eq!(chan.try_recv().unwrap(), 7);
    }

    #[test]
    fn blocked_receiver_is_woken_by_send() {
        let heap = Arc::new(HeapRegion::new_zeroed(Channel::<i32>::required_bytes(4)));
        let chan = Arc::new(unsafe { Channel::<i32>::init(heap.region(), 0, 4) });

        let c2 = chan.clone();
        let _h2 = heap.clone();
        let handle = std::thread::spawn(move || c2.recv_for(Some(Duration::from_secs(5))));

        std::thread::sleep(Duration::from_millis(20));
        chan.send(99).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 99);
    }

    #[test]
    fn close_wakes_blocked_receiver() {
        let heap = Arc::new(HeapRegion::new_zeroed(Channel::<i32>::required_bytes(4)));
        let chan = Arc::new(unsafe { Channel::<i32>::init(heap.region(), 0, 4) });

        let c2 = chan.clone();
        let _h2 = heap.clone();
        let handle = std::thread::spawn(move || c2.recv_for(Some(Duration::from_secs(5))));

        std::thread::sleep(Duration::from_millis(20));
        chan.close();
        assert_eq!(handle.join().unwrap().unwrap_err(), SyncError::Closed);
    }

    #[test]
    fn close_wakes_blocked_sender() {
        let heap = Arc::new(HeapRegion::new_zeroed(Channel::<i32>::required_bytes(2)));
        let chan = Arc::new(unsafe { Channel::<i32>::init(heap.region(), 0, 2) }); // usable capacity 1
        chan.try_send(1).unwrap(); // fill the only slot

        let c2 = chan.clone();
        let _h2 = heap.clone();
        let handle = std::thread::spawn(move || c2.send_for(2, Some(Duration::from_secs(5))));

        std::thread::sleep(Duration::from_millis(20));
        chan.close();
        assert_eq!(handle.join().unwrap().unwrap_err(), SyncError::Closed);
    }
}
