//! One-shot countdown latch: `count_down` decrements toward zero, `wait`
//! blocks until it gets there. Unlike `Barrier`, never resets.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use shm_primitives::Region;
use static_assertions::const_assert_eq;

use crate::error::SyncError;
use crate::futex::{futex_wait, futex_wake_all};

pub const LATCH_KIND: u32 = 10;

#[repr(C, align(64))]
pub struct LatchHeader {
    pub kind: u32,
    _pad0: u32,
    pub initial_count: u64,
    pub count: AtomicU64,
    pub futex_word: AtomicU32,
    _pad1: [u8; 36],
}

const_assert_eq!(size_of::<LatchHeader>(), 64);

pub struct Latch {
    region: Region,
    header_offset: usize,
}

unsafe impl Send for Latch {}
unsafe impl Sync for Latch {}

impl Latch {
    pub fn required_bytes() -> usize {
        size_of::<LatchHeader>()
    }

    fn header(&self) -> &LatchHeader {
        unsafe { self.region.get::<LatchHeader>(self.header_offset) }
    }

    /// # Safety
    /// `header_offset` must be 64-byte aligned and exclusively reserved.
    pub unsafe fn init(region: Region, header_offset: usize, initial_count: u64) -> Self {
        let header = unsafe { region.get_mut::<LatchHeader>(header_offset) };
        header.kind = LATCH_KIND;
        header.initial_count = initial_count;
        header.count = AtomicU64::new(initial_count);
        header.futex_word = AtomicU32::new(0);
        tracing::debug!(header_offset, initial_count, "latch initialized");
        Self { region, header_offset }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed header.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        Self { region, header_offset }
    }

    /// Decrement the count by `by`, saturating at zero. Wakes all waiters
    /// once it reaches zero.
    pub fn count_down(&self, by: u64) {
        let header = self.header();
        let mut cur = header.count.load(Ordering::Acquire);
        loop {
            let next = cur.saturating_sub(by);
            match header.count.compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    if next == 0 {
                        header.futex_word.store(1, Ordering::Release);
                        futex_wake_all(&header.futex_word);
                    }
                    return;
                }
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.header().count.load(Ordering::Acquire)
    }

    pub fn wait(&self) {
        self.wait_for(None).expect("wait() with no timeout cannot time out");
    }

    pub fn wait_for(&self, timeout: Option<Duration>) -> Result<(), SyncError> {
        let header = self.header();
        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            let cur = header.count.load(Ordering::Acquire);
            if cur == 0 {
                return Ok(());
            }
            let remaining = match deadline {
                Some(dl) => {
                    let now = std::time::Instant::now();
                    if now >= dl {
                        return Err(SyncError::TimedOut);
                    }
                    Some(dl - now)
                }
                None => None,
            };
            futex_wait(&header.futex_word, 0, remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;
    use std::sync::Arc;

    #[test]
    fn wait_returns_immediately_once_zero() {
        let heap = HeapRegion::new_zeroed(Latch::required_bytes());
        let latch = unsafe { Latch::init(heap.region(), 0, 2) };
        latch.count_down(1);
        assert_eq!(latch.count(), 1);
        latch.count_down(1);
        assert_eq!(latch.count(), 0);
        latch.wait();
    }

    #[test]
    fn waiter_is_woken_by_final_count_down() {
        let heap = Arc::new(HeapRegion::new_zeroed(Latch::required_bytes()));
        let latch = Arc::new(unsafe { Latch::init(heap.region(), 0, 1) });

        let l2 = latch.clone();
        let _h2 = heap.clone();
        let handle = std::thread::spawn(move || l2.wait_for(Duration::from_secs(5).into()));

        std::thread::sleep(Duration::from_millis(20));
        latch.count_down(1);
        handle.join().unwrap().unwrap();
    }
}
