//! Counting semaphore over shared memory. `acquire` blocks via futex;
//! `release` bumps the count and wakes one waiter.

use std::mem::size_of;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::Duration;

use shm_primitives::Region;
use static_assertions::const_assert_eq;

use crate::error::SyncError;
use crate::futex::{futex_wait, futex_wake_all, futex_wake_one, FutexWaitResult};

pub const SEMAPHORE_KIND: u32 = 8;

#[repr(C, align(64))]
pub struct SemaphoreHeader {
    pub kind: u32,
    _pad0: u32,
    pub max_count: i64,
    pub count: AtomicI64,
    pub waiters: AtomicI64,
    pub futex_word: AtomicU32,
    _pad1: [u8; 28],
}

const_assert_eq!(size_of::<SemaphoreHeader>(), 64);

/// `max_count == 0` means uncapped (`release` never overflows).
pub struct Semaphore {
    region: Region,
    header_offset: usize,
}

unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}

impl Semaphore {
    pub fn required_bytes() -> usize {
        size_of::<SemaphoreHeader>()
    }

    fn header(&self) -> &SemaphoreHeader {
        unsafe { self.region.get::<SemaphoreHeader>(self.header_offset) }
    }

    /// # Safety
    /// `header_offset` must be 64-byte aligned and exclusively reserved.
    pub unsafe fn init(region: Region, header_offset: usize, initial_count: i64, max_count: i64) -> Self {
        debug_assert_eq!(header_offset % 64, 0);
        let header = unsafe { region.get_mut::<SemaphoreHeader>(header_offset) };
        header.kind = SEMAPHORE_KIND;
        header.max_count = max_count;
        header.count = AtomicI64::new(initial_count);
        header.waiters = AtomicI64::new(0);
        header.futex_word = AtomicU32::new(0);
        tracing::debug!(header_offset, initial_count, max_count, "semaphore initialized");
        Self { region, header_offset }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed header.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        Self { region, header_offset }
    }

    /// Non-blocking acquire: succeeds only if a permit is immediately available.
    pub fn try_acquire(&self) -> Result<(), SyncError> {
        let header = self.header();
        let mut cur = header.count.load(Ordering::Acquire);
        loop {
            if cur <= 0 {
                return Err(SyncError::TimedOut);
            }
            match header.count.compare_exchange_weak(
                cur,
                cur - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => cur = actual,
            }
        }
    }

    /// Block until a permit is available.
    pub fn acquire(&self) {
        self.acquire_for(None).expect("acquire() with no timeout cannot time out");
    }

    /// Block until a permit is available or `timeout` elapses.
    pub fn acquire_for(&self, timeout: Option<Duration>) -> Result<(), SyncError> {
        self.acquire_for_cancellable(timeout, || false)
    }

    /// Like `acquire_for`, but `cancel` is polled every time this wakes
    /// (spuriously, on a forced `wake_all`, or after a real release that
    /// lost the race for the permit) and a `true` result ends the wait
    /// immediately with `SyncError::Closed`. Used by `Channel` so a
    /// `close()` on another process can pull blocked waiters out of a
    /// semaphore wait the semaphore itself has no notion of "closed" for.
    pub(crate) fn acquire_for_cancellable(
        &self,
        timeout: Option<Duration>,
        cancel: impl Fn() -> bool,
    ) -> Result<(), SyncError> {
        let header = self.header();
        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            if self.try_acquire().is_ok() {
                return Ok(());
            }
            if cancel() {
                return Err(SyncError::Closed);
            }
            header.waiters.fetch_add(1, Ordering::Relaxed);
            let observed = header.futex_word.load(Ordering::Acquire);
            let remaining = match deadline {
                Some(dl) => {
                    let now = std::time::Instant::now();
                    if now >= dl {
                        header.waiters.fetch_sub(1, Ordering::Relaxed);
                        return Err(SyncError::TimedOut);
                    }
                    Some(dl - now)
                }
                None => None,
            };
            let result = futex_wait(&header.futex_word, observed, remaining);
            header.waiters.fetch_sub(1, Ordering::Relaxed);
            if result == FutexWaitResult::TimedOut {
                return Err(SyncError::TimedOut);
            }
        }
    }

    /// Bumps the futex word and wakes every waiter without touching `count`.
    /// A woken waiter re-checks `try_acquire` (and, via `acquire_for_cancellable`,
    /// its cancel predicate) rather than being granted a permit it didn't earn.
    pub(crate) fn wake_all(&self) {
        let header = self.header();
        header.futex_word.fetch_add(1, Ordering::Release);
        futex_wake_all(&header.futex_word);
    }

    /// Release a permit, waking one waiter. Fails if `max_count > 0` and the
    /// count is already at capacity.
    pub fn release(&self) -> Result<(), SyncError> {
        let header = self.header();
        let mut cur = header.count.load(Ordering::Acquire);
        loop {
            if header.max_count > 0 && cur >= header.max_count {
                return Err(SyncError::Overflow);
            }
            match header.count.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        header.futex_word.fetch_add(1, Ordering::Release);
        futex_wake_one(&header.futex_word);
        Ok(())
    }

    pub fn count(&self) -> i64 {
        self.header().count.load(Ordering::Acquire)
    }

    pub fn waiters_approx(&self) -> i64 {
        self.header().waiters.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;

    fn fresh(initial: i64, max: i64) -> (HeapRegion, Semaphore) {
        let heap = HeapRegion::new_zeroed(Semaphore::required_bytes());
        let region = heap.region();
        let sem = unsafe { Semaphore::init(region, 0, initial, max) };
        (heap, sem)
    }

    #[test]
    fn try_acquire_respects_available_count() {
        let (_heap, sem) = fresh(2, 2);
        assert!(sem.try_acquire().is_ok());
        assert!(sem.try_acquire().is_ok());
        assert!(sem.try_acquire().is_err());
    }

    #[test]
    fn release_restores_a_permit() {
        let (_heap, sem) = fresh(1, 2);
        sem.try_acquire().unwrap();
        assert!(sem.try_acquire().is_err());
        sem.release().unwrap();
        assert!(sem.try_acquire().is_ok());
    }

    #[test]
    fn release_past_max_count_overflows() {
        let (_heap, sem) = fresh(2, 2);
        let err = sem.release().unwrap_err();
        assert_eq!(err, SyncError::Overflow);
    }

    #[test]
    fn acquire_for_times_out_when_starved() {
        let (_heap, sem) = fresh(0, 4);
        let err = sem.acquire_for(Some(Duration::from_millis(20))).unwrap_err();
        assert_eq!(err, SyncError::TimedOut);
    }

    #[test]
    fn blocked_acquirer_is_woken_by_release() {
        use std::sync::Arc;
        let heap = Arc::new(HeapRegion::new_zeroed(Semaphore::required_bytes()));
        let region = heap.region();
        let sem = Arc::new(unsafe { Semaphore::init(region, 0, 0, 4) });

        let sem2 = sem.clone();
        let _heap2 = heap.clone();
        let handle = std::thread::spawn(move || {
            sem2.acquire_for(Some(Duration::from_secs(5))).unwrap();
        });

        std::thread::sleep(Duration::from_millis(20));
        sem.release().unwrap();
        handle.join().unwrap();
    }
}
