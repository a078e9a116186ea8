//! Memoized cell. The computation is process-local (a closure can't live
//! in shared memory); only the resulting value is shared. The first
//! `force()` across every process racing for it runs the computation; the
//! rest sleep and then observe its result.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use shm_primitives::Region;
use static_assertions::const_assert;
use zeroipc_sync::futex::{futex_wait, futex_wake_all};

pub const LAZY_KIND: u32 = 13;

const STATE_PENDING: u32 = 0;
const STATE_COMPUTING: u32 = 1;
const STATE_COMPUTED: u32 = 2;

#[repr(C)]
pub struct LazyHeader {
    pub kind: u32,
    pub state: AtomicU32,
    pub compute_count: AtomicU64,
}

const_assert!(size_of::<LazyHeader>() == 16);

pub struct Lazy<T: Copy> {
    region: Region,
    header_offset: usize,
    value_offset: usize,
    _marker: std::marker::PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for Lazy<T> {}
unsafe impl<T: Copy + Send> Sync for Lazy<T> {}

impl<T: Copy> Lazy<T> {
    pub fn required_bytes() -> usize {
        size_of::<LazyHeader>() + size_of::<T>()
    }

    fn header(&self) -> &LazyHeader {
        unsafe { self.region.get::<LazyHeader>(self.header_offset) }
    }

    /// # Safety
    /// `header_offset` must be exclusively reserved for `required_bytes()` bytes.
    pub unsafe fn init(region: Region, header_offset: usize) -> Self {
        let header = unsafe { region.get_mut::<LazyHeader>(header_offset) };
        header.kind = LAZY_KIND;
        header.state = AtomicU32::new(STATE_PENDING);
        header.compute_count = AtomicU64::new(0);
        let value_offset = header_offset + size_of::<LazyHeader>();
        Self { region, header_offset, value_offset, _marker: std::marker::PhantomData }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed lazy cell.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        let value_offset = header_offset + size_of::<LazyHeader>();
        Self { region, header_offset, value_offset, _marker: std::marker::PhantomData }
    }

    fn futex_word(&self) -> &AtomicU32 {
        &self.header().state
    }

    /// Returns the memoized value, computing it via `compute` at most once
    /// across every process sharing this cell.
    pub fn force(&self, compute: impl FnOnce() -> T) -> T {
        let header = self.header();
        loop {
            match header.state.compare_exchange(
                STATE_PENDING,
                STATE_COMPUTING,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let value = compute();
                    unsafe {
                        *self.region.get_mut::<T>(self.value_offset) = value;
                    }
                    header.compute_count.fetch_add(1, Ordering::Relaxed);
                    header.state.store(STATE_COMPUTED, Ordering::Release);
                    futex_wake_all(self.futex_word());
                    return value;
                }
                Err(STATE_COMPUTED) => {
                    return unsafe { *self.region.get::<T>(self.value_offset) };
                }
                Err(_observed_computing) => {
                    futex_wait(self.futex_word(), STATE_COMPUTING, None);
                }
            }
        }
    }

    pub fn peek(&self) -> Option<T> {
        if self.header().state.load(Ordering::Acquire) == STATE_COMPUTED {
            Some(unsafe { *self.region.get::<T>(self.value_offset) })
        } else {
            None
        }
    }

    pub fn compute_count(&self) -> u64 {
        self.header().compute_count.load(Ordering::Relaxed)
    }
}
