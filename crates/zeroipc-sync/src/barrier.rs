//! Reusable cyclic barrier: `n_participants` processes call `wait()`, the
//! last arrival releases the whole generation and starts the next one.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use shm_primitives::Region;
use static_assertions::const_assert_eq;

use crate::error::SyncError;
use crate::futex::{futex_wait, futex_wake_all};

pub const BARRIER_KIND: u32 = 9;

#[repr(C, align(64))]
pub struct BarrierHeader {
    pub kind: u32,
    _pad0: u32,
    pub n_participants: u64,
    pub arrived: AtomicU64,
    pub generation: AtomicU32,
    _pad1: [u8; 36],
}

const_assert_eq!(size_of::<BarrierHeader>(), 64);

pub struct Barrier {
    region: Region,
    header_offset: usize,
}

unsafe impl Send for Barrier {}
unsafe impl Sync for Barrier {}

impl Barrier {
    pub fn required_bytes() -> usize {
        size_of::<BarrierHeader>()
    }

    fn header(&self) -> &BarrierHeader {
        unsafe { self.region.get::<BarrierHeader>(self.header_offset) }
    }

    /// # Safety
    /// `header_offset` must be 64-byte aligned and exclusively reserved.
    pub unsafe fn init(region: Region, header_offset: usize, n_participants: u64) -> Self {
        debug_assert!(n_participants > 0);
        let header = unsafe { region.get_mut::<BarrierHeader>(header_offset) };
        header.kind = BARRIER_KIND;
        header.n_participants = n_participants;
        header.arrived = AtomicU64::new(0);
        header.generation = AtomicU32::new(0);
        tracing::debug!(header_offset, n_participants, "barrier initialized");
        Self { region, header_offset }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed header.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        Self { region, header_offset }
    }

    pub fn generation(&self) -> u32 {
        self.header().generation.load(Ordering::Acquire)
    }

    /// Block until all `n_participants` have called `wait()`. Returns
    /// `true` to exactly one caller per generation (the one that released
    /// the rest), mirroring the convention of `std::sync::Barrier`.
    pub fn wait(&self) -> bool {
        self.wait_for(None).expect("wait() with no timeout cannot time out")
    }

    pub fn wait_for(&self, timeout: Option<Duration>) -> Result<bool, SyncError> {
        let header = self.header();
        let generation = header.generation.load(Ordering::Acquire);
        let arrived = header.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived == header.n_participants {
            header.arrived.store(0, Ordering::Release);
            header.generation.fetch_add(1, Ordering::Release);
            futex_wake_all(&header.generation);
            return Ok(true);
        }

        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            if header.generation.load(Ordering::Acquire) != generation {
                return Ok(false);
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
            futex_wait(&header.generation, generation, remaining);
        }
    }
}
