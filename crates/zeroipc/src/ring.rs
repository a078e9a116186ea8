//! Typed handle over the SPSC ring: `Ring<T>` is ZeroIPC's single-producer
//! single-consumer transport, cheaper than `Queue<T>` when only one writer
//! and one reader ever attach.

use shm_primitives::{RingStatus, SpscConsumer, SpscProducer, SpscRing};
use zeroipc_segment::Segment;

use crate::error::Error;
use crate::structures::reserve;

pub const RING_KIND: u32 = 7;

pub struct Ring<T: Copy> {
    inner: SpscRing<T>,
}

unsafe impl<T: Copy + Send> Send for Ring<T> {}
unsafe impl<T: Copy + Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    pub fn create(segment: &Segment, name: &str, capacity: u32) -> Result<Self, Error> {
        let required = SpscRing::<T>::required_bytes(capacity);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { SpscRing::<T>::init(region, offset as usize, capacity) };
        Ok(Self { inner })
    }

    /// # Safety (caller contract)
    /// The SPSC ring header carries no structure-family kind tag distinct
    /// from any other 64-byte-aligned block; callers must open with the
    /// same `T` used at `create`.
    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { SpscRing::<T>::attach(region, offset as usize) };
        Ok(Self { inner })
    }

    pub fn split(&self) -> (SpscProducer<'_, T>, SpscConsumer<'_, T>) {
        self.inner.split()
    }

    pub fn capacity(&self) -> u32 {
        self.inner.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn status(&self) -> RingStatus {
        self.inner.status()
    }
}
