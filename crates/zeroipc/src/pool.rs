//! Typed handle over the Treiber slab allocator: `Pool<T>` hands out
//! `T`-sized slots by value instead of raw byte spans.

use std::mem::size_of;

use shm_primitives::{AllocResult, FreeError, SlotHandle, TreiberSlab};
use zeroipc_segment::Segment;

use crate::error::Error;
use crate::structures::reserve;

pub const POOL_KIND: u32 = 6;

pub struct Pool<T: Copy> {
    inner: TreiberSlab,
    _marker: std::marker::PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for Pool<T> {}
unsafe impl<T: Copy + Send> Sync for Pool<T> {}

impl<T: Copy> Pool<T> {
    pub fn create(segment: &Segment, name: &str, capacity: u32) -> Result<Self, Error> {
        let slot_size = size_of::<T>().max(size_of::<u32>()) as u32;
        let required = TreiberSlab::required_bytes(capacity, slot_size);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { TreiberSlab::init(region, offset as usize, capacity, slot_size) };
        Ok(Self { inner, _marker: std::marker::PhantomData })
    }

    /// # Safety
    /// Opens a pool by directory lookup only; the Treiber slab header
    /// doesn't carry a structure-family kind tag (it predates that
    /// convention and is shared with raw byte-buffer pools), so callers
    /// are responsible for opening with the same `T` used at `create`.
    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe {
            TreiberSlab::attach(region, offset as usize)
                .map_err(|_| Error::NotFound(name.to_string()))?
        };
        Ok(Self { inner, _marker: std::marker::PhantomData })
    }

    pub fn try_alloc(&self) -> AllocResult {
        self.inner.try_alloc()
    }

    pub fn write(&self, handle: SlotHandle, value: T) {
        unsafe {
            let ptr = self.inner.slot_data_ptr(handle) as *mut T;
            ptr.write(value);
        }
    }

    pub fn read(&self, handle: SlotHandle) -> T {
        unsafe {
            let ptr = self.inner.slot_data_ptr(handle) as *const T;
            ptr.read()
        }
    }

    pub fn mark_in_flight(&self, handle: SlotHandle) -> Result<(), FreeError> {
        self.inner.mark_in_flight(handle)
    }

    pub fn free(&self, handle: SlotHandle) -> Result<(), FreeError> {
        self.inner.free(handle)
    }

    pub fn free_allocated(&self, handle: SlotHandle) -> Result<(), FreeError> {
        self.inner.free_allocated(handle)
    }

    pub fn slot_count(&self) -> u32 {
        self.inner.slot_count()
    }

    pub fn free_count_approx(&self) -> u32 {
        self.inner.free_count_approx()
    }
}
