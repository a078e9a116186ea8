//! Typed `create`/`open` wrappers over `zeroipc-codata`'s Future/Lazy/Stream.

use zeroipc_codata::{Future as InnerFuture, Lazy as InnerLazy};
use zeroipc_segment::Segment;

use crate::error::Error;
use crate::structures::reserve;

pub struct Future<T: Copy> {
    inner: InnerFuture<T>,
}

unsafe impl<T: Copy + Send> Send for Future<T> {}
unsafe impl<T: Copy + Send> Sync for Future<T> {}

impl<T: Copy> Future<T> {
    pub fn create(segment: &Segment, name: &str) -> Result<Self, Error> {
        let required = InnerFuture::<T>::required_bytes();
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerFuture::<T>::init(region, offset as usize) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerFuture::<T>::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

impl<T: Copy> std::ops::Deref for Future<T> {
    type Target = InnerFuture<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct Lazy<T: Copy> {
    inner: InnerLazy<T>,
}

unsafe impl<T: Copy + Send> Send for Lazy<T> {}
unsafe impl<T: Copy + Send> Sync for Lazy<T> {}

impl<T: Copy> Lazy<T> {
    pub fn create(segment: &Segment, name: &str) -> Result<Self, Error> {
        let required = InnerLazy::<T>::required_bytes();
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerLazy::<T>::init(region, offset as usize) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerLazy::<T>::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

impl<T: Copy> std::ops::Deref for Lazy<T> {
    type Target = InnerLazy<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
