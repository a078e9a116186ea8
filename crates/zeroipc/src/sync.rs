//! Typed `create`/`open` wrappers over `zeroipc-sync`'s blocking
//! primitives.

use zeroipc_segment::Segment;
use zeroipc_sync::{Barrier as InnerBarrier, Channel as InnerChannel, Latch as InnerLatch, Semaphore as InnerSemaphore};

use crate::error::Error;
use crate::structures::reserve;

macro_rules! deref_inner {
    ($name:ident, $inner:ty) => {
        impl std::ops::Deref for $name {
            type Target = $inner;
            fn deref(&self) -> &Self::Target {
                &self.inner
            }
        }
    };
}

pub struct Semaphore {
    inner: InnerSemaphore,
}

impl Semaphore {
    pub fn create(segment: &Segment, name: &str, initial_count: i64, max_count: i64) -> Result<Self, Error> {
        let required = InnerSemaphore::required_bytes();
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerSemaphore::init(region, offset as usize, initial_count, max_count) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerSemaphore::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

deref_inner!(Semaphore, InnerSemaphore);

pub struct Barrier {
    inner: InnerBarrier,
}

impl Barrier {
    pub fn create(segment: &Segment, name: &str, n_participants: u64) -> Result<Self, Error> {
        let required = InnerBarrier::required_bytes();
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerBarrier::init(region, offset as usize, n_participants) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerBarrier::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

deref_inner!(Barrier, InnerBarrier);

pub struct Latch {
    inner: InnerLatch,
}

impl Latch {
    pub fn create(segment: &Segment, name: &str, initial_count: u64) -> Result<Self, Error> {
        let required = InnerLatch::required_bytes();
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerLatch::init(region, offset as usize, initial_count) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerLatch::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

deref_inner!(Latch, InnerLatch);

pub struct Channel<T: Copy> {
    inner: InnerChannel<T>,
}

unsafe impl<T: Copy + Send> Send for Channel<T> {}
unsafe impl<T: Copy + Send> Sync for Channel<T> {}

impl<T: Copy> Channel<T> {
    pub fn create(segment: &Segment, name: &str, capacity: u64) -> Result<Self, Error> {
        let required = InnerChannel::<T>::required_bytes(capacity);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerChannel::<T>::init(region, offset as usize, capacity) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let (offset, _size) = segment
            .directory()
            .find(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        let region = unsafe { segment.region() };
        let inner = unsafe { InnerChannel::<T>::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

impl<T: Copy> std::ops::Deref for Channel<T> {
    type Target = InnerChannel<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// Waits on the first of several channels to become ready to receive,
/// returning its index and value. Polls round-robin with a short backoff;
/// the contract does not require fairness.
pub fn select<T: Copy>(channels: &[&Channel<T>], timeout: Option<std::time::Duration>) -> Option<(usize, T)> {
    let deadline = timeout.map(|d| std::time::Instant::now() + d);
    loop {
        for (i, ch) in channels.iter().enumerate() {
            if let Ok(v) = ch.try_recv() {
                return Some((i, v));
            }
        }
        if let Some(dl) = deadline {
            if std::time::Instant::now() >= dl {
                return None;
            }
        }
        std::thread::sleep(std::time::Duration::from_micros(100));
    }
}
