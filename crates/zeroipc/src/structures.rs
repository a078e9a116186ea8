//! Typed `create`/`open` wrappers binding a `shm-primitives` structure to a
//! named entry in a segment's directory. Each wrapper looks up (or
//! inserts) the directory entry, then inits/attaches the underlying
//! lock-free structure over that offset.

use zeroipc_segment::Segment;

use crate::error::Error;
use crate::kind::check_kind;

/// Reserves `required_bytes` under `name` in `segment`'s directory,
/// 64-byte aligned, and returns the offset.
pub(crate) fn reserve(segment: &Segment, name: &str, required_bytes: usize) -> Result<u32, Error> {
    let offset = segment.directory().insert(name, required_bytes as u32, 64)?;
    tracing::debug!(name, required_bytes, offset, "structure reserved");
    Ok(offset)
}

/// Looks up `name` in `segment`'s directory and verifies its kind tag.
pub(crate) fn locate(segment: &Segment, name: &str, expected_kind: u32) -> Result<u32, Error> {
    let (offset, _size) = segment
        .directory()
        .find(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))?;
    check_kind(&unsafe { segment.region() }, offset as usize, name, expected_kind)?;
    tracing::trace!(name, offset, expected_kind, "structure located");
    Ok(offset)
}

macro_rules! typed_structure {
    ($name:ident, $inner:ty, $kind:expr, $bound:path) => {
        pub struct $name<T: $bound> {
            inner: $inner,
        }

        unsafe impl<T: $bound + Send> Send for $name<T> {}
        unsafe impl<T: $bound + Send> Sync for $name<T> {}

        impl<T: $bound> $name<T> {
            pub fn create(segment: &Segment, name: &str, capacity: u64) -> Result<Self, Error> {
                let required = <$inner>::required_bytes(capacity);
                let offset = crate::structures::reserve(segment, name, required)?;
                let region = unsafe { segment.region() };
                let inner = unsafe { <$inner>::init(region, offset as usize, capacity) };
                Ok(Self { inner })
            }

            pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
                let offset = crate::structures::locate(segment, name, $kind)?;
                let region = unsafe { segment.region() };
                let inner = unsafe { <$inner>::attach(region, offset as usize) };
                Ok(Self { inner })
            }

            pub fn inner(&self) -> &$inner {
                &self.inner
            }
        }
    };
}

typed_structure!(Queue, shm_primitives::Queue<T>, crate::kind::Kind::Queue as u32, Copy);
typed_structure!(Stack, shm_primitives::Stack<T>, crate::kind::Kind::Stack as u32, Copy);
typed_structure!(Stream, zeroipc_codata::Stream<T>, crate::kind::Kind::Stream as u32, Copy);

/// `Array::attach` also validates `elem_size`, so it doesn't fit the
/// generic `typed_structure!` shape (whose `attach` never fails).
pub struct Array<T: Copy> {
    inner: shm_primitives::Array<T>,
}

unsafe impl<T: Copy + Send> Send for Array<T> {}
unsafe impl<T: Copy + Send> Sync for Array<T> {}

impl<T: Copy> Array<T> {
    pub fn create(segment: &Segment, name: &str, capacity: u64) -> Result<Self, Error> {
        let required = shm_primitives::Array::<T>::required_bytes(capacity);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { shm_primitives::Array::<T>::init(region, offset as usize, capacity) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let offset = locate(segment, name, crate::kind::Kind::Array as u32)?;
        let region = unsafe { segment.region() };
        let inner = unsafe {
            shm_primitives::Array::<T>::attach(region, offset as usize)
                .map_err(Error::Access)?
        };
        Ok(Self { inner })
    }
}

impl<T: Copy> std::ops::Deref for Array<T> {
    type Target = shm_primitives::Array<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: Copy> std::ops::Deref for Queue<T> {
    type Target = shm_primitives::Queue<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: Copy> std::ops::Deref for Stack<T> {
    type Target = shm_primitives::Stack<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T: Copy> std::ops::Deref for Stream<T> {
    type Target = zeroipc_codata::Stream<T>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct Map<K: shm_primitives::FixedKey, V: Copy> {
    inner: shm_primitives::Map<K, V>,
}

unsafe impl<K: shm_primitives::FixedKey + Send, V: Copy + Send> Send for Map<K, V> {}
unsafe impl<K: shm_primitives::FixedKey + Send, V: Copy + Send> Sync for Map<K, V> {}

impl<K: shm_primitives::FixedKey, V: Copy> Map<K, V> {
    pub fn create(segment: &Segment, name: &str, capacity: u64) -> Result<Self, Error> {
        let required = shm_primitives::Map::<K, V>::required_bytes(capacity);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { shm_primitives::Map::<K, V>::init(region, offset as usize, capacity) };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let offset = locate(segment, name, crate::kind::Kind::Map as u32)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { shm_primitives::Map::<K, V>::attach(region, offset as usize) };
        Ok(Self { inner })
    }
}

impl<K: shm_primitives::FixedKey, V: Copy> std::ops::Deref for Map<K, V> {
    type Target = shm_primitives::Map<K, V>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

pub struct Set<K: shm_primitives::FixedKey> {
    inner: shm_primitives::Set<K>,
}

unsafe impl<K: shm_primitives::FixedKey + Send> Send for Set<K> {}
unsafe impl<K: shm_primitives::FixedKey + Send> Sync for Set<K> {}

impl<K: shm_primitives::FixedKey> Set<K> {
    pub fn create(segment: &Segment, name: &str, capacity: u64) -> Result<Self, Error> {
        let required = shm_primitives::Set::<K>::required_bytes(capacity);
        let offset = reserve(segment, name, required)?;
        let region = unsafe { segment.region() };
        let inner = unsafe {
            shm_primitives::Set::<K>::init_tagged(
                region,
                offset as usize,
                capacity,
                crate::kind::Kind::Set as u32,
            )
        };
        Ok(Self { inner })
    }

    pub fn open(segment: &Segment, name: &str) -> Result<Self, Error> {
        let offset = locate(segment, name, crate::kind::Kind::Set as u32)?;
        let region = unsafe { segment.region() };
        let inner = unsafe { shm_primitives::Set::<K>::attach(region, offset as usize) };
        Ok(Self { inner })
    }

    pub fn insert(&self, key: K) -> Result<bool, shm_primitives::MapError> {
        self.inner.insert(key, ())
    }

    pub fn contains(&self, key: K) -> bool {
        self.inner.contains(key)
    }

    pub fn remove(&self, key: K) -> bool {
        self.inner.remove(key)
    }

    pub fn capacity(&self) -> u64 {
        self.inner.capacity()
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }
}
