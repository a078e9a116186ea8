//! The directory ("table"): a fixed-capacity registry of named structures
//! at offset 0 of a segment, backed by a bump allocator.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use shm_primitives::Region;

use crate::error::DirectoryError;

pub const MAGIC: u32 = 0x5A49504D; // "ZIPM"
pub const VERSION: u32 = 1;
pub const NAME_LEN: usize = 32;
pub const ALIGN_FLOOR: usize = 8;

const LOCK_UNLOCKED: u32 = 0;
const LOCK_HELD: u32 = 1;

/// Directory header. Additive beyond the normative 16-byte layout: the
/// configured slot capacity `E` (so `attach` doesn't have to guess it back
/// from the bump cursor), a creation spinlock word, and a lock-owner
/// timestamp for stale-lock recovery (see SPEC_FULL.md §3).
#[repr(C, align(64))]
pub struct DirectoryHeader {
    pub magic: u32,
    pub version: u32,
    pub entry_count: AtomicU32,
    pub next_offset: AtomicU32,
    pub capacity: AtomicU32,
    pub creation_lock: AtomicU32,
    pub lock_owner_epoch_ns: AtomicU64,
    _pad0: [u8; 32],
}

const _: () = assert!(core::mem::size_of::<DirectoryHeader>() == 64);

/// One directory slot: a name, a byte offset, and a reserved size.
#[repr(C)]
pub struct DirectorySlot {
    pub name: [u8; NAME_LEN],
    pub offset: u32,
    pub size: u32,
}

const _: () = assert!(core::mem::size_of::<DirectorySlot>() == 40);

pub struct Directory {
    region: Region,
    capacity: u32,
    segment_size: usize,
    lock_staleness_ns: u64,
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn encode_name(name: &str) -> Result<[u8; NAME_LEN], DirectoryError> {
    if name.is_empty() {
        return Err(DirectoryError::InvalidName);
    }
    let bytes = name.as_bytes();
    if bytes.len() > NAME_LEN - 1 {
        return Err(DirectoryError::NameTooLong);
    }
    let mut buf = [0u8; NAME_LEN];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

fn decode_name(buf: &[u8; NAME_LEN]) -> &str {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
    core::str::from_utf8(&buf[..end]).unwrap_or("")
}

#[inline]
const fn align_up(value: u32, align: u32) -> u32 {
    (value + (align - 1)) & !(align - 1)
}

impl Directory {
    /// Header size plus `capacity` slots.
    pub fn required_bytes(capacity: u32) -> usize {
        core::mem::size_of::<DirectoryHeader>() + capacity as usize * core::mem::size_of::<DirectorySlot>()
    }

    /// Initialize a fresh directory at offset 0 of `region`, sized for
    /// `segment_size` bytes total.
    ///
    /// # Safety
    ///
    /// `region` must be writable and exclusively owned during initialization.
    pub unsafe fn init(
        region: Region,
        capacity: u32,
        segment_size: usize,
        lock_staleness_ns: u64,
    ) -> Self {
        let header = unsafe { region.get_mut::<DirectoryHeader>(0) };
        header.magic = MAGIC;
        header.version = VERSION;
        header.entry_count = AtomicU32::new(0);
        header.next_offset = AtomicU32::new(Self::required_bytes(capacity) as u32);
        header.capacity = AtomicU32::new(capacity);
        header.creation_lock = AtomicU32::new(LOCK_UNLOCKED);
        header.lock_owner_epoch_ns = AtomicU64::new(0);

        for i in 0..capacity {
            let slot_off = core::mem::size_of::<DirectoryHeader>()
                + i as usize * core::mem::size_of::<DirectorySlot>();
            let slot = unsafe { region.get_mut::<DirectorySlot>(slot_off) };
            slot.name = [0; NAME_LEN];
            slot.offset = 0;
            slot.size = 0;
        }

        Self {
            region,
            capacity,
            segment_size,
            lock_staleness_ns,
        }
    }

    /// Attach to an existing directory, validating magic and version.
    pub fn attach(
        region: Region,
        segment_size: usize,
        lock_staleness_ns: u64,
    ) -> Result<Self, crate::error::SegmentError> {
        let header = unsafe { region.get::<DirectoryHeader>(0) };
        if header.magic != MAGIC {
            return Err(crate::error::SegmentError::WrongMagic);
        }
        if header.version != VERSION {
            return Err(crate::error::SegmentError::VersionMismatch {
                expected: VERSION,
                found: header.version,
            });
        }
        let capacity = header.capacity.load(Ordering::Acquire);
        Ok(Self {
            region,
            capacity,
            segment_size,
            lock_staleness_ns,
        })
    }

    #[inline]
    fn header(&self) -> &DirectoryHeader {
        unsafe { self.region.get::<DirectoryHeader>(0) }
    }

    #[inline]
    fn slot(&self, i: u32) -> &DirectorySlot {
        let off =
            core::mem::size_of::<DirectoryHeader>() + i as usize * core::mem::size_of::<DirectorySlot>();
        unsafe { self.region.get::<DirectorySlot>(off) }
    }

    #[inline]
    fn slot_mut(&self, i: u32) -> &mut DirectorySlot {
        let off =
            core::mem::size_of::<DirectoryHeader>() + i as usize * core::mem::size_of::<DirectorySlot>();
        unsafe { self.region.get_mut::<DirectorySlot>(off) }
    }

    pub fn entry_count(&self) -> u32 {
        self.header().entry_count.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// `find(name) -> Option<(offset, size)>`, O(E) linear scan.
    pub fn find(&self, name: &str) -> Option<(u32, u32)> {
        let count = self.entry_count();
        for i in 0..count {
            let slot = self.slot(i);
            if slot.name[0] != 0 && decode_name(&slot.name) == name {
                return Some((slot.offset, slot.size));
            }
        }
        None
    }

    /// Snapshot of all live entries, consistent with a single acquire read
    /// of `entry_count`.
    pub fn list(&self) -> Vec<(String, u32, u32)> {
        let count = self.entry_count();
        let mut out = Vec::with_capacity(count as usize);
        for i in 0..count {
            let slot = self.slot(i);
            if slot.name[0] != 0 {
                out.push((decode_name(&slot.name).to_string(), slot.offset, slot.size));
            }
        }
        out
    }

    fn acquire_creation_lock(&self) {
        let header = self.header();
        let mut spins = 0u32;
        loop {
            if header
                .creation_lock
                .compare_exchange(LOCK_UNLOCKED, LOCK_HELD, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                header
                    .lock_owner_epoch_ns
                    .store(now_ns(), Ordering::Release);
                return;
            }
            spins += 1;
            if spins > 10_000 {
                let owner_epoch = header.lock_owner_epoch_ns.load(Ordering::Acquire);
                if now_ns().saturating_sub(owner_epoch) > self.lock_staleness_ns {
                    tracing::warn!(owner_epoch, "breaking stale directory creation lock");
                    header.creation_lock.store(LOCK_UNLOCKED, Ordering::Release);
                    spins = 0;
                    continue;
                }
                spins = 0;
            }
            std::hint::spin_loop();
        }
    }

    fn release_creation_lock(&self) {
        self.header().creation_lock.store(LOCK_UNLOCKED, Ordering::Release);
    }

    /// `insert(name, size, align) -> offset`: reserve a slot and
    /// bump-allocate. Serialized by the header's creation spinlock.
    #[tracing::instrument(skip(self), fields(name))]
    pub fn insert(&self, name: &str, size: u32, align: u32) -> Result<u32, DirectoryError> {
        let name_buf = encode_name(name)?;
        let align = align.max(ALIGN_FLOOR as u32);

        self.acquire_creation_lock();
        let result = (|| {
            if self.find(name).is_some() {
                return Err(DirectoryError::AlreadyExists);
            }
            let count = self.header().entry_count.load(Ordering::Acquire);
            if count >= self.capacity {
                return Err(DirectoryError::DirectoryFull);
            }
            let cursor = self.header().next_offset.load(Ordering::Acquire);
            let aligned = align_up(cursor, align);
            let new_next = aligned.checked_add(size).ok_or(DirectoryError::OutOfSpace)?;
            if new_next as usize > self.segment_size {
                return Err(DirectoryError::OutOfSpace);
            }

            let slot = self.slot_mut(count);
            slot.name = name_buf;
            slot.offset = aligned;
            slot.size = size;

            self.header().entry_count.fetch_add(1, Ordering::Release);
            self.header().next_offset.store(new_next, Ordering::Release);

            tracing::debug!(offset = aligned, size, "directory insert");
            Ok(aligned)
        })();
        self.release_creation_lock();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::HeapRegion;

    fn fresh(capacity: u32, segment_size: usize) -> (HeapRegion, Directory) {
        let heap = HeapRegion::new_zeroed(segment_size);
        let region = heap.region();
        let dir = unsafe { Directory::init(region, capacity, segment_size, 5_000_000_000) };
        (heap, dir)
    }

    #[test]
    fn insert_then_find() {
        let (_heap, dir) = fresh(16, 1 << 16);
        let off = dir.insert("a", 64, 8).unwrap();
        assert_eq!(dir.find("a"), Some((off, 64)));
        assert_eq!(dir.find("missing"), None);
    }

    #[test]
    fn rejects_duplicate_names() {
        let (_heap, dir) = fresh(16, 1 << 16);
        dir.insert("dup", 8, 8).unwrap();
        assert_eq!(dir.insert("dup", 8, 8), Err(DirectoryError::AlreadyExists));
    }

    #[test]
    fn directory_full_boundary() {
        let (_heap, dir) = fresh(4, 1 << 16);
        for i in 0..4 {
            dir.insert(&format!("n{i}"), 8, 8).unwrap();
        }
        assert_eq!(dir.insert("overflow", 8, 8), Err(DirectoryError::DirectoryFull));
        assert_eq!(dir.entry_count(), 4);
    }

    #[test]
    fn rejects_names_over_31_bytes() {
        let (_heap, dir) = fresh(4, 1 << 16);
        let long_name = "x".repeat(32);
        assert_eq!(dir.insert(&long_name, 8, 8), Err(DirectoryError::NameTooLong));
    }

    #[test]
    fn attach_recovers_the_configured_capacity_after_allocations() {
        let segment_size = 1 << 16;
        let heap = HeapRegion::new_zeroed(segment_size);
        let region = heap.region();
        let dir = unsafe { Directory::init(region.clone(), 4, segment_size, 5_000_000_000) };
        dir.insert("first", 4096, 8).unwrap();

        let attached = Directory::attach(region, segment_size, 5_000_000_000).unwrap();
        assert_eq!(attached.capacity(), 4);

        for i in 0..3 {
            attached.insert(&format!("n{i}"), 8, 8).unwrap();
        }
        assert_eq!(
            attached.insert("overflow", 8, 8),
            Err(DirectoryError::DirectoryFull)
        );
        assert_eq!(attached.entry_count(), 4);
    }
}
