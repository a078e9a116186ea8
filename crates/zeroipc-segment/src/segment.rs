//! POSIX shared-memory segment lifecycle: map a named region, host a
//! directory at its head, unmap/unlink on demand.

use std::ffi::CString;
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::sync::Arc;

use shm_primitives::Region;

use crate::config::SegmentConfig;
use crate::directory::Directory;
use crate::error::SegmentError;

fn cstring_name(name: &str) -> Result<CString, SegmentError> {
    CString::new(name)
        .map_err(|_| SegmentError::Io(std::io::Error::other("segment name contains NUL")))
}

struct Mapping {
    ptr: *mut libc::c_void,
    len: usize,
}

unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

/// A mapped, named shared-memory segment hosting a directory at offset 0.
#[derive(Clone)]
pub struct Segment {
    mapping: Arc<Mapping>,
    directory: Arc<Directory>,
    size: usize,
}

impl Segment {
    /// Map a new segment, zero it, and write the directory header + magic.
    #[tracing::instrument(skip(config))]
    pub fn create(name: &str, size: usize, config: SegmentConfig) -> Result<Self, SegmentError> {
        let cname = cstring_name(name)?;
        let fd = unsafe {
            libc::shm_open(
                cname.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::AlreadyExists {
                return Err(SegmentError::AlreadyExists);
            }
            return Err(SegmentError::Io(err));
        }
        let file = unsafe { std::fs::File::from_raw_fd(fd) };
        if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
            return Err(SegmentError::Io(std::io::Error::last_os_error()));
        }

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(SegmentError::Io(std::io::Error::last_os_error()));
        }
        // `file` may be closed once mmap holds the mapping; the mapping
        // keeps the shared object alive independent of the fd.
        drop(file);

        let region = unsafe { Region::from_raw_parts(ptr as *mut u8, size) };
        let directory = unsafe {
            Directory::init(
                region,
                config.directory_capacity,
                size,
                config.lock_staleness_ns,
            )
        };

        tracing::info!(name, size, "segment created");

        Ok(Self {
            mapping: Arc::new(Mapping { ptr, len: size }),
            directory: Arc::new(directory),
            size,
        })
    }

    /// Map an existing segment and validate magic/version.
    #[tracing::instrument(skip(config))]
    pub fn open(name: &str, config: SegmentConfig) -> Result<Self, SegmentError> {
        let cname = cstring_name(name)?;
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(SegmentError::NotFound);
            }
            return Err(SegmentError::Io(err));
        }
        let file = unsafe { std::fs::File::from_raw_fd(fd) };
        let meta = file.metadata().map_err(SegmentError::Io)?;
        let size = meta.len() as usize;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(SegmentError::Io(std::io::Error::last_os_error()));
        }
        drop(file);

        let region = unsafe { Region::from_raw_parts(ptr as *mut u8, size) };
        let directory = Directory::attach(region, size, config.lock_staleness_ns)?;

        tracing::info!(name, size, "segment opened");

        Ok(Self {
            mapping: Arc::new(Mapping { ptr, len: size }),
            directory: Arc::new(directory),
            size,
        })
    }

    /// Map an existing segment `PROT_READ`-only, for the inspector. Never
    /// requires write access, so it works even against a segment another
    /// process holds exclusively for writing.
    #[tracing::instrument(skip(config))]
    pub fn open_readonly(name: &str, config: SegmentConfig) -> Result<Self, SegmentError> {
        let cname = cstring_name(name)?;
        let fd = unsafe { libc::shm_open(cname.as_ptr(), libc::O_RDONLY, 0o400) };
        if fd < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(SegmentError::NotFound);
            }
            return Err(SegmentError::Io(err));
        }
        let file = unsafe { std::fs::File::from_raw_fd(fd) };
        let meta = file.metadata().map_err(SegmentError::Io)?;
        let size = meta.len() as usize;

        let ptr = unsafe {
            libc::mmap(std::ptr::null_mut(), size, libc::PROT_READ, libc::MAP_SHARED, file.as_raw_fd(), 0)
        };
        if ptr == libc::MAP_FAILED {
            return Err(SegmentError::Io(std::io::Error::last_os_error()));
        }
        drop(file);

        let region = unsafe { Region::from_raw_parts(ptr as *mut u8, size) };
        let directory = Directory::attach(region, size, config.lock_staleness_ns)?;

        Ok(Self {
            mapping: Arc::new(Mapping { ptr, len: size }),
            directory: Arc::new(directory),
            size,
        })
    }

    /// Remove the OS name. Existing mappings (in this or other processes)
    /// continue to work; only future `open()` calls are affected.
    pub fn unlink(name: &str) -> Result<(), SegmentError> {
        let cname = cstring_name(name)?;
        let rc = unsafe { libc::shm_unlink(cname.as_ptr()) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::NotFound {
                return Err(SegmentError::NotFound);
            }
            return Err(SegmentError::Io(err));
        }
        Ok(())
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Region view of the entire segment, for structures to init/attach
    /// over.
    ///
    /// # Safety
    ///
    /// Callers must respect each structure's own initialization/attach
    /// contract and must not alias a structure's bytes with another.
    pub unsafe fn region(&self) -> Region {
        unsafe { Region::from_raw_parts(self.mapping.ptr as *mut u8, self.size) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/zeroipc_test_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn create_then_open_roundtrip() {
        // Exercises the `tracing::info!` spans on `create`/`open` through a
        // real subscriber instead of the default no-op one.
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let name = unique_name("create_open");
        let seg = Segment::create(&name, 1 << 20, SegmentConfig::default()).unwrap();
        let off = seg.directory().insert("thing", 64, 8).unwrap();

        let reopened = Segment::open(&name, SegmentConfig::default()).unwrap();
        assert_eq!(reopened.directory().find("thing"), Some((off, 64)));

        drop(seg);
        drop(reopened);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn create_twice_fails_already_exists() {
        let name = unique_name("dup");
        let seg = Segment::create(&name, 1 << 16, SegmentConfig::default()).unwrap();
        let err = Segment::create(&name, 1 << 16, SegmentConfig::default()).unwrap_err();
        assert!(matches!(err, SegmentError::AlreadyExists));
        drop(seg);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn open_missing_fails_not_found() {
        let name = unique_name("missing");
        let err = Segment::open(&name, SegmentConfig::default()).unwrap_err();
        assert!(matches!(err, SegmentError::NotFound));
    }
}
