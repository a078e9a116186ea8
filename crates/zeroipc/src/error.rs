use std::fmt;

use zeroipc_segment::{DirectoryError, SegmentError};
use zeroipc_sync::SyncError;

/// Errors from opening or creating a typed structure inside a segment.
#[derive(Debug)]
pub enum Error {
    Segment(SegmentError),
    Directory(DirectoryError),
    Sync(SyncError),
    NotFound(String),
    /// The directory entry named by `open()` exists but holds a different
    /// kind of structure (e.g. opening a `Stack<T>` over an entry that was
    /// created as a `Queue<T>`).
    WrongKind { name: String, expected: u32, found: u32 },
    /// The directory entry's element size doesn't match `size_of::<T>()`.
    WrongElementSize { name: String, expected: u64, found: u64 },
    Access(shm_primitives::AccessError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Segment(e) => write!(f, "{e}"),
            Error::Directory(e) => write!(f, "{e}"),
            Error::Sync(e) => write!(f, "{e}"),
            Error::NotFound(name) => write!(f, "no structure named {name:?} in segment"),
            Error::WrongKind { name, expected, found } => {
                write!(f, "{name:?} has kind tag {found}, expected {expected}")
            }
            Error::WrongElementSize { name, expected, found } => {
                write!(f, "{name:?} has element size {found}, expected {expected}")
            }
            Error::Access(e) => write!(f, "{e:?}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<SegmentError> for Error {
    fn from(e: SegmentError) -> Self {
        Error::Segment(e)
    }
}

impl From<DirectoryError> for Error {
    fn from(e: DirectoryError) -> Self {
        Error::Directory(e)
    }
}

impl From<SyncError> for Error {
    fn from(e: SyncError) -> Self {
        Error::Sync(e)
    }
}
