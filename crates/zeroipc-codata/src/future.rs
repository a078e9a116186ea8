//! Single-assignment, many-readers cell. Exactly one of `set_value`/
//! `set_error` may succeed; every reader blocks on the same futex word
//! until the winner publishes.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use shm_primitives::Region;
use static_assertions::const_assert;
use zeroipc_sync::futex::{futex_wait, futex_wake_all};

pub const FUTURE_KIND: u32 = 12;
const ERROR_BUF_LEN: usize = 256;

const STATE_PENDING: u32 = 0;
const STATE_READY: u32 = 1;
const STATE_ERROR: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    AlreadySet,
    TimedOut,
    Failed(String),
}

impl std::fmt::Display for FutureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FutureError::AlreadySet => write!(f, "future already has a value or error"),
            FutureError::TimedOut => write!(f, "timed out waiting for future"),
            FutureError::Failed(msg) => write!(f, "future resolved to an error: {msg}"),
        }
    }
}

impl std::error::Error for FutureError {}

/// `value` and the error buffer live immediately after this header; see
/// `Future::<T>::required_bytes`.
#[repr(C)]
pub struct FutureHeader {
    pub kind: u32,
    pub state: AtomicU32,
    pub error_len: AtomicU32,
    _pad: u32,
}

const_assert!(size_of::<FutureHeader>() == 16);

pub struct Future<T: Copy> {
    region: Region,
    header_offset: usize,
    value_offset: usize,
    error_offset: usize,
    _marker: std::marker::PhantomData<T>,
}

unsafe impl<T: Copy + Send> Send for Future<T> {}
unsafe impl<T: Copy + Send> Sync for Future<T> {}

impl<T: Copy> Future<T> {
    pub fn required_bytes() -> usize {
        size_of::<FutureHeader>() + size_of::<T>() + ERROR_BUF_LEN
    }

    fn header(&self) -> &FutureHeader {
        unsafe { self.region.get::<FutureHeader>(self.header_offset) }
    }

    /// # Safety
    /// `header_offset` must be exclusively reserved for `required_bytes()` bytes.
    pub unsafe fn init(region: Region, header_offset: usize) -> Self {
        let header = unsafe { region.get_mut::<FutureHeader>(header_offset) };
        header.kind = FUTURE_KIND;
        header.state = AtomicU32::new(STATE_PENDING);
        header.error_len = AtomicU32::new(0);
        let value_offset = header_offset + size_of::<FutureHeader>();
        let error_offset = value_offset + size_of::<T>();
        Self { region, header_offset, value_offset, error_offset, _marker: std::marker::PhantomData }
    }

    /// # Safety
    /// `header_offset` must point at a previously `init`ed future.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        let value_offset = header_offset + size_of::<FutureHeader>();
        let error_offset = value_offset + size_of::<T>();
        Self { region, header_offset, value_offset, error_offset, _marker: std::marker::PhantomData }
    }

    fn futex_word(&self) -> &AtomicU32 {
        &self.header().state
    }

    pub fn set_value(&self, value: T) -> Result<(), FutureError> {
        let header = self.header();
        if header.state.load(Ordering::Acquire) != STATE_PENDING {
            return Err(FutureError::AlreadySet);
        }
        unsafe {
            *self.region.get_mut::<T>(self.value_offset) = value;
        }
        match header.state.compare_exchange(
            STATE_PENDING,
            STATE_READY,
            Ordering::Release,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                futex_wake_all(self.futex_word());
                Ok(())
            }
            Err(_) => Err(FutureError::AlreadySet),
        }
    }

    pub fn set_error(&self, message: &str) -> Result<(), FutureError> {
        let header = self.header();
        if header.state.load(Ordering::Acquire) != STATE_PENDING {
            return Err(FutureError::AlreadySet);
        }
        let bytes = message.as_bytes();
        let len = bytes.len().min(ERROR_BUF_LEN);
        unsafe {
            let buf = self.region.offset(self.error_offset);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf, len);
        }
        header.error_len.store(len as u32, Ordering::Release);
        match header.state.compare_exchange(
            STATE_PENDING,
            STATE_ERROR,
            Ordering::Release,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                futex_wake_all(self.futex_word());
                Ok(())
            }
            Err(_) => Err(FutureError::AlreadySet),
        }
    }

    fn read_resolved(&self, state: u32) -> Result<T, FutureError> {
        match state {
            STATE_READY => Ok(unsafe { *self.region.get::<T>(self.value_offset) }),
            STATE_ERROR => {
                let header = self.header();
                let len = header.error_len.load(Ordering::Acquire) as usize;
                let buf = unsafe { self.region.offset(self.error_offset) };
                let slice = unsafe { std::slice::from_raw_parts(buf, len) };
                Err(FutureError::Failed(String::from_utf8_lossy(slice).into_owned()))
            }
            _ => unreachable!("read_resolved called on a pending future"),
        }
    }

    pub fn try_get(&self) -> Option<Result<T, FutureError>> {
        let state = self.header().state.load(Ordering::Acquire);
        if state == STATE_PENDING {
            None
        } else {
            Some(self.read_resolved(state))
        }
    }

    pub fn get(&self) -> Result<T, FutureError> {
        self.get_for(None).expect("get() with no timeout cannot time out")
    }

    pub fn get_for(&self, timeout: Option<Duration>) -> Result<Result<T, FutureError>, FutureError> {
        let deadline = timeout.map(|d| std::time::Instant::now() + d);
        loop {
            let state = self.header().state.load(Ordering::Acquire);
            if state != STATE_PENDING {
                return Ok(self.read_resolved(state));
            }
            let remaining = match deadline {
                Some(dl) => {
                    let now = std::time::Instant::now();
                    if now >= dl {
                        return Err(FutureError::TimedOut);
                    }
                    Some(dl - now)
                }
                None => None,
            };
            futex_wait(self.futex_word(), STATE_PENDING, remaining);
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.header().state.load(Ordering::Acquire) != STATE_PENDING
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;
    use std::sync::Arc;

    #[test]
    fn set_value_then_get_is_idempotent() {
        let heap = HeapRegion::new_zeroed(Future::<f64>::required_bytes());
        let fut = unsafe { Future::<f64>::init(heap.region(), 0) };
        fut.set_value(3.141592653589793).unwrap();
        assert_eq!(fut.get().unwrap(), 3.141592653589793);
        assert_eq!(fut.get().unwrap(), 3.141592653589793);
    }

    #[test]
    fn second_set_value_fails() {
        let heap = HeapRegion::new_zeroed(Future::<i32>::required_bytes());
        let fut = unsafe { Future::<i32>::init(heap.region(), 0) };
        fut.set_value(1).unwrap();
        assert_eq!(fut.set_value(2), Err(FutureError::AlreadySet));
    }

    #[test]
    fn set_error_is_observed_by_get() {
        let heap = HeapRegion::new_zeroed(Future::<i32>::required_bytes());
        let fut = unsafe { Future::<i32>::init(heap.region(), 0) };
        fut.set_error("boom").unwrap();
        match fut.get() {
            Err(FutureError::Failed(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn blocked_reader_is_woken_on_resolution() {
        let heap = Arc::new(HeapRegion::new_zeroed(Future::<f64>::required_bytes()));
        let fut = Arc::new(unsafe { Future::<f64>::init(heap.region(), 0) });

        let f2 = fut.clone();
        let _h2 = heap.clone();
        let handle = std::thread::spawn(move || f2.get_for(Some(Duration::from_secs(5))).unwrap());

        std::thread::sleep(Duration::from_millis(20));
        fut.set_value(2.71828).unwrap();
        assert_eq!(handle.join().unwrap().unwrap(), 2.71828);
    }
}
