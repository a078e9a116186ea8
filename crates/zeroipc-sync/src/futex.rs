//! OS address-based wait/wake, so blocked waiters consume no CPU and
//! wakeups don't require signals. Linux uses the real futex syscall;
//! other platforms fall back to a short-sleep poll (documented as
//! degraded — still correct, just not wakeup-latency-optimal).

use std::sync::atomic::AtomicU32;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexWaitResult {
    Woken,
    ValueMismatch,
    TimedOut,
}

#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> FutexWaitResult {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map(|t| t as *const libc::timespec)
        .unwrap_or(std::ptr::null());

    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0,
        )
    };
    if rc == 0 {
        FutexWaitResult::Woken
    } else {
        let err = std::io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EAGAIN) => FutexWaitResult::ValueMismatch,
            Some(libc::ETIMEDOUT) => FutexWaitResult::TimedOut,
            _ => FutexWaitResult::Woken, // EINTR and friends: caller re-checks the predicate
        }
    }
}

#[cfg(target_os = "linux")]
pub fn futex_wake(word: &AtomicU32, n: i32) -> i32 {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE,
            n,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0,
        ) as i32
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> FutexWaitResult {
    use std::sync::atomic::Ordering;
    let poll_interval = Duration::from_micros(50);
    let deadline = timeout.map(|d| std::time::Instant::now() + d);
    loop {
        if word.load(Ordering::Acquire) != expected {
            return FutexWaitResult::ValueMismatch;
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                return FutexWaitResult::TimedOut;
            }
        }
        std::thread::sleep(poll_interval);
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake(_word: &AtomicU32, _n: i32) -> i32 {
    0 // pollers will notice the value change within one poll interval
}

pub fn futex_wake_one(word: &AtomicU32) -> i32 {
    futex_wake(word, 1)
}

pub fn futex_wake_all(word: &AtomicU32) -> i32 {
    futex_wake(word, i32::MAX)
}
