//! Derived streams: `map`/`filter`/`fold`/`window` create a new, separately
//! named `Stream` and spawn a process-local worker thread that reads the
//! source and emits into it. The derived stream is shared memory; the
//! worker driving it is not, so only the process that built it keeps
//! pushing (other processes just read the derived stream like any other).

use std::time::Duration;

use crate::stream::{Next, Stream};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a spawned combinator worker. Dropping it detaches the thread;
/// call `stop()` to request a clean shutdown instead.
pub struct Worker {
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl Worker {
    pub fn stop(mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Release);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

fn spawn_loop<T, F>(source: Stream<T>, mut start_cursor: u64, mut step: F) -> Worker
where
    T: Copy + Send + 'static,
    F: FnMut(u64, T) -> bool + Send + 'static,
{
    let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stop2 = stop.clone();
    let handle = std::thread::spawn(move || loop {
        if stop2.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        match source.next(start_cursor) {
            Next::Item(v) => {
                if !step(start_cursor, v) {
                    return;
                }
                start_cursor += 1;
            }
            Next::Lagged { new_cursor } => {
                tracing::warn!(new_cursor, "combinator worker lagged, skipping ahead");
                start_cursor = new_cursor;
            }
            Next::EndOfStream => return,
            Next::WouldBlock => std::thread::sleep(POLL_INTERVAL),
        }
    });
    Worker { stop, handle: Some(handle) }
}

/// `derived.emit(f(v))` for every `v` read from `source`.
pub fn map<A, B, F>(source: Stream<A>, derived: Stream<B>, mut f: F) -> Worker
where
    A: Copy + Send + 'static,
    B: Copy + Send + 'static,
    F: FnMut(A) -> B + Send + 'static,
{
    spawn_loop(source, 0, move |_seq, v| {
        derived.emit(f(v));
        true
    })
}

/// `derived.emit(v)` for every `v` read from `source` that passes `predicate`.
pub fn filter<T, F>(source: Stream<T>, derived: Stream<T>, mut predicate: F) -> Worker
where
    T: Copy + Send + 'static,
    F: FnMut(&T) -> bool + Send + 'static,
{
    spawn_loop(source, 0, move |_seq, v| {
        if predicate(&v) {
            derived.emit(v);
        }
        true
    })
}

/// Running fold over `source`, emitting the accumulator into `derived`
/// after every item.
pub fn fold<T, Acc, F>(source: Stream<T>, derived: Stream<Acc>, init: Acc, mut f: F) -> Worker
where
    T: Copy + Send + 'static,
    Acc: Copy + Send + 'static,
    F: FnMut(Acc, T) -> Acc + Send + 'static,
{
    let mut acc = init;
    spawn_loop(source, 0, move |_seq, v| {
        acc = f(acc, v);
        derived.emit(acc);
        true
    })
}

/// Emits a fixed-size sliding window of the last `N` values from `source`
/// into `derived`, once `N` values have arrived. Windows overlap: each new
/// source item produces one new derived window.
pub fn window<T, const N: usize>(source: Stream<T>, derived: Stream<[T; N]>) -> Worker
where
    T: Copy + Default + Send + 'static,
{
    let mut buf = [T::default(); N];
    let mut filled = 0usize;
    spawn_loop(source, 0, move |_seq, v| {
        buf.copy_within(1..N, 0);
        buf[N - 1] = v;
        filled = (filled + 1).min(N);
        if filled == N {
            derived.emit(buf);
        }
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shm_primitives::region::HeapRegion;

    fn fresh_stream<T: Copy>(capacity: u64) -> (HeapRegion, Stream<T>) {
        let heap = HeapRegion::new_zeroed(Stream::<T>::required_bytes(capacity));
        let region = heap.region();
        let stream = unsafe { Stream::<T>::init(region, 0, capacity) };
        (heap, stream)
    }

    fn drain<T: Copy>(stream: &Stream<T>) -> Vec<T> {
        let mut out = Vec::new();
        let mut cursor = 0u64;
        loop {
            match stream.next(cursor) {
                Next::Item(v) => {
                    out.push(v);
                    cursor += 1;
                }
                _ => break,
            }
        }
        out
    }

    #[test]
    fn map_doubles_every_value() {
        let (_src_heap, source) = fresh_stream::<u32>(8);
        let (dst_heap, derived) = fresh_stream::<u32>(8);
        let reader = unsafe { Stream::<u32>::attach(dst_heap.region(), 0) };

        for v in 0..5u32 {
            source.emit(v);
        }
        source.close();
        let worker = map(source, derived, |v| v * 2);
        std::thread::sleep(Duration::from_millis(50));
        worker.stop();

        assert_eq!(drain(&reader), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn filter_keeps_only_matching_values() {
        let (_src_heap, source) = fresh_stream::<u32>(16);
        let (dst_heap, derived) = fresh_stream::<u32>(16);
        let reader = unsafe { Stream::<u32>::attach(dst_heap.region(), 0) };

        for v in 0..10u32 {
            source.emit(v);
        }
        source.close();
        let worker = filter(source, derived, |v| v % 2 == 0);
        std::thread::sleep(Duration::from_millis(50));
        worker.stop();

        assert_eq!(drain(&reader), vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn fold_emits_running_sum() {
        let (_src_heap, source) = fresh_stream::<u32>(8);
        let (dst_heap, derived) = fresh_stream::<u32>(8);
        let reader = unsafe { Stream::<u32>::attach(dst_heap.region(), 0) };

        for v in 1..=4u32 {
            source.emit(v);
        }
        source.close();
        let worker = fold(source, derived, 0u32, |acc, v| acc + v);
        std::thread::sleep(Duration::from_millis(50));
        worker.stop();

        assert_eq!(drain(&reader), vec![1, 3, 6, 10]);
    }

    #[test]
    fn window_emits_overlapping_triples_once_filled() {
        let (_src_heap, source) = fresh_stream::<u32>(8);
        let (dst_heap, derived) = fresh_stream::<[u32; 3]>(8);
        let reader = unsafe { Stream::<[u32; 3]>::attach(dst_heap.region(), 0) };

        for v in 0..5u32 {
            source.emit(v);
        }
        source.close();
        let worker = window::<u32, 3>(source, derived);
        std::thread::sleep(Duration::from_millis(50));
        worker.stop();

        assert_eq!(drain(&reader), vec![[0, 1, 2], [1, 2, 3], [2, 3, 4]]);
    }
}
