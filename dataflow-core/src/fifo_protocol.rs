//! Lock-free single-producer/single-consumer FIFO (component J).
//!
//! Grounded line-for-line on `LocklessThreadCrossingFIFO.cpp`: a ring buffer
//! of `capacity = fifo_length + 1` slots (one slot is always left empty so
//! "full" and "empty" are distinguishable without a separate counter), a
//! write offset only the producer advances, a read offset only the
//! consumer advances, and each side caching the *other* side's offset
//! locally so the hot path (`avail_to_write`/`avail_to_read`) does not need
//! an atomic load every call — it reloads the cached value only when the
//! cheap local arithmetic says the cache might be stale, mirroring the
//! original's `PRODUCER_FULLCACHE`/`CONSUMER_FULLCACHE` roles.
//!
//! Writes and reads are batched: `write_batch`/`read_batch` copy into the
//! ring and advance a *local* offset only; the atomic release store that
//! publishes the new offset to the other side happens in `flush`/`commit`,
//! matching the original's `pushStateAfter` deferred-publish behavior (a
//! caller may queue several small writes and flush once).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Ring<T> {
    cells: Box<[UnsafeCell<MaybeUninit<T>>]>,
    capacity: usize,
    write_offset: AtomicUsize,
    read_offset: AtomicUsize,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    fn new(fifo_length: usize) -> Self {
        let capacity = fifo_length + 1;
        let mut cells = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            cells.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Ring {
            cells: cells.into_boxed_slice(),
            capacity,
            write_offset: AtomicUsize::new(0),
            read_offset: AtomicUsize::new(0),
        }
    }
}

/// Builds a connected producer/consumer pair over a fresh ring of
/// `fifo_length` usable slots.
pub fn channel<T>(fifo_length: usize) -> (Producer<T>, Consumer<T>) {
    channel_with_init(fifo_length, &[])
}

/// Builds a connected producer/consumer pair whose ring is pre-seeded with
/// `initial`, mirroring the original's initialization sequence: the read
/// offset starts at 0, `initial` is written starting at slot 1 (slot 0 is
/// left as the ring's one permanently-skipped-on-init slot), and the write
/// offset is published as `(initial.len() + 1) mod capacity`. `initial.len()`
/// must not exceed `fifo_length`.
///
/// `read_offset`/`write_offset` are "last-done" indices, not "next-free"
/// ones: `read_offset` names the last slot the consumer has drained (slot 0,
/// a slot nothing is ever written to, standing in for "nothing drained
/// yet"), while `write_offset` names the next free slot the producer will
/// write into. `read_batch` therefore always advances past the stored
/// `read_offset` before reading, never reads it directly.
pub fn channel_with_init<T: Copy>(fifo_length: usize, initial: &[T]) -> (Producer<T>, Consumer<T>) {
    let ring = Ring::new(fifo_length);
    assert!(
        initial.len() <= fifo_length,
        "initial condition count exceeds FIFO length"
    );

    let mut offset = 1 % ring.capacity;
    for &value in initial {
        unsafe {
            (*ring.cells[offset].get()).write(value);
        }
        offset = advance(offset, ring.capacity);
    }
    let write_offset = (initial.len() + 1) % ring.capacity;
    ring.write_offset.store(write_offset, Ordering::Relaxed);

    if !AtomicUsize::new(0).is_lock_free() {
        tracing::warn!(
            fifo_length,
            "thread-crossing FIFO offsets are not lock-free on this platform"
        );
    }

    let ring = Arc::new(ring);
    (
        Producer {
            ring: ring.clone(),
            local_write: write_offset,
            cached_read: 0,
        },
        Consumer {
            ring,
            local_read: 0,
            cached_write: write_offset,
        },
    )
}

fn advance(offset: usize, capacity: usize) -> usize {
    if offset >= capacity - 1 {
        0
    } else {
        offset + 1
    }
}

/// Number of items available to read, given the producer's next-free index
/// `write` and the consumer's last-drained index `read`.
fn avail_to_read(write: usize, read: usize, capacity: usize) -> usize {
    if read < write {
        write - read - 1
    } else {
        capacity - read + write - 1
    }
}

/// Number of free slots available to write, given the same pair.
fn avail_to_write(write: usize, read: usize, capacity: usize) -> usize {
    if read < write {
        capacity - write + read
    } else {
        read - write
    }
}

pub struct Producer<T> {
    ring: Arc<Ring<T>>,
    /// Local write offset, advanced by `write_batch` but not yet published.
    local_write: usize,
    /// Cached last-observed consumer read offset.
    cached_read: usize,
}

impl<T> Producer<T> {
    /// Available-to-write room under the cached consumer read offset, with
    /// no refresh. Cheap, but may understate real room until `ensure_avail`
    /// decides a refresh is warranted.
    fn avail_to_write_cached(&self) -> usize {
        avail_to_write(self.local_write, self.cached_read, self.ring.capacity)
    }

    /// Room available for a batch of `need` items, refreshing the cached
    /// consumer read offset (one atomic acquire load) only if the cached
    /// view says `need` cannot currently be satisfied — the hot path stays
    /// one load per batch rather than one per check.
    fn ensure_avail_to_write(&mut self, need: usize) -> usize {
        let free = self.avail_to_write_cached();
        if free < need {
            self.cached_read = self.ring.read_offset.load(Ordering::Acquire);
            self.avail_to_write_cached()
        } else {
            free
        }
    }

    pub fn avail_to_write(&mut self) -> usize {
        self.ensure_avail_to_write(1)
    }

    pub fn is_not_full(&mut self) -> bool {
        self.avail_to_write() > 0
    }

    /// Copies `items` into the ring starting at the current local write
    /// offset and advances it, without publishing. Returns `false` without
    /// copying anything if there is insufficient room.
    pub fn write_batch(&mut self, items: &[T]) -> bool
    where
        T: Copy,
    {
        if self.ensure_avail_to_write(items.len()) < items.len() {
            return false;
        }
        let mut offset = self.local_write;
        for item in items {
            unsafe {
                (*self.ring.cells[offset].get()).write(*item);
            }
            offset = advance(offset, self.ring.capacity);
        }
        self.local_write = offset;
        true
    }

    /// Publishes the local write offset to the consumer with a release
    /// store, making every batch written since the last flush visible.
    pub fn flush(&self) {
        self.ring.write_offset.store(self.local_write, Ordering::Release);
    }
}

pub struct Consumer<T> {
    ring: Arc<Ring<T>>,
    local_read: usize,
    cached_write: usize,
}

impl<T> Consumer<T> {
    /// Available-to-read count under the cached producer write offset, with
    /// no refresh.
    fn avail_to_read_cached(&self) -> usize {
        avail_to_read(self.cached_write, self.local_read, self.ring.capacity)
    }

    /// Items available to satisfy a read of `need`, refreshing the cached
    /// producer write offset only if the cached view says `need` cannot
    /// currently be satisfied.
    fn ensure_avail_to_read(&mut self, need: usize) -> usize {
        let readable = self.avail_to_read_cached();
        if readable < need {
            self.cached_write = self.ring.write_offset.load(Ordering::Acquire);
            self.avail_to_read_cached()
        } else {
            readable
        }
    }

    pub fn avail_to_read(&mut self) -> usize {
        self.ensure_avail_to_read(1)
    }

    pub fn is_not_empty(&mut self) -> bool {
        self.avail_to_read() > 0
    }

    /// Copies up to `out.len()` items out of the ring into `out`, advancing
    /// the local read offset without publishing. Returns the number of
    /// items actually copied. `local_read` names the last slot drained, so
    /// each item is read from one slot past the current offset, not from
    /// the offset itself.
    pub fn read_batch(&mut self, out: &mut [T]) -> usize
    where
        T: Copy,
    {
        let avail = self.ensure_avail_to_read(out.len()).min(out.len());
        let mut offset = self.local_read;
        for slot in out.iter_mut().take(avail) {
            offset = advance(offset, self.ring.capacity);
            *slot = unsafe { (*self.ring.cells[offset].get()).assume_init() };
        }
        self.local_read = offset;
        avail
    }

    /// Publishes the local read offset to the producer with a release
    /// store, freeing the slots read since the last commit.
    pub fn commit(&self) {
        self.ring.read_offset.store(self.local_read, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips_in_order() {
        let (mut tx, mut rx) = channel::<i32>(4);
        assert!(tx.write_batch(&[1, 2, 3]));
        tx.flush();

        let mut out = [0; 3];
        let n = rx.read_batch(&mut out);
        assert_eq!(n, 3);
        assert_eq!(out, [1, 2, 3]);
        rx.commit();
    }

    #[test]
    fn write_batch_fails_when_it_would_overrun_capacity() {
        let (mut tx, _rx) = channel::<i32>(2);
        assert!(!tx.write_batch(&[1, 2, 3]));
    }

    #[test]
    fn avail_to_write_frees_up_after_consumer_commit() {
        let (mut tx, mut rx) = channel::<i32>(2);
        assert!(tx.write_batch(&[1, 2]));
        tx.flush();
        assert_eq!(tx.avail_to_write(), 0);

        let mut out = [0; 2];
        rx.read_batch(&mut out);
        rx.commit();

        assert_eq!(tx.avail_to_write(), 2);
    }

    #[test]
    fn wraparound_preserves_fifo_order() {
        let (mut tx, mut rx) = channel::<i32>(2);
        for round in 0..5 {
            assert!(tx.write_batch(&[round, round + 100]));
            tx.flush();
            let mut out = [0; 2];
            let n = rx.read_batch(&mut out);
            assert_eq!(n, 2);
            assert_eq!(out, [round, round + 100]);
            rx.commit();
        }
    }

    #[test]
    fn channel_with_init_exposes_seeded_values_for_reading() {
        let (mut tx, mut rx) = channel_with_init::<i32>(4, &[10, 20]);
        assert_eq!(rx.avail_to_read(), 2);
        let mut out = [0; 2];
        assert_eq!(rx.read_batch(&mut out), 2);
        assert_eq!(out, [10, 20]);
        rx.commit();

        assert!(tx.write_batch(&[1, 2, 3, 4]));
        tx.flush();
    }

    #[test]
    fn channel_with_init_empty_behaves_like_plain_channel() {
        let (mut tx, mut rx) = channel_with_init::<i32>(4, &[]);
        assert_eq!(rx.avail_to_read(), 0);
        assert_eq!(tx.avail_to_write(), 4);
    }

    #[test]
    fn cross_thread_producer_consumer() {
        let (mut tx, mut rx) = channel::<i32>(8);
        let writer = std::thread::spawn(move || {
            for batch in 0..10 {
                while !tx.write_batch(&[batch]) {
                    std::thread::yield_now();
                }
                tx.flush();
            }
        });

        let mut received = Vec::new();
        while received.len() < 10 {
            let mut out = [0; 1];
            if rx.read_batch(&mut out) == 1 {
                rx.commit();
                received.push(out[0]);
            } else {
                std::thread::yield_now();
            }
        }
        writer.join().unwrap();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }
}
