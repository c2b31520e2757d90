// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use crossbeam_epoch::{self as epoch, Atomic, Owned, Shared};
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// How many values fit into one segment of the list.
const SEGMENT_CAPACITY: usize = 1024;

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Set with release ordering once the value write is complete; a pop
    /// that claimed this slot synchronizes on it before reading.
    ready: AtomicBool,
}

/// A one-shot ring: indices only ever grow, so a slot is written at most
/// once and read at most once over the segment's lifetime.
///
/// A segment acquires a successor only after every slot has been claimed
/// (`tail == SEGMENT_CAPACITY`), which means a drained segment can never
/// receive another push and is safe to unlink.
struct Segment<T> {
    /// Count of slots consumed by pops.
    head: AtomicUsize,
    /// Count of slots claimed by pushes; never exceeds `SEGMENT_CAPACITY`.
    tail: AtomicUsize,
    slots: Box<[Slot<T>]>,
    next: Atomic<Segment<T>>,
}

impl<T> Segment<T> {
    fn new() -> Segment<T> {
        let slots = (0..SEGMENT_CAPACITY)
            .map(|_| Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
                ready: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Segment {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots,
            next: Atomic::null(),
        }
    }

    fn try_push(&self, item: T) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            if tail >= SEGMENT_CAPACITY {
                // Sealed; the caller grows the list.
                return Some(item);
            }
            match self.tail.compare_exchange_weak(
                tail,
                tail + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = &self.slots[tail];
                    unsafe { (*slot.value.get()).write(item) };
                    slot.ready.store(true, Ordering::Release);
                    return None;
                }
                Err(current) => tail = current,
            }
        }
    }

    fn try_pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            if head >= self.tail.load(Ordering::Acquire) {
                return None;
            }
            match self.head.compare_exchange_weak(
                head,
                head + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = &self.slots[head];
                    // The push that claimed this slot may still be writing.
                    while !slot.ready.load(Ordering::Acquire) {
                        std::hint::spin_loop();
                    }
                    return Some(unsafe { (*slot.value.get()).assume_init_read() });
                }
                Err(current) => head = current,
            }
        }
    }

    fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.saturating_sub(head)
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        // Values claimed by a push but never consumed still need their
        // destructors run. `head..tail` is exactly that window.
        let head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        for slot in &mut self.slots[head..tail] {
            unsafe { slot.value.get_mut().assume_init_drop() };
        }
    }
}

/// An unbounded multi-producer / multi-consumer FIFO.
///
/// The queue is a Michael-Scott-style linked list of fixed-capacity ring
/// segments. Pushes go to the tail segment and grow the list when it fills;
/// pops come from the head segment and unlink it once it is drained and a
/// successor exists. At least one segment exists at all times.
///
/// Unlinked segments are retired through an epoch collector rather than
/// freed in place, so a reader still holding a reference never observes
/// reclaimed memory.
pub struct UnboundedQueue<T> {
    head: Atomic<Segment<T>>,
    tail: Atomic<Segment<T>>,
}

unsafe impl<T: Send> Send for UnboundedQueue<T> {}
unsafe impl<T: Send> Sync for UnboundedQueue<T> {}

impl<T> UnboundedQueue<T> {
    /// Creates an empty queue with one preallocated segment.
    pub fn new() -> UnboundedQueue<T> {
        let queue = UnboundedQueue {
            head: Atomic::null(),
            tail: Atomic::null(),
        };
        unsafe {
            let guard = epoch::unprotected();
            let first = Owned::new(Segment::new()).into_shared(guard);
            queue.head.store(first, Ordering::Relaxed);
            queue.tail.store(first, Ordering::Relaxed);
        }
        queue
    }

    /// Pushes a value onto the queue. Always succeeds, growing the segment
    /// list when the tail segment is full.
    pub fn push(&self, item: T) {
        let guard = epoch::pin();
        let mut item = item;
        loop {
            let tail_ptr = self.tail.load(Ordering::Acquire, &guard);
            let tail = unsafe { tail_ptr.deref() };

            match tail.try_push(item) {
                None => return,
                Some(rejected) => {
                    item = rejected;
                    let next = tail.next.load(Ordering::Acquire, &guard);
                    if next.is_null() {
                        // Grow: fill a fresh segment, then link it. Losing
                        // the linking race hands the value back for a retry.
                        let segment = Owned::new(Segment::new());
                        let stashed = segment.try_push(item);
                        debug_assert!(stashed.is_none());
                        match tail.next.compare_exchange(
                            Shared::null(),
                            segment,
                            Ordering::Release,
                            Ordering::Relaxed,
                            &guard,
                        ) {
                            Ok(linked) => {
                                let _ = self.tail.compare_exchange(
                                    tail_ptr,
                                    linked,
                                    Ordering::Release,
                                    Ordering::Relaxed,
                                    &guard,
                                );
                                return;
                            }
                            Err(race) => {
                                let lost = race.new;
                                item = lost.try_pop().expect("freshly filled segment");
                            }
                        }
                    } else {
                        // Help a stalled linker install the real tail.
                        let _ = self.tail.compare_exchange(
                            tail_ptr,
                            next,
                            Ordering::Release,
                            Ordering::Relaxed,
                            &guard,
                        );
                    }
                }
            }
        }
    }

    /// Attempt to pop a value off the queue. Returns `None` when the queue
    /// is empty.
    pub fn try_pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head_ptr = self.head.load(Ordering::Acquire, &guard);
            let head = unsafe { head_ptr.deref() };

            if let Some(item) = head.try_pop() {
                return Some(item);
            }

            let next = head.next.load(Ordering::Acquire, &guard);
            if next.is_null() {
                return None;
            }

            // The head segment is drained and has a successor: unlink it.
            if self
                .head
                .compare_exchange(head_ptr, next, Ordering::Release, Ordering::Relaxed, &guard)
                .is_ok()
            {
                // The tail must not keep pointing at a retired segment.
                let _ = self.tail.compare_exchange(
                    head_ptr,
                    next,
                    Ordering::Release,
                    Ordering::Relaxed,
                    &guard,
                );
                unsafe { guard.defer_destroy(head_ptr) };
            }
        }
    }

    /// Returns the current size of the queue: an optimistic sum over the
    /// segment list, approximate while producers and consumers are active.
    pub fn size(&self) -> usize {
        let guard = epoch::pin();
        let mut count = 0;
        let mut current = self.head.load(Ordering::Acquire, &guard);
        while let Some(segment) = unsafe { current.as_ref() } {
            count += segment.len();
            current = segment.next.load(Ordering::Acquire, &guard);
        }
        count
    }

    /// Whether the queue currently holds no values. Approximate, like
    /// [`size`](UnboundedQueue::size).
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> Default for UnboundedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for UnboundedQueue<T> {
    fn drop(&mut self) {
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let segment = current.into_owned();
                current = segment.next.load(Ordering::Relaxed, guard);
                drop(segment);
            }
        }
    }
}

impl<T> fmt::Debug for UnboundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnboundedQueue")
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_single_segment() {
        let q = UnboundedQueue::new();
        assert!(q.is_empty());
        assert!(q.try_pop().is_none());

        q.push(1);
        q.push(2);
        q.push(3);
        assert_eq!(q.size(), 3);

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert!(q.try_pop().is_none());
    }

    #[test]
    fn grows_past_one_segment() {
        let q = UnboundedQueue::new();
        let total = 3 * SEGMENT_CAPACITY + 17;

        for i in 0..total {
            q.push(i);
        }
        assert_eq!(q.size(), total);

        for i in 0..total {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert!(q.try_pop().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn drained_queue_accepts_more() {
        let q = UnboundedQueue::new();
        for round in 0..3 {
            for i in 0..(SEGMENT_CAPACITY + 5) {
                q.push(round * 10_000 + i);
            }
            for i in 0..(SEGMENT_CAPACITY + 5) {
                assert_eq!(q.try_pop(), Some(round * 10_000 + i));
            }
            assert!(q.try_pop().is_none());
        }
    }

    #[test]
    fn threaded_mpmc_sum() {
        const PER_PRODUCER: usize = 20_000;
        let q = Arc::new(UnboundedQueue::new());
        let popped = Arc::new(AtomicUsize::new(0));
        let sum = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        q.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let q = q.clone();
                let popped = popped.clone();
                let sum = sum.clone();
                thread::spawn(move || loop {
                    if popped.load(Ordering::Relaxed) >= 4 * PER_PRODUCER {
                        break;
                    }
                    if let Some(v) = q.try_pop() {
                        sum.fetch_add(v, Ordering::Relaxed);
                        popped.fetch_add(1, Ordering::Relaxed);
                    } else {
                        thread::yield_now();
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }
        for c in consumers {
            c.join().unwrap();
        }

        let total = 4 * PER_PRODUCER;
        assert_eq!(popped.load(Ordering::Relaxed), total);
        assert_eq!(sum.load(Ordering::Relaxed), total * (total - 1) / 2);
    }

    #[test]
    fn single_writer_order_is_fifo() {
        let q = Arc::new(UnboundedQueue::new());

        let writer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..50_000usize {
                    q.push(i);
                }
            })
        };

        let mut expected = 0;
        while expected < 50_000 {
            if let Some(v) = q.try_pop() {
                assert_eq!(v, expected);
                expected += 1;
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn drop_releases_leftovers() {
        let q = UnboundedQueue::new();
        for i in 0..(SEGMENT_CAPACITY + 100) {
            q.push(format!("value-{}", i));
        }
        q.try_pop();
        drop(q);
    }
}
