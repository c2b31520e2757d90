// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

const CACHELINE_LEN: usize = 64;

const fn cacheline_pad(used: usize) -> usize {
    CACHELINE_LEN / std::mem::size_of::<usize>() - used
}

/// One ring cell: the value storage plus the turn stamp that publishes it.
///
/// The stamp of slot `i` starts at `i`. A push that claimed index `t` stores
/// `t + 1` once the value is written; a pop that claimed index `h` stores
/// `h + capacity` once the value is moved out, handing the slot to the next
/// lap's producer.
struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// A fixed-capacity multi-producer / multi-consumer FIFO over a preallocated
/// ring buffer.
///
/// Capacity is exact: a queue created with `BoundedQueue::new(n)` holds at
/// most `n` values. The monotonically increasing head and tail indices are
/// advanced by CAS, and each slot carries a turn stamp, so empty and full are
/// distinguished without a sentinel slot. A successful [`try_pop`] always
/// observes a fully initialized value: the claiming CAS reserves the slot and
/// the stamp synchronizes the value write with the read.
///
/// The design is obstruction-free rather than strictly lock-free: an
/// operation that loses its CAS retries, and a pop that claimed a slot whose
/// producer has not yet published spins until the stamp lands.
///
/// [`try_pop`]: BoundedQueue::try_pop
#[repr(C)]
pub struct BoundedQueue<T> {
    slots: Box<[Slot<T>]>,
    _padding0: [usize; cacheline_pad(2)],

    /// Consumer cacheline: index of the next slot to pop.
    head: AtomicUsize,
    _padding1: [usize; cacheline_pad(1)],

    /// Producer cacheline: index of the next slot to push.
    tail: AtomicUsize,
    _padding2: [usize; cacheline_pad(1)],
}

unsafe impl<T: Send> Send for BoundedQueue<T> {}
unsafe impl<T: Send> Sync for BoundedQueue<T> {}

impl<T> BoundedQueue<T> {
    /// Creates a queue holding at most `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> BoundedQueue<T> {
        assert!(capacity > 0, "capacity must be non-zero");

        let slots = (0..capacity)
            .map(|i| Slot {
                stamp: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        BoundedQueue {
            slots,
            _padding0: [0; cacheline_pad(2)],
            head: AtomicUsize::new(0),
            _padding1: [0; cacheline_pad(1)],
            tail: AtomicUsize::new(0),
            _padding2: [0; cacheline_pad(1)],
        }
    }

    /// Attempt to push a value onto the queue.
    ///
    /// This method does not block. If the queue is not full, the value is
    /// added and `None` is returned, signifying success. If the queue is
    /// full, `Some(v)` hands the original value back.
    pub fn try_push(&self, item: T) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[tail % self.slots.len()];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let turn = stamp.wrapping_sub(tail) as isize;

            if turn == 0 {
                // The slot is ours for this lap; claim the index.
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        unsafe { (*slot.value.get()).write(item) };
                        slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                        return None;
                    }
                    Err(current) => tail = current,
                }
            } else if turn < 0 {
                // The previous lap's value still occupies the slot.
                return Some(item);
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempt to pop a value off the queue.
    ///
    /// This method does not block. If the queue is empty it returns `None`;
    /// otherwise `Some(v)` with the value at the head of the FIFO.
    pub fn try_pop(&self) -> Option<T> {
        let mut head = self.head.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[head % self.slots.len()];
            let stamp = slot.stamp.load(Ordering::Acquire);
            let turn = stamp.wrapping_sub(head.wrapping_add(1)) as isize;

            if turn == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.stamp
                            .store(head.wrapping_add(self.slots.len()), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => head = current,
                }
            } else if turn < 0 {
                // No published value at the head.
                return None;
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Returns the current size of the queue.
    ///
    /// The count is approximate while producers and consumers are active;
    /// it is exact when the queue is quiescent.
    pub fn size(&self) -> usize {
        self.tail
            .load(Ordering::Acquire)
            .wrapping_sub(self.head.load(Ordering::Acquire))
    }

    /// Returns the total capacity of the queue.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Whether the queue currently holds no values. Approximate, like
    /// [`size`](BoundedQueue::size).
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> Drop for BoundedQueue<T> {
    fn drop(&mut self) {
        // Pop the rest of the values off the queue. By moving them into this
        // scope, we implicitly call their destructor. Slots never observed by
        // a pop hold no initialized value, so nothing else needs running.
        while self.try_pop().is_some() {}
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("capacity", &self.capacity())
            .field("head", &self.head.load(Ordering::Relaxed))
            .field("tail", &self.tail.load(Ordering::Relaxed))
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
    fn test_queue_layout() {
        assert_eq!(
            std::mem::size_of::<BoundedQueue<()>>(),
            3 * CACHELINE_LEN
        );
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn test_zero_capacity_rejected() {
        let _ = BoundedQueue::<usize>::new(0);
    }

    #[test]
    fn test_try_push() {
        let q = BoundedQueue::new(10);

        for i in 0..10 {
            assert!(q.try_push(i).is_none());
            assert_eq!(q.capacity(), 10);
            assert_eq!(q.size(), i + 1);
        }

        match q.try_push(10) {
            Some(v) => assert_eq!(v, 10),
            None => panic!("queue should not have accepted another write!"),
        }
    }

    #[test]
    fn test_try_pop() {
        let q = BoundedQueue::new(10);

        assert!(q.try_pop().is_none());

        q.try_push(123);

        match q.try_pop() {
            Some(v) => assert_eq!(v, 123),
            None => panic!("queue was not empty but try_pop() returned nothing!"),
        }

        assert!(q.try_pop().is_none());
    }

    #[test]
    fn test_slot_reuse_across_laps() {
        let q = BoundedQueue::new(2);
        for lap in 0..10 {
            assert!(q.try_push(lap * 2).is_none());
            assert!(q.try_push(lap * 2 + 1).is_none());
            assert!(q.try_push(99).is_some());
            assert_eq!(q.try_pop(), Some(lap * 2));
            assert_eq!(q.try_pop(), Some(lap * 2 + 1));
            assert!(q.try_pop().is_none());
        }
    }

    #[test]
    fn test_threaded_fifo() {
        let q = Arc::new(BoundedQueue::new(500));

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..100_000usize {
                    while q.try_push(i).is_some() {
                        thread::yield_now();
                    }
                }
            })
        };

        for i in 0..100_000usize {
            loop {
                if let Some(v) = q.try_pop() {
                    assert_eq!(v, i);
                    break;
                }
            }
        }

        producer.join().unwrap();
    }

    #[test]
    fn test_threaded_mpmc() {
        const PER_PRODUCER: usize = 10_000;
        let q = Arc::new(BoundedQueue::new(64));
        let popped = Arc::new(AtomicUsize::new(0));
        let sum = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        let mut v = p * PER_PRODUCER + i;
                        loop {
                            match q.try_push(v) {
                                None => break,
                                Some(back) => {
                                    v = back;
                                    thread::yield_now();
                                }
                            }
                        }
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
    fn test_drop_releases_leftovers() {
        let q = BoundedQueue::new(8);
        for i in 0..5 {
            q.try_push(format!("value-{}", i));
        }
        // Dropping with live values must run their destructors.
        drop(q);
    }
}
