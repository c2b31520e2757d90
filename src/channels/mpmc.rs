// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use crate::channels::ChannelCapacity;
use crate::error::FervioError;
use crate::queue::{BoundedQueue, UnboundedQueue};
use futures_lite::future;
use futures_lite::stream::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};

type Result<T, V> = crate::Result<T, V>;

enum Backing<T> {
    Bounded(BoundedQueue<T>),
    Unbounded(UnboundedQueue<T>),
}

impl<T> Backing<T> {
    fn try_push(&self, item: T) -> Option<T> {
        match self {
            Backing::Bounded(queue) => queue.try_push(item),
            Backing::Unbounded(queue) => {
                queue.push(item);
                None
            }
        }
    }

    fn try_pop(&self) -> Option<T> {
        match self {
            Backing::Bounded(queue) => queue.try_pop(),
            Backing::Unbounded(queue) => queue.try_pop(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Backing::Bounded(queue) => queue.size(),
            Backing::Unbounded(queue) => queue.size(),
        }
    }
}

/// Async readers parked on the channel. Kept under the handshake mutex so
/// registration is serialized with writes and close.
struct Waiters {
    wakers: Vec<Waker>,
}

struct Inner<T> {
    queue: Backing<T>,
    capacity: ChannelCapacity,
    /// Once true, never false again.
    closed: AtomicBool,
    handshake: Mutex<Waiters>,
    readable: Condvar,
}

/// A multi-producer / multi-consumer channel.
///
/// Cloning the handle is cheap and every clone refers to the same pipe, so
/// any number of threads can write and read concurrently. The channel
/// offers three read paths: nonblocking [`try_recv`], blocking [`recv`] and
/// the task-suspending [`recv_async`].
///
/// Closing is the terminal state change: after [`close`], writes are
/// rejected (the item comes back in the error) while reads continue to
/// drain whatever is still queued, and then report the empty sentinel
/// `None`. Iterating a channel therefore yields every value written before
/// the close, and nothing after:
///
/// # Examples
///
/// ```
/// use fervio::Channel;
/// use std::thread;
///
/// let channel = Channel::unbounded();
/// let writer = channel.clone();
///
/// let t = thread::spawn(move || {
///     for i in 1..=3 {
///         writer.try_send(i).unwrap();
///     }
///     writer.close();
/// });
///
/// let seen: Vec<i32> = channel.iter().collect();
/// t.join().unwrap();
/// assert_eq!(seen, vec![1, 2, 3]);
/// ```
///
/// [`try_recv`]: Channel::try_recv
/// [`recv`]: Channel::recv
/// [`recv_async`]: Channel::recv_async
/// [`close`]: Channel::close
pub struct Channel<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Channel {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Channel<T> {
    fn with_backing(queue: Backing<T>, capacity: ChannelCapacity) -> Channel<T> {
        Channel {
            inner: Arc::new(Inner {
                queue,
                capacity,
                closed: AtomicBool::new(false),
                handshake: Mutex::new(Waiters { wakers: Vec::new() }),
                readable: Condvar::new(),
            }),
        }
    }

    /// Creates a channel with unbounded capacity: writes never report
    /// [`WouldBlock`].
    ///
    /// [`WouldBlock`]: crate::FervioError::WouldBlock
    pub fn unbounded() -> Channel<T> {
        Channel::with_backing(
            Backing::Unbounded(UnboundedQueue::new()),
            ChannelCapacity::Unbounded,
        )
    }

    /// Creates a channel holding at most `capacity` in-flight values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use fervio::Channel;
    ///
    /// let channel = Channel::bounded(2);
    /// assert!(channel.try_send('a').is_ok());
    /// assert!(channel.try_send('b').is_ok());
    /// let err = channel.try_send('c').unwrap_err();
    /// assert_eq!(err.into_inner(), Some('c')); // the value comes back
    ///
    /// assert_eq!(channel.try_recv(), Some('a'));
    /// assert!(channel.try_send('c').is_ok()); // room again
    /// ```
    pub fn bounded(capacity: usize) -> Channel<T> {
        Channel::with_backing(
            Backing::Bounded(BoundedQueue::new(capacity)),
            ChannelCapacity::Bounded(capacity),
        )
    }

    /// Sends a value into this channel without blocking.
    ///
    /// Returns [`Closed`] carrying the item back if the channel was closed,
    /// and [`WouldBlock`] carrying the item back if this is a bounded
    /// channel at capacity. On success one blocked reader and one suspended
    /// async reader are notified.
    ///
    /// [`Closed`]: crate::FervioError::Closed
    /// [`WouldBlock`]: crate::FervioError::WouldBlock
    pub fn try_send(&self, item: T) -> Result<(), T> {
        let mut waiters = self.inner.handshake.lock().unwrap();
        if self.inner.closed.load(Ordering::Relaxed) {
            return Err(FervioError::Closed(item));
        }
        if let Some(rejected) = self.inner.queue.try_push(item) {
            return Err(FervioError::WouldBlock(rejected));
        }
        self.inner.readable.notify_one();
        let waker = if waiters.wakers.is_empty() {
            None
        } else {
            Some(waiters.wakers.remove(0))
        };
        drop(waiters);
        // Wake outside the lock so the woken task can immediately poll.
        if let Some(w) = waker {
            w.wake();
        }
        Ok(())
    }

    /// Receives a value if one is immediately available.
    ///
    /// `None` means the channel is currently empty; it says nothing about
    /// whether the channel is closed.
    pub fn try_recv(&self) -> Option<T> {
        self.inner.queue.try_pop()
    }

    /// Receives a value, blocking the calling thread until one is available
    /// or the channel is closed.
    ///
    /// A closed channel still yields its residual values; `None` is
    /// returned only once the channel is both closed and drained.
    pub fn recv(&self) -> Option<T> {
        if let Some(item) = self.inner.queue.try_pop() {
            return Some(item);
        }
        let mut waiters = self.inner.handshake.lock().unwrap();
        loop {
            if let Some(item) = self.inner.queue.try_pop() {
                return Some(item);
            }
            if self.inner.closed.load(Ordering::Relaxed) {
                return None;
            }
            waiters = self.inner.readable.wait(waiters).unwrap();
        }
    }

    /// Receives a value, suspending the calling task until one is available
    /// or the channel is closed. The async counterpart of [`recv`].
    ///
    /// [`recv`]: Channel::recv
    pub async fn recv_async(&self) -> Option<T> {
        future::poll_fn(|cx| self.recv_one(cx)).await
    }

    fn recv_one(&self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut waiters = self.inner.handshake.lock().unwrap();
        if let Some(item) = self.inner.queue.try_pop() {
            return Poll::Ready(Some(item));
        }
        if self.inner.closed.load(Ordering::Relaxed) {
            return Poll::Ready(None);
        }
        if !waiters.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            waiters.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }

    /// Closes the channel, waking every blocked and suspended reader.
    ///
    /// Closing is idempotent and irreversible. Writes fail from this point
    /// on; reads drain the queue and then report `None`.
    pub fn close(&self) {
        let mut waiters = self.inner.handshake.lock().unwrap();
        self.inner.closed.store(true, Ordering::Release);
        self.inner.readable.notify_all();
        let wakers = std::mem::take(&mut waiters.wakers);
        drop(waiters);
        for w in wakers {
            w.wake();
        }
    }

    /// Whether [`close`](Channel::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the number of values currently queued. Approximate while
    /// writers and readers are active.
    pub fn len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Whether the channel currently holds no values. Approximate, like
    /// [`len`](Channel::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The capacity this channel was created with.
    pub fn capacity(&self) -> ChannelCapacity {
        self.inner.capacity
    }

    /// A blocking iterator over the channel, yielding values until the
    /// channel is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { channel: self }
    }

    /// A [`Stream`] over the channel, the async counterpart of
    /// [`iter`](Channel::iter): it yields values until the channel is
    /// closed and drained.
    ///
    /// [`Stream`]: futures_lite::Stream
    pub fn stream(&self) -> ChannelStream<'_, T> {
        ChannelStream { channel: self }
    }
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("capacity", &self.inner.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Blocking channel iterator; see [`Channel::iter`].
pub struct Iter<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.channel.recv()
    }
}

impl<T> fmt::Debug for Iter<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Iter {:?}", self.channel)
    }
}

impl<'a, T> IntoIterator for &'a Channel<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Async channel stream; see [`Channel::stream`].
pub struct ChannelStream<'a, T> {
    channel: &'a Channel<T>,
}

impl<T> Stream for ChannelStream<'_, T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.channel.recv_one(cx)
    }
}

impl<T> fmt::Debug for ChannelStream<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelStream {:?}", self.channel)
    }
}
