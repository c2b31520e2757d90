// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use crate::error::AggregateError;
use crate::executor::Scheduler;
use crate::task::runnable::Runnable;
use crate::task::state::{COMPLETED, RUNNING, SCHEDULED};
use futures_lite::future::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{panic_any, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// A captured panic payload from a task body.
type Failure = Box<dyn Any + Send + 'static>;
type Outcome<T> = std::result::Result<T, Failure>;

struct Slot<T> {
    value: Option<Outcome<T>>,
    /// At most one awaiter per task; the promise stores its waker here.
    waker: Option<Waker>,
}

/// The task's result slot plus its completion signal.
///
/// The slot is written exactly once, under the mutex, and the condvar fires
/// exactly once alongside it. After that the slot is read-only until the
/// first and only consumer moves the outcome out.
struct Promise<T> {
    state: AtomicU8,
    slot: Mutex<Slot<T>>,
    completed: Condvar,
}

impl<T> Promise<T> {
    fn new() -> Arc<Promise<T>> {
        Arc::new(Promise {
            state: AtomicU8::new(SCHEDULED),
            slot: Mutex::new(Slot {
                value: None,
                waker: None,
            }),
            completed: Condvar::new(),
        })
    }

    fn start(&self) {
        self.state.store(RUNNING, Ordering::Release);
    }

    fn complete(&self, outcome: Outcome<T>) {
        let mut slot = self.slot.lock().expect("unreachable: poisoned mutex");
        debug_assert!(slot.value.is_none());
        slot.value = Some(outcome);
        self.state.store(COMPLETED, Ordering::Release);
        self.completed.notify_all();
        let waker = slot.waker.take();
        drop(slot);
        if let Some(w) = waker {
            w.wake();
        }
    }

    fn done(&self) -> bool {
        self.state.load(Ordering::Acquire) & COMPLETED != 0
    }

    /// Blocks until completed and moves the outcome out.
    fn wait(&self) -> Outcome<T> {
        let mut slot = self.slot.lock().expect("unreachable: poisoned mutex");
        loop {
            if let Some(outcome) = slot.value.take() {
                return outcome;
            }
            slot = self
                .completed
                .wait(slot)
                .expect("unreachable: poisoned mutex");
        }
    }

    /// Blocks until completed without touching the outcome.
    fn join_blocking(&self) {
        let guard = self.slot.lock().expect("unreachable: poisoned mutex");
        let _guard = self
            .completed
            .wait_while(guard, |_| !self.done())
            .expect("unreachable: poisoned mutex");
    }

    fn wait_deadline(&self, timeout: Duration) -> bool {
        let guard = self.slot.lock().expect("unreachable: poisoned mutex");
        let _result = self
            .completed
            .wait_timeout_while(guard, timeout, |_| !self.done())
            .expect("unreachable: poisoned mutex");
        self.done()
    }
}

/// A hot-started single-value asynchronous computation.
///
/// A task begins executing as soon as it is created: [`spawn`] and [`run`]
/// hand the body to the scheduler at construction time, and awaiting the
/// returned handle later only synchronizes on completion. This differs from
/// Rust's usual lazy futures and is observable — by the time you ask for the
/// value it may long since have been computed.
///
/// The handle is the single consumer of the task's value. [`result`] takes
/// `self`, so a second extraction is unrepresentable; awaiting the task
/// consumes it the same way. Dropping an unfinished handle blocks until the
/// body has completed, so a live frame is never torn down mid-run.
///
/// A panic inside the body is captured and re-raised at the consumer's next
/// synchronization point, i.e. inside [`result`] or at the `.await`.
///
/// # Examples
///
/// ```
/// use fervio::Task;
///
/// let task = Task::run(|| 6 * 7);
/// assert_eq!(task.result(), 42);
/// ```
///
/// Tasks are also futures, so they can be awaited from other tasks:
///
/// ```
/// use fervio::Task;
///
/// let outer = Task::spawn(async {
///     let inner = Task::run(|| 40);
///     inner.await + 2
/// });
/// assert_eq!(outer.result(), 42);
/// ```
///
/// [`spawn`]: Task::spawn
/// [`run`]: Task::run
/// [`result`]: Task::result
pub struct Task<T> {
    promise: Arc<Promise<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Hot-starts `future` on the default scheduler.
    pub fn spawn<F>(future: F) -> Task<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        Scheduler::get().spawn(future)
    }

    /// Constructs a task whose body is `body()`, hot-started on the default
    /// scheduler. The closure runs to completion on one worker thread.
    pub fn run<F>(body: F) -> Task<T>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Task::spawn(async move { body() })
    }

    pub(crate) fn spawn_raw<F>(future: F, scheduler: &Scheduler) -> Task<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let promise = Promise::new();
        let shared = promise.clone();
        let wrapped = async move {
            shared.start();
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            shared.complete(outcome);
        };
        let runnable = Runnable::new(Box::pin(wrapped), scheduler.intake().clone());
        scheduler.schedule(runnable);
        Task { promise }
    }

    /// Blocks the calling thread until the task completes, then returns its
    /// value, re-raising the body's panic if it failed.
    ///
    /// Consumes the handle: the value is moved out and cannot be asked for
    /// twice.
    pub fn result(self) -> T {
        match self.promise.wait() {
            Ok(value) => value,
            Err(failure) => resume_unwind(failure),
        }
    }

    /// Returns a task that completes once every input task has completed.
    ///
    /// Failures never short-circuit the join: every input is driven to
    /// completion, every captured panic is collected, and iff at least one
    /// input failed the returned task fails with an [`AggregateError`]
    /// carrying exactly those payloads.
    ///
    /// # Examples
    ///
    /// ```
    /// use fervio::Task;
    ///
    /// let tasks: Vec<_> = (0..10).map(|i| Task::run(move || i * i)).collect();
    /// Task::when_all(tasks).result();
    /// ```
    ///
    /// [`AggregateError`]: crate::AggregateError
    pub fn when_all(tasks: Vec<Task<T>>) -> Task<()> {
        Task::spawn(async move {
            let mut failures = Vec::new();
            for task in tasks {
                if let Err(failure) = (Joined { task }).await {
                    failures.push(failure);
                }
            }
            if !failures.is_empty() {
                panic_any(AggregateError::new(failures));
            }
        })
    }
}

impl<T> Task<T> {
    /// Whether the task has completed.
    pub fn done(&self) -> bool {
        self.promise.done()
    }

    /// Blocks until the task completes or `timeout` elapses, whichever is
    /// first. Returns whether the task is done, leaving the value in place
    /// either way; follow up with [`result`](Task::result) to extract it.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.promise.wait_deadline(timeout)
    }
}

impl<T> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self
            .promise
            .slot
            .lock()
            .expect("unreachable: poisoned mutex");
        if let Some(outcome) = slot.value.take() {
            drop(slot);
            return match outcome {
                Ok(value) => Poll::Ready(value),
                Err(failure) => resume_unwind(failure),
            };
        }
        if self.promise.done() {
            panic!("task polled again after completion");
        }
        match &mut slot.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            other => *other = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        // Never tear down a handle while its frame may still be running.
        if !self.promise.done() {
            self.promise.join_blocking();
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("done", &self.done()).finish()
    }
}

/// Resolves to the task's outcome without re-raising a captured panic; used
/// by `when_all` to collect failures instead of propagating the first one.
struct Joined<T> {
    task: Task<T>,
}

impl<T> Future for Joined<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome<T>> {
        let mut slot = self
            .task
            .promise
            .slot
            .lock()
            .expect("unreachable: poisoned mutex");
        if let Some(outcome) = slot.value.take() {
            return Poll::Ready(outcome);
        }
        match &mut slot.waker {
            Some(waker) if waker.will_wake(cx.waker()) => {}
            other => *other = Some(cx.waker().clone()),
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{AggregateError, Channel};
    use std::panic;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn returns_value() {
        let task = Task::run(|| 21 * 2);
        assert_eq!(task.result(), 42);
    }

    #[test]
    fn hot_start_runs_before_await() {
        let channel = Channel::unbounded();
        let sink = channel.clone();

        let task = Task::run(move || {
            sink.try_send("computed").unwrap();
        });

        // The body runs without anyone awaiting the handle: the effect is
        // observable through the channel alone.
        assert_eq!(channel.recv(), Some("computed"));
        task.result();
    }

    #[test]
    fn done_flips_on_completion() {
        let gate = Channel::unbounded();
        let release = gate.clone();

        let task = Task::run(move || {
            gate.recv();
        });
        assert!(!task.done());

        release.try_send(()).unwrap();
        assert!(task.wait_timeout(Duration::from_secs(5)));
        assert!(task.done());
        task.result();
    }

    #[test]
    fn wait_timeout_expires_on_stuck_task() {
        let gate: Channel<()> = Channel::unbounded();
        let release = gate.clone();

        let task = Task::run(move || {
            gate.recv();
        });
        assert!(!task.wait_timeout(Duration::from_millis(20)));

        release.try_send(()).unwrap();
        task.result();
    }

    #[test]
    fn panic_is_rethrown_at_result() {
        let task = Task::run(|| -> i32 { panic!("boom") });
        let err = panic::catch_unwind(AssertUnwindSafe(|| task.result())).unwrap_err();
        let message = err.downcast_ref::<&str>().copied();
        assert_eq!(message, Some("boom"));
    }

    #[test]
    fn panic_is_rethrown_at_await() {
        let outer = Task::spawn(async {
            let inner = Task::run(|| -> i32 { panic!("inner failed") });
            inner.await
        });
        let err = panic::catch_unwind(AssertUnwindSafe(|| outer.result())).unwrap_err();
        assert_eq!(err.downcast_ref::<&str>().copied(), Some("inner failed"));
    }

    #[test]
    fn fan_out_squares() {
        let tasks: Vec<_> = (0..10).map(|i| Task::run(move || i * i)).collect();
        let values: Vec<i32> = tasks.into_iter().map(|t| t.result()).collect();
        let expected: Vec<i32> = (0..10).map(|i| i * i).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn when_all_succeeds_when_all_do() {
        let tasks: Vec<_> = (0..10).map(|i| Task::run(move || i * i)).collect();
        Task::when_all(tasks).result();
    }

    #[test]
    fn when_all_aggregates_every_failure() {
        let tasks = vec![
            Task::run(|| ()),
            Task::run(|| panic!("first")),
            Task::run(|| panic!("second")),
        ];
        let joined = Task::when_all(tasks);

        let err = panic::catch_unwind(AssertUnwindSafe(|| joined.result())).unwrap_err();
        let aggregate = err.downcast::<AggregateError>().unwrap();
        assert_eq!(aggregate.len(), 2);
    }

    #[test]
    fn when_all_of_nothing_completes() {
        Task::when_all(Vec::<Task<i32>>::new()).result();
    }

    #[test]
    fn drop_joins_running_task() {
        let observed = Arc::new(AtomicUsize::new(0));
        let counter = observed.clone();

        let task = Task::run(move || {
            thread::sleep(Duration::from_millis(30));
            counter.store(1, Ordering::SeqCst);
        });
        drop(task);

        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn awaits_channel_wakeups() {
        let channel = Channel::unbounded();
        let reader = channel.clone();

        let task = Task::spawn(async move {
            let mut total = 0;
            while let Some(value) = reader.recv_async().await {
                total += value;
            }
            total
        });

        for i in 1..=10 {
            channel.try_send(i).unwrap();
        }
        channel.close();

        assert_eq!(task.result(), 55);
    }

    #[test]
    fn non_copy_values_move_through() {
        let task = Task::run(|| format!("{}-{}", "hot", "start"));
        assert_eq!(task.result(), "hot-start");
    }
}
