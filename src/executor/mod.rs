// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! fervio::executor drives tasks to completion on a fixed pool of worker
//! threads.
//!
//! The [`Scheduler`] owns the pool. Workers block on an internal unbounded
//! channel of runnable tasks and resume whatever arrives, in strict FIFO
//! intake order: no priorities, no affinity, no work stealing. A task that
//! suspends is re-submitted by whatever wakes it, not by the scheduler.
//!
//! Most callers never touch this module directly: [`Task::spawn`] and
//! [`Task::run`] go through the process-wide default pool returned by
//! [`Scheduler::get`]. Constructing an explicit pool is mainly useful for
//! tests and for isolating workloads:
//!
//! ```
//! use fervio::SchedulerBuilder;
//!
//! let scheduler = SchedulerBuilder::new()
//!     .threads(2)
//!     .name("crunch")
//!     .build()
//!     .unwrap();
//!
//! let task = scheduler.spawn(async { 6 * 7 });
//! assert_eq!(task.result(), 42);
//! ```
//!
//! [`Task::spawn`]: crate::Task::spawn
//! [`Task::run`]: crate::Task::run

use crate::channels::Channel;
use crate::task::runnable::Runnable;
use crate::task::Task;
use log::{debug, trace};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

lazy_static! {
    static ref DEFAULT_SCHEDULER: Scheduler = SchedulerBuilder::new()
        .build()
        .expect("failed to start the default scheduler");
}

#[derive(Debug)]
/// Configuration for a [`Scheduler`] pool.
///
/// The defaults size the pool to the machine's hardware concurrency and name
/// worker threads `fervio-{index}`.
pub struct SchedulerBuilder {
    threads: usize,
    name: String,
}

impl SchedulerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> SchedulerBuilder {
        SchedulerBuilder {
            threads: num_cpus::get(),
            name: String::from("fervio"),
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn threads(mut self, count: usize) -> SchedulerBuilder {
        assert!(count > 0, "a scheduler needs at least one worker");
        self.threads = count;
        self
    }

    /// Sets the prefix used to name worker threads.
    pub fn name(mut self, name: &str) -> SchedulerBuilder {
        self.name = String::from(name);
        self
    }

    /// Spawns the worker pool.
    pub fn build(self) -> crate::Result<Scheduler> {
        let intake: Channel<Arc<Runnable>> = Channel::unbounded();
        let finished = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(self.threads);
        for index in 0..self.threads {
            let intake = intake.clone();
            let finished = finished.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.name, index))
                .spawn(move || Scheduler::worker(intake, finished))?;
            workers.push(handle);
        }

        debug!("scheduler started with {} workers", self.threads);
        Ok(Scheduler {
            intake,
            finished,
            workers,
        })
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed pool of worker threads multiplexing suspended tasks.
///
/// Each submitted task is resumed by exactly one worker, always on a thread
/// other than the submitter's. Submissions are accepted until the scheduler
/// shuts down; afterwards they are silently dropped, so a task spawned on a
/// shut-down pool never completes.
///
/// Dropping the scheduler closes its intake channel, which poisons every
/// worker's blocking wait, and joins the workers before returning.
pub struct Scheduler {
    intake: Channel<Arc<Runnable>>,
    finished: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawns a pool with the given number of workers and default naming.
    pub fn new(threads: usize) -> crate::Result<Scheduler> {
        SchedulerBuilder::new().threads(threads).build()
    }

    /// The process-wide default scheduler, lazily started on first use and
    /// sized to the machine's hardware concurrency.
    pub fn get() -> &'static Scheduler {
        &DEFAULT_SCHEDULER
    }

    /// Hot-starts `future` on this pool and returns the handle to its
    /// eventual value.
    pub fn spawn<F>(&self, future: F) -> Task<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Task::spawn_raw(future, self)
    }

    /// The number of worker threads in this pool.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Submits a resume handle. Each submission is consumed by exactly one
    /// worker; submissions after shutdown are dropped.
    pub(crate) fn schedule(&self, runnable: Arc<Runnable>) {
        let _ = self.intake.try_send(runnable);
    }

    pub(crate) fn intake(&self) -> &Channel<Arc<Runnable>> {
        &self.intake
    }

    fn worker(intake: Channel<Arc<Runnable>>, finished: Arc<AtomicBool>) {
        loop {
            if finished.load(Ordering::Acquire) {
                break;
            }
            match intake.recv() {
                Some(runnable) => runnable.run(),
                // Closed and drained: the pool is shutting down.
                None => break,
            }
        }
        trace!("scheduler worker exiting");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::Release);
        self.intake.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("scheduler stopped");
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("threads", &self.workers.len())
            .field("finished", &self.finished.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Channel;
    use std::thread;

    #[test]
    fn spawns_and_completes() {
        let scheduler = Scheduler::new(2).unwrap();
        let task = scheduler.spawn(async { 1 + 1 });
        assert_eq!(task.result(), 2);
    }

    #[test]
    fn runs_on_a_worker_thread() {
        let scheduler = SchedulerBuilder::new()
            .threads(1)
            .name("probe")
            .build()
            .unwrap();

        let submitter = thread::current().id();
        let task = scheduler.spawn(async move { thread::current().id() });
        assert_ne!(task.result(), submitter);
    }

    #[test]
    fn workers_carry_the_pool_name() {
        let scheduler = SchedulerBuilder::new()
            .threads(1)
            .name("tagged")
            .build()
            .unwrap();

        let task = scheduler.spawn(async {
            thread::current().name().map(String::from)
        });
        assert_eq!(task.result().as_deref(), Some("tagged-0"));
    }

    #[test]
    fn liveness_on_a_single_worker() {
        let scheduler = Scheduler::new(1).unwrap();
        let tasks: Vec<_> = (0..32)
            .map(|i| scheduler.spawn(async move { i * 2 }))
            .collect();
        let total: i32 = tasks.into_iter().map(|t| t.result()).sum();
        assert_eq!(total, (0..32).map(|i| i * 2).sum());
    }

    #[test]
    fn drop_joins_workers() {
        let observed = Channel::unbounded();
        {
            let scheduler = Scheduler::new(2).unwrap();
            let sink = observed.clone();
            // The discarded handle blocks until the task completed, so the
            // scheduler drop below only has to join idle workers.
            scheduler.spawn(async move {
                sink.try_send(7).unwrap();
            });
        }
        assert_eq!(observed.try_recv(), Some(7));
    }

    #[test]
    fn default_scheduler_is_shared() {
        let a = Scheduler::get() as *const Scheduler;
        let b = Scheduler::get() as *const Scheduler;
        assert_eq!(a, b);
        assert!(Scheduler::get().threads() >= 1);
    }
}
