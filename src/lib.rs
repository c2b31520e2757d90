// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! # Fervio - hot tasks on plain threads.
//!
//! ## What is Fervio
//!
//! Fervio is a small general-purpose asynchronous runtime built from four
//! cooperating primitives:
//!
//! * [`Task`] - a single-value computation that starts executing the moment
//!   it is constructed, on a background worker thread. Await it from another
//!   task or block on [`Task::result`] from synchronous code.
//! * [`Channel`] - a multi-producer / multi-consumer pipe, bounded or
//!   unbounded, with nonblocking, blocking and async read paths and close
//!   propagation.
//! * [`Sequence`] - a cold, single-consumer lazy sequence with a combinator
//!   pipeline (filter, map, skip, distinct, reverse, chunk, ...).
//! * [`Scheduler`] - the fixed pool of OS threads the tasks run on.
//!
//! Two lock-free queues back the channel layer and are exported as building
//! blocks in their own right: a fixed-capacity ring ([`BoundedQueue`]) and a
//! segment list that grows on demand ([`UnboundedQueue`]).
//!
//! ## Hot start
//!
//! The one convention to internalize is that task construction *is*
//! submission. There is no separate "start" step and no lazily polled
//! future sitting inert until awaited:
//!
//! ```
//! use fervio::{Channel, Task};
//!
//! let channel = Channel::unbounded();
//! let sink = channel.clone();
//!
//! // Already running before we ever look at the handle.
//! let task = Task::run(move || sink.try_send(42).is_ok());
//!
//! assert_eq!(channel.recv(), Some(42));
//! assert!(task.result());
//! ```
//!
//! ## Threads, not reactors
//!
//! Fervio schedules plain OS threads and provides no I/O reactor, no timers
//! beyond a deadline wait on a task result, and no work stealing. A task
//! body may block; it simply occupies its worker while it does. Suspension
//! happens at explicit awaits - of another task, of a channel's
//! [`recv_async`], or of any user future - and a suspended task is revived
//! by whatever wakes it, not by the scheduler.
//!
//! ## Failure model
//!
//! A panic inside a task body is captured, parked in the task's result slot,
//! and re-raised at the consumer's next synchronization point. Joining a
//! whole batch goes through [`Task::when_all`], which never short-circuits
//! and reports every failure at once via [`AggregateError`].
//!
//! [`recv_async`]: Channel::recv_async

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

#[macro_use]
extern crate lazy_static;

pub mod channels;
mod error;
pub mod executor;
pub mod queue;
pub mod sequence;
pub mod task;

pub use crate::channels::{Channel, ChannelCapacity};
pub use crate::error::{AggregateError, FervioError, Result};
pub use crate::executor::{Scheduler, SchedulerBuilder};
pub use crate::queue::{BoundedQueue, UnboundedQueue};
pub use crate::sequence::{ExecutionMode, Sequence};
pub use crate::task::Task;
