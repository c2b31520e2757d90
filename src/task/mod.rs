// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! Task abstraction for hot-started computations.
//!
//! # Spawning
//!
//! To run a future on the fervio scheduler we allocate it on the heap and
//! keep some state alongside it: whether the body has started, whether it
//! has completed, and where the outcome goes. Such a future is called a
//! *task*.
//!
//! Tasks here are *hot-started*: construction submits the body to the
//! scheduler immediately, and the [`Task`] handle returned to the caller is
//! only a claim on the eventual value. When a running task suspends, its
//! waker re-submits the resume handle to the scheduler; the scheduler itself
//! never tracks suspended tasks.
//!
//! # Completion
//!
//! Paired with every task is its promise: a single-shot result slot and a
//! completion signal. The slot is filled exactly once — with the body's
//! value, or with its captured panic — and the signal releases everyone
//! waiting in [`Task::result`], [`Task::wait_timeout`] or an `.await`.
//!
//! # Failure
//!
//! A panicking body never takes a worker thread down. The panic is captured
//! into the promise and re-raised at the consumer's next synchronization
//! point; [`Task::when_all`] instead collects every failure from its batch
//! and reports them together as an [`AggregateError`].
//!
//! [`AggregateError`]: crate::AggregateError

pub(crate) mod runnable;
pub(crate) mod state;
mod task_impl;

pub use task_impl::Task;
