// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! fervio::queue provides the lock-free queues backing the channel layer.
//!
//! Both queues are multi-producer / multi-consumer and usable on their own:
//!
//! * [`BoundedQueue`] is a fixed-capacity ring over preallocated storage.
//!   Writes fail (handing the value back) when the ring is full.
//! * [`UnboundedQueue`] chains fixed-capacity segments into a linked list
//!   and grows on demand, so writes always succeed.
//!
//! Fullness and emptiness are reported through the return value rather than
//! an error type: the outer layers (the unbounded queue growing a segment,
//! the channel deciding to park a reader) recover from both conditions
//! locally, so there is nothing for an error to carry that the value slot
//! doesn't already.

/// The fixed-capacity ring.
pub mod bounded;
/// The growing segment list.
pub mod unbounded;

pub use bounded::BoundedQueue;
pub use unbounded::UnboundedQueue;
