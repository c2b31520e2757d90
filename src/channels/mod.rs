// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! fervio::channels is a module that provides fervio channel-like
//! abstractions.
//!
//! A [`Channel`] is a multi-producer / multi-consumer pipe shared between
//! threads by cloning the handle. Values written by any one producer are
//! observed in write order by the readers collectively; interleaving between
//! concurrent producers is unspecified.
//!
//! The channel is the only cross-thread interruption mechanism in this
//! crate: [`close`] wakes every blocked and suspended reader, after which
//! reads drain the residual values and then report the empty sentinel.
//!
//! [`Channel`]: mpmc::Channel
//! [`close`]: mpmc::Channel::close

/// The multi-producer / multi-consumer channel and its adapters.
pub mod mpmc;

pub use mpmc::Channel;

#[derive(Clone, Copy, Debug)]
/// What kind of backing storage a channel was created with.
pub enum ChannelCapacity {
    /// Grows without bound; writes always find room.
    Unbounded,
    /// Holds at most the given number of in-flight values.
    Bounded(usize),
}
