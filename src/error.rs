// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use std::any::Any;
use std::fmt::{self, Debug};
use std::io;
use thiserror::Error;

/// Result type alias that all fervio public API functions can use.
pub type Result<T, V = ()> = std::result::Result<T, FervioError<V>>;

#[derive(Error)]
/// Composite error type encompassing all error conditions fervio produces.
///
/// The type is generic over `T` so that channel errors can hand the rejected
/// item back to the caller: a failed [`try_send`] does not lose the value it
/// was asked to transmit.
///
/// [`try_send`]: crate::Channel::try_send
pub enum FervioError<T> {
    /// The channel was closed before the write was attempted. The rejected
    /// item travels back inside the variant.
    #[error("channel is closed")]
    Closed(T),

    /// A bounded channel is at capacity. Nonblocking writes signal this
    /// instead of waiting; the rejected item travels back inside the
    /// variant.
    #[error("channel would block")]
    WouldBlock(T),

    /// A sequence terminal ran past the end of its producer.
    #[error("sequence ended before the requested element")]
    OutOfRange,

    /// IO error from standard library functions, e.g. a worker thread that
    /// could not be spawned.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl<T> FervioError<T> {
    /// Recovers the item a failed channel write carried, if any.
    pub fn into_inner(self) -> Option<T> {
        match self {
            FervioError::Closed(item) | FervioError::WouldBlock(item) => Some(item),
            FervioError::OutOfRange | FervioError::Io(_) => None,
        }
    }
}

#[doc(hidden)]
/// This `Debug` implementation is required, otherwise we'd be required to
/// place a bound on the generic `T` in FervioError. This causes the `Debug`
/// constraint to be forced onto users of the type, and it's an annoying
/// burden on the type. This gets around that.
impl<T> Debug for FervioError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FervioError::Closed(_) => f.write_str("Closed { .. }"),
            FervioError::WouldBlock(_) => f.write_str("WouldBlock { .. }"),
            FervioError::OutOfRange => f.write_str("OutOfRange"),
            FervioError::Io(err) => f.write_fmt(format_args!("{:?}", err)),
        }
    }
}

impl<T> From<FervioError<T>> for io::Error {
    fn from(err: FervioError<T>) -> Self {
        match err {
            FervioError::Io(io_err) => io_err,
            FervioError::Closed(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "channel is closed")
            }
            FervioError::WouldBlock(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "channel would block")
            }
            FervioError::OutOfRange => io::Error::new(
                io::ErrorKind::InvalidInput,
                "sequence ended before the requested element",
            ),
        }
    }
}

/// The composite failure [`when_all`] raises when one or more of its input
/// tasks failed.
///
/// Every captured failure is carried; `when_all` never short-circuits, so a
/// batch where k tasks failed produces an `AggregateError` holding exactly k
/// payloads. The error is delivered as a panic payload, which consumers can
/// recover with [`std::panic::catch_unwind`] and downcast.
///
/// [`when_all`]: crate::Task::when_all
pub struct AggregateError {
    failures: Vec<Box<dyn Any + Send + 'static>>,
}

impl AggregateError {
    pub(crate) fn new(failures: Vec<Box<dyn Any + Send + 'static>>) -> Self {
        AggregateError { failures }
    }

    /// The number of tasks that failed.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether the aggregate carries no failures. `when_all` never raises an
    /// empty aggregate, so this is only `true` for a manually drained value.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// The captured panic payloads, in task order.
    pub fn failures(&self) -> &[Box<dyn Any + Send + 'static>] {
        &self.failures
    }

    /// Consumes the aggregate, yielding the captured payloads.
    pub fn into_failures(self) -> Vec<Box<dyn Any + Send + 'static>> {
        self.failures
    }
}

impl Debug for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateError")
            .field("failures", &self.failures.len())
            .finish()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} task(s) failed", self.failures.len())
    }
}

impl std::error::Error for AggregateError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn channel_closed_err_msg() {
        let err: Result<(), ()> = Err(FervioError::Closed(()));
        assert_eq!(err.unwrap_err().to_string(), "channel is closed");
    }

    #[test]
    fn channel_wouldblock_err_msg() {
        let err: Result<(), ()> = Err(FervioError::WouldBlock(()));
        assert_eq!(err.unwrap_err().to_string(), "channel would block");
    }

    #[test]
    fn out_of_range_err_msg() {
        let err: Result<(), ()> = Err(FervioError::OutOfRange);
        assert_eq!(
            err.unwrap_err().to_string(),
            "sequence ended before the requested element"
        );
    }

    #[test]
    fn rejected_item_travels_back() {
        let err: FervioError<String> = FervioError::Closed("hello".to_string());
        assert_eq!(err.into_inner().unwrap(), "hello");

        let err: FervioError<String> = FervioError::WouldBlock("world".to_string());
        assert_eq!(err.into_inner().unwrap(), "world");

        let err: FervioError<String> = FervioError::OutOfRange;
        assert!(err.into_inner().is_none());
    }

    #[test]
    fn composite_error_from_into() {
        let err: FervioError<()> =
            io::Error::new(io::ErrorKind::Other, "test other io-error").into();
        let _: io::Error = err.into();

        let channel_closed: FervioError<()> = FervioError::Closed(());
        let io_err: io::Error = channel_closed.into();
        assert_eq!(io_err.kind(), io::ErrorKind::BrokenPipe);

        let full: FervioError<()> = FervioError::WouldBlock(());
        let io_err: io::Error = full.into();
        assert_eq!(io_err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn aggregate_reports_count() {
        let failures: Vec<Box<dyn Any + Send>> = vec![Box::new("a"), Box::new("b")];
        let agg = AggregateError::new(failures);
        assert_eq!(agg.len(), 2);
        assert!(!agg.is_empty());
        assert_eq!(agg.to_string(), "2 task(s) failed");

        let payloads = agg.into_failures();
        assert_eq!(payloads.len(), 2);
    }
}
