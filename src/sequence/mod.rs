// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
//! fervio::sequence provides cold, single-consumer lazy sequences.
//!
//! A [`Sequence`] owns its producer exclusively: moving the sequence
//! transfers the producer, dropping it destroys it, and there is no `Clone`.
//! Nothing runs until the consumer advances — combinators only wrap the
//! producer in another lazy layer, and the whole pipeline executes one
//! element at a time, driven from the terminal operation:
//!
//! ```
//! use fervio::Sequence;
//!
//! let values = Sequence::range(1, 10)
//!     .filter(|i| i % 2 == 0)
//!     .map(|i| i * 10)
//!     .to_vec();
//! assert_eq!(values, vec![20, 40, 60, 80, 100]);
//! ```
//!
//! Sequences never touch the scheduler, with one exception:
//! [`Sequence::for_each`] in [`ExecutionMode::Parallel`] submits one task
//! per element and joins them through [`when_all`].
//!
//! A closure that panics inside the pipeline unwinds at the consumer's next
//! advance, which is where the element that triggered it was being pulled.
//!
//! [`when_all`]: crate::Task::when_all

use crate::error::FervioError;
use crate::task::Task;
use ahash::AHashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

type Result<T> = crate::Result<T>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// How [`Sequence::for_each`] drives its action.
pub enum ExecutionMode {
    /// Run the action on the calling thread, one element after another.
    Sequenced,
    /// Submit one task per element and wait for the whole batch.
    Parallel,
}

/// A cold, single-consumer sequence with a lazy combinator pipeline.
///
/// See the [module documentation](self) for an overview.
pub struct Sequence<T> {
    iter: Box<dyn Iterator<Item = T>>,
}

impl<T: 'static> Sequence<T> {
    /// Wraps an iterator as a sequence.
    pub fn new<I>(iter: I) -> Sequence<T>
    where
        I: Iterator<Item = T> + 'static,
    {
        Sequence {
            iter: Box::new(iter),
        }
    }

    /// Builds a sequence over anything iterable.
    ///
    /// ```
    /// use fervio::Sequence;
    ///
    /// let seq = Sequence::from(vec![3, 1, 2, 3, 2]);
    /// assert_eq!(seq.distinct().reverse().to_vec(), vec![2, 1, 3]);
    /// ```
    pub fn from<I>(source: I) -> Sequence<T>
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Sequence::new(source.into_iter())
    }

    /// Keeps only the elements matching `predicate`.
    pub fn filter<P>(self, predicate: P) -> Sequence<T>
    where
        P: FnMut(&T) -> bool + 'static,
    {
        Sequence::new(self.iter.filter(predicate))
    }

    /// Projects every element through `selector`.
    pub fn map<U, F>(self, selector: F) -> Sequence<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        Sequence::new(self.iter.map(selector))
    }

    /// Skips the first `count` elements.
    pub fn skip(self, count: usize) -> Sequence<T> {
        Sequence::new(self.iter.skip(count))
    }

    /// Skips the leading run of elements matching `predicate`.
    pub fn skip_while<P>(self, predicate: P) -> Sequence<T>
    where
        P: FnMut(&T) -> bool + 'static,
    {
        Sequence::new(self.iter.skip_while(predicate))
    }

    /// Keeps the first occurrence of every distinct element, preserving
    /// encounter order.
    pub fn distinct(self) -> Sequence<T>
    where
        T: Eq + Hash + Clone,
    {
        let mut seen = AHashSet::new();
        Sequence::new(self.iter.filter(move |item| seen.insert(item.clone())))
    }

    /// Yields the elements in reverse order.
    ///
    /// The producer is materialized in full at the consumer's first advance;
    /// an infinite sequence cannot be reversed.
    pub fn reverse(self) -> Sequence<T> {
        let mut source = Some(self.iter);
        let mut buffered = Vec::new();
        Sequence::new(std::iter::from_fn(move || {
            if let Some(iter) = source.take() {
                buffered = iter.collect();
            }
            // Popping from the back walks the buffer in reverse.
            buffered.pop()
        }))
    }

    /// Groups elements into vectors of `size` elements. Only full chunks are
    /// yielded: a trailing remainder shorter than `size` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn chunk(self, size: usize) -> Sequence<Vec<T>> {
        assert!(size > 0, "chunk size must be non-zero");
        let mut iter = self.iter;
        Sequence::new(std::iter::from_fn(move || {
            let mut chunk = Vec::with_capacity(size);
            while chunk.len() < size {
                chunk.push(iter.next()?);
            }
            Some(chunk)
        }))
    }

    /// Yields this sequence, then `value`.
    pub fn append(self, value: T) -> Sequence<T> {
        Sequence::new(self.iter.chain(std::iter::once(value)))
    }

    /// Yields this sequence, then every element of `other`.
    pub fn append_all(self, other: Sequence<T>) -> Sequence<T> {
        Sequence::new(self.iter.chain(other.iter))
    }

    /// Yields `value`, then this sequence.
    pub fn prepend(self, value: T) -> Sequence<T> {
        Sequence::new(std::iter::once(value).chain(self.iter))
    }

    /// Yields every element of `other`, then this sequence.
    pub fn prepend_all(self, other: Sequence<T>) -> Sequence<T> {
        Sequence::new(other.iter.chain(self.iter))
    }

    /// Returns the first element, if any.
    pub fn first(mut self) -> Option<T> {
        self.iter.next()
    }

    /// Returns the final element, or [`OutOfRange`] on an empty sequence.
    ///
    /// [`OutOfRange`]: crate::FervioError::OutOfRange
    pub fn last(self) -> Result<T> {
        self.iter.last().ok_or(FervioError::OutOfRange)
    }

    /// Returns the element at `index`, or [`OutOfRange`] when the sequence
    /// ends first.
    ///
    /// [`OutOfRange`]: crate::FervioError::OutOfRange
    pub fn element_at(mut self, index: usize) -> Result<T> {
        self.iter.nth(index).ok_or(FervioError::OutOfRange)
    }

    /// Counts the elements, consuming the sequence.
    pub fn count(self) -> usize {
        self.iter.count()
    }

    /// Whether any element equals `value`.
    pub fn contains(mut self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.iter.any(|item| item == *value)
    }

    /// Whether any element matches `predicate`. Short-circuits.
    pub fn any<P>(mut self, predicate: P) -> bool
    where
        P: FnMut(T) -> bool,
    {
        self.iter.any(predicate)
    }

    /// Whether every element matches `predicate`. Short-circuits.
    pub fn all<P>(mut self, predicate: P) -> bool
    where
        P: FnMut(T) -> bool,
    {
        self.iter.all(predicate)
    }

    /// Collects the remaining elements into a vector.
    pub fn to_vec(self) -> Vec<T> {
        self.iter.collect()
    }

    /// Applies `action` to every element.
    ///
    /// In [`ExecutionMode::Sequenced`] the action runs inline, one element
    /// at a time. In [`ExecutionMode::Parallel`] one task is submitted per
    /// element and the call blocks until the whole batch has completed; a
    /// failing action surfaces through the batch's aggregate failure.
    pub fn for_each<F>(self, mode: ExecutionMode, action: F)
    where
        T: Send,
        F: Fn(T) + Send + Sync + 'static,
    {
        match mode {
            ExecutionMode::Sequenced => {
                for item in self.iter {
                    action(item);
                }
            }
            ExecutionMode::Parallel => {
                let action = Arc::new(action);
                let tasks: Vec<Task<()>> = self
                    .iter
                    .map(|item| {
                        let action = action.clone();
                        Task::run(move || action(item))
                    })
                    .collect();
                Task::when_all(tasks).result();
            }
        }
    }
}

impl Sequence<i32> {
    /// The integers from `from` through `to`, both ends included; empty when
    /// `to < from`.
    ///
    /// ```
    /// use fervio::Sequence;
    ///
    /// assert_eq!(Sequence::range(1, 4).to_vec(), vec![1, 2, 3, 4]);
    /// assert_eq!(Sequence::range(4, 1).count(), 0);
    /// ```
    pub fn range(from: i32, to: i32) -> Sequence<i32> {
        Sequence::new(from..=to)
    }
}

impl<T: Clone + 'static> Sequence<T> {
    /// Exactly `count` copies of `value`.
    pub fn repeat(value: T, count: usize) -> Sequence<T> {
        Sequence::new(std::iter::repeat(value).take(count))
    }
}

impl<T> Sequence<T>
where
    T: 'static,
    f64: From<T>,
{
    /// The arithmetic mean of the elements as a float; NaN for an empty
    /// sequence.
    pub fn average(self) -> f64 {
        let mut count = 0usize;
        let mut sum = 0.0;
        for value in self.iter {
            sum += f64::from(value);
            count += 1;
        }
        sum / count as f64
    }
}

impl<T: 'static> FromIterator<T> for Sequence<T> {
    fn from_iter<I: IntoIterator<Item = T>>(source: I) -> Sequence<T> {
        Sequence::new(source.into_iter().collect::<Vec<_>>().into_iter())
    }
}

impl<T> Iterator for Sequence<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.iter.next()
    }
}

impl<T> fmt::Debug for Sequence<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence").finish_non_exhaustive()
    }
}
