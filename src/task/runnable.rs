// Unless explicitly stated otherwise all files in this repository are licensed
// under the MIT/Apache-2.0 License, at your convenience
//
use crate::channels::Channel;
use log::trace;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};

type BoxedFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A resume handle: one schedulable unit holding a task's future.
///
/// Once a `Runnable` is run it vanishes from the scheduler's point of view
/// and only reappears when the future is woken: the waker carries a clone of
/// this cell and re-submits it to the intake channel it was spawned on. Each
/// wake therefore schedules the handle at most once, and after the scheduler
/// shuts down (intake closed) wakes are dropped on the floor.
pub(crate) struct Runnable {
    future: Mutex<Option<BoxedFuture>>,
    intake: Channel<Arc<Runnable>>,
}

impl Runnable {
    pub(crate) fn new(future: BoxedFuture, intake: Channel<Arc<Runnable>>) -> Arc<Runnable> {
        Arc::new(Runnable {
            future: Mutex::new(Some(future)),
            intake,
        })
    }

    /// Polls the wrapped future once on the calling worker thread.
    ///
    /// A completed future is dropped here; a pending one stays in the cell
    /// and is revived by its waker. The lock is held across the poll so a
    /// wake arriving mid-poll serializes behind it instead of racing on the
    /// frame.
    pub(crate) fn run(self: &Arc<Runnable>) {
        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);

        let mut cell = self.future.lock().unwrap();
        if let Some(future) = cell.as_mut() {
            if let Poll::Ready(()) = future.as_mut().poll(&mut cx) {
                *cell = None;
            }
        }
    }
}

impl Wake for Runnable {
    fn wake(self: Arc<Runnable>) {
        let intake = self.intake.clone();
        if intake.try_send(self).is_err() {
            trace!("wake dropped after scheduler shutdown");
        }
    }

    fn wake_by_ref(self: &Arc<Runnable>) {
        if self.intake.try_send(self.clone()).is_err() {
            trace!("wake dropped after scheduler shutdown");
        }
    }
}
