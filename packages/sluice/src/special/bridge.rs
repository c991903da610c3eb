// foreign-future bridge channel.

use super::{Consumers, OneShot};
use crate::{
    channel::api::future::TakeFut,
    channel::error::TimeoutError,
    source::{Claim, Probe, RegBackend, Source, SourceReg},
};
use std::{
    future::Future,
    sync::{Arc, Mutex},
    task::Waker,
};


/// A one-shot channel driven by the settlement of an external asynchronous value
///
/// Semantically identical to [`DelayChan`](crate::DelayChan) except that the trigger is a
/// [`Settler`] rather than a timer: exactly one consumer receives the settled outcome, later
/// consumers observe closed, and closing manually before settlement makes the eventual
/// settlement a no-op.
pub struct FutureChan<T> {
    inner: Arc<Mutex<BridgeInner<T>>>,
}

struct BridgeInner<T> {
    state: OneShot,
    // Some once settled, until claimed.
    outcome: Option<Result<T, TimeoutError>>,
    consumers: Consumers,
}

/// The settling half of a [`FutureChan`]
///
/// Consumed by value on settlement — the foreign source notifies exactly once per instance.
pub struct Settler<T> {
    inner: Arc<Mutex<BridgeInner<T>>>,
}

impl<T> FutureChan<T> {
    /// Create an unsettled bridge and its settler.
    pub fn pair() -> (Self, Settler<T>) {
        let inner = Arc::new(Mutex::new(BridgeInner {
            state: OneShot::Pending,
            outcome: None,
            consumers: Consumers::new(),
        }));
        (FutureChan { inner: Arc::clone(&inner) }, Settler { inner })
    }

    /// Bridge a real future by spawning it on the ambient tokio runtime.
    pub fn spawn<F>(future: F) -> Self
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TimeoutError>> + Send + 'static,
    {
        let (chan, settler) = Self::pair();
        tokio::spawn(async move {
            settler.settle(future.await);
        });
        chan
    }

    /// Whether the foreign value has settled (regardless of whether it was claimed yet).
    pub fn is_settled(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.outcome.is_some() || inner.state == OneShot::Finished
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().state == OneShot::Pending
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().state != OneShot::Pending
    }

    pub fn is_manually_closed(&self) -> bool {
        self.inner.lock().unwrap().state == OneShot::ManuallyClosed
    }

    /// Close manually; a later settlement becomes a no-op.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.state != OneShot::Pending {
            return;
        }
        inner.state = OneShot::ManuallyClosed;
        inner.outcome = None;
        inner.consumers.wake_all();
    }

    /// Create a future resolving to the settled outcome (or closed).
    pub fn take(&self) -> TakeFut<'_, T>
    where
        T: Send + 'static,
    {
        TakeFut::new(self)
    }
}

impl<T> Clone for FutureChan<T> {
    fn clone(&self) -> Self {
        FutureChan { inner: Arc::clone(&self.inner) }
    }
}

impl<T> Settler<T> {
    /// Settle the bridge with the foreign outcome, waking waiting takers
    ///
    /// A no-op if the bridge was manually closed first.
    pub fn settle(self, outcome: Result<T, TimeoutError>) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.state != OneShot::Pending {
            // the bridge is already closed; a late settlement has no effect
            return;
        }
        trace!("foreign value settled");
        inner.outcome = Some(outcome);
        inner.consumers.wake_all();
    }

    /// Shorthand for settling with a success value.
    pub fn settle_value(self, value: T) {
        self.settle(Ok(value));
    }

    /// Shorthand for settling with an error.
    pub fn settle_error(self, error: TimeoutError) {
        self.settle(Err(error));
    }
}

struct BridgeReg<T> {
    inner: Arc<Mutex<BridgeInner<T>>>,
    token: u64,
}

impl<T: Send> RegBackend for BridgeReg<T> {
    fn token(&self) -> u64 {
        self.token
    }

    fn refresh(&mut self, waker: &Waker) {
        self.inner.lock().unwrap().consumers.refresh(self.token, waker);
    }

    fn cancel(&mut self) {
        self.inner.lock().unwrap().consumers.remove(self.token);
    }
}

impl<T: Send + 'static> Source<T> for FutureChan<T> {
    fn probe(&self, _reg: Option<&SourceReg>) -> Probe {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            OneShot::Pending if inner.outcome.is_some() => Probe::Ready,
            OneShot::Pending => Probe::Alive,
            _ => Probe::Closed,
        }
    }

    fn claim(&self, _reg: Option<&SourceReg>) -> Claim<T> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        match inner.state {
            OneShot::Pending if inner.outcome.is_some() => {
                inner.state = OneShot::Finished;
                inner.consumers.wake_all();
                match inner.outcome.take().unwrap() {
                    Ok(value) => Claim::Taken(value),
                    Err(e) => Claim::Error(e),
                }
            }
            OneShot::Pending => Claim::Retry,
            _ => Claim::Closed,
        }
    }

    fn register(&self, waker: &Waker) -> SourceReg {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let token = inner.consumers.push(waker);
        if inner.state != OneShot::Pending || inner.outcome.is_some() {
            waker.wake_by_ref();
        }
        SourceReg::new(Box::new(BridgeReg { inner: Arc::clone(&self.inner), token }))
    }
}
