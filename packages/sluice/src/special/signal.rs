// broadcast-once signal channel.

use super::Consumers;
use crate::{
    channel::api::future::TakeFut,
    source::{Claim, Probe, RegBackend, Source, SourceReg},
};
use std::{
    sync::{Arc, Mutex},
    task::Waker,
};


/// A broadcast-once coordination channel
///
/// Before [`trigger`](Self::trigger) runs, takers block; the moment it runs they are all
/// multicast the value. After that, every take (sync or async) resolves immediately with a clone
/// of the same value, forever. Triggering is idempotent: only the first call has any effect.
///
/// A `SignalChan` never closes, which makes it suitable for things like shutdown flags raced in
/// a select.
pub struct SignalChan<T> {
    inner: Arc<Mutex<SignalInner<T>>>,
}

struct SignalInner<T> {
    // Some once triggered. never goes back.
    value: Option<T>,
    consumers: Consumers,
}

impl<T: Clone> SignalChan<T> {
    pub fn new() -> Self {
        SignalChan {
            inner: Arc::new(Mutex::new(SignalInner {
                value: None,
                consumers: Consumers::new(),
            })),
        }
    }

    /// Trigger the signal, waking every waiting taker with the value
    ///
    /// Idempotent: the second and later calls are no-ops.
    pub fn trigger(&self, value: T) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.value.is_none() {
            inner.value = Some(value);
            inner.consumers.wake_all();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.lock().unwrap().value.is_some()
    }

    /// The triggered value, if the signal has been triggered.
    pub fn value(&self) -> Option<T> {
        self.inner.lock().unwrap().value.clone()
    }

    /// Take the signal's value synchronously, if already triggered.
    pub fn try_take(&self) -> Option<T> {
        self.value()
    }

    /// Create a future resolving to the signal's value once triggered.
    pub fn take(&self) -> TakeFut<'_, T>
    where
        T: Send + 'static,
    {
        TakeFut::new(self)
    }
}

impl<T: Clone> Default for SignalChan<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SignalChan<T> {
    fn clone(&self) -> Self {
        SignalChan { inner: Arc::clone(&self.inner) }
    }
}

struct SignalReg<T> {
    inner: Arc<Mutex<SignalInner<T>>>,
    token: u64,
}

impl<T: Send> RegBackend for SignalReg<T> {
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

impl<T: Clone + Send + 'static> Source<T> for SignalChan<T> {
    fn probe(&self, _reg: Option<&SourceReg>) -> Probe {
        if self.inner.lock().unwrap().value.is_some() {
            Probe::Ready
        } else {
            Probe::Alive
        }
    }

    fn claim(&self, _reg: Option<&SourceReg>) -> Claim<T> {
        match &self.inner.lock().unwrap().value {
            Some(value) => Claim::Taken(value.clone()),
            None => Claim::Retry,
        }
    }

    fn register(&self, waker: &Waker) -> SourceReg {
        let mut inner = self.inner.lock().unwrap();
        let token = inner.consumers.push(waker);
        if inner.value.is_some() {
            // triggered in the window between probe and register; self-wake so the caller
            // re-probes
            waker.wake_by_ref();
        }
        SourceReg::new(Box::new(SignalReg { inner: Arc::clone(&self.inner), token }))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::poll_once;
    use std::task::Poll;

    #[test]
    fn blocks_until_triggered_then_multicasts() {
        let signal = SignalChan::new();
        let mut take_a = signal.take();
        let mut take_b = signal.take();
        assert!(poll_once(&mut take_a).is_pending());
        assert!(poll_once(&mut take_b).is_pending());

        signal.trigger(7);
        assert_eq!(poll_once(&mut take_a), Poll::Ready(Ok(Some(7))));
        assert_eq!(poll_once(&mut take_b), Poll::Ready(Ok(Some(7))));
    }

    #[test]
    fn trigger_is_idempotent() {
        let signal = SignalChan::new();
        signal.trigger("first");
        signal.trigger("second");
        assert_eq!(signal.value(), Some("first"));
        assert_eq!(poll_once(&mut signal.take()), Poll::Ready(Ok(Some("first"))));
    }

    #[test]
    fn post_trigger_takes_resolve_immediately_forever() {
        let signal = SignalChan::new();
        signal.trigger(1u8);
        for _ in 0..3 {
            assert_eq!(poll_once(&mut signal.take()), Poll::Ready(Ok(Some(1))));
        }
        assert_eq!(signal.try_take(), Some(1));
    }

    #[test]
    fn untriggered_try_take_fails() {
        let signal = SignalChan::<u8>::new();
        assert_eq!(signal.try_take(), None);
        assert!(!signal.is_triggered());
    }

    #[test]
    fn dropping_taker_deregisters() {
        let signal = SignalChan::new();
        let mut take = signal.take();
        assert!(poll_once(&mut take).is_pending());
        assert_eq!(signal.inner.lock().unwrap().consumers.len(), 1);
        drop(take);
        assert!(signal.inner.lock().unwrap().consumers.is_empty());
        signal.trigger(3);
    }
}
