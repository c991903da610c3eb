// deadline-driven special channels: timeout and delay.

use super::{Consumers, OneShot};
use crate::{
    channel::api::future::TakeFut,
    channel::error::TimeoutError,
    scheduler::{default_scheduler, Scheduler, TimerId},
    source::{Claim, Probe, RegBackend, Source, SourceReg},
};
use std::{
    sync::{Arc, Mutex, Weak},
    task::Waker,
    time::{Duration, Instant},
};


/// A channel that becomes permanently ready-as-error once its deadline elapses
///
/// Firing consumes nothing and closes nothing: an expired timeout can be observed repeatedly and
/// always yields an equal [`TimeoutError`]. Its sole purpose is to bound how long a select may
/// wait, and select's timer rule makes it win only while some other operand is still open.
///
/// The timer subscription is lazy: nothing is armed with the scheduler until a consumer is
/// actually waiting, and the subscription is dropped when the last consumer leaves.
pub struct TimeoutChan {
    inner: Arc<Mutex<TimeoutInner>>,
}

struct TimeoutInner {
    scheduler: Arc<dyn Scheduler>,
    after: Duration,
    deadline: Instant,
    message: Option<String>,
    consumers: Consumers,
    timer: Option<TimerId>,
}

impl TimeoutChan {
    /// Create a timeout elapsing `after` from now, using the default scheduler.
    pub fn new(after: Duration) -> Self {
        Self::with_scheduler(after, default_scheduler())
    }

    /// Create a timeout elapsing `after` from now on the given scheduler.
    pub fn with_scheduler(after: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        let deadline = scheduler.now() + after;
        TimeoutChan {
            inner: Arc::new(Mutex::new(TimeoutInner {
                scheduler,
                after,
                deadline,
                message: None,
                consumers: Consumers::new(),
                timer: None,
            })),
        }
    }

    /// Replace the default "timeout of N ms exceeded" error message.
    pub fn message(self, message: impl Into<String>) -> Self {
        self.inner.lock().unwrap().message = Some(message.into());
        self
    }

    /// Whether the deadline has already elapsed.
    pub fn is_expired(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.scheduler.now() >= inner.deadline
    }

    /// The error an expired take of this timeout yields.
    pub fn error(&self) -> TimeoutError {
        let inner = self.inner.lock().unwrap();
        match &inner.message {
            Some(message) => TimeoutError::new(message.clone()),
            None => TimeoutError::expired(inner.after),
        }
    }

    /// Create a future resolving to the timeout's error once the deadline elapses
    ///
    /// `T` is free because a timeout never yields a value; it exists purely to satisfy the
    /// shared source contract.
    pub fn take<T: Send + 'static>(&self) -> TakeFut<'_, T> {
        TakeFut::new(self)
    }
}

impl Clone for TimeoutChan {
    fn clone(&self) -> Self {
        TimeoutChan { inner: Arc::clone(&self.inner) }
    }
}

// arm the scheduler timer. caller holds the inner lock and has checked nothing is armed.
fn arm_timeout(inner: &mut TimeoutInner, weak: Weak<Mutex<TimeoutInner>>) {
    debug_assert!(inner.timer.is_none());
    inner.timer = Some(inner.scheduler.set_timer(inner.deadline, Box::new(move || {
        if let Some(strong) = weak.upgrade() {
            let mut guard = strong.lock().unwrap();
            let inner = &mut *guard;
            inner.timer = None;
            trace!("timeout elapsed");
            inner.consumers.wake_all();
        }
    })));
}

struct TimeoutReg {
    inner: Arc<Mutex<TimeoutInner>>,
    token: u64,
}

impl RegBackend for TimeoutReg {
    fn token(&self) -> u64 {
        self.token
    }

    fn refresh(&mut self, waker: &Waker) {
        self.inner.lock().unwrap().consumers.refresh(self.token, waker);
    }

    fn cancel(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.consumers.remove(self.token) {
            // last consumer left; drop the scheduler subscription
            if let Some(timer) = inner.timer.take() {
                inner.scheduler.cancel_timer(timer);
            }
        }
    }
}

impl<T: Send> Source<T> for TimeoutChan {
    fn probe(&self, _reg: Option<&SourceReg>) -> Probe {
        let inner = self.inner.lock().unwrap();
        if inner.scheduler.now() >= inner.deadline {
            Probe::Deadline
        } else {
            Probe::DeadlinePending
        }
    }

    fn claim(&self, _reg: Option<&SourceReg>) -> Claim<T> {
        let inner = self.inner.lock().unwrap();
        if inner.scheduler.now() >= inner.deadline {
            drop(inner);
            Claim::Error(self.error())
        } else {
            Claim::Retry
        }
    }

    fn register(&self, waker: &Waker) -> SourceReg {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let token = inner.consumers.push(waker);
        if inner.scheduler.now() >= inner.deadline {
            waker.wake_by_ref();
        } else if inner.consumers.len() == 1 && inner.timer.is_none() {
            arm_timeout(inner, Arc::downgrade(&self.inner));
        }
        SourceReg::new(Box::new(TimeoutReg { inner: Arc::clone(&self.inner), token }))
    }
}


/// A one-shot channel resolving to a fixed outcome once its deadline elapses
///
/// Exactly one consumer receives the outcome (a value, or an error for
/// [`DelayChan::error`]); consumers arriving after that observe the channel as closed. Unlike
/// [`TimeoutChan`] a delay can also be closed manually before firing, in which case waiting
/// takers observe closed and the timer subscription is cancelled.
pub struct DelayChan<T> {
    inner: Arc<Mutex<DelayInner<T>>>,
}

struct DelayInner<T> {
    scheduler: Arc<dyn Scheduler>,
    deadline: Instant,
    // Some until claimed. fixed at construction.
    outcome: Option<Result<T, TimeoutError>>,
    state: OneShot,
    consumers: Consumers,
    timer: Option<TimerId>,
}

impl<T> DelayChan<T> {
    /// Create a delay resolving to `value` once `after` elapses.
    pub fn value(after: Duration, value: T) -> Self {
        Self::with_scheduler(after, Ok(value), default_scheduler())
    }

    /// Create a delay firing as `error` once `after` elapses.
    pub fn error(after: Duration, error: TimeoutError) -> Self {
        Self::with_scheduler(after, Err(error), default_scheduler())
    }

    /// Create a delay with an explicit outcome and scheduler.
    pub fn with_scheduler(
        after: Duration,
        outcome: Result<T, TimeoutError>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let deadline = scheduler.now() + after;
        DelayChan {
            inner: Arc::new(Mutex::new(DelayInner {
                scheduler,
                deadline,
                outcome: Some(outcome),
                state: OneShot::Pending,
                consumers: Consumers::new(),
                timer: None,
            })),
        }
    }

    /// Whether the delay is still pending (not fired-and-claimed, not manually closed).
    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().state == OneShot::Pending
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().state != OneShot::Pending
    }

    pub fn is_manually_closed(&self) -> bool {
        self.inner.lock().unwrap().state == OneShot::ManuallyClosed
    }

    /// Close manually before firing
    ///
    /// Waiting takers observe closed instead of the delayed outcome, and the timer subscription
    /// is cancelled. A no-op once the delay has fired or was already closed.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.state != OneShot::Pending {
            return;
        }
        inner.state = OneShot::ManuallyClosed;
        if let Some(timer) = inner.timer.take() {
            inner.scheduler.cancel_timer(timer);
        }
        inner.consumers.wake_all();
    }

    /// Create a future resolving to the delayed outcome (or closed).
    pub fn take(&self) -> TakeFut<'_, T>
    where
        T: Send + 'static,
    {
        TakeFut::new(self)
    }
}

impl<T> Clone for DelayChan<T> {
    fn clone(&self) -> Self {
        DelayChan { inner: Arc::clone(&self.inner) }
    }
}

struct DelayReg<T> {
    inner: Arc<Mutex<DelayInner<T>>>,
    token: u64,
}

impl<T: Send> RegBackend for DelayReg<T> {
    fn token(&self) -> u64 {
        self.token
    }

    fn refresh(&mut self, waker: &Waker) {
        self.inner.lock().unwrap().consumers.refresh(self.token, waker);
    }

    fn cancel(&mut self) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        if inner.consumers.remove(self.token) {
            if let Some(timer) = inner.timer.take() {
                inner.scheduler.cancel_timer(timer);
            }
        }
    }
}

impl<T: Send + 'static> Source<T> for DelayChan<T> {
    fn probe(&self, _reg: Option<&SourceReg>) -> Probe {
        let inner = self.inner.lock().unwrap();
        match inner.state {
            OneShot::Pending if inner.scheduler.now() >= inner.deadline => Probe::Ready,
            OneShot::Pending => Probe::Alive,
            _ => Probe::Closed,
        }
    }

    fn claim(&self, _reg: Option<&SourceReg>) -> Claim<T> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        match inner.state {
            OneShot::Pending if inner.scheduler.now() >= inner.deadline => {
                inner.state = OneShot::Finished;
                if let Some(timer) = inner.timer.take() {
                    inner.scheduler.cancel_timer(timer);
                }
                // remaining consumers observe the closed one-shot
                inner.consumers.wake_all();
                match inner.outcome.take().expect("delay outcome already claimed") {
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
        let fired = inner.scheduler.now() >= inner.deadline;
        if inner.state != OneShot::Pending || fired {
            waker.wake_by_ref();
        } else if inner.consumers.len() == 1 && inner.timer.is_none() {
            let weak = Arc::downgrade(&self.inner);
            inner.timer = Some(inner.scheduler.set_timer(inner.deadline, Box::new(move || {
                if let Some(strong) = weak.upgrade() {
                    let mut guard = strong.lock().unwrap();
                    let inner = &mut *guard;
                    inner.timer = None;
                    if inner.state == OneShot::Pending {
                        trace!("delay elapsed");
                        inner.consumers.wake_all();
                    }
                }
            })));
        }
        SourceReg::new(Box::new(DelayReg { inner: Arc::clone(&self.inner), token }))
    }
}
