// minimal safe API for the channel. the exposed API is a convenience wrapper around this.

use super::{
    error::{ClosedError, TryPutError, TryTakeError, WouldBlockError},
    waiter_queue::WaiterQueue,
};
use crate::source::{Claim, Probe};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    task::{Poll, Waker},
};


// handle to a channel.
pub(crate) struct Channel<T>(Arc<Shared<T>>);

// channel shared state.
struct Shared<T> {
    // fixed at creation. 0 means unbuffered/rendezvous.
    capacity: usize,
    // mutex around lockable state.
    lockable: Mutex<Lockable<T>>,
}

// channel lifecycle state.
//
// - Open: puts and takes proceed normally.
// - Draining: a graceful close was requested while values remained. no new puts are accepted;
//   takes continue until the queue drains, at which point the channel finalizes to Closed.
// - Closed: terminal. permanently inert except for reporting closed to every take.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Lifecycle {
    Open,
    Draining,
    Closed,
}

// channel lockable state.
//
// the waiting parties each get their own typed queue, selected by role, so an entry can never be
// shaped wrong for the queue it sits in:
//
// - entries: the values. an entry is either fulfilled (pure buffering, its put has already
//   resolved) or a pending send that still carries its blocked sender's resolution slot.
// - takers: waiting consumers, served strictly FIFO via front-gated claims.
// - senders: parties waiting for put eligibility (select send arms). values stay with the waiter
//   until claimed, so cancelling one of these never strands data.
// - observers: non-consuming wait() probes.
// - close_waiters: graceful-close completions, only non-empty while Draining.
struct Lockable<T> {
    state: Lifecycle,
    entries: VecDeque<Entry<T>>,
    takers: WaiterQueue,
    senders: WaiterQueue,
    observers: WaiterQueue,
    close_waiters: WaiterQueue,
}

struct Entry<T> {
    value: T,
    // present iff this entry's put has not yet resolved.
    pending: Option<Arc<PutSlot>>,
}

// resolution slot shared between a blocked put's entry and its future.
//
// lock ordering: the channel lock is always taken before a slot lock, never the reverse. the
// futures polling a slot take only the slot lock.
pub(crate) struct PutSlot(Mutex<PutSlotState>);

enum PutSlotState {
    Waiting(Option<Waker>),
    Delivered,
    Rejected,
}

impl PutSlot {
    fn new() -> Arc<Self> {
        Arc::new(PutSlot(Mutex::new(PutSlotState::Waiting(None))))
    }

    // poll for resolution, storing the waker while still waiting.
    pub(crate) fn poll(&self, waker: &Waker) -> Poll<Result<(), ClosedError>> {
        let mut lock = self.0.lock().unwrap();
        match &mut *lock {
            PutSlotState::Waiting(slot) => {
                if !slot.as_ref().map(|w| w.will_wake(waker)).unwrap_or(false) {
                    *slot = Some(waker.clone());
                }
                Poll::Pending
            }
            PutSlotState::Delivered => Poll::Ready(Ok(())),
            PutSlotState::Rejected => Poll::Ready(Err(ClosedError)),
        }
    }

    // resolve, waking the blocked put. called with the channel lock held.
    fn resolve(&self, delivered: bool) {
        let mut lock = self.0.lock().unwrap();
        let prev = std::mem::replace(
            &mut *lock,
            if delivered { PutSlotState::Delivered } else { PutSlotState::Rejected },
        );
        drop(lock);
        if let PutSlotState::Waiting(Some(waker)) = prev {
            waker.wake();
        }
    }
}

// outcome of starting a put.
pub(crate) enum PutStart<T> {
    // the value was accepted immediately.
    Done,
    // the value entered the queue as a pending send; resolution arrives through the slot.
    Blocked(Arc<PutSlot>),
    // the channel is draining or closed; the value never entered the queue.
    Rejected(T),
}

// outcome of claiming a send slot for a waiting sender.
pub(crate) enum SendClaim<T> {
    // the value was delivered into the queue.
    Sent,
    // the channel is draining or closed.
    Closed(T),
    // eligibility was lost to a concurrent claimant; probe again.
    Retry(T),
}

impl<T> Channel<T> {
    // construct empty open channel.
    pub(crate) fn new(capacity: usize) -> Self {
        Channel(Arc::new(Shared {
            capacity,
            lockable: Mutex::new(Lockable {
                state: Lifecycle::Open,
                entries: VecDeque::new(),
                takers: WaiterQueue::new(),
                senders: WaiterQueue::new(),
                observers: WaiterQueue::new(),
                close_waiters: WaiterQueue::new(),
            }),
        }))
    }

    // clone another handle to the channel.
    pub(crate) fn clone(&self) -> Self {
        Channel(Arc::clone(&self.0))
    }

    pub(crate) fn capacity(&self) -> usize {
        self.0.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Lockable<T>> {
        self.0.lockable.lock().unwrap()
    }


    // ==== inspection ====


    // whether a take could still ever yield a value.
    pub(crate) fn may_have_more(&self) -> bool {
        let lock = self.lock();
        lock.state == Lifecycle::Open || !lock.entries.is_empty()
    }

    // whether a value is takeable right now.
    pub(crate) fn has_more(&self) -> bool {
        !self.lock().entries.is_empty()
    }

    pub(crate) fn is_closing_or_closed(&self) -> bool {
        self.lock().state != Lifecycle::Open
    }


    // ==== put side ====


    // a put is eligible iff a live waiting consumer vouches for the value or buffer space
    // remains. each registered taker extends the window by one, which is what makes a rendezvous
    // (capacity 0) put succeed while a taker waits.
    fn put_eligible(&self, lock: &Lockable<T>) -> bool {
        lock.entries.len() < self.0.capacity + lock.takers.len()
    }

    // append a value and notify the parties a new value may unblock.
    fn push_value(&self, lock: &mut Lockable<T>, entry: Entry<T>) {
        lock.entries.push_back(entry);
        if lock.entries.len() == 1 {
            lock.observers.wake_all();
        }
        lock.takers.wake_front();
    }

    pub(crate) fn try_put(&self, value: T) -> Result<(), TryPutError<T>> {
        let mut lock = self.lock();
        if lock.state != Lifecycle::Open {
            return Err(TryPutError::Closed(value));
        }
        if !self.put_eligible(&lock) {
            return Err(TryPutError::WouldBlock(value));
        }
        self.push_value(&mut lock, Entry { value, pending: None });
        Ok(())
    }

    // start a put, entering the queue as a blocked sender if not immediately eligible.
    pub(crate) fn start_put(&self, value: T) -> PutStart<T> {
        let mut lock = self.lock();
        if lock.state != Lifecycle::Open {
            return PutStart::Rejected(value);
        }
        if self.put_eligible(&lock) {
            self.push_value(&mut lock, Entry { value, pending: None });
            return PutStart::Done;
        }
        let slot = PutSlot::new();
        self.push_value(&mut lock, Entry { value, pending: Some(Arc::clone(&slot)) });
        PutStart::Blocked(slot)
    }

    // remove a not-yet-delivered pending send from the queue, recovering its value.
    //
    // returns None if the entry was already delivered or rejected. removing the last drainable
    // value of a draining channel completes the close.
    pub(crate) fn rescind_put(&self, slot: &Arc<PutSlot>) -> Option<T> {
        let mut lock = self.lock();
        let pos = lock.entries.iter().position(|entry| {
            entry.pending.as_ref().map(|s| Arc::ptr_eq(s, slot)).unwrap_or(false)
        })?;
        let entry = lock.entries.remove(pos).unwrap();
        if lock.entries.is_empty() && lock.state == Lifecycle::Draining {
            // rescinding the last drainable value completes the close
            self.finalize_close(&mut lock);
        } else if lock.state == Lifecycle::Open {
            // the freed position may admit a waiting sender
            lock.senders.wake_front();
        }
        Some(entry.value)
    }


    // ==== waiting-to-send registrations (select send arms) ====


    pub(crate) fn probe_put(&self, token: Option<u64>) -> Probe {
        let lock = self.lock();
        if lock.state != Lifecycle::Open {
            return Probe::Closed;
        }
        let at_front = match token {
            Some(t) => lock.senders.is_front(t),
            None => lock.senders.is_empty(),
        };
        if at_front && self.put_eligible(&lock) {
            Probe::Ready
        } else {
            Probe::Alive
        }
    }

    pub(crate) fn claim_put(&self, token: Option<u64>, value: T) -> SendClaim<T> {
        let mut lock = self.lock();
        if lock.state != Lifecycle::Open {
            return SendClaim::Closed(value);
        }
        let at_front = match token {
            Some(t) => lock.senders.is_front(t),
            None => lock.senders.is_empty(),
        };
        if !at_front || !self.put_eligible(&lock) {
            return SendClaim::Retry(value);
        }
        if let Some(t) = token {
            lock.senders.remove(t);
        }
        self.push_value(&mut lock, Entry { value, pending: None });
        SendClaim::Sent
    }

    pub(crate) fn register_sender(&self, waker: &Waker) -> u64 {
        let mut lock = self.lock();
        let token = lock.senders.push(waker.clone());
        if lock.state != Lifecycle::Open {
            // already terminal; self-wake so the caller re-probes instead of waiting forever
            waker.wake_by_ref();
        }
        token
    }

    pub(crate) fn refresh_sender(&self, token: u64, waker: &Waker) {
        self.lock().senders.refresh(token, waker);
    }

    pub(crate) fn cancel_sender(&self, token: u64) {
        self.lock().senders.remove(token);
    }


    // ==== take side ====


    pub(crate) fn probe_take(&self, token: Option<u64>) -> Probe {
        let lock = self.lock();
        if lock.state == Lifecycle::Closed {
            return Probe::Closed;
        }
        let at_front = match token {
            Some(t) => lock.takers.is_front(t),
            None => lock.takers.is_empty(),
        };
        if at_front && !lock.entries.is_empty() {
            Probe::Ready
        } else {
            Probe::Alive
        }
    }

    pub(crate) fn claim_take(&self, token: Option<u64>) -> Claim<T> {
        let mut lock = self.lock();
        if lock.state == Lifecycle::Closed {
            return Claim::Closed;
        }
        let at_front = match token {
            Some(t) => lock.takers.is_front(t),
            None => lock.takers.is_empty(),
        };
        if !at_front || lock.entries.is_empty() {
            return Claim::Retry;
        }
        let entry = lock.entries.pop_front().unwrap();
        if let Some(t) = token {
            lock.takers.remove(t);
        }
        if let Some(slot) = &entry.pending {
            slot.resolve(true);
        }
        if lock.entries.is_empty() && lock.state == Lifecycle::Draining {
            self.finalize_close(&mut lock);
        } else {
            if !lock.entries.is_empty() {
                lock.takers.wake_front();
            }
            if lock.state == Lifecycle::Open {
                // a freed position may admit a waiting sender
                lock.senders.wake_front();
            }
        }
        Claim::Taken(entry.value)
    }

    pub(crate) fn try_take(&self) -> Result<Option<T>, TryTakeError> {
        match self.claim_take(None) {
            Claim::Taken(value) => Ok(Some(value)),
            Claim::Closed => Ok(None),
            Claim::Retry => Err(WouldBlockError.into()),
            Claim::Error(e) => Err(e.into()),
        }
    }

    pub(crate) fn register_taker(&self, waker: &Waker) -> u64 {
        let mut lock = self.lock();
        let token = lock.takers.push(waker.clone());
        if lock.state == Lifecycle::Closed {
            waker.wake_by_ref();
        } else {
            // a newly waiting consumer extends the put window; a waiting sender may now proceed
            lock.senders.wake_front();
        }
        token
    }

    pub(crate) fn refresh_taker(&self, token: u64, waker: &Waker) {
        self.lock().takers.refresh(token, waker);
    }

    pub(crate) fn cancel_taker(&self, token: u64) {
        self.lock().takers.remove(token);
    }


    // ==== wait probes ====


    // poll the non-consuming readiness probe: ready once at least one value is takeable or the
    // channel is closed.
    pub(crate) fn poll_wait(&self, token: &mut Option<u64>, waker: &Waker) -> Poll<()> {
        let mut lock = self.lock();
        if !lock.entries.is_empty() || lock.state == Lifecycle::Closed {
            if let Some(t) = token.take() {
                lock.observers.remove(t);
            }
            return Poll::Ready(());
        }
        match *token {
            Some(t) => lock.observers.refresh(t, waker),
            None => *token = Some(lock.observers.push(waker.clone())),
        }
        Poll::Pending
    }

    pub(crate) fn cancel_observer(&self, token: u64) {
        self.lock().observers.remove(token);
    }


    // ==== close ====


    // close synchronously if that would complete immediately, reporting whether it did. no state
    // changes on failure.
    pub(crate) fn try_close(&self) -> bool {
        let mut lock = self.lock();
        match lock.state {
            Lifecycle::Closed => true,
            _ if lock.entries.is_empty() => {
                self.finalize_close(&mut lock);
                true
            }
            _ => false,
        }
    }

    // poll a graceful close: close immediately if nothing needs draining, otherwise transition to
    // Draining and wait for the queue to empty. concurrent closes all resolve together.
    pub(crate) fn poll_close(&self, token: &mut Option<u64>, waker: &Waker) -> Poll<()> {
        let mut lock = self.lock();
        if lock.state == Lifecycle::Closed {
            if let Some(t) = token.take() {
                lock.close_waiters.remove(t);
            }
            return Poll::Ready(());
        }
        if lock.entries.is_empty() {
            // nothing to drain: waiting consumers are released with closed right away
            self.finalize_close(&mut lock);
            if let Some(t) = token.take() {
                lock.close_waiters.remove(t);
            }
            return Poll::Ready(());
        }
        lock.state = Lifecycle::Draining;
        match *token {
            Some(t) => lock.close_waiters.refresh(t, waker),
            None => *token = Some(lock.close_waiters.push(waker.clone())),
        }
        Poll::Pending
    }

    pub(crate) fn cancel_close_waiter(&self, token: u64) {
        self.lock().close_waiters.remove(token);
    }

    // force immediate closure regardless of buffered content. blocked puts are rejected with
    // ClosedError, buffered values are dropped (the forced variant's explicit data-loss
    // contract), and a pending graceful close resolves successfully.
    pub(crate) fn close_now(&self) {
        let mut lock = self.lock();
        if lock.state == Lifecycle::Closed {
            return;
        }
        let discarded = lock.entries.len();
        for entry in lock.entries.drain(..) {
            if let Some(slot) = entry.pending {
                slot.resolve(false);
            }
        }
        if discarded > 0 {
            trace!(discarded, "force-close discarded buffered values");
        }
        self.finalize_close(&mut lock);
    }

    // transition to Closed and release every waiting party. entries must already be empty.
    fn finalize_close(&self, lock: &mut Lockable<T>) {
        debug_assert!(lock.entries.is_empty());
        lock.state = Lifecycle::Closed;
        lock.takers.wake_all();
        lock.senders.wake_all();
        lock.observers.wake_all();
        lock.close_waiters.wake_all();
    }
}
