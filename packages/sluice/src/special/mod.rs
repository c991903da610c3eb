// special channels: take/subscribe-compatible sources whose readiness is driven by a timer, a
// manual trigger, or a foreign settlement rather than a value queue.
//
// all variants satisfy the same Source contract as regular channels, so they are
// interchangeable select operands. each keeps a consumer list of registered waiters; variants
// that ride on a timer hold the scheduler subscription lazily, exactly while that list is
// non-empty, so no timer is armed while nobody is waiting.

mod signal;
mod timer;
mod bridge;

pub use self::{
    signal::SignalChan,
    timer::{DelayChan, TimeoutChan},
    bridge::{FutureChan, Settler},
};

use std::task::Waker;


// consumer list shared by the special channel variants.
//
// unlike a channel's taker queue there is no front-gating: a signal multicasts to everyone, and
// the one-shot variants serve whichever registered consumer claims first after the fire.
// removal is eager, so an empty list reliably means nobody is waiting.
pub(crate) struct Consumers {
    list: Vec<(u64, Waker)>,
    next_token: u64,
}

impl Consumers {
    pub(crate) fn new() -> Self {
        Consumers { list: Vec::new(), next_token: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.list.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub(crate) fn push(&mut self, waker: &Waker) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.list.push((token, waker.clone()));
        token
    }

    pub(crate) fn refresh(&mut self, token: u64, waker: &Waker) {
        if let Some((_, stored)) = self.list.iter_mut().find(|(t, _)| *t == token) {
            if !stored.will_wake(waker) {
                *stored = waker.clone();
            }
        }
    }

    // deregister, reporting whether the list is now empty (the unsubscribe edge).
    pub(crate) fn remove(&mut self, token: u64) -> bool {
        self.list.retain(|(t, _)| *t != token);
        self.list.is_empty()
    }

    // wake every consumer, leaving registrations in place. each woken waiter re-probes and
    // either claims or observes the terminal state, deregistering as its future resolves.
    pub(crate) fn wake_all(&self) {
        for (_, waker) in &self.list {
            waker.wake_by_ref();
        }
    }
}

// lifecycle of the one-shot variants (delay, future-bridge).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum OneShot {
    // not yet fired or closed.
    Pending,
    // fired and its outcome was claimed.
    Finished,
    // closed manually before firing; a late fire or settlement is a no-op.
    ManuallyClosed,
}
