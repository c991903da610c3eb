// FIFO queue of waiter registrations, part of a channel.
//
// each registration is a (token, waker) pair. tokens gate claims: only the front registration of
// the queue may claim, so waiters are served strictly in the order they started waiting. removing
// the front registration forwards the wake to the next one, so a cancelled waiter never strands a
// value behind it.

use std::{
    collections::VecDeque,
    task::Waker,
};


pub(crate) struct WaiterQueue {
    entries: VecDeque<WaiterEntry>,
    next_token: u64,
}

struct WaiterEntry {
    token: u64,
    waker: Waker,
}

impl WaiterQueue {
    // construct empty queue.
    pub(crate) fn new() -> Self {
        WaiterQueue { entries: VecDeque::new(), next_token: 0 }
    }

    // number of live registrations.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // register a new waiter at the back of the queue.
    pub(crate) fn push(&mut self, waker: Waker) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.entries.push_back(WaiterEntry { token, waker });
        token
    }

    // replace the waker stored for a registration. no-op if the registration is gone.
    pub(crate) fn refresh(&mut self, token: u64, waker: &Waker) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.token == token) {
            if !entry.waker.will_wake(waker) {
                entry.waker = waker.clone();
            }
        }
    }

    // whether the registration is at the front of the queue.
    pub(crate) fn is_front(&self, token: u64) -> bool {
        self.entries.front().map(|e| e.token == token).unwrap_or(false)
    }

    // deregister. if the removed registration was at the front, the wake is forwarded to the new
    // front so a value made available for the removed waiter is picked up by the next one.
    pub(crate) fn remove(&mut self, token: u64) {
        let Some(pos) = self.entries.iter().position(|e| e.token == token) else { return };
        self.entries.remove(pos);
        if pos == 0 {
            self.wake_front();
        }
    }

    // wake the front registration, if any, leaving it registered. the woken waiter claims (or
    // observes closure) on its next poll.
    pub(crate) fn wake_front(&mut self) {
        if let Some(entry) = self.entries.front() {
            entry.waker.wake_by_ref();
        }
    }

    // wake every registration, leaving them registered. used when the channel closes and every
    // waiter must observe the terminal state.
    pub(crate) fn wake_all(&mut self) {
        for entry in &self.entries {
            entry.waker.wake_by_ref();
        }
    }
}
