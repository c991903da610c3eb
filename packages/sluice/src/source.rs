// the shared take/subscribe contract.
//
// the select engine talks to each of its operands only through this contract, so regular channels
// and the special channels (signal, timeout, delay, future-bridge) are interchangeable select
// operands, and `TakeFut` works identically over all of them.
//
// the contract splits a take into three steps:
//
//      probe ------ side-effect-free readiness check. may be gated on a registration so that
//         |         waiters are served in FIFO order.
//         v
//      claim ------ synchronously perform the take. may report Retry if a concurrent claimant
//         |         won the race between probe and claim; the caller then re-probes.
//         v
//      register --- install a waker to be notified when readiness may have changed. the returned
//                   guard deregisters on drop, which is the cancellation path for select's losing
//                   arms: since values are only moved by `claim`, cancelling a registration never
//                   has an observable side effect.

use crate::channel::error::TimeoutError;
use std::task::Waker;


/// Outcome of probing a source for synchronous readiness
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Probe {
    /// A take could complete synchronously right now
    Ready,
    /// An elapsed deadline is ready to fire as an error
    ///
    /// Only reported by [`TimeoutChan`](crate::TimeoutChan); select applies its timer-win rule to
    /// these operands.
    Deadline,
    /// A deadline that has not elapsed yet
    ///
    /// Distinct from `Alive` because a pure deadline source never yields a value and never
    /// closes: select does not count it as an open operand when deciding between waiting and
    /// resolving closed.
    DeadlinePending,
    /// Open, but nothing is takeable yet
    Alive,
    /// Closed or exhausted
    Closed,
}

/// Outcome of synchronously claiming from a source
#[derive(Debug)]
pub enum Claim<T> {
    /// A value was taken
    Taken(T),
    /// The source is closed or exhausted
    Closed,
    /// A concurrent claimant won the race; probe again
    Retry,
    /// A deadline-style source fired as an error
    Error(TimeoutError),
}

/// A source of values satisfying the shared take/subscribe contract
///
/// Implemented by [`Chan`](crate::Chan) and by every special channel. Users normally interact
/// with sources through [`TakeFut`](crate::future::TakeFut) and [`Select`](crate::Select) rather
/// than calling the contract directly.
pub trait Source<T: Send> {
    /// Side-effect-free readiness probe.
    fn probe(&self, reg: Option<&SourceReg>) -> Probe;

    /// Attempt to synchronously complete a take. Never blocks.
    fn claim(&self, reg: Option<&SourceReg>) -> Claim<T>;

    /// Register a waiter to be woken when readiness may have changed.
    ///
    /// If the source is already in a terminal state, the waker is woken immediately so the caller
    /// re-probes rather than waiting forever.
    fn register(&self, waker: &Waker) -> SourceReg;
}

// backend of a registration, provided by each source type.
pub(crate) trait RegBackend: Send {
    // the token identifying this registration to its source.
    fn token(&self) -> u64;
    // replace the stored waker.
    fn refresh(&mut self, waker: &Waker);
    // deregister. called exactly once, from SourceReg's Drop.
    fn cancel(&mut self);
}

/// A live waiter registration on a [`Source`]
///
/// Dropping the registration cancels it: the waiter is removed with no observable side effect,
/// and any lazy scheduler subscription held on its behalf is released.
pub struct SourceReg {
    backend: Box<dyn RegBackend>,
}

impl SourceReg {
    pub(crate) fn new(backend: Box<dyn RegBackend>) -> Self {
        SourceReg { backend }
    }

    pub(crate) fn token(&self) -> u64 {
        self.backend.token()
    }

    pub(crate) fn refresh(&mut self, waker: &Waker) {
        self.backend.refresh(waker);
    }
}

impl Drop for SourceReg {
    fn drop(&mut self) {
        self.backend.cancel();
    }
}
