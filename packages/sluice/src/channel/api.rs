// exposed API of channels.

use self::future::*;
use super::{
    core,
    error::*,
};
use crate::source::{Claim, Probe, RegBackend, Source, SourceReg};
use std::task::Waker;


/// A FIFO, capacity-bounded channel supporting blocking put/take and close
///
/// `Chan` is a cloneable handle; all clones refer to the same channel. Capacity is fixed at
/// creation and 0 means unbuffered: a put then completes only when a consumer is waiting.
///
/// Values are delivered strictly FIFO, and waiting consumers are served in the order they started
/// waiting. A channel closes either gracefully ([`close`](Self::close), which waits for buffered
/// values to drain) or forcibly ([`close_now`](Self::close_now), which discards them).
pub struct Chan<T>(pub(crate) core::Channel<T>);

impl<T> Chan<T> {
    /// Create a channel with the given buffer capacity (0 = unbuffered/rendezvous).
    pub fn new(capacity: usize) -> Self {
        Chan(core::Channel::new(capacity))
    }

    /// The fixed buffer capacity this channel was created with.
    pub fn capacity(&self) -> usize {
        self.0.capacity()
    }

    /// Whether a take could still ever yield a value.
    pub fn may_have_more(&self) -> bool {
        self.0.may_have_more()
    }

    /// Whether a value is takeable right now.
    pub fn has_more(&self) -> bool {
        self.0.has_more()
    }

    /// Whether a graceful close has been requested or the channel is closed.
    pub fn is_closing_or_closed(&self) -> bool {
        self.0.is_closing_or_closed()
    }

    /// Put a value without blocking
    ///
    /// Succeeds iff a waiting consumer exists or buffer space remains. On failure the value is
    /// handed back with no side effects; putting into a draining or closed channel is the
    /// [`Closed`](TryPutError::Closed) error, not a silent failure.
    pub fn try_put(&self, value: T) -> Result<(), TryPutError<T>> {
        self.0.try_put(value)
    }

    /// Create a future to put a value into this channel
    ///
    /// Completes immediately under the same conditions as [`try_put`](Self::try_put); otherwise
    /// the value enters the queue as a pending send and the future resolves once a later take
    /// consumes it, or fails with [`ClosedError`] if the channel is force-closed first.
    ///
    /// Dropping the future does not rescind the put: the value has already been committed to the
    /// channel. For a cancellable send (for example a select arm), use
    /// [`send_op`](Self::send_op).
    pub fn put(&self, value: T) -> PutFut {
        match self.0.start_put(value) {
            core::PutStart::Done => PutFut::ready(Ok(())),
            core::PutStart::Rejected(_) => PutFut::ready(Err(ClosedError)),
            core::PutStart::Blocked(slot) => PutFut::blocked(slot),
        }
    }

    /// Take a value without blocking
    ///
    /// `Ok(None)` reports a closed channel. `WouldBlock` is returned when no value is buffered,
    /// or when earlier consumers are already waiting (a `try_take` does not jump the FIFO queue).
    pub fn try_take(&self) -> Result<Option<T>, TryTakeError> {
        self.0.try_take()
    }

    /// Create a future to take a value from this channel
    ///
    /// Resolves `Ok(Some(value))`, or `Ok(None)` once the channel is closed and drained.
    /// Dropping the future deregisters the waiting consumer with no observable side effect.
    pub fn take(&self) -> TakeFut<'_, T>
    where
        T: Send + 'static,
    {
        TakeFut::new(self)
    }

    /// Create a single-use take-operation handle, consumable directly or by one select.
    pub fn take_op(&self) -> TakeOp<T> {
        TakeOp {
            chan: Chan(self.0.clone()),
            reg: None,
            polled: false,
            done: false,
        }
    }

    /// Create a single-use send-operation handle, consumable directly or by one select
    ///
    /// Unlike [`put`](Self::put), a pending `SendOp` is cancellable: dropping it (or a select
    /// arm losing with it) rescinds the operation, and [`rescind`](SendOp::rescind) recovers the
    /// undelivered value.
    pub fn send_op(&self, value: T) -> SendOp<T> {
        SendOp {
            chan: Chan(self.0.clone()),
            value: Some(value),
            slot: None,
            polled: false,
            done: false,
        }
    }

    /// Create a future that resolves once at least one value is takeable or the channel is
    /// closed, without consuming anything.
    pub fn wait(&self) -> WaitFut<T> {
        WaitFut {
            chan: self.0.clone(),
            token: None,
            done: false,
        }
    }

    /// Request a graceful close
    ///
    /// If the buffer is already empty the channel closes immediately and any waiting consumers
    /// are released with closed. Otherwise the channel stops accepting puts and the returned
    /// future resolves only once every buffered and pending value has been taken. Concurrent
    /// closes share the same completion.
    pub fn close(&self) -> CloseFut<T> {
        CloseFut {
            chan: self.0.clone(),
            token: None,
            done: false,
        }
    }

    /// Close synchronously if that would complete immediately, reporting whether it did
    ///
    /// Returns false, with no state change, if buffered values would need draining.
    pub fn try_close(&self) -> bool {
        self.0.try_close()
    }

    /// Force immediate closure
    ///
    /// Blocked puts are rejected with [`ClosedError`], undelivered buffered values are discarded
    /// (the forced variant's explicit data-loss contract), and a pending graceful close resolves
    /// successfully.
    pub fn close_now(&self) {
        self.0.close_now()
    }
}

impl<T> Clone for Chan<T> {
    fn clone(&self) -> Self {
        Chan(self.0.clone())
    }
}

// registration backend for a waiting consumer.
struct TakerReg<T> {
    chan: core::Channel<T>,
    token: u64,
}

impl<T: Send> RegBackend for TakerReg<T> {
    fn token(&self) -> u64 {
        self.token
    }

    fn refresh(&mut self, waker: &Waker) {
        self.chan.refresh_taker(self.token, waker);
    }

    fn cancel(&mut self) {
        self.chan.cancel_taker(self.token);
    }
}

impl<T: Send + 'static> Source<T> for Chan<T> {
    fn probe(&self, reg: Option<&SourceReg>) -> Probe {
        self.0.probe_take(reg.map(|r| r.token()))
    }

    fn claim(&self, reg: Option<&SourceReg>) -> Claim<T> {
        self.0.claim_take(reg.map(|r| r.token()))
    }

    fn register(&self, waker: &Waker) -> SourceReg {
        let token = self.0.register_taker(waker);
        SourceReg::new(Box::new(TakerReg { chan: self.0.clone(), token }))
    }
}


/// Single-use handle for one in-flight take
///
/// Consumable exactly once: either awaited directly, or passed into one [`Select`](crate::Select)
/// — never both. Feeding an already-polled or already-resolved handle to a select fails that
/// select with [`MisuseError`](crate::error::MisuseError) immediately.
pub struct TakeOp<T> {
    pub(crate) chan: Chan<T>,
    reg: Option<SourceReg>,
    polled: bool,
    done: bool,
}

impl<T> TakeOp<T> {
    pub(crate) fn is_tainted(&self) -> bool {
        self.polled || self.done
    }

    pub(crate) fn into_chan(self) -> Chan<T> {
        let TakeOp { chan, .. } = self;
        chan
    }
}

/// Single-use handle for one in-flight send
///
/// Consumable exactly once, directly or by one select. The value stays with the handle until the
/// send actually completes, so a losing select arm or a drop cancels the operation with no
/// observable side effect.
pub struct SendOp<T> {
    pub(crate) chan: Chan<T>,
    pub(crate) value: Option<T>,
    slot: Option<std::sync::Arc<core::PutSlot>>,
    polled: bool,
    done: bool,
}

impl<T> SendOp<T> {
    /// If the value has not been delivered, abort the operation and recover it.
    pub fn rescind(&mut self) -> Option<T> {
        if let Some(value) = self.value.take() {
            self.done = true;
            return Some(value);
        }
        if let Some(slot) = self.slot.take() {
            self.done = true;
            return self.chan.0.rescind_put(&slot);
        }
        None
    }

    pub(crate) fn is_tainted(&self) -> bool {
        self.polled || self.done
    }

    pub(crate) fn take_value(&mut self) -> Option<T> {
        self.value.take()
    }
}

impl<T> Drop for SendOp<T> {
    fn drop(&mut self) {
        // an undelivered pending send must not strand its queue entry
        if let Some(slot) = self.slot.take() {
            drop(self.chan.0.rescind_put(&slot));
        }
    }
}


// future types for channels.
pub mod future {
    use super::*;
    use std::{
        future::Future,
        pin::Pin,
        sync::Arc,
        task::{Context, Poll},
    };

    /// Future for putting a value into a [`Chan`]
    ///
    /// Resolves `Ok(())` once a later take consumes the value (immediately, if the put was
    /// eligible when created), or `Err(ClosedError)` if the channel is force-closed first.
    /// Once resolved, further polls return `Pending`.
    pub struct PutFut {
        state: PutFutState,
    }

    enum PutFutState {
        Ready(Result<(), ClosedError>),
        Blocked(Arc<core::PutSlot>),
        Done,
    }

    impl PutFut {
        pub(crate) fn ready(result: Result<(), ClosedError>) -> Self {
            PutFut { state: PutFutState::Ready(result) }
        }

        pub(crate) fn blocked(slot: Arc<core::PutSlot>) -> Self {
            PutFut { state: PutFutState::Blocked(slot) }
        }

        /// Whether this future has already resolved.
        pub fn is_terminated(&self) -> bool {
            matches!(self.state, PutFutState::Done)
        }
    }

    impl Future for PutFut {
        type Output = Result<(), ClosedError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            match &this.state {
                PutFutState::Ready(_) => {
                    let PutFutState::Ready(result) =
                        std::mem::replace(&mut this.state, PutFutState::Done)
                        else { unreachable!() };
                    Poll::Ready(result)
                }
                PutFutState::Blocked(slot) => match slot.poll(cx.waker()) {
                    Poll::Ready(result) => {
                        this.state = PutFutState::Done;
                        Poll::Ready(result)
                    }
                    Poll::Pending => Poll::Pending,
                },
                PutFutState::Done => Poll::Pending,
            }
        }
    }

    /// Future for taking a value from any [`Source`]
    ///
    /// Resolves `Ok(Some(value))` with a taken value, `Ok(None)` once the source is closed or
    /// exhausted, or `Err(TimeoutError)` when a deadline-style source fires as an error. Once
    /// resolved, further polls return `Pending`.
    ///
    /// Dropping an unresolved `TakeFut` deregisters its waiting consumer with no observable side
    /// effect.
    pub struct TakeFut<'a, T: Send> {
        source: &'a dyn Source<T>,
        reg: Option<SourceReg>,
        done: bool,
    }

    impl<'a, T: Send> TakeFut<'a, T> {
        pub(crate) fn new(source: &'a dyn Source<T>) -> Self {
            TakeFut { source, reg: None, done: false }
        }

        /// Whether this future has already resolved.
        pub fn is_terminated(&self) -> bool {
            self.done
        }
    }

    impl<'a, T: Send> Future for TakeFut<'a, T> {
        type Output = Result<Option<T>, TimeoutError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            if this.done {
                return Poll::Pending;
            }
            let result = loop {
                match this.source.probe(this.reg.as_ref()) {
                    Probe::Ready | Probe::Deadline => match this.source.claim(this.reg.as_ref()) {
                        Claim::Taken(value) => break Ok(Some(value)),
                        Claim::Closed => break Ok(None),
                        Claim::Error(e) => break Err(e),
                        Claim::Retry => continue,
                    },
                    Probe::Closed => break Ok(None),
                    Probe::Alive | Probe::DeadlinePending => match &mut this.reg {
                        Some(reg) => {
                            reg.refresh(cx.waker());
                            return Poll::Pending;
                        }
                        None => {
                            // register, then re-probe once to close the race against a value
                            // that arrived in between
                            this.reg = Some(this.source.register(cx.waker()));
                            continue;
                        }
                    },
                }
            };
            this.done = true;
            this.reg = None;
            Poll::Ready(result)
        }
    }

    /// Future for gracefully closing a [`Chan`]
    ///
    /// Resolves only once every buffered and pending value has been taken (or immediately if
    /// there was nothing to drain). A forced close resolves it successfully as well.
    pub struct CloseFut<T> {
        pub(super) chan: core::Channel<T>,
        pub(super) token: Option<u64>,
        pub(super) done: bool,
    }

    impl<T> CloseFut<T> {
        /// Whether this future has already resolved.
        pub fn is_terminated(&self) -> bool {
            self.done
        }
    }

    impl<T> Future for CloseFut<T> {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
            let this = self.get_mut();
            if this.done {
                return Poll::Pending;
            }
            match this.chan.poll_close(&mut this.token, cx.waker()) {
                Poll::Ready(()) => {
                    this.done = true;
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            }
        }
    }

    impl<T> Drop for CloseFut<T> {
        fn drop(&mut self) {
            if let Some(token) = self.token.take() {
                self.chan.cancel_close_waiter(token);
            }
        }
    }

    /// Future for observing channel liveness without consuming
    ///
    /// Resolves once the channel has at least one takeable value or is closed.
    pub struct WaitFut<T> {
        pub(super) chan: core::Channel<T>,
        pub(super) token: Option<u64>,
        pub(super) done: bool,
    }

    impl<T> WaitFut<T> {
        /// Whether this future has already resolved.
        pub fn is_terminated(&self) -> bool {
            self.done
        }
    }

    impl<T> Future for WaitFut<T> {
        type Output = ();

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<()> {
            let this = self.get_mut();
            if this.done {
                return Poll::Pending;
            }
            match this.chan.poll_wait(&mut this.token, cx.waker()) {
                Poll::Ready(()) => {
                    this.done = true;
                    Poll::Ready(())
                }
                Poll::Pending => Poll::Pending,
            }
        }
    }

    impl<T> Drop for WaitFut<T> {
        fn drop(&mut self) {
            if let Some(token) = self.token.take() {
                self.chan.cancel_observer(token);
            }
        }
    }

    impl<T: Send + 'static> Future for TakeOp<T> {
        type Output = Result<Option<T>, TimeoutError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            this.polled = true;
            if this.done {
                return Poll::Pending;
            }
            let result = loop {
                match this.chan.probe(this.reg.as_ref()) {
                    Probe::Ready | Probe::Deadline => match this.chan.claim(this.reg.as_ref()) {
                        Claim::Taken(value) => break Ok(Some(value)),
                        Claim::Closed => break Ok(None),
                        Claim::Error(e) => break Err(e),
                        Claim::Retry => continue,
                    },
                    Probe::Closed => break Ok(None),
                    Probe::Alive | Probe::DeadlinePending => match &mut this.reg {
                        Some(reg) => {
                            reg.refresh(cx.waker());
                            return Poll::Pending;
                        }
                        None => {
                            this.reg = Some(Source::register(&this.chan, cx.waker()));
                            continue;
                        }
                    },
                }
            };
            this.done = true;
            this.reg = None;
            Poll::Ready(result)
        }
    }

    impl<T: Send + 'static + Unpin> Future for SendOp<T> {
        type Output = Result<(), ClosedError>;

        fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
            let this = self.get_mut();
            this.polled = true;
            if this.done {
                return Poll::Pending;
            }
            if let Some(slot) = &this.slot {
                return match slot.poll(cx.waker()) {
                    Poll::Ready(result) => {
                        this.done = true;
                        this.slot = None;
                        Poll::Ready(result)
                    }
                    Poll::Pending => Poll::Pending,
                };
            }
            let value = this.value.take().expect("SendOp polled after value consumed");
            match this.chan.0.start_put(value) {
                core::PutStart::Done => {
                    this.done = true;
                    Poll::Ready(Ok(()))
                }
                core::PutStart::Rejected(_) => {
                    this.done = true;
                    Poll::Ready(Err(ClosedError))
                }
                core::PutStart::Blocked(slot) => {
                    let poll = slot.poll(cx.waker());
                    this.slot = Some(slot);
                    match poll {
                        Poll::Ready(result) => {
                            this.done = true;
                            this.slot = None;
                            Poll::Ready(result)
                        }
                        Poll::Pending => Poll::Pending,
                    }
                }
            }
        }
    }

    #[cfg(feature = "futures")]
    mod fused {
        use super::*;
        use futures::future::FusedFuture;

        impl FusedFuture for PutFut {
            fn is_terminated(&self) -> bool {
                Self::is_terminated(self)
            }
        }

        impl<'a, T: Send> FusedFuture for TakeFut<'a, T> {
            fn is_terminated(&self) -> bool {
                Self::is_terminated(self)
            }
        }

        impl<T> FusedFuture for CloseFut<T> {
            fn is_terminated(&self) -> bool {
                Self::is_terminated(self)
            }
        }

        impl<T> FusedFuture for WaitFut<T> {
            fn is_terminated(&self) -> bool {
                Self::is_terminated(self)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::poll_once;
    use std::task::Poll;

    #[test]
    fn capacity_n_puts_succeed_then_block() {
        let ch = Chan::new(2);
        assert!(poll_once(&mut ch.put(1)).is_ready());
        assert!(poll_once(&mut ch.put(2)).is_ready());

        // the third put blocks, and resolves only once its own value is consumed
        let mut blocked = ch.put(3);
        assert!(poll_once(&mut blocked).is_pending());
        assert_eq!(ch.try_take(), Ok(Some(1)));
        assert!(poll_once(&mut blocked).is_pending());
        assert_eq!(ch.try_take(), Ok(Some(2)));
        assert!(poll_once(&mut blocked).is_pending());
        assert_eq!(ch.try_take(), Ok(Some(3)));
        assert_eq!(poll_once(&mut blocked), Poll::Ready(Ok(())));
    }

    #[test]
    fn rendezvous_put_blocks_until_take() {
        let ch = Chan::new(0);
        assert!(ch.try_put(9).is_err());
        let mut put = ch.put(9);
        assert!(poll_once(&mut put).is_pending());

        assert_eq!(poll_once(&mut ch.take()), Poll::Ready(Ok(Some(9))));
        assert_eq!(poll_once(&mut put), Poll::Ready(Ok(())));
    }

    #[test]
    fn rendezvous_try_put_succeeds_with_waiting_consumer() {
        let ch = Chan::new(0);
        let mut take = ch.take();
        assert!(poll_once(&mut take).is_pending());

        assert!(ch.try_put(4).is_ok());
        assert_eq!(poll_once(&mut take), Poll::Ready(Ok(Some(4))));
    }

    #[test]
    fn values_arrive_in_send_order() {
        let ch = Chan::new(8);
        for i in 0..5 {
            ch.try_put(i).unwrap();
        }
        for i in 0..5 {
            assert_eq!(ch.try_take(), Ok(Some(i)));
        }
    }

    #[test]
    fn waiting_consumers_served_in_arrival_order() {
        let ch = Chan::new(0);
        let mut first = ch.take();
        let mut second = ch.take();
        assert!(poll_once(&mut first).is_pending());
        assert!(poll_once(&mut second).is_pending());

        ch.try_put("a").unwrap();
        ch.try_put("b").unwrap();

        // polling out of order must not let the later consumer jump the queue
        assert!(poll_once(&mut second).is_pending());
        assert_eq!(poll_once(&mut first), Poll::Ready(Ok(Some("a"))));
        assert_eq!(poll_once(&mut second), Poll::Ready(Ok(Some("b"))));
    }

    #[test]
    fn cancelled_consumer_forwards_its_turn() {
        let ch = Chan::new(0);
        let mut first = ch.take();
        let mut second = ch.take();
        assert!(poll_once(&mut first).is_pending());
        assert!(poll_once(&mut second).is_pending());

        ch.try_put(1).unwrap();
        drop(first);
        assert_eq!(poll_once(&mut second), Poll::Ready(Ok(Some(1))));
    }

    #[test]
    fn try_take_does_not_jump_waiting_consumers() {
        let ch = Chan::new(1);
        let mut take = ch.take();
        assert!(poll_once(&mut take).is_pending());

        ch.try_put(1).unwrap();
        assert!(matches!(ch.try_take(), Err(TryTakeError::WouldBlock(_))));
        assert_eq!(poll_once(&mut take), Poll::Ready(Ok(Some(1))));
    }

    #[test]
    fn try_put_failure_has_no_side_effects() {
        let ch = Chan::new(1);
        ch.try_put(1).unwrap();
        match ch.try_put(2) {
            Err(TryPutError::WouldBlock(2)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(ch.try_take(), Ok(Some(1)));
        assert!(matches!(ch.try_take(), Err(TryTakeError::WouldBlock(_))));
    }

    #[test]
    fn graceful_close_waits_for_drain() {
        let ch = Chan::new(2);
        ch.try_put(1).unwrap();
        ch.try_put(2).unwrap();

        let mut close_a = ch.close();
        let mut close_b = ch.close();
        assert!(poll_once(&mut close_a).is_pending());
        assert!(poll_once(&mut close_b).is_pending());
        assert!(ch.is_closing_or_closed());

        // puts are refused while draining
        assert!(ch.try_put(3).unwrap_err().is_closed());
        assert_eq!(poll_once(&mut ch.put(3)), Poll::Ready(Err(ClosedError)));

        assert_eq!(ch.try_take(), Ok(Some(1)));
        assert!(poll_once(&mut close_a).is_pending());
        assert_eq!(ch.try_take(), Ok(Some(2)));

        // both concurrent closes resolve together at drain completion
        assert_eq!(poll_once(&mut close_a), Poll::Ready(()));
        assert_eq!(poll_once(&mut close_b), Poll::Ready(()));
        assert_eq!(ch.try_take(), Ok(None));
        assert_eq!(poll_once(&mut ch.take()), Poll::Ready(Ok(None)));
    }

    #[test]
    fn close_releases_waiting_consumers_immediately() {
        let ch = Chan::<u32>::new(0);
        let mut take = ch.take();
        assert!(poll_once(&mut take).is_pending());

        let mut close = ch.close();
        assert_eq!(poll_once(&mut close), Poll::Ready(()));
        assert_eq!(poll_once(&mut take), Poll::Ready(Ok(None)));
    }

    #[test]
    fn forced_close_discards_and_rejects() {
        let ch = Chan::new(0);
        let mut blocked = ch.put(5);
        assert!(poll_once(&mut blocked).is_pending());

        ch.close_now();
        assert_eq!(poll_once(&mut blocked), Poll::Ready(Err(ClosedError)));
        // no taker ever observes the discarded value
        assert_eq!(ch.try_take(), Ok(None));
        assert_eq!(poll_once(&mut ch.take()), Poll::Ready(Ok(None)));
    }

    #[test]
    fn forced_close_resolves_pending_graceful_close() {
        let ch = Chan::new(1);
        ch.try_put(1).unwrap();
        let mut close = ch.close();
        assert!(poll_once(&mut close).is_pending());

        ch.close_now();
        // the graceful close is considered to have happened
        assert_eq!(poll_once(&mut close), Poll::Ready(()));
    }

    #[test]
    fn try_close_only_when_immediate() {
        let ch = Chan::new(1);
        ch.try_put(1).unwrap();
        assert!(!ch.try_close());
        // failed try_close makes no state change
        assert!(!ch.is_closing_or_closed());
        assert_eq!(ch.try_take(), Ok(Some(1)));
        assert!(ch.try_close());
        assert!(ch.is_closing_or_closed());
    }

    #[test]
    fn wait_is_a_pure_readiness_probe() {
        let ch = Chan::new(1);
        let mut wait = ch.wait();
        assert!(poll_once(&mut wait).is_pending());

        ch.try_put(1).unwrap();
        assert_eq!(poll_once(&mut wait), Poll::Ready(()));
        // nothing was consumed
        assert_eq!(ch.try_take(), Ok(Some(1)));

        // and a closed channel resolves the probe too
        let mut wait = ch.wait();
        assert!(poll_once(&mut wait).is_pending());
        ch.close_now();
        assert_eq!(poll_once(&mut wait), Poll::Ready(()));
    }

    #[test]
    fn closed_channel_reports_closed_forever() {
        let ch = Chan::<u32>::new(1);
        ch.close_now();
        for _ in 0..3 {
            assert_eq!(ch.try_take(), Ok(None));
            assert_eq!(poll_once(&mut ch.take()), Poll::Ready(Ok(None)));
        }
        assert!(ch.try_put(1).unwrap_err().is_closed());
        assert!(!ch.may_have_more());
    }

    #[test]
    fn take_op_awaits_like_a_take() {
        let ch = Chan::new(1);
        let mut op = ch.take_op();
        assert!(poll_once(&mut op).is_pending());
        ch.try_put(8).unwrap();
        assert_eq!(poll_once(&mut op), Poll::Ready(Ok(Some(8))));
    }

    #[test]
    fn send_op_rescind_recovers_value() {
        let ch = Chan::new(0);
        let mut op = ch.send_op(6);
        assert!(poll_once(&mut op).is_pending());
        // the pending send is visible to takers until rescinded
        assert!(ch.has_more());

        assert_eq!(op.rescind(), Some(6));
        assert!(!ch.has_more());
        assert!(matches!(ch.try_take(), Err(TryTakeError::WouldBlock(_))));
    }

    #[test]
    fn dropping_pending_send_op_rescinds() {
        let ch = Chan::<u32>::new(0);
        let mut op = ch.send_op(6);
        assert!(poll_once(&mut op).is_pending());
        drop(op);
        assert!(!ch.has_more());
    }

    #[tokio::test]
    async fn end_to_end_bounded_pipeline() {
        let ch = Chan::new(4);
        let producer = {
            let ch = ch.clone();
            tokio::spawn(async move {
                for i in 0..100u32 {
                    ch.put(i).await.unwrap();
                }
                ch.close().await;
            })
        };

        let mut seen = Vec::new();
        while let Some(value) = ch.take().await.unwrap() {
            seen.push(value);
        }
        producer.await.unwrap();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}

