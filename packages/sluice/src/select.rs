// the select engine.
//
// a select races a fixed list of arms — channel takes, pending take/send operations, special
// channels — and resolves to whichever becomes ready first. the algorithm is probe-claim:
//
// 1. probe every arm without side effects, partitioning into elapsed-deadline timer arms,
//    synchronously-ready normal arms, and a tally of whether any normal arm is still open.
// 2. an elapsed timeout wins (as an error) only while some other arm is still open: a timeout
//    firing when everything else is finished or closed is not meaningful signal and must not mask
//    the real outcome.
// 3. otherwise pick uniformly at random among the ready arms, so no arm is starved by
//    declaration order, and claim exactly that one. losing arms never see a side effect; their
//    values stay takeable.
// 4. if nothing is ready but something is open, register a waker on every arm and wait. a claim
//    lost to a concurrent competitor just re-runs the probe.
//
// the channel that wins is named by arm index in the resolution, along with the taken value for
// take arms.

use crate::{
    channel::{
        api::{Chan, SendOp, TakeOp},
        core,
        error::{MisuseError, SelectError, TrySelectError, WouldBlockError},
    },
    source::{Claim, Probe, Source, SourceReg},
};
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};
use smallvec::SmallVec;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};


/// Resolution of a [`Select`]
#[derive(Debug, PartialEq, Eq)]
pub enum Selected<T> {
    /// The take arm at `index` produced a value
    Taken {
        /// Index of the winning arm, in the order arms were added
        index: usize,
        /// The taken value
        value: T,
    },
    /// The send arm at `index` delivered its value
    Sent {
        /// Index of the winning arm, in the order arms were added
        index: usize,
    },
    /// Every operand reported closed
    Closed,
}

impl<T> Selected<T> {
    /// The winning arm's index, if an arm won.
    pub fn index(&self) -> Option<usize> {
        match self {
            Selected::Taken { index, .. } | Selected::Sent { index } => Some(*index),
            Selected::Closed => None,
        }
    }
}

// one operand slot.
enum Arm<'a, T: Send + 'static> {
    Take {
        source: SourceRef<'a, T>,
        reg: Option<SourceReg>,
    },
    Send {
        chan: Chan<T>,
        value: Option<T>,
        reg: Option<SenderReg<T>>,
    },
    // conditionally-omitted arm; occupies an index and is otherwise ignored
    Skip,
}

enum SourceRef<'a, T: Send + 'static> {
    Borrowed(&'a dyn Source<T>),
    Owned(Chan<T>),
}

impl<'a, T: Send + 'static> SourceRef<'a, T> {
    fn get(&self) -> &dyn Source<T> {
        match self {
            SourceRef::Borrowed(source) => *source,
            SourceRef::Owned(chan) => chan,
        }
    }
}

// registration guard for a waiting send arm.
struct SenderReg<T> {
    chan: core::Channel<T>,
    token: u64,
}

impl<T> SenderReg<T> {
    fn refresh(&self, waker: &Waker) {
        self.chan.refresh_sender(self.token, waker);
    }
}

impl<T> Drop for SenderReg<T> {
    fn drop(&mut self) {
        self.chan.cancel_sender(self.token);
    }
}

// outcome of one probe-claim pass.
enum Pass<T> {
    Resolved(Selected<T>),
    Failed(SelectError),
    WouldBlock,
}

/// Races multiple channel operations, resolving to whichever becomes ready first
///
/// Build with [`new`](Self::new), add arms with [`take`](Self::take), [`op`](Self::op) /
/// [`op_send`](Self::op_send) and [`skip`](Self::skip), then either probe synchronously with
/// [`try_sync`](Self::try_sync) or await the `Select` itself.
///
/// Fairness: when several arms are ready simultaneously, the winner is picked uniformly at
/// random from an injectable source ([`with_rng`](Self::with_rng) accepts a seeded generator for
/// reproducible tests). Within one channel, waiting consumers are still served strictly FIFO;
/// the randomization only breaks ties across racing arms.
///
/// Error policy: the first arm to fail (an expired [`TimeoutChan`](crate::TimeoutChan), or a
/// [`DelayChan`](crate::DelayChan)/[`FutureChan`](crate::FutureChan) firing as an error)
/// resolves the select as that failure and cancels the rest — even if another arm might have
/// succeeded later. A send arm whose channel closes is not a failure; it just counts toward the
/// closed tally.
///
/// Cancellation: when the select resolves — or is dropped — every losing registration is
/// removed before any side effect could occur on its arm, so a losing channel's value remains
/// takeable by whoever takes next.
pub struct Select<'a, T: Send + 'static> {
    arms: SmallVec<[Arm<'a, T>; 4]>,
    rng: Box<dyn RngCore + Send>,
    misuse: bool,
    done: bool,
}

impl<'a, T: Send + 'static> Select<'a, T> {
    /// Create an empty select with an entropy-seeded tie-break source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create an empty select with an explicit tie-break source.
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Select {
            arms: SmallVec::new(),
            rng: Box::new(rng),
            misuse: false,
            done: false,
        }
    }

    /// Add a take arm over any source: a channel or a special channel.
    pub fn take<S: Source<T>>(mut self, source: &'a S) -> Self {
        self.arms.push(Arm::Take { source: SourceRef::Borrowed(source), reg: None });
        self
    }

    /// Add a previously created take-operation handle as an arm
    ///
    /// The handle is consumed; a handle that was already polled or resolved outside the select
    /// fails the whole select with [`MisuseError`] immediately.
    pub fn op(mut self, op: TakeOp<T>) -> Self {
        if op.is_tainted() {
            self.misuse = true;
            self.arms.push(Arm::Skip);
        } else {
            self.arms.push(Arm::Take { source: SourceRef::Owned(op.into_chan()), reg: None });
        }
        self
    }

    /// Add a previously created send-operation handle as an arm
    ///
    /// The handle is consumed; a handle that was already polled or resolved outside the select
    /// fails the whole select with [`MisuseError`] immediately. If the arm loses, the value is
    /// dropped without ever entering the channel.
    pub fn op_send(mut self, mut op: SendOp<T>) -> Self {
        if op.is_tainted() {
            self.misuse = true;
            self.arms.push(Arm::Skip);
        } else {
            let chan = op.chan.clone();
            let value = op.take_value();
            self.arms.push(Arm::Send { chan, value, reg: None });
        }
        self
    }

    /// Add an empty arm, preserving the indices of the arms after it
    ///
    /// The slot is ignored entirely; this is how a conditionally-present arm is omitted without
    /// renumbering its neighbors.
    pub fn skip(mut self) -> Self {
        self.arms.push(Arm::Skip);
        self
    }

    /// Probe synchronously, never suspending
    ///
    /// Performs at most one arm's operation. `WouldBlock` reports that the select would have to
    /// wait (all handles are cancelled); [`Selected::Closed`] that every operand is closed.
    pub fn try_sync(mut self) -> Result<Selected<T>, TrySelectError> {
        if self.misuse {
            return Err(MisuseError.into());
        }
        match self.pass() {
            Pass::Resolved(selected) => Ok(selected),
            Pass::Failed(e) => Err(e.into()),
            Pass::WouldBlock => Err(WouldBlockError.into()),
        }
    }

    // one probe-claim pass over all arms. loops only when a claim is lost to a concurrent
    // competitor.
    fn pass(&mut self) -> Pass<T> {
        loop {
            let mut deadline_ready: SmallVec<[usize; 4]> = SmallVec::new();
            let mut ready: SmallVec<[usize; 4]> = SmallVec::new();
            let mut any_open = false;

            for (index, arm) in self.arms.iter().enumerate() {
                match arm {
                    Arm::Skip => {}
                    Arm::Take { source, reg } => match source.get().probe(reg.as_ref()) {
                        Probe::Ready => {
                            ready.push(index);
                            any_open = true;
                        }
                        Probe::Deadline => deadline_ready.push(index),
                        Probe::Alive => any_open = true,
                        // a pure deadline source is not an open operand: it never yields a
                        // value and never closes, so it must not keep a select of otherwise
                        // closed arms waiting
                        Probe::DeadlinePending => {}
                        Probe::Closed => {}
                    },
                    Arm::Send { chan, reg, .. } => {
                        match chan.0.probe_put(reg.as_ref().map(|r| r.token)) {
                            Probe::Ready => {
                                ready.push(index);
                                any_open = true;
                            }
                            Probe::Alive => any_open = true,
                            // a closed channel makes a send arm exhausted, not failed
                            _ => {}
                        }
                    }
                }
            }

            // an elapsed timeout only wins while it is actually racing something still open
            if !deadline_ready.is_empty() && any_open {
                let index = pick(&mut self.rng, &deadline_ready);
                let Arm::Take { source, reg } = &self.arms[index] else { unreachable!() };
                match source.get().claim(reg.as_ref()) {
                    Claim::Error(e) => return Pass::Failed(e.into()),
                    _ => continue,
                }
            }

            if ready.is_empty() {
                return if any_open {
                    Pass::WouldBlock
                } else {
                    Pass::Resolved(Selected::Closed)
                };
            }

            let index = pick(&mut self.rng, &ready);
            match &mut self.arms[index] {
                Arm::Take { source, reg } => match source.get().claim(reg.as_ref()) {
                    Claim::Taken(value) => return Pass::Resolved(Selected::Taken { index, value }),
                    Claim::Error(e) => return Pass::Failed(e.into()),
                    Claim::Closed | Claim::Retry => continue,
                },
                Arm::Send { chan, value, reg } => {
                    let v = value.take().expect("send arm value already consumed");
                    match chan.0.claim_put(reg.as_ref().map(|r| r.token), v) {
                        core::SendClaim::Sent => return Pass::Resolved(Selected::Sent { index }),
                        core::SendClaim::Closed(v) | core::SendClaim::Retry(v) => {
                            *value = Some(v);
                            continue;
                        }
                    }
                }
                Arm::Skip => unreachable!(),
            }
        }
    }

    // install or refresh a waker registration on every arm that can still fire. reports whether
    // any new registration was created, in which case the caller re-probes to close the race
    // against an arm that became ready in between.
    fn ensure_registrations(&mut self, waker: &Waker) -> bool {
        let mut registered = false;
        for arm in &mut self.arms {
            match arm {
                Arm::Skip => {}
                Arm::Take { source, reg } => match reg {
                    Some(reg) => reg.refresh(waker),
                    None => {
                        *reg = Some(source.get().register(waker));
                        registered = true;
                    }
                },
                Arm::Send { chan, reg, .. } => match reg {
                    Some(reg) => reg.refresh(waker),
                    None => {
                        let token = chan.0.register_sender(waker);
                        *reg = Some(SenderReg { chan: chan.0.clone(), token });
                        registered = true;
                    }
                },
            }
        }
        registered
    }

    // drop every registration. losing arms are cancelled before the caller observes the
    // resolution, and cancellation is side-effect-free by construction.
    fn finish(&mut self) {
        for arm in &mut self.arms {
            match arm {
                Arm::Take { reg, .. } => *reg = None,
                Arm::Send { reg, .. } => *reg = None,
                Arm::Skip => {}
            }
        }
        self.done = true;
    }
}

impl<'a, T: Send + 'static + Unpin> Future for Select<'a, T> {
    type Output = Result<Selected<T>, SelectError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.done {
            return Poll::Pending;
        }
        if this.misuse {
            this.finish();
            return Poll::Ready(Err(MisuseError.into()));
        }
        loop {
            match this.pass() {
                Pass::Resolved(selected) => {
                    this.finish();
                    return Poll::Ready(Ok(selected));
                }
                Pass::Failed(e) => {
                    this.finish();
                    return Poll::Ready(Err(e));
                }
                Pass::WouldBlock => {
                    if !this.ensure_registrations(cx.waker()) {
                        return Poll::Pending;
                    }
                    // new registrations were installed; re-probe to close the gap
                }
            }
        }
    }
}

#[cfg(feature = "futures")]
impl<'a, T: Send + 'static + Unpin> futures::future::FusedFuture for Select<'a, T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

fn pick(rng: &mut Box<dyn RngCore + Send>, candidates: &SmallVec<[usize; 4]>) -> usize {
    if candidates.len() == 1 {
        candidates[0]
    } else {
        candidates[rng.gen_range(0..candidates.len())]
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::error::TimeoutError,
        scheduler::ManualScheduler,
        special::{DelayChan, SignalChan, TimeoutChan},
        test_util::{count_waker, poll_once, poll_with, CountWaker},
    };
    use rand_pcg::Pcg32;
    use std::{sync::Arc, time::Duration};

    fn seeded(seed: u64) -> Pcg32 {
        Pcg32::new(seed, 0xa02bdbf7bb3c0a7)
    }

    fn ready_chan(value: u32) -> Chan<u32> {
        let ch = Chan::new(1);
        ch.try_put(value).unwrap();
        ch
    }

    #[test]
    fn sync_select_picks_a_ready_arm() {
        let a = Chan::new(1);
        let b = ready_chan(2);
        match Select::with_rng(seeded(1)).take(&a).take(&b).try_sync() {
            Ok(Selected::Taken { index: 1, value: 2 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn sync_select_would_block_when_nothing_ready() {
        let a = Chan::<u32>::new(1);
        let b = Chan::<u32>::new(1);
        match Select::with_rng(seeded(1)).take(&a).take(&b).try_sync() {
            Err(TrySelectError::WouldBlock(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn fairness_among_simultaneously_ready_arms() {
        let mut wins = [0u32; 2];
        for trial in 0..400 {
            let a = ready_chan(1);
            let b = ready_chan(2);
            let selected = Select::with_rng(seeded(trial)).take(&a).take(&b).try_sync().unwrap();
            match selected {
                Selected::Taken { index, .. } => wins[index] += 1,
                other => panic!("unexpected: {:?}", other),
            }
        }
        // statistical, not exact: each side should win a healthy share of 400 seeded trials
        assert!(wins[0] > 120 && wins[1] > 120, "unbalanced wins: {:?}", wins);
    }

    #[test]
    fn losing_arm_keeps_its_value() {
        let a = ready_chan(1);
        let b = ready_chan(2);
        let selected = Select::with_rng(seeded(7)).take(&a).take(&b).try_sync().unwrap();
        let winner = selected.index().unwrap();
        let loser = [&a, &b][1 - winner];
        assert_eq!(loser.try_take(), Ok(Some([1, 2][1 - winner])));
    }

    #[test]
    fn all_closed_operands_resolve_closed() {
        let a = Chan::<u32>::new(1);
        let b = Chan::<u32>::new(0);
        a.close_now();
        b.close_now();
        assert_eq!(
            Select::with_rng(seeded(1)).take(&a).take(&b).try_sync(),
            Ok(Selected::Closed),
        );
        // async variant resolves too, instead of hanging
        let mut sel = Select::with_rng(seeded(2)).take(&a).take(&b);
        assert_eq!(poll_once(&mut sel), std::task::Poll::Ready(Ok(Selected::Closed)));
    }

    #[test]
    fn empty_select_resolves_closed() {
        assert_eq!(
            Select::<u32>::with_rng(seeded(1)).skip().try_sync(),
            Ok(Selected::Closed),
        );
    }

    #[test]
    fn expired_timeout_wins_over_open_arms() {
        let sched = Arc::new(ManualScheduler::new());
        let pending = Chan::<u32>::new(1);
        let ready = ready_chan(5);
        let to = TimeoutChan::with_scheduler(Duration::from_millis(10), sched.clone());
        sched.advance(Duration::from_millis(10));

        // the timer outranks even a sync-ready normal arm while normal arms are open
        match Select::with_rng(seeded(3)).take(&pending).take(&ready).take(&to).try_sync() {
            Err(TrySelectError::Timeout(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        // the ready arm's value was not consumed by the losing race
        assert_eq!(ready.try_take(), Ok(Some(5)));
    }

    #[test]
    fn expired_timeout_does_not_mask_all_closed() {
        let sched = Arc::new(ManualScheduler::new());
        let closed = Chan::<u32>::new(1);
        closed.close_now();
        let to = TimeoutChan::with_scheduler(Duration::from_millis(10), sched.clone());
        sched.advance(Duration::from_millis(10));

        assert_eq!(
            Select::with_rng(seeded(4)).take(&closed).take(&to).try_sync(),
            Ok(Selected::Closed),
        );
    }

    #[test]
    fn async_select_wakes_on_put_and_cancels_loser() {
        let a = Chan::<u32>::new(0);
        let b = Chan::<u32>::new(0);
        let waker = CountWaker::new();
        let mut sel = Select::with_rng(seeded(5)).take(&a).take(&b);
        assert!(poll_with(&mut sel, &count_waker(&waker)).is_pending());

        // both arms registered: a rendezvous put is now eligible
        a.try_put(11).unwrap();
        assert!(waker.count() >= 1);
        match poll_with(&mut sel, &count_waker(&waker)) {
            std::task::Poll::Ready(Ok(Selected::Taken { index: 0, value: 11 })) => {}
            other => panic!("unexpected: {:?}", other),
        }

        // the losing arm's registration is gone: with no waiting consumer, a rendezvous put
        // on b no longer succeeds
        assert!(b.try_put(22).is_err());
    }

    #[test]
    fn select_timeout_race_cancels_channel_registration() {
        let sched = Arc::new(ManualScheduler::new());
        let ch = Chan::<u32>::new(0);
        let to = TimeoutChan::with_scheduler(Duration::from_millis(50), sched.clone());
        let waker = CountWaker::new();
        let mut sel = Select::with_rng(seeded(6)).take(&ch).take(&to);
        assert!(poll_with(&mut sel, &count_waker(&waker)).is_pending());

        sched.advance(Duration::from_millis(50));
        assert!(waker.count() >= 1);
        match poll_with(&mut sel, &count_waker(&waker)) {
            std::task::Poll::Ready(Err(SelectError::Timeout(_))) => {}
            other => panic!("unexpected: {:?}", other),
        }
        drop(sel);

        // the channel's take registration was cancelled; a later producer blocks as a pending
        // send and a fresh take still retrieves the value
        let mut put = ch.put(33);
        assert!(poll_once(&mut put).is_pending());
        assert_eq!(poll_once(&mut ch.take()), std::task::Poll::Ready(Ok(Some(33))));
        assert_eq!(poll_once(&mut put), std::task::Poll::Ready(Ok(())));
    }

    #[test]
    fn send_arm_rendezvous() {
        let ch = Chan::<u32>::new(0);
        let mut take = ch.take();
        assert!(poll_once(&mut take).is_pending());

        // a consumer is waiting, so the send arm is synchronously ready
        match Select::with_rng(seeded(8)).op_send(ch.send_op(77)).try_sync() {
            Ok(Selected::Sent { index: 0 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(poll_once(&mut take), std::task::Poll::Ready(Ok(Some(77))));
    }

    #[test]
    fn async_send_arm_waits_for_consumer() {
        let ch = Chan::<u32>::new(0);
        let waker = CountWaker::new();
        let mut sel = Select::with_rng(seeded(9)).op_send(ch.send_op(5));
        assert!(poll_with(&mut sel, &count_waker(&waker)).is_pending());

        let mut take = ch.take();
        assert!(poll_once(&mut take).is_pending());
        // the registered consumer opens the rendezvous window and wakes the select
        assert!(waker.count() >= 1);
        match poll_with(&mut sel, &count_waker(&waker)) {
            std::task::Poll::Ready(Ok(Selected::Sent { index: 0 })) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(poll_once(&mut take), std::task::Poll::Ready(Ok(Some(5))));
    }

    #[test]
    fn send_arm_on_closed_channel_counts_as_closed() {
        let ch = Chan::<u32>::new(0);
        ch.close_now();
        assert_eq!(
            Select::with_rng(seeded(10)).op_send(ch.send_op(1)).try_sync(),
            Ok(Selected::Closed),
        );
    }

    #[test]
    fn mixed_use_op_is_misuse() {
        let ch = Chan::<u32>::new(1);
        let mut op = ch.take_op();
        // polling the handle directly consumes its single use
        assert!(poll_once(&mut op).is_pending());
        match Select::with_rng(seeded(11)).op(op).try_sync() {
            Err(TrySelectError::Misuse(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn misuse_fails_async_select_immediately() {
        let ch = Chan::<u32>::new(1);
        let mut op = ch.take_op();
        assert!(poll_once(&mut op).is_pending());
        let other = Chan::<u32>::new(1);
        other.try_put(2).unwrap();
        let mut sel = Select::with_rng(seeded(12)).op(op).take(&other);
        match poll_once(&mut sel) {
            std::task::Poll::Ready(Err(SelectError::Misuse(_))) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn signal_arm_races_in_select() {
        let signal = SignalChan::new();
        let ch = Chan::<u32>::new(0);
        let waker = CountWaker::new();
        let mut sel = Select::with_rng(seeded(13)).take(&signal).take(&ch);
        assert!(poll_with(&mut sel, &count_waker(&waker)).is_pending());

        signal.trigger(99);
        assert!(waker.count() >= 1);
        match poll_with(&mut sel, &count_waker(&waker)) {
            std::task::Poll::Ready(Ok(Selected::Taken { index: 0, value: 99 })) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn expired_delay_is_a_normal_ready_arm() {
        let sched = Arc::new(ManualScheduler::new());
        let delay = DelayChan::with_scheduler(Duration::from_millis(10), Ok(4u32), sched.clone());
        let closed = Chan::<u32>::new(1);
        closed.close_now();
        sched.advance(Duration::from_millis(10));

        // unlike a timeout, an expired delay is a real one-shot outcome: it wins even when
        // every other operand is closed
        assert_eq!(
            Select::with_rng(seeded(14)).take(&delay).take(&closed).try_sync(),
            Ok(Selected::Taken { index: 0, value: 4 }),
        );
    }

    #[test]
    fn delay_error_fires_as_first_error() {
        let sched = Arc::new(ManualScheduler::new());
        let delay: DelayChan<u32> = DelayChan::with_scheduler(
            Duration::from_millis(10),
            Err(TimeoutError::new("delayed boom")),
            sched.clone(),
        );
        let open = Chan::<u32>::new(1);
        sched.advance(Duration::from_millis(10));

        match Select::with_rng(seeded(15)).take(&delay).take(&open).try_sync() {
            Err(TrySelectError::Timeout(e)) => assert_eq!(e.message(), "delayed boom"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn skip_preserves_arm_indices() {
        let ch = ready_chan(6);
        match Select::with_rng(seeded(16)).skip().take(&ch).try_sync() {
            Ok(Selected::Taken { index: 1, value: 6 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn dropping_pending_select_cancels_registrations() {
        let ch = Chan::<u32>::new(0);
        let sel = {
            let mut sel = Select::with_rng(seeded(17)).take(&ch);
            assert!(poll_once(&mut sel).is_pending());
            sel
        };
        drop(sel);
        // no live consumer remains, so a rendezvous put is not eligible
        assert!(ch.try_put(1).is_err());
    }
}
