// scheduler adapter boundary.
//
// the special channels never talk to a timer facility directly: they arm and disarm timers only
// through this trait, and only while someone is actually waiting on them. the production
// implementation rides on tokio's timer; the manual implementation gives tests a virtual clock so
// nothing depends on wall-clock timing.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicU64, Ordering::Relaxed},
        Arc, Mutex, OnceLock,
    },
    time::{Duration, Instant},
};


/// Callback invoked when a timer elapses.
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// Handle to a pending timer, used to cancel it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TimerId(u64);

/// The timer facility consumed by the special channels
///
/// The contract is deliberately small: a monotonic non-decreasing [`now`](Self::now), one-shot
/// timers, and cancellation. The core arms a timer only while a special channel has at least one
/// registered consumer, and cancels it when the last consumer leaves.
pub trait Scheduler: Send + Sync + 'static {
    /// The current instant. Monotonic and non-decreasing.
    fn now(&self) -> Instant;

    /// Arrange for `callback` to run once `deadline` is reached. A deadline already in the past
    /// fires as soon as possible.
    fn set_timer(&self, deadline: Instant, callback: TimerCallback) -> TimerId;

    /// Cancel a pending timer. Idempotent; cancelling an already-fired timer is a no-op.
    fn cancel_timer(&self, id: TimerId);
}

/// The process-wide default scheduler (tokio-backed), created on first use.
pub fn default_scheduler() -> Arc<dyn Scheduler> {
    static DEFAULT: OnceLock<Arc<TokioScheduler>> = OnceLock::new();
    let scheduler = Arc::clone(DEFAULT.get_or_init(|| Arc::new(TokioScheduler::new())));
    scheduler
}


/// Production [`Scheduler`] backed by the tokio runtime's timer
///
/// Each timer is a spawned task sleeping until its deadline; cancellation aborts the task.
/// Setting a timer therefore requires an ambient tokio runtime context.
pub struct TokioScheduler {
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, tokio::task::AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        TokioScheduler {
            next_id: AtomicU64::new(0),
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn set_timer(&self, deadline: Instant, callback: TimerCallback) -> TimerId {
        let id = self.next_id.fetch_add(1, Relaxed);
        let tasks = Arc::clone(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            tasks.lock().unwrap().remove(&id);
            callback();
        });
        self.tasks.lock().unwrap().insert(id, handle.abort_handle());
        TimerId(id)
    }

    fn cancel_timer(&self, id: TimerId) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(&id.0) {
            handle.abort();
        }
    }
}


/// Manually-advanced [`Scheduler`] with a virtual clock, for deterministic tests
///
/// Time stands still until [`advance`](Self::advance) is called; advancing fires every timer
/// whose deadline is reached, in deadline order.
pub struct ManualScheduler {
    inner: Mutex<ManualInner>,
}

struct ManualInner {
    now: Instant,
    next_id: u64,
    // ordered by (deadline, id) so ties fire in arming order
    timers: BTreeMap<(Instant, u64), TimerCallback>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        ManualScheduler {
            inner: Mutex::new(ManualInner {
                now: Instant::now(),
                next_id: 0,
                timers: BTreeMap::new(),
            }),
        }
    }

    /// Advance the virtual clock, firing every timer whose deadline is reached.
    ///
    /// Callbacks run outside the scheduler's lock, so they may freely arm or cancel timers.
    pub fn advance(&self, by: Duration) {
        let target = {
            let mut inner = self.inner.lock().unwrap();
            inner.now += by;
            inner.now
        };
        loop {
            let due = {
                let mut inner = self.inner.lock().unwrap();
                match inner.timers.keys().next().copied() {
                    Some(key) if key.0 <= target => inner.timers.remove(&key),
                    _ => None,
                }
            };
            match due {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    /// Number of timers currently armed.
    pub fn pending_timers(&self) -> usize {
        self.inner.lock().unwrap().timers.len()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap().now
    }

    fn set_timer(&self, deadline: Instant, callback: TimerCallback) -> TimerId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        // clamp past deadlines to now so they fire on the next advance
        let deadline = deadline.max(inner.now);
        inner.timers.insert((deadline, id), callback);
        TimerId(id)
    }

    fn cancel_timer(&self, id: TimerId) {
        let mut inner = self.inner.lock().unwrap();
        let key = inner.timers.keys().find(|(_, i)| *i == id.0).copied();
        if let Some(key) = key {
            inner.timers.remove(&key);
        }
    }
}
