//! Resource ownership and teardown.
//!
//! Everything the pipeline acquires that outlives a single callback lives
//! here: the capture timer, global input listeners and the camera stream.
//! [`ResourceCounters`] instruments those resources so tests can assert that
//! timers and requests never overlap and that teardown releases each
//! resource exactly once.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::device::MediaStream;

/// Shared instrumentation counters.
#[derive(Debug, Default)]
pub struct ResourceCounters {
    active_timers: AtomicUsize,
    peak_timers: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    requests_dispatched: AtomicU64,
    asset_loads: AtomicU64,
    sessions_ended: AtomicU64,
    streams_stopped: AtomicU64,
    listeners_removed: AtomicU64,
    teardowns: AtomicU64,
}

/// Point-in-time copy of [`ResourceCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub active_timers: usize,
    pub peak_timers: usize,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub requests_dispatched: u64,
    pub asset_loads: u64,
    pub sessions_ended: u64,
    pub streams_stopped: u64,
    pub listeners_removed: u64,
    pub teardowns: u64,
}

impl ResourceCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn timer_started(&self) {
        let now = self.active_timers.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_timers.fetch_max(now, Ordering::SeqCst);
    }

    fn timer_stopped(&self) {
        self.active_timers.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn asset_load_started(&self) {
        self.asset_loads.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn session_ended(&self) {
        self.sessions_ended.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn teardown_performed(&self) {
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            active_timers: self.active_timers.load(Ordering::SeqCst),
            peak_timers: self.peak_timers.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            requests_dispatched: self.requests_dispatched.load(Ordering::SeqCst),
            asset_loads: self.asset_loads.load(Ordering::SeqCst),
            sessions_ended: self.sessions_ended.load(Ordering::SeqCst),
            streams_stopped: self.streams_stopped.load(Ordering::SeqCst),
            listeners_removed: self.listeners_removed.load(Ordering::SeqCst),
            teardowns: self.teardowns.load(Ordering::SeqCst),
        }
    }
}

/// Marks one analysis request as in flight until dropped.
///
/// The guard moves into the request task, so an aborted task still releases it.
#[derive(Debug)]
pub struct InFlightGuard {
    counters: Arc<ResourceCounters>,
}

impl InFlightGuard {
    pub fn acquire(counters: &Arc<ResourceCounters>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        counters.requests_dispatched.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A spawned timer task that feeds events into the pipeline.
///
/// Dropping the timer aborts the task.
#[derive(Debug)]
pub struct ManagedTimer {
    handle: JoinHandle<()>,
    counters: Option<Arc<ResourceCounters>>,
}

impl ManagedTimer {
    /// Fire `event` every `period`, first after one full period.
    pub fn repeating<E, F>(period: Duration, events: mpsc::UnboundedSender<E>, event: F) -> Self
    where
        E: Send + 'static,
        F: Fn() -> E + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(event()).is_err() {
                    break;
                }
            }
        });
        Self {
            handle,
            counters: None,
        }
    }

    /// Fire `event` once after `delay`.
    pub fn once<E>(delay: Duration, events: mpsc::UnboundedSender<E>, event: E) -> Self
    where
        E: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = events.send(event);
        });
        Self {
            handle,
            counters: None,
        }
    }

    /// Count this timer in `active_timers` for as long as it is alive.
    pub fn counted(mut self, counters: &Arc<ResourceCounters>) -> Self {
        counters.timer_started();
        self.counters = Some(Arc::clone(counters));
        self
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ManagedTimer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(counters) = self.counters.take() {
            counters.timer_stopped();
        }
    }
}

/// Global input listeners the pipeline subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerKind {
    Resize,
    Zoom,
    Select,
}

/// Tracks which listeners are registered so none survive teardown.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    registered: BTreeSet<ListenerKind>,
}

impl ListenerRegistry {
    /// Returns `false` if the listener was already registered.
    pub fn register(&mut self, kind: ListenerKind) -> bool {
        self.registered.insert(kind)
    }

    pub fn is_registered(&self, kind: ListenerKind) -> bool {
        self.registered.contains(&kind)
    }

    /// Remove every listener, returning how many were removed.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.registered.len();
        self.registered.clear();
        removed
    }
}

/// Flag checked by late callbacks before they touch shared state.
#[derive(Debug, Clone)]
pub struct Relevance(Arc<AtomicBool>);

impl Relevance {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_relevant(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn revoke(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Default for Relevance {
    fn default() -> Self {
        Self::new()
    }
}

/// What a teardown call actually released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub timer_cancelled: bool,
    pub stream_stopped: bool,
    pub listeners_removed: usize,
    /// `false` when teardown had already run.
    pub performed: bool,
}

/// Owner of the capture timer, listeners and camera stream.
pub struct Lifecycle {
    counters: Arc<ResourceCounters>,
    capture_timer: Option<ManagedTimer>,
    listeners: ListenerRegistry,
    media: Option<Box<dyn MediaStream>>,
    relevance: Relevance,
    torn_down: bool,
}

impl Lifecycle {
    pub fn new(counters: Arc<ResourceCounters>) -> Self {
        Self {
            counters,
            capture_timer: None,
            listeners: ListenerRegistry::default(),
            media: None,
            relevance: Relevance::new(),
            torn_down: false,
        }
    }

    pub fn counters(&self) -> &Arc<ResourceCounters> {
        &self.counters
    }

    pub fn relevance(&self) -> Relevance {
        self.relevance.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn attach_media(&mut self, stream: Box<dyn MediaStream>) {
        if let Some(mut previous) = self.media.replace(stream) {
            previous.stop();
            self.counters.streams_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn has_capture_timer(&self) -> bool {
        self.capture_timer.is_some()
    }

    /// Install the capture timer unless one exists. The factory only runs
    /// when the slot is empty, so a duplicate timer is never even spawned.
    pub fn install_capture_timer(&mut self, make: impl FnOnce() -> ManagedTimer) -> bool {
        if self.torn_down || self.capture_timer.is_some() {
            return false;
        }
        self.capture_timer = Some(make().counted(&self.counters));
        true
    }

    pub fn cancel_capture_timer(&mut self) -> bool {
        match self.capture_timer.take() {
            Some(timer) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    /// Release everything. Safe to call repeatedly and before initialization.
    pub fn teardown(&mut self) -> TeardownReport {
        if self.torn_down {
            return TeardownReport::default();
        }
        self.torn_down = true;
        self.relevance.revoke();

        let timer_cancelled = self.cancel_capture_timer();

        let stream_stopped = match self.media.take() {
            Some(mut stream) => {
                stream.stop();
                self.counters.streams_stopped.fetch_add(1, Ordering::SeqCst);
                true
            }
            None => false,
        };

        let listeners_removed = self.listeners.remove_all();
        self.counters
            .listeners_removed
            .fetch_add(listeners_removed as u64, Ordering::SeqCst);

        TeardownReport {
            timer_cancelled,
            stream_stopped,
            listeners_removed,
            performed: true,
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        self.teardown();
    }
}
