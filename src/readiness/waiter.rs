use super::observe::{ChangeBatch, ChangeSource, Subscription};
use super::probe::{ModelProbe, ProbeOutcome};
use super::schedule::PollSchedule;
use super::signal::{ReadinessSignal, SignalSender, SignalState};
use super::throttle::ErrorThrottle;
use crate::config::WaiterConfig;
use crate::error::ReadinessError;
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Idle,
    Waiting,
    Ready,
}

/// Which mechanism noticed the model first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    /// Present when the wait was requested.
    Immediate,
    /// A structural change woke the attempt.
    Observation,
    /// A scheduled poll, with the phase it fell in.
    Poll { phase: usize, interval: Duration },
}

#[derive(Debug, Clone)]
pub struct WaiterSnapshot {
    pub state: WaiterState,
    pub attempts: u64,
    pub checks: u64,
    pub transient_errors: u64,
    pub observation_triggers: u64,
    pub timeouts: u64,
    /// A change subscription is currently live.
    pub observing: bool,
    pub resolved_by: Option<ResolvedBy>,
}

enum State<M> {
    Idle,
    Waiting {
        attempt: u64,
        signal: ReadinessSignal<M>,
    },
    Ready {
        model: M,
        by: ResolvedBy,
    },
}

#[derive(Default)]
struct AtomicStats {
    attempts: AtomicU64,
    checks: AtomicU64,
    transient_errors: AtomicU64,
    observation_triggers: AtomicU64,
    timeouts: AtomicU64,
    observing: AtomicBool,
}

struct Shared<M> {
    schedule: PollSchedule,
    error_log_every: u64,
    probe: Arc<dyn ModelProbe<M>>,
    changes: Option<Arc<dyn ChangeSource>>,
    state: Mutex<State<M>>,
    stats: AtomicStats,
}

/// Resolves once the host model exists, sharing one wait among all callers.
///
/// - `Idle -> Waiting -> Ready` on success; `Ready` is cached for the life of the waiter
/// - `Waiting -> Idle` on timeout or probe failure, so the next call starts over
/// - at most one observation subscription and one poll loop exist at any time
///
/// Cloning is cheap and every clone shares the same state; hand clones to
/// consumers instead of keeping a global.
pub struct ModelReadinessWaiter<M> {
    shared: Arc<Shared<M>>,
}

impl<M> Clone for ModelReadinessWaiter<M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M> fmt::Debug for ModelReadinessWaiter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelReadinessWaiter")
            .field("schedule", &self.shared.schedule)
            .field("observing", &self.shared.changes.is_some())
            .finish()
    }
}

pub struct ModelReadinessWaiterBuilder<M> {
    config: WaiterConfig,
    schedule: Option<PollSchedule>,
    probe: Option<Arc<dyn ModelProbe<M>>>,
    changes: Option<Arc<dyn ChangeSource>>,
}

impl<M: Clone + Send + Sync + 'static> ModelReadinessWaiterBuilder<M> {
    pub fn new() -> Self {
        Self {
            config: WaiterConfig::default(),
            schedule: None,
            probe: None,
            changes: None,
        }
    }

    pub fn config(mut self, config: WaiterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an explicit schedule instead of the two-phase one derived from the config.
    pub fn schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn probe(self, probe: impl ModelProbe<M> + 'static) -> Self {
        self.probe_arc(Arc::new(probe))
    }

    pub fn probe_arc(mut self, probe: Arc<dyn ModelProbe<M>>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn change_source(self, source: impl ChangeSource + 'static) -> Self {
        self.change_source_arc(Arc::new(source))
    }

    pub fn change_source_arc(mut self, source: Arc<dyn ChangeSource>) -> Self {
        self.changes = Some(source);
        self
    }

    pub fn build(self) -> Result<ModelReadinessWaiter<M>> {
        let probe = self.probe.ok_or_else(|| {
            Error::configuration_with_context(
                "a model probe is required",
                crate::ErrorContext::new()
                    .with_field_path("probe")
                    .with_source("readiness_waiter"),
            )
        })?;
        let schedule = match self.schedule {
            Some(s) => {
                self.config.validate_error_log_every()?;
                s
            }
            None => self.config.schedule()?,
        };
        Ok(ModelReadinessWaiter {
            shared: Arc::new(Shared {
                schedule,
                error_log_every: self.config.error_log_every,
                probe,
                changes: self.changes,
                state: Mutex::new(State::Idle),
                stats: AtomicStats::default(),
            }),
        })
    }
}

impl<M: Clone + Send + Sync + 'static> Default for ModelReadinessWaiterBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send + Sync + 'static> ModelReadinessWaiter<M> {
    pub fn builder() -> ModelReadinessWaiterBuilder<M> {
        ModelReadinessWaiterBuilder::new()
    }

    /// Waiter with the default config and no change observation.
    pub fn new(probe: impl ModelProbe<M> + 'static) -> Result<Self> {
        Self::builder().probe(probe).build()
    }

    /// Signal that resolves once the model exists.
    ///
    /// Returns an already-resolved signal when the model is cached or present
    /// right now, the in-flight signal when a wait is running, and otherwise
    /// starts a new attempt on the current tokio runtime.
    pub fn wait_for_ready(&self) -> ReadinessSignal<M> {
        match &*self.shared.lock() {
            State::Ready { model, .. } => return ReadinessSignal::resolved(model.clone()),
            State::Waiting { signal, .. } => return signal.clone(),
            State::Idle => {}
        }

        // probe runs unlocked: it is foreign code
        let immediate = self.shared.check("immediate");

        let mut state = self.shared.lock();
        match &*state {
            State::Ready { model, .. } => return ReadinessSignal::resolved(model.clone()),
            State::Waiting { signal, .. } => return signal.clone(),
            State::Idle => {}
        }
        match immediate {
            Check::Ready(model) => {
                tracing::debug!("host model already available");
                *state = State::Ready {
                    model: model.clone(),
                    by: ResolvedBy::Immediate,
                };
                return ReadinessSignal::resolved(model);
            }
            Check::Failed(err) => return ReadinessSignal::failed(err),
            Check::Pending => {}
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                return ReadinessSignal::failed(ReadinessError::Runtime {
                    message: format!("no tokio runtime to wait on: {}", e),
                })
            }
        };

        let attempt = self.shared.stats.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, signal) = ReadinessSignal::pending();
        *state = State::Waiting {
            attempt,
            signal: signal.clone(),
        };
        drop(state);

        // subscribe before returning so no change published after this call is missed
        let wake = Arc::new(Notify::new());
        let subscription = self.shared.observe(&wake);

        tracing::info!(
            attempt,
            timeout_ms = self.shared.schedule.timeout().as_millis() as u64,
            "waiting for host model"
        );
        let guard = AttemptGuard {
            shared: Arc::clone(&self.shared),
            attempt,
            tx,
            subscription,
        };
        runtime.spawn(run_attempt(guard, wake));
        signal
    }

    /// Run `on_ready` with the model, right away if it is already known.
    ///
    /// An error from `on_ready` comes back as [`Error::Callback`].
    pub async fn when_ready<F, R>(&self, on_ready: F) -> Result<R>
    where
        F: FnOnce(M) -> anyhow::Result<R>,
    {
        let model = match self.sync_snapshot() {
            Some(model) => model,
            None => self.wait_for_ready().await?,
        };
        on_ready(model).map_err(Error::Callback)
    }

    /// The model if it is known without waiting: the cached value, else the
    /// probe's direct reference. Never schedules anything.
    pub fn sync_snapshot(&self) -> Option<M> {
        if let State::Ready { model, .. } = &*self.shared.lock() {
            return Some(model.clone());
        }
        self.shared.probe.peek()
    }

    pub fn state(&self) -> WaiterState {
        match &*self.shared.lock() {
            State::Idle => WaiterState::Idle,
            State::Waiting { .. } => WaiterState::Waiting,
            State::Ready { .. } => WaiterState::Ready,
        }
    }

    pub fn schedule(&self) -> &PollSchedule {
        &self.shared.schedule
    }

    pub fn snapshot(&self) -> WaiterSnapshot {
        let (state, resolved_by) = match &*self.shared.lock() {
            State::Idle => (WaiterState::Idle, None),
            State::Waiting { .. } => (WaiterState::Waiting, None),
            State::Ready { by, .. } => (WaiterState::Ready, Some(*by)),
        };
        let stats = &self.shared.stats;
        WaiterSnapshot {
            state,
            attempts: stats.attempts.load(Ordering::Relaxed),
            checks: stats.checks.load(Ordering::Relaxed),
            transient_errors: stats.transient_errors.load(Ordering::Relaxed),
            observation_triggers: stats.observation_triggers.load(Ordering::Relaxed),
            timeouts: stats.timeouts.load(Ordering::Relaxed),
            observing: stats.observing.load(Ordering::Relaxed),
            resolved_by,
        }
    }
}

type Outcome<M> = std::result::Result<(M, ResolvedBy), ReadinessError>;

enum Check<M> {
    Ready(M),
    Pending,
    Failed(ReadinessError),
}

impl<M: Clone + Send + Sync + 'static> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, State<M>> {
        // probes never run under this lock, so a poisoned guard still holds valid state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to script insertions, waking `wake` for each batch that adds one.
    fn observe(&self, wake: &Arc<Notify>) -> Option<Box<dyn Subscription>> {
        let source = self.changes.as_ref()?;
        let wake = Arc::clone(wake);
        let callback = Arc::new(move |batch: &ChangeBatch| {
            if batch.adds_script() {
                wake.notify_one();
            }
        });
        let subscription = source.observe(callback);
        self.stats.observing.store(true, Ordering::Relaxed);
        Some(subscription)
    }

    fn check(&self, trigger: &str) -> Check<M> {
        self.check_with(trigger, None)
    }

    fn check_with(&self, trigger: &str, throttle: Option<&mut ErrorThrottle>) -> Check<M> {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);
        match self.probe.probe() {
            Ok(ProbeOutcome::Ready(model)) => Check::Ready(model),
            Ok(ProbeOutcome::NotReady) => Check::Pending,
            Ok(ProbeOutcome::Transient(err)) => {
                self.stats.transient_errors.fetch_add(1, Ordering::Relaxed);
                if let Some(count) = throttle.and_then(|t| t.record(&err.message)) {
                    tracing::debug!(count, trigger, error = %err, "host model probe error");
                }
                Check::Pending
            }
            Err(err) => {
                tracing::warn!(trigger, error = %err, "host model probe failed");
                Check::Failed(ReadinessError::Probe {
                    message: err.message,
                })
            }
        }
    }

    /// Move out of `Waiting` for `attempt`. Returns false if someone else already did.
    fn settle(&self, attempt: u64, outcome: &Outcome<M>) -> bool {
        let mut state = self.lock();
        match &*state {
            State::Waiting { attempt: current, .. } if *current == attempt => {}
            _ => return false,
        }
        *state = match outcome {
            Ok((model, by)) => State::Ready {
                model: model.clone(),
                by: *by,
            },
            Err(_) => State::Idle,
        };
        true
    }
}

/// Owns the attempt's write side and change subscription; disposes the
/// subscription and puts the waiter back to `Idle` if the attempt is dropped
/// before it settles.
struct AttemptGuard<M: Clone + Send + Sync + 'static> {
    shared: Arc<Shared<M>>,
    attempt: u64,
    tx: SignalSender<M>,
    subscription: Option<Box<dyn Subscription>>,
}

impl<M: Clone + Send + Sync + 'static> AttemptGuard<M> {
    fn finish(&mut self, outcome: Outcome<M>) {
        if let Some(sub) = self.subscription.take() {
            sub.dispose();
            self.shared.stats.observing.store(false, Ordering::Relaxed);
        }
        // state first, so callers woken by the signal see a consistent snapshot
        if !self.shared.settle(self.attempt, &outcome) {
            return;
        }
        let state = match outcome {
            Ok((model, _)) => SignalState::Resolved(model),
            Err(err) => SignalState::Failed(err),
        };
        self.tx.settle(state);
    }
}

impl<M: Clone + Send + Sync + 'static> Drop for AttemptGuard<M> {
    fn drop(&mut self) {
        self.finish(Err(ReadinessError::Runtime {
            message: "readiness attempt dropped before settling".to_string(),
        }));
    }
}

async fn run_attempt<M: Clone + Send + Sync + 'static>(
    mut guard: AttemptGuard<M>,
    wake: Arc<Notify>,
) {
    let shared = Arc::clone(&guard.shared);
    let outcome = poll_until_ready(&shared, &wake, guard.attempt).await;

    match &outcome {
        Ok((_, by)) => {
            tracing::info!(attempt = guard.attempt, resolved_by = ?by, "host model ready")
        }
        Err(err) if err.is_timeout() => {
            shared.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            tracing::info!(attempt = guard.attempt, error = %err, "gave up waiting for host model");
        }
        Err(_) => {}
    }
    guard.finish(outcome);
}

async fn poll_until_ready<M: Clone + Send + Sync + 'static>(
    shared: &Shared<M>,
    wake: &Notify,
    attempt: u64,
) -> Outcome<M> {
    let schedule = &shared.schedule;
    let started = Instant::now();
    let mut throttle = ErrorThrottle::new(shared.error_log_every);
    let mut tick = Duration::ZERO;

    loop {
        let Some(next) = schedule.next_tick(tick) else {
            let elapsed = started.elapsed();
            return Err(ReadinessError::Timeout {
                timeout: schedule.timeout(),
                elapsed,
            });
        };

        let polled = tokio::select! {
            _ = tokio::time::sleep_until(started + next) => true,
            _ = wake.notified() => false,
        };

        let by = if polled {
            let slot = schedule.phase_at(tick);
            tick = next;
            ResolvedBy::Poll {
                phase: slot.index,
                interval: slot.interval,
            }
        } else {
            shared
                .stats
                .observation_triggers
                .fetch_add(1, Ordering::Relaxed);
            tracing::debug!(attempt, "document change, re-checking host model");
            ResolvedBy::Observation
        };

        let trigger = if polled { "poll" } else { "observation" };
        match shared.check_with(trigger, Some(&mut throttle)) {
            Check::Ready(model) => return Ok((model, by)),
            Check::Failed(err) => return Err(err),
            Check::Pending => {}
        }
    }
}
