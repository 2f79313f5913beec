//! The registry of live quiz sessions and their countdowns.
//!
//! Each [`QuizSession`] lives in exactly one slot, and every transition runs
//! under the registry lock. A timed attempt gets a countdown task that ticks
//! once per second; the task is aborted as soon as the session stops
//! needing it. Ticks carry the attempt number, so a tick that slips in
//! after an abort is ignored by the session.
//!
//! Every call that reaches a session marks it active. A sweeper task closes
//! sessions left idle for longer than the configured window, unless their
//! countdown is still running.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use mathdict_core::{DictError, QuizSession, Result, SessionView, TickOutcome};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::websocket::{EventBroadcaster, SessionEvent};

/// Length of one countdown step.
const TICK: Duration = Duration::from_secs(1);

/// Shortest pause between two idle sweeps.
const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

type Slots = Mutex<HashMap<Uuid, SessionSlot>>;

#[derive(Debug)]
struct SessionSlot {
    session: QuizSession,
    user_id: Option<Uuid>,
    timer: Option<JoinHandle<()>>,
    last_active: Instant,
}

impl SessionSlot {
    fn new(user_id: Option<Uuid>) -> Self {
        Self {
            session: QuizSession::default(),
            user_id,
            timer: None,
            last_active: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn is_idle(&self, now: Instant, idle: Duration) -> bool {
        self.timer.is_none() && now.saturating_duration_since(self.last_active) >= idle
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Aborts the countdown once the session no longer needs it.
    fn sync_timer(&mut self) {
        if !self.session.timer_active() {
            self.stop_timer();
        }
    }
}

/// Open quiz sessions, keyed by id.
///
/// Cloning shares the same sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    slots: Arc<Mutex<HashMap<Uuid, SessionSlot>>>,
    events: EventBroadcaster,
}

impl SessionRegistry {
    /// Creates an empty registry publishing to `events`.
    #[must_use]
    pub fn new(events: EventBroadcaster) -> Self {
        Self {
            slots: Arc::default(),
            events,
        }
    }

    /// The broadcaster session events go to.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Number of open sessions.
    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    /// Returns `true` if no session is open.
    pub async fn is_empty(&self) -> bool {
        self.slots.lock().await.is_empty()
    }

    /// Opens a session in the `Browsing` phase for `user_id`.
    pub async fn create(&self, user_id: Option<Uuid>) -> (Uuid, SessionView) {
        let id = Uuid::new_v4();
        let slot = SessionSlot::new(user_id);
        let view = slot.session.view();
        self.slots.lock().await.insert(id, slot);
        info!(session_id = %id, "session created");
        (id, view)
    }

    /// Closes a session and stops its countdown.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut slot = self
            .slots
            .lock()
            .await
            .remove(&id)
            .ok_or(DictError::SessionNotFound { id })?;
        slot.stop_timer();
        info!(session_id = %id, "session closed");
        Ok(())
    }

    /// Snapshot of a session.
    pub async fn view(&self, id: Uuid) -> Result<SessionView> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&id).ok_or(DictError::SessionNotFound { id })?;
        slot.touch();
        Ok(slot.session.view())
    }

    /// The user a session belongs to.
    pub async fn user_id(&self, id: Uuid) -> Result<Option<Uuid>> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&id).ok_or(DictError::SessionNotFound { id })?;
        slot.touch();
        Ok(slot.user_id)
    }

    /// Applies `f` to a session under the registry lock and returns its
    /// output with the resulting snapshot.
    ///
    /// The countdown is stopped whenever the session leaves a timed attempt,
    /// even when `f` fails.
    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut QuizSession) -> Result<T> + Send,
    ) -> Result<(T, SessionView)> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&id).ok_or(DictError::SessionNotFound { id })?;
        slot.touch();
        let output = f(&mut slot.session);
        slot.sync_timer();
        output.map(|value| (value, slot.session.view()))
    }

    /// Starts an attempt and, for a timed quiz, its countdown.
    pub async fn start(&self, id: Uuid) -> Result<SessionView> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(&id).ok_or(DictError::SessionNotFound { id })?;
        slot.touch();
        slot.session.start()?;
        slot.stop_timer();

        let view = slot.session.view();
        if slot.session.timer_active() {
            slot.timer = Some(self.spawn_countdown(id, slot.session.attempt_id()));
        }
        drop(slots);

        self.events.send(SessionEvent::started(
            id,
            view.attempt,
            view.question_count,
            view.remaining_seconds,
        ));
        Ok(view)
    }

    fn spawn_countdown(&self, id: Uuid, attempt: u64) -> JoinHandle<()> {
        let registry = self.clone();
        debug!(session_id = %id, attempt, "countdown started");

        tokio::spawn(async move {
            let mut ticker = interval(TICK);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let (outcome, results) = {
                    let mut slots = registry.slots.lock().await;
                    let Some(slot) = slots.get_mut(&id) else {
                        break;
                    };
                    let outcome = slot.session.tick(attempt);
                    if !matches!(outcome, TickOutcome::Running { .. }) {
                        slot.timer = None;
                    }
                    (outcome, slot.session.results().cloned())
                };

                match outcome {
                    TickOutcome::Running { remaining_seconds } => {
                        registry
                            .events
                            .send(SessionEvent::tick(id, attempt, remaining_seconds));
                    }
                    TickOutcome::Expired => {
                        registry.events.send(SessionEvent::tick(id, attempt, 0));
                        if let Some(results) = results {
                            registry
                                .events
                                .send(SessionEvent::completed(id, attempt, &results));
                        }
                        break;
                    }
                    TickOutcome::Ignored => break,
                }
            }
            debug!(session_id = %id, attempt, "countdown finished");
        })
    }

    /// Closes every session idle for at least `idle` and returns how many
    /// were closed. Sessions with a running countdown are kept.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        evict_idle(&self.slots, idle).await
    }

    /// Spawns the task that closes idle sessions.
    ///
    /// The sweep runs every quarter of `idle`, at most once per second. The
    /// task ends on its own once the registry is dropped.
    pub fn spawn_sweeper(&self, idle: Duration) -> JoinHandle<()> {
        let slots: Weak<Slots> = Arc::downgrade(&self.slots);
        let period = (idle / 4).max(MIN_SWEEP_PERIOD);
        info!(idle_secs = idle.as_secs(), "session sweeper started");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(slots) = slots.upgrade() else {
                    break;
                };
                evict_idle(&slots, idle).await;
            }
            debug!("session sweeper stopped");
        })
    }

    /// Returns `true` if the session has a running countdown task.
    pub async fn has_timer(&self, id: Uuid) -> bool {
        self.slots
            .lock()
            .await
            .get(&id)
            .is_some_and(|slot| slot.timer.is_some())
    }
}

async fn evict_idle(slots: &Slots, idle: Duration) -> usize {
    let now = Instant::now();
    let mut slots = slots.lock().await;
    let before = slots.len();
    slots.retain(|id, slot| {
        if slot.is_idle(now, idle) {
            slot.stop_timer();
            info!(session_id = %id, "idle session closed");
            false
        } else {
            true
        }
    });
    before - slots.len()
}
