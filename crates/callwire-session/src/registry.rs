//! In-memory session registry.
//!
//! Lock layout:
//! - `sessions` (a `std::sync::RwLock`) guards only the code → slot map. It
//!   is held for brief `HashMap` operations and never across `.await`.
//! - Each slot carries its own `tokio::sync::RwLock<SessionState>`. All
//!   mutations of one session (turns, phase, intelligence, listeners) take
//!   the write half, so they are serialized in arrival order; reads take the
//!   read half. Different sessions never contend on the same lock.
//!
//! Fan-out happens under the session's write lock but only via
//! `try_send` into each listener's bounded queue, so a slow listener cannot
//! stall the mutating path. The socket write happens in the listener's own
//! task.
//!
//! Eviction removes a slot from the map and marks its state `evicted`. Any
//! operation that fetched the slot before removal sees the mark after
//! acquiring the lock and retries against a fresh slot.

use crate::lifecycle::{advance, transition, PhaseOutcome, PhaseTrigger};
use crate::merge::take_unseen;
use callwire_types::{IntelligenceRef, Phase, SessionCode, Turn};
use chrono::Utc;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock as AsyncRwLock};
use tokio::time::Instant;
use uuid::Uuid;

/// Default capacity of a listener's delivery queue.
pub const DEFAULT_LISTENER_QUEUE: usize = 256;

/// Immutable copy of a session's observable state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    #[serde(rename = "sessionId")]
    pub code: SessionCode,
    pub history: Vec<Turn>,
    pub phase: Phase,
    pub intelligence: Option<IntelligenceRef>,
}

/// State delta pushed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Full state delivered once when a listener subscribes.
    Joined(SessionSnapshot),
    /// Conversation turns: either newly accepted ones or, in reply to a
    /// poll, the full history.
    History(Vec<Turn>),
    /// Newly accepted turns from the assistant's opening batch.
    Intro(Vec<Turn>),
    /// The call phase moved forward.
    PhaseChanged(Phase),
    /// A post-call analysis became available.
    IntelligenceReady(IntelligenceRef),
}

/// Fan-out target registered with a session.
#[derive(Debug, Clone)]
pub struct Listener {
    id: Uuid,
    tx: mpsc::Sender<SessionUpdate>,
}

impl Listener {
    pub fn new(tx: mpsc::Sender<SessionUpdate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
        }
    }

    /// Creates a listener together with the receiving half of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionUpdate>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Lightweight reference to a session. Holds no session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    code: SessionCode,
    created: bool,
}

impl SessionHandle {
    pub fn code(&self) -> &SessionCode {
        &self.code
    }

    /// Whether this call created the session.
    pub fn is_new(&self) -> bool {
        self.created
    }
}

/// Result of [`SessionRegistry::set_intelligence_ref`].
#[derive(Debug, Clone, PartialEq)]
pub enum IntelligenceOutcome {
    Set,
    /// A reference was already present and was kept.
    AlreadySet { existing: String },
}

#[derive(Debug)]
struct SessionState {
    history: Vec<Turn>,
    seen: HashSet<String>,
    next_sequence: u64,
    phase: Phase,
    intelligence: Option<IntelligenceRef>,
    listeners: HashMap<Uuid, mpsc::Sender<SessionUpdate>>,
    evicted: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            history: Vec::new(),
            seen: HashSet::new(),
            next_sequence: 0,
            phase: Phase::Ringing,
            intelligence: None,
            listeners: HashMap::new(),
            evicted: false,
        }
    }

    fn snapshot(&self, code: &SessionCode) -> SessionSnapshot {
        SessionSnapshot {
            code: code.clone(),
            history: self.history.clone(),
            phase: self.phase,
            intelligence: self.intelligence.clone(),
        }
    }

    /// Accepts unseen turns, stamping arrival order, and returns them.
    fn accept(&mut self, incoming: Vec<Turn>) -> Vec<Turn> {
        let received_at = Utc::now();
        let mut added = take_unseen(&mut self.seen, incoming);
        for turn in &mut added {
            turn.sequence = Some(self.next_sequence);
            turn.received_at = Some(received_at);
            self.next_sequence += 1;
        }
        self.history.extend(added.iter().cloned());
        added
    }

    fn notify(&mut self, code: &SessionCode, update: SessionUpdate) {
        self.listeners.retain(|id, tx| match tx.try_send(update.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    session = %code,
                    listener = %id,
                    "dropping session update for slow listener"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    session = %code,
                    listener = %id,
                    "removing listener with closed queue"
                );
                false
            }
        });
    }
}

#[derive(Debug)]
struct SessionSlot {
    state: Arc<AsyncRwLock<SessionState>>,
    last_activity: Mutex<Instant>,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: Arc::new(AsyncRwLock::new(SessionState::new())),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let last = *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        now.saturating_duration_since(last)
    }
}

type SlotMap = HashMap<SessionCode, Arc<SessionSlot>>;

/// Owns every session record in the process.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<SlotMap>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle to the session, creating it if needed.
    pub fn get_or_create(&self, code: &SessionCode) -> SessionHandle {
        let (slot, created) = self.slot(code);
        slot.touch();
        SessionHandle {
            code: code.clone(),
            created,
        }
    }

    /// Returns `true` if a session for `code` currently exists.
    pub fn contains(&self, code: &SessionCode) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(code)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns a snapshot of the session, creating an empty one if needed.
    pub async fn read(&self, code: &SessionCode) -> SessionSnapshot {
        self.read_live(code).await.snapshot(code)
    }

    /// Merges `turns` into the session's history and returns how many were new.
    pub async fn append_turns(&self, code: &SessionCode, turns: Vec<Turn>) -> usize {
        self.append_batch(code, turns, false).await
    }

    /// Like [`append_turns`](Self::append_turns), with `intro` selecting how
    /// the newly accepted turns are announced to listeners.
    pub async fn append_batch(&self, code: &SessionCode, turns: Vec<Turn>, intro: bool) -> usize {
        let mut state = self.write_live(code).await;
        let added = state.accept(turns);
        let count = added.len();
        if count > 0 {
            let update = if intro {
                SessionUpdate::Intro(added)
            } else {
                SessionUpdate::History(added)
            };
            state.notify(code, update);
        }
        count
    }

    /// Moves the session to `phase` if that is ahead of its current phase.
    pub async fn set_phase(&self, code: &SessionCode, phase: Phase) -> PhaseOutcome {
        self.change_phase(code, |current| advance(current, phase)).await
    }

    /// Applies a lifecycle trigger using the transition table.
    pub async fn fire(&self, code: &SessionCode, trigger: PhaseTrigger) -> PhaseOutcome {
        self.change_phase(code, |current| transition(current, trigger)).await
    }

    async fn change_phase(
        &self,
        code: &SessionCode,
        decide: impl FnOnce(Phase) -> PhaseOutcome,
    ) -> PhaseOutcome {
        let mut state = self.write_live(code).await;
        let outcome = decide(state.phase);
        if let PhaseOutcome::Applied { to, .. } = outcome {
            state.phase = to;
            state.notify(code, SessionUpdate::PhaseChanged(to));
        }
        outcome
    }

    /// Records the post-call analysis reference unless one is already set.
    pub async fn set_intelligence_ref(
        &self,
        code: &SessionCode,
        reference: IntelligenceRef,
    ) -> IntelligenceOutcome {
        let mut state = self.write_live(code).await;
        if let Some(existing) = &state.intelligence {
            return IntelligenceOutcome::AlreadySet {
                existing: existing.transcript_sid.clone(),
            };
        }
        state.intelligence = Some(reference.clone());
        state.notify(code, SessionUpdate::IntelligenceReady(reference));
        IntelligenceOutcome::Set
    }

    /// Registers `listener` with the session.
    ///
    /// The listener first receives a [`SessionUpdate::Joined`] snapshot,
    /// enqueued under the session lock so no delta can overtake it. Returns
    /// `false` if the listener's queue is already closed or full.
    pub async fn subscribe(&self, code: &SessionCode, listener: &Listener) -> bool {
        let mut state = self.write_live(code).await;
        let joined = SessionUpdate::Joined(state.snapshot(code));
        if let Err(e) = listener.tx.try_send(joined) {
            tracing::warn!(
                session = %code,
                listener = %listener.id,
                "could not deliver join snapshot, not subscribing: {}",
                e
            );
            return false;
        }
        state.listeners.insert(listener.id, listener.tx.clone());
        true
    }

    /// Removes a listener. Safe to call repeatedly and for unknown sessions.
    pub async fn unsubscribe(&self, code: &SessionCode, listener_id: Uuid) -> bool {
        let Some(slot) = self.existing_slot(code) else {
            return false;
        };
        let mut state = slot.state.write().await;
        if state.evicted {
            return false;
        }
        slot.touch();
        state.listeners.remove(&listener_id).is_some()
    }

    /// Re-sends the full history to one subscribed listener.
    ///
    /// Returns `false` if the listener is not subscribed to this session.
    pub async fn resend(&self, code: &SessionCode, listener_id: Uuid) -> bool {
        let state = self.read_live(code).await;
        let Some(tx) = state.listeners.get(&listener_id) else {
            return false;
        };
        if let Err(e) = tx.try_send(SessionUpdate::History(state.history.clone())) {
            tracing::warn!(
                session = %code,
                listener = %listener_id,
                "dropping history resend: {}",
                e
            );
        }
        true
    }

    /// Number of listeners registered with the session, if it exists.
    pub async fn listener_count(&self, code: &SessionCode) -> Option<usize> {
        let slot = self.existing_slot(code)?;
        let state = slot.state.read().await;
        (!state.evicted).then(|| state.listeners.len())
    }

    /// Removes sessions that have no listeners and have been idle for at
    /// least `retention`. Returns how many sessions were evicted.
    ///
    /// Sessions whose lock is held at the time of the sweep are skipped.
    pub fn sweep(&self, retention: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();

        sessions.retain(|code, slot| {
            let Ok(mut state) = slot.state.try_write() else {
                return true;
            };
            state.listeners.retain(|_, tx| !tx.is_closed());
            if state.listeners.is_empty() && slot.idle_for(now) >= retention {
                state.evicted = true;
                tracing::debug!(session = %code, "evicting idle session");
                false
            } else {
                true
            }
        });

        before - sessions.len()
    }

    fn slot(&self, code: &SessionCode) -> (Arc<SessionSlot>, bool) {
        if let Some(slot) = self.existing_slot(code) {
            return (slot, false);
        }
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut created = false;
        let slot = sessions
            .entry(code.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(SessionSlot::new())
            })
            .clone();
        if created {
            tracing::debug!(session = %code, "created session");
        }
        (slot, created)
    }

    fn existing_slot(&self, code: &SessionCode) -> Option<Arc<SessionSlot>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(code)
            .cloned()
    }

    async fn write_live(&self, code: &SessionCode) -> OwnedRwLockWriteGuard<SessionState> {
        loop {
            let (slot, _) = self.slot(code);
            let guard = slot.state.clone().write_owned().await;
            if guard.evicted {
                continue;
            }
            slot.touch();
            return guard;
        }
    }

    async fn read_live(&self, code: &SessionCode) -> OwnedRwLockReadGuard<SessionState> {
        loop {
            let (slot, _) = self.slot(code);
            let guard = slot.state.clone().read_owned().await;
            if guard.evicted {
                continue;
            }
            slot.touch();
            return guard;
        }
    }
}
