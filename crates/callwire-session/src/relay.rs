//! Event relay: routes normalized events into the registry.
//!
//! Every producer (provider webhooks, client connections) hands the relay a
//! [`RelayEvent`]. The relay maps its kind onto registry operations; the
//! registry fans the resulting delta out to the session's listeners.
//! Events for one session are applied in the order they acquire that
//! session's lock, which is their arrival order.

use crate::lifecycle::{PhaseOutcome, PhaseTrigger};
use crate::registry::{IntelligenceOutcome, SessionRegistry};
use callwire_types::{EventKind, RelayEvent, SessionCode};

/// What a dispatched event changed.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    TurnsMerged { added: usize },
    Phase(PhaseOutcome),
    Intelligence(IntelligenceOutcome),
}

impl RelayOutcome {
    /// Short label reported back to webhook callers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TurnsMerged { added: 0 } => "duplicate",
            Self::TurnsMerged { .. } => "merged",
            Self::Phase(PhaseOutcome::Applied { .. }) => "phase_applied",
            Self::Phase(PhaseOutcome::AlreadyApplied { .. }) => "already_applied",
            Self::Intelligence(IntelligenceOutcome::Set) => "intelligence_set",
            Self::Intelligence(IntelligenceOutcome::AlreadySet { .. }) => "already_applied",
        }
    }
}

/// Routes relay events to the session registry.
#[derive(Clone, Default)]
pub struct Relay {
    registry: SessionRegistry,
}

impl Relay {
    pub fn new(registry: SessionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Applies one event to its session and fans out the result.
    pub async fn dispatch(&self, event: RelayEvent) -> RelayOutcome {
        let RelayEvent { session, kind } = event;
        let label = kind.label();

        match kind {
            EventKind::TurnsBatch { turns, intro } => {
                let received = turns.len();
                let added = self.registry.append_batch(&session, turns, intro).await;
                tracing::debug!(
                    session = %session,
                    kind = label,
                    received,
                    added,
                    "merged turns batch"
                );
                RelayOutcome::TurnsMerged { added }
            }
            EventKind::CallStarted => self.phase(&session, PhaseTrigger::CallStarted).await,
            EventKind::CallEnded => self.phase(&session, PhaseTrigger::CallEnded).await,
            EventKind::AnalysisReady(reference) => {
                let sid = reference.transcript_sid.clone();
                let outcome = self.registry.set_intelligence_ref(&session, reference).await;
                match &outcome {
                    IntelligenceOutcome::Set => {
                        tracing::info!(session = %session, transcript_sid = %sid, "analysis ready");
                    }
                    IntelligenceOutcome::AlreadySet { existing } => {
                        tracing::info!(
                            session = %session,
                            transcript_sid = %sid,
                            existing = %existing,
                            "analysis reference already set; keeping the first one"
                        );
                    }
                }
                RelayOutcome::Intelligence(outcome)
            }
        }
    }

    async fn phase(&self, session: &SessionCode, trigger: PhaseTrigger) -> RelayOutcome {
        let outcome = self.registry.fire(session, trigger).await;
        match outcome {
            PhaseOutcome::Applied { from, to } => {
                tracing::info!(session = %session, %from, %to, "call phase changed");
            }
            PhaseOutcome::AlreadyApplied { current } => {
                tracing::debug!(
                    session = %session,
                    trigger = ?trigger,
                    %current,
                    "phase trigger ignored"
                );
            }
        }
        RelayOutcome::Phase(outcome)
    }
}
