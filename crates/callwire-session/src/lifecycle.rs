//! Call lifecycle state machine.
//!
//! | Current   | `callStarted` | `callEnded` |
//! |-----------|---------------|-------------|
//! | `Ringing` | `Ongoing`     | `Ended`     |
//! | `Ongoing` | ignored       | `Ended`     |
//! | `Ended`   | ignored       | ignored     |
//!
//! The machine holds no timers; every transition is driven by an event.

use callwire_types::Phase;

/// Event that may move a session's phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTrigger {
    CallStarted,
    CallEnded,
}

impl PhaseTrigger {
    /// Phase this trigger moves towards.
    pub fn target(self) -> Phase {
        match self {
            Self::CallStarted => Phase::Ongoing,
            Self::CallEnded => Phase::Ended,
        }
    }
}

/// Result of asking for a phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseOutcome {
    /// The phase moved forward.
    Applied { from: Phase, to: Phase },
    /// The request was a duplicate or a regression; nothing changed.
    AlreadyApplied { current: Phase },
}

impl PhaseOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Phase after the request was handled.
    pub fn phase(self) -> Phase {
        match self {
            Self::Applied { to, .. } => to,
            Self::AlreadyApplied { current } => current,
        }
    }
}

/// Applies `requested` only if it is strictly ahead of `current`.
pub fn advance(current: Phase, requested: Phase) -> PhaseOutcome {
    if requested > current {
        PhaseOutcome::Applied {
            from: current,
            to: requested,
        }
    } else {
        PhaseOutcome::AlreadyApplied { current }
    }
}

/// Looks up the transition for `trigger` in the lifecycle table.
pub fn transition(current: Phase, trigger: PhaseTrigger) -> PhaseOutcome {
    advance(current, trigger.target())
}
