//! Shared types for the Callwire relay.
//!
//! This crate provides the foundational types used across all Callwire crates:
//! session codes, conversational turns, the call lifecycle phase, the
//! post-call intelligence reference, and the internal relay event shape.
//!
//! Nothing here performs I/O or holds locks. Wire translation (WebSocket
//! frames, webhook bodies) happens in `callwire-server`; state lives in
//! `callwire-session`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod event;
mod turn;

pub use event::{EventKind, IntelligenceRef, RelayEvent};
pub use turn::{Turn, TurnBody, TurnRole};

/// Errors produced when parsing a [`SessionCode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("session code is empty")]
    Empty,
    #[error("session code is {0} characters long (max {max})", max = SessionCode::MAX_LEN)]
    TooLong(usize),
    #[error("session code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// Short opaque identifier correlating a telephony call with its live
/// transcript and UI state.
///
/// Codes are issued by the caller-side flow; this type only validates that
/// a code is usable as a map key and in URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Maximum accepted length of a session code, in characters.
    pub const MAX_LEN: usize = 64;

    /// Parses and validates a raw code. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] if the code is empty, too long, or contains
    /// characters other than ASCII alphanumerics, `-` and `_`.
    pub fn parse(raw: &str) -> Result<Self, CodeError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CodeError::Empty);
        }
        let len = trimmed.chars().count();
        if len > Self::MAX_LEN {
            return Err(CodeError::TooLong(len));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(CodeError::InvalidCharacter(bad));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

/// Call lifecycle phase.
///
/// Phases are totally ordered `Ringing < Ongoing < Ended`; a session's
/// phase only ever moves forward in that order.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// The call has been requested but not yet answered. Initial state.
    #[default]
    Ringing,
    /// The call is connected and the conversation is live.
    Ongoing,
    /// The call is over. Terminal.
    Ended,
}

impl Phase {
    /// Returns the lowercase label for this phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ringing => "ringing",
            Self::Ongoing => "ongoing",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_code_trims_and_accepts_short_codes() {
        let code = SessionCode::parse("  A1B2 ").expect("valid code");
        assert_eq!(code.as_str(), "A1B2");
        assert_eq!(code.to_string(), "A1B2");
    }

    #[test]
    fn session_code_rejects_bad_input() {
        assert_eq!(SessionCode::parse(""), Err(CodeError::Empty));
        assert_eq!(SessionCode::parse("   "), Err(CodeError::Empty));
        assert_eq!(
            SessionCode::parse("ab cd"),
            Err(CodeError::InvalidCharacter(' '))
        );
        assert_eq!(
            SessionCode::parse("a/b"),
            Err(CodeError::InvalidCharacter('/'))
        );
        let long = "x".repeat(SessionCode::MAX_LEN + 1);
        assert_eq!(
            SessionCode::parse(&long),
            Err(CodeError::TooLong(SessionCode::MAX_LEN + 1))
        );
    }

    #[test]
    fn session_code_deserializes_with_validation() {
        let code: SessionCode = serde_json::from_str("\"call-42\"").expect("valid");
        assert_eq!(code.as_str(), "call-42");
        assert!(serde_json::from_str::<SessionCode>("\"\"").is_err());
    }

    #[test]
    fn phase_order_is_ringing_ongoing_ended() {
        assert!(Phase::Ringing < Phase::Ongoing);
        assert!(Phase::Ongoing < Phase::Ended);
        assert_eq!(Phase::default(), Phase::Ringing);
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(Phase::Ongoing).expect("serialize"),
            serde_json::json!("ongoing")
        );
    }
}
