//! Session-keyed real-time relay core.
//!
//! Holds per-call conversation history, merges turns delivered by client
//! polls and provider pushes into one de-duplicated transcript per session,
//! tracks the call lifecycle phase, and fans state deltas out to the
//! listeners subscribed to each session.
//!
//! # Components
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`merge`] | pure transcript merge / de-duplication |
//! | [`lifecycle`] | `Ringing → Ongoing → Ended` transition table |
//! | [`registry`] | session map, per-session locking, fan-out, eviction |
//! | [`relay`] | routing of normalized events onto registry operations |
//!
//! # Usage
//!
//! ```rust,ignore
//! use callwire_session::{Listener, Relay, SessionRegistry};
//! use callwire_types::{EventKind, RelayEvent, SessionCode, Turn};
//!
//! let relay = Relay::new(SessionRegistry::new());
//! let code = SessionCode::parse("A1B2")?;
//!
//! let (listener, mut updates) = Listener::channel(256);
//! relay.registry().subscribe(&code, &listener).await;
//!
//! relay
//!     .dispatch(RelayEvent::new(
//!         code.clone(),
//!         EventKind::TurnsBatch { turns: vec![Turn::user("t1", "hello")], intro: false },
//!     ))
//!     .await;
//! ```

pub mod lifecycle;
pub mod merge;
pub mod registry;
pub mod relay;

pub use lifecycle::{PhaseOutcome, PhaseTrigger};
pub use merge::merge_turns;
pub use registry::{
    IntelligenceOutcome, Listener, SessionHandle, SessionRegistry, SessionSnapshot, SessionUpdate,
    DEFAULT_LISTENER_QUEUE,
};
pub use relay::{Relay, RelayOutcome};
