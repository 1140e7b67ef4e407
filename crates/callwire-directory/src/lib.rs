//! Session metadata lookup for the Callwire relay.
//!
//! Before a call is placed, the opening greeting needs the participant's
//! name and contact address. Those live in an external key/value directory
//! keyed by session code. This crate fetches them and, whenever the
//! directory is unreachable, unconfigured or has no entry, falls back to
//! caller-supplied defaults so call initiation never fails on metadata.

pub mod client;
pub mod config;
pub mod context;
pub mod error;

pub use client::DirectoryClient;
pub use config::{AssistantIds, DirectoryConfig, GreetingConfig};
pub use context::{CallContext, CallInfo, ContextDefaults, ContextSource, Participant};
pub use error::DirectoryError;
