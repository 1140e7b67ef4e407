//! Greeting context resolved for an outbound call.

use crate::config::GreetingConfig;
use serde::{Deserialize, Serialize};

/// Participant identity fields stored for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
}

/// Session metadata as kept in the directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallInfo {
    #[serde(default)]
    pub participant: Participant,
    #[serde(default)]
    pub scenario: Option<String>,
}

/// Caller-supplied values that take effect when the directory has none.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextDefaults {
    pub first_name: Option<String>,
    pub email: Option<String>,
    /// Explicit scenario; overrides the directory's value when present.
    pub scenario: Option<String>,
}

/// Where the identity in a [`CallContext`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSource {
    Directory,
    Fallback,
}

/// Everything the opening turn of a call needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    pub session_id: String,
    pub first_name: String,
    pub email: String,
    /// Identity parameter handed to the assistant, `email:<address>`.
    pub identity: String,
    pub greeting: String,
    pub scenario: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    pub source: ContextSource,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl CallContext {
    /// Combines directory data (if any) with caller defaults and config.
    ///
    /// Identity precedence: directory, then caller default, then configured
    /// fallback. Scenario precedence: caller, then directory, then config.
    pub fn build(
        session_id: &str,
        info: Option<&CallInfo>,
        defaults: &ContextDefaults,
        greeting: &GreetingConfig,
    ) -> Self {
        let participant = info.map(|i| &i.participant);

        let first_name = non_empty(participant.and_then(|p| p.first_name.as_deref()))
            .or_else(|| non_empty(defaults.first_name.as_deref()))
            .unwrap_or(&greeting.fallback_first_name)
            .to_string();
        let email = non_empty(participant.and_then(|p| p.email.as_deref()))
            .or_else(|| non_empty(defaults.email.as_deref()))
            .unwrap_or(&greeting.fallback_email)
            .to_string();
        let scenario = non_empty(defaults.scenario.as_deref())
            .or_else(|| non_empty(info.and_then(|i| i.scenario.as_deref())))
            .unwrap_or(&greeting.default_scenario)
            .to_ascii_lowercase();

        Self {
            session_id: session_id.to_string(),
            identity: format!("email:{}", email),
            greeting: greeting.template.replace("{first_name}", &first_name),
            assistant_id: greeting.assistants.for_scenario(&scenario).map(String::from),
            first_name,
            email,
            scenario,
            source: if info.is_some() {
                ContextSource::Directory
            } else {
                ContextSource::Fallback
            },
        }
    }
}
