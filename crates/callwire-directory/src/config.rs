use serde::{Deserialize, Serialize};
use std::fmt;

fn default_base_url() -> String {
    "https://sync.twilio.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_first_name() -> String {
    "John".to_string()
}

fn default_email() -> String {
    "john@example.com".to_string()
}

fn default_scenario() -> String {
    "retail".to_string()
}

fn default_greeting_template() -> String {
    "Hello {first_name}, This is hoot and drive, can I talk with you about your dream car?"
        .to_string()
}

/// Connection settings for the session metadata store.
///
/// The directory is disabled unless `account_sid`, `auth_token`,
/// `service_sid` and `map_sid` are all set.
#[derive(Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default, skip_serializing)]
    pub auth_token: String,
    #[serde(default)]
    pub service_sid: String,
    #[serde(default)]
    pub map_sid: String,
    /// Per-request timeout in seconds. Default: 5.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            account_sid: String::new(),
            auth_token: String::new(),
            service_sid: String::new(),
            map_sid: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryConfig")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("service_sid", &self.service_sid)
            .field("map_sid", &self.map_sid)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl DirectoryConfig {
    pub fn is_enabled(&self) -> bool {
        [
            &self.account_sid,
            &self.auth_token,
            &self.service_sid,
            &self.map_sid,
        ]
        .iter()
        .all(|value| !value.trim().is_empty())
    }
}

/// Values used when the directory cannot supply a participant's identity,
/// plus the greeting and assistant routing for the opening turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetingConfig {
    #[serde(default = "default_first_name")]
    pub fallback_first_name: String,
    #[serde(default = "default_email")]
    pub fallback_email: String,
    #[serde(default = "default_scenario")]
    pub default_scenario: String,
    /// Opening line; `{first_name}` is replaced with the participant's name.
    #[serde(default = "default_greeting_template")]
    pub template: String,
    #[serde(default)]
    pub assistants: AssistantIds,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            fallback_first_name: default_first_name(),
            fallback_email: default_email(),
            default_scenario: default_scenario(),
            template: default_greeting_template(),
            assistants: AssistantIds::default(),
        }
    }
}

/// Assistant identifiers per call scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantIds {
    #[serde(default)]
    pub retail: Option<String>,
    #[serde(default)]
    pub estates: Option<String>,
    #[serde(default)]
    pub healthcare: Option<String>,
}

impl AssistantIds {
    /// Maps a scenario name to its assistant. Unknown scenarios use retail.
    pub fn for_scenario(&self, scenario: &str) -> Option<&str> {
        let id = match scenario.trim().to_ascii_lowercase().as_str() {
            "estates" => &self.estates,
            "health" | "healthcare" => &self.healthcare,
            _ => &self.retail,
        };
        id.as_deref().filter(|id| !id.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_disabled_until_fully_configured() {
        let mut config = DirectoryConfig::default();
        assert!(!config.is_enabled());

        config.account_sid = "AC1".to_string();
        config.auth_token = "secret".to_string();
        config.service_sid = "IS1".to_string();
        assert!(!config.is_enabled());

        config.map_sid = "MP1".to_string();
        assert!(config.is_enabled());
    }

    #[test]
    fn debug_output_redacts_auth_token() {
        let config = DirectoryConfig {
            auth_token: "super-secret".to_string(),
            ..DirectoryConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn scenarios_map_to_assistants() {
        let ids = AssistantIds {
            retail: Some("UA-retail".to_string()),
            estates: Some("UA-estates".to_string()),
            healthcare: Some("UA-health".to_string()),
        };
        assert_eq!(ids.for_scenario("retail"), Some("UA-retail"));
        assert_eq!(ids.for_scenario("Estates"), Some("UA-estates"));
        assert_eq!(ids.for_scenario("health"), Some("UA-health"));
        assert_eq!(ids.for_scenario("healthcare"), Some("UA-health"));
        assert_eq!(ids.for_scenario("unknown"), Some("UA-retail"));
        assert_eq!(AssistantIds::default().for_scenario("retail"), None);
    }

    #[test]
    fn greeting_config_parses_partial_toml() {
        let config: GreetingConfig = toml::from_str(
            r#"
            fallback_first_name = "Ada"
            [assistants]
            estates = "UA-estates"
            "#,
        )
        .expect("partial greeting config should parse");
        assert_eq!(config.fallback_first_name, "Ada");
        assert_eq!(config.fallback_email, "john@example.com");
        assert_eq!(config.assistants.for_scenario("estates"), Some("UA-estates"));
    }
}
