use crate::config::{DirectoryConfig, GreetingConfig};
use crate::context::{CallContext, CallInfo, ContextDefaults};
use crate::error::DirectoryError;
use callwire_types::SessionCode;
use serde::Deserialize;
use std::time::Duration;

/// Envelope of a directory map item.
#[derive(Debug, Deserialize)]
struct MapItem {
    data: Option<CallInfo>,
}

/// Reads session metadata from the external directory.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    config: DirectoryConfig,
    greeting: GreetingConfig,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(config: DirectoryConfig, greeting: GreetingConfig) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            config,
            greeting,
            http,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    fn item_url(&self, code: &SessionCode) -> String {
        format!(
            "{}/Services/{}/Maps/{}/Items/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.service_sid,
            self.config.map_sid,
            code
        )
    }

    /// Fetches the metadata stored for `code`.
    pub async fn fetch_call_info(&self, code: &SessionCode) -> Result<CallInfo, DirectoryError> {
        if !self.is_enabled() {
            return Err(DirectoryError::Disabled);
        }

        let response = self
            .http
            .get(self.item_url(code))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(code.to_string()));
        }
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }

        let item: MapItem = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;
        item.data
            .ok_or_else(|| DirectoryError::Decode("map item has no data".to_string()))
    }

    /// Resolves the greeting context for a call. Never fails: a directory
    /// error is logged and the caller-supplied defaults are used instead.
    pub async fn resolve_context(
        &self,
        code: &SessionCode,
        defaults: &ContextDefaults,
    ) -> CallContext {
        let info = match self.fetch_call_info(code).await {
            Ok(info) => Some(info),
            Err(DirectoryError::Disabled) => {
                tracing::debug!(session = %code, "session directory disabled, using fallback identity");
                None
            }
            Err(e) => {
                tracing::warn!(
                    session = %code,
                    "session directory lookup failed, using fallback identity: {}",
                    e
                );
                None
            }
        };
        CallContext::build(code.as_str(), info.as_ref(), defaults, &self.greeting)
    }
}
