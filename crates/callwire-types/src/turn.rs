//! Conversational turns as exchanged with the browser and the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The called party, transcribed from speech.
    User,
    /// The AI assistant.
    Assistant,
    /// A tool invocation made by the assistant, with its result.
    Tool,
}

impl TurnRole {
    /// Returns the lowercase wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Role-specific payload of a turn.
///
/// Serialized with an internal `role` tag so a turn reads as
/// `{"id": .., "role": "user", "content": ..}` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum TurnBody {
    User {
        content: String,
    },
    Assistant {
        content: String,
    },
    Tool {
        /// Name of the invoked tool.
        name: String,
        /// Arguments the assistant passed to the tool.
        #[serde(default)]
        input: Value,
        /// Result payload returned by the tool.
        #[serde(default)]
        output: Value,
    },
}

/// One conversational unit.
///
/// Two turns with the same `id` are the same event, regardless of the
/// channel they arrived through. `sequence` and `received_at` are stamped by
/// the session registry when the turn is first accepted; values supplied by
/// a client are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Stable identity used for de-duplication.
    pub id: String,

    #[serde(flatten)]
    pub body: TurnBody,

    /// Provider-supplied creation time, kept verbatim for display only.
    #[serde(
        rename = "dateCreated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub date_created: Option<String>,

    /// Per-session arrival index assigned by the relay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    /// Time the relay first accepted this turn.
    #[serde(rename = "receivedAt", default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl Turn {
    /// Builds a user turn with free-text content.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            TurnBody::User {
                content: content.into(),
            },
        )
    }

    /// Builds an assistant turn with free-text content.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            id,
            TurnBody::Assistant {
                content: content.into(),
            },
        )
    }

    /// Builds a tool turn from an invocation and its result.
    pub fn tool(id: impl Into<String>, name: impl Into<String>, input: Value, output: Value) -> Self {
        Self::new(
            id,
            TurnBody::Tool {
                name: name.into(),
                input,
                output,
            },
        )
    }

    fn new(id: impl Into<String>, body: TurnBody) -> Self {
        Self {
            id: id.into(),
            body,
            date_created: None,
            sequence: None,
            received_at: None,
        }
    }

    /// Returns the speaker of this turn.
    pub fn role(&self) -> TurnRole {
        match self.body {
            TurnBody::User { .. } => TurnRole::User,
            TurnBody::Assistant { .. } => TurnRole::Assistant,
            TurnBody::Tool { .. } => TurnRole::Tool,
        }
    }

    /// Sets the provider-supplied creation time.
    pub fn with_date_created(mut self, date_created: impl Into<String>) -> Self {
        self.date_created = Some(date_created.into());
        self
    }
}
