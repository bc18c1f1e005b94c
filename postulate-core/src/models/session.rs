use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::chat::ChatMessage;

/// Server-issued session identifier. Training sessions hand out opaque
/// strings and research sessions hand out UUIDs, so it stays a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionGuid(String);

impl SessionGuid {
    pub fn new(guid: impl Into<String>) -> Self {
        Self(guid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionGuid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionGuid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Uuid> for SessionGuid {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "session_id", alias = "guid")]
    pub guid: SessionGuid,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_agent_context: Option<ClientAgentContext>,
    #[serde(default)]
    pub round_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    /// Fields this client does not model; kept so `PUT /session/update`
    /// echoes them back untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Body of `POST /session/create`
#[derive(Debug, Clone, Serialize)]
pub struct NewSession {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_guid: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAgentContext {
    #[serde(default)]
    pub profile_desc: String,
    #[serde(default)]
    pub current_objection: String,
    #[serde(default)]
    pub all_objections: Vec<String>,
    #[serde(default)]
    pub related_objections: Vec<String>,
    #[serde(default)]
    pub conversation_history: Vec<serde_json::Value>,
    #[serde(default)]
    pub internal_scores: Vec<ClientAgentInternalScore>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ClientAgentContext {
    /// Overwrite the server copy of the history with the local chat buffer.
    pub fn set_history(&mut self, messages: &[ChatMessage]) {
        self.conversation_history = messages
            .iter()
            .filter_map(|m| serde_json::to_value(m).ok())
            .collect();
    }

    /// History entries that parse as chat messages. Entries written by other
    /// producers (e.g. raw LLM transcripts) are skipped.
    pub fn history_messages(&self) -> Vec<ChatMessage> {
        self.conversation_history
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundEval {
    #[serde(default)]
    pub objection_handling: Score,
    #[serde(default)]
    pub rapport_building: Score,
    #[serde(default)]
    pub clarity_and_conciseness: Score,
    #[serde(default)]
    pub persuasiveness: Score,
}

impl RoundEval {
    pub fn average(&self) -> f64 {
        (self.objection_handling.score
            + self.rapport_building.score
            + self.clarity_and_conciseness.score
            + self.persuasiveness.score)
            / 4.0
    }
}

/// The client agent's private scoring of one salesman turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientAgentInternalScore {
    #[serde(default)]
    pub scores: RoundEval,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub justification: String,
    #[serde(default)]
    pub msg_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    #[serde(rename = "IN_PROGRESS", alias = "In Progress")]
    InProgress,
    #[serde(rename = "SUCCESS", alias = "Success")]
    Success,
    #[serde(rename = "FAILED", alias = "Failed")]
    Failed,
}

impl SessionOutcome {
    /// Terminal outcomes end the role-play and raise the outcome modal.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionOutcome::Success | SessionOutcome::Failed)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionOutcome::InProgress => "In Progress",
            SessionOutcome::Success => "Success",
            SessionOutcome::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}
