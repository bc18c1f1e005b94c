use serde::{Deserialize, Serialize};

use super::session::{SessionGuid, SessionOutcome};

/// The agent's reply inside a chat payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Response of `session-init` and `user-msg`: the "shared data" every
/// subscriber reacts to.
///
/// Unmodelled fields are kept in `extra` so the canonical serialization of
/// a payload matches the JSON the server sent, which is what payload
/// deduplication keys on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_agent_response: Option<AgentReply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_outcome: Option<SessionOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_score: Option<f64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatPayload {
    /// Agent reply text, if the payload carries a non-empty one.
    pub fn reply_text(&self) -> Option<&str> {
        self.client_agent_response
            .as_ref()
            .map(|r| r.content.as_str())
            .filter(|c| !c.is_empty())
    }

    /// Session named by the payload. Older endpoints use `sessionId` or a
    /// nested `session.id` instead of `session_id`.
    pub fn session(&self) -> Option<SessionGuid> {
        if let Some(id) = &self.session_id {
            return Some(id.clone());
        }
        self.extra
            .get("sessionId")
            .and_then(|v| v.as_str())
            .or_else(|| {
                self.extra
                    .get("session")
                    .and_then(|s| s.get("id"))
                    .and_then(|v| v.as_str())
            })
            .map(SessionGuid::from)
    }

    /// Canonical JSON text used as the dedup key. `serde_json` maps are
    /// key-sorted, so structurally equal payloads produce the same key.
    pub fn canonical_key(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
