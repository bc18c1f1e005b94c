use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

/// Who spoke a chat line. The trainee is always the salesman.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Salesman,
    ClientAgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub content: String,
    pub role: Role,
    /// Local wall-clock time, `HH:MM`
    pub time: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Utc::now().timestamp_millis(),
            content: content.into(),
            role,
            time: Local::now().format("%H:%M").to_string(),
        }
    }

    pub fn salesman(content: impl Into<String>) -> Self {
        Self::new(Role::Salesman, content)
    }

    pub fn client_agent(content: impl Into<String>) -> Self {
        Self::new(Role::ClientAgent, content)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConversationFlowItem {
    #[serde(default)]
    pub speaker: String,
    #[serde(default)]
    pub message: String,
}

/// A proposed continuation of the dialogue, with the coaching metadata
/// explaining why it should work.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlternativePath {
    #[serde(default)]
    pub conversation_flow: Vec<ConversationFlowItem>,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub technique_used: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub expected_outcome: String,
}

impl AlternativePath {
    pub fn first_message(&self) -> Option<&str> {
        self.conversation_flow
            .first()
            .map(|item| item.message.as_str())
            .filter(|m| !m.trim().is_empty())
    }
}
