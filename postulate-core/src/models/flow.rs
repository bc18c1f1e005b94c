use serde::{Deserialize, Serialize};

/// One utterance in the server's conversation-flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: i64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub role: String,
    /// 0 for the main line; alternate paths branch off at higher levels
    #[serde(default)]
    pub branch_level: i64,
    #[serde(default)]
    pub target_ids: Vec<i64>,
    #[serde(default)]
    pub arrow_color: Option<String>,
}
