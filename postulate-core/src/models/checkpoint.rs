use serde::{Deserialize, Serialize};

use super::chat::AlternativePath;
use super::session::SessionGuid;

/// Longest checkpoint title shown before it is cut with an ellipsis.
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehavioralCue {
    #[serde(default)]
    pub cue_name: Option<String>,
    #[serde(default)]
    pub evidence_quote: Option<String>,
    #[serde(default)]
    pub impact_probability: Option<String>,
    #[serde(default)]
    pub interpretation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskItem {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub impact: Option<String>,
    #[serde(default)]
    pub impact_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BehavioralSection {
    #[serde(default)]
    pub behavioral_cues: Vec<BehavioralCue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskSection {
    #[serde(default)]
    pub risks: Vec<RiskItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProblemAnalysis {
    #[serde(default)]
    pub behavioral: BehavioralSection,
    #[serde(default)]
    pub risk: RiskSection,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructuredCoachReport {
    #[serde(default)]
    pub problem_analysis: ProblemAnalysis,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The coach agent's report. Older checkpoints store it as prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoachReport {
    Structured(StructuredCoachReport),
    Text(String),
}

impl CoachReport {
    pub fn behavioral_cues(&self) -> &[BehavioralCue] {
        match self {
            CoachReport::Structured(r) => &r.problem_analysis.behavioral.behavioral_cues,
            CoachReport::Text(_) => &[],
        }
    }

    pub fn risks(&self) -> &[RiskItem] {
        match self {
            CoachReport::Structured(r) => &r.problem_analysis.risk.risks,
            CoachReport::Text(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlternatorAnalysis {
    #[serde(default)]
    pub behavioral_insights: Vec<String>,
    #[serde(default)]
    pub identified_issue: Option<String>,
    #[serde(default)]
    pub original_user_statement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlternatorResponse {
    #[serde(default)]
    pub alternative_paths: Vec<AlternativePath>,
    #[serde(default)]
    pub analysis: Option<AlternatorAnalysis>,
}

/// A point in a training conversation the backend flagged for coaching.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub guid: String,
    #[serde(default, alias = "session_id")]
    pub session_guid: Option<SessionGuid>,
    /// The salesman message that triggered the checkpoint
    #[serde(default)]
    pub user_msg: Option<String>,
    /// Position of `user_msg` in the chat history
    #[serde(default)]
    pub user_msg_index: Option<usize>,
    #[serde(default)]
    pub coach_agent_response: Option<serde_json::Value>,
    #[serde(default)]
    pub coach_agent_report: Option<CoachReport>,
    #[serde(
        default,
        rename = "alternator_agent_inference",
        alias = "alternator_agent_response"
    )]
    pub alternator: Option<AlternatorResponse>,
    #[serde(default)]
    pub checkpoint_list: Vec<usize>,
}

impl Checkpoint {
    /// Card title: the triggering message, or `Checkpoint N` (1-based),
    /// cut to 30 characters.
    pub fn title(&self, index: usize) -> String {
        let raw = match self.user_msg.as_deref() {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => format!("Checkpoint {}", index + 1),
        };
        if raw.chars().count() > TITLE_MAX_CHARS {
            let cut: String = raw.chars().take(TITLE_MAX_CHARS).collect();
            format!("{}…", cut)
        } else {
            raw
        }
    }

    pub fn alternative_paths(&self) -> &[AlternativePath] {
        self.alternator
            .as_ref()
            .map(|a| a.alternative_paths.as_slice())
            .unwrap_or(&[])
    }

    fn has_user_msg(&self) -> bool {
        self.user_msg
            .as_deref()
            .map(|m| !m.trim().is_empty())
            .unwrap_or(false)
    }
}

/// `GET /checkpoint/get-by-session-id` has returned all three shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CheckpointList {
    Many(Vec<Checkpoint>),
    Wrapped { checkpoints: Vec<Checkpoint> },
    Single(Box<Checkpoint>),
}

impl CheckpointList {
    /// Flatten to a list, dropping checkpoints without a triggering message.
    pub fn into_displayable(self) -> Vec<Checkpoint> {
        let all = match self {
            CheckpointList::Many(v) => v,
            CheckpointList::Wrapped { checkpoints } => checkpoints,
            CheckpointList::Single(cp) => vec![*cp],
        };
        all.into_iter().filter(Checkpoint::has_user_msg).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathType {
    Replay,
    Alternate,
}

/// Body of `POST /session/use-alternative-path`
#[derive(Debug, Clone, Serialize)]
pub struct UseAlternativePathRequest {
    pub selected_path: AlternativePath,
    pub checkpoint_guid: String,
    pub path_type: PathType,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsedPath {
    pub session_guid: SessionGuid,
    #[serde(default)]
    pub used_path: AlternativePath,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsedPathResponse {
    pub response: UsedPath,
}
