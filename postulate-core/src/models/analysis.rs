use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::SessionGuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyAnalysis {
    pub score: f64,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub supporting_claim_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodologyAnalysis {
    #[serde(default)]
    pub method_text: Option<String>,
    #[serde(default)]
    pub claim_text: Option<String>,
    /// `aligned`, `misaligned` or `unclear`
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SignificanceSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default)]
    pub feedback: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContradictionAnalysis {
    #[serde(default)]
    pub draft_finding: Option<String>,
    #[serde(default)]
    pub corpus_paper_id: Option<String>,
    #[serde(default)]
    pub corpus_finding: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContradictionList {
    #[serde(default)]
    pub contradictions: Vec<ContradictionAnalysis>,
}

/// A persisted pitfall analysis of one draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitfallRecord {
    pub guid: Uuid,
    pub session_guid: SessionGuid,
    #[serde(default)]
    pub draft_text: Option<String>,
    #[serde(default)]
    pub novelty_analysis: Option<NoveltyAnalysis>,
    #[serde(default)]
    pub methodology_analysis: Option<MethodologyAnalysis>,
    #[serde(default)]
    pub significance_analysis: Option<SignificanceSummary>,
    #[serde(default)]
    pub contradiction_alerts: Option<ContradictionList>,
    pub created_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRecord {
    pub guid: Uuid,
    #[serde(default)]
    pub session_guid: Option<SessionGuid>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub significance: Option<String>,
    #[serde(default)]
    pub feedback: Option<Vec<String>>,
    pub created_date: DateTime<Utc>,
}

/// A citation candidate. Search results come back without the persisted
/// fields (`guid`, `session_guid`, `created_date`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CitationResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_guid: Option<SessionGuid>,
    #[serde(default)]
    pub paper_title: Option<String>,
    #[serde(default)]
    pub paper_authors: Option<String>,
    #[serde(default)]
    pub paper_year: Option<String>,
    #[serde(default)]
    pub paper_venue: Option<String>,
    #[serde(default)]
    pub paragraph_text: Option<String>,
    #[serde(default)]
    pub relevance_score: Option<f64>,
    #[serde(default)]
    pub context_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,
}

/// Significance verdict produced inline by the research coach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceAssessment {
    /// `clear`, `weak` or `missing`
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub supporting_text: Option<String>,
}

/// Response of `POST /agent/pitfall-analysis`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchCoachResponse {
    #[serde(default)]
    pub draft_text: String,
    pub novelty_analysis: NoveltyAnalysis,
    #[serde(default)]
    pub methodology_analysis: Option<MethodologyAnalysis>,
    #[serde(default)]
    pub significance_analysis: Option<SignificanceAssessment>,
    #[serde(default)]
    pub contradiction_alerts: Vec<ContradictionAnalysis>,
}

/// Body of the pitfall and significance agents
#[derive(Debug, Clone, Serialize)]
pub struct DraftRequest {
    pub draft_paper: String,
    pub session_guid: SessionGuid,
}

/// Body of `POST /kg/citation-search`
#[derive(Debug, Clone, Serialize)]
pub struct CitationQuery {
    pub query: String,
    pub session_guid: SessionGuid,
}

/// Everything the copilot panels show for one research session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionAnalyses {
    pub pitfalls: Vec<PitfallRecord>,
    pub citations: Vec<CitationResult>,
    pub significance: Vec<SignificanceRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pitfall_record_with_null_sections() {
        let record: PitfallRecord = serde_json::from_value(json!({
            "guid": "7b5c24ab-1234-5678-9abc-def012345678",
            "session_guid": "5f1c2d4e-0000-4000-8000-000000000001",
            "draft_text": "We propose...",
            "novelty_analysis": { "score": 0.8, "feedback": "Novel", "supporting_claim_text": null },
            "methodology_analysis": null,
            "significance_analysis": null,
            "contradiction_alerts": { "contradictions": [{ "corpus_paper_id": "Smith 2019" }] },
            "created_date": "2025-11-02T08:00:00Z"
        }))
        .unwrap();

        assert!((record.novelty_analysis.unwrap().score - 0.8).abs() < f64::EPSILON);
        assert!(record.methodology_analysis.is_none());
        assert_eq!(
            record.contradiction_alerts.unwrap().contradictions[0]
                .corpus_paper_id
                .as_deref(),
            Some("Smith 2019")
        );
    }

    #[test]
    fn test_search_result_citation_has_no_guid() {
        let citation: CitationResult = serde_json::from_value(json!({
            "paper_title": "Attention Is All You Need",
            "paper_authors": "Vaswani et al.",
            "paper_year": "2017",
            "paper_venue": "NeurIPS",
            "paragraph_text": "The Transformer...",
            "relevance_score": 0.93,
            "context_summary": ""
        }))
        .unwrap();
        assert!(citation.guid.is_none());
        assert_eq!(citation.paper_year.as_deref(), Some("2017"));

        let v = serde_json::to_value(&citation).unwrap();
        assert!(v.get("guid").is_none());
    }

    #[test]
    fn test_coach_response_defaults_contradictions() {
        let resp: ResearchCoachResponse = serde_json::from_value(json!({
            "draft_text": "draft",
            "novelty_analysis": { "score": 0.1, "feedback": "Seen before" },
            "significance_analysis": { "status": "weak", "message": "Contrast with prior work" }
        }))
        .unwrap();
        assert!(resp.contradiction_alerts.is_empty());
        assert_eq!(resp.significance_analysis.unwrap().status, "weak");
    }
}
