//! In-memory `BackendApi` that records every call, for flow tests.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::client::{ApiError, BackendApi};
use crate::models::{
    ChatMessage, ChatPayload, Checkpoint, CitationQuery, CitationResult, ClientAgentContext,
    ClientAgentInternalScore, ClientProfile, DraftRequest, FileItem, FlowNode, NewSession,
    NoveltyAnalysis, PitfallRecord, ResearchCoachResponse, Session, SessionGuid,
    SignificanceRecord, UseAlternativePathRequest, UsedPath, UsedPathResponse,
};

pub(crate) struct FakeBackend {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    session: Mutex<Session>,
    updates: Mutex<Vec<Session>>,
    path_requests: Mutex<Vec<UseAlternativePathRequest>>,
    sent: Mutex<Vec<(SessionGuid, String)>>,
    reply: Mutex<ChatPayload>,
    pub pitfalls: Mutex<Vec<PitfallRecord>>,
    pub citations: Mutex<Vec<CitationResult>>,
    pub significance: Mutex<Vec<SignificanceRecord>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        let mut context = ClientAgentContext::default();
        context.set_history(&[ChatMessage::salesman("server copy")]);

        let session = Session {
            guid: SessionGuid::from("s-1"),
            title: "Role-play".to_string(),
            description: None,
            user_guid: None,
            client_agent_context: Some(context),
            round_count: 1,
            created_date: None,
            last_update: None,
            extra: Default::default(),
        };

        Self {
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            session: Mutex::new(session),
            updates: Mutex::new(Vec::new()),
            path_requests: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            reply: Mutex::new(reply("s-1", "Tell me more.", "IN_PROGRESS")),
            pitfalls: Mutex::new(Vec::new()),
            citations: Mutex::new(Vec::new()),
            significance: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn set_reply(&self, payload: ChatPayload) {
        *self.reply.lock().unwrap() = payload;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<Session> {
        self.updates.lock().unwrap().clone()
    }

    pub fn path_requests(&self) -> Vec<UseAlternativePathRequest> {
        self.path_requests.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(SessionGuid, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> Result<(), ApiError> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(ApiError::Api {
                status: 500,
                message: format!("{} failed", operation),
            });
        }
        Ok(())
    }
}

pub(crate) fn reply(session: &str, content: &str, outcome: &str) -> ChatPayload {
    serde_json::from_value(serde_json::json!({
        "session_id": session,
        "client_agent_response": { "content": content },
        "session_outcome": outcome,
    }))
    .unwrap()
}

pub(crate) fn pitfall(session: &str) -> PitfallRecord {
    PitfallRecord {
        guid: Uuid::new_v4(),
        session_guid: SessionGuid::from(session),
        draft_text: None,
        novelty_analysis: None,
        methodology_analysis: None,
        significance_analysis: None,
        contradiction_alerts: None,
        created_date: Utc::now(),
    }
}

#[async_trait]
impl BackendApi for FakeBackend {
    async fn list_client_profiles(&self) -> Result<Vec<ClientProfile>, ApiError> {
        self.record("list_client_profiles")?;
        Ok(vec![ClientProfile {
            id: "p-1".to_string(),
            name: "Skeptical CFO".to_string(),
            description: String::new(),
        }])
    }

    async fn internal_scores(
        &self,
        _session: &SessionGuid,
    ) -> Result<Vec<ClientAgentInternalScore>, ApiError> {
        self.record("internal_scores")?;
        Ok(Vec::new())
    }

    async fn init_session(&self, _client_profile_id: &str) -> Result<ChatPayload, ApiError> {
        self.record("init_session")?;
        Ok(reply("s-1", "Hello, who is this?", "IN_PROGRESS"))
    }

    async fn send_user_message(
        &self,
        session: &SessionGuid,
        user_response: &str,
    ) -> Result<ChatPayload, ApiError> {
        self.record("send_user_message")?;
        self.sent
            .lock()
            .unwrap()
            .push((session.clone(), user_response.to_string()));
        Ok(self.reply.lock().unwrap().clone())
    }

    async fn use_alternative_path(
        &self,
        request: &UseAlternativePathRequest,
    ) -> Result<UsedPathResponse, ApiError> {
        self.record("use_alternative_path")?;
        self.path_requests.lock().unwrap().push(request.clone());
        Ok(UsedPathResponse {
            response: UsedPath {
                session_guid: self.session.lock().unwrap().guid.clone(),
                used_path: request.selected_path.clone(),
            },
        })
    }

    async fn get_session(&self, _session: &SessionGuid) -> Result<Session, ApiError> {
        self.record("get_session")?;
        Ok(self.session.lock().unwrap().clone())
    }

    async fn update_session(
        &self,
        _session: &SessionGuid,
        model: &Session,
    ) -> Result<serde_json::Value, ApiError> {
        self.record("update_session")?;
        self.updates.lock().unwrap().push(model.clone());
        *self.session.lock().unwrap() = model.clone();
        Ok(serde_json::json!({ "status": "ok" }))
    }

    async fn list_training_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.record("list_training_sessions")?;
        Ok(vec![self.session.lock().unwrap().clone()])
    }

    async fn conversation_flow(&self, _session: &SessionGuid) -> Result<Vec<FlowNode>, ApiError> {
        self.record("conversation_flow")?;
        Ok(Vec::new())
    }

    async fn list_checkpoints(&self, _session: &SessionGuid) -> Result<Vec<Checkpoint>, ApiError> {
        self.record("list_checkpoints")?;
        Ok(vec![Checkpoint {
            guid: "cp-1".to_string(),
            user_msg: Some("Our price is fair".to_string()),
            user_msg_index: Some(2),
            ..Default::default()
        }])
    }

    async fn create_session(&self, new_session: &NewSession) -> Result<Session, ApiError> {
        self.record("create_session")?;
        let mut session = self.session.lock().unwrap().clone();
        session.title = new_session.title.clone();
        Ok(session)
    }

    async fn list_sessions(&self, _user_guid: Uuid) -> Result<Vec<Session>, ApiError> {
        self.record("list_sessions")?;
        Ok(Vec::new())
    }

    async fn pitfall_analysis(
        &self,
        request: &DraftRequest,
    ) -> Result<ResearchCoachResponse, ApiError> {
        self.record("pitfall_analysis")?;
        self.pitfalls
            .lock()
            .unwrap()
            .push(pitfall(request.session_guid.as_str()));
        Ok(ResearchCoachResponse {
            draft_text: request.draft_paper.clone(),
            novelty_analysis: NoveltyAnalysis {
                score: 0.5,
                feedback: "Partly novel".to_string(),
                supporting_claim_text: None,
            },
            methodology_analysis: None,
            significance_analysis: None,
            contradiction_alerts: Vec::new(),
        })
    }

    async fn significance_clarification(
        &self,
        request: &DraftRequest,
    ) -> Result<SignificanceRecord, ApiError> {
        self.record("significance_clarification")?;
        let record = SignificanceRecord {
            guid: Uuid::new_v4(),
            session_guid: Some(request.session_guid.clone()),
            status: Some("clear".to_string()),
            significance: None,
            feedback: None,
            created_date: Utc::now(),
        };
        self.significance.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn citation_search(&self, query: &CitationQuery) -> Result<Vec<CitationResult>, ApiError> {
        self.record("citation_search")?;
        Ok(vec![CitationResult {
            paper_title: Some(format!("On {}", query.query)),
            ..Default::default()
        }])
    }

    async fn construct_knowledge_graph(&self, _file_guids: &[Uuid]) -> Result<String, ApiError> {
        self.record("construct_knowledge_graph")?;
        Ok("Knowledge graph construction started.".to_string())
    }

    async fn upload_files(&self, _paths: &[PathBuf]) -> Result<Vec<FileItem>, ApiError> {
        self.record("upload_files")?;
        Ok(Vec::new())
    }

    async fn list_files(&self) -> Result<Vec<FileItem>, ApiError> {
        self.record("list_files")?;
        Ok(Vec::new())
    }

    async fn pitfalls_by_session(
        &self,
        _session: &SessionGuid,
    ) -> Result<Vec<PitfallRecord>, ApiError> {
        self.record("pitfalls_by_session")?;
        Ok(self.pitfalls.lock().unwrap().clone())
    }

    async fn citations_by_session(
        &self,
        _session: &SessionGuid,
    ) -> Result<Vec<CitationResult>, ApiError> {
        self.record("citations_by_session")?;
        Ok(self.citations.lock().unwrap().clone())
    }

    async fn significance_by_session(
        &self,
        _session: &SessionGuid,
    ) -> Result<Vec<SignificanceRecord>, ApiError> {
        self.record("significance_by_session")?;
        Ok(self.significance.lock().unwrap().clone())
    }
}
