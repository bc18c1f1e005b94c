//! Application state for the chat trainer and the research copilot.
//!
//! `AppState` is the single source of truth. It changes only through
//! `dispatch` (synchronous actions) and the token-checked `apply_*` methods
//! (results of async reloads). Side effects are never performed here: the
//! caller receives a list of `Effect`s and executes them.

use std::collections::HashSet;

use thiserror::Error;

use crate::models::{
    AlternativePath, ChatMessage, ChatPayload, Checkpoint, CitationResult,
    ClientAgentInternalScore, PitfallRecord, SessionAnalyses, SessionGuid, SessionOutcome,
    SignificanceRecord,
};

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Malformed shared data payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    #[error("Refusing to append an empty chat message")]
    EmptyMessage,

    #[error("Discarding stale response for {session} (generation {got}, latest {latest})")]
    StaleResponse {
        session: SessionGuid,
        got: u64,
        latest: u64,
    },
}

// ============================================================================
// Actions / effects
// ============================================================================

#[derive(Debug, Clone)]
pub enum Action {
    /// Latest chat response from the training backend.
    SetSharedData(ChatPayload),
    AddChatMessage(ChatMessage),
    /// Keep messages `[0, index]`.
    PruneChatMessages(usize),
    ClearChat,
    /// Replace the chat buffer with a server-side history.
    LoadHistory(Vec<ChatMessage>),
    /// Resume an existing training session as the active chat.
    SetChatSession(Option<SessionGuid>),
    SetCurrentSession(Option<SessionGuid>),
    SetReplayMessage(String),
    SetReplayAltPath(Option<AlternativePath>),
    DismissOutcome,
    SetDocText(String),
    AppendCitations(Vec<CitationResult>),
}

/// Identifies one session-scoped reload. Only the latest token may write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    pub session: SessionGuid,
    pub generation: u64,
}

/// Work the caller must perform after a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchCheckpoints(SessionGuid),
    FetchInternalScores(SessionGuid),
    /// Reload pitfalls, citations and significance analyses.
    ReloadAnalyses(RequestToken),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingFlags {
    pub pitfalls: bool,
    pub citations: bool,
    pub significance: bool,
}

impl LoadingFlags {
    fn all(value: bool) -> Self {
        Self {
            pitfalls: value,
            citations: value,
            significance: value,
        }
    }

    pub fn any(&self) -> bool {
        self.pitfalls || self.citations || self.significance
    }
}

// ============================================================================
// AppState
// ============================================================================

#[derive(Debug, Default)]
pub struct AppState {
    // --- training chat ---
    shared_data: Option<ChatPayload>,
    seen_payloads: HashSet<String>,
    chat_session: Option<SessionGuid>,
    chat_messages: Vec<ChatMessage>,
    outcome: Option<SessionOutcome>,
    outcome_modal: bool,
    running_score: Option<f64>,
    checkpoints: Vec<Checkpoint>,
    internal_scores: Vec<ClientAgentInternalScore>,
    replay_message: String,
    replay_alt_path: Option<AlternativePath>,

    // --- research copilot ---
    current_session: Option<SessionGuid>,
    generation: u64,
    doc_text: String,
    pitfalls: Vec<PitfallRecord>,
    citations: Vec<CitationResult>,
    significance: Vec<SignificanceRecord>,
    loading: LoadingFlags,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, action: Action) -> Result<Vec<Effect>, StoreError> {
        match action {
            Action::SetSharedData(payload) => Ok(self.set_shared_data(payload)),
            Action::AddChatMessage(message) => {
                if message.content.trim().is_empty() {
                    return Err(StoreError::EmptyMessage);
                }
                self.chat_messages.push(message);
                Ok(Vec::new())
            }
            Action::PruneChatMessages(index) => {
                self.chat_messages.truncate(index.saturating_add(1));
                Ok(Vec::new())
            }
            Action::ClearChat => {
                self.chat_messages.clear();
                self.seen_payloads.clear();
                self.shared_data = None;
                self.outcome = None;
                self.outcome_modal = false;
                self.running_score = None;
                self.checkpoints.clear();
                self.internal_scores.clear();
                Ok(Vec::new())
            }
            Action::LoadHistory(messages) => {
                self.chat_messages = messages;
                Ok(Vec::new())
            }
            Action::SetChatSession(session) => {
                let effects = match &session {
                    Some(guid) => vec![
                        Effect::FetchCheckpoints(guid.clone()),
                        Effect::FetchInternalScores(guid.clone()),
                    ],
                    None => Vec::new(),
                };
                self.chat_session = session;
                Ok(effects)
            }
            Action::SetCurrentSession(session) => Ok(self.set_current_session(session)),
            Action::SetReplayMessage(text) => {
                self.replay_message = text;
                Ok(Vec::new())
            }
            Action::SetReplayAltPath(path) => {
                self.replay_alt_path = path;
                Ok(Vec::new())
            }
            Action::DismissOutcome => {
                self.outcome_modal = false;
                Ok(Vec::new())
            }
            Action::SetDocText(text) => {
                self.doc_text = text;
                Ok(Vec::new())
            }
            Action::AppendCitations(mut found) => {
                self.citations.append(&mut found);
                Ok(Vec::new())
            }
        }
    }

    /// Parse raw response text and dispatch it as shared data.
    pub fn receive_raw(&mut self, raw: &str) -> Result<Vec<Effect>, StoreError> {
        let payload: ChatPayload =
            serde_json::from_str(raw).map_err(StoreError::MalformedPayload)?;
        self.dispatch(Action::SetSharedData(payload))
    }

    fn set_shared_data(&mut self, payload: ChatPayload) -> Vec<Effect> {
        if !self.seen_payloads.insert(payload.canonical_key()) {
            tracing::debug!("Ignoring already processed payload");
            return Vec::new();
        }

        if let Some(outcome) = payload.session_outcome {
            self.outcome = Some(outcome);
            if outcome.is_terminal() {
                tracing::info!(outcome = %outcome, "Session reached a terminal outcome");
                self.outcome_modal = true;
            }
        }
        if let Some(score) = payload.running_score {
            self.running_score = Some(score);
        }
        if let Some(text) = payload.reply_text() {
            self.chat_messages.push(ChatMessage::client_agent(text));
        }

        let mut effects = Vec::new();
        if let Some(session) = payload.session() {
            effects.push(Effect::FetchCheckpoints(session.clone()));
            effects.push(Effect::FetchInternalScores(session.clone()));
            self.chat_session = Some(session);
        }

        self.shared_data = Some(payload);
        effects
    }

    fn set_current_session(&mut self, session: Option<SessionGuid>) -> Vec<Effect> {
        if session == self.current_session {
            return Vec::new();
        }

        self.pitfalls.clear();
        self.citations.clear();
        self.significance.clear();
        self.generation += 1;
        self.current_session = session;

        match &self.current_session {
            Some(guid) => {
                tracing::info!(
                    session = %guid,
                    generation = self.generation,
                    "Switched research session"
                );
                self.loading = LoadingFlags::all(true);
                vec![Effect::ReloadAnalyses(RequestToken {
                    session: guid.clone(),
                    generation: self.generation,
                })]
            }
            None => {
                self.loading = LoadingFlags::default();
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------------
    // Async results
    // ------------------------------------------------------------------------

    /// Token for a reload of the current session, if one is active.
    pub fn current_token(&self) -> Option<RequestToken> {
        self.current_session.as_ref().map(|session| RequestToken {
            session: session.clone(),
            generation: self.generation,
        })
    }

    fn check_token(&self, token: &RequestToken) -> Result<(), StoreError> {
        let current = self.current_session.as_ref() == Some(&token.session);
        if current && token.generation == self.generation {
            Ok(())
        } else {
            Err(StoreError::StaleResponse {
                session: token.session.clone(),
                got: token.generation,
                latest: self.generation,
            })
        }
    }

    /// Install all three analysis lists at once.
    pub fn apply_analyses(
        &mut self,
        token: &RequestToken,
        analyses: SessionAnalyses,
    ) -> Result<(), StoreError> {
        self.check_token(token)?;
        self.pitfalls = analyses.pitfalls;
        self.citations = analyses.citations;
        self.significance = analyses.significance;
        self.loading = LoadingFlags::default();
        Ok(())
    }

    pub fn apply_pitfalls(
        &mut self,
        token: &RequestToken,
        pitfalls: Vec<PitfallRecord>,
    ) -> Result<(), StoreError> {
        self.check_token(token)?;
        self.pitfalls = pitfalls;
        self.loading.pitfalls = false;
        Ok(())
    }

    pub fn apply_significance(
        &mut self,
        token: &RequestToken,
        significance: Vec<SignificanceRecord>,
    ) -> Result<(), StoreError> {
        self.check_token(token)?;
        self.significance = significance;
        self.loading.significance = false;
        Ok(())
    }

    /// A reload failed: stop loading, keep the last successful lists.
    pub fn fail_reload(&mut self, token: &RequestToken) -> Result<(), StoreError> {
        self.check_token(token)?;
        self.loading = LoadingFlags::default();
        Ok(())
    }

    pub fn set_checkpoints(&mut self, checkpoints: Vec<Checkpoint>) {
        self.checkpoints = checkpoints;
    }

    pub fn set_internal_scores(&mut self, scores: Vec<ClientAgentInternalScore>) {
        self.internal_scores = scores;
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn shared_data(&self) -> Option<&ChatPayload> {
        self.shared_data.as_ref()
    }

    pub fn chat_session(&self) -> Option<&SessionGuid> {
        self.chat_session.as_ref()
    }

    pub fn chat_messages(&self) -> &[ChatMessage] {
        &self.chat_messages
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    pub fn outcome_modal_visible(&self) -> bool {
        self.outcome_modal
    }

    pub fn running_score(&self) -> Option<f64> {
        self.running_score
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn internal_scores(&self) -> &[ClientAgentInternalScore] {
        &self.internal_scores
    }

    pub fn replay_message(&self) -> &str {
        &self.replay_message
    }

    pub fn replay_alt_path(&self) -> Option<&AlternativePath> {
        self.replay_alt_path.as_ref()
    }

    pub fn current_session(&self) -> Option<&SessionGuid> {
        self.current_session.as_ref()
    }

    pub fn doc_text(&self) -> &str {
        &self.doc_text
    }

    pub fn pitfalls(&self) -> &[PitfallRecord] {
        &self.pitfalls
    }

    pub fn citations(&self) -> &[CitationResult] {
        &self.citations
    }

    pub fn significance(&self) -> &[SignificanceRecord] {
        &self.significance
    }

    pub fn loading(&self) -> LoadingFlags {
        self.loading
    }
}

// ============================================================================
// TESTS
// ============================================================================
