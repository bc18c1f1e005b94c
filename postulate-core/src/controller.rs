//! User-level flows of the chat trainer and the research copilot.
//!
//! `Controller` pairs the state store with a backend. Store effects are
//! executed here; failures of background fetches are logged and leave the
//! state as it was.

use std::sync::Arc;

use crate::client::BackendApi;
use crate::config::PostulateConfig;
use crate::error::PostulateError;
use crate::models::{
    AlternativePath, ChatMessage, ChatPayload, Checkpoint, CitationQuery, CitationResult,
    DraftRequest, ResearchCoachResponse, SessionAnalyses, SessionGuid, SignificanceRecord,
};
use crate::replay::{self, AlternateOutcome, DefaultAlternatePath, ReplayOutcome};
use crate::store::{Action, AppState, Effect, RequestToken};

pub struct Controller {
    api: Arc<dyn BackendApi>,
    state: AppState,
    default_path: DefaultAlternatePath,
}

impl Controller {
    pub fn new(api: Arc<dyn BackendApi>, config: &PostulateConfig) -> Self {
        Self {
            api,
            state: AppState::new(),
            default_path: DefaultAlternatePath::new(config.replay.default_path.clone()),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn api(&self) -> &dyn BackendApi {
        self.api.as_ref()
    }

    /// Dispatch an action and run whatever it asks for.
    pub async fn dispatch(&mut self, action: Action) -> Result<(), PostulateError> {
        let effects = self.state.dispatch(action)?;
        self.run_effects(effects).await;
        Ok(())
    }

    pub async fn run_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::FetchCheckpoints(session) => {
                    match self.api.list_checkpoints(&session).await {
                        Ok(checkpoints) => self.state.set_checkpoints(checkpoints),
                        Err(e) => {
                            tracing::warn!(session = %session, error = %e, "Checkpoint fetch failed")
                        }
                    }
                }
                Effect::FetchInternalScores(session) => {
                    match self.api.internal_scores(&session).await {
                        Ok(scores) => self.state.set_internal_scores(scores),
                        Err(e) => {
                            tracing::warn!(session = %session, error = %e, "Score fetch failed")
                        }
                    }
                }
                Effect::ReloadAnalyses(token) => self.reload_analyses(token).await,
            }
        }
    }

    async fn reload_analyses(&mut self, token: RequestToken) {
        let api = self.api.as_ref();
        let result = futures::try_join!(
            api.pitfalls_by_session(&token.session),
            api.citations_by_session(&token.session),
            api.significance_by_session(&token.session),
        );

        let applied = match result {
            Ok((pitfalls, citations, significance)) => self.state.apply_analyses(
                &token,
                SessionAnalyses {
                    pitfalls,
                    citations,
                    significance,
                },
            ),
            Err(e) => {
                tracing::error!(
                    session = %token.session,
                    error = %e,
                    "Failed to load session analyses"
                );
                self.state.fail_reload(&token)
            }
        };

        if let Err(e) = applied {
            tracing::warn!(error = %e, "Dropped analysis reload");
        }
    }

    // ========================================================================
    // Training chat
    // ========================================================================

    /// Start a role-play. Returns the new session.
    pub async fn start_session(
        &mut self,
        client_profile_id: &str,
    ) -> Result<SessionGuid, PostulateError> {
        self.dispatch(Action::ClearChat).await?;
        let payload = self.api.init_session(client_profile_id).await?;
        self.receive(payload).await?;

        let session = self
            .state
            .chat_session()
            .cloned()
            .ok_or(PostulateError::NoActiveSession)?;
        tracing::info!(session = %session, profile = client_profile_id, "Started role-play");
        Ok(session)
    }

    /// Load the server-side history of `session` and make it the active chat.
    pub async fn hydrate_history(&mut self, session: &SessionGuid) -> Result<(), PostulateError> {
        let model = self.api.get_session(session).await?;
        let history = model
            .client_agent_context
            .map(|ctx| ctx.history_messages())
            .unwrap_or_default();

        self.dispatch(Action::ClearChat).await?;
        self.dispatch(Action::LoadHistory(history)).await?;
        self.dispatch(Action::SetChatSession(Some(session.clone())))
            .await
    }

    /// Send a salesman turn. Blank input does nothing and returns `false`.
    pub async fn send_message(&mut self, text: &str) -> Result<bool, PostulateError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        let session = self
            .state
            .chat_session()
            .cloned()
            .ok_or(PostulateError::NoActiveSession)?;

        self.state
            .dispatch(Action::AddChatMessage(ChatMessage::salesman(text)))?;
        let payload = self.api.send_user_message(&session, text).await?;
        self.receive(payload).await?;
        Ok(true)
    }

    /// Apply a chat response and run its follow-up fetches.
    pub async fn receive(&mut self, payload: ChatPayload) -> Result<(), PostulateError> {
        self.dispatch(Action::SetSharedData(payload)).await
    }

    /// Pre-fill the replay editor from a suggested path.
    pub fn choose_replay_path(&mut self, path: AlternativePath) -> Result<(), PostulateError> {
        let message = path.first_message().unwrap_or_default().to_string();
        self.state.dispatch(Action::SetReplayMessage(message))?;
        self.state.dispatch(Action::SetReplayAltPath(Some(path)))?;
        Ok(())
    }

    /// Replay `checkpoint` with the current replay editor contents.
    pub async fn replay(
        &mut self,
        checkpoint: &Checkpoint,
    ) -> Result<ReplayOutcome, PostulateError> {
        let edited = self.state.replay_message().to_string();
        let selected = self.state.replay_alt_path().cloned();

        let outcome = replay::replay(
            self.api.as_ref(),
            &mut self.state,
            checkpoint,
            &edited,
            selected.as_ref(),
            &self.default_path,
        )
        .await?;

        self.state.dispatch(Action::SetReplayMessage(String::new()))?;
        self.state.dispatch(Action::SetReplayAltPath(None))?;
        self.run_effects(outcome.effects.clone()).await;
        Ok(outcome)
    }

    pub async fn use_alternate_path(
        &mut self,
        checkpoint: &Checkpoint,
        path: &AlternativePath,
    ) -> Result<AlternateOutcome, PostulateError> {
        let outcome =
            replay::use_alternate_path(self.api.as_ref(), &mut self.state, checkpoint, path)
                .await?;
        self.run_effects(outcome.effects.clone()).await;
        Ok(outcome)
    }

    // ========================================================================
    // Research copilot
    // ========================================================================

    pub async fn switch_session(
        &mut self,
        session: Option<SessionGuid>,
    ) -> Result<(), PostulateError> {
        self.dispatch(Action::SetCurrentSession(session)).await
    }

    fn research_session(&self) -> Result<SessionGuid, PostulateError> {
        self.state
            .current_session()
            .cloned()
            .ok_or(PostulateError::NoActiveSession)
    }

    pub async fn analyze_pitfalls(
        &mut self,
        draft: &str,
    ) -> Result<ResearchCoachResponse, PostulateError> {
        let session = self.research_session()?;
        self.state.dispatch(Action::SetDocText(draft.to_string()))?;

        let response = self
            .api
            .pitfall_analysis(&DraftRequest {
                draft_paper: draft.to_string(),
                session_guid: session.clone(),
            })
            .await?;

        if let Some(token) = self.state.current_token() {
            match self.api.pitfalls_by_session(&session).await {
                Ok(pitfalls) => {
                    if let Err(e) = self.state.apply_pitfalls(&token, pitfalls) {
                        tracing::warn!(error = %e, "Dropped pitfall reload");
                    }
                }
                Err(e) => tracing::warn!(session = %session, error = %e, "Pitfall reload failed"),
            }
        }
        Ok(response)
    }

    pub async fn analyze_significance(
        &mut self,
        draft: &str,
    ) -> Result<SignificanceRecord, PostulateError> {
        let session = self.research_session()?;
        self.state.dispatch(Action::SetDocText(draft.to_string()))?;

        let record = self
            .api
            .significance_clarification(&DraftRequest {
                draft_paper: draft.to_string(),
                session_guid: session.clone(),
            })
            .await?;

        if let Some(token) = self.state.current_token() {
            match self.api.significance_by_session(&session).await {
                Ok(records) => {
                    if let Err(e) = self.state.apply_significance(&token, records) {
                        tracing::warn!(error = %e, "Dropped significance reload");
                    }
                }
                Err(e) => {
                    tracing::warn!(session = %session, error = %e, "Significance reload failed")
                }
            }
        }
        Ok(record)
    }

    /// Search the knowledge graph. Results are added to the session's list.
    pub async fn search_citations(
        &mut self,
        query: &str,
    ) -> Result<Vec<CitationResult>, PostulateError> {
        let session = self.research_session()?;
        let found = self
            .api
            .citation_search(&CitationQuery {
                query: query.to_string(),
                session_guid: session,
            })
            .await?;

        tracing::info!(count = found.len(), "Citation search finished");
        self.state.dispatch(Action::AppendCitations(found.clone()))?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::testing::{pitfall, reply, FakeBackend};

    fn controller() -> (Arc<FakeBackend>, Controller) {
        let api = Arc::new(FakeBackend::new());
        let controller = Controller::new(api.clone(), &PostulateConfig::default());
        (api, controller)
    }

    #[tokio::test]
    async fn test_start_session_fetches_checkpoints_and_scores() {
        let (api, mut ctl) = controller();
        let session = ctl.start_session("p-1").await.unwrap();

        assert_eq!(session.as_str(), "s-1");
        assert_eq!(
            api.calls(),
            vec!["init_session", "list_checkpoints", "internal_scores"]
        );
        assert_eq!(ctl.state().checkpoints().len(), 1);
        assert_eq!(ctl.state().chat_messages()[0].content, "Hello, who is this?");
    }

    #[tokio::test]
    async fn test_blank_message_is_not_sent() {
        let (api, mut ctl) = controller();
        ctl.start_session("p-1").await.unwrap();

        assert!(!ctl.send_message("   ").await.unwrap());
        assert!(api.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_appends_turn_and_reply() {
        let (api, mut ctl) = controller();
        ctl.start_session("p-1").await.unwrap();

        assert!(ctl.send_message("  We cut costs by 20%  ").await.unwrap());

        let messages = ctl.state().chat_messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::Salesman);
        assert_eq!(messages[1].content, "We cut costs by 20%");
        assert_eq!(messages[2].content, "Tell me more.");
        assert_eq!(api.sent()[0].1, "We cut costs by 20%");
    }

    #[tokio::test]
    async fn test_send_without_session_fails() {
        let (_api, mut ctl) = controller();
        let err = ctl.send_message("hello").await.unwrap_err();
        assert!(matches!(err, PostulateError::NoActiveSession));
    }

    #[tokio::test]
    async fn test_terminal_reply_raises_outcome_modal() {
        let (api, mut ctl) = controller();
        ctl.start_session("p-1").await.unwrap();
        api.set_reply(reply("s-1", "Deal. Send the contract.", "SUCCESS"));

        ctl.send_message("Shall we sign today?").await.unwrap();
        assert!(ctl.state().outcome_modal_visible());
    }

    #[tokio::test]
    async fn test_failed_checkpoint_fetch_is_not_fatal() {
        let (api, mut ctl) = controller();
        api.fail_on("list_checkpoints");

        ctl.start_session("p-1").await.unwrap();
        assert!(ctl.state().checkpoints().is_empty());
        assert_eq!(ctl.state().chat_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_hydrate_history_resumes_session() {
        let (api, mut ctl) = controller();
        ctl.hydrate_history(&SessionGuid::from("s-1")).await.unwrap();

        assert_eq!(ctl.state().chat_messages()[0].content, "server copy");
        assert_eq!(ctl.state().chat_session().map(SessionGuid::as_str), Some("s-1"));
        assert!(api.calls().contains(&"list_checkpoints".to_string()));
    }

    #[tokio::test]
    async fn test_replay_uses_editor_contents_then_clears_them() {
        let (api, mut ctl) = controller();
        ctl.hydrate_history(&SessionGuid::from("s-1")).await.unwrap();
        ctl.choose_replay_path(AlternativePath {
            conversation_flow: vec![crate::models::ConversationFlowItem {
                speaker: "salesman".to_string(),
                message: "What does delay cost you?".to_string(),
            }],
            strategy: "Urgency".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(ctl.state().replay_message(), "What does delay cost you?");

        let checkpoint = Checkpoint {
            guid: "cp-1".to_string(),
            session_guid: Some(SessionGuid::from("s-1")),
            user_msg: Some("server copy".to_string()),
            user_msg_index: Some(0),
            ..Default::default()
        };
        let outcome = ctl.replay(&checkpoint).await.unwrap();

        assert_eq!(outcome.resolved.message, "What does delay cost you?");
        assert_eq!(api.path_requests()[0].selected_path.strategy, "Urgency");
        assert!(ctl.state().replay_message().is_empty());
        assert!(ctl.state().replay_alt_path().is_none());
        assert_eq!(ctl.state().chat_messages().len(), 2);
    }

    // ====== Research copilot ======

    #[tokio::test]
    async fn test_switch_session_loads_all_three_lists() {
        let (api, mut ctl) = controller();
        api.pitfalls.lock().unwrap().push(pitfall("r-1"));

        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();

        assert_eq!(ctl.state().pitfalls().len(), 1);
        assert!(!ctl.state().loading().any());
        let calls = api.calls();
        assert!(calls.contains(&"pitfalls_by_session".to_string()));
        assert!(calls.contains(&"citations_by_session".to_string()));
        assert!(calls.contains(&"significance_by_session".to_string()));
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_values() {
        let (api, mut ctl) = controller();
        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();
        ctl.search_citations("graph neural networks").await.unwrap();
        assert_eq!(ctl.state().citations().len(), 1);

        api.fail_on("pitfalls_by_session");
        ctl.analyze_pitfalls("Our method improves recall.").await.unwrap();

        // pitfall reload failed; citations untouched and loading cleared
        assert!(ctl.state().pitfalls().is_empty());
        assert_eq!(ctl.state().citations().len(), 1);
        assert!(!ctl.state().loading().any());
    }

    #[tokio::test]
    async fn test_switch_to_none_clears_lists() {
        let (api, mut ctl) = controller();
        api.pitfalls.lock().unwrap().push(pitfall("r-1"));
        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();

        ctl.switch_session(None).await.unwrap();
        assert!(ctl.state().pitfalls().is_empty());
        assert!(ctl.state().current_session().is_none());
    }

    #[tokio::test]
    async fn test_analyze_pitfalls_refreshes_list() {
        let (_api, mut ctl) = controller();
        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();

        let response = ctl.analyze_pitfalls("We propose a new index.").await.unwrap();
        assert_eq!(response.draft_text, "We propose a new index.");
        assert_eq!(ctl.state().pitfalls().len(), 1);
        assert_eq!(ctl.state().doc_text(), "We propose a new index.");
    }

    #[tokio::test]
    async fn test_analyze_significance_refreshes_list() {
        let (_api, mut ctl) = controller();
        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();

        let record = ctl.analyze_significance("This matters because...").await.unwrap();
        assert_eq!(record.status.as_deref(), Some("clear"));
        assert_eq!(ctl.state().significance().len(), 1);
    }

    #[tokio::test]
    async fn test_citations_accumulate_across_searches() {
        let (_api, mut ctl) = controller();
        ctl.switch_session(Some(SessionGuid::from("r-1"))).await.unwrap();

        ctl.search_citations("transformers").await.unwrap();
        ctl.search_citations("attention").await.unwrap();
        assert_eq!(ctl.state().citations().len(), 2);
    }

    #[tokio::test]
    async fn test_research_calls_need_a_session() {
        let (api, mut ctl) = controller();
        let err = ctl.search_citations("anything").await.unwrap_err();
        assert!(matches!(err, PostulateError::NoActiveSession));
        assert!(api.calls().is_empty());
    }
}
