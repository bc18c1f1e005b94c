//! Checkpoint replay and alternate-path selection.
//!
//! Replay rewinds the conversation to just before a checkpoint's message and
//! sends a new salesman turn in its place. The server keeps its own copy of
//! the history, so the rewind is a small saga:
//!
//! 1. resolve the outgoing message
//! 2. compute the rewound history
//! 3. overwrite the server history with it (`get_session` + `update_session`)
//! 4. record the path (`use_alternative_path`); on failure the server
//!    history from step 3 is put back
//! 5. prune the local buffer to the rewind point and append the outgoing message
//! 6. ask for the next agent turn and dispatch it as shared data

use std::fmt;

use thiserror::Error;

use crate::client::{ApiError, BackendApi};
use crate::config::DefaultPathConfig;
use crate::models::{
    AlternativePath, ChatMessage, Checkpoint, ConversationFlowItem, PathType, SessionGuid,
    UseAlternativePathRequest,
};
use crate::store::{Action, AppState, Effect, StoreError};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStep {
    FetchSession,
    UpdateSession,
    RecordPath,
    SendMessage,
}

impl fmt::Display for ReplayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReplayStep::FetchSession => "fetch session",
            ReplayStep::UpdateSession => "update session history",
            ReplayStep::RecordPath => "record alternative path",
            ReplayStep::SendMessage => "send message",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Nothing to send: enter a message or pick an alternative path")]
    NothingToSend,

    #[error("Checkpoint {0} is not attached to a session")]
    MissingSession(String),

    #[error("Replay stopped at {step} (server history restored: {compensated}): {source}")]
    Step {
        step: ReplayStep,
        compensated: bool,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReplayError {
    fn at(step: ReplayStep) -> impl FnOnce(ApiError) -> ReplayError {
        move |source| ReplayError::Step {
            step,
            compensated: false,
            source,
        }
    }
}

// ============================================================================
// Message resolution
// ============================================================================

/// Strategy metadata used when a replay is sent without a selected path.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultAlternatePath {
    config: DefaultPathConfig,
}

impl DefaultAlternatePath {
    pub fn new(config: DefaultPathConfig) -> Self {
        Self { config }
    }

    /// A single-turn path carrying `message`.
    pub fn build(&self, message: &str) -> AlternativePath {
        AlternativePath {
            conversation_flow: vec![ConversationFlowItem {
                speaker: self.config.speaker.clone(),
                message: message.to_string(),
            }],
            strategy: self.config.strategy.clone(),
            technique_used: self.config.technique_used.clone(),
            rationale: self.config.rationale.clone(),
            expected_outcome: self.config.expected_outcome.clone(),
        }
    }
}

impl Default for DefaultAlternatePath {
    fn default() -> Self {
        Self::new(DefaultPathConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaySource {
    /// Text typed in the replay editor
    Edited,
    /// First message of the selected alternative path
    SelectedPath,
    /// The checkpoint's own message, sent again
    CheckpointMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedReplay {
    pub message: String,
    pub path: AlternativePath,
    pub source: ReplaySource,
}

/// Pick the message to send and the path to report for it.
///
/// Precedence is edited text, then the selected path's first message, then
/// the checkpoint's original message. The selected path's metadata is kept
/// when there is one; otherwise `default` supplies it.
pub fn resolve_outgoing(
    edited: &str,
    selected: Option<&AlternativePath>,
    checkpoint_message: Option<&str>,
    default: &DefaultAlternatePath,
) -> Result<ResolvedReplay, ReplayError> {
    let edited = edited.trim();
    let (message, source) = if !edited.is_empty() {
        (edited.to_string(), ReplaySource::Edited)
    } else if let Some(first) = selected.and_then(AlternativePath::first_message) {
        (first.to_string(), ReplaySource::SelectedPath)
    } else if let Some(original) = checkpoint_message.filter(|m| !m.trim().is_empty()) {
        (original.to_string(), ReplaySource::CheckpointMessage)
    } else {
        return Err(ReplayError::NothingToSend);
    };

    let path = match selected {
        Some(path) => with_first_message(path, &message, &default.config.speaker),
        None => default.build(&message),
    };

    Ok(ResolvedReplay {
        message,
        path,
        source,
    })
}

fn with_first_message(path: &AlternativePath, message: &str, speaker: &str) -> AlternativePath {
    let mut path = path.clone();
    match path.conversation_flow.first_mut() {
        Some(first) => first.message = message.to_string(),
        None => path.conversation_flow.push(ConversationFlowItem {
            speaker: speaker.to_string(),
            message: message.to_string(),
        }),
    }
    path
}

/// Messages strictly before `user_msg_index`, or the whole buffer when the
/// checkpoint has no index.
pub fn rewound_history(
    messages: &[ChatMessage],
    user_msg_index: Option<usize>,
) -> Vec<ChatMessage> {
    match user_msg_index {
        Some(index) => messages[..index.min(messages.len())].to_vec(),
        None => messages.to_vec(),
    }
}

/// Store action that commits the rewind locally. Index 0 empties the buffer.
pub fn rewind_action(user_msg_index: Option<usize>) -> Option<Action> {
    match user_msg_index {
        Some(0) => Some(Action::LoadHistory(Vec::new())),
        Some(index) => Some(Action::PruneChatMessages(index - 1)),
        None => None,
    }
}

fn session_for(checkpoint: &Checkpoint, state: &AppState) -> Result<SessionGuid, ReplayError> {
    checkpoint
        .session_guid
        .clone()
        .or_else(|| state.chat_session().cloned())
        .ok_or_else(|| ReplayError::MissingSession(checkpoint.guid.clone()))
}

// ============================================================================
// Flows
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub session: SessionGuid,
    pub resolved: ResolvedReplay,
    /// Messages left in the buffer after the rewind
    pub kept: usize,
    /// Effects produced by dispatching the agent's reply
    pub effects: Vec<Effect>,
}

/// Rewind to `checkpoint` and send a new salesman turn.
pub async fn replay(
    api: &dyn BackendApi,
    state: &mut AppState,
    checkpoint: &Checkpoint,
    edited: &str,
    selected: Option<&AlternativePath>,
    default: &DefaultAlternatePath,
) -> Result<ReplayOutcome, ReplayError> {
    let resolved = resolve_outgoing(edited, selected, checkpoint.user_msg.as_deref(), default)?;
    let session = session_for(checkpoint, state)?;
    let rewound = rewound_history(state.chat_messages(), checkpoint.user_msg_index);

    tracing::info!(
        checkpoint = %checkpoint.guid,
        session = %session,
        source = ?resolved.source,
        kept = rewound.len(),
        "Replaying from checkpoint"
    );

    let mut model = api
        .get_session(&session)
        .await
        .map_err(ReplayError::at(ReplayStep::FetchSession))?;

    let context = model.client_agent_context.get_or_insert_with(Default::default);
    let previous_history = std::mem::take(&mut context.conversation_history);
    context.set_history(&rewound);

    api.update_session(&session, &model)
        .await
        .map_err(ReplayError::at(ReplayStep::UpdateSession))?;

    let request = UseAlternativePathRequest {
        selected_path: resolved.path.clone(),
        checkpoint_guid: checkpoint.guid.clone(),
        path_type: PathType::Replay,
    };
    if let Err(source) = api.use_alternative_path(&request).await {
        tracing::error!(
            checkpoint = %checkpoint.guid,
            error = %source,
            "Recording replay path failed"
        );

        if let Some(context) = model.client_agent_context.as_mut() {
            context.conversation_history = previous_history;
        }
        let compensated = match api.update_session(&session, &model).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(session = %session, error = %e, "Restoring server history failed");
                false
            }
        };

        return Err(ReplayError::Step {
            step: ReplayStep::RecordPath,
            compensated,
            source,
        });
    }

    // Server now agrees with the rewound buffer; commit it locally.
    if let Some(action) = rewind_action(checkpoint.user_msg_index) {
        state.dispatch(action)?;
    }
    state.dispatch(Action::AddChatMessage(ChatMessage::salesman(
        resolved.message.as_str(),
    )))?;

    let payload = api
        .send_user_message(&session, &resolved.message)
        .await
        .map_err(ReplayError::at(ReplayStep::SendMessage))?;
    let effects = state.dispatch(Action::SetSharedData(payload))?;

    Ok(ReplayOutcome {
        session,
        resolved,
        kept: rewound.len(),
        effects,
    })
}

#[derive(Debug, Clone)]
pub struct AlternateOutcome {
    pub session: SessionGuid,
    pub message: String,
    pub effects: Vec<Effect>,
}

/// Continue the conversation with a suggested path, as-is.
pub async fn use_alternate_path(
    api: &dyn BackendApi,
    state: &mut AppState,
    checkpoint: &Checkpoint,
    path: &AlternativePath,
) -> Result<AlternateOutcome, ReplayError> {
    let request = UseAlternativePathRequest {
        selected_path: path.clone(),
        checkpoint_guid: checkpoint.guid.clone(),
        path_type: PathType::Alternate,
    };
    let used = api
        .use_alternative_path(&request)
        .await
        .map_err(ReplayError::at(ReplayStep::RecordPath))?
        .response;

    let message = used
        .used_path
        .first_message()
        .or_else(|| path.first_message())
        .ok_or(ReplayError::NothingToSend)?
        .to_string();
    let session = used.session_guid;

    tracing::info!(checkpoint = %checkpoint.guid, session = %session, "Using alternative path");

    state.dispatch(Action::AddChatMessage(ChatMessage::salesman(message.as_str())))?;

    let payload = api
        .send_user_message(&session, &message)
        .await
        .map_err(ReplayError::at(ReplayStep::SendMessage))?;
    let effects = state.dispatch(Action::SetSharedData(payload))?;

    Ok(AlternateOutcome {
        session,
        message,
        effects,
    })
}

// ============================================================================
// TESTS
// ============================================================================
