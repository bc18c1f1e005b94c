//! REST client for the Postulate backends
//!
//! Two services sit behind one `BackendApi` trait:
//! - **training**: role-play sessions, chat turns, checkpoints, client profiles
//! - **research**: copilot sessions, pitfall/significance agents, citation
//!   search, knowledge-graph construction and the document library
//!
//! Every response is parsed into its schema here; a body that does not fit
//! is reported as `ApiError::Payload` rather than passed on as loose JSON.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use uuid::Uuid;

use crate::config::ApiConfig;
use crate::models::{
    ChatPayload, Checkpoint, CheckpointList, CitationQuery, CitationResult,
    ClientAgentInternalScore, ClientProfile, DraftRequest, FileItem, FlowNode, NewSession,
    PitfallRecord, ResearchCoachResponse, Session, SessionGuid, SignificanceRecord,
    UseAlternativePathRequest, UsedPathResponse,
};

// ============================================================================
// BackendApi trait
// ============================================================================

/// Abstraction over the training and research REST APIs.
#[async_trait]
pub trait BackendApi: Send + Sync {
    // --- training ---

    async fn list_client_profiles(&self) -> Result<Vec<ClientProfile>, ApiError>;

    /// Per-turn internal scores the client agent kept for a session.
    async fn internal_scores(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<ClientAgentInternalScore>, ApiError>;

    /// Start a role-play against a client profile. The payload names the
    /// new session and usually carries the agent's opening line.
    async fn init_session(&self, client_profile_id: &str) -> Result<ChatPayload, ApiError>;

    async fn send_user_message(
        &self,
        session: &SessionGuid,
        user_response: &str,
    ) -> Result<ChatPayload, ApiError>;

    async fn use_alternative_path(
        &self,
        request: &UseAlternativePathRequest,
    ) -> Result<UsedPathResponse, ApiError>;

    async fn get_session(&self, session: &SessionGuid) -> Result<Session, ApiError>;

    async fn update_session(
        &self,
        session: &SessionGuid,
        model: &Session,
    ) -> Result<serde_json::Value, ApiError>;

    async fn list_training_sessions(&self) -> Result<Vec<Session>, ApiError>;

    async fn conversation_flow(&self, session: &SessionGuid) -> Result<Vec<FlowNode>, ApiError>;

    /// Checkpoints with a triggering message, in server order.
    async fn list_checkpoints(&self, session: &SessionGuid) -> Result<Vec<Checkpoint>, ApiError>;

    // --- research ---

    async fn create_session(&self, new_session: &NewSession) -> Result<Session, ApiError>;

    async fn list_sessions(&self, user_guid: Uuid) -> Result<Vec<Session>, ApiError>;

    async fn pitfall_analysis(
        &self,
        request: &DraftRequest,
    ) -> Result<ResearchCoachResponse, ApiError>;

    async fn significance_clarification(
        &self,
        request: &DraftRequest,
    ) -> Result<SignificanceRecord, ApiError>;

    async fn citation_search(&self, query: &CitationQuery) -> Result<Vec<CitationResult>, ApiError>;

    async fn construct_knowledge_graph(&self, file_guids: &[Uuid]) -> Result<String, ApiError>;

    async fn upload_files(&self, paths: &[PathBuf]) -> Result<Vec<FileItem>, ApiError>;

    async fn list_files(&self) -> Result<Vec<FileItem>, ApiError>;

    async fn pitfalls_by_session(&self, session: &SessionGuid)
        -> Result<Vec<PitfallRecord>, ApiError>;

    async fn citations_by_session(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<CitationResult>, ApiError>;

    async fn significance_by_session(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<SignificanceRecord>, ApiError>;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response from {operation}: {source}")]
    Payload {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// Transport failures, throttling and server faults may succeed on a
    /// second attempt; client errors and bad payloads will not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ApiError::Api { status, .. } => *status == 429 || *status >= 500,
            ApiError::Payload { .. } | ApiError::File { .. } => false,
        }
    }

    /// Text suitable for an inline error banner.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Api { message, .. } => message.clone(),
            ApiError::Http(_) => "Could not reach the server".to_string(),
            ApiError::Payload { operation, .. } => {
                format!("The server sent an unexpected response to {}", operation)
            }
            ApiError::File { path, .. } => format!("Could not read {}", path),
        }
    }
}

// ============================================================================
// Wire structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

impl ErrorBody {
    fn message(self) -> Option<String> {
        let pick = |v: serde_json::Value| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Object(map) => map
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string),
            _ => None,
        };
        self.error
            .and_then(pick)
            .or_else(|| self.detail.and_then(pick))
            .filter(|m| !m.trim().is_empty())
    }
}

#[derive(Debug, Serialize)]
struct SessionInitRequest<'a> {
    client_profile_id: &'a str,
}

#[derive(Debug, Serialize)]
struct UserMessageRequest<'a> {
    session_id: &'a SessionGuid,
    user_response: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateSessionRequest<'a> {
    session_id: &'a SessionGuid,
    session_model: &'a Session,
}

#[derive(Debug, Serialize)]
struct ConstructRequest<'a> {
    file_guids: &'a [Uuid],
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope {
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Clone, Copy)]
enum Service {
    Training,
    Research,
}

// ============================================================================
// HttpBackend
// ============================================================================

/// `BackendApi` over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    training_url: String,
    research_url: String,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::with_base_urls(config, &config.training_url, &config.research_url)
    }

    /// Create a client against explicit base URLs (for testing / integration)
    pub fn with_base_urls(
        config: &ApiConfig,
        training_url: &str,
        research_url: &str,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            training_url: training_url.trim_end_matches('/').to_string(),
            research_url: research_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    fn url(&self, service: Service, path: &str) -> String {
        let base = match service {
            Service::Training => &self.training_url,
            Service::Research => &self.research_url,
        };
        format!("{}{}", base, path)
    }

    /// GET with retry on transient failures.
    async fn get<T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let url = self.url(service, path);
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.retry_delay_ms.max(1))
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::start(
            strategy,
            || self.execute(self.client.get(url.as_str()), operation),
            |e: &ApiError| {
                let retry = e.is_retryable();
                if retry {
                    tracing::warn!(operation, error = %e, "Retrying read");
                }
                retry
            },
        )
        .await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: Service,
        path: &str,
        body: &B,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let request = self.client.post(self.url(service, path)).json(body);
        self.execute(request, operation).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        operation: &'static str,
    ) -> Result<T, ApiError> {
        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(ErrorBody::message)
                .unwrap_or_else(|| {
                    if body.trim().is_empty() {
                        format!("Failed to {}", operation)
                    } else {
                        body.clone()
                    }
                });

            tracing::error!(
                status = status.as_u16(),
                operation,
                message = %message,
                "Backend returned an error"
            );

            return Err(ApiError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| ApiError::Payload { operation, source })
    }
}

async fn file_part(path: &Path) -> Result<Part, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::File {
        path: path.display().to_string(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn list_client_profiles(&self) -> Result<Vec<ClientProfile>, ApiError> {
        self.get(
            Service::Training,
            "/client_profile/get-all",
            "list client profiles",
        )
        .await
    }

    async fn internal_scores(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<ClientAgentInternalScore>, ApiError> {
        let operation = "fetch internal scoring";
        let envelope: DataEnvelope = self
            .get(
                Service::Training,
                &format!(
                    "/client_profile/get-client-internal-scoring-by-session-id/{}",
                    session
                ),
                operation,
            )
            .await?;

        match envelope.data {
            data @ serde_json::Value::Array(_) => {
                serde_json::from_value(data).map_err(|source| ApiError::Payload { operation, source })
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn init_session(&self, client_profile_id: &str) -> Result<ChatPayload, ApiError> {
        self.post(
            Service::Training,
            "/session/session-init",
            &SessionInitRequest { client_profile_id },
            "start session",
        )
        .await
    }

    async fn send_user_message(
        &self,
        session: &SessionGuid,
        user_response: &str,
    ) -> Result<ChatPayload, ApiError> {
        self.post(
            Service::Training,
            "/session/user-msg",
            &UserMessageRequest {
                session_id: session,
                user_response,
            },
            "send message",
        )
        .await
    }

    async fn use_alternative_path(
        &self,
        request: &UseAlternativePathRequest,
    ) -> Result<UsedPathResponse, ApiError> {
        self.post(
            Service::Training,
            "/session/use-alternative-path",
            request,
            "use alternative path",
        )
        .await
    }

    async fn get_session(&self, session: &SessionGuid) -> Result<Session, ApiError> {
        self.get(
            Service::Training,
            &format!("/session/get-by-guid/{}", session),
            "fetch session",
        )
        .await
    }

    async fn update_session(
        &self,
        session: &SessionGuid,
        model: &Session,
    ) -> Result<serde_json::Value, ApiError> {
        let request = self
            .client
            .put(self.url(Service::Training, "/session/update"))
            .json(&UpdateSessionRequest {
                session_id: session,
                session_model: model,
            });
        self.execute(request, "update session").await
    }

    async fn list_training_sessions(&self) -> Result<Vec<Session>, ApiError> {
        self.get(Service::Training, "/session/listing", "list sessions")
            .await
    }

    async fn conversation_flow(&self, session: &SessionGuid) -> Result<Vec<FlowNode>, ApiError> {
        self.get(
            Service::Training,
            &format!("/session/conversation-flow/{}", session),
            "fetch conversation flow",
        )
        .await
    }

    async fn list_checkpoints(&self, session: &SessionGuid) -> Result<Vec<Checkpoint>, ApiError> {
        let list: Option<CheckpointList> = self
            .get(
                Service::Training,
                &format!("/checkpoint/get-by-session-id/{}", session),
                "fetch checkpoints",
            )
            .await?;
        Ok(list.map(CheckpointList::into_displayable).unwrap_or_default())
    }

    async fn create_session(&self, new_session: &NewSession) -> Result<Session, ApiError> {
        self.post(
            Service::Research,
            "/session/create",
            new_session,
            "create session",
        )
        .await
    }

    async fn list_sessions(&self, user_guid: Uuid) -> Result<Vec<Session>, ApiError> {
        self.get(
            Service::Research,
            &format!("/session/listing/{}", user_guid),
            "list sessions",
        )
        .await
    }

    async fn pitfall_analysis(
        &self,
        request: &DraftRequest,
    ) -> Result<ResearchCoachResponse, ApiError> {
        self.post(
            Service::Research,
            "/agent/pitfall-analysis",
            request,
            "analyze draft",
        )
        .await
    }

    async fn significance_clarification(
        &self,
        request: &DraftRequest,
    ) -> Result<SignificanceRecord, ApiError> {
        self.post(
            Service::Research,
            "/agent/significance-clarification",
            request,
            "capture impact points",
        )
        .await
    }

    async fn citation_search(&self, query: &CitationQuery) -> Result<Vec<CitationResult>, ApiError> {
        self.post(
            Service::Research,
            "/kg/citation-search",
            query,
            "search citations",
        )
        .await
    }

    async fn construct_knowledge_graph(&self, file_guids: &[Uuid]) -> Result<String, ApiError> {
        let resp: MessageResponse = self
            .post(
                Service::Research,
                "/kg/construct",
                &ConstructRequest { file_guids },
                "construct knowledge graph",
            )
            .await?;
        Ok(resp.message)
    }

    async fn upload_files(&self, paths: &[PathBuf]) -> Result<Vec<FileItem>, ApiError> {
        let mut form = Form::new();
        for path in paths {
            form = form.part("files", file_part(path).await?);
        }

        tracing::info!(count = paths.len(), "Uploading library documents");

        let request = self
            .client
            .post(self.url(Service::Research, "/file-upload/upload/multi"))
            .multipart(form);
        self.execute(request, "upload files").await
    }

    async fn list_files(&self) -> Result<Vec<FileItem>, ApiError> {
        self.get(Service::Research, "/file-upload/list", "list files")
            .await
    }

    async fn pitfalls_by_session(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<PitfallRecord>, ApiError> {
        self.get(
            Service::Research,
            &format!("/pitfall/session/{}", session),
            "fetch pitfalls",
        )
        .await
    }

    async fn citations_by_session(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<CitationResult>, ApiError> {
        self.get(
            Service::Research,
            &format!("/citation/session/{}", session),
            "fetch citations",
        )
        .await
    }

    async fn significance_by_session(
        &self,
        session: &SessionGuid,
    ) -> Result<Vec<SignificanceRecord>, ApiError> {
        self.get(
            Service::Research,
            &format!("/significance-analysis/session/{}", session),
            "fetch significance analyses",
        )
        .await
    }
}

// ============================================================================
// TESTS
// ============================================================================
