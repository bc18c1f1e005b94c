use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A library document uploaded for knowledge-graph construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    pub guid: Uuid,
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    pub created_date: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}
