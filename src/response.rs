use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::ChatError;
use crate::storage::ChatListing;

/// Shape returned by `/info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub file: String,
    pub model: String,
    /// Excludes the system prompt.
    pub message_count: usize,
    pub last_modified: Option<DateTime<Local>>,
}

/// Result of one dispatched line. Exactly one variant per response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Response {
    System(String),
    Error(String),
    Assistant(String),
    Chats(ChatListing),
    Prompts(Vec<String>),
    Results(Vec<String>),
    Models(Vec<String>),
    Summary(String),
    Info(SessionInfo),
}

impl Response {
    pub fn system(message: impl Into<String>) -> Self {
        Response::System(message.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error(_))
    }
}

impl From<ChatError> for Response {
    fn from(error: ChatError) -> Self {
        Response::Error(error.to_string())
    }
}
