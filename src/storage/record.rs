use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::location::StorageRef;
use crate::error::{ChatError, Result};
use crate::providers::Message;

/// Schema tag written on every save.
pub const CHAT_VERSION: &str = "1.0";

/// Version reported for records that predate the wrapped format.
pub const LEGACY_VERSION: &str = "0";

/// On-disk shape of one chat file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub name: String,
    pub version: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(
        rename = "archivedFrom",
        alias = "archived_from",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub archived_from: Option<StorageRef>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredChat {
    Wrapped {
        name: Option<String>,
        version: Option<String>,
        model: Option<String>,
        messages: Vec<Message>,
        #[serde(default)]
        summary: Option<String>,
        #[serde(rename = "archivedFrom", alias = "archived_from", default)]
        archived_from: Option<StorageRef>,
    },
    Legacy(Vec<Message>),
}

/// Decodes a chat file, upgrading a bare message list into a wrapped record.
/// Missing metadata falls back to the file stem and `default_model`.
pub fn decode(path: &Path, content: &str, default_model: &str) -> Result<ChatRecord> {
    let stored: StoredChat =
        serde_json::from_str(content).map_err(|e| ChatError::format(path, e))?;

    let stem = file_stem(path);
    let record = match stored {
        StoredChat::Legacy(messages) => ChatRecord {
            name: stem,
            version: LEGACY_VERSION.to_string(),
            model: default_model.to_string(),
            messages,
            summary: None,
            archived_from: None,
        },
        StoredChat::Wrapped {
            name,
            version,
            model,
            messages,
            summary,
            archived_from,
        } => ChatRecord {
            name: name.unwrap_or(stem),
            version: version.unwrap_or_else(|| CHAT_VERSION.to_string()),
            model: model.unwrap_or_else(|| default_model.to_string()),
            messages,
            summary: summary.filter(|s| !s.trim().is_empty()),
            archived_from,
        },
    };

    if record.messages.is_empty() {
        return Err(ChatError::format(path, "record has no messages"));
    }
    Ok(record)
}

pub fn encode(record: &ChatRecord) -> Result<String> {
    serde_json::to_string_pretty(record)
        .map_err(|e| ChatError::Validation(format!("Could not serialize chat: {}", e)))
}

/// Best-effort display name for listings: the record's `name` when the file
/// parses as a wrapped record, otherwise the file stem.
pub fn display_name(path: &Path) -> String {
    fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|value| {
            value
                .get("name")
                .and_then(|name| name.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| file_stem(path))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Writes `contents` next to `path` under a temporary name and renames it
/// into place, so the addressable file is always either the old or the new
/// complete record.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ChatError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    if let Err(e) = write_synced(&tmp, contents) {
        let _ = fs::remove_file(&tmp);
        return Err(ChatError::io(&tmp, e));
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(ChatError::io(path, e));
    }
    Ok(())
}

fn write_synced(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}
