use chrono::{DateTime, Local, NaiveDateTime};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::providers::{Message, Role};
use crate::storage::{ChatRecord, StorageRef, Tier, CHAT_VERSION};

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const DEFAULT_NAME_PREFIX: &str = "Chat ";

/// The live conversation: transcript plus the metadata persisted with it.
///
/// `messages[0]` is always the system prompt.
#[derive(Debug, Clone)]
pub struct ChatSession {
    /// In-memory identity, regenerated on every new or loaded session.
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub summary: Option<String>,
    /// Where every persist of this session goes.
    pub location: StorageRef,
    pub archived_from: Option<StorageRef>,
    /// Set once the auto-naming request has been issued for this session.
    pub naming_attempted: bool,
}

impl ChatSession {
    pub fn new(system_prompt: &str, model: &str, now: DateTime<Local>) -> Self {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        Self {
            id: Uuid::new_v4(),
            name: format!("{}{}", DEFAULT_NAME_PREFIX, stamp),
            version: CHAT_VERSION.to_string(),
            model: model.to_string(),
            messages: vec![Message::system(system_prompt)],
            summary: None,
            location: StorageRef::autosave(&stamp),
            archived_from: None,
            naming_attempted: false,
        }
    }

    /// Builds a session from a stored record. A transcript that does not
    /// open with a system message gets `default_system_prompt` in front.
    pub fn from_record(record: ChatRecord, location: StorageRef, default_system_prompt: &str) -> Self {
        let mut messages = record.messages;
        if messages.first().map(|m| m.role) != Some(Role::System) {
            messages.insert(0, Message::system(default_system_prompt));
        }
        Self {
            id: Uuid::new_v4(),
            name: record.name,
            version: record.version,
            model: record.model,
            messages,
            summary: record.summary,
            location,
            archived_from: record.archived_from,
            naming_attempted: false,
        }
    }

    /// The record written on persist. Always carries the current schema tag;
    /// the archive stamp is only kept while the session lives in the archive.
    pub fn to_record(&self) -> ChatRecord {
        let archived_from = match self.location.tier() {
            Tier::Archive => self.archived_from.clone(),
            _ => None,
        };
        ChatRecord {
            name: self.name.clone(),
            version: CHAT_VERSION.to_string(),
            model: self.model.clone(),
            messages: self.messages.clone(),
            summary: self.summary.clone(),
            archived_from,
        }
    }

    pub fn mark_persisted(&mut self) {
        self.version = CHAT_VERSION.to_string();
    }

    /// True while the name is still the generated `Chat <timestamp>` label.
    pub fn is_default_name(&self) -> bool {
        self.name
            .strip_prefix(DEFAULT_NAME_PREFIX)
            .is_some_and(|stamp| NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok())
    }

    pub fn replace_system_prompt(&mut self, text: &str) {
        let system = Message::system(text);
        match self.messages.first_mut() {
            Some(first) => *first = system,
            None => self.messages.push(system),
        }
    }

    /// Appends a user turn and returns its index.
    pub fn append_user(&mut self, text: &str) -> usize {
        self.messages.push(Message::user(text));
        self.messages.len() - 1
    }

    pub fn append_assistant(&mut self, text: &str) -> usize {
        self.messages.push(Message::assistant(text));
        self.messages.len() - 1
    }

    /// Removes the user turn appended at `index`, if it is still there.
    pub fn remove_user_turn(&mut self, index: usize, content: &str) -> bool {
        let matches = index > 0
            && self
                .messages
                .get(index)
                .is_some_and(|m| m.role == Role::User && m.content == content);
        if matches {
            self.messages.remove(index);
        }
        matches
    }

    pub fn rename(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("Chat name cannot be empty".to_string()));
        }
        self.name = name.to_string();
        Ok(())
    }

    pub fn set_model(&mut self, id: &str) -> Result<()> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ChatError::Validation("Usage: /model [id|select]".to_string()));
        }
        self.model = id.to_string();
        Ok(())
    }

    /// Number of messages excluding the system prompt.
    pub fn message_count(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }

    /// Case-insensitive substring scan over everything but the system prompt.
    pub fn search(&self, term: &str) -> Vec<String> {
        let term = term.to_lowercase();
        self.messages
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, m)| m.content.to_lowercase().contains(&term))
            .map(|(i, m)| format!("{}: {} - {}", i, m.role, m.content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    fn session() -> ChatSession {
        ChatSession::new("You are terse.", "llama3-70b-8192", fixed_now())
    }

    #[test]
    fn test_new_session_defaults() {
        let session = session();
        assert_eq!(session.name, "Chat 20240309-140507");
        assert!(session.is_default_name());
        assert_eq!(session.location.to_string(), "autosave/autosave-20240309-140507.chat");
        assert_eq!(session.messages, vec![Message::system("You are terse.")]);
        assert_eq!(session.message_count(), 0);
    }

    #[test]
    fn test_replace_system_prompt_keeps_history() {
        let mut session = session();
        session.append_user("hi");
        session.append_assistant("hello");
        session.replace_system_prompt("Be verbose.");
        assert_eq!(session.messages.len(), 3);
        assert_eq!(session.messages[0].content, "Be verbose.");
        assert_eq!(session.messages[0].role, Role::System);
    }

    #[test]
    fn test_rename_clears_default_and_rejects_blank() {
        let mut session = session();
        assert!(session.rename("   ").is_err());
        assert!(session.is_default_name());
        session.rename("Weekend trip").unwrap();
        assert!(!session.is_default_name());
    }

    #[test]
    fn test_chat_prefix_alone_is_not_default() {
        let mut session = session();
        session.rename("Chat about rust").unwrap();
        assert!(!session.is_default_name());
    }

    #[test]
    fn test_remove_user_turn_only_removes_matching_message() {
        let mut session = session();
        let index = session.append_user("question");
        assert!(!session.remove_user_turn(index, "other"));
        assert!(!session.remove_user_turn(0, "You are terse."));
        assert!(session.remove_user_turn(index, "question"));
        assert_eq!(session.messages.len(), 1);
        assert!(!session.remove_user_turn(index, "question"));
    }

    #[test]
    fn test_search_is_case_insensitive_and_skips_system() {
        let mut session = ChatSession::new("foo system", "m", fixed_now());
        session.append_user("Tell me about FOOd");
        session.append_assistant("Sure.");
        session.append_user("more foo please");

        let results = session.search("foo");
        assert_eq!(
            results,
            vec![
                "1: user - Tell me about FOOd".to_string(),
                "3: user - more foo please".to_string(),
            ]
        );
    }

    #[test]
    fn test_from_record_inserts_missing_system_prompt() {
        let record = ChatRecord {
            name: "legacy".to_string(),
            version: "0".to_string(),
            model: "m".to_string(),
            messages: vec![Message::user("hi")],
            summary: None,
            archived_from: None,
        };
        let location = StorageRef::parse("userchat/legacy.chat").unwrap();
        let session = ChatSession::from_record(record, location, "default prompt");
        assert_eq!(session.messages[0], Message::system("default prompt"));
        assert_eq!(session.messages[1], Message::user("hi"));
        assert_eq!(session.version, "0");
    }

    #[test]
    fn test_to_record_drops_stamp_outside_archive() {
        let mut session = session();
        session.archived_from = StorageRef::parse("userchat/a.chat");
        session.version = "0".to_string();

        let record = session.to_record();
        assert_eq!(record.version, CHAT_VERSION);
        assert_eq!(record.archived_from, None);

        session.location = StorageRef::parse("archive/userchat/a.chat").unwrap();
        assert_eq!(session.to_record().archived_from, StorageRef::parse("userchat/a.chat"));
    }
}
