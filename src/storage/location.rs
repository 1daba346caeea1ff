use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// File extension of persisted chat records.
pub const CHAT_EXTENSION: &str = "chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Autosave,
    Userchat,
    Archive,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Autosave, Tier::Userchat, Tier::Archive];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Tier::Autosave => "autosave",
            Tier::Userchat => "userchat",
            Tier::Archive => "archive",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Tier> {
        Tier::ALL.into_iter().find(|tier| tier.dir_name() == name)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// A chat record's address: one tier plus a `/`-separated path inside it.
///
/// Rendered and parsed as `"<tier>/<path>"`, which is also how it is stored
/// in an archived record's `archivedFrom` field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct StorageRef {
    tier: Tier,
    path: String,
}

impl StorageRef {
    pub fn new(tier: Tier, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        validate_relative(&path)?;
        Ok(Self { tier, path })
    }

    /// `autosave/autosave-<stamp>.chat`
    pub fn autosave(stamp: &str) -> Self {
        Self {
            tier: Tier::Autosave,
            path: format!("autosave-{}.{}", stamp.replace('/', "-"), CHAT_EXTENSION),
        }
    }

    /// Parses `"<tier>/<path>"`. Returns `None` when the first segment is not a tier.
    pub fn parse(input: &str) -> Option<Self> {
        let (tier, rest) = input.trim().split_once('/')?;
        let tier = Tier::from_dir_name(tier)?;
        Self::new(tier, rest).ok()
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Path relative to the chat history root.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.tier.dir_name());
        path.extend(self.path.split('/'));
        path
    }

    /// Where this record lands when archived: the origin tier directory is
    /// kept as a prefix so the archive mirrors the origin layout.
    pub fn archive_target(&self) -> StorageRef {
        StorageRef {
            tier: Tier::Archive,
            path: format!("{}/{}", self.tier.dir_name(), self.path),
        }
    }

    /// Same location with `-<suffix>` inserted before the extension.
    pub fn with_suffix(&self, suffix: &str) -> StorageRef {
        let (dir, name) = match self.path.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, self.path.as_str()),
        };
        let renamed = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, suffix, ext),
            _ => format!("{}-{}", name, suffix),
        };
        let path = match dir {
            Some(dir) => format!("{}/{}", dir, renamed),
            None => renamed,
        };
        StorageRef {
            tier: self.tier,
            path,
        }
    }
}

impl fmt::Display for StorageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tier.dir_name(), self.path)
    }
}

impl From<StorageRef> for String {
    fn from(value: StorageRef) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for StorageRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        StorageRef::parse(&value).ok_or_else(|| format!("invalid chat location: {}", value))
    }
}

/// Appends the chat extension unless the name already carries it.
pub fn with_chat_extension(name: &str) -> String {
    let suffix = format!(".{}", CHAT_EXTENSION);
    if name.ends_with(&suffix) {
        name.to_string()
    } else {
        format!("{}{}", name, suffix)
    }
}

fn validate_relative(path: &str) -> Result<()> {
    let invalid = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(ChatError::Validation(format!("Invalid chat path: {}", path)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let location = StorageRef::parse("userchat/notes.chat").unwrap();
        assert_eq!(location.tier(), Tier::Userchat);
        assert_eq!(location.file_name(), "notes.chat");
        assert_eq!(location.to_string(), "userchat/notes.chat");
    }

    #[test]
    fn test_parse_rejects_unknown_tier_and_traversal() {
        assert!(StorageRef::parse("notes.chat").is_none());
        assert!(StorageRef::parse("elsewhere/notes.chat").is_none());
        assert!(StorageRef::parse("archive/../secret.chat").is_none());
        assert!(StorageRef::parse("archive/").is_none());
    }

    #[test]
    fn test_archive_target_mirrors_origin_tier() {
        let location = StorageRef::parse("autosave/autosave-1.chat").unwrap();
        let target = location.archive_target();
        assert_eq!(target.tier(), Tier::Archive);
        assert_eq!(target.to_string(), "archive/autosave/autosave-1.chat");
        assert_eq!(target.file_name(), "autosave-1.chat");
    }

    #[test]
    fn test_with_suffix_keeps_extension_and_directory() {
        let location = StorageRef::parse("archive/userchat/notes.chat").unwrap();
        assert_eq!(
            location.with_suffix("20240101-120000").to_string(),
            "archive/userchat/notes-20240101-120000.chat"
        );
    }

    #[test]
    fn test_with_chat_extension() {
        assert_eq!(with_chat_extension("notes"), "notes.chat");
        assert_eq!(with_chat_extension("notes.chat"), "notes.chat");
    }

    #[test]
    fn test_serde_as_string() {
        let location = StorageRef::parse("userchat/a.chat").unwrap();
        let json = serde_json::to_string(&location).unwrap();
        assert_eq!(json, "\"userchat/a.chat\"");
        let back: StorageRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, location);
    }
}
