pub mod location;
pub mod record;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{ChatError, Result};
pub use location::{with_chat_extension, StorageRef, Tier, CHAT_EXTENSION};
pub use record::{ChatRecord, CHAT_VERSION, LEGACY_VERSION};

/// One row of the tiered listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    /// Location rendered as `<tier>/<path>`, accepted back by `/load`.
    pub file: String,
    pub name: String,
}

pub type ChatListing = BTreeMap<Tier, Vec<ChatEntry>>;

/// Tiered persistence for chat records.
pub trait ChatStorage: Send + Sync {
    /// Overwrites the record at `location`, creating the tier if needed.
    fn save(&self, location: &StorageRef, record: &ChatRecord) -> Result<PathBuf>;

    /// Resolves a name against the literal path, then the autosave, user
    /// and archive tiers (the archive recursively). First hit wins.
    fn load(&self, name: &str) -> Result<(ChatRecord, StorageRef)>;

    /// Resolves a name inside the archive tier only: the literal
    /// `archive/...` path, a path relative to the archive, or a file name
    /// anywhere below it.
    fn find_archived(&self, name: &str) -> Option<StorageRef>;

    /// Moves a record into the archive and stamps where it came from.
    fn archive(&self, location: &StorageRef) -> Result<StorageRef>;

    /// Moves an archived record back to its stamped origin.
    fn restore(&self, location: &StorageRef) -> Result<StorageRef>;

    /// Permanently removes an archived record.
    fn delete(&self, location: &StorageRef) -> Result<()>;

    /// Removes every record in the archive tier, returning how many were removed.
    fn clear_archive(&self) -> Result<usize>;

    fn list_all(&self) -> ChatListing;

    fn exists(&self, location: &StorageRef) -> bool;

    fn modified_at(&self, location: &StorageRef) -> Option<DateTime<Local>>;

    /// Most recently modified autosave record other than `exclude`.
    fn latest_autosave(&self, exclude: &StorageRef) -> Option<StorageRef>;
}

/// `ChatStorage` over a directory holding one subdirectory per tier.
pub struct FileChatStorage {
    root: PathBuf,
    default_model: String,
}

impl FileChatStorage {
    /// Opens the store, creating the root and all tier directories.
    /// Failure here means the persistence root is unusable.
    pub fn open(root: impl Into<PathBuf>, default_model: impl Into<String>) -> Result<Self> {
        let storage = Self {
            root: root.into(),
            default_model: default_model.into(),
        };
        storage.ensure_directories()?;
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_directories(&self) -> Result<()> {
        for tier in Tier::ALL {
            let dir = self.tier_dir(tier);
            fs::create_dir_all(&dir).map_err(|e| ChatError::io(&dir, e))?;
        }
        Ok(())
    }

    fn tier_dir(&self, tier: Tier) -> PathBuf {
        self.root.join(tier.dir_name())
    }

    fn absolute(&self, location: &StorageRef) -> PathBuf {
        self.root.join(location.relative_path())
    }

    fn read(&self, location: &StorageRef) -> Result<ChatRecord> {
        let path = self.absolute(location);
        let content = fs::read_to_string(&path).map_err(|e| ChatError::io(&path, e))?;
        record::decode(&path, &content, &self.default_model)
    }

    fn write(&self, location: &StorageRef, record: &ChatRecord) -> Result<PathBuf> {
        let path = self.absolute(location);
        let content = record::encode(record)?;
        record::write_atomic(&path, &content)?;
        Ok(path)
    }

    fn remove(&self, location: &StorageRef) -> Result<()> {
        let path = self.absolute(location);
        fs::remove_file(&path).map_err(|e| ChatError::io(&path, e))
    }

    /// Chat files of a tier as locations, sorted by path.
    fn records_in(&self, tier: Tier) -> Vec<StorageRef> {
        let dir = self.tier_dir(tier);
        let walker = match tier {
            Tier::Archive => WalkDir::new(&dir),
            _ => WalkDir::new(&dir).max_depth(1),
        };
        let mut locations: Vec<StorageRef> = walker
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == CHAT_EXTENSION)
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&dir).ok()?;
                let relative: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect();
                StorageRef::new(tier, relative.join("/")).ok()
            })
            .collect();
        locations.sort();
        locations
    }

    fn candidates(&self, name: &str) -> Vec<StorageRef> {
        let mut candidates = Vec::new();
        if let Some(literal) = StorageRef::parse(name) {
            candidates.push(literal);
        }
        for tier in Tier::ALL {
            if let Ok(location) = StorageRef::new(tier, name) {
                candidates.push(location);
            }
        }
        candidates
    }

    fn free_archive_slot(&self, target: StorageRef) -> StorageRef {
        if !self.exists(&target) {
            return target;
        }
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let stamped = target.with_suffix(&stamp);
        if !self.exists(&stamped) {
            return stamped;
        }
        (2..)
            .map(|n| target.with_suffix(&format!("{}-{}", stamp, n)))
            .find(|candidate| !self.exists(candidate))
            .unwrap_or(stamped)
    }
}

impl ChatStorage for FileChatStorage {
    fn save(&self, location: &StorageRef, record: &ChatRecord) -> Result<PathBuf> {
        let path = self.write(location, record)?;
        debug!(location = %location, messages = record.messages.len(), "chat persisted");
        Ok(path)
    }

    fn load(&self, name: &str) -> Result<(ChatRecord, StorageRef)> {
        let name = name.trim();
        let direct = self
            .candidates(name)
            .into_iter()
            .find(|candidate| self.absolute(candidate).is_file());

        let found = direct.or_else(|| {
            let wanted = name.rsplit('/').next().unwrap_or(name);
            self.records_in(Tier::Archive)
                .into_iter()
                .find(|location| location.file_name() == wanted)
        });

        let location = found.ok_or_else(|| ChatError::NotFound(format!("File {}", name)))?;
        let record = self.read(&location)?;
        debug!(name, location = %location, version = %record.version, "chat resolved");
        Ok((record, location))
    }

    fn find_archived(&self, name: &str) -> Option<StorageRef> {
        let name = name.trim();
        let direct = StorageRef::parse(name)
            .filter(|literal| literal.tier() == Tier::Archive)
            .into_iter()
            .chain(StorageRef::new(Tier::Archive, name).ok())
            .find(|candidate| self.exists(candidate));
        direct.or_else(|| {
            let wanted = name.rsplit('/').next().unwrap_or(name);
            self.records_in(Tier::Archive)
                .into_iter()
                .find(|location| location.file_name() == wanted)
        })
    }

    fn archive(&self, location: &StorageRef) -> Result<StorageRef> {
        if location.tier() == Tier::Archive {
            return Err(ChatError::AlreadyArchived(location.to_string()));
        }
        if !self.exists(location) {
            return Err(ChatError::NotFound(format!("File {}", location)));
        }

        let mut record = self.read(location)?;
        record.archived_from = Some(location.clone());

        let target = self.free_archive_slot(location.archive_target());
        self.write(&target, &record)?;
        if let Err(e) = self.remove(location) {
            let _ = self.remove(&target);
            return Err(e);
        }

        info!(from = %location, to = %target, "chat archived");
        Ok(target)
    }

    fn restore(&self, location: &StorageRef) -> Result<StorageRef> {
        if location.tier() != Tier::Archive || !self.exists(location) {
            return Err(ChatError::NotFound(format!("Archived file {}", location)));
        }

        let mut record = self.read(location)?;
        let target = match record.archived_from.take() {
            Some(origin) => origin,
            None => {
                warn!(location = %location, "archived chat has no origin, restoring to userchat");
                StorageRef::new(Tier::Userchat, location.file_name())?
            }
        };
        if self.exists(&target) {
            warn!(location = %target, "restore overwrites an existing chat");
        }

        self.write(&target, &record)?;
        if let Err(e) = self.remove(location) {
            let _ = self.remove(&target);
            return Err(e);
        }

        info!(from = %location, to = %target, "chat restored");
        Ok(target)
    }

    fn delete(&self, location: &StorageRef) -> Result<()> {
        if location.tier() != Tier::Archive || !self.exists(location) {
            return Err(ChatError::NotFound(format!("Archived file {}", location)));
        }
        self.remove(location)?;
        info!(location = %location, "archived chat deleted");
        Ok(())
    }

    fn clear_archive(&self) -> Result<usize> {
        let mut removed = 0;
        let mut first_error = None;
        for location in self.records_in(Tier::Archive) {
            match self.remove(&location) {
                Ok(()) => removed += 1,
                Err(e) => {
                    warn!(location = %location, error = %e, "could not remove archived chat");
                    first_error.get_or_insert(e);
                }
            }
        }
        info!(removed, "archive cleared");
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    fn list_all(&self) -> ChatListing {
        let mut listing = ChatListing::new();
        for tier in Tier::ALL {
            let entries = self
                .records_in(tier)
                .into_iter()
                .map(|location| {
                    let path = self.absolute(&location);
                    let name = record::display_name(&path);
                    ChatEntry {
                        file: location.to_string(),
                        name,
                    }
                })
                .collect();
            listing.insert(tier, entries);
        }
        listing
    }

    fn exists(&self, location: &StorageRef) -> bool {
        self.absolute(location).is_file()
    }

    fn modified_at(&self, location: &StorageRef) -> Option<DateTime<Local>> {
        fs::metadata(self.absolute(location))
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Local>::from)
    }

    fn latest_autosave(&self, exclude: &StorageRef) -> Option<StorageRef> {
        self.records_in(Tier::Autosave)
            .into_iter()
            .filter(|location| location != exclude)
            .filter_map(|location| {
                let modified = self.modified_at(&location)?;
                Some((modified, location))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, location)| location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Message;
    use tempfile::TempDir;

    fn open() -> (FileChatStorage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = FileChatStorage::open(dir.path().join("chat_history"), "default-model").unwrap();
        (storage, dir)
    }

    fn record(name: &str) -> ChatRecord {
        ChatRecord {
            name: name.to_string(),
            version: CHAT_VERSION.to_string(),
            model: "llama3-8b-8192".to_string(),
            messages: vec![
                Message::system("sys"),
                Message::user("hello"),
                Message::assistant("hi"),
            ],
            summary: None,
            archived_from: None,
        }
    }

    fn at(location: &str) -> StorageRef {
        StorageRef::parse(location).unwrap()
    }

    #[test]
    fn test_open_creates_every_tier() {
        let (storage, _dir) = open();
        for tier in Tier::ALL {
            assert!(storage.root().join(tier.dir_name()).is_dir());
        }
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let (storage, _dir) = open();
        let original = record("Trip");
        storage.save(&at("userchat/trip.chat"), &original).unwrap();

        let (loaded, location) = storage.load("trip.chat").unwrap();
        assert_eq!(location, at("userchat/trip.chat"));
        assert_eq!(loaded.messages, original.messages);
        assert_eq!(loaded.model, original.model);
    }

    #[test]
    fn test_save_recreates_missing_tier() {
        let (storage, _dir) = open();
        fs::remove_dir_all(storage.root().join("userchat")).unwrap();
        storage.save(&at("userchat/a.chat"), &record("a")).unwrap();
        assert!(storage.exists(&at("userchat/a.chat")));
    }

    #[test]
    fn test_load_probe_order() {
        let (storage, _dir) = open();
        storage.save(&at("userchat/same.chat"), &record("user copy")).unwrap();
        storage.save(&at("autosave/same.chat"), &record("auto copy")).unwrap();

        let (loaded, location) = storage.load("same.chat").unwrap();
        assert_eq!(loaded.name, "auto copy");
        assert_eq!(location.tier(), Tier::Autosave);

        let (loaded, _) = storage.load("userchat/same.chat").unwrap();
        assert_eq!(loaded.name, "user copy");
    }

    #[test]
    fn test_load_searches_archive_recursively() {
        let (storage, _dir) = open();
        storage.save(&at("archive/userchat/deep.chat"), &record("deep")).unwrap();

        let (loaded, location) = storage.load("deep.chat").unwrap();
        assert_eq!(loaded.name, "deep");
        assert_eq!(location, at("archive/userchat/deep.chat"));
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let (storage, _dir) = open();
        assert!(matches!(storage.load("ghost.chat"), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn test_load_corrupt_is_format_error() {
        let (storage, _dir) = open();
        fs::write(storage.root().join("userchat/broken.chat"), "{oops").unwrap();
        assert!(matches!(storage.load("broken.chat"), Err(ChatError::Format { .. })));
    }

    #[test]
    fn test_legacy_load_does_not_rewrite_file() {
        let (storage, _dir) = open();
        let path = storage.root().join("userchat/old.chat");
        let legacy = r#"[{"role":"system","content":"sys"},{"role":"user","content":"hey"}]"#;
        fs::write(&path, legacy).unwrap();

        let (loaded, _) = storage.load("old.chat").unwrap();
        assert_eq!(loaded.version, LEGACY_VERSION);
        assert_eq!(loaded.name, "old");
        assert_eq!(loaded.model, "default-model");
        assert_eq!(loaded.messages, vec![Message::system("sys"), Message::user("hey")]);
        assert_eq!(fs::read_to_string(&path).unwrap(), legacy);
    }

    #[test]
    fn test_archive_then_restore_returns_to_origin() {
        let (storage, _dir) = open();
        let origin = at("userchat/notes.chat");
        let original = record("Notes");
        storage.save(&origin, &original).unwrap();

        let archived = storage.archive(&origin).unwrap();
        assert_eq!(archived, at("archive/userchat/notes.chat"));
        assert!(!storage.exists(&origin));
        let (stamped, _) = storage.load("archive/userchat/notes.chat").unwrap();
        assert_eq!(stamped.archived_from, Some(origin.clone()));

        let restored = storage.restore(&archived).unwrap();
        assert_eq!(restored, origin);
        assert!(!storage.exists(&archived));

        let (back, _) = storage.load("userchat/notes.chat").unwrap();
        assert_eq!(back.messages, original.messages);
        assert_eq!(back.archived_from, None);
        let raw = fs::read_to_string(storage.root().join("userchat/notes.chat")).unwrap();
        assert!(!raw.contains("archivedFrom"));
    }

    #[test]
    fn test_archive_collision_gets_timestamp_suffix() {
        let (storage, _dir) = open();
        let origin = at("userchat/dup.chat");

        storage.save(&origin, &record("first")).unwrap();
        let first = storage.archive(&origin).unwrap();
        storage.save(&origin, &record("second")).unwrap();
        let second = storage.archive(&origin).unwrap();

        assert_ne!(first, second);
        assert!(second.file_name().starts_with("dup-"));
        let (kept, _) = storage.load(&first.to_string()).unwrap();
        assert_eq!(kept.name, "first");
        let (newer, _) = storage.load(&second.to_string()).unwrap();
        assert_eq!(newer.name, "second");
    }

    #[test]
    fn test_archive_rejects_archived_and_missing() {
        let (storage, _dir) = open();
        storage.save(&at("archive/userchat/a.chat"), &record("a")).unwrap();
        assert!(matches!(
            storage.archive(&at("archive/userchat/a.chat")),
            Err(ChatError::AlreadyArchived(_))
        ));
        assert!(matches!(
            storage.archive(&at("userchat/none.chat")),
            Err(ChatError::NotFound(_))
        ));
    }

    #[test]
    fn test_restore_without_stamp_falls_back_to_userchat() {
        let (storage, _dir) = open();
        storage.save(&at("archive/autosave/lost.chat"), &record("lost")).unwrap();
        let restored = storage.restore(&at("archive/autosave/lost.chat")).unwrap();
        assert_eq!(restored, at("userchat/lost.chat"));
    }

    #[test]
    fn test_delete_only_archived_and_only_once() {
        let (storage, _dir) = open();
        let live = at("userchat/keep.chat");
        storage.save(&live, &record("keep")).unwrap();
        assert!(matches!(storage.delete(&live), Err(ChatError::NotFound(_))));
        assert!(storage.exists(&live));

        let archived = storage.archive(&live).unwrap();
        storage.delete(&archived).unwrap();
        assert!(matches!(storage.delete(&archived), Err(ChatError::NotFound(_))));
    }

    #[test]
    fn test_list_all_tolerates_corrupt_records() {
        let (storage, _dir) = open();
        storage.save(&at("userchat/good.chat"), &record("Good chat")).unwrap();
        fs::write(storage.root().join("userchat/bad.chat"), "not json").unwrap();
        fs::write(storage.root().join("userchat/ignored.txt"), "x").unwrap();
        storage.save(&at("archive/autosave/old.chat"), &record("Old")).unwrap();

        let listing = storage.list_all();
        assert_eq!(listing.len(), 3);
        assert!(listing[&Tier::Autosave].is_empty());
        assert_eq!(
            listing[&Tier::Userchat],
            vec![
                ChatEntry { file: "userchat/bad.chat".to_string(), name: "bad".to_string() },
                ChatEntry { file: "userchat/good.chat".to_string(), name: "Good chat".to_string() },
            ]
        );
        assert_eq!(listing[&Tier::Archive][0].file, "archive/autosave/old.chat");
    }

    #[test]
    fn test_clear_archive_removes_everything_archived() {
        let (storage, _dir) = open();
        storage.save(&at("archive/userchat/a.chat"), &record("a")).unwrap();
        storage.save(&at("archive/autosave/b.chat"), &record("b")).unwrap();
        storage.save(&at("userchat/c.chat"), &record("c")).unwrap();

        assert_eq!(storage.clear_archive().unwrap(), 2);
        assert!(storage.list_all()[&Tier::Archive].is_empty());
        assert!(storage.exists(&at("userchat/c.chat")));
    }

    #[test]
    fn test_find_archived_ignores_live_tiers() {
        let (storage, _dir) = open();
        storage.save(&at("userchat/twin.chat"), &record("live")).unwrap();
        storage.save(&at("archive/userchat/twin.chat"), &record("old")).unwrap();

        assert_eq!(storage.find_archived("twin.chat"), Some(at("archive/userchat/twin.chat")));
        assert_eq!(
            storage.find_archived("archive/userchat/twin.chat"),
            Some(at("archive/userchat/twin.chat"))
        );
        assert_eq!(storage.find_archived("userchat/twin.chat"), Some(at("archive/userchat/twin.chat")));
        assert_eq!(storage.find_archived("ghost.chat"), None);
    }

    #[test]
    fn test_latest_autosave_skips_excluded() {
        let (storage, _dir) = open();
        let older = at("autosave/autosave-1.chat");
        let current = at("autosave/autosave-2.chat");
        storage.save(&older, &record("older")).unwrap();
        storage.save(&current, &record("current")).unwrap();

        assert_eq!(storage.latest_autosave(&current), Some(older.clone()));
        fs::remove_file(storage.root().join("autosave/autosave-1.chat")).unwrap();
        assert_eq!(storage.latest_autosave(&current), None);
    }
}
