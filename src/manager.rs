use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commands::{Command, CommandParser, ModelAction, HELP_TEXT};
use crate::context::{build_context, build_naming_context, build_summary_context, should_auto_name};
use crate::error::{ChatError, Result};
use crate::export::export_session;
use crate::orchestrator::Orchestrator;
use crate::prompts::PromptLibrary;
use crate::providers::{Message, Role};
use crate::response::{Response, SessionInfo};
use crate::session::ChatSession;
use crate::storage::{with_chat_extension, ChatStorage, StorageRef, Tier};

#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub default_system_prompt: String,
    pub default_model: String,
    pub history_limit: usize,
    pub summary_history_limit: usize,
    pub exports_dir: PathBuf,
}

/// Owns the single live session of the process.
///
/// Every mutation clones the session, edits the clone, persists it and only
/// then swaps it in, all under one lock. Completion calls run without the
/// lock; their outcome is applied afterwards and only to the session they
/// were issued for.
pub struct SessionManager {
    session: Mutex<ChatSession>,
    storage: Arc<dyn ChatStorage>,
    prompts: PromptLibrary,
    orchestrator: Orchestrator,
    parser: CommandParser,
    settings: ManagerSettings,
}

impl SessionManager {
    pub fn new(
        storage: Arc<dyn ChatStorage>,
        prompts: PromptLibrary,
        orchestrator: Orchestrator,
        settings: ManagerSettings,
    ) -> Result<Self> {
        let parser = CommandParser::new()?;
        let session = fresh_session(
            storage.as_ref(),
            &settings.default_system_prompt,
            &settings.default_model,
        );
        Ok(Self {
            session: Mutex::new(session),
            storage,
            prompts,
            orchestrator,
            parser,
            settings,
        })
    }

    pub async fn snapshot(&self) -> ChatSession {
        self.session.lock().await.clone()
    }

    /// Runs one line of input: a command when it starts with `/`, otherwise
    /// a message for the assistant. Failures come back as `Response::Error`.
    pub async fn handle_input(&self, line: &str, cancel: &CancellationToken) -> Response {
        let line = line.trim();
        let result = if CommandParser::is_command(line) {
            match self.parser.parse(line) {
                Ok(command) => self.execute(command, cancel).await,
                Err(e) => Err(e),
            }
        } else {
            self.send_message(line, cancel).await
        };
        result.unwrap_or_else(|e| {
            debug!(error = %e, "input failed");
            Response::from(e)
        })
    }

    pub async fn dispatch(&self, command: Command, cancel: &CancellationToken) -> Response {
        self.execute(command, cancel)
            .await
            .unwrap_or_else(Response::from)
    }

    async fn execute(&self, command: Command, cancel: &CancellationToken) -> Result<Response> {
        match command {
            Command::New => self.new_chat().await,
            Command::Save(name) => self.save(&name).await,
            Command::Load(Some(name)) => self.load(&name).await,
            Command::Load(None) => self.load_latest_autosave().await,
            Command::Chats => Ok(Response::Chats(self.storage.list_all())),
            Command::System(text) => {
                self.mutate(|s| {
                    s.replace_system_prompt(&text);
                    Ok(())
                })
                .await?;
                Ok(Response::system("System prompt updated"))
            }
            Command::PromptNew { name, text } => {
                let path = self.prompts.save(&name, &text)?;
                Ok(Response::System(format!("Prompt '{}' saved to {}", name, path.display())))
            }
            Command::PromptList => Ok(Response::Prompts(self.prompts.list()?)),
            Command::PromptUse(name) => {
                let text = self.prompts.load(&name)?;
                self.send_message(&text, cancel).await
            }
            Command::PromptSys(name) => {
                let text = self.prompts.load(&name)?;
                self.mutate(|s| {
                    s.replace_system_prompt(&text);
                    Ok(())
                })
                .await?;
                Ok(Response::System(format!("System prompt set from {}", name)))
            }
            Command::Summary => self.summarize(cancel).await,
            Command::Search(term) => Ok(Response::Results(self.session.lock().await.search(&term))),
            Command::Export(name) => {
                let session = self.snapshot().await;
                let path = export_session(&self.settings.exports_dir, &session, name.as_deref())?;
                Ok(Response::System(format!("Exported to {}", path.display())))
            }
            Command::Model(ModelAction::Show) => {
                let model = self.session.lock().await.model.clone();
                Ok(Response::System(format!("Current model: {}", model)))
            }
            Command::Model(ModelAction::Select) => Ok(Response::Models(self.orchestrator.models())),
            Command::Model(ModelAction::Set(id)) => {
                self.mutate(|s| s.set_model(&id)).await?;
                Ok(Response::System(format!("Model set to {}", id)))
            }
            Command::Info => self.info().await,
            Command::Rename(name) => {
                self.mutate(|s| s.rename(&name)).await?;
                Ok(Response::System(format!("Chat renamed to {}", name)))
            }
            Command::Archive(file) => self.archive(file.as_deref()).await,
            Command::Restore(file) => self.restore(&file).await,
            Command::Delete(file) => self.delete(&file).await,
            Command::ClearArchive => self.clear_archive().await,
            Command::Help => Ok(Response::system(HELP_TEXT)),
        }
    }

    fn persist(&self, session: &mut ChatSession) -> Result<PathBuf> {
        match self.storage.save(&session.location, &session.to_record()) {
            Ok(path) => {
                session.mark_persisted();
                Ok(path)
            }
            Err(e) => {
                error!(location = %session.location, error = %e, "could not persist chat");
                Err(e)
            }
        }
    }

    /// Edit and persist as one unit. On any failure the live session is left
    /// exactly as it was.
    async fn mutate<T>(&self, edit: impl FnOnce(&mut ChatSession) -> Result<T>) -> Result<(T, PathBuf)> {
        let mut guard = self.session.lock().await;
        let mut draft = guard.clone();
        let value = edit(&mut draft)?;
        let path = self.persist(&mut draft)?;
        *guard = draft;
        Ok((value, path))
    }

    /// One user/assistant exchange. The user turn is persisted before the
    /// completion call and removed again if the call fails.
    async fn send_message(&self, text: &str, cancel: &CancellationToken) -> Result<Response> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("Message cannot be empty".to_string()));
        }

        let (id, index, context, model) = {
            let mut guard = self.session.lock().await;
            let mut draft = guard.clone();
            let index = draft.append_user(text);
            self.persist(&mut draft)?;
            let context = build_context(&draft.messages, self.settings.history_limit);
            let request = (draft.id, index, context, draft.model.clone());
            *guard = draft;
            request
        };

        let reply = match self.orchestrator.reply(context, &model, cancel).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply failed, rolling back user turn");
                self.rollback_user_turn(id, index, text).await;
                return Err(e);
            }
        };

        let naming = {
            let mut guard = self.session.lock().await;
            if guard.id != id {
                warn!("chat was replaced while waiting for the reply, reply not recorded");
                return Ok(Response::Assistant(reply));
            }
            let mut draft = guard.clone();
            draft.append_assistant(&reply);
            if let Err(e) = self.persist(&mut draft) {
                drop(guard);
                warn!(error = %e, "reply not saved, rolling back user turn");
                self.rollback_user_turn(id, index, text).await;
                return Err(e);
            }
            let naming = if should_auto_name(&draft) {
                draft.naming_attempted = true;
                Some((build_naming_context(&draft.messages), draft.model.clone()))
            } else {
                None
            };
            *guard = draft;
            naming
        };

        if let Some((context, model)) = naming {
            self.auto_name(id, context, &model, cancel).await;
        }
        Ok(Response::Assistant(reply))
    }

    async fn rollback_user_turn(&self, id: Uuid, index: usize, text: &str) {
        let mut guard = self.session.lock().await;
        if guard.id != id {
            return;
        }

        let mut draft = guard.clone();
        let is_turn = |m: &Message| m.role == Role::User && m.content == text;
        let position = if draft.messages.get(index).is_some_and(is_turn) {
            Some(index)
        } else {
            draft.messages.iter().rposition(is_turn)
        };
        let Some(position) = position else {
            return;
        };
        draft.remove_user_turn(position, text);

        if let Err(e) = self.persist(&mut draft) {
            error!(error = %e, "rollback only applied in memory");
        }
        *guard = draft;
    }

    async fn auto_name(&self, id: Uuid, context: Vec<Message>, model: &str, cancel: &CancellationToken) {
        let Some(name) = self.orchestrator.name(context, model, cancel).await else {
            return;
        };

        let mut guard = self.session.lock().await;
        if guard.id != id || !guard.is_default_name() {
            return;
        }
        let mut draft = guard.clone();
        if draft.rename(&name).is_err() {
            return;
        }
        match self.persist(&mut draft) {
            Ok(_) => {
                info!(name = %draft.name, "chat named");
                *guard = draft;
            }
            Err(e) => warn!(error = %e, "keeping default chat name"),
        }
    }

    fn fresh_session(&self, model: &str) -> ChatSession {
        fresh_session(self.storage.as_ref(), &self.settings.default_system_prompt, model)
    }

    fn load_session(&self, name: &str) -> Result<ChatSession> {
        let (record, location) = self.storage.load(&with_chat_extension(name))?;
        Ok(ChatSession::from_record(
            record,
            location,
            &self.settings.default_system_prompt,
        ))
    }

    async fn new_chat(&self) -> Result<Response> {
        let mut guard = self.session.lock().await;
        let session = self.fresh_session(&guard.model);
        let message = format!(
            "New chat started: {}. Autosave file will be created at '{}' after your first message",
            session.name, session.location
        );
        info!(location = %session.location, "new chat");
        *guard = session;
        Ok(Response::System(message))
    }

    async fn save(&self, name: &str) -> Result<Response> {
        let location = StorageRef::new(Tier::Userchat, with_chat_extension(name.trim()))?;
        let (_, path) = self
            .mutate(|s| {
                s.location = location;
                Ok(())
            })
            .await?;
        Ok(Response::System(format!("Chat saved to {}", path.display())))
    }

    /// Replaces the live session with a stored record. A name that
    /// resolves nowhere leaves the live session as it was.
    async fn load(&self, name: &str) -> Result<Response> {
        let session = self.load_session(name)?;
        let message = format!("Chat '{}' loaded", session.name);
        info!(location = %session.location, version = %session.version, "chat loaded");
        *self.session.lock().await = session;
        Ok(Response::System(message))
    }

    async fn load_latest_autosave(&self) -> Result<Response> {
        let current = self.session.lock().await.location.clone();
        match self.storage.latest_autosave(&current) {
            Some(location) => self.load(&location.to_string()).await,
            None => Ok(Response::system("No other autosave files found")),
        }
    }

    async fn summarize(&self, cancel: &CancellationToken) -> Result<Response> {
        let (id, context, model) = {
            let guard = self.session.lock().await;
            let context = build_summary_context(&guard.messages, self.settings.summary_history_limit);
            (guard.id, context, guard.model.clone())
        };

        let summary = self.orchestrator.summarize(context, &model, cancel).await?;

        let mut guard = self.session.lock().await;
        if guard.id == id {
            let mut draft = guard.clone();
            draft.summary = Some(summary.clone());
            match self.persist(&mut draft) {
                Ok(_) => *guard = draft,
                Err(e) => warn!(error = %e, "summary not cached"),
            }
        }
        Ok(Response::Summary(summary))
    }

    async fn info(&self) -> Result<Response> {
        let guard = self.session.lock().await;
        Ok(Response::Info(SessionInfo {
            file: guard.location.to_string(),
            model: guard.model.clone(),
            message_count: guard.message_count(),
            last_modified: self.storage.modified_at(&guard.location),
        }))
    }

    async fn archive(&self, file: Option<&str>) -> Result<Response> {
        let mut guard = self.session.lock().await;
        let location = match file {
            None => guard.location.clone(),
            Some(name) => self.storage.load(&with_chat_extension(name))?.1,
        };

        let target = self.storage.archive(&location)?;
        if guard.location == location {
            guard.archived_from = Some(location.clone());
            guard.location = target.clone();
        }
        Ok(Response::System(format!("Archived {} to {}", location, target)))
    }

    async fn restore(&self, file: &str) -> Result<Response> {
        let mut guard = self.session.lock().await;
        let location = self.archived(file)?;
        let target = self.storage.restore(&location)?;

        if guard.location == location {
            guard.location = target.clone();
            guard.archived_from = None;
        } else if guard.location == target {
            warn!(location = %target, "restored over the live chat, reloading it");
            *guard = self.load_session(&target.to_string())?;
        }
        Ok(Response::System(format!("Restored {} to {}", location, target)))
    }

    async fn delete(&self, file: &str) -> Result<Response> {
        let mut guard = self.session.lock().await;
        let location = self.archived(file)?;
        self.storage.delete(&location)?;

        if guard.location == location {
            let session = self.fresh_session(&guard.model);
            let message = format!("Deleted {}. New chat started: {}", location, session.name);
            *guard = session;
            return Ok(Response::System(message));
        }
        Ok(Response::System(format!("Deleted {}", location)))
    }

    /// A partial failure still resets the live session if its own archived
    /// file was among those removed.
    async fn clear_archive(&self) -> Result<Response> {
        let mut guard = self.session.lock().await;
        let result = self.storage.clear_archive();

        let mut started = None;
        if guard.location.tier() == Tier::Archive && !self.storage.exists(&guard.location) {
            let session = self.fresh_session(&guard.model);
            info!(from = %guard.location, to = %session.location, "archived live chat removed, new chat");
            started = Some(session.name.clone());
            *guard = session;
        }

        let mut message = format!("Removed {} archived chats", result?);
        if let Some(name) = started {
            message.push_str(&format!(". New chat started: {}", name));
        }
        Ok(Response::System(message))
    }

    fn archived(&self, file: &str) -> Result<StorageRef> {
        self.storage
            .find_archived(&with_chat_extension(file))
            .ok_or_else(|| ChatError::NotFound(format!("Archived file {}", file)))
    }
}

/// A new in-memory session on a free autosave location. Nothing is written
/// until the first mutation.
fn fresh_session(storage: &dyn ChatStorage, system_prompt: &str, model: &str) -> ChatSession {
    let mut session = ChatSession::new(system_prompt, model, Local::now());
    if storage.exists(&session.location) {
        let suffix = Uuid::new_v4().simple().to_string();
        session.location = session.location.with_suffix(&suffix[..6]);
    }
    session
}
