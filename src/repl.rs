use anyhow::Result;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    commands::{Command, CommandParser, ModelAction},
    manager::SessionManager,
    response::Response,
    ui::{Input, UI},
};

pub struct Repl {
    manager: SessionManager,
    ui: UI,
    queued_message: Option<String>,
}

impl Repl {
    pub fn new(manager: SessionManager, ui: UI) -> Self {
        Self {
            manager,
            ui,
            queued_message: None,
        }
    }

    /// Loads the chat named on the command line. A failure is shown and the
    /// fresh session is kept.
    pub async fn load_startup_session(&mut self, name: &str) {
        let response = self.manager.dispatch(Command::Load(Some(name.to_string())), &CancellationToken::new()).await;
        self.ui.print_response(&response);
    }

    pub async fn run(&mut self) -> Result<()> {
        let session = self.manager.snapshot().await;
        self.ui.print_welcome(&session.name, &session.model);

        loop {
            let input = match self.ui.read_input(self.queued_message.as_deref())? {
                Input::Line(line) => line,
                Input::Interrupted => {
                    self.queued_message = None;
                    self.ui.print_info("Use /quit or Ctrl-D to leave");
                    continue;
                }
                Input::Eof => break,
            };

            let line = match input.trim() {
                "" => match self.queued_message.take() {
                    Some(message) => message,
                    None => continue,
                },
                line => {
                    self.queued_message = None;
                    line.to_string()
                }
            };

            if line == "/quit" || line == "/exit" {
                break;
            }

            let response = self.submit(&line).await;
            if response.is_error() && !CommandParser::is_command(&line) {
                self.queued_message = Some(line);
            }
            self.ui.print_response(&response);
            self.offer_selection(&response).await?;
        }

        self.ui.save_history();
        Ok(())
    }

    /// Sends one line with a fresh token that Ctrl-C cancels for as long as
    /// the line is being handled.
    async fn submit(&self, line: &str) -> Response {
        let cancel = CancellationToken::new();
        let watcher = interrupt_watcher(cancel.clone());
        let response = self.manager.handle_input(line, &cancel).await;
        watcher.abort();
        if cancel.is_cancelled() {
            self.ui.print_info("Request cancelled");
        }
        response
    }

    async fn offer_selection(&mut self, response: &Response) -> Result<()> {
        let mut targets = selection_targets(response);
        if targets.is_empty() {
            return Ok(());
        }
        let Some(choice) = self.ui.read_selection(targets.len())? else {
            return Ok(());
        };

        let command = targets.swap_remove(choice);
        debug!(?command, "selection dispatched");
        let response = self.manager.dispatch(command, &CancellationToken::new()).await;
        self.ui.print_response(&response);
        Ok(())
    }
}

fn interrupt_watcher(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    })
}

/// Commands behind the numbered entries of a listing, in display order.
pub fn selection_targets(response: &Response) -> Vec<Command> {
    match response {
        Response::Chats(listing) => listing
            .values()
            .flatten()
            .map(|entry| Command::Load(Some(entry.file.clone())))
            .collect(),
        Response::Models(models) => models
            .iter()
            .map(|id| Command::Model(ModelAction::Set(id.clone())))
            .collect(),
        _ => Vec::new(),
    }
}
