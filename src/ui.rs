use std::path::PathBuf;

use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::response::{Response, SessionInfo};
use crate::storage::ChatListing;

const RESET: &str = "\x1b[0m";
const BOLD_CYAN: &str = "\x1b[1;36m";
const BOLD_GREEN: &str = "\x1b[1;32m";
const BOLD_RED: &str = "\x1b[1;31m";
const YELLOW: &str = "\x1b[33m";
const DIM: &str = "\x1b[2m";

pub enum Input {
    Line(String),
    Interrupted,
    Eof,
}

pub struct UI {
    editor: DefaultEditor,
    history_file: PathBuf,
}

impl UI {
    pub fn new(history_file: PathBuf) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if let Err(e) = editor.load_history(&history_file) {
            debug!(error = %e, "no input history loaded");
        }
        Ok(Self {
            editor,
            history_file,
        })
    }

    pub fn read_input(&mut self, queued: Option<&str>) -> Result<Input> {
        if let Some(message) = queued {
            println!("{}Press Enter to retry: {}{}", DIM, message, RESET);
        }
        match self.editor.readline(">>> ") {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Input::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(e) => Err(e.into()),
        }
    }

    /// Asks for a 1-based choice among `count` entries. Blank input or an
    /// out-of-range number cancels.
    pub fn read_selection(&mut self, count: usize) -> Result<Option<usize>> {
        let prompt = format!("Select 1-{} (Enter to skip): ", count);
        let line = match self.editor.readline(&prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(line
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=count).contains(n))
            .map(|n| n - 1))
    }

    pub fn save_history(&mut self) {
        if let Some(parent) = self.history_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(&self.history_file) {
            debug!(error = %e, "could not save input history");
        }
    }

    pub fn print_welcome(&self, chat_name: &str, model: &str) {
        println!("{}groqchat{} - {} ({})", BOLD_CYAN, RESET, chat_name, model);
        println!("Type a message, /help for commands, /quit to leave.");
        println!();
    }

    pub fn print_response(&self, response: &Response) {
        println!("{}", render(response));
        println!();
    }

    pub fn print_info(&self, message: &str) {
        println!("{}{}{}", YELLOW, message, RESET);
    }
}

/// Text for one response, ANSI-coloured. Listings are numbered from 1 in the
/// order the selection prompt uses.
pub fn render(response: &Response) -> String {
    match response {
        Response::System(text) => format!("{}{}{}", BOLD_CYAN, text, RESET),
        Response::Error(text) => format!("{}Error:{} {}", BOLD_RED, RESET, text),
        Response::Assistant(text) => format!("{}Assistant:{} {}", BOLD_GREEN, RESET, text),
        Response::Chats(listing) => render_chats(listing),
        Response::Prompts(names) if names.is_empty() => "No prompts saved".to_string(),
        Response::Prompts(names) => render_list("Prompts", names, false),
        Response::Results(hits) if hits.is_empty() => "No matches".to_string(),
        Response::Results(hits) => render_list("Matches", hits, false),
        Response::Models(models) => render_list("Models", models, true),
        Response::Summary(text) => format!("{}Summary:{}\n{}", BOLD_CYAN, RESET, text),
        Response::Info(info) => render_info(info),
    }
}

fn render_list(title: &str, items: &[String], numbered: bool) -> String {
    let mut lines = vec![format!("{}{}:{}", BOLD_CYAN, title, RESET)];
    for (i, item) in items.iter().enumerate() {
        if numbered {
            lines.push(format!("  {}. {}", i + 1, item));
        } else {
            lines.push(format!("  {}", item));
        }
    }
    lines.join("\n")
}

fn render_chats(listing: &ChatListing) -> String {
    let mut lines = Vec::new();
    let mut number = 1;
    for (tier, entries) in listing {
        lines.push(format!("{}{}:{}", BOLD_CYAN, tier, RESET));
        if entries.is_empty() {
            lines.push(format!("  {}(none){}", DIM, RESET));
        }
        for entry in entries {
            lines.push(format!("  {}. {} {}({}){}", number, entry.name, DIM, entry.file, RESET));
            number += 1;
        }
    }
    lines.join("\n")
}

fn render_info(info: &SessionInfo) -> String {
    let modified = info
        .last_modified
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "not saved yet".to_string());
    format!(
        "{}Chat info:{}\n  File: {}\n  Model: {}\n  Messages: {}\n  Last modified: {}",
        BOLD_CYAN, RESET, info.file, info.model, info.message_count, modified
    )
}
