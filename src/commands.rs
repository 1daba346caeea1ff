use regex::Regex;

use crate::error::{ChatError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    New,
    Save(String),
    Load(Option<String>),
    Chats,
    System(String),
    PromptNew { name: String, text: String },
    PromptList,
    PromptUse(String),
    PromptSys(String),
    Summary,
    Search(String),
    Export(Option<String>),
    Model(ModelAction),
    Info,
    Rename(String),
    Archive(Option<String>),
    Restore(String),
    Delete(String),
    ClearArchive,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelAction {
    Show,
    Select,
    Set(String),
}

pub const HELP_TEXT: &str = "\
Commands:
  /new                      start a fresh chat
  /save <name>              save the chat to the user tier
  /load [name]              load a chat (no name: latest other autosave)
  /chats                    list chats in every tier
  /rename <name>            rename the chat
  /system <text>            replace the system prompt
  /prompt new <name> <text> store a prompt
  /prompt list              list stored prompts
  /prompt use <name>        send a stored prompt as your message
  /prompt sys <name>        use a stored prompt as the system prompt
  /summary                  summarize the chat
  /search <term>            search messages
  /export [name]            export the chat (.md for Markdown)
  /model [id|select]        show, pick or set the model
  /info                     show chat details
  /archive [file]           archive a chat (no file: this chat)
  /restore <file>           restore an archived chat
  /delete <file>            permanently delete an archived chat
  /clear-archive            delete every archived chat
  /help                     show this help
  /quit                     leave";

/// Splits a `/`-prefixed line into a command and its arguments.
/// Free-text arguments are re-joined with single spaces.
pub struct CommandParser {
    command_regex: Regex,
}

impl CommandParser {
    pub fn new() -> Result<Self> {
        let command_regex = Regex::new(r"^/([A-Za-z][A-Za-z-]*)(?:\s+(.*))?$")
            .map_err(|e| ChatError::Validation(e.to_string()))?;
        Ok(Self { command_regex })
    }

    pub fn is_command(input: &str) -> bool {
        input.trim_start().starts_with('/')
    }

    pub fn parse(&self, input: &str) -> Result<Command> {
        let input = input.trim();
        let caps = self
            .command_regex
            .captures(input)
            .ok_or_else(|| unknown(input.split_whitespace().next().unwrap_or(input)))?;

        let name = caps[1].to_lowercase();
        let args: Vec<&str> = caps
            .get(2)
            .map(|m| m.as_str().split_whitespace().collect())
            .unwrap_or_default();

        match name.as_str() {
            "new" => Ok(Command::New),
            "save" => first(&args, "Usage: /save <name>").map(Command::Save),
            "load" => Ok(Command::Load(args.first().map(|s| s.to_string()))),
            "chats" => Ok(Command::Chats),
            "system" => rest(&args, "Usage: /system <prompt>").map(Command::System),
            "prompt" => self.parse_prompt(&args),
            "summary" => Ok(Command::Summary),
            "search" => rest(&args, "Usage: /search <term>").map(Command::Search),
            "export" => Ok(Command::Export(args.first().map(|s| s.to_string()))),
            "model" => Ok(Command::Model(match args.first() {
                None => ModelAction::Show,
                Some(&"select") => ModelAction::Select,
                Some(id) => ModelAction::Set(id.to_string()),
            })),
            "info" => Ok(Command::Info),
            "rename" => rest(&args, "Usage: /rename <name>").map(Command::Rename),
            "archive" => Ok(Command::Archive(args.first().map(|s| s.to_string()))),
            "restore" => first(&args, "Usage: /restore <file>").map(Command::Restore),
            "delete" => first(&args, "Usage: /delete <file>").map(Command::Delete),
            "clear-archive" => Ok(Command::ClearArchive),
            "help" | "commands" => Ok(Command::Help),
            _ => Err(unknown(&format!("/{}", &caps[1]))),
        }
    }

    fn parse_prompt(&self, args: &[&str]) -> Result<Command> {
        match args.first().copied() {
            Some("new") => {
                if args.len() < 3 {
                    return Err(usage("Usage: /prompt new <name> <text>"));
                }
                Ok(Command::PromptNew {
                    name: args[1].to_string(),
                    text: args[2..].join(" "),
                })
            }
            Some("list") => Ok(Command::PromptList),
            Some("use") => first(&args[1..], "Usage: /prompt use <name>").map(Command::PromptUse),
            Some("sys") | Some("system") => {
                first(&args[1..], "Usage: /prompt sys <name>").map(Command::PromptSys)
            }
            Some(_) => Err(usage("Unknown prompt command")),
            None => Err(usage("Usage: /prompt <new|use|list|sys>")),
        }
    }
}

fn first(args: &[&str], usage_line: &str) -> Result<String> {
    args.first()
        .map(|s| s.to_string())
        .ok_or_else(|| usage(usage_line))
}

fn rest(args: &[&str], usage_line: &str) -> Result<String> {
    if args.is_empty() {
        return Err(usage(usage_line));
    }
    Ok(args.join(" "))
}

fn usage(line: &str) -> ChatError {
    ChatError::Validation(line.to_string())
}

fn unknown(name: &str) -> ChatError {
    ChatError::Validation(format!("Unknown command {}", name))
}
