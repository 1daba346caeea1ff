use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};
use crate::session::ChatSession;
use crate::storage::record::write_atomic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    PlainText,
    Markdown,
}

impl ExportFormat {
    pub fn for_file_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.ends_with(".md") || lower.ends_with(".markdown") {
            ExportFormat::Markdown
        } else {
            ExportFormat::PlainText
        }
    }
}

/// `Role: content` per message, blank-line separated.
pub fn render_plain(session: &ChatSession) -> String {
    let mut out = String::new();
    for message in &session.messages {
        let _ = write!(out, "{}: {}\n\n", message.role.title(), message.content);
    }
    out
}

pub fn render_markdown(session: &ChatSession) -> String {
    let mut out = format!("# {}\n\n", session.name);
    for message in &session.messages {
        let _ = write!(out, "**{}**: {}\n\n", message.role, message.content);
    }
    out
}

/// Resolves the export file name: the session's display name when none is
/// given, and a `.txt` extension for anything not exported as Markdown.
pub fn export_file_name(session: &ChatSession, name: Option<&str>) -> Result<String> {
    let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => format!("{}.txt", session.name.replace(' ', "_")),
    };
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(ChatError::Validation(format!(
            "Invalid export name '{}': path separators are not allowed",
            name
        )));
    }
    match ExportFormat::for_file_name(&name) {
        ExportFormat::Markdown => Ok(name),
        ExportFormat::PlainText if name.ends_with(".txt") => Ok(name),
        ExportFormat::PlainText => Ok(format!("{}.txt", name)),
    }
}

/// Writes the whole transcript under `dir` and returns the file written.
pub fn export_session(dir: &Path, session: &ChatSession, name: Option<&str>) -> Result<PathBuf> {
    let file_name = export_file_name(session, name)?;
    let contents = match ExportFormat::for_file_name(&file_name) {
        ExportFormat::Markdown => render_markdown(session),
        ExportFormat::PlainText => render_plain(session),
    };
    let path = dir.join(file_name);
    write_atomic(&path, &contents)?;
    Ok(path)
}
