use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the session core.
///
/// None of these are fatal: the dispatcher turns every variant into an
/// `{error}` response and leaves the live session as it was.
#[derive(Error, Debug)]
pub enum ChatError {
    /// An unresolvable chat file, prompt or name.
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is already archived")]
    AlreadyArchived(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The completion service failed, timed out, was cancelled or returned nothing.
    #[error("Completion failed: {0}")]
    Upstream(String),

    /// A missing or malformed command argument. The message is the usage line.
    #[error("{0}")]
    Validation(String),

    /// A persisted record that could not be parsed.
    #[error("Could not read chat {}: {reason}", path.display())]
    Format { path: PathBuf, reason: String },
}

impl ChatError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ChatError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ChatError::Format {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = ChatError::NotFound("File notes.chat".to_string());
        assert_eq!(error.to_string(), "File notes.chat not found");
    }

    #[test]
    fn test_validation_display_is_usage_line() {
        let error = ChatError::Validation("Usage: /save <name>".to_string());
        assert_eq!(error.to_string(), "Usage: /save <name>");
    }

    #[test]
    fn test_io_display_names_path() {
        let error = ChatError::io(
            "/tmp/x.chat",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(error.to_string().contains("/tmp/x.chat"));
        assert!(error.to_string().contains("denied"));
    }
}
