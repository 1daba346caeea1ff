use std::fs;
use std::path::PathBuf;

use regex::Regex;
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::storage::record::write_atomic;

const PROMPT_EXTENSION: &str = "txt";

/// Named text snippets stored one file per name. Saving an existing name
/// replaces it.
pub struct PromptLibrary {
    dir: PathBuf,
    name_regex: Regex,
}

impl PromptLibrary {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| ChatError::io(&dir, e))?;
        let name_regex = Regex::new(r"^[A-Za-z0-9_-][A-Za-z0-9_.-]*$")
            .map_err(|e| ChatError::Validation(e.to_string()))?;
        Ok(Self { dir, name_regex })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if !self.name_regex.is_match(name) {
            return Err(ChatError::Validation(format!(
                "Invalid prompt name '{}': use letters, digits, '-', '_' or '.'",
                name
            )));
        }
        Ok(self.dir.join(format!("{}.{}", name, PROMPT_EXTENSION)))
    }

    /// Prompt names in alphabetical order.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ChatError::io(&self.dir, e)),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().is_some_and(|ext| ext == PROMPT_EXTENSION))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().to_string()))
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn save(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        write_atomic(&path, text)?;
        debug!(prompt = name, "prompt saved");
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<String> {
        let path = self.path_for(name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ChatError::NotFound(format!("Prompt {}", name)))
            }
            Err(e) => Err(ChatError::io(&path, e)),
        }
    }
}
