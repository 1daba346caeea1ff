use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::cli::Args;
use crate::orchestrator::{OrchestratorSettings, SamplingParams};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer clearly and concisely.";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub history_limit: usize,
    pub summary_history_limit: usize,
    pub summary_max_tokens: u32,
    pub naming_max_tokens: u32,
    pub request_timeout: Duration,
    pub default_system_prompt: String,
    pub load_session: Option<String>,
    pub state_directory: PathBuf,
}

impl Config {
    pub fn chat_history_dir(&self) -> PathBuf {
        self.state_directory.join("chat_history")
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.state_directory.join("prompts")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.state_directory.join("exports")
    }

    pub fn inputs_file(&self) -> PathBuf {
        self.state_directory.join(".groqchat.inputs")
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            reply: SamplingParams {
                temperature: self.temperature,
                top_p: self.top_p,
            },
            summary_max_tokens: self.summary_max_tokens,
            naming_max_tokens: self.naming_max_tokens,
            request_timeout: self.request_timeout,
        }
    }
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        let env_api_key = std::env::var("GROQ_API_KEY").ok();
        Self::from_args_and_env(args, env_api_key)
    }

    pub fn from_args_and_env(args: &Args, env_api_key: Option<String>) -> Result<Self> {
        let api_key = args
            .api_key
            .clone()
            .or(env_api_key)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("No API key provided. Pass --api-key or set GROQ_API_KEY."))?;

        if !(0.0..=2.0).contains(&args.temperature) {
            return Err(anyhow!("Temperature must be between 0.0 and 2.0"));
        }

        let default_system_prompt = match &args.system_prompt_file {
            Some(path) => read_system_prompt(Path::new(path)),
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Config {
            api_key,
            base_url: args.base_url.clone(),
            default_model: args.model.clone(),
            temperature: args.temperature,
            top_p: args.top_p,
            history_limit: args.history_limit,
            summary_history_limit: args.summary_history_limit,
            summary_max_tokens: args.summary_max_tokens,
            naming_max_tokens: args.naming_max_tokens,
            request_timeout: Duration::from_secs(args.request_timeout),
            default_system_prompt,
            load_session: args.load_session.clone(),
            state_directory: PathBuf::from(&args.state_directory),
        })
    }
}

fn read_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(path = %path.display(), "system prompt file is empty, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read system prompt file, using built-in prompt");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["groqchat", "--state-directory", "/tmp/groqchat-test"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_config_from_args_with_cli_key() {
        let args = args(&["--api-key", "cli-key", "-m", "llama3-8b-8192", "--load-session", "trip"]);
        let config = Config::from_args_and_env(&args, None).unwrap();

        assert_eq!(config.api_key, "cli-key");
        assert_eq!(config.default_model, "llama3-8b-8192");
        assert_eq!(config.load_session, Some("trip".to_string()));
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.default_system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_config_precedence() {
        let with_cli = args(&["--api-key", "cli-key"]);
        let config = Config::from_args_and_env(&with_cli, Some("env-key".to_string())).unwrap();
        assert_eq!(config.api_key, "cli-key");

        let without_cli = args(&[]);
        let config = Config::from_args_and_env(&without_cli, Some("env-key".to_string())).unwrap();
        assert_eq!(config.api_key, "env-key");
    }

    #[test]
    fn test_config_requires_api_key() {
        assert!(Config::from_args_and_env(&args(&[]), None).is_err());
        assert!(Config::from_args_and_env(&args(&[]), Some("  ".to_string())).is_err());
    }

    #[test]
    fn test_config_rejects_out_of_range_temperature() {
        let args = args(&["--api-key", "k", "-t", "3.5"]);
        assert!(Config::from_args_and_env(&args, None).is_err());
    }

    #[test]
    fn test_derived_paths() {
        let config = Config::from_args_and_env(&args(&["--api-key", "k"]), None).unwrap();
        let root = PathBuf::from("/tmp/groqchat-test");
        assert_eq!(config.chat_history_dir(), root.join("chat_history"));
        assert_eq!(config.prompts_dir(), root.join("prompts"));
        assert_eq!(config.exports_dir(), root.join("exports"));
        assert_eq!(config.inputs_file(), root.join(".groqchat.inputs"));
    }

    #[test]
    fn test_system_prompt_file_and_fallback() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "  Be a pirate.\n").unwrap();

        let path_arg = path.to_string_lossy().to_string();
        let config =
            Config::from_args_and_env(&args(&["--api-key", "k", "--system-prompt-file", path_arg.as_str()]), None)
                .unwrap();
        assert_eq!(config.default_system_prompt, "Be a pirate.");

        let missing = dir.path().join("missing.txt").to_string_lossy().to_string();
        let config =
            Config::from_args_and_env(&args(&["--api-key", "k", "--system-prompt-file", missing.as_str()]), None)
                .unwrap();
        assert_eq!(config.default_system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_orchestrator_settings_follow_config() {
        let config = Config::from_args_and_env(&args(&["--api-key", "k", "--top-p", "0.9"]), None).unwrap();
        let settings = config.orchestrator_settings();
        assert_eq!(settings.reply.top_p, 0.9);
        assert_eq!(settings.summary_max_tokens, 200);
        assert_eq!(settings.naming_max_tokens, 10);
    }
}
