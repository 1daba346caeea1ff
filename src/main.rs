use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;
mod commands;
mod config;
mod context;
mod error;
mod export;
mod manager;
mod orchestrator;
mod prompts;
mod providers;
mod repl;
mod response;
mod session;
mod storage;
mod ui;

use cli::Args;
use config::Config;
use manager::{ManagerSettings, SessionManager};
use orchestrator::Orchestrator;
use prompts::PromptLibrary;
use providers::{create_provider, LLMProvider};
use repl::Repl;
use storage::FileChatStorage;
use ui::UI;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = Config::from_args(&args)?;

    let storage = FileChatStorage::open(config.chat_history_dir(), &config.default_model)
        .with_context(|| {
            format!(
                "cannot use state directory {}",
                config.state_directory.display()
            )
        })?;
    info!(root = %storage.root().display(), "chat history ready");
    let prompts = PromptLibrary::open(config.prompts_dir())?;

    let provider: Arc<dyn LLMProvider> =
        Arc::from(create_provider("groq", &config.api_key, &config.base_url)?);
    let orchestrator = Orchestrator::new(provider, config.orchestrator_settings());

    let manager = SessionManager::new(
        Arc::new(storage),
        prompts,
        orchestrator,
        ManagerSettings {
            default_system_prompt: config.default_system_prompt.clone(),
            default_model: config.default_model.clone(),
            history_limit: config.history_limit,
            summary_history_limit: config.summary_history_limit,
            exports_dir: config.exports_dir(),
        },
    )?;

    let mut repl = Repl::new(manager, UI::new(config.inputs_file())?);
    if let Some(name) = &config.load_session {
        repl.load_startup_session(name).await;
    }
    repl.run().await
}

/// Logs go to stderr so they never interleave with the chat on stdout.
fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("groqchat=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
