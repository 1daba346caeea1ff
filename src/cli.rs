use clap::Parser;

use crate::providers::openai::DEFAULT_BASE_URL;

/// Returns the default state directory following XDG Base Directory specification.
/// Uses $XDG_DATA_HOME/groqchat if set, otherwise ~/.local/share/groqchat
pub fn default_state_directory() -> String {
    if let Ok(xdg_data_home) = std::env::var("XDG_DATA_HOME") {
        format!("{}/groqchat", xdg_data_home)
    } else if let Some(home) = dirs::home_dir() {
        format!("{}/.local/share/groqchat", home.display())
    } else {
        ".".to_string()
    }
}

#[derive(Parser, Debug)]
#[command(name = "groqchat")]
#[command(about = "Interactive LLM chat with autosaved, archivable sessions")]
#[command(version)]
pub struct Args {
    /// API key for the completion service (falls back to GROQ_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// OpenAI-compatible endpoint
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Model for new chats
    #[arg(short, long, default_value = "llama3-70b-8192")]
    pub model: String,

    /// Temperature for replies (0.0 to 2.0)
    #[arg(short, long, default_value = "0.7")]
    pub temperature: f32,

    /// Nucleus sampling for replies
    #[arg(long, default_value = "1.0")]
    pub top_p: f32,

    /// Messages sent as context with each reply
    #[arg(long, default_value = "10")]
    pub history_limit: usize,

    /// Messages included when summarizing
    #[arg(long, default_value = "50")]
    pub summary_history_limit: usize,

    /// Token budget for summaries
    #[arg(long, default_value = "200")]
    pub summary_max_tokens: u32,

    /// Token budget for automatic chat names
    #[arg(long, default_value = "10")]
    pub naming_max_tokens: u32,

    /// Seconds to wait for a completion
    #[arg(long, default_value = "120")]
    pub request_timeout: u64,

    /// File holding the default system prompt
    #[arg(long)]
    pub system_prompt_file: Option<String>,

    /// Load a saved chat at startup
    #[arg(long)]
    pub load_session: Option<String>,

    /// State directory for chats, prompts, exports and input history
    #[arg(long, default_value_t = default_state_directory())]
    pub state_directory: String,
}
