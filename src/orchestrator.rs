use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ChatError, Result};
use crate::providers::{ChatRequest, LLMProvider, Message};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub reply: SamplingParams,
    pub summary_max_tokens: u32,
    pub naming_max_tokens: u32,
    pub request_timeout: Duration,
}

const SUMMARY_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.7,
    top_p: 1.0,
};

const NAMING_SAMPLING: SamplingParams = SamplingParams {
    temperature: 0.5,
    top_p: 1.0,
};

/// The three request shapes issued against the completion provider.
pub struct Orchestrator {
    provider: Arc<dyn LLMProvider>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: OrchestratorSettings) -> Self {
        Self { provider, settings }
    }

    pub fn models(&self) -> Vec<String> {
        self.provider.get_models()
    }

    /// Ordinary reply over a windowed context. Failures are returned so the
    /// caller can roll back the user turn.
    pub async fn reply(
        &self,
        messages: Vec<Message>,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = ChatRequest {
            messages,
            model: model.to_string(),
            temperature: self.settings.reply.temperature,
            top_p: self.settings.reply.top_p,
            max_tokens: None,
        };
        self.run(request, cancel).await
    }

    pub async fn summarize(
        &self,
        messages: Vec<Message>,
        model: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = ChatRequest {
            messages,
            model: model.to_string(),
            temperature: SUMMARY_SAMPLING.temperature,
            top_p: SUMMARY_SAMPLING.top_p,
            max_tokens: Some(self.settings.summary_max_tokens),
        };
        self.run(request, cancel).await
    }

    /// Short label for a conversation. Any failure yields `None`.
    pub async fn name(
        &self,
        messages: Vec<Message>,
        model: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let request = ChatRequest {
            messages,
            model: model.to_string(),
            temperature: NAMING_SAMPLING.temperature,
            top_p: NAMING_SAMPLING.top_p,
            max_tokens: Some(self.settings.naming_max_tokens),
        };
        match self.run(request, cancel).await {
            Ok(raw) => clean_name(&raw),
            Err(e) => {
                warn!(error = %e, "chat naming failed, keeping default name");
                None
            }
        }
    }

    async fn run(&self, request: ChatRequest, cancel: &CancellationToken) -> Result<String> {
        debug!(
            provider = self.provider.get_name(),
            model = %request.model,
            messages = request.messages.len(),
            max_tokens = ?request.max_tokens,
            "completion request"
        );

        let call = tokio::time::timeout(self.settings.request_timeout, self.provider.complete(request));
        let outcome = tokio::select! {
            outcome = call => outcome,
            _ = cancel.cancelled() => return Err(ChatError::Upstream("request cancelled".to_string())),
        };

        match outcome {
            Err(_) => Err(ChatError::Upstream(format!(
                "no response within {}s",
                self.settings.request_timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(ChatError::Upstream(e.to_string())),
            Ok(Ok(text)) if text.trim().is_empty() => {
                Err(ChatError::Upstream("empty response".to_string()))
            }
            Ok(Ok(text)) => Ok(text),
        }
    }
}

fn clean_name(raw: &str) -> Option<String> {
    let name = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    let name = name.lines().next().unwrap_or_default().trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
