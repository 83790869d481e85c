//! The stage invocation seam used by the SLR classifier.

use std::sync::Arc;
use std::time::Instant;

use agentflow_common::AgentConfig;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::audit::LlmAuditEntry;
use crate::backend::{LlmError, LlmRequest, Message};
use crate::router::LlmRouter;

/// Runs one agent over one text input and returns its raw text output.
///
/// Implementations may fail and may return text with no particular
/// structure; callers are expected to parse defensively.
#[async_trait]
pub trait StageInvoker: Send + Sync {
    async fn invoke(&self, agent: &AgentConfig, input: &str, correlation_id: &str) -> Result<String, LlmError>;
}

/// User-turn prompt for an agent.
pub fn build_prompt(agent: &AgentConfig, input: &str) -> String {
    let mut prompt = String::new();
    if !agent.role.trim().is_empty() {
        prompt.push_str(&format!("Your role: {}\n\n", agent.role));
    }
    prompt.push_str("Task input:\n");
    prompt.push_str(input);
    prompt
}

/// [`StageInvoker`] backed by an [`LlmRouter`].
pub struct RoutedInvoker {
    router: Arc<LlmRouter>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl RoutedInvoker {
    pub fn new(router: Arc<LlmRouter>) -> Self {
        Self { router, max_tokens: None, temperature: None }
    }
}

#[async_trait]
impl StageInvoker for RoutedInvoker {
    async fn invoke(&self, agent: &AgentConfig, input: &str, correlation_id: &str) -> Result<String, LlmError> {
        let req = LlmRequest {
            messages: vec![
                Message::system(agent.system_prompt.clone()),
                Message::user(build_prompt(agent, input)),
            ],
            model: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let selector = agent.effective_model(None);
        debug!(correlation_id, agent_id = %agent.id, model = selector.unwrap_or("default"), "invoking stage agent");

        let started = Instant::now();
        match self.router.route(selector, req).await {
            Ok((backend, resp)) => {
                LlmAuditEntry::new(
                    correlation_id,
                    &agent.id,
                    &backend,
                    &resp.model,
                    resp.prompt_tokens,
                    resp.completion_tokens,
                    &resp.content,
                    started.elapsed().as_millis() as u64,
                )
                .emit();
                Ok(resp.content)
            }
            Err(e) => {
                warn!(correlation_id, agent_id = %agent.id, error = %e, "stage invocation failed");
                Err(e)
            }
        }
    }
}
