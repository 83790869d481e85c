//! LLM backend trait and HTTP implementations.
//!
//! Backends:
//!   OpenAiCompatibleBackend — any `/v1/chat/completions` endpoint (Ollama,
//!                             vLLM, LMStudio, OpenRouter, OpenAI itself)
//!   AnthropicBackend        — Anthropic Messages API (claude-*)
//!   CliBackend              — the `claude` command-line tool, see `cli.rs`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("{}", process_failure_message(.code, .stderr))]
    ProcessFailed { code: Option<i32>, stderr: String },
}

fn process_failure_message(code: &Option<i32>, stderr: &str) -> String {
    if !stderr.trim().is_empty() {
        return stderr.trim().to_string();
    }
    match *code {
        Some(code) => format!("Process exited with code {code}"),
        None => "Process terminated by signal".to_string(),
    }
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn system_text(&self) -> &str {
        self.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    /// Short name used in logs and audit entries.
    fn name(&self) -> &str;
    /// Model used when the request does not name one.
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

// ── OpenAI-compatible ─────────────────────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    name: String,
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    local: bool,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    /// `base_url` includes the version segment, e.g. `http://host:8000/v1`.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            name: "openai_compatible".to_string(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            local: false,
            client: reqwest::Client::new(),
        }
    }

    /// Local Ollama through its OpenAI-compatible endpoint.
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base = base_url.into();
        let mut backend = Self::new(format!("{}/v1", base.trim_end_matches('/')), model, None);
        backend.name = "ollama".to_string();
        backend.local = true;
        backend
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(4096),
            "temperature": req.temperature.unwrap_or(0.1),
        });
        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let json = check_response_status(builder.send().await?).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn name(&self) -> &str { &self.name }
    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { self.local }
}

// ── Anthropic ─────────────────────────────────────────────────────────────────

pub struct AnthropicBackend {
    pub model: String,
    pub base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.anthropic.com".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        // Messages API takes the system prompt as a top-level field
        let system = req.system_text();

        let messages: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
            .collect();

        let model = req.model.as_deref().unwrap_or(&self.model);

        let mut body = serde_json::json!({
            "model":      model,
            "messages":   messages,
            "max_tokens": req.max_tokens.unwrap_or(4096),
        });
        if !system.is_empty() {
            body["system"] = serde_json::Value::String(system.to_string());
        }
        if let Some(t) = req.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        let resp = self.client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let json = check_response_status(resp).await?;

        let content = json["content"]
            .as_array()
            .map(|blocks| {
                blocks.iter()
                    .filter_map(|b| b["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: json["model"].as_str().unwrap_or(model).to_string(),
            prompt_tokens:     json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        })
    }

    fn name(&self) -> &str { "anthropic" }
    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "model": "llama3",
            "choices": [{"message": {"content": "{\"status\":\"Include\"}"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5}
        });
        let resp = parse_openai_response(&json, "fallback");
        assert_eq!(resp.content, "{\"status\":\"Include\"}");
        assert_eq!(resp.model, "llama3");
        assert_eq!(resp.prompt_tokens, 12);
    }

    #[test]
    fn test_ollama_base_url_gets_v1() {
        let b = OpenAiCompatibleBackend::ollama("http://localhost:11434/", "llama3");
        assert_eq!(b.base_url, "http://localhost:11434/v1");
        assert!(b.is_local());
        assert_eq!(b.name(), "ollama");
    }

    #[test]
    fn test_process_failure_message_prefers_stderr() {
        let err = LlmError::ProcessFailed { code: Some(1), stderr: " rate limited \n".into() };
        assert_eq!(err.to_string(), "rate limited");
        let err = LlmError::ProcessFailed { code: Some(2), stderr: String::new() };
        assert_eq!(err.to_string(), "Process exited with code 2");
    }
}
