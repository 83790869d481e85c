//! Backend that shells out to the `claude` CLI in print mode.
//!
//! Each call spawns one process:
//! `claude -p --output-format json --system-prompt <system> [--model m] --no-session-persistence`
//! with the user prompt on stdin. The JSON envelope's `result` field is the
//! completion; stdout is used verbatim when it is not a JSON envelope.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

const STDERR_LIMIT: usize = 2000;

pub struct CliBackend {
    pub binary: String,
    pub model: String,
    pub extra_args: Vec<String>,
}

impl CliBackend {
    pub fn new(binary: impl Into<String>, model: impl Into<String>) -> Self {
        Self { binary: binary.into(), model: model.into(), extra_args: Vec::new() }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn command(&self, system: &str, model: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-p")
            .args(["--output-format", "json"])
            .arg("--system-prompt")
            .arg(system)
            .arg("--no-session-persistence");
        if let Some(model) = model.filter(|m| !m.is_empty()) {
            cmd.arg("--model").arg(model);
        }
        cmd.args(&self.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl LlmBackend for CliBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        let prompt = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut child = self.command(req.system_text(), Some(model)).spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before reading stdin; report its exit status instead.
            let written = match stdin.write_all(prompt.as_bytes()).await {
                Ok(()) => stdin.shutdown().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LlmError::ProcessFailed {
                code: output.status.code(),
                stderr: stderr.chars().take(STDERR_LIMIT).collect(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(binary = %self.binary, bytes = stdout.len(), "cli completion received");
        let content = parse_cli_output(&stdout)?;

        Ok(LlmResponse {
            content,
            model: model.to_string(),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn name(&self) -> &str { "cli" }
    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

/// Pull the completion text out of `--output-format json` stdout.
pub fn parse_cli_output(stdout: &str) -> Result<String, LlmError> {
    let envelope: serde_json::Value = match serde_json::from_str(stdout.trim()) {
        Ok(v) => v,
        Err(_) => return Ok(stdout.to_string()),
    };

    if envelope["is_error"].as_bool() == Some(true) {
        let message = envelope["result"].as_str().unwrap_or("CLI reported an error").to_string();
        return Err(LlmError::ApiError { status: 0, message });
    }

    match envelope["result"].as_str() {
        Some(result) if !result.is_empty() => Ok(result.to_string()),
        _ => Ok(stdout.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Message;

    #[test]
    fn test_parse_envelope_result() {
        let out = r#"{"type":"result","subtype":"success","is_error":false,"result":"{\"status\":\"Include\"}"}"#;
        assert_eq!(parse_cli_output(out).unwrap(), r#"{"status":"Include"}"#);
    }

    #[test]
    fn test_parse_plain_stdout_passthrough() {
        assert_eq!(parse_cli_output("Include, obviously.\n").unwrap(), "Include, obviously.\n");
    }

    #[test]
    fn test_parse_error_envelope() {
        let out = r#"{"is_error":true,"result":"Credit balance is too low"}"#;
        let err = parse_cli_output(out).unwrap_err();
        assert!(err.to_string().contains("Credit balance"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_process_failure() {
        // `false` ignores its arguments and exits 1.
        let backend = CliBackend::new("false", "sonnet");
        let req = LlmRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            model: None,
            max_tokens: None,
            temperature: None,
        };
        let err = backend.complete(req).await.unwrap_err();
        assert!(matches!(err, LlmError::ProcessFailed { code: Some(1), .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let backend = CliBackend::new("agentflow-no-such-binary", "sonnet");
        let req = LlmRequest { messages: vec![Message::user("hi")], model: None, max_tokens: None, temperature: None };
        assert!(matches!(backend.complete(req).await.unwrap_err(), LlmError::Io(_)));
    }
}
