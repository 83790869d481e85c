//! Audit records for stage invocations.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAuditEntry {
    pub id: Uuid,
    pub correlation_id: String,
    pub agent_id: String,
    pub model: String,
    pub backend: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub output_hash: String,
    pub output_chars: usize,
    pub latency_ms: u64,
    pub called_at: chrono::DateTime<Utc>,
}

impl LlmAuditEntry {
    pub fn new(
        correlation_id: &str,
        agent_id: &str,
        backend: &str,
        model: &str,
        prompt_tokens: u32,
        completion_tokens: u32,
        output: &str,
        latency_ms: u64,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        let output_hash = format!("{:x}", hasher.finalize());

        Self {
            id: Uuid::new_v4(),
            correlation_id: correlation_id.to_string(),
            agent_id: agent_id.to_string(),
            model: model.to_string(),
            backend: backend.to_string(),
            prompt_tokens,
            completion_tokens,
            output_hash,
            output_chars: output.chars().count(),
            latency_ms,
            called_at: Utc::now(),
        }
    }

    /// Write the entry to the `agentflow::audit` tracing target.
    pub fn emit(&self) {
        tracing::info!(
            target: "agentflow::audit",
            audit_id = %self.id,
            correlation_id = %self.correlation_id,
            agent_id = %self.agent_id,
            backend = %self.backend,
            model = %self.model,
            prompt_tokens = self.prompt_tokens,
            completion_tokens = self.completion_tokens,
            output_hash = %self.output_hash,
            output_chars = self.output_chars,
            latency_ms = self.latency_ms,
            "stage invocation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_hash_is_sha256_hex() {
        let e = LlmAuditEntry::new("slr-j-0", "slr-screener", "cli", "sonnet", 0, 0, "abc", 12);
        assert_eq!(e.output_hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
        assert_eq!(e.output_chars, 3);
    }
}
