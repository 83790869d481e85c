//! LLM router — selects a backend from an agent's model selector.
//!
//! A selector is either a bare model name (`sonnet`, `llama3:8b`), sent to the
//! default backend, or `backend:model` where `backend` is a registered name.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{LlmBackend, LlmError, LlmRequest, LlmResponse};

/// Where one request goes.
pub struct Route<'a> {
    pub backend: &'a Arc<dyn LlmBackend>,
    /// Model to request, `None` to use the backend's own default.
    pub model: Option<String>,
}

pub struct LlmRouter {
    backends: HashMap<String, Arc<dyn LlmBackend>>,
    default_backend: String,
}

impl LlmRouter {
    pub fn new(default_backend: impl Into<String>) -> Self {
        Self { backends: HashMap::new(), default_backend: default_backend.into() }
    }

    pub fn register_backend(&mut self, name: impl Into<String>, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(name.into(), backend);
    }

    pub fn backend_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.backends.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, selector: Option<&str>) -> Result<Route<'_>, LlmError> {
        let selector = selector.map(str::trim).filter(|s| !s.is_empty());

        if let Some((prefix, model)) = selector.and_then(|s| s.split_once(':')) {
            if let Some(backend) = self.backends.get(prefix) {
                let model = Some(model.to_string()).filter(|m| !m.is_empty());
                return Ok(Route { backend, model });
            }
        }

        let backend = self.backends.get(&self.default_backend).ok_or_else(|| {
            LlmError::Unavailable(format!("Default backend '{}' not configured", self.default_backend))
        })?;
        Ok(Route { backend, model: selector.map(str::to_string) })
    }

    /// Route and execute a request. `selector` overrides `req.model`.
    pub async fn route(&self, selector: Option<&str>, mut req: LlmRequest) -> Result<(String, LlmResponse), LlmError> {
        let route = self.resolve(selector.or(req.model.as_deref()))?;
        req.model = route.model.clone();

        tracing::debug!(
            backend = route.backend.name(),
            model = req.model.as_deref().unwrap_or(route.backend.model_id()),
            is_local = route.backend.is_local(),
            "LLM request routed"
        );

        let backend_name = route.backend.name().to_string();
        let resp = route.backend.complete(req).await?;
        Ok((backend_name, resp))
    }
}
