//! agentflow-llm — Stage invocation layer.
//!
//! The SLR pipeline only needs one thing from a language model: given an
//! agent definition and a text input, return some text. [`StageInvoker`] is
//! that seam. [`RoutedInvoker`] implements it over a [`LlmRouter`] holding
//! one or more [`LlmBackend`]s (the `claude` CLI, Anthropic, or any
//! OpenAI-compatible endpoint including Ollama).

pub mod audit;
pub mod backend;
pub mod cli;
pub mod invoker;
pub mod router;

pub use backend::{LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use cli::CliBackend;
pub use invoker::{build_prompt, RoutedInvoker, StageInvoker};
pub use router::LlmRouter;
