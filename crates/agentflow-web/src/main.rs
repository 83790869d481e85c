//! agentflow web server
//!
//! Run with: cargo run -p agentflow-web

use std::sync::Arc;

use agentflow_config::{Config, LlmConfig};
use agentflow_db::{AgentRepository, Database};
use agentflow_llm::backend::{AnthropicBackend, OpenAiCompatibleBackend};
use agentflow_llm::{CliBackend, LlmRouter, RoutedInvoker};
use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Register every backend the config can build; `mode` picks the default.
fn build_llm_router(llm: &LlmConfig) -> LlmRouter {
    let mut router = LlmRouter::new(llm.mode.clone());

    router.register_backend(
        "cli",
        Arc::new(CliBackend::new(&llm.cli.binary, &llm.default_model).with_args(llm.cli.extra_args.clone())),
    );

    if llm.anthropic.api_key.trim().is_empty() {
        if llm.mode == "anthropic" {
            warn!("Anthropic selected but no API key found (set llm.anthropic.api_key or AGENTFLOW_ANTHROPIC_API_KEY)");
        }
    } else {
        router.register_backend(
            "anthropic",
            Arc::new(
                AnthropicBackend::new(&llm.anthropic.api_key, &llm.default_model)
                    .with_base_url(&llm.anthropic.base_url),
            ),
        );
    }

    let compat_key = Some(llm.openai_compatible.api_key.clone()).filter(|k| !k.is_empty());
    router.register_backend(
        "openai_compatible",
        Arc::new(OpenAiCompatibleBackend::new(&llm.openai_compatible.base_url, &llm.default_model, compat_key)),
    );
    router.register_backend(
        "ollama",
        Arc::new(OpenAiCompatibleBackend::ollama(&llm.ollama.base_url, &llm.default_model)),
    );

    router
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("agentflow=debug,info")),
        )
        .init();

    info!("Starting agentflow web server, version {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("loading agentflow.toml")?;
    info!(
        llm_mode = %config.llm.mode,
        concurrency = config.batch.concurrency,
        max_retained_jobs = config.jobs.max_retained,
        "configuration loaded"
    );

    let data_dir = Database::expand_path(&config.storage.data_dir)?;
    let db = Database::open(&data_dir)
        .await
        .with_context(|| format!("opening data dir {}", data_dir.display()))?;
    let agents = Arc::new(AgentRepository::open(db).await?);
    info!(path = %data_dir.display(), "agent store ready");

    let router = build_llm_router(&config.llm);
    info!(backends = ?router.backend_names(), default = %config.llm.mode, "LLM router ready");
    let invoker = Arc::new(RoutedInvoker::new(Arc::new(router)));

    let bind = config.server.bind.clone();
    let state = agentflow_web::AppState::new(agents, invoker, config);
    let app = agentflow_web::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!("Server listening on http://{}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutting down");
        })
        .await?;

    Ok(())
}
