use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mailgate::channels::{EmailConfig, ImapMailbox, Mailbox, spawn_email_poller};
use mailgate::config::{ServiceConfig, WorkflowConfig};
use mailgate::llm::{LlmConfig, Reasoning, create_provider};
use mailgate::store::{Database, LibSqlBackend};
use mailgate::tools::ToolRegistry;
use mailgate::tools::builtin::register_builtin_tools;
use mailgate::workflow::WorkflowEngine;
use mailgate::workflow::routes::{ReviewRouteState, review_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let service = ServiceConfig::from_env();

    // Keep the guard alive for the lifetime of the process so file logs flush.
    let (file_layer, _log_guard) = match &service.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mailgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                ),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let workflow_config = WorkflowConfig::from_env().context("invalid workflow configuration")?;
    let llm_config = LlmConfig::from_env().context("invalid LLM configuration")?;
    let email_config =
        EmailConfig::from_env().context("EMAIL_IMAP_HOST must be set to run the mail gate")?;

    eprintln!("Mailgate v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", llm_config.model);
    eprintln!(
        "   Email: IMAP {} / SMTP {}",
        email_config.imap_host, email_config.smtp_host
    );
    eprintln!("   Review API: http://0.0.0.0:{}/api/reviews", service.http_port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&service.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", service.db_path.display()))?,
    );
    eprintln!("   Database: {}", service.db_path.display());

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm = create_provider(&llm_config)?;
    let reasoning = Arc::new(Reasoning::new(llm).with_temperature(llm_config.temperature));

    // ── Mailbox + tools ──────────────────────────────────────────────────
    let poll_interval = Duration::from_secs(email_config.poll_interval_secs);
    let mailbox: Arc<dyn Mailbox> = Arc::new(ImapMailbox::new(email_config));

    let tools = Arc::new(ToolRegistry::new());
    register_builtin_tools(&tools, Arc::clone(&mailbox));
    eprintln!("   Tools: {} registered", tools.count());

    // ── Engine ───────────────────────────────────────────────────────────
    let engine = Arc::new(
        WorkflowEngine::new(
            workflow_config,
            Arc::clone(&db),
            reasoning.clone(),
            reasoning,
            tools,
            Arc::clone(&mailbox),
        )
        .await?,
    );

    let pending = engine.pending_reviews().await?;
    if !pending.is_empty() {
        eprintln!("   Pending reviews: {}", pending.len());
    }

    let (poller, poller_shutdown) =
        spawn_email_poller(Arc::clone(&mailbox), Arc::clone(&engine), poll_interval);

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = review_routes(ReviewRouteState { engine }).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", service.http_port))
        .await
        .with_context(|| format!("failed to bind port {}", service.http_port))?;
    tracing::info!(port = service.http_port, "Review API started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
        })
        .await?;

    tracing::info!("Shutting down");
    poller_shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    poller.abort();

    Ok(())
}
