use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use refi_assist::channels::{MessengerClient, WebhookState, webhook_routes};
use refi_assist::config::{AppConfig, ServerConfig};
use refi_assist::conversation::{ConversationDeps, ConversationService};
use refi_assist::inquiry::{KeywordTable, PresetTable};
use refi_assist::llm::{DisabledProvider, LlmProvider, create_provider};
use refi_assist::locale::MessageCatalog;
use refi_assist::store::{self, Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    let _log_guard = init_tracing(&config.server);

    eprintln!("🏠 Refi Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.server.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.server.db_path)
            .await
            .with_context(|| {
                format!("failed to open database at {}", config.server.db_path.display())
            })?,
    );
    eprintln!("   Database: {}", config.server.db_path.display());

    if let Some(path) = &config.server.bank_rates_path {
        let count = store::seed_bank_rates(db.as_ref(), path)
            .await
            .with_context(|| format!("failed to load bank rates from {}", path.display()))?;
        eprintln!("   Bank rates: {count} loaded from {}", path.display());
    }
    if db.list_bank_rates().await?.is_empty() {
        tracing::warn!("No bank rates stored; savings will be unavailable");
    }
    if let Some(latest) = db.list_leads(1).await?.first() {
        eprintln!("   Last lead: {}", latest.created_at.format("%Y-%m-%d %H:%M UTC"));
    }

    // ── LLM ──────────────────────────────────────────────────────────────
    let llm: Arc<dyn LlmProvider> = match &config.llm {
        Some(llm_config) => create_provider(llm_config)?,
        None => Arc::new(DisabledProvider),
    };
    eprintln!("   Model: {}", llm.model_name());

    // ── Messenger ────────────────────────────────────────────────────────
    if config.messenger.page_access_token.is_none() {
        tracing::warn!("PAGE_ACCESS_TOKEN not set; replies cannot be delivered");
    }
    let messenger = Arc::new(MessengerClient::new(&config.messenger));

    // ── Conversation ─────────────────────────────────────────────────────
    let service = Arc::new(ConversationService::new(ConversationDeps {
        db,
        messenger,
        llm,
        catalog: Arc::new(MessageCatalog::builtin()?),
        presets: PresetTable::builtin()?,
        keywords: KeywordTable::builtin()?,
        flow: config.flow.clone(),
        inquiry: config.inquiry.clone(),
        admin: config.admin.clone(),
    }));
    eprintln!(
        "   Flow: {} steps, {} questions per window\n",
        service.registry().steps().len(),
        config.inquiry.quota.limit
    );

    // ── HTTP ─────────────────────────────────────────────────────────────
    let app = webhook_routes(WebhookState {
        handler: service,
        verify_token: config.messenger.verify_token.clone(),
    })
    .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .with_context(|| format!("failed to bind port {}", config.server.port))?;
    tracing::info!(port = config.server.port, "Webhook server started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Stderr logging, plus a daily file when a log directory is configured.
fn init_tracing(server: &ServerConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, guard) = match &server.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "refi-assist.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}
