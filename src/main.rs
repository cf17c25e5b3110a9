use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;

use herb_triage::agent::Agent;
use herb_triage::channels::line::index_router;
use herb_triage::channels::{Channel, ChannelManager, CliChannel, LineChannel};
use herb_triage::config::{GenerationConfig, LineConfig, ProviderConfig, ServerConfig, TriageConfig};
use herb_triage::knowledge::KnowledgeBase;
use herb_triage::llm::{FallbackAdapter, create_provider};
use herb_triage::taxonomy::Taxonomy;
use herb_triage::triage::TriageEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env next to the binary; real environment wins.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let provider_config = ProviderConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export GOOGLE_API_KEY=...");
        std::process::exit(1);
    });
    let triage_config = TriageConfig::from_env().context("invalid triage configuration")?;
    let generation_config =
        GenerationConfig::from_env().context("invalid generation configuration")?;
    let server_config = ServerConfig::from_env().context("invalid server configuration")?;

    // ── Data ────────────────────────────────────────────────────────────
    // Any integrity gap between the taxonomy and the monographs stops startup.
    let knowledge = KnowledgeBase::load(triage_config.remedies_path.as_deref())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Remedy data failed to load");
            std::process::exit(1);
        });
    let taxonomy = Taxonomy::load(triage_config.taxonomy_path.as_deref(), &knowledge)
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Symptom taxonomy failed integrity checks");
            std::process::exit(1);
        });

    eprintln!("🌿 Herb Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", provider_config.model);
    eprintln!(
        "   Data: {} categories, {} symptoms, {} remedies",
        taxonomy.categories().len(),
        taxonomy.symptom_count(),
        knowledge.len()
    );
    eprintln!(
        "   Talking: {}",
        if triage_config.talking_enabled { "enabled" } else { "disabled" }
    );
    eprintln!(
        "   Free-text fallback: {}",
        if triage_config.free_text_fallback { "enabled" } else { "disabled" }
    );

    // ── Engine ──────────────────────────────────────────────────────────
    let llm = create_provider(&provider_config).context("failed to create Gemini provider")?;
    let fallback = Arc::new(FallbackAdapter::new(llm, generation_config));
    let engine = Arc::new(
        TriageEngine::new(Arc::new(taxonomy), Arc::new(knowledge), fallback)
            .with_free_text_fallback(triage_config.free_text_fallback),
    );

    // ── Channels ────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut app = index_router();

    if let Some(line_config) = LineConfig::from_env() {
        let line = LineChannel::new(line_config);
        match line.health_check().await {
            Ok(()) => eprintln!("   LINE: enabled"),
            Err(e) => eprintln!("   LINE: enabled, but bot info check failed: {e}"),
        }
        app = app.merge(line.router());
        channels.add(Box::new(line));
    } else {
        eprintln!("   LINE: disabled (set CHANNEL_ACCESS_TOKEN and CHANNEL_SECRET)");
    }

    if server_config.cli_enabled {
        channels.add(Box::new(CliChannel::new()));
    }

    if channels.is_empty() {
        anyhow::bail!("no channels configured; set LINE credentials or TRIAGE_CLI=true");
    }
    eprintln!("   Channels: {}", channels.names().join(", "));

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = app.layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.port))
        .await
        .with_context(|| format!("failed to bind port {}", server_config.port))?;
    eprintln!("   Webhook: http://0.0.0.0:{}/callback\n", server_config.port);

    tokio::spawn(async move {
        tracing::info!("HTTP server started");
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "HTTP server stopped");
        }
    });

    let agent = Agent::new(engine, channels, triage_config.talking_enabled);
    agent.run().await?;

    Ok(())
}
