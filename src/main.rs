//! Voicebridge server entry point.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use voicebridge::AppState;
use voicebridge::config::{AppConfig, VoiceSettings};
use voicebridge::negotiator::SessionNegotiator;
use voicebridge::prompt::PromptComposer;
use voicebridge::server::build_router;
use voicebridge::state::PendingCallStore;
use voicebridge::telephony::{TelephonyAdapter, TelnyxAdapter, TwilioAdapter};
use voicebridge::tools::ToolRegistry;
use voicebridge::ultravox::UltravoxClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (M-LOG-STRUCTURED)
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    // Load .env (if present)
    let _ = dotenv();

    let config = Arc::new(match AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        }
    });

    if Url::parse(&config.server.external_url).is_err() {
        eprintln!(
            "Configuration error: external URL is not a valid URL: {}",
            config.server.external_url
        );
        std::process::exit(1);
    }

    let settings = VoiceSettings::load_from_env();
    settings.warn_missing_provider_credentials(&config.telephony.provider);

    info!(
        name: "voice.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        voice = %settings.voice,
        "voice backend configuration loaded"
    );

    // Tool slots: load once at startup
    let registry = ToolRegistry::load_from_env();
    for tool in registry.all() {
        info!(name: "tool.discovered", tool = %tool.name, "tool slot loaded");
    }

    let client = UltravoxClient::new(settings.base_url.clone(), settings.api_key.clone());
    let composer = PromptComposer::new(
        settings.inbound_prompt.clone(),
        settings.outbound_prompt.clone(),
    );
    let negotiator = Arc::new(SessionNegotiator::new(
        client,
        registry,
        composer,
        settings.negotiator_settings(),
    ));

    // Telephony adapter: selected once, injected into the route layer
    let adapter: Arc<dyn TelephonyAdapter> = match config.telephony.provider.as_str() {
        "twilio" => Arc::new(TwilioAdapter::new(
            settings.twilio.account_sid.clone(),
            settings.twilio.auth_token.clone(),
            settings.twilio.from_number.clone(),
            Arc::clone(&negotiator),
        )),
        "telnyx" => Arc::new(TelnyxAdapter::new(
            settings.telnyx.api_key.clone(),
            settings.telnyx.connection_id.clone(),
            settings.telnyx.from_number.clone(),
            Arc::clone(&negotiator),
        )),
        other => {
            eprintln!("Configuration error: unknown telephony provider '{other}'");
            std::process::exit(1);
        }
    };
    info!(name: "telephony.adapter.selected", provider = %adapter.name(), "telephony adapter ready");

    let pending = PendingCallStore::new(Duration::from_secs(config.state.pending_ttl_secs));

    // Sweep abandoned deferred-connect entries
    {
        let pending = pending.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                let removed = pending.purge_expired();
                if removed > 0 {
                    warn!(removed, "purged abandoned pending call contexts");
                }
            }
        });
    }

    let state = AppState {
        negotiator,
        adapter,
        pending,
        config: Arc::clone(&config),
    };

    let app = build_router(state, config.resilience.timeout_disabled);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        external_url = %config.server.external_url,
        "server started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
