use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_adesao_api::api;
use rust_adesao_api::config::Config;
use rust_adesao_api::handlers::AppState;
use rust_adesao_api::lookup_cache::LookupCache;
use rust_adesao_api::notifier::EmailNotifier;
use rust_adesao_api::services::{CepService, CnpjService};
use rust_adesao_api::session::SessionStore;

/// Main entry point for the application.
///
/// Initializes tracing, configuration, lookup caches and clients, the email
/// notifier and the session store, then serves the axum router.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_adesao_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Lookup cache shared by both providers, keys are prefixed per provider
    let lookup_cache = LookupCache::new(Duration::from_secs(config.lookup_cache_ttl_secs), 10_000);
    tracing::info!(
        "Lookup cache initialized ({}s TTL, 10k capacity)",
        config.lookup_cache_ttl_secs
    );

    let cnpj_service = CnpjService::new(&config, lookup_cache.clone())?;
    let cep_service = CepService::new(&config, lookup_cache)?;
    tracing::info!(
        "✓ Lookup clients initialized (timeout {}s, {} attempt(s))",
        config.lookup_timeout_secs,
        config.lookup_max_retries
    );

    let notifier = EmailNotifier::from_config(&config)?;
    tracing::info!(
        "✓ Email notifier initialized (test mode: {})",
        notifier.is_test_mode()
    );

    let sessions = SessionStore::new(Duration::from_secs(config.session_ttl_secs), 50_000);

    let app_state = Arc::new(AppState {
        config: config.clone(),
        cnpj_service,
        cep_service,
        notifier,
        sessions,
    });

    // Rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limiter configuration"))?,
    );

    let protected_routes = api::api_routes().layer(ServiceBuilder::new().layer(GovernorLayer {
        config: governor_conf,
    }));

    let app = api::router(app_state, protected_routes);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
