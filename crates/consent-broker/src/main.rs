//! Consent broker service
//!
//! Provides:
//! - Signed client registration (`POST /api/clients`)
//! - Consent queries proxied to the consent decision service

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use consent_broker::{
    router, AppState, CachingKeyResolver, ClientRegistry, Config, ConsentQueryProxy,
    FileClientStore, HttpConsentService, HttpKeyResolver, KeyResolver, SignatureVerifier,
};

#[derive(Parser, Debug)]
#[command(name = "consent-broker")]
#[command(about = "Signed client registration and consent query broker")]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 3002, env = "BROKER_PORT")]
    port: u16,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "BROKER_BIND")]
    bind: String,

    /// Path to config directory (also holds clients.json)
    #[arg(long, default_value = "/config", env = "BROKER_CONFIG_PATH")]
    config_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "consent_broker=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config_path)?;
    let store = FileClientStore::open(&cli.config_path)?;

    let http_resolver = HttpKeyResolver::new(config.keys.fetch_timeout())?;
    let resolver: Arc<dyn KeyResolver> = match config.keys.cache_ttl() {
        Some(ttl) => {
            tracing::info!("Caching resolved keys for {:?}", ttl);
            Arc::new(CachingKeyResolver::new(http_resolver, ttl))
        }
        None => Arc::new(http_resolver),
    };
    if !config.keys.require_signed_jwks_url {
        tracing::warn!("Unsigned jwksUrl values are accepted for key discovery");
    }

    let consent_service =
        HttpConsentService::new(&config.consents.base_url, config.consents.timeout())?;

    let state = Arc::new(AppState {
        verifier: SignatureVerifier::new(resolver)
            .require_signed_jwks_url(config.keys.require_signed_jwks_url),
        registry: ClientRegistry::new(Arc::new(store)),
        consents: ConsentQueryProxy::new(Arc::new(consent_service)),
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", cli.bind, cli.port).parse()?;

    tracing::info!("Starting consent-broker on {}", addr);
    tracing::info!("Consent service: {}", config.consents.base_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Consent broker shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
