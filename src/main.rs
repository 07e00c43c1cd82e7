use keyvault::{
    config::AppConfig,
    vault::{Cipher, Vault},
    web::{self, AdminToken, AppState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Configuration decides the log format, so it loads first
    let config = AppConfig::load()?;
    init_tracing(config.log.json);

    info!("Starting Key Vault v{}", env!("CARGO_PKG_VERSION"));
    info!(
        default_rate_limit = config.vault.default_rate_limit,
        rotation_policy = ?config.vault.rotation_policy,
        conceal_forbidden = config.access.conceal_forbidden,
        "Configuration loaded"
    );

    let cipher = Cipher::from_base64(&config.vault.master_key)
        .map_err(|e| anyhow::anyhow!("Invalid vault master key: {}", e))?;
    let vault = Arc::new(Vault::new(cipher, config.vault_settings()));

    let state = AppState::new(
        vault,
        AdminToken::new(config.admin.token.clone()),
        config.access.conceal_forbidden,
    );
    let app = web::create_router(state);

    let addr = config.web.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Key vault listening on http://{}", addr);
    warn!("Keys live in memory only; use /admin/export for backups");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Key vault shut down");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "keyvault=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
