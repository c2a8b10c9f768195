use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use mpesa_api::config::MpesaConfig;
use mpesa_api::{build_router, AppConfig, AppState, MpesaService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    tracing::info!("🌐 Environment: {}", config.mpesa.environment.as_str());
    tracing::info!("📱 Short code: {}", config.mpesa.short_code);
    tracing::debug!("Config: {}", config.config_info());

    let AppConfig { mpesa, port, host } = config;
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("HOST and PORT do not form a socket address")?;

    let app_state = initialize_app_state(mpesa).await;
    start_server(build_router(app_state), addr).await
}

async fn initialize_app_state(mpesa_config: MpesaConfig) -> AppState {
    let app_state = AppState::new();

    tracing::info!("🔧 Attempting to initialize M-Pesa service...");
    let mpesa_service = match MpesaService::from_config(mpesa_config) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!("❌ Failed to build M-Pesa client: {}", e);
            tracing::warn!("M-Pesa service will be disabled");
            return app_state;
        }
    };

    // Fetch a token up front so bad credentials show up at boot.
    match mpesa_service.get_access_token().await {
        Ok(_) => {
            tracing::info!("✅ M-Pesa service initialized and ready");
            app_state.with_mpesa(mpesa_service)
        }
        Err(e) => {
            tracing::error!("❌ Failed to get M-Pesa access token: {}", e);
            tracing::warn!("M-Pesa service will be disabled");
            app_state
        }
    }
}

async fn start_server(app: axum::Router, addr: SocketAddr) -> anyhow::Result<()> {
    tracing::info!("🚀 Server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
