//! CareLink signaling server

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use carelink_api::{config::LogFormat, routes::create_router, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    let pool = match &config.database_url {
        Some(url) => {
            let pool = carelink_shared::create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            if config.run_migrations {
                carelink_shared::run_migrations(&pool)
                    .await
                    .context("Failed to run migrations")?;
                tracing::info!("Database migrations applied");
            }
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; presence and room linkage will not be persisted");
            None
        }
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, pool);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "CareLink signaling server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("carelink_api=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = ?e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
