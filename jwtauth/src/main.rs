#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use std::net::SocketAddr;
use std::sync::Arc;

use jwtauth::clock::{SystemTimeSource, TimeSource};
use jwtauth::config::ServerConfig;
use jwtauth::server::{AppState, router};
use jwtauth::store::spawn_sweep_task;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jwtauth=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment variables
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: listen_port={}, debug={}, accounts={}, algorithm={:?}",
        config.listen_port,
        config.debug,
        config.accounts.len(),
        config.settings.algorithm
    );
    if config.debug {
        tracing::warn!("debug mode: cookies are sent without the Secure flag");
    }

    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource);
    let state = match AppState::from_config(&config, Arc::clone(&clock)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to create token signer: {e}");
            std::process::exit(1);
        }
    };

    let _sweep = spawn_sweep_task(
        Arc::downgrade(state.manager.store()),
        clock,
        config.sweep_interval,
    );

    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.listen_port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind: {e}");
            std::process::exit(1);
        });

    axum::serve(listener, app).await.unwrap_or_else(|e| {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    });
}
