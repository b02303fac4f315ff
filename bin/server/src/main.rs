use learnhub_server::{auth::AppState, config::ServerConfig, router};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!(api_base = %config.session.api_base_url, "Loaded configuration");

    let transport = config
        .session
        .transport()
        .expect("failed to create HTTP client");
    let app_state =
        Arc::new(AppState::from_config(&config, transport).expect("failed to build app state"));

    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
