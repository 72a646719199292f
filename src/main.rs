use anyhow::Context;
use fifotax::{api, config::Config, EventSource, JsonFileSource, ReportRunner};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = Config::from_env().context("loading configuration")?;
    let port = config.port;

    tracing::info!(
        events_path = %config.events_path,
        reference_currency = %config.ledger.reference_currency,
        "configuration loaded"
    );

    let source: Arc<dyn EventSource> = Arc::new(JsonFileSource::new(config.events_path.clone()));
    let runner = Arc::new(ReportRunner::new(source, config.ledger.clone()));

    // Create router
    let app = api::create_router(api::AppState::new(config, runner));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    // Run server
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
