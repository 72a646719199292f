pub mod health;
pub mod report;

use crate::config::Config;
use crate::orchestration::ReportRunner;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub runner: Arc<ReportRunner>,
}

impl AppState {
    pub fn new(config: Config, runner: Arc<ReportRunner>) -> Self {
        Self { config, runner }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/report", post(report::post_report))
        .route("/v1/report/csv", post(report::post_report_csv))
        .layer(cors)
        .with_state(state)
}
