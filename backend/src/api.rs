use std::sync::Arc;

use axum::extract::State;

use crate::error::ApiError;
use crate::service::Service;

pub mod matches;

pub fn router(service: Arc<Service>) -> axum::Router {
    axum::Router::new()
        .merge(matches::router(service.clone()))
        .route("/health", axum::routing::get(health))
        .with_state(service)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

#[tracing::instrument(skip(service))]
async fn health(
    State(service): State<Arc<Service>>,
) -> Result<axum::Json<common::HealthStatus>, ApiError> {
    service.health().await.map(axum::Json)
}
