use std::sync::Arc;

use axum::extract::{multipart::MultipartRejection, Multipart, Path, State};
use axum::http::HeaderMap;

use common::demo_analysis::{MatchStatistics, PlayerHeatmap};

use crate::error::ApiError;
use crate::service::Service;

/// Optional request header choosing the id of the new match.
pub const MATCH_ID_HEADER: &str = "x-match-id";

/// Room for the multipart framing around the file itself.
const FORM_OVERHEAD: u64 = 1024 * 1024;

pub fn router(service: Arc<Service>) -> axum::Router<Arc<Service>> {
    let body_limit =
        usize::try_from(service.settings.max_upload_bytes + FORM_OVERHEAD).unwrap_or(usize::MAX);

    axum::Router::new()
        .route(
            "/process-demo",
            axum::routing::post(process_demo)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .route("/match-details/:id", axum::routing::get(details))
        .route("/match-details/:id/status", axum::routing::get(status))
        .route("/match-details/:id/heatmaps", axum::routing::get(heatmaps))
}

fn requested_match_id(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    headers
        .get(MATCH_ID_HEADER)
        .map(|value| {
            value
                .to_str()
                .map(|v| v.trim().to_owned())
                .map_err(|_| ApiError::Validation(format!("{} is not valid text", MATCH_ID_HEADER)))
        })
        .transpose()
}

#[tracing::instrument(skip(service, headers, form))]
async fn process_demo(
    State(service): State<Arc<Service>>,
    headers: HeaderMap,
    form: Result<Multipart, MultipartRejection>,
) -> Result<axum::Json<MatchStatistics>, ApiError> {
    let requested = requested_match_id(&headers)?;
    let form = form.map_err(|e| ApiError::Validation(e.body_text()))?;

    let demo = crate::spool_upload(form, &service.settings).await?;
    tracing::info!(filename = %demo.filename, size = demo.size, "Received demo");

    let stored = service.submit(demo, requested).await?;

    Ok(axum::Json(stored.statistics.clone()))
}

#[tracing::instrument(skip(service))]
async fn details(
    State(service): State<Arc<Service>>,
    Path(match_id): Path<String>,
) -> Result<axum::Json<MatchStatistics>, ApiError> {
    let stored = service.get_match(&match_id).await?;

    Ok(axum::Json(stored.statistics.clone()))
}

#[tracing::instrument(skip(service))]
async fn status(
    State(service): State<Arc<Service>>,
    Path(match_id): Path<String>,
) -> Result<axum::Json<common::JobStatusBody>, ApiError> {
    service.status(&match_id).await.map(axum::Json)
}

#[tracing::instrument(skip(service))]
async fn heatmaps(
    State(service): State<Arc<Service>>,
    Path(match_id): Path<String>,
) -> Result<axum::Json<Vec<PlayerHeatmap>>, ApiError> {
    let stored = service.get_match(&match_id).await?;

    Ok(axum::Json(stored.heatmaps.clone()))
}
