//! Segment catalog endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use chrono::DateTime;
use cohort_membership::NewSegment;

use crate::{error::ApiError, models::*, AppState};

#[utoipa::path(
    get,
    path = "/segments",
    responses(
        (status = 200, description = "All segments, ordered by name", body = Vec<Segment>)
    ),
    tag = "segments"
)]
pub async fn list_segments(State(state): State<AppState>) -> Result<Json<Vec<Segment>>, ApiError> {
    let segments = state.store.list_segments().await?;

    let response = segments
        .into_iter()
        .map(|s| Segment {
            segment: s.name,
            auto_percent: s.auto_percent,
            created_at: DateTime::from_timestamp(s.created_at, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default(),
        })
        .collect();

    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/segments",
    request_body = SegmentRequest,
    responses(
        (status = 201, description = "Segment created", body = SegmentRequest),
        (status = 400, description = "Invalid name or percentage, or segment exists", body = MessageResponse)
    ),
    tag = "segments"
)]
pub async fn create_segment(
    State(state): State<AppState>,
    body: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SegmentRequest>), ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("can't unmarshal json"))?;

    state
        .store
        .create_segment(NewSegment::with_auto_percent(
            req.segment.clone(),
            req.auto_percent.unwrap_or(0),
        ))
        .await?;

    tracing::info!(segment = %req.segment, auto_percent = ?req.auto_percent, "Segment created");

    Ok((StatusCode::CREATED, Json(req)))
}

#[utoipa::path(
    delete,
    path = "/segments",
    request_body = SegmentRequest,
    responses(
        (status = 200, description = "Segment deleted", body = SegmentRequest),
        (status = 404, description = "Segment not found", body = MessageResponse)
    ),
    tag = "segments"
)]
pub async fn delete_segment(
    State(state): State<AppState>,
    body: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<SegmentRequest>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("can't unmarshal json"))?;

    state.store.delete_segment(&req.segment).await?;

    tracing::info!(segment = %req.segment, "Segment deleted");

    Ok(Json(req))
}
