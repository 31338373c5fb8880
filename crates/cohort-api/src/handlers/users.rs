//! User and membership endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use cohort_membership::{validate, HistoryQuery, MembershipChange};

use crate::{error::ApiError, export, models::*, AppState};

fn parse_user_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::bad_request("invalid user id")),
    }
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = UserRequest,
    responses(
        (status = 201, description = "User created", body = UserRequest),
        (status = 400, description = "Invalid or duplicate id", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<UserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserRequest>), ApiError> {
    let Json(req) = body.map_err(|_| ApiError::bad_request("can't unmarshal json"))?;

    state.store.create_user(req.id).await?;

    tracing::info!(user_id = req.id, "User created");

    Ok((StatusCode::CREATED, Json(req)))
}

#[utoipa::path(
    patch,
    path = "/users",
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Segments added; echoes the de-duplicated list", body = MembershipRequest),
        (status = 400, description = "Invalid id or segment name", body = MessageResponse),
        (status = 404, description = "Unknown user or segment", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn add_segments(
    State(state): State<AppState>,
    body: Result<Json<MembershipRequest>, JsonRejection>,
) -> Result<Json<MembershipRequest>, ApiError> {
    let Json(mut req) = body.map_err(|_| ApiError::bad_request("can't unmarshal json"))?;
    req.segments = validate::segment_names(&req.segments)?;

    let change = MembershipChange::new(req.id, req.segments.clone())
        .with_ttl(req.active_time.unwrap_or(0));
    state.store.add_segments_to_user(change).await?;

    Ok(Json(req))
}

#[utoipa::path(
    delete,
    path = "/users",
    request_body = MembershipRequest,
    responses(
        (status = 200, description = "Segments removed; echoes the de-duplicated list", body = MembershipRequest),
        (status = 400, description = "Invalid id or segment name", body = MessageResponse),
        (status = 404, description = "Unknown user or segment", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn remove_segments(
    State(state): State<AppState>,
    body: Result<Json<MembershipRequest>, JsonRejection>,
) -> Result<Json<MembershipRequest>, ApiError> {
    let Json(mut req) = body.map_err(|_| ApiError::bad_request("can't unmarshal json"))?;
    req.segments = validate::segment_names(&req.segments)?;

    state
        .store
        .delete_segments_from_user(MembershipChange::new(req.id, req.segments.clone()))
        .await?;

    Ok(Json(req))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "User and active segments", body = User),
        (status = 400, description = "Invalid user id", body = MessageResponse),
        (status = 404, description = "User not found", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id = parse_user_id(&id)?;

    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user doesn't exist".to_string()))?;

    Ok(Json(User {
        id: user.id,
        segments: user.segments,
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}/history",
    params(
        ("id" = i64, Path, description = "User id"),
        ("year" = i32, Query, description = "Calendar year"),
        ("month" = u32, Query, description = "Calendar month, 1-12")
    ),
    responses(
        (status = 200, description = "Closed membership intervals as a CSV attachment", body = String, content_type = "text/csv"),
        (status = 400, description = "Invalid id, year or month", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn get_user_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_user_id(&id)?;

    let year = params
        .year
        .as_deref()
        .and_then(|y| y.parse::<i32>().ok())
        .ok_or_else(|| ApiError::bad_request("invalid year"))?;

    let month = params
        .month
        .as_deref()
        .and_then(|m| m.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| ApiError::bad_request("invalid month"))?;

    let history = state
        .store
        .get_user_history(HistoryQuery {
            user_id,
            year,
            month,
        })
        .await?;

    tracing::debug!(user_id, year, month, rows = history.len(), "History exported");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=test.csv"),
        ],
        export::history_csv(&history),
    ))
}
