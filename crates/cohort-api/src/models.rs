//! API models for REST endpoints

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /segments` and `DELETE /segments`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SegmentRequest {
    pub segment: String,
    /// Share of existing users to enroll on creation (0..=100)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_percent: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Segment {
    pub segment: String,
    pub auto_percent: i32,
    pub created_at: String,
}

/// Body of `POST /users`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRequest {
    pub id: i64,
}

/// Body of `PATCH /users` and `DELETE /users`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembershipRequest {
    pub id: i64,
    #[serde(default)]
    pub segments: Vec<String>,
    /// Seconds until the added memberships expire; absent or <= 0 means never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_time: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: i64,
    pub segments: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub year: Option<String>,
    pub month: Option<String>,
}

/// Error body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}
