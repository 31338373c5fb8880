//! Cohort REST API Server
//!
//! HTTP/JSON surface over the membership engine: segment catalog, users, their
//! segment assignments and monthly history exports.
//!
//! ## Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/segments` | List segments |
//! | POST | `/segments` | Create a segment (optionally auto-enrolling users) |
//! | DELETE | `/segments` | Delete a segment |
//! | POST | `/users` | Create a user |
//! | PATCH | `/users` | Add segments to a user |
//! | DELETE | `/users` | Remove segments from a user |
//! | GET | `/users/:id` | A user's active segments |
//! | GET | `/users/:id/history` | CSV of closed memberships in a month |
//! | GET | `/health` | Liveness |
//! | GET | `/api-docs/openapi.json` | OpenAPI document |

use axum::{
    routing::{get, post},
    Router,
};
use cohort_membership::MembershipStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

pub mod config;
pub mod error;
pub mod export;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod shutdown;

pub use config::Config;
pub use error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MembershipStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self { store }
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Segments
        .route(
            "/segments",
            get(handlers::segments::list_segments)
                .post(handlers::segments::create_segment)
                .delete(handlers::segments::delete_segment),
        )
        // Users
        .route(
            "/users",
            post(handlers::users::create_user)
                .patch(handlers::users::add_segments)
                .delete(handlers::users::remove_segments),
        )
        .route("/users/:id", get(handlers::users::get_user))
        .route("/users/:id/history", get(handlers::users::get_user_history))
        // Service
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(handlers::health::openapi_json))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::segments::list_segments,
        handlers::segments::create_segment,
        handlers::segments::delete_segment,
        handlers::users::create_user,
        handlers::users::add_segments,
        handlers::users::remove_segments,
        handlers::users::get_user,
        handlers::users::get_user_history,
        handlers::health::health_check,
    ),
    components(schemas(
        models::SegmentRequest,
        models::Segment,
        models::UserRequest,
        models::MembershipRequest,
        models::User,
        models::MessageResponse,
        models::HealthResponse,
    )),
    tags(
        (name = "segments", description = "Segment catalog"),
        (name = "users", description = "Users and their segment memberships"),
        (name = "health", description = "Service health"),
    ),
    info(
        title = "Cohort API",
        version = "0.1.0",
        description = "Dynamic user segmentation service"
    )
)]
pub struct ApiDoc;
