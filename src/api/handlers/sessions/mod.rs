//! Session management endpoints: the control-plane view of "who is
//! logged in where", independent of the stateless bearer token.

pub mod device;
pub(crate) mod storage;
pub mod tracker;
pub mod types;

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use self::storage::SessionRow;
use self::types::{
    DeviceView, LocationView, SessionListResponse, SessionStats, SessionStatsResponse,
    SessionView, TerminateOthersRequest, TerminateOthersResponse,
};
use super::auth::principal::require_auth;
use super::auth::AuthState;
use super::message_response as message;

fn session_view(row: SessionRow) -> SessionView {
    SessionView {
        id: row.id,
        login_method: row.login_method,
        ip_address: row.ip_address,
        device: DeviceView {
            kind: row.device.kind,
            browser: row.device.browser,
            os: row.device.os,
            name: row.device.name,
        },
        location: LocationView {
            country: row.location.country,
            city: row.location.city,
            region: row.location.region,
        },
        is_new_device: row.is_new_device,
        login_at: row.login_at,
        last_activity_at: row.last_activity_at,
        expires_at: row.expires_at,
    }
}

/// List the caller's active sessions, most recently active first.
#[utoipa::path(
    get,
    path = "/api/sessions",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Active sessions", body = SessionListResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };

    match storage::list_active(&pool, user.id).await {
        Ok(rows) => (
            StatusCode::OK,
            Json(SessionListResponse {
                success: true,
                sessions: rows.into_iter().map(session_view).collect(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to list sessions: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Error fetching sessions")
        }
    }
}

/// Terminate one of the caller's sessions.
#[utoipa::path(
    delete,
    path = "/api/sessions/{session_id}",
    params(("session_id" = Uuid, Path, description = "Session to terminate")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session terminated"),
        (status = 404, description = "No such active session for this user")
    ),
    tag = "sessions"
)]
pub async fn terminate_session(
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };

    match storage::terminate(&pool, session_id, user.id).await {
        Ok(true) => message(StatusCode::OK, "Session terminated successfully"),
        Ok(false) => message(StatusCode::NOT_FOUND, "Session not found"),
        Err(err) => {
            error!("Failed to terminate session: {err:#}");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error terminating session",
            )
        }
    }
}

/// Terminate all of the caller's active sessions except a designated
/// survivor.
#[utoipa::path(
    post,
    path = "/api/sessions/terminate-others",
    request_body = TerminateOthersRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Other sessions terminated", body = TerminateOthersResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "sessions"
)]
pub async fn terminate_other_sessions(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TerminateOthersRequest>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };
    let except = payload.and_then(|Json(request)| request.current_session_id);

    match storage::terminate_others(&pool, user.id, except).await {
        Ok(terminated_count) => (
            StatusCode::OK,
            Json(TerminateOthersResponse {
                success: true,
                message: format!("{terminated_count} sessions terminated"),
                terminated_count,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to terminate sessions: {err:#}");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error terminating sessions",
            )
        }
    }
}

/// Aggregate session statistics for the caller.
#[utoipa::path(
    get,
    path = "/api/sessions/stats",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Session statistics", body = SessionStatsResponse),
        (status = 401, description = "Not authenticated")
    ),
    tag = "sessions"
)]
pub async fn session_stats(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };

    match storage::stats(&pool, user.id).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(SessionStatsResponse {
                success: true,
                stats: SessionStats {
                    total_sessions: stats.total,
                    active_sessions: stats.active,
                    recent_sessions: stats.recent,
                    unique_devices: stats.device_types.len(),
                    unique_locations: stats.countries.len(),
                    device_types: stats.device_types,
                    countries: stats.countries,
                },
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to aggregate session stats: {err:#}");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error fetching session statistics",
            )
        }
    }
}

/// Activity ping: stamp `last_activity_at` on an owned session.
#[utoipa::path(
    post,
    path = "/api/sessions/{session_id}/activity",
    params(("session_id" = Uuid, Path, description = "Session to stamp")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Activity recorded"),
        (status = 404, description = "No such active session for this user")
    ),
    tag = "sessions"
)]
pub async fn session_activity(
    headers: HeaderMap,
    Path(session_id): Path<Uuid>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };

    match storage::touch_activity(&pool, session_id, user.id).await {
        Ok(true) => message(StatusCode::OK, "Session activity updated"),
        Ok(false) => message(StatusCode::NOT_FOUND, "Session not found"),
        Err(err) => {
            error!("Failed to update session activity: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Error updating session")
        }
    }
}
