//! API handlers and shared helpers.

pub mod auth;
pub mod health;
pub mod me;
pub mod sessions;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};

use self::auth::types::MessageResponse;

/// Liveness probe for load balancers and uptime checks.
pub async fn root() -> &'static str {
    "API is running"
}

/// Stable `{"message": ...}` error/confirmation payload used across the
/// handlers.
pub(crate) fn message_response(status: StatusCode, text: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: text.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn root_reports_liveness() {
        assert_eq!(root().await, "API is running");
    }
}
