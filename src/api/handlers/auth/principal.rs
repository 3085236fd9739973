//! Bearer-token resolution for protected endpoints.

use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::error;

use super::state::AuthState;
use super::storage::{self, UserRow};

/// Resolve the `Authorization: Bearer` header to a full user row.
///
/// # Errors
/// Returns 401 with a stable message for missing/invalid tokens and
/// unknown users; 500 when the lookup itself fails.
pub(crate) async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    auth_state: &AuthState,
) -> Result<UserRow, (StatusCode, String)> {
    let Some(token) = bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            "Not authorized, no token".to_string(),
        ));
    };

    let user_id = auth_state.tokens().validate(token).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            "Not authorized, token failed".to_string(),
        )
    })?;

    match storage::lookup_user_by_id(pool, user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::UNAUTHORIZED,
            "Not authorized, user not found".to_string(),
        )),
        Err(err) => {
            error!("Failed to load authenticated user: {err:#}");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error".to_string(),
            ))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_strips_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }

    #[test]
    fn bearer_token_rejects_other_schemes_and_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);

        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
