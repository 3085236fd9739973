//! Password login: first factor of the email credential path.
//!
//! A successful password check never yields a token directly; it issues
//! the login OTP and the token comes from `verify-otp`. The invalid-
//! credentials message deliberately does not reveal whether the account
//! exists.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::otp::OneTimeCode;
use super::password::verify_password;
use super::state::AuthState;
use super::storage::{self, OtpStoreOutcome};
use super::types::{LoginAccepted, LoginRequest, LoginUserSummary, MessageResponse};
use super::utils::normalize_email;
use crate::api::email::{send_detached, EmailMessage};
use crate::api::handlers::message_response as message;

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted; OTP sent", body = LoginAccepted),
        (status = 400, description = "Invalid credentials or non-password account", body = MessageResponse),
        (status = 429, description = "OTP issued too recently", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "Email and password required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.password.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Email and password required");
    }

    let user = match storage::lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => return message(StatusCode::BAD_REQUEST, "Invalid credentials"),
        Err(err) => {
            error!("Failed to lookup user for login: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    let Some(password_hash) = user.password_hash.as_deref() else {
        return message(StatusCode::BAD_REQUEST, "Invalid credentials");
    };
    if user.provider != "email" {
        return message(
            StatusCode::BAD_REQUEST,
            &format!(
                "This account was created with {}. Please use that method to log in.",
                user.provider
            ),
        );
    }
    if !verify_password(&request.password, password_hash) {
        return message(StatusCode::BAD_REQUEST, "Invalid credentials");
    }

    let code = OneTimeCode::issue(auth_state.config().otp_ttl_seconds());
    match storage::store_login_otp(
        &pool,
        &email,
        &code,
        auth_state.config().resend_cooldown_seconds(),
    )
    .await
    {
        Ok(OtpStoreOutcome::Stored) => {
            send_detached(
                auth_state.email(),
                EmailMessage::new(email.as_str(), format!("Your login OTP code is {}", code.code)),
            );
            (
                StatusCode::OK,
                Json(LoginAccepted {
                    message: "OTP sent to your email".to_string(),
                    user: LoginUserSummary {
                        id: user.id,
                        email,
                    },
                }),
            )
                .into_response()
        }
        Ok(OtpStoreOutcome::CoolingDown { .. }) => message(
            StatusCode::TOO_MANY_REQUESTS,
            "Please wait before requesting another OTP",
        ),
        // The account vanished between the checks; keep the error uniform.
        Ok(OtpStoreOutcome::NotFound) => message(StatusCode::BAD_REQUEST, "Invalid credentials"),
        Err(err) => {
            error!("Failed to store login OTP: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
