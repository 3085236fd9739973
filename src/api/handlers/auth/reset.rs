//! Password reset: request a code, then swap the password for it.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::otp::OneTimeCode;
use super::password::hash_password;
use super::state::AuthState;
use super::storage::{self, OtpStoreOutcome};
use super::types::{MessageResponse, PasswordResetRequest, ResetPasswordRequest};
use super::utils::normalize_email;
use crate::api::email::{send_detached, EmailMessage};
use crate::api::handlers::message_response as message;

#[utoipa::path(
    post,
    path = "/api/auth/request-password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset OTP sent", body = MessageResponse),
        (status = 404, description = "Unknown email", body = MessageResponse),
        (status = 429, description = "Cool-down active", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn request_password_reset(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "Email required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Email required");
    }

    let code = OneTimeCode::issue(auth_state.config().otp_ttl_seconds());
    match storage::store_reset_token(
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
                EmailMessage::new(email.as_str(), format!("Your password reset OTP is {}", code.code)),
            );
            message(StatusCode::OK, "Password reset OTP sent to your email")
        }
        Ok(OtpStoreOutcome::CoolingDown { wait_seconds }) => message(
            StatusCode::TOO_MANY_REQUESTS,
            &format!("Please wait {wait_seconds} seconds before requesting another OTP."),
        ),
        Ok(OtpStoreOutcome::NotFound) => message(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to store reset token: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    pool: Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "All fields are required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.otp.is_empty() || request.new_password.is_empty() {
        return message(StatusCode::BAD_REQUEST, "All fields are required");
    }

    let password_hash = match hash_password(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    // One conditional write: code check, password swap, and code clear.
    match storage::redeem_reset_token(&pool, &email, &request.otp, &password_hash).await {
        Ok(true) => message(StatusCode::OK, "Password has been reset successfully"),
        Ok(false) => message(StatusCode::BAD_REQUEST, "Invalid or expired OTP"),
        Err(err) => {
            error!("Failed to reset password: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
