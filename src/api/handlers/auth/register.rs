//! Registration and OTP verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::sessions::tracker;
use super::otp::{OneTimeCode, OtpPurpose};
use super::password::hash_password;
use super::state::AuthState;
use super::storage::{self, OtpStoreOutcome};
use super::types::{
    AuthResponse, MessageResponse, PublicUser, RegisterRequest, ResendOtpRequest,
    ResetAllowedResponse, VerifyOtpRequest,
};
use super::utils::{normalize_email, valid_email};
use crate::api::email::{send_detached, EmailMessage};
use crate::api::handlers::message_response as message;

/// Start a signup: store the pending registration and send the OTP. The
/// 200 is committed regardless of whether the email later goes out.
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "OTP generated", body = MessageResponse),
        (status = 400, description = "Missing fields or email already registered", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "All fields are required");
    };

    let first_name = request.first_name.trim();
    let last_name = request.last_name.trim();
    let email = normalize_email(&request.email);
    if first_name.is_empty() || last_name.is_empty() || email.is_empty() || request.password.is_empty()
    {
        return message(StatusCode::BAD_REQUEST, "All fields are required");
    }
    if !valid_email(&email) {
        return message(StatusCode::BAD_REQUEST, "A valid email is required");
    }

    match storage::email_taken(&pool, &email).await {
        Ok(true) => {
            return message(
                StatusCode::BAD_REQUEST,
                "An account with this email already exists",
            )
        }
        Ok(false) => {}
        Err(err) => {
            error!("Failed to check existing account: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    }

    let password_hash = match hash_password(&request.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    let code = OneTimeCode::issue(auth_state.config().otp_ttl_seconds());
    if let Err(err) =
        storage::replace_pending_signup(&pool, &email, first_name, last_name, &password_hash, &code)
            .await
    {
        error!("Failed to store pending signup: {err:#}");
        return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
    }

    send_detached(
        auth_state.email(),
        EmailMessage::new(email.as_str(), format!("Your OTP code is {}", code.code)),
    );

    message(StatusCode::OK, "OTP generated. Please check your email.")
}

/// Verify an OTP for signup, login, or password reset.
#[utoipa::path(
    post,
    path = "/api/auth/verify-otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Login or reset verification succeeded", body = AuthResponse),
        (status = 201, description = "Signup verified; account created", body = AuthResponse),
        (status = 400, description = "Invalid or expired OTP", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "Email, OTP, and context are required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.otp.is_empty() || request.context.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Email, OTP, and context are required");
    }

    let Some(purpose) = OtpPurpose::parse(&request.context) else {
        return message(
            StatusCode::BAD_REQUEST,
            "Invalid context. Must be 'signup', 'login', or 'forgot'",
        );
    };

    let (status, user) = match purpose {
        OtpPurpose::Signup => {
            match storage::promote_pending_signup(&pool, &email, &request.otp).await {
                Ok(Some(user)) => (StatusCode::CREATED, user),
                Ok(None) => return message(StatusCode::BAD_REQUEST, "Invalid or expired OTP"),
                Err(err) => {
                    error!("Failed to promote pending signup: {err:#}");
                    return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
                }
            }
        }
        OtpPurpose::Login => match storage::redeem_login_otp(&pool, &email, &request.otp).await {
            Ok(Some(user)) => (StatusCode::OK, user),
            Ok(None) => return message(StatusCode::BAD_REQUEST, "Invalid or expired OTP"),
            Err(err) => {
                error!("Failed to redeem login OTP: {err:#}");
                return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
            }
        },
        OtpPurpose::Forgot => {
            // The reset code is only consumed once the new password arrives.
            return match storage::reset_token_valid(&pool, &email, &request.otp).await {
                Ok(true) => (
                    StatusCode::OK,
                    Json(ResetAllowedResponse {
                        message: "OTP verified successfully".to_string(),
                        reset_allowed: true,
                    }),
                )
                    .into_response(),
                Ok(false) => message(StatusCode::BAD_REQUEST, "Invalid or expired OTP"),
                Err(err) => {
                    error!("Failed to check reset token: {err:#}");
                    message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
                }
            };
        }
    };

    let token = match auth_state.tokens().mint(user.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint token: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    tracker::record_login(&pool, &auth_state, &user, "email", &headers).await;

    (
        status,
        Json(AuthResponse {
            message: format!("OTP verified successfully for {}", purpose.as_str()),
            token,
            user: PublicUser::from(&user),
        }),
    )
        .into_response()
}

/// Re-send an OTP, subject to the per-purpose cool-down.
#[utoipa::path(
    post,
    path = "/api/auth/resend-otp",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "OTP resent", body = MessageResponse),
        (status = 404, description = "Unknown subject", body = MessageResponse),
        (status = 429, description = "Cool-down active", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendOtpRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "Email and context are required");
    };
    let email = normalize_email(&request.email);
    if email.is_empty() || request.context.is_empty() {
        return message(StatusCode::BAD_REQUEST, "Email and context are required");
    }

    let Some(purpose) = OtpPurpose::parse(&request.context) else {
        return message(
            StatusCode::BAD_REQUEST,
            "Invalid context. Must be 'signup', 'login', or 'forgot'",
        );
    };

    let ttl = auth_state.config().otp_ttl_seconds();
    let cooldown = auth_state.config().resend_cooldown_seconds();
    let code = OneTimeCode::issue(ttl);

    let (outcome, confirmation, body) = match purpose {
        OtpPurpose::Signup => (
            storage::store_pending_otp(&pool, &email, &code, cooldown).await,
            "OTP resent for signup",
            format!("Your signup OTP code is {}", code.code),
        ),
        OtpPurpose::Login => (
            storage::store_login_otp(&pool, &email, &code, cooldown).await,
            "OTP resent for login",
            format!("Your login OTP code is {}", code.code),
        ),
        OtpPurpose::Forgot => (
            storage::store_reset_token(&pool, &email, &code, cooldown).await,
            "OTP resent for password reset",
            format!("Your password reset OTP is {}", code.code),
        ),
    };

    match outcome {
        Ok(OtpStoreOutcome::Stored) => {
            send_detached(auth_state.email(), EmailMessage::new(email.as_str(), body));
            message(StatusCode::OK, confirmation)
        }
        Ok(OtpStoreOutcome::CoolingDown { wait_seconds }) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(MessageResponse {
                message: format!(
                    "Please wait {wait_seconds} seconds before requesting another OTP."
                ),
            }),
        )
            .into_response(),
        Ok(OtpStoreOutcome::NotFound) => {
            let not_found = match purpose {
                OtpPurpose::Signup => "Pending signup not found for this email",
                _ => "User not found",
            };
            message(StatusCode::NOT_FOUND, not_found)
        }
        Err(err) => {
            error!("Failed to resend OTP: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
