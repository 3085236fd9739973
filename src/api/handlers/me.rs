//! Authenticated self-service endpoints: profile reads, name edits, and
//! the email-change verification flow.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::auth::otp::OneTimeCode;
use super::auth::principal::require_auth;
use super::auth::storage::{self, EmailChangeOutcome, OtpStoreOutcome};
use super::auth::types::{MessageResponse, PublicUser};
use super::auth::utils::{normalize_email, valid_email};
use super::auth::AuthState;
use super::message_response as message;
use crate::api::email::{send_detached, EmailMessage};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmailChangePendingResponse {
    pub message: String,
    pub email_verification_required: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyEmailUpdateRequest {
    pub otp: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifiedEmailResponse {
    pub message: String,
    pub user: PublicUser,
}

/// Return the caller's profile.
#[utoipa::path(
    get,
    path = "/api/users/me",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Authenticated user profile", body = PublicUser),
        (status = 401, description = "Not authenticated", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => (StatusCode::OK, Json(PublicUser::from(&user))).into_response(),
        Err((status, text)) => message(status, &text),
    }
}

/// Update profile names; an email change is staged behind an OTP sent to
/// the new address. Fields managed by a social provider stay read-only.
#[utoipa::path(
    put,
    path = "/api/users/me",
    request_body = UpdateProfileRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Profile updated, or email verification pending", body = PublicUser),
        (status = 400, description = "Email already in use", body = MessageResponse),
        (status = 403, description = "Field managed by the social provider", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn update_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };
    let Some(Json(request)) = payload else {
        return message(StatusCode::BAD_REQUEST, "Nothing to update");
    };

    let wants_name_change = request.first_name.is_some() || request.last_name.is_some();
    let is_social_provider = user.provider != "email" && user.provider != "web3";
    if is_social_provider && !user.first_name.is_empty() && wants_name_change {
        return message(
            StatusCode::FORBIDDEN,
            &format!(
                "Your name is managed by {} and cannot be updated here.",
                user.provider
            ),
        );
    }

    let new_email = request
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|email| Some(email.as_str()) != user.email.as_deref());

    if let Some(candidate) = new_email.as_deref() {
        if is_social_provider && user.email.is_some() {
            return message(
                StatusCode::FORBIDDEN,
                &format!(
                    "Your email is managed by {} and cannot be updated here.",
                    user.provider
                ),
            );
        }
        if !valid_email(candidate) {
            return message(StatusCode::BAD_REQUEST, "A valid email is required");
        }
        match storage::email_taken(&pool, candidate).await {
            Ok(true) => {
                return message(
                    StatusCode::BAD_REQUEST,
                    "This email is already in use by another account.",
                )
            }
            Ok(false) => {}
            Err(err) => {
                error!("Failed to check email availability: {err:#}");
                return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
            }
        }
    }

    let updated = match storage::update_profile_names(
        &pool,
        user.id,
        request
            .first_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty()),
        request
            .last_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty()),
    )
    .await
    {
        Ok(Some(updated)) => updated,
        Ok(None) => return message(StatusCode::NOT_FOUND, "User not found"),
        Err(err) => {
            error!("Failed to update profile: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
    };

    if let Some(candidate) = new_email {
        let code = OneTimeCode::issue(auth_state.config().otp_ttl_seconds());
        if let Err(err) = storage::store_email_change(&pool, user.id, &candidate, &code).await {
            error!("Failed to store email change: {err:#}");
            return message(StatusCode::INTERNAL_SERVER_ERROR, "Server error");
        }
        send_detached(
            auth_state.email(),
            EmailMessage::new(
                candidate.as_str(),
                format!("Your email verification OTP is: {}", code.code),
            )
            .with_subject("Verify Your New Email Address"),
        );
        return (
            StatusCode::OK,
            Json(EmailChangePendingResponse {
                message: "Profile details saved. A verification OTP has been sent to your new email address."
                    .to_string(),
                email_verification_required: true,
            }),
        )
            .into_response();
    }

    (StatusCode::OK, Json(PublicUser::from(&updated))).into_response()
}

/// Commit a pending email change by verifying its OTP.
#[utoipa::path(
    post,
    path = "/api/users/me/verify-email",
    request_body = VerifyEmailUpdateRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Email updated", body = VerifiedEmailResponse),
        (status = 400, description = "Invalid or expired OTP", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn verify_email_update(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailUpdateRequest>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };
    let otp = match payload {
        Some(Json(request)) if !request.otp.is_empty() => request.otp,
        _ => return message(StatusCode::BAD_REQUEST, "OTP is required."),
    };

    match storage::redeem_email_change(&pool, user.id, &otp).await {
        Ok(EmailChangeOutcome::Updated(updated)) => (
            StatusCode::OK,
            Json(VerifiedEmailResponse {
                message: "Email updated successfully.".to_string(),
                user: PublicUser::from(updated.as_ref()),
            }),
        )
            .into_response(),
        Ok(EmailChangeOutcome::Invalid) => {
            message(StatusCode::BAD_REQUEST, "Invalid or expired OTP.")
        }
        Ok(EmailChangeOutcome::EmailTaken) => message(
            StatusCode::BAD_REQUEST,
            "This email is already in use by another account.",
        ),
        Err(err) => {
            error!("Failed to verify email update: {err:#}");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during email verification.",
            )
        }
    }
}

/// Re-send the email-change OTP to the pending address.
#[utoipa::path(
    post,
    path = "/api/users/me/resend-verify-email",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "OTP resent", body = MessageResponse),
        (status = 400, description = "No pending email change", body = MessageResponse),
        (status = 429, description = "Cool-down active", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn resend_email_update_otp(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };
    let Some(pending_email) = user.email_change_pending_email.clone() else {
        return message(StatusCode::BAD_REQUEST, "No pending email change to verify.");
    };

    let code = OneTimeCode::issue(auth_state.config().otp_ttl_seconds());
    match storage::resend_email_change_otp(
        &pool,
        user.id,
        &code,
        auth_state.config().resend_cooldown_seconds(),
    )
    .await
    {
        Ok(OtpStoreOutcome::Stored) => {
            send_detached(
                auth_state.email(),
                EmailMessage::new(
                    pending_email.as_str(),
                    format!("Your new email verification OTP is: {}", code.code),
                )
                .with_subject("Verify Your New Email Address"),
            );
            message(
                StatusCode::OK,
                "A new OTP has been sent to the pending email address.",
            )
        }
        Ok(OtpStoreOutcome::CoolingDown { wait_seconds }) => message(
            StatusCode::TOO_MANY_REQUESTS,
            &format!("Please wait {wait_seconds} seconds before requesting another OTP."),
        ),
        Ok(OtpStoreOutcome::NotFound) => {
            message(StatusCode::BAD_REQUEST, "No pending email change to verify.")
        }
        Err(err) => {
            error!("Failed to resend email-change OTP: {err:#}");
            message(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
