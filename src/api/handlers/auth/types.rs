//! Request/response types for the auth endpoints.
//!
//! Field names follow the frontend's camelCase contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRow;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    /// One of `signup`, `login`, or `forgot`.
    pub context: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub email: String,
    pub context: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WalletChallengeRequest {
    pub address: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct WalletVerifyRequest {
    pub address: String,
    pub signature: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Public shape of a user, safe to return to clients.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub provider: String,
    pub avatar_url: String,
    pub wallet_address: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRow> for PublicUser {
    fn from(user: &UserRow) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            provider: user.provider.clone(),
            avatar_url: user.avatar_url.clone(),
            wallet_address: user.wallet_address.clone(),
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}

/// Token plus user, returned on every successful credential exchange.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: PublicUser,
}

/// Login accepted; the OTP second factor is still outstanding.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginAccepted {
    pub message: String,
    pub user: LoginUserSummary,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginUserSummary {
    pub id: Uuid,
    pub email: String,
}

/// Forgot-password verification: reset authorized, no token yet.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetAllowedResponse {
    pub message: String,
    pub reset_allowed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_request_uses_camel_case() {
        let decoded: RegisterRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Jane",
            "lastName": "Doe",
            "email": "jane@x.com",
            "password": "secret123",
        }))
        .expect("decode");
        assert_eq!(decoded.first_name, "Jane");
        assert_eq!(decoded.last_name, "Doe");
    }

    #[test]
    fn reset_allowed_response_round_trips() {
        let value = serde_json::to_value(ResetAllowedResponse {
            message: "OTP verified successfully".to_string(),
            reset_allowed: true,
        })
        .expect("encode");
        assert_eq!(value["resetAllowed"], serde_json::json!(true));
    }

    #[test]
    fn public_user_serializes_wallet_address_camel_case() {
        let user = PublicUser {
            id: Uuid::new_v4(),
            first_name: String::new(),
            last_name: String::new(),
            email: None,
            provider: "web3".to_string(),
            avatar_url: String::new(),
            wallet_address: Some("0xabc".to_string()),
            is_verified: true,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&user).expect("encode");
        assert_eq!(value["walletAddress"], serde_json::json!("0xabc"));
        assert_eq!(value["isVerified"], serde_json::json!(true));
    }
}
