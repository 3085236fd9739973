//! Wallet authentication: prove control of an address by signing a
//! one-time challenge, without ever transmitting a key.
//!
//! Two challenge stores back two flows: authenticating as a wallet user
//! and linking a wallet to an existing account. They differ only in
//! message text and expiry window.

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use ethers::types::Signature;
use ethers::utils::{hash_message, hex};
use rand::{rngs::OsRng, RngCore};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::super::sessions::tracker;
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::{self, LinkWalletOutcome};
use super::types::{
    AuthResponse, ChallengeResponse, MessageResponse, PublicUser, WalletChallengeRequest,
    WalletVerifyRequest,
};
use super::utils::valid_wallet_address;
use crate::api::handlers::message_response as message;

/// Build the authentication challenge for a fresh nonce.
pub(super) fn build_auth_challenge(nonce: &str) -> String {
    format!(
        "Welcome to Credexa!\n\nPlease sign this message to authenticate your wallet. \
         This is a free action and will not trigger a blockchain transaction.\n\nNonce: {nonce}"
    )
}

/// Build the wallet-linking challenge for a fresh nonce.
pub(super) fn build_link_challenge(nonce: &str) -> String {
    format!("Please sign this message to link this wallet to your Credexa account.\n\nNonce: {nonce}")
}

/// 32 random bytes, hex encoded.
pub(super) fn generate_nonce() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate challenge nonce")?;
    Ok(hex::encode(bytes))
}

/// Recover the lowercase signer address from an EIP-191 personal-sign
/// signature over `message`.
pub(super) fn recover_signer(message: &str, signature: &str) -> Result<String> {
    let signature: Signature = signature
        .parse()
        .map_err(|_| anyhow!("malformed signature"))?;
    let address = signature
        .recover(hash_message(message))
        .map_err(|_| anyhow!("signature does not recover to an address"))?;
    Ok(format!("{address:#x}"))
}

/// Issue an authentication challenge for a wallet address.
#[utoipa::path(
    post,
    path = "/api/auth/web3/challenge",
    request_body = WalletChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Malformed wallet address", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn web3_challenge(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletChallengeRequest>>,
) -> impl IntoResponse {
    let address = match payload {
        Some(Json(request)) => request.address,
        None => return message(StatusCode::BAD_REQUEST, "A valid wallet address is required."),
    };
    if !valid_wallet_address(&address) {
        return message(StatusCode::BAD_REQUEST, "A valid wallet address is required.");
    }

    let nonce = match generate_nonce() {
        Ok(nonce) => nonce,
        Err(err) => {
            error!("Failed to generate challenge: {err:#}");
            return message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during challenge generation.",
            );
        }
    };
    let challenge = build_auth_challenge(&nonce);
    auth_state
        .auth_challenges()
        .set(&address.to_lowercase(), challenge.clone())
        .await;

    (StatusCode::OK, Json(ChallengeResponse { message: challenge })).into_response()
}

/// Verify a signed authentication challenge and log the wallet in,
/// creating the account on first sight of the address.
#[utoipa::path(
    post,
    path = "/api/auth/web3/verify",
    request_body = WalletVerifyRequest,
    responses(
        (status = 200, description = "Authentication successful", body = AuthResponse),
        (status = 400, description = "No live challenge for this address", body = MessageResponse),
        (status = 401, description = "Signature does not match the address", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn web3_verify(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletVerifyRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return message(
            StatusCode::BAD_REQUEST,
            "Wallet address and signature are required.",
        );
    };
    if request.address.is_empty() || request.signature.is_empty() {
        return message(
            StatusCode::BAD_REQUEST,
            "Wallet address and signature are required.",
        );
    }

    let address = request.address.to_lowercase();
    // One-time use: the challenge is consumed before the signature check,
    // so a replay of the same signature finds nothing.
    let Some(challenge) = auth_state.auth_challenges().take(&address).await else {
        return message(
            StatusCode::BAD_REQUEST,
            "Challenge not found or expired. Please try connecting again.",
        );
    };

    match recover_signer(&challenge, &request.signature) {
        Ok(recovered) if recovered.eq_ignore_ascii_case(&address) => {}
        Ok(_) | Err(_) => {
            return message(
                StatusCode::UNAUTHORIZED,
                "Signature verification failed. The signature does not match the provided address.",
            );
        }
    }

    let user = match storage::find_or_create_wallet_user(&pool, &address).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to resolve wallet user: {err:#}");
            return message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during signature verification.",
            );
        }
    };

    let token = match auth_state.tokens().mint(user.id) {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to mint token: {err:#}");
            return message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during signature verification.",
            );
        }
    };

    tracker::record_login(&pool, &auth_state, &user, "web3", &headers).await;

    (
        StatusCode::OK,
        Json(AuthResponse {
            message: "Authentication successful".to_string(),
            token,
            user: PublicUser::from(&user),
        }),
    )
        .into_response()
}

/// Issue a wallet-linking challenge for the authenticated caller.
#[utoipa::path(
    post,
    path = "/api/users/me/generate-link-challenge",
    request_body = WalletChallengeRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 400, description = "Malformed wallet address", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn generate_link_challenge(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletChallengeRequest>>,
) -> impl IntoResponse {
    if let Err((status, text)) = require_auth(&headers, &pool, &auth_state).await {
        return message(status, &text);
    }

    let address = match payload {
        Some(Json(request)) => request.address,
        None => return message(StatusCode::BAD_REQUEST, "A valid wallet address is required."),
    };
    if !valid_wallet_address(&address) {
        return message(StatusCode::BAD_REQUEST, "A valid wallet address is required.");
    }

    let nonce = match generate_nonce() {
        Ok(nonce) => nonce,
        Err(err) => {
            error!("Failed to generate link challenge: {err:#}");
            return message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during challenge generation.",
            );
        }
    };
    let challenge = build_link_challenge(&nonce);
    auth_state
        .link_challenges()
        .set(&address.to_lowercase(), challenge.clone())
        .await;

    (StatusCode::OK, Json(ChallengeResponse { message: challenge })).into_response()
}

/// Verify a signed linking challenge and attach the address to the
/// caller's account. Addresses owned by someone else are a conflict.
#[utoipa::path(
    post,
    path = "/api/users/me/link-wallet",
    request_body = WalletVerifyRequest,
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Wallet linked", body = PublicUser),
        (status = 400, description = "No live challenge for this address", body = MessageResponse),
        (status = 401, description = "Signature mismatch or not authenticated", body = MessageResponse),
        (status = 409, description = "Address owned by a different account", body = MessageResponse)
    ),
    tag = "users"
)]
pub async fn link_wallet(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<WalletVerifyRequest>>,
) -> impl IntoResponse {
    let user = match require_auth(&headers, &pool, &auth_state).await {
        Ok(user) => user,
        Err((status, text)) => return message(status, &text),
    };

    let Some(Json(request)) = payload else {
        return message(
            StatusCode::BAD_REQUEST,
            "Wallet address and signature are required.",
        );
    };
    if request.address.is_empty() || request.signature.is_empty() {
        return message(
            StatusCode::BAD_REQUEST,
            "Wallet address and signature are required.",
        );
    }

    let address = request.address.to_lowercase();
    let Some(challenge) = auth_state.link_challenges().take(&address).await else {
        return message(
            StatusCode::BAD_REQUEST,
            "Challenge not found or expired. Please try again.",
        );
    };

    match recover_signer(&challenge, &request.signature) {
        Ok(recovered) if recovered.eq_ignore_ascii_case(&address) => {}
        Ok(_) | Err(_) => {
            return message(StatusCode::UNAUTHORIZED, "Signature verification failed.");
        }
    }

    // Re-linking your own address is a no-op success; an address owned by
    // a different account must fail, never silently reassign.
    if user.wallet_address.as_deref() == Some(address.as_str()) {
        return (StatusCode::OK, Json(PublicUser::from(&user))).into_response();
    }

    match storage::link_wallet(&pool, user.id, &address).await {
        Ok(LinkWalletOutcome::Linked(user)) => {
            (StatusCode::OK, Json(PublicUser::from(user.as_ref()))).into_response()
        }
        Ok(LinkWalletOutcome::OwnedByOther) => message(
            StatusCode::CONFLICT,
            "This wallet address is already linked to another account.",
        ),
        Err(err) => {
            error!("Failed to link wallet: {err:#}");
            message(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Server error during wallet linking.",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    #[test]
    fn nonce_is_64_hex_chars() {
        let nonce = generate_nonce().expect("nonce");
        assert_eq!(nonce.len(), 64);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn challenges_embed_the_nonce() {
        let nonce = generate_nonce().expect("nonce");
        assert!(build_auth_challenge(&nonce).contains(&nonce));
        assert!(build_link_challenge(&nonce).contains(&nonce));
        assert_ne!(build_auth_challenge(&nonce), build_link_challenge(&nonce));
    }

    #[tokio::test]
    async fn signed_challenge_recovers_the_wallet_address() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let challenge = build_auth_challenge(&generate_nonce().expect("nonce"));
        let signature = wallet.sign_message(&challenge).await.expect("sign");

        let recovered = recover_signer(&challenge, &signature.to_string()).expect("recover");
        assert_eq!(recovered, format!("{:#x}", wallet.address()));
    }

    #[tokio::test]
    async fn recovered_address_matches_case_insensitively() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let challenge = build_link_challenge(&generate_nonce().expect("nonce"));
        let signature = wallet.sign_message(&challenge).await.expect("sign");

        let recovered = recover_signer(&challenge, &signature.to_string()).expect("recover");
        let mixed_case = format!("{:#x}", wallet.address()).to_uppercase();
        assert!(recovered.eq_ignore_ascii_case(&mixed_case));
    }

    #[tokio::test]
    async fn signature_over_a_different_message_mismatches() {
        let wallet = LocalWallet::new(&mut rand::thread_rng());
        let challenge = build_auth_challenge("aa".repeat(32).as_str());
        let other = build_auth_challenge("bb".repeat(32).as_str());
        let signature = wallet.sign_message(&other).await.expect("sign");

        let recovered = recover_signer(&challenge, &signature.to_string()).expect("recover");
        assert_ne!(recovered, format!("{:#x}", wallet.address()));
    }

    #[test]
    fn malformed_signature_is_an_error() {
        assert!(recover_signer("message", "not-a-signature").is_err());
        assert!(recover_signer("message", "0x1234").is_err());
    }
}
