use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::api;
use crate::api::email::{EmailSender, LogEmailSender, SmtpConfig, SmtpEmailSender};
use crate::api::handlers::auth::oauth::{OAuthRegistry, ProviderAdapter};
use crate::api::handlers::auth::token::TokenIssuer;
use crate::api::handlers::auth::{AuthConfig, AuthState};
use crate::cli::commands::oauth::ProviderCredentials;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_url: String,
    pub backend_url: String,
    pub jwt_secret: SecretString,
    pub jwt_ttl_seconds: i64,
    pub otp_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub auth_challenge_ttl_seconds: u64,
    pub link_challenge_ttl_seconds: u64,
    pub session_sweep_interval_seconds: u64,
    pub smtp: Option<SmtpConfig>,
    pub oauth_providers: Vec<ProviderCredentials>,
}

/// Execute the server action.
///
/// # Errors
/// Returns an error if the SMTP sender cannot be built or the server
/// fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let email: Arc<dyn EmailSender> = match &args.smtp {
        Some(config) => {
            Arc::new(SmtpEmailSender::new(config).context("Failed to build SMTP sender")?)
        }
        None => {
            info!("SMTP not configured; outbound email will be logged");
            Arc::new(LogEmailSender)
        }
    };

    let mut oauth = OAuthRegistry::new();
    for provider in args.oauth_providers {
        oauth.register(ProviderAdapter::new(
            provider.kind,
            provider.client_id,
            provider.client_secret,
        ));
    }

    let tokens = TokenIssuer::new(&args.jwt_secret, args.jwt_ttl_seconds);
    let config = AuthConfig::new(args.frontend_url, args.backend_url)
        .with_otp_ttl_seconds(args.otp_ttl_seconds)
        .with_resend_cooldown_seconds(args.otp_resend_cooldown_seconds)
        .with_token_ttl_seconds(args.jwt_ttl_seconds)
        .with_auth_challenge_ttl_seconds(args.auth_challenge_ttl_seconds)
        .with_link_challenge_ttl_seconds(args.link_challenge_ttl_seconds);

    let auth_state = Arc::new(AuthState::new(config, tokens, email, oauth)?);

    api::new(
        args.port,
        args.dsn,
        auth_state,
        Duration::from_secs(args.session_sweep_interval_seconds),
    )
    .await
}
