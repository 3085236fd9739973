//! Auth configuration and shared state.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::challenge::{ChallengeStore, InMemoryChallengeStore};
use super::oauth::OAuthRegistry;
use super::token::TokenIssuer;
use crate::api::email::EmailSender;
use crate::api::APP_USER_AGENT;

const DEFAULT_OTP_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 30;
const DEFAULT_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_AUTH_CHALLENGE_TTL_SECONDS: u64 = 10 * 60;
const DEFAULT_LINK_CHALLENGE_TTL_SECONDS: u64 = 5 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    backend_base_url: String,
    otp_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    token_ttl_seconds: i64,
    auth_challenge_ttl_seconds: u64,
    link_challenge_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, backend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            backend_base_url: backend_base_url.trim_end_matches('/').to_string(),
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            auth_challenge_ttl_seconds: DEFAULT_AUTH_CHALLENGE_TTL_SECONDS,
            link_challenge_ttl_seconds: DEFAULT_LINK_CHALLENGE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_auth_challenge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.auth_challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_link_challenge_ttl_seconds(mut self, seconds: u64) -> Self {
        self.link_challenge_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn backend_base_url(&self) -> &str {
        &self.backend_base_url
    }

    pub(crate) fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    pub(crate) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn token_ttl_seconds(&self) -> i64 {
        self.token_ttl_seconds
    }

    pub(super) fn oauth_callback_url(&self, provider: &str) -> String {
        format!("{}/api/auth/{provider}/callback", self.backend_base_url)
    }
}

/// Everything the auth handlers share: configuration, the token issuer,
/// the outbound email sender, OAuth adapters, the HTTP client for
/// provider calls, and the two wallet-challenge stores.
pub struct AuthState {
    config: AuthConfig,
    tokens: TokenIssuer,
    email: Arc<dyn EmailSender>,
    oauth: OAuthRegistry,
    http: reqwest::Client,
    auth_challenges: Arc<dyn ChallengeStore>,
    link_challenges: Arc<dyn ChallengeStore>,
}

impl AuthState {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        config: AuthConfig,
        tokens: TokenIssuer,
        email: Arc<dyn EmailSender>,
        oauth: OAuthRegistry,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let auth_challenges: Arc<dyn ChallengeStore> = Arc::new(InMemoryChallengeStore::new(
            Duration::from_secs(config.auth_challenge_ttl_seconds),
        ));
        let link_challenges: Arc<dyn ChallengeStore> = Arc::new(InMemoryChallengeStore::new(
            Duration::from_secs(config.link_challenge_ttl_seconds),
        ));
        Ok(Self {
            config,
            tokens,
            email,
            oauth,
            http,
            auth_challenges,
            link_challenges,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub(crate) fn email(&self) -> Arc<dyn EmailSender> {
        self.email.clone()
    }

    pub(super) fn oauth(&self) -> &OAuthRegistry {
        &self.oauth
    }

    pub(super) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(super) fn auth_challenges(&self) -> &dyn ChallengeStore {
        self.auth_challenges.as_ref()
    }

    pub(super) fn link_challenges(&self) -> &dyn ChallengeStore {
        self.link_challenges.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogEmailSender;
    use secrecy::SecretString;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new(
            "https://credexa.app/".to_string(),
            "https://api.credexa.app".to_string(),
        );
        assert_eq!(config.frontend_base_url(), "https://credexa.app");
        assert_eq!(config.otp_ttl_seconds(), 600);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.token_ttl_seconds(), 604_800);

        let config = config
            .with_otp_ttl_seconds(120)
            .with_resend_cooldown_seconds(5)
            .with_token_ttl_seconds(3600)
            .with_auth_challenge_ttl_seconds(60)
            .with_link_challenge_ttl_seconds(30);
        assert_eq!(config.otp_ttl_seconds(), 120);
        assert_eq!(config.resend_cooldown_seconds(), 5);
        assert_eq!(config.token_ttl_seconds(), 3600);
        assert_eq!(config.auth_challenge_ttl_seconds, 60);
        assert_eq!(config.link_challenge_ttl_seconds, 30);
    }

    #[test]
    fn callback_url_embeds_the_provider() {
        let config = AuthConfig::new(
            "https://credexa.app".to_string(),
            "http://localhost:4000/".to_string(),
        );
        assert_eq!(
            config.oauth_callback_url("github"),
            "http://localhost:4000/api/auth/github/callback"
        );
    }

    #[test]
    fn state_constructs_with_log_sender() {
        let config = AuthConfig::new(
            "https://credexa.app".to_string(),
            "http://localhost:4000".to_string(),
        );
        let tokens = TokenIssuer::new(&SecretString::from("secret".to_string()), 3600);
        let state = AuthState::new(
            config,
            tokens,
            Arc::new(LogEmailSender),
            OAuthRegistry::new(),
        )
        .expect("state");
        assert_eq!(state.config().frontend_base_url(), "https://credexa.app");
    }
}
