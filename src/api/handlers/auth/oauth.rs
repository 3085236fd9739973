//! OAuth delegation: authorization-code handshake with the social
//! identity providers and profile normalization into the canonical user
//! shape.
//!
//! Login and signup share one callback; the requested mode rides the
//! provider's opaque `state` parameter because that is the only request
//! data the redirect contract round-trips.

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Redirect},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use url::Url;

use super::super::sessions::tracker;
use super::state::AuthState;
use super::storage;
use super::utils::split_display_name;

/// The providers wired into routing. A legacy `facebook` column exists in
/// the data model but has no adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Google,
    Github,
    Discord,
    Linkedin,
}

impl ProviderKind {
    pub(super) fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            "discord" => Some(Self::Discord),
            "linkedin" => Some(Self::Linkedin),
            _ => None,
        }
    }

    /// Provider tag stored on the user record and on sessions.
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Discord => "discord",
            Self::Linkedin => "linkedin",
        }
    }

    /// Column holding this provider's unique subject id.
    pub(super) fn column(self) -> &'static str {
        match self {
            Self::Google => "google_id",
            Self::Github => "github_id",
            Self::Discord => "discord_id",
            Self::Linkedin => "linkedin_id",
        }
    }
}

/// Login-vs-signup policy selector, echoed through the `state` parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AuthMode {
    Login,
    Signup,
}

impl AuthMode {
    pub(super) fn parse(value: Option<&str>) -> Self {
        match value {
            Some("signup") => Self::Signup,
            _ => Self::Login,
        }
    }

    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Signup => "signup",
        }
    }
}

/// Provider profile reduced to the canonical user shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct NormalizedProfile {
    pub external_id: String,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: String,
}

/// One OAuth provider: endpoints, credentials, and scopes.
pub struct ProviderAdapter {
    kind: ProviderKind,
    client_id: String,
    client_secret: SecretString,
    authorize_url: &'static str,
    token_url: &'static str,
    profile_url: &'static str,
    emails_url: Option<&'static str>,
    scopes: &'static [&'static str],
}

impl ProviderAdapter {
    #[must_use]
    pub fn new(kind: ProviderKind, client_id: String, client_secret: SecretString) -> Self {
        let (authorize_url, token_url, profile_url, emails_url, scopes) = match kind {
            ProviderKind::Google => (
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://www.googleapis.com/oauth2/v3/userinfo",
                None,
                ["openid", "profile", "email"].as_slice(),
            ),
            ProviderKind::Github => (
                "https://github.com/login/oauth/authorize",
                "https://github.com/login/oauth/access_token",
                "https://api.github.com/user",
                Some("https://api.github.com/user/emails"),
                ["read:user", "user:email"].as_slice(),
            ),
            ProviderKind::Discord => (
                "https://discord.com/oauth2/authorize",
                "https://discord.com/api/oauth2/token",
                "https://discord.com/api/users/@me",
                None,
                ["identify", "email"].as_slice(),
            ),
            ProviderKind::Linkedin => (
                "https://www.linkedin.com/oauth/v2/authorization",
                "https://www.linkedin.com/oauth/v2/accessToken",
                "https://api.linkedin.com/v2/userinfo",
                None,
                ["openid", "profile", "email"].as_slice(),
            ),
        };
        Self {
            kind,
            client_id,
            client_secret,
            authorize_url,
            token_url,
            profile_url,
            emails_url,
            scopes,
        }
    }

    /// Authorization endpoint redirect carrying the mode as opaque state.
    ///
    /// # Errors
    /// Returns an error if the provider URL fails to parse.
    pub(super) fn authorize_redirect(&self, callback_url: &str, mode: AuthMode) -> Result<String> {
        let mut url = Url::parse(self.authorize_url).context("invalid authorize URL")?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", callback_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", mode.as_str());
        Ok(url.into())
    }

    /// Swap the authorization code for an access token.
    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        callback_url: &str,
    ) -> Result<String> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", callback_url),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        let response = http
            .post(self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .context("token exchange request failed")?;
        if !response.status().is_success() {
            return Err(anyhow!("token endpoint returned {}", response.status()));
        }
        let body: Value = response
            .json()
            .await
            .context("token response was not JSON")?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("token response carried no access_token"))
    }

    /// Fetch and normalize the provider profile.
    async fn fetch_profile(
        &self,
        http: &reqwest::Client,
        access_token: &str,
    ) -> Result<NormalizedProfile> {
        let profile: Value = http
            .get(self.profile_url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("profile request failed")?
            .error_for_status()
            .context("profile endpoint rejected the token")?
            .json()
            .await
            .context("profile response was not JSON")?;

        let mut normalized = normalize_profile(self.kind, &profile)?;

        // GitHub hides non-public emails behind a second endpoint.
        if normalized.email.is_none() {
            if let Some(emails_url) = self.emails_url {
                let emails: Value = http
                    .get(emails_url)
                    .bearer_auth(access_token)
                    .send()
                    .await
                    .context("emails request failed")?
                    .error_for_status()
                    .context("emails endpoint rejected the token")?
                    .json()
                    .await
                    .context("emails response was not JSON")?;
                normalized.email = primary_email(&emails);
            }
        }

        Ok(normalized)
    }
}

/// Map a raw provider payload into the canonical shape. Pure, so each
/// provider's quirks are testable without the network.
pub(super) fn normalize_profile(kind: ProviderKind, profile: &Value) -> Result<NormalizedProfile> {
    let string = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    };
    let optional = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);

    match kind {
        ProviderKind::Google | ProviderKind::Linkedin => {
            let external_id = profile
                .get("sub")
                .and_then(Value::as_str)
                .context("profile carried no subject id")?
                .to_string();
            Ok(NormalizedProfile {
                external_id,
                email: optional(profile.get("email")),
                first_name: string(profile.get("given_name")),
                last_name: string(profile.get("family_name")),
                avatar_url: string(profile.get("picture")),
            })
        }
        ProviderKind::Github => {
            let external_id = profile
                .get("id")
                .and_then(Value::as_i64)
                .context("profile carried no subject id")?
                .to_string();
            let display_name = profile
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| profile.get("login").and_then(Value::as_str))
                .unwrap_or_default();
            let (first_name, last_name) = split_display_name(display_name);
            Ok(NormalizedProfile {
                external_id,
                email: optional(profile.get("email")),
                first_name,
                last_name,
                avatar_url: string(profile.get("avatar_url")),
            })
        }
        ProviderKind::Discord => {
            let external_id = profile
                .get("id")
                .and_then(Value::as_str)
                .context("profile carried no subject id")?
                .to_string();
            let avatar_url = match profile.get("avatar").and_then(Value::as_str) {
                Some(avatar) => {
                    format!("https://cdn.discordapp.com/avatars/{external_id}/{avatar}.png")
                }
                None => String::new(),
            };
            Ok(NormalizedProfile {
                external_id,
                email: optional(profile.get("email")),
                first_name: string(profile.get("username")),
                last_name: String::new(),
                avatar_url,
            })
        }
    }
}

/// Pick the primary verified address from a GitHub `/user/emails` payload.
pub(super) fn primary_email(emails: &Value) -> Option<String> {
    let list = emails.as_array()?;
    list.iter()
        .find(|entry| {
            entry.get("primary").and_then(Value::as_bool).unwrap_or(false)
                && entry.get("verified").and_then(Value::as_bool).unwrap_or(false)
        })
        .or_else(|| list.first())
        .and_then(|entry| entry.get("email").and_then(Value::as_str))
        .map(str::to_string)
}

/// The adapters configured for this deployment.
#[derive(Default)]
pub struct OAuthRegistry {
    adapters: HashMap<ProviderKind, ProviderAdapter>,
}

impl OAuthRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: ProviderAdapter) {
        self.adapters.insert(adapter.kind, adapter);
    }

    pub(super) fn get(&self, kind: ProviderKind) -> Option<&ProviderAdapter> {
        self.adapters.get(&kind)
    }
}

#[derive(Deserialize, Debug)]
pub struct StartParams {
    mode: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Redirect the client to the provider's authorization endpoint.
#[utoipa::path(
    get,
    path = "/api/auth/{provider}",
    params(
        ("provider" = String, Path, description = "google | github | discord | linkedin"),
        ("mode" = Option<String>, Query, description = "login (default) or signup")
    ),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 404, description = "Unknown or unconfigured provider", body = String)
    ),
    tag = "auth"
)]
pub async fn start(
    Path(provider): Path<String>,
    Query(params): Query<StartParams>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let Some(kind) = ProviderKind::parse(&provider) else {
        return (StatusCode::NOT_FOUND, "Unknown provider".to_string()).into_response();
    };
    let Some(adapter) = auth_state.oauth().get(kind) else {
        return (StatusCode::NOT_FOUND, "Provider not configured".to_string()).into_response();
    };

    let mode = AuthMode::parse(params.mode.as_deref());
    let callback_url = auth_state.config().oauth_callback_url(kind.as_str());
    match adapter.authorize_redirect(&callback_url, mode) {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            error!("Failed to build authorize redirect: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication failed".to_string(),
            )
                .into_response()
        }
    }
}

/// Provider callback: finish the handshake, resolve the user, mint a
/// token, record the session, and bounce back to the frontend.
#[utoipa::path(
    get,
    path = "/api/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "google | github | discord | linkedin")
    ),
    responses(
        (status = 303, description = "Redirect to the frontend success or error URL")
    ),
    tag = "auth"
)]
pub async fn callback(
    Path(provider): Path<String>,
    Query(params): Query<CallbackParams>,
    headers: axum::http::HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let frontend = auth_state.config().frontend_base_url().to_string();

    let Some(kind) = ProviderKind::parse(&provider) else {
        return error_redirect(&frontend, "Authentication failed");
    };

    match complete_callback(kind, params, &headers, &pool, &auth_state).await {
        Ok(token) => {
            let url = format!("{}/auth/success?token={token}", frontend.trim_end_matches('/'));
            Redirect::to(&url).into_response()
        }
        Err(message) => error_redirect(&frontend, &message),
    }
}

/// Drive the callback to a minted token, or a human-readable failure.
async fn complete_callback(
    kind: ProviderKind,
    params: CallbackParams,
    headers: &axum::http::HeaderMap,
    pool: &PgPool,
    auth_state: &Arc<AuthState>,
) -> Result<String, String> {
    if let Some(error) = params.error {
        // Denied consent or provider-side failure; prefer its description.
        let message = params.error_description.unwrap_or(error);
        return Err(message);
    }

    let adapter = auth_state
        .oauth()
        .get(kind)
        .ok_or_else(|| "Provider not configured".to_string())?;
    let code = params.code.ok_or_else(|| "Authentication failed".to_string())?;
    let mode = AuthMode::parse(params.state.as_deref());

    let callback_url = auth_state.config().oauth_callback_url(kind.as_str());
    let profile = async {
        let access_token = adapter
            .exchange_code(auth_state.http(), &code, &callback_url)
            .await?;
        adapter.fetch_profile(auth_state.http(), &access_token).await
    }
    .await
    .map_err(|err| {
        error!("OAuth handshake with {} failed: {err:#}", kind.as_str());
        "Authentication failed".to_string()
    })?;

    let existing = storage::lookup_user_by_provider_id(pool, kind.column(), &profile.external_id)
        .await
        .map_err(|err| {
            error!("Failed to lookup {} identity: {err:#}", kind.as_str());
            "Authentication failed".to_string()
        })?;

    let user = match (existing, mode) {
        (Some(user), _) => user,
        // Login never creates accounts; an unmatched identity is a failure.
        (None, AuthMode::Login) => return Err("Authentication failed".to_string()),
        (None, AuthMode::Signup) => {
            storage::create_oauth_user(pool, kind.column(), kind.as_str(), &profile)
                .await
                .map_err(|err| {
                    error!("Failed to create {} user: {err:#}", kind.as_str());
                    "Authentication failed".to_string()
                })?
        }
    };

    let token = auth_state.tokens().mint(user.id).map_err(|err| {
        error!("Failed to mint token: {err:#}");
        "Authentication failed".to_string()
    })?;

    tracker::record_login(pool, auth_state, &user, kind.as_str(), headers).await;

    Ok(token)
}

/// Redirect to the frontend login page with a URL-encoded error message.
fn error_redirect(frontend_base_url: &str, message: &str) -> axum::response::Response {
    let target = match Url::parse(&format!(
        "{}/login",
        frontend_base_url.trim_end_matches('/')
    )) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("error", message);
            url.to_string()
        }
        Err(_) => format!("{}/login", frontend_base_url.trim_end_matches('/')),
    };
    Redirect::to(&target).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn adapter(kind: ProviderKind) -> ProviderAdapter {
        ProviderAdapter::new(
            kind,
            "client-id".to_string(),
            SecretString::from("client-secret".to_string()),
        )
    }

    #[test]
    fn authorize_redirect_round_trips_mode_as_state() {
        let url = adapter(ProviderKind::Google)
            .authorize_redirect("http://localhost:4000/api/auth/google/callback", AuthMode::Signup)
            .expect("url");
        let parsed = Url::parse(&url).expect("parse");
        let pairs: HashMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("state").map(String::as_str), Some("signup"));
        assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
        assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-id"));
        assert_eq!(
            pairs.get("scope").map(String::as_str),
            Some("openid profile email")
        );
    }

    #[test]
    fn mode_defaults_to_login() {
        assert_eq!(AuthMode::parse(None), AuthMode::Login);
        assert_eq!(AuthMode::parse(Some("unexpected")), AuthMode::Login);
        assert_eq!(AuthMode::parse(Some("signup")), AuthMode::Signup);
    }

    #[test]
    fn google_profile_normalizes_names_and_picture() {
        let profile = json!({
            "sub": "108923",
            "given_name": "Jane",
            "family_name": "Doe",
            "email": "jane@x.com",
            "picture": "https://lh3.example/photo.jpg",
        });
        let normalized = normalize_profile(ProviderKind::Google, &profile).expect("normalize");
        assert_eq!(
            normalized,
            NormalizedProfile {
                external_id: "108923".to_string(),
                email: Some("jane@x.com".to_string()),
                first_name: "Jane".to_string(),
                last_name: "Doe".to_string(),
                avatar_url: "https://lh3.example/photo.jpg".to_string(),
            }
        );
    }

    #[test]
    fn github_profile_splits_display_name() {
        let profile = json!({
            "id": 583231,
            "login": "janedoe",
            "name": "Jane van der Berg",
            "email": null,
            "avatar_url": "https://avatars.example/583231",
        });
        let normalized = normalize_profile(ProviderKind::Github, &profile).expect("normalize");
        assert_eq!(normalized.external_id, "583231");
        assert_eq!(normalized.first_name, "Jane");
        assert_eq!(normalized.last_name, "van der Berg");
        assert_eq!(normalized.email, None);
    }

    #[test]
    fn github_profile_falls_back_to_login() {
        let profile = json!({ "id": 583231, "login": "janedoe", "name": null });
        let normalized = normalize_profile(ProviderKind::Github, &profile).expect("normalize");
        assert_eq!(normalized.first_name, "janedoe");
        assert_eq!(normalized.last_name, "");
    }

    #[test]
    fn discord_profile_builds_cdn_avatar() {
        let profile = json!({
            "id": "80351110224678912",
            "username": "nelly",
            "email": "nelly@x.com",
            "avatar": "8342729096ea3675442027381ff50dfe",
        });
        let normalized = normalize_profile(ProviderKind::Discord, &profile).expect("normalize");
        assert_eq!(normalized.first_name, "nelly");
        assert_eq!(
            normalized.avatar_url,
            "https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png"
        );
    }

    #[test]
    fn missing_subject_id_is_an_error() {
        assert!(normalize_profile(ProviderKind::Google, &json!({})).is_err());
        assert!(normalize_profile(ProviderKind::Github, &json!({"login": "x"})).is_err());
    }

    #[test]
    fn primary_email_prefers_primary_verified() {
        let emails = json!([
            { "email": "old@x.com", "primary": false, "verified": true },
            { "email": "jane@x.com", "primary": true, "verified": true },
        ]);
        assert_eq!(primary_email(&emails).as_deref(), Some("jane@x.com"));
        assert_eq!(primary_email(&json!([])), None);
        assert_eq!(primary_email(&json!({})), None);
    }

    #[test]
    fn registry_only_serves_registered_adapters() {
        let mut registry = OAuthRegistry::new();
        registry.register(adapter(ProviderKind::Github));
        assert!(registry.get(ProviderKind::Github).is_some());
        assert!(registry.get(ProviderKind::Google).is_none());
    }
}
