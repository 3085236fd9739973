//! HTTP server wiring: router, middleware layers, and the OpenAPI doc.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers::{auth, health, me, sessions};

pub mod email;
pub mod handlers;

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "credexa",
        description = "Multi-modal authentication and session tracking for Credexa"
    ),
    paths(
        health::health,
        auth::register::register,
        auth::register::verify_otp,
        auth::register::resend_otp,
        auth::login::login,
        auth::reset::request_password_reset,
        auth::reset::reset_password,
        auth::wallet::web3_challenge,
        auth::wallet::web3_verify,
        auth::wallet::generate_link_challenge,
        auth::wallet::link_wallet,
        auth::oauth::start,
        auth::oauth::callback,
        me::get_me,
        me::update_me,
        me::verify_email_update,
        me::resend_email_update_otp,
        sessions::list_sessions,
        sessions::terminate_session,
        sessions::terminate_other_sessions,
        sessions::session_stats,
        sessions::session_activity,
    ),
    components(schemas(
        health::Health,
        auth::types::MessageResponse,
        auth::types::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::VerifyOtpRequest,
        auth::types::ResendOtpRequest,
        auth::types::PasswordResetRequest,
        auth::types::ResetPasswordRequest,
        auth::types::WalletChallengeRequest,
        auth::types::WalletVerifyRequest,
        auth::types::ChallengeResponse,
        auth::types::AuthResponse,
        auth::types::LoginAccepted,
        auth::types::LoginUserSummary,
        auth::types::PublicUser,
        auth::types::ResetAllowedResponse,
        me::UpdateProfileRequest,
        me::EmailChangePendingResponse,
        me::VerifyEmailUpdateRequest,
        me::VerifiedEmailResponse,
        sessions::types::DeviceView,
        sessions::types::LocationView,
        sessions::types::SessionView,
        sessions::types::SessionListResponse,
        sessions::types::TerminateOthersRequest,
        sessions::types::TerminateOthersResponse,
        sessions::types::SessionStats,
        sessions::types::SessionStatsResponse,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "auth", description = "Credential exchange endpoints"),
        (name = "users", description = "Authenticated self-service"),
        (name = "sessions", description = "Login session tracking"),
        (name = "health", description = "Service health")
    )
)]
struct ApiDoc;

/// Build the full application router (without the shared-state layers).
fn router() -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(health::health).options(health::health))
        .route("/api/auth/register", post(auth::register::register))
        .route("/api/auth/login", post(auth::login::login))
        .route("/api/auth/verify-otp", post(auth::register::verify_otp))
        .route("/api/auth/resend-otp", post(auth::register::resend_otp))
        .route(
            "/api/auth/request-password-reset",
            post(auth::reset::request_password_reset),
        )
        .route("/api/auth/reset-password", post(auth::reset::reset_password))
        .route("/api/auth/web3/challenge", post(auth::wallet::web3_challenge))
        .route("/api/auth/web3/verify", post(auth::wallet::web3_verify))
        .route("/api/auth/:provider", get(auth::oauth::start))
        .route("/api/auth/:provider/callback", get(auth::oauth::callback))
        .route("/api/users/me", get(me::get_me).put(me::update_me))
        .route("/api/users/me/verify-email", post(me::verify_email_update))
        .route(
            "/api/users/me/resend-verify-email",
            post(me::resend_email_update_otp),
        )
        .route(
            "/api/users/me/generate-link-challenge",
            post(auth::wallet::generate_link_challenge),
        )
        .route("/api/users/me/link-wallet", post(auth::wallet::link_wallet))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/stats", get(sessions::session_stats))
        .route(
            "/api/sessions/terminate-others",
            post(sessions::terminate_other_sessions),
        )
        .route("/api/sessions/:session_id", delete(sessions::terminate_session))
        .route(
            "/api/sessions/:session_id/activity",
            post(sessions::session_activity),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Start the server.
///
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or
/// the listener cannot bind.
pub async fn new(
    port: u16,
    dsn: String,
    auth_state: Arc<auth::AuthState>,
    sweep_interval: Duration,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    sessions::tracker::spawn_session_sweeper(pool.clone(), sweep_interval);

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router().layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors)
            .layer(Extension(auth_state))
            .layer(Extension(pool)),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() {
        let origin = frontend_origin("http://localhost:3000/dashboard").expect("origin");
        assert_eq!(origin, HeaderValue::from_static("http://localhost:3000"));

        let origin = frontend_origin("https://credexa.app/").expect("origin");
        assert_eq!(origin, HeaderValue::from_static("https://credexa.app"));
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().expect("openapi json");
        assert!(json.contains("/api/auth/register"));
        assert!(json.contains("/api/sessions"));
    }
}
