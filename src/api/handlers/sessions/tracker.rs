//! Session creation on successful logins, new-device detection, and the
//! periodic expiry sweep.

use axum::http::HeaderMap;
use sqlx::PgPool;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

use super::super::auth::storage::UserRow;
use super::super::auth::utils::extract_client_ip;
use super::super::auth::AuthState;
use super::device::{lookup_location, parse_user_agent};
use super::storage::{self, NewSession};
use crate::api::email::{send_detached, EmailMessage};

const FALLBACK_IP: &str = "127.0.0.1";

/// Record a session for a successful credential exchange. Failures here
/// (including notification failures) are logged and absorbed; they must
/// never abort the login that produced them.
pub(crate) async fn record_login(
    pool: &PgPool,
    auth_state: &AuthState,
    user: &UserRow,
    login_method: &str,
    headers: &HeaderMap,
) {
    if let Err(err) = create_session(pool, auth_state, user, login_method, headers).await {
        error!("Session tracking failed for {}: {err:#}", user.id);
    }
}

async fn create_session(
    pool: &PgPool,
    auth_state: &AuthState,
    user: &UserRow,
    login_method: &str,
    headers: &HeaderMap,
) -> anyhow::Result<()> {
    let ip_address = extract_client_ip(headers).unwrap_or_else(|| FALLBACK_IP.to_string());
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let device = parse_user_agent(&user_agent);
    let location = lookup_location(&ip_address).await;

    let is_new_device =
        !storage::seen_device_recently(pool, user.id, &ip_address, &device.name).await?;

    let session = NewSession {
        session_id: Uuid::new_v4(),
        user_id: user.id,
        login_method: login_method.to_string(),
        ip_address,
        user_agent,
        device,
        location,
        is_new_device,
    };
    storage::insert_session(pool, &session).await?;

    if is_new_device {
        notify_new_device(pool, auth_state, user, &session).await;
    }
    Ok(())
}

/// Email the user about a login from an unseen device, gated by their
/// notification setting. Best-effort end to end.
async fn notify_new_device(
    pool: &PgPool,
    auth_state: &AuthState,
    user: &UserRow,
    session: &NewSession,
) {
    match storage::session_notifications_enabled(pool, user.id).await {
        Ok(true) => {}
        Ok(false) => return,
        Err(err) => {
            error!("Failed to read notification settings: {err:#}");
            return;
        }
    }
    let Some(email) = user.email.as_deref() else {
        // Wallet-only accounts have nowhere to send the notice.
        return;
    };

    let greeting = if user.first_name.is_empty() {
        "User".to_string()
    } else {
        user.first_name.clone()
    };
    let body = format!(
        "Hello {greeting},\n\n\
         We detected a new login to your Credexa account.\n\n\
         Login method: {method}\n\
         Device: {device}\n\
         IP address: {ip}\n\n\
         If this was you, no action is needed. If you don't recognize this \
         login, change your password and review your active sessions in \
         Settings.\n\n\
         Best regards,\nThe Credexa Team",
        method = session.login_method,
        device = session.device.name,
        ip = session.ip_address,
    );
    send_detached(
        auth_state.email(),
        EmailMessage::new(email, body).with_subject("New Login to Your Credexa Account"),
    );

    if let Err(err) = storage::mark_notification_sent(pool, session.session_id).await {
        error!("Failed to mark notification sent: {err:#}");
    }
}

/// Periodically delete expired and long-terminated sessions.
pub fn spawn_session_sweeper(pool: PgPool, interval: Duration) {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            match storage::sweep_expired(&pool).await {
                Ok(0) => {}
                Ok(swept) => info!("Cleaned up {swept} expired sessions"),
                Err(err) => error!("Session sweep failed: {err:#}"),
            }
        }
    });
}
