//! Database helpers for session rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::device::{DeviceInfo, GeoLocation};

/// Window within which a repeated (IP, device name) pair does not count
/// as a new device.
const NEW_DEVICE_WINDOW_DAYS: i32 = 30;
/// Terminated sessions are swept once their logout is this old.
const TERMINATED_RETENTION_DAYS: i32 = 7;

/// Input for one session row.
#[derive(Debug)]
pub(super) struct NewSession {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub login_method: String,
    pub ip_address: String,
    pub user_agent: String,
    pub device: DeviceInfo,
    pub location: GeoLocation,
    pub is_new_device: bool,
}

/// Full session row as returned to the owner.
#[derive(Debug)]
pub(super) struct SessionRow {
    pub id: Uuid,
    pub login_method: String,
    pub ip_address: String,
    pub device: DeviceInfo,
    pub location: GeoLocation,
    pub is_new_device: bool,
    pub login_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn session_from_row(row: &PgRow) -> SessionRow {
    SessionRow {
        id: row.get("id"),
        login_method: row.get("login_method"),
        ip_address: row.get("ip_address"),
        device: DeviceInfo {
            kind: row.get("device_type"),
            browser: row.get("device_browser"),
            os: row.get("device_os"),
            name: row.get("device_name"),
        },
        location: GeoLocation {
            country: row.get("country"),
            city: row.get("city"),
            region: row.get("region"),
        },
        is_new_device: row.get("is_new_device"),
        login_at: row.get("login_at"),
        last_activity_at: row.get("last_activity_at"),
        expires_at: row.get("expires_at"),
    }
}

/// Whether this exact (IP, device name) pair logged in recently.
pub(super) async fn seen_device_recently(
    pool: &PgPool,
    user_id: Uuid,
    ip_address: &str,
    device_name: &str,
) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM sessions \
             WHERE user_id = $1 AND ip_address = $2 AND device_name = $3 \
               AND login_at > NOW() - ($4 * INTERVAL '1 day')) AS present",
    )
    .bind(user_id)
    .bind(ip_address)
    .bind(device_name)
    .bind(NEW_DEVICE_WINDOW_DAYS)
    .fetch_one(pool)
    .instrument(span)
    .await
    .context("failed to check device history")?;
    Ok(row.get("present"))
}

pub(super) async fn insert_session(pool: &PgPool, session: &NewSession) -> Result<()> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    sqlx::query(
        "INSERT INTO sessions \
             (id, user_id, login_method, ip_address, user_agent, device_type, device_browser, \
              device_os, device_name, country, city, region, is_new_device, is_new_location) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)",
    )
    .bind(session.session_id)
    .bind(session.user_id)
    .bind(&session.login_method)
    .bind(&session.ip_address)
    .bind(&session.user_agent)
    .bind(&session.device.kind)
    .bind(&session.device.browser)
    .bind(&session.device.os)
    .bind(&session.device.name)
    .bind(&session.location.country)
    .bind(&session.location.city)
    .bind(&session.location.region)
    .bind(session.is_new_device)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to insert session")?;
    Ok(())
}

/// Whether the user still wants new-device notifications. Settings are
/// owned elsewhere; a missing row means notifications are on.
pub(super) async fn session_notifications_enabled(pool: &PgPool, user_id: Uuid) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query("SELECT session_notifications FROM user_settings WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to read notification settings")?;
    Ok(row.map_or(true, |row| row.get("session_notifications")))
}

pub(super) async fn mark_notification_sent(pool: &PgPool, session_id: Uuid) -> Result<()> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    sqlx::query("UPDATE sessions SET notification_sent = TRUE WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark notification sent")?;
    Ok(())
}

/// Active, unexpired sessions, most recently active first.
pub(super) async fn list_active(pool: &PgPool, user_id: Uuid) -> Result<Vec<SessionRow>> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let rows = sqlx::query(
        "SELECT id, login_method, ip_address, device_type, device_browser, device_os, \
                device_name, country, city, region, is_new_device, login_at, \
                last_activity_at, expires_at \
         FROM sessions \
         WHERE user_id = $1 AND is_active AND expires_at > NOW() \
         ORDER BY last_activity_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(span)
    .await
    .context("failed to list sessions")?;
    Ok(rows.iter().map(session_from_row).collect())
}

/// Stamp activity on an owned, active session.
pub(super) async fn touch_activity(pool: &PgPool, session_id: Uuid, user_id: Uuid) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let result = sqlx::query(
        "UPDATE sessions SET last_activity_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND is_active",
    )
    .bind(session_id)
    .bind(user_id)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to update session activity")?;
    Ok(result.rows_affected() > 0)
}

/// Deactivate one session, scoped to its owner.
pub(super) async fn terminate(pool: &PgPool, session_id: Uuid, user_id: Uuid) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let result = sqlx::query(
        "UPDATE sessions SET is_active = FALSE, logout_at = NOW() \
         WHERE id = $1 AND user_id = $2 AND is_active",
    )
    .bind(session_id)
    .bind(user_id)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to terminate session")?;
    Ok(result.rows_affected() > 0)
}

/// Deactivate every active session except the designated survivor.
pub(super) async fn terminate_others(
    pool: &PgPool,
    user_id: Uuid,
    except_session_id: Option<Uuid>,
) -> Result<u64> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let result = sqlx::query(
        "UPDATE sessions SET is_active = FALSE, logout_at = NOW() \
         WHERE user_id = $1 AND is_active AND ($2::uuid IS NULL OR id <> $2)",
    )
    .bind(user_id)
    .bind(except_session_id)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to terminate sessions")?;
    Ok(result.rows_affected())
}

pub(super) struct StatsRow {
    pub total: i64,
    pub active: i64,
    pub recent: i64,
    pub device_types: Vec<String>,
    pub countries: Vec<String>,
}

pub(super) async fn stats(pool: &PgPool, user_id: Uuid) -> Result<StatsRow> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let counts = sqlx::query(
        "SELECT COUNT(*) AS total, \
                COUNT(*) FILTER (WHERE is_active) AS active, \
                COUNT(*) FILTER (WHERE created_at >= NOW() - INTERVAL '7 days') AS recent \
         FROM sessions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(pool)
    .instrument(span)
    .await
    .context("failed to aggregate session counts")?;

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let device_rows = sqlx::query("SELECT DISTINCT device_type FROM sessions WHERE user_id = $1")
        .bind(user_id)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to collect device types")?;

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let country_rows = sqlx::query(
        "SELECT DISTINCT country FROM sessions WHERE user_id = $1 AND country IS NOT NULL",
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(span)
    .await
    .context("failed to collect countries")?;

    Ok(StatsRow {
        total: counts.get("total"),
        active: counts.get("active"),
        recent: counts.get("recent"),
        device_types: device_rows
            .iter()
            .map(|row| row.get("device_type"))
            .collect(),
        countries: country_rows.iter().map(|row| row.get("country")).collect(),
    })
}

/// Delete sessions past expiry, and terminated sessions whose logout is
/// older than the retention window.
pub(super) async fn sweep_expired(pool: &PgPool) -> Result<u64> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
    let result = sqlx::query(
        "DELETE FROM sessions \
         WHERE expires_at < NOW() \
            OR (is_active = FALSE AND logout_at < NOW() - ($1 * INTERVAL '1 day'))",
    )
    .bind(TERMINATED_RETENTION_DAYS)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to sweep sessions")?;
    Ok(result.rows_affected())
}
