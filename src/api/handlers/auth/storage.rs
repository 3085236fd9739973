//! Database helpers for users, pending signups, and one-time-code state.
//!
//! Every verify-then-clear transition is a single conditional `UPDATE`
//! (compare-and-swap), so two concurrent redemptions of the same code
//! resolve to at most one winner.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::oauth::NormalizedProfile;
use super::otp::{self, OneTimeCode};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, provider, \
     avatar_url, wallet_address, is_verified, email_change_pending_email, created_at";

/// Canonical user row, loaded with the columns the auth core needs.
#[derive(Clone, Debug)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub provider: String,
    pub avatar_url: String,
    pub wallet_address: Option<String>,
    pub is_verified: bool,
    pub email_change_pending_email: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

fn user_from_row(row: &PgRow) -> UserRow {
    UserRow {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        provider: row.get("provider"),
        avatar_url: row.get("avatar_url"),
        wallet_address: row.get("wallet_address"),
        is_verified: row.get("is_verified"),
        email_change_pending_email: row.get("email_change_pending_email"),
        created_at: row.get("created_at"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Outcome of storing a fresh one-time code under the resend cool-down.
#[derive(Debug)]
pub(crate) enum OtpStoreOutcome {
    Stored,
    CoolingDown { wait_seconds: i64 },
    NotFound,
}

/// Outcome of committing a pending email change.
#[derive(Debug)]
pub(crate) enum EmailChangeOutcome {
    Updated(Box<UserRow>),
    Invalid,
    EmailTaken,
}

/// Outcome of attaching a wallet address to an existing account.
#[derive(Debug)]
pub(super) enum LinkWalletOutcome {
    Linked(Box<UserRow>),
    OwnedByOther,
}

pub(crate) async fn lookup_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRow>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRow>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(crate) async fn email_taken(pool: &PgPool, email: &str) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1) AS present")
        .bind(email)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to check email uniqueness")?;
    Ok(row.get("present"))
}

/// Create (or replace) the pending signup for an email. A newer
/// registration attempt supersedes the previous one.
pub(super) async fn replace_pending_signup(
    pool: &PgPool,
    email: &str,
    first_name: &str,
    last_name: &str,
    password_hash: &str,
    code: &OneTimeCode,
) -> Result<()> {
    let query = r"
        INSERT INTO pending_signups
            (email, first_name, last_name, password_hash, otp_code, otp_expires_at, otp_last_sent_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (email) DO UPDATE SET
            first_name = EXCLUDED.first_name,
            last_name = EXCLUDED.last_name,
            password_hash = EXCLUDED.password_hash,
            otp_code = EXCLUDED.otp_code,
            otp_expires_at = EXCLUDED.otp_expires_at,
            otp_last_sent_at = EXCLUDED.otp_last_sent_at
    ";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    sqlx::query(query)
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(password_hash)
        .bind(&code.code)
        .bind(code.expires_at)
        .bind(code.last_sent_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store pending signup")?;
    Ok(())
}

/// Verify a signup code and promote the pending registration into a full
/// user. Promotion is idempotent: a duplicate-key on re-creation is read
/// back as already-done.
pub(super) async fn promote_pending_signup(
    pool: &PgPool,
    email: &str,
    code: &str,
) -> Result<Option<UserRow>> {
    let mut tx = pool.begin().await.context("begin signup promotion")?;

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let pending = sqlx::query(
        "SELECT first_name, last_name, password_hash FROM pending_signups \
         WHERE email = $1 AND otp_code = $2 AND otp_expires_at > NOW() FOR UPDATE",
    )
    .bind(email)
    .bind(code)
    .fetch_optional(&mut *tx)
    .instrument(span)
    .await
    .context("failed to lookup pending signup")?;

    let Some(pending) = pending else {
        let _ = tx.rollback().await;
        return Ok(None);
    };

    let first_name: String = pending.get("first_name");
    let last_name: String = pending.get("last_name");
    let password_hash: String = pending.get("password_hash");

    let insert = format!(
        "INSERT INTO users (first_name, last_name, email, password_hash, provider, is_verified) \
         VALUES ($1, $2, $3, $4, 'email', TRUE) \
         ON CONFLICT (email) DO NOTHING \
         RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    let inserted = sqlx::query(&insert)
        .bind(&first_name)
        .bind(&last_name)
        .bind(email)
        .bind(&password_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to promote pending signup")?;

    let user = match inserted {
        Some(row) => user_from_row(&row),
        None => {
            // A concurrent promotion won; the existing user is the result.
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
            let row = sqlx::query(&query)
                .bind(email)
                .fetch_one(&mut *tx)
                .await
                .context("failed to load already-promoted user")?;
            user_from_row(&row)
        }
    };

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
    sqlx::query("DELETE FROM pending_signups WHERE email = $1")
        .bind(email)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete pending signup")?;

    tx.commit().await.context("commit signup promotion")?;
    Ok(Some(user))
}

/// Store a fresh login OTP unless one was sent within the cool-down.
pub(super) async fn store_login_otp(
    pool: &PgPool,
    email: &str,
    code: &OneTimeCode,
    cooldown_seconds: i64,
) -> Result<OtpStoreOutcome> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let updated = sqlx::query(
        "UPDATE users SET otp_code = $2, otp_expires_at = $3, otp_last_sent_at = $4, \
             updated_at = NOW() \
         WHERE email = $1 \
           AND (otp_last_sent_at IS NULL \
                OR otp_last_sent_at <= NOW() - ($5 * INTERVAL '1 second')) \
         RETURNING id",
    )
    .bind(email)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.last_sent_at)
    .bind(cooldown_seconds)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to store login OTP")?;

    if updated.is_some() {
        return Ok(OtpStoreOutcome::Stored);
    }
    cooldown_outcome(pool, "SELECT otp_last_sent_at AS sent FROM users WHERE email = $1", email, cooldown_seconds).await
}

/// Store a fresh signup OTP on the pending record under the cool-down.
pub(super) async fn store_pending_otp(
    pool: &PgPool,
    email: &str,
    code: &OneTimeCode,
    cooldown_seconds: i64,
) -> Result<OtpStoreOutcome> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let updated = sqlx::query(
        "UPDATE pending_signups SET otp_code = $2, otp_expires_at = $3, otp_last_sent_at = $4 \
         WHERE email = $1 \
           AND (otp_last_sent_at IS NULL \
                OR otp_last_sent_at <= NOW() - ($5 * INTERVAL '1 second')) \
         RETURNING email",
    )
    .bind(email)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.last_sent_at)
    .bind(cooldown_seconds)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to store signup OTP")?;

    if updated.is_some() {
        return Ok(OtpStoreOutcome::Stored);
    }
    cooldown_outcome(
        pool,
        "SELECT otp_last_sent_at AS sent FROM pending_signups WHERE email = $1",
        email,
        cooldown_seconds,
    )
    .await
}

/// Redeem a login OTP: the match and the clear happen in one statement.
pub(super) async fn redeem_login_otp(
    pool: &PgPool,
    email: &str,
    code: &str,
) -> Result<Option<UserRow>> {
    let query = format!(
        "UPDATE users SET otp_code = NULL, otp_expires_at = NULL, otp_last_sent_at = NULL, \
             updated_at = NOW() \
         WHERE email = $1 AND otp_code = $2 AND otp_expires_at > NOW() \
         RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let row = sqlx::query(&query)
        .bind(email)
        .bind(code)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to redeem login OTP")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Store a fresh password-reset code under the cool-down.
pub(super) async fn store_reset_token(
    pool: &PgPool,
    email: &str,
    code: &OneTimeCode,
    cooldown_seconds: i64,
) -> Result<OtpStoreOutcome> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let updated = sqlx::query(
        "UPDATE users SET reset_token = $2, reset_expires_at = $3, reset_last_sent_at = $4, \
             updated_at = NOW() \
         WHERE email = $1 \
           AND (reset_last_sent_at IS NULL \
                OR reset_last_sent_at <= NOW() - ($5 * INTERVAL '1 second')) \
         RETURNING id",
    )
    .bind(email)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.last_sent_at)
    .bind(cooldown_seconds)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to store reset token")?;

    if updated.is_some() {
        return Ok(OtpStoreOutcome::Stored);
    }
    cooldown_outcome(
        pool,
        "SELECT reset_last_sent_at AS sent FROM users WHERE email = $1",
        email,
        cooldown_seconds,
    )
    .await
}

/// Non-consuming check used by `verify-otp` with the `forgot` context:
/// the code is only cleared once the new password arrives.
pub(super) async fn reset_token_valid(pool: &PgPool, email: &str, code: &str) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(
        "SELECT EXISTS (SELECT 1 FROM users \
             WHERE email = $1 AND reset_token = $2 AND reset_expires_at > NOW()) AS present",
    )
    .bind(email)
    .bind(code)
    .fetch_one(pool)
    .instrument(span)
    .await
    .context("failed to check reset token")?;
    Ok(row.get("present"))
}

/// Swap the password for the reset code in one conditional write.
pub(super) async fn redeem_reset_token(
    pool: &PgPool,
    email: &str,
    code: &str,
    new_password_hash: &str,
) -> Result<bool> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let updated = sqlx::query(
        "UPDATE users SET password_hash = $3, reset_token = NULL, reset_expires_at = NULL, \
             reset_last_sent_at = NULL, updated_at = NOW() \
         WHERE email = $1 AND reset_token = $2 AND reset_expires_at > NOW() \
         RETURNING id",
    )
    .bind(email)
    .bind(code)
    .bind(new_password_hash)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to reset password")?;
    Ok(updated.is_some())
}

pub(super) async fn lookup_user_by_provider_id(
    pool: &PgPool,
    column: &'static str,
    external_id: &str,
) -> Result<Option<UserRow>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(&query)
        .bind(external_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by provider id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Create a verified user from an OAuth profile, idempotently: if a
/// concurrent signup for the same provider id won, the existing user is
/// returned.
pub(super) async fn create_oauth_user(
    pool: &PgPool,
    column: &'static str,
    provider_tag: &str,
    profile: &NormalizedProfile,
) -> Result<UserRow> {
    let insert = format!(
        "INSERT INTO users (first_name, last_name, email, avatar_url, provider, is_verified, {column}) \
         VALUES ($1, $2, $3, $4, $5, TRUE, $6) \
         ON CONFLICT DO NOTHING \
         RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    let inserted = sqlx::query(&insert)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(&profile.avatar_url)
        .bind(provider_tag)
        .bind(&profile.external_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to create user from OAuth profile")?;

    if let Some(row) = inserted {
        return Ok(user_from_row(&row));
    }
    lookup_user_by_provider_id(pool, column, &profile.external_id)
        .await?
        .context("OAuth signup conflicted but no user matches the provider id")
}

pub(super) async fn lookup_user_by_wallet(
    pool: &PgPool,
    address: &str,
) -> Result<Option<UserRow>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE wallet_address = $1");
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(&query)
        .bind(address)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by wallet address")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Find or create the user owning a (lowercased) wallet address.
pub(super) async fn find_or_create_wallet_user(pool: &PgPool, address: &str) -> Result<UserRow> {
    if let Some(user) = lookup_user_by_wallet(pool, address).await? {
        return Ok(user);
    }

    let insert = format!(
        "INSERT INTO users (wallet_address, provider, is_verified) \
         VALUES ($1, 'web3', TRUE) \
         ON CONFLICT (wallet_address) DO NOTHING \
         RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    let inserted = sqlx::query(&insert)
        .bind(address)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to create wallet user")?;

    if let Some(row) = inserted {
        return Ok(user_from_row(&row));
    }
    // A concurrent authentication created the user between the two calls.
    lookup_user_by_wallet(pool, address)
        .await?
        .context("wallet signup conflicted but no user owns the address")
}

/// Attach a wallet address to an existing account. Addresses owned by a
/// different user are a conflict, never a silent reassignment.
pub(super) async fn link_wallet(
    pool: &PgPool,
    user_id: Uuid,
    address: &str,
) -> Result<LinkWalletOutcome> {
    let query = format!(
        "UPDATE users SET wallet_address = $2, updated_at = NOW() \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let result = sqlx::query(&query)
        .bind(user_id)
        .bind(address)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match result {
        Ok(row) => {
            let row = row.context("wallet link target user disappeared")?;
            Ok(LinkWalletOutcome::Linked(Box::new(user_from_row(&row))))
        }
        Err(err) if is_unique_violation(&err) => Ok(LinkWalletOutcome::OwnedByOther),
        Err(err) => Err(err).context("failed to link wallet address"),
    }
}

pub(crate) async fn update_profile_names(
    pool: &PgPool,
    user_id: Uuid,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> Result<Option<UserRow>> {
    let query = format!(
        "UPDATE users SET first_name = COALESCE($2, first_name), \
             last_name = COALESCE($3, last_name), updated_at = NOW() \
         WHERE id = $1 RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile names")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Record a pending email change together with its verification code.
pub(crate) async fn store_email_change(
    pool: &PgPool,
    user_id: Uuid,
    pending_email: &str,
    code: &OneTimeCode,
) -> Result<()> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    sqlx::query(
        "UPDATE users SET email_change_code = $2, email_change_expires_at = $3, \
             email_change_pending_email = $4, email_change_last_sent_at = $5, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(user_id)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(pending_email)
    .bind(code.last_sent_at)
    .execute(pool)
    .instrument(span)
    .await
    .context("failed to store email change")?;
    Ok(())
}

/// Refresh the email-change code under the cool-down. `NotFound` means no
/// email change is pending.
pub(crate) async fn resend_email_change_otp(
    pool: &PgPool,
    user_id: Uuid,
    code: &OneTimeCode,
    cooldown_seconds: i64,
) -> Result<OtpStoreOutcome> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let updated = sqlx::query(
        "UPDATE users SET email_change_code = $2, email_change_expires_at = $3, \
             email_change_last_sent_at = $4, updated_at = NOW() \
         WHERE id = $1 AND email_change_pending_email IS NOT NULL \
           AND (email_change_last_sent_at IS NULL \
                OR email_change_last_sent_at <= NOW() - ($5 * INTERVAL '1 second')) \
         RETURNING id",
    )
    .bind(user_id)
    .bind(&code.code)
    .bind(code.expires_at)
    .bind(code.last_sent_at)
    .bind(cooldown_seconds)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to refresh email-change OTP")?;

    if updated.is_some() {
        return Ok(OtpStoreOutcome::Stored);
    }

    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(
        "SELECT email_change_last_sent_at AS sent FROM users \
         WHERE id = $1 AND email_change_pending_email IS NOT NULL",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .instrument(span)
    .await
    .context("failed to inspect email-change cool-down")?;

    match row {
        None => Ok(OtpStoreOutcome::NotFound),
        Some(row) => {
            let sent: Option<chrono::DateTime<Utc>> = row.get("sent");
            let wait_seconds = otp::remaining_cooldown(sent, cooldown_seconds, Utc::now()).unwrap_or(1);
            Ok(OtpStoreOutcome::CoolingDown { wait_seconds })
        }
    }
}

/// Commit a pending email change: the code check, the email swap, and the
/// sub-record clear are one statement.
pub(crate) async fn redeem_email_change(
    pool: &PgPool,
    user_id: Uuid,
    code: &str,
) -> Result<EmailChangeOutcome> {
    let query = format!(
        "UPDATE users SET email = email_change_pending_email, email_change_code = NULL, \
             email_change_expires_at = NULL, email_change_pending_email = NULL, \
             email_change_last_sent_at = NULL, updated_at = NOW() \
         WHERE id = $1 AND email_change_code = $2 AND email_change_expires_at > NOW() \
         RETURNING {USER_COLUMNS}"
    );
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let result = sqlx::query(&query)
        .bind(user_id)
        .bind(code)
        .fetch_optional(pool)
        .instrument(span)
        .await;

    match result {
        Ok(Some(row)) => Ok(EmailChangeOutcome::Updated(Box::new(user_from_row(&row)))),
        Ok(None) => Ok(EmailChangeOutcome::Invalid),
        Err(err) if is_unique_violation(&err) => Ok(EmailChangeOutcome::EmailTaken),
        Err(err) => Err(err).context("failed to commit email change"),
    }
}

/// Map a failed cool-down-guarded update back to its cause.
async fn cooldown_outcome(
    pool: &PgPool,
    probe_query: &'static str,
    email: &str,
    cooldown_seconds: i64,
) -> Result<OtpStoreOutcome> {
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(probe_query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to inspect OTP cool-down")?;

    match row {
        None => Ok(OtpStoreOutcome::NotFound),
        Some(row) => {
            let sent: Option<chrono::DateTime<Utc>> = row.get("sent");
            let wait_seconds = otp::remaining_cooldown(sent, cooldown_seconds, Utc::now()).unwrap_or(1);
            Ok(OtpStoreOutcome::CoolingDown { wait_seconds })
        }
    }
}
