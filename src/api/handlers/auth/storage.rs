//! Database helpers for accounts, sessions, codes, and reset tokens.
//!
//! Code and token consumption are single conditional `UPDATE`s checked by
//! affected-row count, so concurrent attempts can never both succeed.

use anyhow::{anyhow, Context, Result};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{
    generate_otp_code, generate_session_token, hash_token, is_unique_violation, Identifier,
};

/// Outcome when attempting to create a new account.
#[derive(Debug)]
pub(super) enum RegisterOutcome {
    Created,
    Conflict,
}

/// What a stored one-time code authorizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CodePurpose {
    EmailVerification,
    PhoneVerification,
    PasswordReset,
}

impl CodePurpose {
    pub(super) const fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PhoneVerification => "phone_verification",
            Self::PasswordReset => "password_reset",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "email_verification" => Some(Self::EmailVerification),
            "phone_verification" => Some(Self::PhoneVerification),
            "password_reset" => Some(Self::PasswordReset),
            _ => None,
        }
    }
}

/// Minimal fields needed to check a password login.
pub(super) struct CredentialRecord {
    pub(super) user_id: Uuid,
    pub(super) password_hash: Option<String>,
}

/// Minimal data returned for a valid session cookie.
pub(crate) struct SessionRecord {
    pub(crate) user_id: Uuid,
    pub(crate) email: String,
    pub(crate) role: String,
    pub(crate) email_verified: bool,
    pub(crate) phone_verified: bool,
}

/// Profile fields served by `/v1/me` beyond what the principal carries.
pub(crate) struct ProfileRecord {
    pub(crate) phone: Option<String>,
    pub(crate) email_verified: bool,
    pub(crate) phone_verified: bool,
    pub(crate) created_at: String,
}

fn identifier_column(identifier: &Identifier) -> &'static str {
    match identifier {
        Identifier::Email(_) => "email",
        Identifier::Phone(_) => "phone",
    }
}

pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    phone: Option<&str>,
    password_hash: &str,
) -> Result<RegisterOutcome> {
    let query = r"
        INSERT INTO users (email, phone, password_hash)
        VALUES ($1, $2, $3)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .bind(phone)
        .bind(password_hash)
        .execute(pool)
        .instrument(span)
        .await;

    match result {
        Ok(_) => Ok(RegisterOutcome::Created),
        Err(err) if is_unique_violation(&err) => Ok(RegisterOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(super) async fn lookup_user_id(
    pool: &PgPool,
    identifier: &Identifier,
) -> Result<Option<Uuid>> {
    let query = match identifier {
        Identifier::Email(_) => "SELECT id FROM users WHERE email = $1 LIMIT 1",
        Identifier::Phone(_) => "SELECT id FROM users WHERE phone = $1 LIMIT 1",
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query,
        db.lookup = identifier_column(identifier)
    );
    let row = sqlx::query(query)
        .bind(identifier.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user")?;
    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn lookup_credentials(
    pool: &PgPool,
    identifier: &Identifier,
) -> Result<Option<CredentialRecord>> {
    let query = match identifier {
        Identifier::Email(_) => "SELECT id, password_hash FROM users WHERE email = $1 LIMIT 1",
        Identifier::Phone(_) => "SELECT id, password_hash FROM users WHERE phone = $1 LIMIT 1",
    };
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query,
        db.lookup = identifier_column(identifier)
    );
    let row = sqlx::query(query)
        .bind(identifier.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup credentials")?;

    Ok(row.map(|row| CredentialRecord {
        user_id: row.get("id"),
        password_hash: row.get("password_hash"),
    }))
}

pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    // Generate a random token, store only its hash, and return the raw value
    // so the caller can set the session cookie.
    let query = r"
        INSERT INTO sessions (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_token(&token);
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(token_hash)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span.clone())
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    // Expiry is checked lazily here; expired rows simply never match.
    let query = r"
        SELECT users.id, users.email, users.role,
               users.email_verified_at IS NOT NULL AS email_verified,
               users.phone_verified_at IS NOT NULL AS phone_verified
        FROM sessions
        JOIN users ON users.id = sessions.user_id
        WHERE sessions.token_hash = $1
          AND sessions.expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    if row.is_none() {
        return Ok(None);
    }

    // Record activity for audit/visibility without extending the session TTL.
    let query = r"
        UPDATE sessions
        SET last_seen_at = NOW()
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(row.map(|row| SessionRecord {
        user_id: row.get("id"),
        email: row.get("email"),
        role: row.get("role"),
        email_verified: row.get("email_verified"),
        phone_verified: row.get("phone_verified"),
    }))
}

/// Extend a still-valid session. Expired or unknown sessions are left alone,
/// so concurrent refreshes are last-write-wins and cannot resurrect a
/// session.
pub(super) async fn refresh_session(
    pool: &PgPool,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<bool> {
    let query = r"
        UPDATE sessions
        SET expires_at = NOW() + ($2 * INTERVAL '1 second')
        WHERE token_hash = $1
          AND expires_at > NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to refresh session")?;
    Ok(result.rows_affected() > 0)
}

pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Logout is idempotent; it's fine if no rows are deleted.
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(super) async fn code_cooldown_active(
    pool: &PgPool,
    user_id: Uuid,
    purpose: CodePurpose,
    cooldown_seconds: i64,
) -> Result<bool> {
    // Cooldown prevents repeated send requests from flooding the gateway.
    let query = r"
        SELECT 1
        FROM verification_codes
        WHERE user_id = $1
          AND purpose = $2
          AND created_at > NOW() - ($3 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .bind(cooldown_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check code cooldown")?;
    Ok(row.is_some())
}

/// Issue a fresh code, invalidating any unused code of the same purpose in
/// the same transaction so only the latest code is ever live.
pub(super) async fn replace_verification_code(
    pool: &PgPool,
    user_id: Uuid,
    purpose: CodePurpose,
    ttl_seconds: i64,
) -> Result<String> {
    let mut tx = pool.begin().await.context("begin code transaction")?;

    let query = r"
        DELETE FROM verification_codes
        WHERE user_id = $1
          AND purpose = $2
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to invalidate previous codes")?;

    let code = generate_otp_code();
    let query = r"
        INSERT INTO verification_codes (user_id, code, purpose, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(&code)
        .bind(purpose.as_str())
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert verification code")?;

    tx.commit().await.context("commit code transaction")?;

    Ok(code)
}

/// Consume a live code atomically and apply its side effect.
///
/// The conditional `UPDATE` is the replay guard: a used or expired row never
/// matches, and of two concurrent attempts only one sees an affected row.
pub(super) async fn consume_verification_code(
    pool: &PgPool,
    user_id: Uuid,
    submitted_code: &str,
) -> Result<Option<CodePurpose>> {
    let mut tx = pool.begin().await.context("begin consume transaction")?;

    let query = r"
        UPDATE verification_codes
        SET used_at = NOW()
        WHERE user_id = $1
          AND code = $2
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING purpose
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(submitted_code)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume verification code")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(None);
    };

    let purpose: String = row.get("purpose");
    let Some(purpose) = CodePurpose::parse(&purpose) else {
        let _ = tx.rollback().await;
        return Err(anyhow!("unknown verification code purpose: {purpose}"));
    };

    let flag_query = match purpose {
        CodePurpose::EmailVerification => Some(
            r"
            UPDATE users
            SET email_verified_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        ),
        CodePurpose::PhoneVerification => Some(
            r"
            UPDATE users
            SET phone_verified_at = NOW(), updated_at = NOW()
            WHERE id = $1
            ",
        ),
        CodePurpose::PasswordReset => None,
    };

    if let Some(query) = flag_query {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to update verification flag")?;
    }

    tx.commit().await.context("commit consume transaction")?;

    Ok(Some(purpose))
}

/// Issue a single-use reset token after a verified reset code, invalidating
/// any earlier unused token for the user.
pub(super) async fn replace_reset_token(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let mut tx = pool.begin().await.context("begin reset token transaction")?;

    let query = r"
        DELETE FROM password_reset_tokens
        WHERE user_id = $1
          AND used_at IS NULL
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to invalidate previous reset tokens")?;

    let token = Uuid::new_v4().to_string();
    let token_hash = hash_token(&token);
    let query = r"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert reset token")?;

    tx.commit().await.context("commit reset token transaction")?;

    Ok(token)
}

/// Check a reset token without consuming it.
pub(super) async fn peek_reset_token(pool: &PgPool, token_hash: &[u8]) -> Result<Option<Uuid>> {
    let query = r"
        SELECT user_id
        FROM password_reset_tokens
        WHERE token_hash = $1
          AND used_at IS NULL
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check reset token")?;
    Ok(row.map(|row| row.get("user_id")))
}

/// Consume the reset token, store the new password hash, and revoke every
/// session for the user in one transaction.
pub(super) async fn consume_reset_token_and_set_password(
    pool: &PgPool,
    token_hash: &[u8],
    password_hash: &str,
) -> Result<Option<Uuid>> {
    let mut tx = pool.begin().await.context("begin reset transaction")?;

    let query = r"
        UPDATE password_reset_tokens
        SET used_at = NOW()
        WHERE token_hash = $1
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;

    let Some(row) = row else {
        let _ = tx.rollback().await;
        return Ok(None);
    };

    let user_id: Uuid = row.get("user_id");
    let query = r"
        UPDATE users
        SET password_hash = $2, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to update password")?;

    let query = "DELETE FROM sessions WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to revoke sessions")?;

    tx.commit().await.context("commit reset transaction")?;

    Ok(Some(user_id))
}

/// Find or create the local account for an OAuth identity.
///
/// Matches by (provider, subject) first, then links an existing account with
/// the same email, and only then creates a new row. Provider emails are
/// treated as verified.
pub(super) async fn upsert_oauth_user(
    pool: &PgPool,
    provider: &str,
    subject: &str,
    email: &str,
) -> Result<Uuid> {
    let mut tx = pool.begin().await.context("begin oauth upsert")?;

    let query = r"
        SELECT id FROM users
        WHERE oauth_provider = $1 AND oauth_subject = $2
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(provider)
        .bind(subject)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to lookup oauth identity")?;

    if let Some(row) = row {
        tx.commit().await.context("commit oauth lookup")?;
        return Ok(row.get("id"));
    }

    let query = r"
        UPDATE users
        SET oauth_provider = $1,
            oauth_subject = $2,
            email_verified_at = COALESCE(email_verified_at, NOW()),
            updated_at = NOW()
        WHERE email = $3
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(provider)
        .bind(subject)
        .bind(email)
        .fetch_optional(&mut *tx)
        .instrument(span)
        .await
        .context("failed to link oauth identity")?;

    if let Some(row) = row {
        tx.commit().await.context("commit oauth link")?;
        return Ok(row.get("id"));
    }

    let query = r"
        INSERT INTO users (email, oauth_provider, oauth_subject, email_verified_at)
        VALUES ($1, $2, $3, NOW())
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(provider)
        .bind(subject)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert oauth user")?;

    let user_id = row.get("id");
    tx.commit().await.context("commit oauth insert")?;

    Ok(user_id)
}

pub(crate) async fn fetch_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<ProfileRecord>> {
    let query = r"
        SELECT phone,
               email_verified_at IS NOT NULL AS email_verified,
               phone_verified_at IS NOT NULL AS phone_verified,
               created_at::text AS created_at
        FROM users
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch profile")?;

    Ok(row.map(|row| ProfileRecord {
        phone: row.get("phone"),
        email_verified: row.get("email_verified"),
        phone_verified: row.get("phone_verified"),
        created_at: row.get("created_at"),
    }))
}
