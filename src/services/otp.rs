//! Emailed one-time codes for email verification and password reset.
//!
//! Only a SHA-256 of the code is stored. One code per user and purpose is
//! outstanding at a time; a code dies after `MAX_ATTEMPTS` wrong guesses.

use std::fmt;

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::AppError;

pub const CODE_LENGTH: usize = 6;
const MAX_ATTEMPTS: i32 = 5;
/// Minimum spacing between two codes for the same user and purpose.
const RESEND_COOLDOWN_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            OtpPurpose::EmailVerification => "email-verification",
            OtpPurpose::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:0width$}", width = CODE_LENGTH)
}

/// Binds the code to its user and purpose so a stored hash is useless for
/// anything else.
pub fn hash_code(user_id: i64, purpose: OtpPurpose, code: &str) -> String {
    hex::encode(Sha256::digest(format!("{user_id}:{purpose}:{code}")))
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(sqlx::FromRow)]
struct StoredOtp {
    id: i64,
    code_hash: String,
    attempts: i32,
    expires_at: chrono::DateTime<Utc>,
}

/// Creates (or replaces) the outstanding code and returns it in clear text
/// for mailing.
pub async fn issue(pool: &PgPool, user_id: i64, purpose: OtpPurpose, ttl_secs: i64) -> Result<String, AppError> {
    let code = generate_code();
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);

    let stored: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO email_otps (user_id, purpose, code_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id, purpose) DO UPDATE
            SET code_hash = EXCLUDED.code_hash,
                attempts = 0,
                expires_at = EXCLUDED.expires_at,
                created_at = NOW()
            WHERE email_otps.created_at < NOW() - make_interval(secs => $5)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(purpose.as_str())
    .bind(hash_code(user_id, purpose, &code))
    .bind(expires_at)
    .bind(RESEND_COOLDOWN_SECS as f64)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to store one-time code: {:?}", e);
        AppError::from(e)
    })?;

    if stored.is_none() {
        return Err(AppError::Conflict(
            "A code was sent recently, please wait before requesting another".to_string(),
        ));
    }

    Ok(code)
}

/// Checks `code` against the outstanding one and consumes it inside the
/// returned transaction. The caller commits that transaction together with
/// the change the code authorizes; dropping it keeps the code valid.
///
/// Wrong, expired or exhausted codes are answered with `BadRequest`, and the
/// attempt is recorded before returning.
pub async fn redeem(
    pool: &PgPool,
    user_id: i64,
    purpose: OtpPurpose,
    code: &str,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let invalid = || AppError::BadRequest("Invalid or expired code".to_string());
    if !is_well_formed(code) {
        return Err(invalid());
    }

    let mut tx = pool.begin().await?;

    let stored = sqlx::query_as::<_, StoredOtp>(
        r#"
        SELECT id, code_hash, attempts, expires_at
        FROM email_otps
        WHERE user_id = $1 AND purpose = $2
        FOR UPDATE
        "#,
    )
    .bind(user_id)
    .bind(purpose.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(invalid)?;

    if stored.expires_at <= Utc::now() || stored.attempts >= MAX_ATTEMPTS {
        sqlx::query("DELETE FROM email_otps WHERE id = $1")
            .bind(stored.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(invalid());
    }

    if stored.code_hash != hash_code(user_id, purpose, code) {
        sqlx::query("UPDATE email_otps SET attempts = attempts + 1 WHERE id = $1")
            .bind(stored.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(invalid());
    }

    sqlx::query("DELETE FROM email_otps WHERE id = $1")
        .bind(stored.id)
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

/// Drops the outstanding code, e.g. when it could not be delivered, so a new
/// one can be requested without waiting out the cooldown.
pub async fn revoke(pool: &PgPool, user_id: i64, purpose: OtpPurpose) -> Result<(), AppError> {
    sqlx::query("DELETE FROM email_otps WHERE user_id = $1 AND purpose = $2")
        .bind(user_id)
        .bind(purpose.as_str())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..200 {
            let code = generate_code();
            assert!(is_well_formed(&code), "bad code {code}");
        }
    }

    #[test]
    fn hash_is_bound_to_user_and_purpose() {
        let base = hash_code(12, OtpPurpose::EmailVerification, "482913");

        assert_eq!(base, hash_code(12, OtpPurpose::EmailVerification, "482913"));
        assert_ne!(base, hash_code(13, OtpPurpose::EmailVerification, "482913"));
        assert_ne!(base, hash_code(12, OtpPurpose::PasswordReset, "482913"));
        assert_eq!(base.len(), 64);
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(!is_well_formed("12345"));
        assert!(!is_well_formed("12345a"));
        assert!(!is_well_formed("1234567"));
        assert!(is_well_formed("000001"));
    }
}
