// src/handlers/auth.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::PgPool;
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, is_unique_violation},
    models::user::{
        CreateUserRequest, LoginRequest, MeResponse, PasswordResetConfirm, PasswordResetRequest,
        User, VerifyOtpRequest,
    },
    services::{
        mailer::Mailer,
        otp::{self, OtpPurpose},
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{Claims, sign_jwt},
        response::ApiResponse,
    },
};

const USER_COLUMNS: &str = "id, email, name, password, image, email_verified, created_at";

/// Registers a new user.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created and the user object (excluding password).
pub async fn register(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    let hashed_password = hash_password(&payload.password)?;

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (email, name, password, image)
        VALUES ($1, $2, $3, $4)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&email)
    .bind(payload.name.trim())
    .bind(hashed_password)
    .bind(&payload.image)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("An account for '{}' already exists", email))
        } else {
            tracing::error!("Failed to register user: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok(ApiResponse::created("User registered successfully", user))
}

async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email.trim().to_lowercase())
        .fetch_optional(pool)
        .await
        .map_err(|e| {
            tracing::error!("User lookup failed: {:?}", e);
            AppError::from(e)
        })
}

/// Authenticates a user and returns a bearer token.
pub async fn login(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let invalid = || AppError::AuthError("Invalid email or password".to_string());

    let user = find_by_email(&pool, &payload.email).await?.ok_or_else(invalid)?;
    if !verify_password(&payload.password, &user.password)? {
        return Err(invalid());
    }

    let token = sign_jwt(user.id, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(json!({
        "token": token,
        "type": "Bearer",
        "email_verified": user.email_verified,
    })))
}

/// Profile of the signed-in user with post and follow counts.
pub async fn me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.principal()?.user_id;

    let me = sqlx::query_as::<_, MeResponse>(
        r#"
        SELECT
            u.id, u.email, u.name, u.image, u.email_verified, u.created_at,
            (SELECT COUNT(*) FROM posts WHERE user_id = u.id) AS posts_count,
            (SELECT COUNT(*) FROM follows WHERE following_id = u.id) AS followers_count,
            (SELECT COUNT(*) FROM follows WHERE follower_id = u.id) AS following_count
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(ApiResponse::ok("User fetched successfully", me))
}

/// Mails a code that confirms the signed-in user's email address.
pub async fn send_verification_code(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(mailer): State<Mailer>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.principal()?.user_id;

    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    if user.email_verified {
        return Err(AppError::Conflict("Email is already verified".to_string()));
    }

    let code = otp::issue(&pool, user.id, OtpPurpose::EmailVerification, config.otp_ttl_secs).await?;
    if let Err(e) = mailer
        .send_otp(&user.email, OtpPurpose::EmailVerification, &code, config.otp_ttl_secs)
        .await
    {
        // Undelivered, so it must not hold the resend cooldown.
        otp::revoke(&pool, user.id, OtpPurpose::EmailVerification).await?;
        return Err(AppError::InternalServerError(format!(
            "Failed to send verification email: {e}"
        )));
    }

    Ok(ApiResponse::ok(
        "Verification code sent",
        json!({ "expires_in": config.otp_ttl_secs }),
    ))
}

/// Confirms the signed-in user's email with the mailed code.
pub async fn verify_email(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;
    let user_id = claims.principal()?.user_id;

    let mut tx = otp::redeem(&pool, user_id, OtpPurpose::EmailVerification, &payload.code).await?;

    sqlx::query("UPDATE users SET email_verified = TRUE WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id, "email verified");
    Ok(ApiResponse::message("Email verified successfully", StatusCode::OK))
}

/// Mails a password reset code. Answers the same whether or not the
/// address has an account.
pub async fn send_password_reset_code(
    State(pool): State<PgPool>,
    State(config): State<Config>,
    State(mailer): State<Mailer>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if let Some(user) = find_by_email(&pool, &payload.email).await? {
        match otp::issue(&pool, user.id, OtpPurpose::PasswordReset, config.otp_ttl_secs).await {
            Ok(code) => {
                if let Err(e) = mailer
                    .send_otp(&user.email, OtpPurpose::PasswordReset, &code, config.otp_ttl_secs)
                    .await
                {
                    tracing::error!(user_id = user.id, "Failed to send reset email: {}", e);
                    if let Err(e) = otp::revoke(&pool, user.id, OtpPurpose::PasswordReset).await {
                        tracing::error!(user_id = user.id, "Failed to revoke undelivered code: {}", e);
                    }
                }
            }
            // Cooldown still running; keep the answer uniform.
            Err(AppError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(ApiResponse::message(
        "If the address has an account, a reset code was sent",
        StatusCode::OK,
    ))
}

/// Sets a new password using a mailed reset code.
pub async fn confirm_password_reset(
    State(pool): State<PgPool>,
    Json(payload): Json<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = find_by_email(&pool, &payload.email)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid or expired code".to_string()))?;

    let hashed_password = hash_password(&payload.new_password)?;

    let mut tx = otp::redeem(&pool, user.id, OtpPurpose::PasswordReset, &payload.code).await?;
    sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
        .bind(hashed_password)
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, "password reset");
    Ok(ApiResponse::message("Password updated successfully", StatusCode::OK))
}
