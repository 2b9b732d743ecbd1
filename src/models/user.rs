// src/models/user.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,

    /// Unique, used to sign in.
    pub email: String,

    pub name: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub image: Option<String>,

    /// Set once the user confirmed an emailed one-time code.
    pub email_verified: bool,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Profile of the current user.
#[derive(Debug, Serialize, FromRow)]
pub struct MeResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub image: Option<String>,
    pub email_verified: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub posts_count: i64,
    pub followers_count: i64,
    pub following_count: i64,
}

/// DTO for registration.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub password: String,
    #[validate(length(
        min = 1,
        max = 80,
        message = "Name length must be between 1 and 80 characters."
    ))]
    pub name: String,
    #[validate(url(message = "Image must be a URL"))]
    pub image: Option<String>,
}

/// DTO for signing in.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// DTO carrying an emailed one-time code.
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
}

/// DTO for requesting a password reset code.
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

/// DTO for setting a new password with a reset code.
#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,
    #[validate(length(
        min = 8,
        max = 128,
        message = "Password length must be between 8 and 128 characters."
    ))]
    pub new_password: String,
}

/// A count returned by the follow and like endpoints.
#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}
