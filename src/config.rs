// src/config.rs

use std::{env, time::Duration};

use dotenvy::dotenv;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Credentials for the Cloudinary media store.
#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// API root, overridable for tests and proxies.
    pub api_base: String,
}

/// Outgoing mail. An empty `host` switches the mailer to log-only mode.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub cloudinary: CloudinaryConfig,
    /// Upper bound for a single media store call.
    pub media_timeout: Duration,
    pub max_upload_bytes: usize,
    pub smtp: SmtpConfig,
    /// Lifetime of an emailed one-time code, in seconds.
    pub otp_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let cloudinary = CloudinaryConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
            api_base: env::var("CLOUDINARY_API_BASE")
                .unwrap_or_else(|_| "https://api.cloudinary.com/v1_1".to_string()),
        };

        let smtp = SmtpConfig {
            host: env::var("SMTP_HOST").unwrap_or_default(),
            port: parsed("SMTP_PORT", 587)?,
            username: env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty()),
            password: env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty()),
            from_email: env::var("SMTP_FROM_EMAIL")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),
        };

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration: parsed("JWT_EXPIRATION", 86_400)?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            port: parsed("PORT", 8000)?,
            cors_origins,
            cloudinary,
            media_timeout: Duration::from_secs(parsed("MEDIA_TIMEOUT_SECS", 5)?),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", 25 * 1024 * 1024)?,
            smtp,
            otp_ttl_secs: parsed("OTP_TTL_SECS", 300)?,
        })
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(default),
    }
}
