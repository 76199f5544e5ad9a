use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::warn;

use wapibei_api::mailer::SmtpSettings;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Values shipped in sample `.env` files that must never sign real tokens.
const PLACEHOLDER_SECRETS: [&str; 3] = ["", "changeme", "your-secret-here"];

/// Everything the binary reads from `WAPIBEI_*` environment variables.
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub session_days: i64,
    pub otp_ttl_minutes: i64,
    pub release_interval_secs: u64,
    pub smtp: Option<SmtpSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.trim()) => secret,
            _ => {
                warn!("WAPIBEI_JWT_SECRET is not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let smtp = match var("SMTP_HOST").filter(|h| !h.trim().is_empty()) {
            Some(host) => Some(SmtpSettings {
                host,
                port: parse_or("SMTP_PORT", 587)?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from: var("SMTP_FROM").unwrap_or_else(|| "WapiBei <no-reply@wapibei.local>".into()),
            }),
            None => None,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("PORT", 3000)?,
            db_path: var("DB_PATH").unwrap_or_else(|| "wapibei.db".into()).into(),
            data_dir: var("DATA_DIR").unwrap_or_else(|| "data".into()).into(),
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "uploads".into()).into(),
            jwt_secret,
            session_days: parse_or("SESSION_DAYS", 7)?,
            otp_ttl_minutes: parse_or("OTP_TTL_MINUTES", 10)?,
            release_interval_secs: parse_or("RELEASE_INTERVAL_SECS", 30)?,
            smtp,
        })
    }
}

fn var(name: &str) -> Option<String> {
    env::var(format!("WAPIBEI_{name}")).ok()
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("WAPIBEI_{name} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
