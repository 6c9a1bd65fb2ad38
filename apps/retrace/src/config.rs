use std::path::PathBuf;

use crate::errors::AppError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub auth_token: String,
    pub roster_path: PathBuf,
    pub window_days: i64,
    pub out_dir: PathBuf,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            base_url: require_env("TRACK_BASE_URL")?,
            auth_token: require_env("TRACK_AUTH_TOKEN")?,
            roster_path: PathBuf::from(require_env("ROSTER_PATH")?),
            window_days: std::env::var("WINDOW_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse::<i64>()
                .map_err(|_| {
                    AppError::Config("WINDOW_DAYS must be a whole number of days".to_string())
                })?,
            out_dir: PathBuf::from(
                std::env::var("OUT_DIR").unwrap_or_else(|_| "./out".to_string()),
            ),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String, AppError> {
    std::env::var(key)
        .map_err(|_| AppError::Config(format!("Required environment variable '{key}' is not set")))
}
