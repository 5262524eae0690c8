use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;

use crate::error::AppError;

/// Expiry window for typing indicators that are never explicitly stopped.
pub const DEFAULT_TYPING_TTL_MS: u64 = 3000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub typing_ttl_ms: u64,
    pub media_root: PathBuf,
    pub media_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);
        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.trim().is_empty() {
            return Err(AppError::Config("JWT_SECRET must not be empty".into()));
        }
        let typing_ttl_ms = env::var("TYPING_TTL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TYPING_TTL_MS);
        let media_root = env::var("MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./media"));
        let media_base_url = env::var("MEDIA_BASE_URL").unwrap_or_else(|_| "/media".into());

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            typing_ttl_ms,
            media_root,
            media_base_url,
        })
    }
}
