use std::env;

use anyhow::{Context, Result, anyhow};

/// Process-wide configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub frontend_url: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub uploads_dir: String,
    pub generator_base_url: String,
    pub prefetch_open_hour: u32,
    pub prefetch_close_hour: u32,
    pub timezone_offset_hours: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET env var is missing")?;

        Ok(Self {
            port: parse_env("PORT", 5000)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            database_url,
            jwt_secret,
            uploads_dir: env::var("UPLOADS_DIR").unwrap_or_else(|_| "uploads".to_string()),
            generator_base_url: env::var("GENERATOR_API_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
            prefetch_open_hour: parse_env("PREFETCH_OPEN_HOUR", 8)?,
            prefetch_close_hour: parse_env("PREFETCH_CLOSE_HOUR", 22)?,
            timezone_offset_hours: parse_env("TIMEZONE_OFFSET_HOURS", 7)?,
        })
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}
