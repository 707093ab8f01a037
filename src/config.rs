use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_idle: u32,
    pub jwt_secret: String,
    pub password_pepper: String,
    pub access_ttl_mins: i64,
    pub refresh_ttl_mins: i64,
    pub rotated_retention_days: i64,
    pub store_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub admin_username: String,
    pub admin_email: String,
    pub admin_password: String,
    pub log_level: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid u16")?;
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/encore".to_string());
        let db_max_connections = env_parse("DB_MAX_CONNECTIONS", 10u32)?;
        let db_min_idle = env_parse("DB_MIN_IDLE", 2u32)?;
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".to_string());

        let jwt_secret = required_secret("JWT_SECRET", "super-secret-change-me")?;
        let password_pepper = required_secret("PASSWORD_PEPPER", "pepper-change-me")?;

        let access_ttl_mins = env_parse("ACCESS_TOKEN_TTL_MINS", 60i64)?;
        let refresh_ttl_mins = env_parse("REFRESH_TOKEN_TTL_MINS", 43_200i64)?;
        let rotated_retention_days = env_parse("ROTATED_RETENTION_DAYS", 7i64)?;
        let store_timeout_secs = env_parse("STORE_TIMEOUT_SECS", 5u64)?;
        let cleanup_interval_secs = env_parse("CLEANUP_INTERVAL_SECS", 3_600u64)?;

        let admin_username =
            std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_email =
            std::env::var("ADMIN_EMAIL").unwrap_or_else(|_| "admin@example.com".to_string());
        let admin_password = required_secret("ADMIN_PASSWORD", "admin-change-me")?;

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            db_min_idle,
            jwt_secret,
            password_pepper,
            access_ttl_mins,
            refresh_ttl_mins,
            rotated_retention_days,
            store_timeout_secs,
            cleanup_interval_secs,
            admin_username,
            admin_email,
            admin_password,
            log_level,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => Ok(default),
    }
}

fn required_secret(key: &str, debug_fallback: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(val) => Ok(val),
        Err(_) if cfg!(debug_assertions) => Ok(debug_fallback.to_string()),
        Err(err) => {
            Err(anyhow::anyhow!(err)).context(format!("{key} is required in release builds"))
        }
    }
}
