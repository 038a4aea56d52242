use crate::error::{AppResult, Error};
use chrono_tz::Tz;
use dotenvy::dotenv;
use std::env;

/// Reference timezone used when neither the request nor the staff record
/// names one. Stored HH:MM times are interpreted in this timezone.
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Default bound on how long a writer waits for the repository lock.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 15;

/// Default grace period before an idle ACTIVE shift is auto-completed.
pub const DEFAULT_COMPLETION_GRACE_MINUTES: i64 = 60;

/// Main configuration structure for the service
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to
    pub port: u16,
    /// Redis connection URL for the shift repository
    pub redis_url: String,
    /// Fallback timezone for clock reads and display formatting
    pub default_timezone: String,
    /// Bound on waiting for the repository write lock, in seconds
    pub lock_timeout_secs: u64,
    /// Minutes past the last recorded activity before auto-completion
    pub completion_grace_minutes: i64,
    /// Path to the staff directory TOML file
    pub staff_file: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let default_timezone =
            env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string());

        // Reject an unparseable default up front rather than falling back
        // silently on every request.
        default_timezone.parse::<Tz>().map_err(|_| {
            Error::Config(format!("Invalid DEFAULT_TIMEZONE: {}", default_timezone))
        })?;

        let lock_timeout_secs = env::var("LOCK_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS);

        let completion_grace_minutes = env::var("COMPLETION_GRACE_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_COMPLETION_GRACE_MINUTES);

        let staff_file =
            env::var("STAFF_FILE").unwrap_or_else(|_| "config/staff.toml".to_string());

        Ok(Config {
            port,
            redis_url,
            default_timezone,
            lock_timeout_secs,
            completion_grace_minutes,
            staff_file,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_timezone: DEFAULT_TIMEZONE.to_string(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            completion_grace_minutes: DEFAULT_COMPLETION_GRACE_MINUTES,
            staff_file: "config/staff.toml".to_string(),
        }
    }
}
