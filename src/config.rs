//! Runtime configuration loaded from environment variables

use chrono::Duration as ChronoDuration;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_VOTING_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_COOLDOWN_HOURS: i64 = 48;
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_COMMENT_CHARS: usize = 1000;
pub const DEFAULT_MAX_STATEMENT_CHARS: usize = 500;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_AUTH_USER_HEADER: &str = "x-user-id";

/// Upper bound for hour settings; round deadlines must stay representable
pub const MAX_HOURS: i64 = 100 * 365 * 24;

/// Read a trimmed, non-empty env var
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse an env var, falling back to `default` (with a warning) when it is invalid
fn env_parse<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match env_string(key) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(
                    "Invalid value {:?} for {}, using default {}",
                    raw,
                    key,
                    default
                );
                default
            }
        },
    }
}

/// Parse a strictly positive number of units
fn env_positive<T: FromStr + Copy + PartialOrd + Default + std::fmt::Display>(
    key: &str,
    default: T,
) -> T {
    let value = env_parse(key, default);
    if value <= T::default() {
        tracing::warn!("{} must be positive, using default {}", key, default);
        return default;
    }
    value
}

/// Turn a number of hours into a duration, falling back to `default_hours`
/// when it is out of range
fn hours_or_default(key: &str, hours: i64, default_hours: i64) -> ChronoDuration {
    match ChronoDuration::try_hours(hours) {
        Some(duration) if hours <= MAX_HOURS => duration,
        _ => {
            tracing::warn!(
                "{} = {} is out of range, using default {}",
                key,
                hours,
                default_hours
            );
            ChronoDuration::hours(default_hours)
        }
    }
}

/// Timing and limits of the round lifecycle
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// How long a round accepts votes
    pub voting_window: ChronoDuration,
    /// Minimum wait after a close before the next round may open
    pub cooldown: ChronoDuration,
    pub max_comment_chars: usize,
    pub max_statement_chars: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            voting_window: ChronoDuration::hours(DEFAULT_VOTING_WINDOW_HOURS),
            cooldown: ChronoDuration::hours(DEFAULT_COOLDOWN_HOURS),
            max_comment_chars: DEFAULT_MAX_COMMENT_CHARS,
            max_statement_chars: DEFAULT_MAX_STATEMENT_CHARS,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Self {
        Self {
            voting_window: hours_or_default(
                "VOTING_WINDOW_HOURS",
                env_positive("VOTING_WINDOW_HOURS", DEFAULT_VOTING_WINDOW_HOURS),
                DEFAULT_VOTING_WINDOW_HOURS,
            ),
            // Zero cooldown is allowed: the next round opens on the following tick
            cooldown: hours_or_default(
                "COOLDOWN_HOURS",
                env_parse("COOLDOWN_HOURS", DEFAULT_COOLDOWN_HOURS).max(0),
                DEFAULT_COOLDOWN_HOURS,
            ),
            max_comment_chars: env_positive("MAX_COMMENT_CHARS", DEFAULT_MAX_COMMENT_CHARS),
            max_statement_chars: env_positive("MAX_STATEMENT_CHARS", DEFAULT_MAX_STATEMENT_CHARS),
        }
    }
}

/// Process-level settings for the HTTP server and its collaborators
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite connection string; unset means the in-memory store
    pub database_url: Option<String>,
    /// JSON snapshot loaded at startup and written at shutdown (memory store only)
    pub snapshot_path: Option<String>,
    pub scheduler_interval: Duration,
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,
    /// Header carrying the authenticated user id, lowercased
    pub auth_user_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            snapshot_path: None,
            scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            notify_webhook_url: None,
            notify_timeout: Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS),
            auth_user_header: DEFAULT_AUTH_USER_HEADER.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            database_url: env_string("DATABASE_URL"),
            snapshot_path: env_string("SNAPSHOT_PATH"),
            scheduler_interval: Duration::from_secs(env_positive(
                "SCHEDULER_INTERVAL_SECS",
                DEFAULT_SCHEDULER_INTERVAL_SECS,
            )),
            notify_webhook_url: env_string("NOTIFY_WEBHOOK_URL"),
            notify_timeout: Duration::from_secs(env_positive(
                "NOTIFY_TIMEOUT_SECS",
                DEFAULT_NOTIFY_TIMEOUT_SECS,
            )),
            auth_user_header: env_string("AUTH_USER_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or_else(|| DEFAULT_AUTH_USER_HEADER.to_string()),
        }
    }
}
