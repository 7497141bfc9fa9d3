use std::time::Duration;

/// Chat API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Redis connection string (notification queue and pub/sub).
    pub redis_url: String,
    /// HS256 secret shared with the auth service.
    pub jwt_secret: String,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Capacity of each session's outbound buffer.
    pub outbound_buffer_size: usize,
    /// Number of recent messages replayed to a new connection.
    pub history_limit: i64,
    /// Upper bound on a single notification enqueue.
    pub notify_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
            jwt_secret: required_var("JWT_SECRET"),
            port: parsed_var("PORT").unwrap_or(8080),
            outbound_buffer_size: parsed_var("OUTBOUND_BUFFER_SIZE").unwrap_or(256),
            history_limit: parsed_var("HISTORY_LIMIT").unwrap_or(50),
            notify_timeout: Duration::from_secs(parsed_var("NOTIFY_TIMEOUT_SECS").unwrap_or(5)),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
