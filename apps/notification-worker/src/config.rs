use std::time::Duration;

/// Worker configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Longest a single blocking pop waits before the worker re-checks for
    /// shutdown.
    pub dequeue_timeout: Duration,
}

impl Config {
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_var("DATABASE_URL"),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379/1".to_string()),
            workers: parsed_var("WORKERS").unwrap_or(2),
            dequeue_timeout: Duration::from_secs(parsed_var("DEQUEUE_TIMEOUT_SECS").unwrap_or(5)),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
