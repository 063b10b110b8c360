use std::time::Duration;

/// Default hard per-operation timeout.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TABLE: &str = "cards";

/// Store settings derived from env.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub op_timeout: Duration,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            op_timeout: DEFAULT_OP_TIMEOUT,
            table: DEFAULT_TABLE.into(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        fn u32_env(name: &str, default: u32) -> u32 {
            std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
        }
        fn ms_env(name: &str, default: Duration) -> Duration {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        }
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            max_connections: u32_env("CARDSTORE_MAX_CONNECTIONS", defaults.max_connections),
            op_timeout: ms_env("CARDSTORE_OP_TIMEOUT_MS", defaults.op_timeout),
            table: std::env::var("CARDSTORE_TABLE")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.table),
        }
    }

    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }
}
