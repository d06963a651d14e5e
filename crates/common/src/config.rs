use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (group pub/sub transport)
    pub redis_url: String,

    /// JWT secret for connection admission and API authentication
    pub jwt_secret: String,

    /// JWT token expiry in hours
    pub jwt_expiry_hours: u64,

    /// Expected client keepalive ping interval in seconds (default: 30)
    pub ws_ping_interval_secs: u64,

    /// A session with no inbound traffic for `ws_ping_interval_secs` times
    /// this multiplier is treated as dead (default: 3)
    pub ws_idle_timeout_multiplier: u64,

    /// Upper bound on a single transport publish call in milliseconds
    /// (default: 5000)
    pub publish_timeout_ms: u64,

    /// Base URL used to build action links in generated notifications
    pub backend_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?,
            jwt_expiry_hours: std::env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("JWT_EXPIRY_HOURS must be a valid u64"))?,
            ws_ping_interval_secs: std::env::var("WS_PING_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WS_PING_INTERVAL_SECS must be a valid u64"))?,
            ws_idle_timeout_multiplier: std::env::var("WS_IDLE_TIMEOUT_MULTIPLIER")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WS_IDLE_TIMEOUT_MULTIPLIER must be a valid u64"))?,
            publish_timeout_ms: std::env::var("PUBLISH_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUBLISH_TIMEOUT_MS must be a valid u64"))?,
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
        })
    }

    /// Seconds of client silence after which a session is considered dead.
    pub fn ws_idle_timeout_secs(&self) -> u64 {
        self.ws_ping_interval_secs * self.ws_idle_timeout_multiplier
    }
}
