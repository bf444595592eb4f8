use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Newline-delimited JSON over stdin/stdout
    Stdio,
    /// Newline-delimited JSON over TCP
    Tcp,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "coldquery")]
#[command(about = "coldquery - PostgreSQL access for tool-calling agents with managed transaction sessions", long_about = None)]
pub struct Config {
    // Database connection
    #[arg(long, env = "DATABASE_URL", help = "PostgreSQL connection string; overrides the discrete DB_* settings")]
    pub database_url: Option<String>,

    #[arg(long, default_value = "localhost", env = "DB_HOST")]
    pub db_host: String,

    #[arg(long, default_value = "5432", env = "DB_PORT")]
    pub db_port: u16,

    #[arg(long, default_value = "postgres", env = "DB_USER")]
    pub db_user: String,

    #[arg(long, default_value = "", env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: String,

    #[arg(long, default_value = "postgres", env = "DB_DATABASE")]
    pub db_name: String,

    // Pool configuration
    #[arg(long, default_value = "5", env = "COLDQUERY_POOL_MIN_SIZE", help = "Connections opened at startup")]
    pub pool_min_size: usize,

    #[arg(long, default_value = "20", env = "COLDQUERY_POOL_MAX_SIZE", help = "Maximum number of physical connections")]
    pub pool_max_size: usize,

    #[arg(long, default_value = "30", env = "COLDQUERY_POOL_ACQUIRE_TIMEOUT", help = "Seconds to wait for a pooled connection")]
    pub pool_acquire_timeout: u64,

    // Session configuration
    #[arg(long, default_value = "10", env = "COLDQUERY_MAX_SESSIONS", help = "Maximum number of concurrent transaction sessions")]
    pub max_sessions: usize,

    #[arg(long, default_value = "1800", env = "COLDQUERY_SESSION_TTL", help = "Idle seconds before a session is closed and rolled back")]
    pub session_ttl: u64,

    #[arg(long, default_value = "300", env = "COLDQUERY_EXPIRY_WARNING", help = "Warn callers when their session expires within this many seconds")]
    pub expiry_warning: u64,

    // Transport
    #[arg(long, value_enum, default_value = "stdio", env = "COLDQUERY_TRANSPORT")]
    pub transport: Transport,

    #[arg(long, default_value = "127.0.0.1", env = "COLDQUERY_HOST")]
    pub host: String,

    #[arg(short, long, default_value = "7433", env = "COLDQUERY_PORT")]
    pub port: u16,

    #[arg(long, default_value = "1048576", env = "COLDQUERY_MAX_REQUEST_BYTES", help = "Maximum length of one request line")]
    pub max_request_bytes: usize,

    // Logging
    #[arg(long, default_value = "info", env = "COLDQUERY_LOG_LEVEL")]
    pub log_level: String,

    #[arg(long, value_enum, default_value = "text", env = "COLDQUERY_LOG_FORMAT")]
    pub log_format: LogFormat,

    // Authentication
    #[arg(long, env = "COLDQUERY_AUTH_ENABLED", help = "Lock dangerous tools until 'auth_unlock' is called")]
    pub auth_enabled: bool,

    #[arg(long, env = "COLDQUERY_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

impl Config {
    /// Get a configuration instance with all values resolved from CLI args and environment variables
    pub fn load() -> Self {
        Config::parse()
    }

    /// Get the session TTL as Duration
    pub fn session_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }

    /// Get the expiry warning threshold as Duration
    pub fn expiry_warning_duration(&self) -> Duration {
        Duration::from_secs(self.expiry_warning)
    }

    /// Get the pool acquisition timeout as Duration
    pub fn pool_acquire_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.pool_acquire_timeout)
    }

    /// The stateless path can starve when every pooled connection is pinned to a session
    pub fn pool_can_starve(&self) -> bool {
        self.pool_max_size <= self.max_sessions
    }

    /// Address for the TCP transport
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["coldquery"])
    }
}
