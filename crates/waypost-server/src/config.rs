use std::env;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Workspace edit lease lifetime in seconds
    pub lock_ttl_secs: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()?;
        let lock_ttl_secs = env::var("WAYPOST_LOCK_TTL_SECS")
            .unwrap_or_else(|_| "300".to_string())
            .parse()?;

        Ok(Self {
            host,
            port,
            lock_ttl_secs,
        })
    }
}
