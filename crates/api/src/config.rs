//! Application configuration

use std::env;

/// Minimum length accepted for the operator token
const MIN_ADMIN_TOKEN_LEN: usize = 32;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub public_url: String,

    // Database; `None` runs on the in-memory ledger
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Operator endpoints are disabled without a token
    pub admin_api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            public_url: env::var("PUBLIC_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),

            // Operator auth
            admin_api_token: match env::var("ADMIN_API_TOKEN") {
                Ok(token) if !token.is_empty() => {
                    if token.len() < MIN_ADMIN_TOKEN_LEN {
                        return Err(ConfigError::WeakSecret(
                            "ADMIN_API_TOKEN must be at least 32 characters",
                        ));
                    }
                    Some(token)
                }
                _ => None,
            },
        })
    }

    /// Config for tests and local tooling
    pub fn local() -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            public_url: "http://localhost:3000".to_string(),
            database_url: None,
            database_max_connections: 5,
            admin_api_token: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}
