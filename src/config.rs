//! Backend settings sourced from the environment.

use std::env;

use anyhow::{Context, Result};

pub const DEFAULT_BACKEND_ADDRESS: &str = "localhost:9000";
pub const DEFAULT_DATABASE: &str = "default";
pub const DEFAULT_USERNAME: &str = "default";
pub const DEFAULT_API_PORT: u16 = 8080;

/// Connection and service settings for the columnar backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub address: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub debug: bool,
    pub api_port: u16,
}

impl BackendConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; missing keys fall
    /// back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_port = match lookup("PIVOT_API_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("failed to parse PIVOT_API_PORT value '{raw}'"))?,
            None => DEFAULT_API_PORT,
        };
        let debug = lookup("PIVOT_DEBUG")
            .map(|raw| matches!(raw.trim(), "1" | "true" | "TRUE" | "yes" | "YES"))
            .unwrap_or(false);
        Ok(Self {
            address: lookup("PIVOT_BACKEND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BACKEND_ADDRESS.to_string()),
            database: lookup("PIVOT_BACKEND_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            username: lookup("PIVOT_BACKEND_USERNAME")
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            password: lookup("PIVOT_BACKEND_PASSWORD").unwrap_or_default(),
            debug,
            api_port,
        })
    }
}
