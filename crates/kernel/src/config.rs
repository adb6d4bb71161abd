//! Configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// Kernel configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Per-statement timeout for query transactions, in milliseconds (default: 10000).
    pub statement_timeout_ms: u64,

    /// Largest page size served; larger requests are capped (default: 100).
    pub max_page_size: u64,
}

/// Limits the query engine enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_page_size: 100 }
    }
}

impl Config {
    /// Load configuration from environment variables, after reading `.env`
    /// if one is present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through a variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let statement_timeout_ms = parse_or(&lookup, "QUERY_STATEMENT_TIMEOUT_MS", 10_000u64)
            .context("QUERY_STATEMENT_TIMEOUT_MS must be a valid u64")?;

        let max_page_size = parse_or(&lookup, "QUERY_MAX_PAGE_SIZE", 100u64)
            .context("QUERY_MAX_PAGE_SIZE must be a valid u64")?;

        if database_max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        if statement_timeout_ms == 0 {
            bail!("QUERY_STATEMENT_TIMEOUT_MS must be at least 1");
        }
        if max_page_size == 0 {
            bail!("QUERY_MAX_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            database_url,
            database_max_connections,
            statement_timeout_ms,
            max_page_size,
        })
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            max_page_size: self.max_page_size,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => Ok(raw.trim().parse()?),
        None => Ok(default),
    }
}
