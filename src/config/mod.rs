// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Configuration Management
//!
//! Runtime settings come from environment variables (a local `.env` file is
//! loaded first when present). The pool registry, which maps AMM contract
//! addresses to pool names and token symbols, lives in a separate JSON file
//! whose path is itself configured here.
//!
//! ## Environment
//!
//! | Variable | Default |
//! |---|---|
//! | `SWAPS_SUBGRAPH_URL` | Goldsky `musd-pools-mezo` |
//! | `POOLS_SUBGRAPH_URL` | Goldsky `musd-pools-mezo` |
//! | `TIGRIS_POOLS_SUBGRAPH_URL` | Goldsky `tigris-pools-mezo` |
//! | `EXPLORER_API_URL` | `https://api.explorer.mezo.org/api/v2` |
//! | `COINGECKO_API_URL` | `https://api.coingecko.com/api/v3` |
//! | `COINGECKO_KEY` | none |
//! | `DATABASE_URL` | none (database sink disabled) |
//! | `DB_POOL_SIZE` | 5 |
//! | `DATABASE_ACCEPT_INVALID_CERTS` | false |
//! | `BIGQUERY_PROJECT_ID` | `mezo-portal-data` |
//! | `BIGQUERY_ACCESS_TOKEN` | none (warehouse sink disabled) |
//! | `POOL_REGISTRY_PATH` | `pools.json` |
//! | `REQUEST_DELAY_MS` | 500 |
//! | `REQUEST_TIMEOUT_SECS` | 30 |
//! | `PRICE_MAX_RETRIES` | 3 |
//! | `PRICE_RETRY_BASE_MS` | 1000 |
//!
//! All values are validated at startup; failures surface as
//! [`PipelineError::Config`](crate::errors::PipelineError::Config).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::errors::PipelineError;

/// Contract address to pool name and token lookup
pub mod pool_registry;

const GOLDSKY_BASE: &str = "https://api.goldsky.com/api/public/project_cm6ks2x8um4aj01uj8nwg1f6r/subgraphs";

#[derive(Debug, Clone)]
pub struct Config {
    pub swaps_subgraph_url: String,
    pub pools_subgraph_url: String,
    pub tigris_pools_subgraph_url: String,
    pub explorer_api_url: String,
    pub coingecko_api_url: String,
    pub coingecko_key: Option<String>,
    pub database_url: Option<String>,
    pub db_pool_size: u32,
    /// Skip certificate verification on database TLS connections
    pub database_accept_invalid_certs: bool,
    pub bigquery_project_id: String,
    pub bigquery_access_token: Option<String>,
    pub pool_registry_path: PathBuf,
    /// Pause between subgraph and explorer pages
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub price_max_retries: u32,
    pub price_retry_base: Duration,
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: String| get(key).unwrap_or(default);
        let number = |key: &str, default: u64| -> Result<u64> {
            get(key)
                .map(|v| v.trim().parse::<u64>())
                .transpose()
                .with_context(|| format!("{} must be a non-negative integer", key))
                .map(|v| v.unwrap_or(default))
        };
        let small_number = |key: &str, default: u32| -> Result<u32> {
            let value = number(key, u64::from(default))?;
            u32::try_from(value)
                .map_err(|_| PipelineError::Config(format!("{} is too large: {}", key, value)).into())
        };
        let flag = |key: &str| -> Result<bool> {
            match get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
                None | Some("false") | Some("0") | Some("no") => Ok(false),
                Some("true") | Some("1") | Some("yes") => Ok(true),
                Some(other) => Err(PipelineError::Config(format!("{} must be true or false, got {}", key, other)).into()),
            }
        };

        let config = Config {
            swaps_subgraph_url: get_or("SWAPS_SUBGRAPH_URL", format!("{}/musd-pools-mezo/1.0.0/gn", GOLDSKY_BASE)),
            pools_subgraph_url: get_or("POOLS_SUBGRAPH_URL", format!("{}/musd-pools-mezo/1.0.0/gn", GOLDSKY_BASE)),
            tigris_pools_subgraph_url: get_or(
                "TIGRIS_POOLS_SUBGRAPH_URL",
                format!("{}/tigris-pools-mezo/1.0.0/gn", GOLDSKY_BASE),
            ),
            explorer_api_url: get_or("EXPLORER_API_URL", "https://api.explorer.mezo.org/api/v2".to_string()),
            coingecko_api_url: get_or("COINGECKO_API_URL", "https://api.coingecko.com/api/v3".to_string()),
            coingecko_key: get("COINGECKO_KEY"),
            database_url: get("DATABASE_URL"),
            db_pool_size: small_number("DB_POOL_SIZE", 5)?,
            database_accept_invalid_certs: flag("DATABASE_ACCEPT_INVALID_CERTS")?,
            bigquery_project_id: get_or("BIGQUERY_PROJECT_ID", "mezo-portal-data".to_string()),
            bigquery_access_token: get("BIGQUERY_ACCESS_TOKEN"),
            pool_registry_path: PathBuf::from(get_or("POOL_REGISTRY_PATH", "pools.json".to_string())),
            request_delay: Duration::from_millis(number("REQUEST_DELAY_MS", 500)?),
            request_timeout: Duration::from_secs(number("REQUEST_TIMEOUT_SECS", 30)?),
            price_max_retries: small_number("PRICE_MAX_RETRIES", 3)?,
            price_retry_base: Duration::from_millis(number("PRICE_RETRY_BASE_MS", 1000)?),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("SWAPS_SUBGRAPH_URL", &self.swaps_subgraph_url),
            ("POOLS_SUBGRAPH_URL", &self.pools_subgraph_url),
            ("TIGRIS_POOLS_SUBGRAPH_URL", &self.tigris_pools_subgraph_url),
            ("EXPLORER_API_URL", &self.explorer_api_url),
            ("COINGECKO_API_URL", &self.coingecko_api_url),
        ] {
            let url = Url::parse(value).map_err(|e| PipelineError::Config(format!("{} is not a valid URL: {}", name, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(PipelineError::Config(format!("{} must be an HTTP/HTTPS URL", name)));
            }
        }

        if let Some(db) = &self.database_url {
            if !db.starts_with("postgres://") && !db.starts_with("postgresql://") {
                return Err(PipelineError::Config(
                    "DATABASE_URL must be a postgres:// connection string".to_string(),
                ));
            }
        }
        if self.db_pool_size == 0 {
            return Err(PipelineError::Config("DB_POOL_SIZE must be at least 1".to_string()));
        }
        if self.price_max_retries == 0 {
            return Err(PipelineError::Config("PRICE_MAX_RETRIES must be at least 1".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(PipelineError::Config("REQUEST_TIMEOUT_SECS must be at least 1".to_string()));
        }
        if self.bigquery_project_id.trim().is_empty() {
            return Err(PipelineError::Config("BIGQUERY_PROJECT_ID must not be empty".to_string()));
        }
        Ok(())
    }

    /// Print configuration without secrets.
    pub fn log_summary(&self) {
        tracing::info!("🔧 Configuration:");
        tracing::info!("   Pools subgraph: {}", self.pools_subgraph_url);
        tracing::info!("   Swaps subgraph: {}", self.swaps_subgraph_url);
        tracing::info!("   Tigris subgraph: {}", self.tigris_pools_subgraph_url);
        tracing::info!("   Explorer: {}", self.explorer_api_url);
        tracing::info!("   Price feed: {} (key: {})", self.coingecko_api_url, self.coingecko_key.is_some());
        tracing::info!("   Database: {}", if self.database_url.is_some() { "configured" } else { "disabled" });
        if self.database_accept_invalid_certs {
            tracing::warn!("⚠️ Database TLS certificate verification is disabled");
        }
        tracing::info!(
            "   BigQuery: {} ({})",
            self.bigquery_project_id,
            if self.bigquery_access_token.is_some() { "token set" } else { "no token" }
        );
        tracing::info!("   Pool registry: {}", self.pool_registry_path.display());
        tracing::info!("   Page delay: {:?}, timeout: {:?}", self.request_delay, self.request_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.tigris_pools_subgraph_url.contains("tigris-pools-mezo"));
        assert_eq!(config.request_delay, Duration::from_millis(500));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.price_max_retries, 3);
        assert!(config.database_url.is_none());
        assert!(config.bigquery_access_token.is_none());
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = Config::from_lookup(lookup(&[
            ("REQUEST_DELAY_MS", "0"),
            ("COINGECKO_KEY", "  "),
            ("DATABASE_URL", "postgresql://u:p@localhost/mezo"),
            ("POOL_REGISTRY_PATH", "/etc/mezo/pools.json"),
        ]))
        .unwrap();
        assert!(config.request_delay.is_zero());
        assert!(config.coingecko_key.is_none());
        assert_eq!(config.pool_registry_path, PathBuf::from("/etc/mezo/pools.json"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let bad_url = Config::from_lookup(lookup(&[("POOLS_SUBGRAPH_URL", "not a url")])).unwrap_err();
        println!("{:#}", bad_url);
        assert!(bad_url.to_string().contains("POOLS_SUBGRAPH_URL"));

        assert!(Config::from_lookup(lookup(&[("REQUEST_TIMEOUT_SECS", "abc")])).is_err());
        assert!(Config::from_lookup(lookup(&[("PRICE_MAX_RETRIES", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "mysql://x")])).is_err());
        assert!(Config::from_lookup(lookup(&[("EXPLORER_API_URL", "ftp://explorer")])).is_err());
    }

    #[test]
    fn test_counts_beyond_u32_are_rejected() {
        // 2^32 + 1 would wrap to 1 with a plain cast
        let err = Config::from_lookup(lookup(&[("PRICE_MAX_RETRIES", "4294967297")])).unwrap_err();
        assert!(err.to_string().contains("PRICE_MAX_RETRIES"));
        assert!(Config::from_lookup(lookup(&[("DB_POOL_SIZE", "4294967296")])).is_err());

        let config = Config::from_lookup(lookup(&[("PRICE_MAX_RETRIES", "4294967295")])).unwrap();
        assert_eq!(config.price_max_retries, u32::MAX);
    }

    #[test]
    fn test_database_certificate_verification_is_on_by_default() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(!config.database_accept_invalid_certs);

        let config = Config::from_lookup(lookup(&[("DATABASE_ACCEPT_INVALID_CERTS", "TRUE")])).unwrap();
        assert!(config.database_accept_invalid_certs);

        assert!(Config::from_lookup(lookup(&[("DATABASE_ACCEPT_INVALID_CERTS", "maybe")])).is_err());
    }
}
