use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::errors::PipelineError;

/// One AMM pool as listed in the registry file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PoolInfo {
    pub address: String,
    pub name: String,
    pub token0: String,
    pub token1: String,
    /// Pool name used by the Tigris stats subgraph, when it differs.
    #[serde(default)]
    pub tigris_name: Option<String>,
}

/// Contract address -> pool lookup. Address matching is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct PoolRegistry {
    pools: Vec<PoolInfo>,
    by_address: AHashMap<String, usize>,
    by_tigris_name: AHashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    pools: Vec<PoolInfo>,
}

impl PoolRegistry {
    pub fn from_pools(pools: Vec<PoolInfo>) -> Result<Self, PipelineError> {
        let mut by_address = AHashMap::new();
        let mut by_tigris_name = AHashMap::new();
        for (idx, pool) in pools.iter().enumerate() {
            let key = pool.address.to_lowercase();
            if by_address.insert(key, idx).is_some() {
                return Err(PipelineError::Config(format!(
                    "Pool address {} is listed more than once",
                    pool.address
                )));
            }
            if let Some(tigris) = &pool.tigris_name {
                by_tigris_name.insert(tigris.clone(), idx);
            }
        }
        Ok(Self {
            pools,
            by_address,
            by_tigris_name,
        })
    }

    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let file: RegistryFile = serde_json::from_str(raw)
            .map_err(|e| PipelineError::Config(format!("Invalid pool registry: {}", e)))?;
        Self::from_pools(file.pools)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read pool registry {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json_str(&raw)?;
        info!("📒 Loaded {} pools from {}", registry.len(), path.display());
        Ok(registry)
    }

    /// Resolve a contract address; unknown addresses are a data-shape error for `table`.
    pub fn resolve(&self, table: &str, address: &str) -> Result<&PoolInfo, PipelineError> {
        self.by_address
            .get(&address.to_lowercase())
            .map(|idx| &self.pools[*idx])
            .ok_or_else(|| {
                PipelineError::data_shape(table, format!("unresolved pool address {}", address))
            })
    }

    /// Registry pool name for a Tigris pool name. Falls back to the name itself.
    pub fn tigris_pool_name(&self, tigris_name: &str) -> String {
        self.by_tigris_name
            .get(tigris_name)
            .map(|idx| self.pools[*idx].name.clone())
            .unwrap_or_else(|| tigris_name.to_string())
    }

    pub fn pool_names(&self) -> Vec<String> {
        self.pools.iter().map(|p| p.name.clone()).collect()
    }

    pub fn pools(&self) -> &[PoolInfo] {
        &self.pools
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn test_registry() -> PoolRegistry {
    let pool = |address: &str, name: &str, token0: &str, token1: &str| PoolInfo {
        address: address.to_string(),
        name: name.to_string(),
        token0: token0.to_string(),
        token1: token1.to_string(),
        tigris_name: None,
    };
    PoolRegistry::from_pools(vec![
        pool("0xAAA", "MUSD/BTC", "MUSD", "BTC"),
        pool("0xBBB", "MUSD/mUSDC", "MUSD", "mUSDC"),
        pool("0xCCC", "BTC/mSolvBTC", "BTC", "mSolvBTC"),
        pool("0xDDD", "mUSDC/BTC", "mUSDC", "BTC"),
        pool("0xEEE", "MUSD/mT", "MUSD", "mT"),
    ])
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_is_case_insensitive() {
        let registry = test_registry();
        assert_eq!(registry.resolve("mints", "0xaaa").unwrap().name, "MUSD/BTC");
        assert_eq!(registry.resolve("mints", "0xAaA").unwrap().name, "MUSD/BTC");
    }

    #[test]
    fn test_unresolved_address_names_the_address() {
        let registry = test_registry();
        let err = registry.resolve("burns", "0xdead").unwrap_err();
        assert!(err.to_string().contains("0xdead"));
        assert!(err.to_string().contains("burns"));
    }

    #[test]
    fn test_registry_file_parsing() {
        let raw = r#"{
            "pools": [
                { "address": "0x1", "name": "MUSD/BTC", "token0": "MUSD", "token1": "BTC", "tigris_name": "vAMM-MUSD/BTC" }
            ]
        }"#;
        let registry = PoolRegistry::from_json_str(raw).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.tigris_pool_name("vAMM-MUSD/BTC"), "MUSD/BTC");
        assert_eq!(registry.tigris_pool_name("other"), "other");
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let pool = PoolInfo {
            address: "0x1".to_string(),
            name: "A".to_string(),
            token0: "MUSD".to_string(),
            token1: "BTC".to_string(),
            tigris_name: None,
        };
        let mut dup = pool.clone();
        dup.address = "0X1".to_string();
        assert!(PoolRegistry::from_pools(vec![pool, dup]).is_err());
    }
}
