use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

use crate::{
    clients::{bigquery::BigQueryClient, explorer::ExplorerClient, price_feed::PriceFeedClient, subgraph::SubgraphClient},
    config::{pool_registry::PoolRegistry, Config},
    utils::{
        database::ArcDbPool,
        snapshot::{dump_json, SnapshotWriter},
    },
};

/// Per-run switches from the command line.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub skip_warehouse: bool,
    pub skip_database: bool,
    pub snapshot_dir: Option<PathBuf>,
    pub dump_dir: Option<PathBuf>,
    /// Also pull explorer transactions for every registry pool
    pub explorer_transactions: bool,
}

/// Clients and sinks built once in `main` and lent to a pipeline run.
pub struct PipelineContext<'a> {
    pub config: &'a Config,
    pub registry: &'a PoolRegistry,
    pub subgraph: &'a SubgraphClient,
    pub price_feed: &'a PriceFeedClient,
    pub explorer: &'a ExplorerClient,
    pub warehouse: Option<&'a BigQueryClient>,
    pub db_pool: Option<ArcDbPool>,
    pub options: RunOptions,
}

impl<'a> PipelineContext<'a> {
    /// Warehouse client unless disabled for this run.
    pub fn warehouse(&self) -> Option<&'a BigQueryClient> {
        if self.options.skip_warehouse {
            return None;
        }
        self.warehouse
    }

    pub fn db_pool(&self) -> Option<&ArcDbPool> {
        if self.options.skip_database {
            return None;
        }
        self.db_pool.as_ref()
    }

    pub async fn ensure_datasets(&self, datasets: &[&str]) -> Result<()> {
        let Some(warehouse) = self.warehouse() else {
            return Ok(());
        };
        for dataset in datasets {
            warehouse
                .ensure_dataset(dataset)
                .await
                .with_context(|| format!("Failed to prepare dataset {}", dataset))?;
        }
        Ok(())
    }

    /// Append rows whose `id_column` is new to `dataset.table`.
    pub async fn append<T: Serialize>(&self, dataset: &str, table: &str, rows: &[T], id_column: &str) -> Result<()> {
        let Some(warehouse) = self.warehouse() else {
            return Ok(());
        };
        let uploaded = warehouse
            .update_table(dataset, table, rows, id_column)
            .await
            .with_context(|| format!("Failed to upload {}.{}", dataset, table))?;
        info!("✅ {}.{}: {} new rows", dataset, table, uploaded);
        Ok(())
    }

    /// Merge rows into `dataset.table` on `keys`.
    pub async fn upsert<T: Serialize>(&self, dataset: &str, table: &str, rows: &[T], keys: &[&str]) -> Result<()> {
        let Some(warehouse) = self.warehouse() else {
            return Ok(());
        };
        let upserted = warehouse
            .upsert_table(dataset, table, rows, keys)
            .await
            .with_context(|| format!("Failed to upsert {}.{}", dataset, table))?;
        info!("✅ {}.{}: {} rows upserted", dataset, table, upserted);
        Ok(())
    }

    /// Write `rows` to the dump directory when one is configured.
    pub async fn dump<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        if let Some(dir) = &self.options.dump_dir {
            dump_json(dir, name, rows).await?;
        }
        Ok(())
    }

    pub async fn write_snapshot(&self, pipeline: &str, metrics: Value) -> Result<()> {
        if let Some(dir) = &self.options.snapshot_dir {
            SnapshotWriter::new(dir).write(pipeline, metrics).await?;
        }
        Ok(())
    }
}
