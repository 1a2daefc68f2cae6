// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! # Mezo Analytics CLI
//!
//! Runs one batch pipeline per invocation:
//! - `pools`: liquidity flows, TVL, Tigris volume and fees, pool health
//! - `swaps`: swap volume attribution, fee joins and rollups
//!
//! Configuration comes from the environment (and `.env`); see `config`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mezo_analytics::{
    clients::{
        bigquery::BigQueryClient,
        explorer::ExplorerClient,
        http::{HttpTransport, ReqwestTransport},
        price_feed::PriceFeedClient,
        retry::RetryPolicy,
        subgraph::SubgraphClient,
    },
    config::{pool_registry::PoolRegistry, Config},
    processors::{
        context::{PipelineContext, RunOptions},
        pools_processor::PoolsProcessor,
        swaps_processor::SwapsProcessor,
    },
    utils::database::{new_db_pool, run_migrations, ArcDbPool, TlsVerification},
};
use std::{path::PathBuf, sync::Arc};
use strum::Display;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Configure jemalloc as the global allocator for better memory management
#[cfg(unix)]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Debug, Parser)]
#[command(name = "mezo-analytics", version, about = "Mezo pool and swap analytics pipelines")]
struct Cli {
    #[command(subcommand)]
    pipeline: Pipeline,

    /// Do not upload anything to BigQuery
    #[arg(long, global = true)]
    skip_warehouse: bool,

    /// Do not upsert into the application database
    #[arg(long, global = true)]
    skip_database: bool,

    /// Directory for per-run metrics snapshots
    #[arg(long, global = true, default_value = "metrics_snapshots")]
    snapshot_dir: PathBuf,

    /// Write intermediate tables as JSON to this directory
    #[arg(long, global = true)]
    dump_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Display)]
#[strum(serialize_all = "lowercase")]
enum Pipeline {
    /// Liquidity, TVL, volume, fees and pool health
    Pools {
        /// Also pull block explorer transactions for every registry pool
        #[arg(long)]
        explorer_transactions: bool,
    },
    /// Swap volume and fees
    Swaps,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Pipelines are sequential; a single-threaded runtime is enough
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build async runtime")?
        .block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    info!("🚀 Starting {} pipeline", cli.pipeline);

    let config = Config::from_env().context("Failed to load configuration")?;
    config.log_summary();
    let registry = PoolRegistry::load(&config.pool_registry_path)?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(config.request_timeout)?);
    let subgraph = SubgraphClient::new(transport.clone(), config.request_delay);
    let explorer = ExplorerClient::new(transport.clone(), &config.explorer_api_url, config.request_delay);
    let price_feed = PriceFeedClient::new(
        transport.clone(),
        &config.coingecko_api_url,
        config.coingecko_key.clone(),
        RetryPolicy::new(config.price_max_retries, config.price_retry_base),
    );

    let warehouse = match (&config.bigquery_access_token, cli.skip_warehouse) {
        (_, true) => None,
        (Some(token), false) => Some(BigQueryClient::new(transport.clone(), &config.bigquery_project_id, token)),
        (None, false) => {
            warn!("⚠️ BIGQUERY_ACCESS_TOKEN not set, warehouse uploads disabled");
            None
        },
    };

    let db_pool = if cli.skip_database {
        None
    } else {
        connect_database(&config).await?
    };

    let explorer_transactions = matches!(cli.pipeline, Pipeline::Pools { explorer_transactions: true });
    let ctx = PipelineContext {
        config: &config,
        registry: &registry,
        subgraph: &subgraph,
        price_feed: &price_feed,
        explorer: &explorer,
        warehouse: warehouse.as_ref(),
        db_pool,
        options: RunOptions {
            skip_warehouse: cli.skip_warehouse,
            skip_database: cli.skip_database,
            snapshot_dir: Some(cli.snapshot_dir),
            dump_dir: cli.dump_dir,
            explorer_transactions,
        },
    };

    match cli.pipeline {
        Pipeline::Pools { .. } => {
            PoolsProcessor::new(&ctx).run().await?;
        },
        Pipeline::Swaps => {
            SwapsProcessor::new(&ctx).run().await?;
        },
    }
    Ok(())
}

async fn connect_database(config: &Config) -> Result<Option<ArcDbPool>> {
    let Some(url) = &config.database_url else {
        warn!("⚠️ DATABASE_URL not set, database upserts disabled");
        return Ok(None);
    };

    let verification = TlsVerification::from_accept_invalid(config.database_accept_invalid_certs);
    info!("🔧 Running database migrations");
    run_migrations(url, verification).await.context("Failed to run migrations")?;
    let pool = new_db_pool(url, config.db_pool_size, verification)
        .await
        .context("Failed to create database pool")?;
    info!("✅ Database pool ready ({} connections)", config.db_pool_size);
    Ok(Some(pool))
}
