use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use diesel::{
    query_builder::{QueryFragment, QueryId},
    upsert::excluded,
    ExpressionMethods,
};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::context::PipelineContext;
use crate::{
    clients::queries::{SWAPS, SWAP_FEES},
    config::pool_registry::PoolRegistry,
    db::{
        common::models::swap_models::{NewDailySwapMetric, NewSwapPoolMetric},
        postgres::schema::{daily_swap_metrics, swap_pool_metrics},
    },
    errors::PipelineError,
    processors::events::{
        normalizer::{NormalizedFee, NormalizedSwap, PriceTable, TokenNormalizer},
        raw_events::{parse_records, RawFee, RawSwap},
        volume_calculator::{SwapMetrics, SwapRecord, VolumeCalculator},
    },
    utils::database::{chunk_size, execute_in_chunks, ArcDbPool, Backend},
};

pub const PIPELINE_NAME: &str = "swaps";

#[derive(Debug, Clone, Default)]
pub struct SwapsRawData {
    pub swaps: Vec<Value>,
    pub fees: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct SwapsOutput {
    pub swaps: Vec<NormalizedSwap>,
    pub fees: Vec<NormalizedFee>,
    pub metrics: SwapMetrics,
}

/// Swap joined with its fee, before volume attribution.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SwapWithFee {
    pub timestamp: i64,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub amount0_in_usd: f64,
    pub amount1_in_usd: f64,
    pub amount0_out_usd: f64,
    pub amount1_out_usd: f64,
    pub fee0_usd: Option<f64>,
    pub fee1_usd: Option<f64>,
    pub user: Option<String>,
    pub transaction_hash: String,
}

impl From<&SwapRecord> for SwapWithFee {
    fn from(r: &SwapRecord) -> Self {
        Self {
            timestamp: r.timestamp,
            pool: r.pool.clone(),
            token0: r.token0.clone(),
            token1: r.token1.clone(),
            amount0_in_usd: r.amount0_in_usd,
            amount1_in_usd: r.amount1_in_usd,
            amount0_out_usd: r.amount0_out_usd,
            amount1_out_usd: r.amount1_out_usd,
            fee0_usd: r.fee0_usd,
            fee1_usd: r.fee1_usd,
            user: r.user.clone(),
            transaction_hash: r.transaction_hash.clone(),
        }
    }
}

/// Normalize swaps and fees, join them and roll up. No I/O.
pub fn compute_swap_metrics(
    registry: &PoolRegistry,
    raw: &SwapsRawData,
    prices: &PriceTable,
    as_of: NaiveDate,
) -> Result<SwapsOutput, PipelineError> {
    let swaps: Vec<RawSwap> = parse_records(SWAPS.entity, &raw.swaps)?;
    let fees: Vec<RawFee> = parse_records(SWAP_FEES.entity, &raw.fees)?;

    let normalizer = TokenNormalizer::new(registry, prices);
    let swaps = normalizer.normalize_swaps(&swaps)?;
    let fees = normalizer.normalize_fees(&fees)?;

    let metrics = VolumeCalculator::new().calculate(&swaps, &fees, &registry.pool_names(), as_of)?;
    Ok(SwapsOutput { swaps, fees, metrics })
}

pub struct SwapsProcessor<'a> {
    ctx: &'a PipelineContext<'a>,
}

impl<'a> SwapsProcessor<'a> {
    pub fn new(ctx: &'a PipelineContext<'a>) -> Self {
        info!("🚀 Creating SwapsProcessor with input-leg volume attribution");
        Self { ctx }
    }

    pub async fn run(&self) -> Result<SwapsOutput> {
        let raw = self.fetch().await?;
        let prices = self.ctx.price_feed.fetch_prices().await.context("Failed to fetch token prices")?;
        let output = compute_swap_metrics(self.ctx.registry, &raw, &prices, Utc::now().date_naive())
            .context("Failed to compute swap metrics")?;
        self.log_summary(&output.metrics);

        self.dump(&output).await?;
        self.upload_warehouse(&raw, &output).await?;
        self.upsert_database(&output.metrics).await?;
        self.ctx
            .write_snapshot(PIPELINE_NAME, snapshot_json(&output.metrics))
            .await?;

        info!("🎉 Swaps pipeline finished");
        Ok(output)
    }

    async fn fetch(&self) -> Result<SwapsRawData> {
        let url = &self.ctx.config.swaps_subgraph_url;
        let subgraph = self.ctx.subgraph;

        info!("📥 Fetching swaps and fees from {}", url);
        let swaps = subgraph.fetch_all(url, &SWAPS).await.context("Failed to fetch swaps")?;
        info!("✅ Loaded {} swap records", swaps.len());
        let fees = subgraph.fetch_all(url, &SWAP_FEES).await.context("Failed to fetch swap fees")?;
        info!("✅ Loaded {} fee records", fees.len());

        Ok(SwapsRawData { swaps, fees })
    }

    fn log_summary(&self, metrics: &SwapMetrics) {
        let s = &metrics.summary;
        info!("📊 Swap analytics summary ({}):", s.updated_on);
        info!("   Total swap volume: ${:.2}", s.total_volume_usd);
        match s.total_fees_usd {
            Some(fees) => info!("   Total fees generated: ${:.2}", fees),
            None => info!("   Total fees generated: n/a"),
        }
        info!("   Total swaps: {}", s.total_swaps);
        info!("   Unique traders: {}", s.unique_traders);
        info!("   Average swap size: ${:.2} (median ${:.2})", s.avg_swap_size_usd, s.median_swap_size_usd);
        info!("   Last 7 days: ${:.2} over {} swaps", s.volume_7d_usd, s.swaps_7d);
        for pool in metrics.by_pool.iter().take(5) {
            info!("   {:<25} ${:>15.2} ({} swaps)", pool.pool, pool.total_volume_usd, pool.swap_count);
        }
    }

    async fn dump(&self, output: &SwapsOutput) -> Result<()> {
        let ctx = self.ctx;
        ctx.dump("stg_swaps_clean", &output.swaps).await?;
        ctx.dump("stg_swap_fees_clean", &output.fees).await?;
        ctx.dump("swaps_final", &output.metrics.records).await?;
        ctx.dump("swap_pool_metrics", &output.metrics.by_pool).await?;
        ctx.dump("daily_metrics", &output.metrics.by_date).await?;
        ctx.dump("pool_daily_metrics", &output.metrics.by_pool_date).await?;
        ctx.dump("summary_metrics", std::slice::from_ref(&output.metrics.summary)).await?;
        Ok(())
    }

    async fn upload_warehouse(&self, raw: &SwapsRawData, output: &SwapsOutput) -> Result<()> {
        let ctx = self.ctx;
        if ctx.warehouse().is_none() {
            info!("⏭️ Skipping warehouse upload");
            return Ok(());
        }
        ctx.ensure_datasets(&["raw_data", "staging", "intermediate", "marts"]).await?;
        let metrics = &output.metrics;

        info!("📤 Uploading raw swap data");
        ctx.append("raw_data", "swaps_raw", &raw.swaps, "transactionHash_").await?;
        ctx.append("raw_data", "swap_fees_raw", &raw.fees, "transactionHash_").await?;

        info!("📤 Uploading clean swap data to staging");
        ctx.append("staging", "stg_swaps_clean", &output.swaps, "transaction_hash").await?;
        ctx.append("staging", "stg_swap_fees_clean", &output.fees, "transaction_hash").await?;

        info!("📤 Uploading joined and aggregated swap data");
        let joined: Vec<SwapWithFee> = metrics.records.iter().map(SwapWithFee::from).collect();
        ctx.append("intermediate", "int_swaps_with_fees", &joined, "transaction_hash").await?;
        ctx.append("marts", "m_swaps_with_metrics", &metrics.records, "transaction_hash").await?;
        ctx.append("marts", "m_swap_daily_metrics", &metrics.by_date, "date").await?;
        ctx.append("marts", "m_swap_pool_daily_metrics", &metrics.by_pool_date, "date").await?;

        ctx.upsert("marts", "swap_pool_metrics", &metrics.by_pool, &["pool"]).await?;
        ctx.upsert("marts", "swap_summary_metrics", std::slice::from_ref(&metrics.summary), &["updated_on"])
            .await?;
        Ok(())
    }

    async fn upsert_database(&self, metrics: &SwapMetrics) -> Result<()> {
        let Some(pool) = self.ctx.db_pool() else {
            info!("⏭️ Skipping database upsert");
            return Ok(());
        };

        let by_pool: Vec<NewSwapPoolMetric> = metrics.by_pool.iter().map(NewSwapPoolMetric::from).collect();
        let by_date: Vec<NewDailySwapMetric> = metrics.by_date.iter().map(NewDailySwapMetric::from).collect();

        upsert_swap_pool_metrics(pool, &by_pool)
            .await
            .context("Failed to upsert swap_pool_metrics")?;
        upsert_daily_swap_metrics(pool, &by_date)
            .await
            .context("Failed to upsert daily_swap_metrics")?;
        Ok(())
    }
}

pub fn snapshot_json(metrics: &SwapMetrics) -> Value {
    json!({
        "summary": metrics.summary,
        "pool_metrics": metrics.by_pool,
        "daily_metrics": metrics.by_date,
        "pool_daily_metrics": metrics.by_pool_date,
    })
}

fn upsert_swap_pool_metrics_query(items: Vec<NewSwapPoolMetric>) -> impl QueryFragment<Backend> + QueryId + Send {
    diesel::insert_into(swap_pool_metrics::table)
        .values(items)
        .on_conflict(swap_pool_metrics::pool)
        .do_update()
        .set((
            swap_pool_metrics::total_volume_usd.eq(excluded(swap_pool_metrics::total_volume_usd)),
            swap_pool_metrics::total_fees_usd.eq(excluded(swap_pool_metrics::total_fees_usd)),
            swap_pool_metrics::swap_count.eq(excluded(swap_pool_metrics::swap_count)),
            swap_pool_metrics::unique_traders.eq(excluded(swap_pool_metrics::unique_traders)),
            swap_pool_metrics::avg_swap_size_usd.eq(excluded(swap_pool_metrics::avg_swap_size_usd)),
            swap_pool_metrics::updated_at.eq(diesel::dsl::now),
        ))
}

fn upsert_daily_swap_metrics_query(items: Vec<NewDailySwapMetric>) -> impl QueryFragment<Backend> + QueryId + Send {
    diesel::insert_into(daily_swap_metrics::table)
        .values(items)
        .on_conflict(daily_swap_metrics::date)
        .do_update()
        .set((
            daily_swap_metrics::daily_volume_usd.eq(excluded(daily_swap_metrics::daily_volume_usd)),
            daily_swap_metrics::daily_fees_usd.eq(excluded(daily_swap_metrics::daily_fees_usd)),
            daily_swap_metrics::swap_count.eq(excluded(daily_swap_metrics::swap_count)),
            daily_swap_metrics::unique_traders.eq(excluded(daily_swap_metrics::unique_traders)),
            daily_swap_metrics::avg_swap_size_usd.eq(excluded(daily_swap_metrics::avg_swap_size_usd)),
            daily_swap_metrics::cumulative_volume_usd.eq(excluded(daily_swap_metrics::cumulative_volume_usd)),
            daily_swap_metrics::cumulative_fees_usd.eq(excluded(daily_swap_metrics::cumulative_fees_usd)),
            daily_swap_metrics::volume_ma7.eq(excluded(daily_swap_metrics::volume_ma7)),
            daily_swap_metrics::volume_ma30.eq(excluded(daily_swap_metrics::volume_ma30)),
            daily_swap_metrics::updated_at.eq(diesel::dsl::now),
        ))
}

async fn upsert_swap_pool_metrics(pool: &ArcDbPool, rows: &[NewSwapPoolMetric]) -> Result<()> {
    if rows.is_empty() {
        warn!("⚠️ No swap pool metrics to upsert");
        return Ok(());
    }
    let affected =
        execute_in_chunks(pool, upsert_swap_pool_metrics_query, rows, chunk_size::<NewSwapPoolMetric>()).await?;
    info!("✅ Upserted {} swap pool metric rows", affected);
    Ok(())
}

async fn upsert_daily_swap_metrics(pool: &ArcDbPool, rows: &[NewDailySwapMetric]) -> Result<()> {
    if rows.is_empty() {
        warn!("⚠️ No daily swap metrics to upsert");
        return Ok(());
    }
    let affected =
        execute_in_chunks(pool, upsert_daily_swap_metrics_query, rows, chunk_size::<NewDailySwapMetric>()).await?;
    info!("✅ Upserted {} daily swap metric rows", affected);
    Ok(())
}
