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
    clients::{
        explorer::ExplorerTransaction,
        queries::{POOL_DEPOSITS, POOL_FEES, POOL_VOLUMES, POOL_WITHDRAWALS},
    },
    config::pool_registry::PoolRegistry,
    db::{
        common::models::pool_models::{NewDailyPoolMetric, NewPoolHealthMetric, NewPoolTvlSnapshot},
        postgres::schema::{daily_pool_metrics, pool_health_metrics, pool_tvl_snapshots},
    },
    errors::PipelineError,
    processors::events::{
        bucket_calculator::BucketCalculator,
        health_calculator::{HealthCalculator, PoolHealthMetric, PoolsSummary},
        normalizer::{NormalizedPoolStat, NormalizedTransaction, PriceTable, TokenNormalizer, TransactionType},
        pool_stats_calculator::{DailyPoolFees, DailyPoolVolume, DailyProtocolTotal, PoolStatsCalculator},
        raw_events::{parse_records, RawEvent, RawPoolStat},
        rolling::mean,
        tvl_calculator::{TvlCalculator, TvlMetrics},
        volume_calculator::SUMMARY_TRAILING_DAYS,
    },
    utils::database::{chunk_size, execute_in_chunks, ArcDbPool, Backend},
};

pub const PIPELINE_NAME: &str = "pools";

/// Subgraph records exactly as fetched.
#[derive(Debug, Clone, Default)]
pub struct PoolsRawData {
    pub deposits: Vec<Value>,
    pub withdrawals: Vec<Value>,
    pub volumes: Vec<Value>,
    pub fees: Vec<Value>,
}

/// Everything the pools pipeline computes before the first upload.
#[derive(Debug, Clone)]
pub struct PoolsMetrics {
    pub deposits: Vec<NormalizedTransaction>,
    pub withdrawals: Vec<NormalizedTransaction>,
    pub volumes: Vec<NormalizedPoolStat>,
    pub fees: Vec<NormalizedPoolStat>,
    pub tvl: TvlMetrics,
    pub daily_volume: Vec<DailyPoolVolume>,
    pub protocol_volume: Vec<DailyProtocolTotal>,
    pub daily_fees: Vec<DailyPoolFees>,
    pub protocol_fees: Vec<DailyProtocolTotal>,
    pub health: Vec<PoolHealthMetric>,
    pub summary: Option<PoolsSummary>,
}

impl PoolsMetrics {
    /// Health rows of the most recent day, one per pool.
    pub fn latest_health(&self) -> Vec<&PoolHealthMetric> {
        let Some(latest) = self.health.iter().map(|h| h.date).max() else {
            return Vec::new();
        };
        self.health.iter().filter(|h| h.date == latest).collect()
    }
}

/// Console and snapshot headline numbers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolsHeadline {
    pub total_tvl_usd: f64,
    pub volume_7d_usd: f64,
    pub fees_7d_usd: f64,
    pub active_pools: i64,
    pub avg_fee_apy_pct: f64,
    pub avg_efficiency_score: f64,
}

/// Normalize and aggregate one run's worth of pool data. No I/O.
pub fn compute_pool_metrics(
    registry: &PoolRegistry,
    raw: &PoolsRawData,
    prices: &PriceTable,
) -> Result<PoolsMetrics, PipelineError> {
    let deposits: Vec<RawEvent> = parse_records(POOL_DEPOSITS.entity, &raw.deposits)?;
    let withdrawals: Vec<RawEvent> = parse_records(POOL_WITHDRAWALS.entity, &raw.withdrawals)?;
    let volumes: Vec<RawPoolStat> = parse_records(POOL_VOLUMES.entity, &raw.volumes)?;
    let fees: Vec<RawPoolStat> = parse_records(POOL_FEES.entity, &raw.fees)?;

    let normalizer = TokenNormalizer::new(registry, prices);
    let deposits = normalizer.normalize_liquidity_events(POOL_DEPOSITS.entity, &deposits, TransactionType::Deposit)?;
    let withdrawals =
        normalizer.normalize_liquidity_events(POOL_WITHDRAWALS.entity, &withdrawals, TransactionType::Withdrawal)?;
    let volumes = normalizer.normalize_pool_stats(POOL_VOLUMES.entity, &volumes)?;
    let fees = normalizer.normalize_pool_stats(POOL_FEES.entity, &fees)?;

    let tvl = TvlCalculator::new().calculate(&deposits, &withdrawals)?;

    let stats = PoolStatsCalculator::new();
    let daily_volume = stats.daily_volume(&volumes);
    let protocol_volume = stats.protocol_totals(&daily_volume, |v| (v.date, v.daily_total_volume_usd));
    let daily_fees = stats.daily_fees(&fees);
    let protocol_fees = stats.protocol_totals(&daily_fees, |f| (f.date, f.daily_total_fees_usd));

    let health_calculator = HealthCalculator::default();
    let health = health_calculator.calculate(&tvl.daily_pool, &daily_volume, &daily_fees);
    let summary = health_calculator.summarize(&health);

    Ok(PoolsMetrics {
        deposits,
        withdrawals,
        volumes,
        fees,
        tvl,
        daily_volume,
        protocol_volume,
        daily_fees,
        protocol_fees,
        health,
        summary,
    })
}

/// Trailing-week totals are taken over `today - 6 ..= today`.
pub fn headline(metrics: &PoolsMetrics, today: NaiveDate) -> PoolsHeadline {
    let since = BucketCalculator::new().trailing_window_start(today, SUMMARY_TRAILING_DAYS);
    let latest = metrics.latest_health();
    let apys: Vec<f64> = latest.iter().map(|h| h.fee_apy).collect();
    let scores: Vec<f64> = latest.iter().map(|h| h.efficiency_score).collect();

    PoolsHeadline {
        total_tvl_usd: metrics.tvl.snapshot.iter().map(|s| s.current_tvl_usd).sum(),
        volume_7d_usd: metrics
            .daily_volume
            .iter()
            .filter(|v| v.date >= since)
            .map(|v| v.daily_total_volume_usd)
            .sum(),
        fees_7d_usd: metrics
            .daily_fees
            .iter()
            .filter(|f| f.date >= since)
            .map(|f| f.daily_total_fees_usd)
            .sum(),
        active_pools: metrics.tvl.snapshot.iter().filter(|s| s.current_tvl_usd > 0.0).count() as i64,
        avg_fee_apy_pct: mean(&apys).unwrap_or(0.0) * 100.0,
        avg_efficiency_score: mean(&scores).unwrap_or(0.0),
    }
}

pub struct PoolsProcessor<'a> {
    ctx: &'a PipelineContext<'a>,
}

impl<'a> PoolsProcessor<'a> {
    pub fn new(ctx: &'a PipelineContext<'a>) -> Self {
        info!("🚀 Creating PoolsProcessor for {} registry pools", ctx.registry.len());
        Self { ctx }
    }

    /// Fetch, compute, then upload. Nothing is written until every metric is ready.
    pub async fn run(&self) -> Result<PoolsMetrics> {
        let raw = self.fetch().await?;
        let prices = self.ctx.price_feed.fetch_prices().await.context("Failed to fetch token prices")?;
        let metrics = compute_pool_metrics(self.ctx.registry, &raw, &prices).context("Failed to compute pool metrics")?;
        let explorer_transactions = self.fetch_explorer_transactions().await?;

        let today = Utc::now().date_naive();
        let headline = headline(&metrics, today);
        self.log_headline(&metrics, &headline);

        self.dump(&metrics, &explorer_transactions).await?;
        self.upload_warehouse(&raw, &metrics, &explorer_transactions).await?;
        self.upsert_database(&metrics).await?;
        self.ctx
            .write_snapshot(PIPELINE_NAME, snapshot_json(&metrics, &headline))
            .await?;

        info!("🎉 Pools pipeline finished");
        Ok(metrics)
    }

    async fn fetch(&self) -> Result<PoolsRawData> {
        let config = self.ctx.config;
        let subgraph = self.ctx.subgraph;
        let mut raw = PoolsRawData::default();
        for (target, url, query) in [
            (&mut raw.deposits, &config.pools_subgraph_url, &POOL_DEPOSITS),
            (&mut raw.withdrawals, &config.pools_subgraph_url, &POOL_WITHDRAWALS),
            (&mut raw.volumes, &config.tigris_pools_subgraph_url, &POOL_VOLUMES),
            (&mut raw.fees, &config.tigris_pools_subgraph_url, &POOL_FEES),
        ] {
            info!("📥 Fetching {} from {}", query.entity, url);
            *target = subgraph
                .fetch_all(url, query)
                .await
                .with_context(|| format!("Failed to fetch {}", query.entity))?;
            info!("✅ Loaded {} {} records", target.len(), query.entity);
        }
        Ok(raw)
    }

    async fn fetch_explorer_transactions(&self) -> Result<Vec<ExplorerTransaction>> {
        if !self.ctx.options.explorer_transactions {
            return Ok(Vec::new());
        }
        let mut all = Vec::new();
        for pool in self.ctx.registry.pools() {
            let txs = self
                .ctx
                .explorer
                .address_transactions(&pool.name, &pool.address)
                .await
                .with_context(|| format!("Failed to fetch explorer transactions for {}", pool.name))?;
            all.extend(txs);
        }
        info!("🔎 Loaded {} explorer transactions across {} pools", all.len(), self.ctx.registry.len());
        Ok(all)
    }

    fn log_headline(&self, metrics: &PoolsMetrics, headline: &PoolsHeadline) {
        info!("💰 Liquidity pools summary:");
        info!("   Total TVL: ${:.2}", headline.total_tvl_usd);
        info!("   7-day volume: ${:.2}", headline.volume_7d_usd);
        info!("   7-day fees: ${:.2}", headline.fees_7d_usd);
        info!("   Active pools: {}", headline.active_pools);
        info!("   Average fee APY: {:.2}%", headline.avg_fee_apy_pct);
        info!("   Average efficiency score: {:.1}/100", headline.avg_efficiency_score);
        for snapshot in metrics.tvl.snapshot.iter().filter(|s| s.current_tvl_usd > 0.0) {
            info!("   {:<25} ${:>15.2}", snapshot.pool, snapshot.current_tvl_usd);
        }
    }

    async fn dump(&self, metrics: &PoolsMetrics, explorer_transactions: &[ExplorerTransaction]) -> Result<()> {
        let ctx = self.ctx;
        ctx.dump("pool_deposits_clean", &metrics.deposits).await?;
        ctx.dump("pool_withdrawals_clean", &metrics.withdrawals).await?;
        ctx.dump("pool_volume_clean", &metrics.volumes).await?;
        ctx.dump("pool_fees_clean", &metrics.fees).await?;
        ctx.dump("pool_liquidity_flows", &metrics.tvl.flows).await?;
        ctx.dump("daily_pool_tvl", &metrics.tvl.daily_pool).await?;
        ctx.dump("daily_protocol_tvl", &metrics.tvl.daily_protocol).await?;
        ctx.dump("daily_pool_volume", &metrics.daily_volume).await?;
        ctx.dump("daily_pool_fees", &metrics.daily_fees).await?;
        ctx.dump("pool_health_metrics", &metrics.health).await?;
        if !explorer_transactions.is_empty() {
            ctx.dump("pool_explorer_transactions", explorer_transactions).await?;
        }
        Ok(())
    }

    async fn upload_warehouse(
        &self,
        raw: &PoolsRawData,
        metrics: &PoolsMetrics,
        explorer_transactions: &[ExplorerTransaction],
    ) -> Result<()> {
        let ctx = self.ctx;
        if ctx.warehouse().is_none() {
            info!("⏭️ Skipping warehouse upload");
            return Ok(());
        }
        ctx.ensure_datasets(&["raw_data", "staging", "marts"]).await?;

        info!("📤 Uploading raw pool data");
        ctx.append("raw_data", "pool_deposits_raw", &raw.deposits, "transactionHash_").await?;
        ctx.append("raw_data", "pool_withdrawals_raw", &raw.withdrawals, "transactionHash_").await?;
        ctx.append("raw_data", "pool_volume_raw", &raw.volumes, "id").await?;
        ctx.append("raw_data", "pool_fees_raw", &raw.fees, "id").await?;
        if !explorer_transactions.is_empty() {
            ctx.append("raw_data", "pool_explorer_transactions_raw", explorer_transactions, "hash").await?;
        }

        info!("📤 Uploading clean pool data to staging");
        ctx.append("staging", "pool_deposits_clean", &metrics.deposits, "transaction_hash").await?;
        ctx.append("staging", "pool_withdrawals_clean", &metrics.withdrawals, "transaction_hash").await?;
        ctx.append("staging", "pool_volume_clean", &metrics.volumes, "id").await?;
        ctx.append("staging", "pool_fees_clean", &metrics.fees, "id").await?;

        info!("📤 Upserting pool snapshots");
        ctx.upsert("marts", "m_pools_tvl_snapshot", &metrics.tvl.snapshot, &["pool"]).await?;
        ctx.upsert("marts", "m_pools_efficiency", &metrics.latest_health(), &["pool"]).await?;

        info!("📤 Uploading daily pool series to marts");
        ctx.append("marts", "m_pools_daily_tvl_by_pool", &metrics.tvl.daily_pool, "date").await?;
        ctx.append("marts", "m_pools_daily_tvl", &metrics.tvl.daily_protocol, "date").await?;
        ctx.append("marts", "m_pools_daily_volume_by_pool", &metrics.daily_volume, "date").await?;
        ctx.append("marts", "m_pools_daily_volume", &metrics.protocol_volume, "date").await?;
        ctx.append("marts", "m_pools_daily_fees_by_pool", &metrics.daily_fees, "date").await?;
        ctx.append("marts", "m_pools_daily_fees", &metrics.protocol_fees, "date").await?;
        Ok(())
    }

    async fn upsert_database(&self, metrics: &PoolsMetrics) -> Result<()> {
        let Some(pool) = self.ctx.db_pool() else {
            info!("⏭️ Skipping database upsert");
            return Ok(());
        };

        let snapshots: Vec<NewPoolTvlSnapshot> = metrics.tvl.snapshot.iter().map(NewPoolTvlSnapshot::from).collect();
        let daily: Vec<NewDailyPoolMetric> = metrics
            .tvl
            .daily_pool
            .iter()
            .map(NewDailyPoolMetric::from)
            .chain(metrics.tvl.daily_protocol.iter().map(NewDailyPoolMetric::from))
            .collect();
        let health: Vec<NewPoolHealthMetric> = metrics.health.iter().map(NewPoolHealthMetric::from).collect();

        upsert_tvl_snapshots(pool, &snapshots)
            .await
            .context("Failed to upsert pool_tvl_snapshots")?;
        upsert_daily_pool_metrics(pool, &daily)
            .await
            .context("Failed to upsert daily_pool_metrics")?;
        upsert_pool_health_metrics(pool, &health)
            .await
            .context("Failed to upsert pool_health_metrics")?;
        Ok(())
    }
}

pub fn snapshot_json(metrics: &PoolsMetrics, headline: &PoolsHeadline) -> Value {
    json!({
        "tvl_snapshot": metrics.tvl.snapshot,
        "efficiency_metrics": metrics.latest_health(),
        "daily_pool_tvl": metrics.tvl.daily_pool,
        "daily_protocol_tvl": metrics.tvl.daily_protocol,
        "daily_pool_volume": metrics.daily_volume,
        "daily_pool_volume_all": metrics.protocol_volume,
        "daily_pool_fees": metrics.daily_fees,
        "daily_pool_fees_all": metrics.protocol_fees,
        "summary": metrics.summary,
        "total_tvl": headline.total_tvl_usd,
        "active_pools": headline.active_pools,
        "volume_7d": headline.volume_7d_usd,
        "fees_7d": headline.fees_7d_usd,
        "avg_fee_apy_pct": headline.avg_fee_apy_pct,
        "avg_efficiency_score": headline.avg_efficiency_score,
    })
}

fn upsert_tvl_snapshots_query(items: Vec<NewPoolTvlSnapshot>) -> impl QueryFragment<Backend> + QueryId + Send {
    diesel::insert_into(pool_tvl_snapshots::table)
        .values(items)
        .on_conflict(pool_tvl_snapshots::pool)
        .do_update()
        .set((
            pool_tvl_snapshots::token0.eq(excluded(pool_tvl_snapshots::token0)),
            pool_tvl_snapshots::token1.eq(excluded(pool_tvl_snapshots::token1)),
            pool_tvl_snapshots::current_tvl_usd.eq(excluded(pool_tvl_snapshots::current_tvl_usd)),
            pool_tvl_snapshots::current_tvl_token0_usd.eq(excluded(pool_tvl_snapshots::current_tvl_token0_usd)),
            pool_tvl_snapshots::current_tvl_token1_usd.eq(excluded(pool_tvl_snapshots::current_tvl_token1_usd)),
            pool_tvl_snapshots::first_transaction.eq(excluded(pool_tvl_snapshots::first_transaction)),
            pool_tvl_snapshots::last_transaction.eq(excluded(pool_tvl_snapshots::last_transaction)),
            pool_tvl_snapshots::total_transactions.eq(excluded(pool_tvl_snapshots::total_transactions)),
            pool_tvl_snapshots::unique_users.eq(excluded(pool_tvl_snapshots::unique_users)),
            pool_tvl_snapshots::updated_at.eq(diesel::dsl::now),
        ))
}

fn upsert_daily_pool_metrics_query(items: Vec<NewDailyPoolMetric>) -> impl QueryFragment<Backend> + QueryId + Send {
    diesel::insert_into(daily_pool_metrics::table)
        .values(items)
        .on_conflict((daily_pool_metrics::date, daily_pool_metrics::pool))
        .do_update()
        .set((
            daily_pool_metrics::tvl_usd.eq(excluded(daily_pool_metrics::tvl_usd)),
            daily_pool_metrics::tvl_token0_usd.eq(excluded(daily_pool_metrics::tvl_token0_usd)),
            daily_pool_metrics::tvl_token1_usd.eq(excluded(daily_pool_metrics::tvl_token1_usd)),
            daily_pool_metrics::daily_net_flow_usd.eq(excluded(daily_pool_metrics::daily_net_flow_usd)),
            daily_pool_metrics::daily_deposits_usd.eq(excluded(daily_pool_metrics::daily_deposits_usd)),
            daily_pool_metrics::daily_withdrawals_usd.eq(excluded(daily_pool_metrics::daily_withdrawals_usd)),
            daily_pool_metrics::transaction_count.eq(excluded(daily_pool_metrics::transaction_count)),
            daily_pool_metrics::deposit_count.eq(excluded(daily_pool_metrics::deposit_count)),
            daily_pool_metrics::withdrawal_count.eq(excluded(daily_pool_metrics::withdrawal_count)),
            daily_pool_metrics::unique_users.eq(excluded(daily_pool_metrics::unique_users)),
            daily_pool_metrics::active_pools.eq(excluded(daily_pool_metrics::active_pools)),
            daily_pool_metrics::tvl_change.eq(excluded(daily_pool_metrics::tvl_change)),
            daily_pool_metrics::tvl_change_pct.eq(excluded(daily_pool_metrics::tvl_change_pct)),
            daily_pool_metrics::tvl_usd_ma7.eq(excluded(daily_pool_metrics::tvl_usd_ma7)),
            daily_pool_metrics::daily_net_flow_ma7.eq(excluded(daily_pool_metrics::daily_net_flow_ma7)),
            daily_pool_metrics::updated_at.eq(diesel::dsl::now),
        ))
}

fn upsert_pool_health_metrics_query(items: Vec<NewPoolHealthMetric>) -> impl QueryFragment<Backend> + QueryId + Send {
    diesel::insert_into(pool_health_metrics::table)
        .values(items)
        .on_conflict((pool_health_metrics::date, pool_health_metrics::pool))
        .do_update()
        .set((
            pool_health_metrics::tvl_usd.eq(excluded(pool_health_metrics::tvl_usd)),
            pool_health_metrics::daily_volume_usd.eq(excluded(pool_health_metrics::daily_volume_usd)),
            pool_health_metrics::daily_fees_usd.eq(excluded(pool_health_metrics::daily_fees_usd)),
            pool_health_metrics::daily_net_flow_usd.eq(excluded(pool_health_metrics::daily_net_flow_usd)),
            pool_health_metrics::volume_tvl_ratio.eq(excluded(pool_health_metrics::volume_tvl_ratio)),
            pool_health_metrics::fee_apy.eq(excluded(pool_health_metrics::fee_apy)),
            pool_health_metrics::flow_stability.eq(excluded(pool_health_metrics::flow_stability)),
            pool_health_metrics::flow_stability_normalized.eq(excluded(pool_health_metrics::flow_stability_normalized)),
            pool_health_metrics::efficiency_score.eq(excluded(pool_health_metrics::efficiency_score)),
            pool_health_metrics::tvl_concentration.eq(excluded(pool_health_metrics::tvl_concentration)),
            pool_health_metrics::updated_at.eq(diesel::dsl::now),
        ))
}

async fn upsert_tvl_snapshots(pool: &ArcDbPool, rows: &[NewPoolTvlSnapshot]) -> Result<()> {
    if rows.is_empty() {
        warn!("⚠️ No TVL snapshots to upsert");
        return Ok(());
    }
    let affected =
        execute_in_chunks(pool, upsert_tvl_snapshots_query, rows, chunk_size::<NewPoolTvlSnapshot>()).await?;
    info!("✅ Upserted {} pool TVL snapshots", affected);
    Ok(())
}

async fn upsert_daily_pool_metrics(pool: &ArcDbPool, rows: &[NewDailyPoolMetric]) -> Result<()> {
    if rows.is_empty() {
        warn!("⚠️ No daily pool metrics to upsert");
        return Ok(());
    }
    let affected =
        execute_in_chunks(pool, upsert_daily_pool_metrics_query, rows, chunk_size::<NewDailyPoolMetric>()).await?;
    info!("✅ Upserted {} daily pool metric rows", affected);
    Ok(())
}

async fn upsert_pool_health_metrics(pool: &ArcDbPool, rows: &[NewPoolHealthMetric]) -> Result<()> {
    if rows.is_empty() {
        warn!("⚠️ No pool health metrics to upsert");
        return Ok(());
    }
    let affected =
        execute_in_chunks(pool, upsert_pool_health_metrics_query, rows, chunk_size::<NewPoolHealthMetric>()).await?;
    info!("✅ Upserted {} pool health rows", affected);
    Ok(())
}
