use ahash::{AHashMap, AHashSet};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::bucket_calculator::BucketCalculator;
use super::constants::ALL_POOLS;
use super::normalizer::{NormalizedTransaction, TransactionType};
use super::rolling::{pct_change, rolling_mean};
use crate::errors::PipelineError;

pub const TVL_MA_WINDOW: usize = 7;

/// A liquidity event with its signed flow and the pool's running TVL after it.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidityFlow {
    #[serde(flatten)]
    pub transaction: NormalizedTransaction,
    pub net_amount0_usd: f64,
    pub net_amount1_usd: f64,
    pub net_total_usd: f64,
    pub tvl_token0_usd: f64,
    pub tvl_token1_usd: f64,
    pub tvl_total_usd: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPoolMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub tvl_usd: f64,
    pub tvl_token0_usd: f64,
    pub tvl_token1_usd: f64,
    pub daily_net_flow_usd: f64,
    pub daily_deposits_usd: f64,
    pub daily_withdrawals_usd: f64,
    pub transaction_count: i64,
    pub deposit_count: i64,
    pub withdrawal_count: i64,
    pub unique_users: i64,
    pub tvl_change: Option<f64>,
    pub tvl_change_pct: Option<f64>,
    pub tvl_usd_ma7: f64,
    pub daily_net_flow_ma7: f64,
    pub daily_deposits_ma7: f64,
    pub daily_withdrawals_ma7: f64,
}

/// Daily metrics summed across pools, tagged `ALL_POOLS`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProtocolDailyMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub tvl_usd: f64,
    pub tvl_token0_usd: f64,
    pub tvl_token1_usd: f64,
    pub daily_net_flow_usd: f64,
    pub daily_deposits_usd: f64,
    pub daily_withdrawals_usd: f64,
    pub transaction_count: i64,
    pub deposit_count: i64,
    pub withdrawal_count: i64,
    pub unique_users: i64,
    pub active_pools: i64,
    pub tvl_change: Option<f64>,
    pub tvl_change_pct: Option<f64>,
    pub tvl_usd_ma7: f64,
    pub daily_net_flow_ma7: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolTvlSnapshot {
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub current_tvl_usd: f64,
    pub current_tvl_token0_usd: f64,
    pub current_tvl_token1_usd: f64,
    pub first_transaction: NaiveDateTime,
    pub last_transaction: NaiveDateTime,
    pub total_transactions: i64,
    pub unique_users: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TvlMetrics {
    pub flows: Vec<LiquidityFlow>,
    pub daily_pool: Vec<DailyPoolMetric>,
    pub daily_protocol: Vec<ProtocolDailyMetric>,
    pub snapshot: Vec<PoolTvlSnapshot>,
}

#[derive(Default)]
struct DayAccumulator {
    token0: String,
    token1: String,
    tvl_total: f64,
    tvl_token0: f64,
    tvl_token1: f64,
    net_flow: f64,
    deposits: f64,
    withdrawals: f64,
    transactions: i64,
    deposit_count: i64,
    withdrawal_count: i64,
    users: AHashSet<String>,
}

struct SnapshotAccumulator {
    token0: String,
    token1: String,
    tvl_total: f64,
    tvl_token0: f64,
    tvl_token1: f64,
    first_ts: i64,
    last_ts: i64,
    transactions: i64,
    users: AHashSet<String>,
}

/// Reconstructs pool TVL as a running sum of signed liquidity flows.
#[derive(Debug, Default)]
pub struct TvlCalculator;

impl TvlCalculator {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(
        &self,
        deposits: &[NormalizedTransaction],
        withdrawals: &[NormalizedTransaction],
    ) -> Result<TvlMetrics, PipelineError> {
        if deposits.is_empty() && withdrawals.is_empty() {
            return Err(PipelineError::data_shape(
                "liquidity_events",
                "no deposits or withdrawals to reconstruct TVL from",
            ));
        }

        info!(
            "🏦 Reconstructing TVL from {} deposits and {} withdrawals",
            deposits.len(),
            withdrawals.len()
        );

        let flows = self.running_tvl(deposits, withdrawals);
        let daily_pool = self.daily_pool_metrics(&flows);
        let daily_protocol = self.protocol_metrics(&daily_pool);
        let snapshot = self.snapshot(&flows)?;

        info!(
            "✅ TVL computed: {} flows, {} pool-days, {} protocol days, {} pools",
            flows.len(),
            daily_pool.len(),
            daily_protocol.len(),
            snapshot.len()
        );

        Ok(TvlMetrics {
            flows,
            daily_pool,
            daily_protocol,
            snapshot,
        })
    }

    /// Deposits then withdrawals, stable-sorted by timestamp, with per-pool prefix sums.
    fn running_tvl(&self, deposits: &[NormalizedTransaction], withdrawals: &[NormalizedTransaction]) -> Vec<LiquidityFlow> {
        let mut combined: Vec<&NormalizedTransaction> = deposits.iter().chain(withdrawals.iter()).collect();
        combined.sort_by_key(|tx| tx.timestamp);

        let mut running: AHashMap<&str, (f64, f64)> = AHashMap::new();
        combined
            .into_iter()
            .map(|tx| {
                let sign = match tx.transaction_type {
                    TransactionType::Withdrawal => -1.0,
                    _ => 1.0,
                };
                let net0 = sign * tx.amount0_usd;
                let net1 = sign * tx.amount1_usd;
                let tvl = running.entry(tx.pool.as_str()).or_insert((0.0, 0.0));
                tvl.0 += net0;
                tvl.1 += net1;
                LiquidityFlow {
                    transaction: tx.clone(),
                    net_amount0_usd: net0,
                    net_amount1_usd: net1,
                    net_total_usd: net0 + net1,
                    tvl_token0_usd: tvl.0,
                    tvl_token1_usd: tvl.1,
                    tvl_total_usd: tvl.0 + tvl.1,
                }
            })
            .collect()
    }

    fn daily_pool_metrics(&self, flows: &[LiquidityFlow]) -> Vec<DailyPoolMetric> {
        let mut days: BTreeMap<(NaiveDate, String), DayAccumulator> = BTreeMap::new();

        for flow in flows {
            let tx = &flow.transaction;
            let acc = days.entry((tx.date, tx.pool.clone())).or_insert_with(|| DayAccumulator {
                token0: tx.token0.clone(),
                token1: tx.token1.clone(),
                ..Default::default()
            });
            // flows are time-ordered, so the last write of the day wins
            acc.tvl_total = flow.tvl_total_usd;
            acc.tvl_token0 = flow.tvl_token0_usd;
            acc.tvl_token1 = flow.tvl_token1_usd;
            acc.net_flow += flow.net_total_usd;
            acc.transactions += 1;
            match tx.transaction_type {
                TransactionType::Withdrawal => {
                    acc.withdrawals += tx.amount0_usd + tx.amount1_usd;
                    acc.withdrawal_count += 1;
                },
                _ => {
                    acc.deposits += tx.amount0_usd + tx.amount1_usd;
                    acc.deposit_count += 1;
                },
            }
            if let Some(sender) = &tx.sender {
                acc.users.insert(sender.clone());
            }
        }

        let mut metrics: Vec<DailyPoolMetric> = days
            .into_iter()
            .map(|((date, pool), acc)| DailyPoolMetric {
                date,
                pool,
                token0: acc.token0,
                token1: acc.token1,
                tvl_usd: acc.tvl_total,
                tvl_token0_usd: acc.tvl_token0,
                tvl_token1_usd: acc.tvl_token1,
                daily_net_flow_usd: acc.net_flow,
                daily_deposits_usd: acc.deposits,
                daily_withdrawals_usd: acc.withdrawals,
                transaction_count: acc.transactions,
                deposit_count: acc.deposit_count,
                withdrawal_count: acc.withdrawal_count,
                unique_users: acc.users.len() as i64,
                tvl_change: None,
                tvl_change_pct: None,
                tvl_usd_ma7: 0.0,
                daily_net_flow_ma7: 0.0,
                daily_deposits_ma7: 0.0,
                daily_withdrawals_ma7: 0.0,
            })
            .collect();

        // per-pool series in date order
        let mut by_pool: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, m) in metrics.iter().enumerate() {
            by_pool.entry(m.pool.clone()).or_default().push(idx);
        }
        for (pool, idxs) in by_pool {
            let series = |f: fn(&DailyPoolMetric) -> f64| idxs.iter().map(|i| f(&metrics[*i])).collect::<Vec<f64>>();
            let tvl = series(|m| m.tvl_usd);
            let tvl_ma = rolling_mean(&tvl, TVL_MA_WINDOW);
            let flow_ma = rolling_mean(&series(|m| m.daily_net_flow_usd), TVL_MA_WINDOW);
            let dep_ma = rolling_mean(&series(|m| m.daily_deposits_usd), TVL_MA_WINDOW);
            let wd_ma = rolling_mean(&series(|m| m.daily_withdrawals_usd), TVL_MA_WINDOW);

            for (pos, idx) in idxs.iter().enumerate() {
                let m = &mut metrics[*idx];
                if pos > 0 {
                    m.tvl_change = Some(tvl[pos] - tvl[pos - 1]);
                    m.tvl_change_pct = pct_change(tvl[pos - 1], tvl[pos]);
                }
                m.tvl_usd_ma7 = tvl_ma[pos];
                m.daily_net_flow_ma7 = flow_ma[pos];
                m.daily_deposits_ma7 = dep_ma[pos];
                m.daily_withdrawals_ma7 = wd_ma[pos];
            }
            debug!("📊 {} has {} active days", pool, idxs.len());
        }

        metrics
    }

    fn protocol_metrics(&self, daily: &[DailyPoolMetric]) -> Vec<ProtocolDailyMetric> {
        let mut by_date: BTreeMap<NaiveDate, ProtocolDailyMetric> = BTreeMap::new();
        for m in daily {
            let p = by_date.entry(m.date).or_insert_with(|| ProtocolDailyMetric {
                date: m.date,
                pool: ALL_POOLS.to_string(),
                tvl_usd: 0.0,
                tvl_token0_usd: 0.0,
                tvl_token1_usd: 0.0,
                daily_net_flow_usd: 0.0,
                daily_deposits_usd: 0.0,
                daily_withdrawals_usd: 0.0,
                transaction_count: 0,
                deposit_count: 0,
                withdrawal_count: 0,
                unique_users: 0,
                active_pools: 0,
                tvl_change: None,
                tvl_change_pct: None,
                tvl_usd_ma7: 0.0,
                daily_net_flow_ma7: 0.0,
            });
            p.tvl_usd += m.tvl_usd;
            p.tvl_token0_usd += m.tvl_token0_usd;
            p.tvl_token1_usd += m.tvl_token1_usd;
            p.daily_net_flow_usd += m.daily_net_flow_usd;
            p.daily_deposits_usd += m.daily_deposits_usd;
            p.daily_withdrawals_usd += m.daily_withdrawals_usd;
            p.transaction_count += m.transaction_count;
            p.deposit_count += m.deposit_count;
            p.withdrawal_count += m.withdrawal_count;
            // summed per pool, a user active in two pools counts twice
            p.unique_users += m.unique_users;
            p.active_pools += 1;
        }

        let mut protocol: Vec<ProtocolDailyMetric> = by_date.into_values().collect();
        let tvl: Vec<f64> = protocol.iter().map(|p| p.tvl_usd).collect();
        let flow: Vec<f64> = protocol.iter().map(|p| p.daily_net_flow_usd).collect();
        let tvl_ma = rolling_mean(&tvl, TVL_MA_WINDOW);
        let flow_ma = rolling_mean(&flow, TVL_MA_WINDOW);
        for (i, p) in protocol.iter_mut().enumerate() {
            if i > 0 {
                p.tvl_change = Some(tvl[i] - tvl[i - 1]);
                p.tvl_change_pct = pct_change(tvl[i - 1], tvl[i]);
            }
            p.tvl_usd_ma7 = tvl_ma[i];
            p.daily_net_flow_ma7 = flow_ma[i];
        }
        protocol
    }

    fn snapshot(&self, flows: &[LiquidityFlow]) -> Result<Vec<PoolTvlSnapshot>, PipelineError> {
        let mut pools: BTreeMap<String, SnapshotAccumulator> = BTreeMap::new();
        for flow in flows {
            let tx = &flow.transaction;
            let acc = pools.entry(tx.pool.clone()).or_insert_with(|| SnapshotAccumulator {
                token0: tx.token0.clone(),
                token1: tx.token1.clone(),
                tvl_total: 0.0,
                tvl_token0: 0.0,
                tvl_token1: 0.0,
                first_ts: tx.timestamp,
                last_ts: tx.timestamp,
                transactions: 0,
                users: AHashSet::new(),
            });
            acc.tvl_total = flow.tvl_total_usd;
            acc.tvl_token0 = flow.tvl_token0_usd;
            acc.tvl_token1 = flow.tvl_token1_usd;
            acc.first_ts = acc.first_ts.min(tx.timestamp);
            acc.last_ts = acc.last_ts.max(tx.timestamp);
            acc.transactions += 1;
            if let Some(sender) = &tx.sender {
                acc.users.insert(sender.clone());
            }
        }

        pools
            .into_iter()
            .map(|(pool, acc)| {
                let to_dt = |ts: i64| {
                    BucketCalculator::to_datetime(ts).ok_or_else(|| PipelineError::Numeric {
                        pool: pool.clone(),
                        timestamp: ts,
                        message: "timestamp out of range".to_string(),
                    })
                };
                Ok(PoolTvlSnapshot {
                    first_transaction: to_dt(acc.first_ts)?,
                    last_transaction: to_dt(acc.last_ts)?,
                    pool,
                    token0: acc.token0,
                    token1: acc.token1,
                    current_tvl_usd: acc.tvl_total,
                    current_tvl_token0_usd: acc.tvl_token0,
                    current_tvl_token1_usd: acc.tvl_token1,
                    total_transactions: acc.transactions,
                    unique_users: acc.users.len() as i64,
                })
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn liquidity_tx(
    pool: &str,
    timestamp: i64,
    kind: TransactionType,
    amount0_usd: f64,
    amount1_usd: f64,
    sender: &str,
) -> NormalizedTransaction {
    NormalizedTransaction {
        timestamp,
        date: BucketCalculator::new().bucket_date(timestamp).unwrap(),
        pool: pool.to_string(),
        contract_address: format!("0x{}", pool),
        sender: Some(sender.to_string()),
        token0: "MUSD".to_string(),
        token1: "BTC".to_string(),
        amount0: amount0_usd,
        amount1: amount1_usd,
        token0_usd_rate: 1.0,
        token1_usd_rate: 1.0,
        amount0_usd,
        amount1_usd,
        transaction_type: kind,
        transaction_hash: format!("0x{}{}", pool, timestamp),
        block_number: None,
    }
}
