use ahash::{AHashMap, AHashSet};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::bucket_calculator::BucketCalculator;
use super::constants::{is_stable, BTC_DERIVATIVE_SYMBOLS, BTC_SYMBOL, MUSD_SYMBOL};
use super::normalizer::{NormalizedFee, NormalizedSwap};
use super::rolling::{cumulative_sum, cumulative_sum_skipping_none, mean, median, rolling_mean, sum_present};
use crate::errors::PipelineError;

pub const SHORT_MA_WINDOW: usize = 7;
pub const LONG_MA_WINDOW: usize = 30;
pub const SUMMARY_TRAILING_DAYS: i64 = 7;

/// Pick the USD value of one leg so a swap is counted once.
///
/// First match wins: MUSD leg, then the lone stable leg, then BTC against a
/// BTC derivative, otherwise the larger leg.
pub fn select_volume_leg(token0: &str, token1: &str, leg0_usd: f64, leg1_usd: f64) -> f64 {
    select_volume_leg_among(token0, token1, leg0_usd, leg1_usd, &BTC_DERIVATIVE_SYMBOLS)
}

/// [`select_volume_leg`] with an explicit set of BTC derivatives.
pub fn select_volume_leg_among(
    token0: &str,
    token1: &str,
    leg0_usd: f64,
    leg1_usd: f64,
    btc_derivatives: &[&str],
) -> f64 {
    if token0 == MUSD_SYMBOL {
        leg0_usd
    } else if token1 == MUSD_SYMBOL {
        leg1_usd
    } else if is_stable(token0) && !is_stable(token1) {
        leg0_usd
    } else if is_stable(token1) && !is_stable(token0) {
        leg1_usd
    } else if token0 == BTC_SYMBOL && btc_derivatives.contains(&token1) {
        leg0_usd
    } else if token1 == BTC_SYMBOL && btc_derivatives.contains(&token0) {
        leg1_usd
    } else {
        leg0_usd.max(leg1_usd)
    }
}

/// A swap joined with its fee emission, with volume attributed.
#[derive(Debug, Clone, Serialize)]
pub struct SwapRecord {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub user: Option<String>,
    pub amount0_in_usd: f64,
    pub amount0_out_usd: f64,
    pub amount1_in_usd: f64,
    pub amount1_out_usd: f64,
    pub fee0_usd: Option<f64>,
    pub fee1_usd: Option<f64>,
    pub total_volume_usd: f64,
    pub total_inflow_usd: f64,
    pub total_outflow_usd: f64,
    pub total_fees_usd: Option<f64>,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolSwapMetric {
    pub pool: String,
    pub total_volume_usd: f64,
    pub total_fees_usd: Option<f64>,
    pub swap_count: i64,
    pub unique_traders: i64,
    pub avg_swap_size_usd: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailySwapMetric {
    pub date: NaiveDate,
    pub daily_volume_usd: f64,
    pub daily_fees_usd: Option<f64>,
    pub swap_count: i64,
    pub unique_traders: i64,
    pub avg_swap_size_usd: f64,
    pub cumulative_volume_usd: f64,
    pub cumulative_fees_usd: Option<f64>,
    pub volume_ma7: f64,
    pub volume_ma30: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolDailySwapMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub daily_volume_usd: f64,
    pub daily_fees_usd: Option<f64>,
    pub swap_count: i64,
    pub unique_traders: i64,
    pub cumulative_volume_usd: f64,
    pub cumulative_fees_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SwapSummary {
    pub updated_on: NaiveDate,
    pub total_volume_usd: f64,
    pub total_fees_usd: Option<f64>,
    pub total_swaps: i64,
    pub unique_traders: i64,
    pub avg_swap_size_usd: f64,
    pub median_swap_size_usd: f64,
    pub total_pools: i64,
    pub avg_daily_volume_usd: f64,
    pub max_daily_volume_usd: f64,
    pub days_with_activity: i64,
    pub volume_7d_usd: f64,
    pub fees_7d_usd: Option<f64>,
    pub swaps_7d: i64,
}

#[derive(Debug, Clone)]
pub struct SwapMetrics {
    pub records: Vec<SwapRecord>,
    pub by_pool: Vec<PoolSwapMetric>,
    pub by_date: Vec<DailySwapMetric>,
    pub by_pool_date: Vec<PoolDailySwapMetric>,
    pub summary: SwapSummary,
}

#[derive(Default)]
struct GroupAccumulator {
    volumes: Vec<f64>,
    fees: Vec<Option<f64>>,
    users: AHashSet<String>,
}

impl GroupAccumulator {
    fn push(&mut self, record: &SwapRecord) {
        self.volumes.push(record.total_volume_usd);
        self.fees.push(record.total_fees_usd);
        if let Some(user) = &record.user {
            self.users.insert(user.clone());
        }
    }

    fn volume(&self) -> f64 {
        self.volumes.iter().sum()
    }

    fn fees(&self) -> Option<f64> {
        sum_present(self.fees.iter().copied())
    }
}

/// VolumeCalculator attributes swap volume and rolls it up by pool and day
#[derive(Debug, Default)]
pub struct VolumeCalculator {
    bucket_calculator: BucketCalculator,
}

impl VolumeCalculator {
    pub fn new() -> Self {
        info!("🚀 Initializing VolumeCalculator with input-leg attribution");
        Self {
            bucket_calculator: BucketCalculator::new(),
        }
    }

    /// Run every rollup over the joined swaps.
    pub fn calculate(
        &self,
        swaps: &[NormalizedSwap],
        fees: &[NormalizedFee],
        registry_pools: &[String],
        as_of: NaiveDate,
    ) -> Result<SwapMetrics, PipelineError> {
        let records = self.join_fees(swaps, fees)?;
        let by_pool = self.by_pool(&records, registry_pools);
        let by_date = self.by_date(&records);
        let by_pool_date = self.by_pool_date(&records);
        let summary = self.summary(&records, &by_date, as_of);

        info!(
            "✅ Swap rollups: {} pools, {} days, {} pool-days, total volume ${:.2}",
            by_pool.len(),
            by_date.len(),
            by_pool_date.len(),
            summary.total_volume_usd
        );

        Ok(SwapMetrics {
            records,
            by_pool,
            by_date,
            by_pool_date,
            summary,
        })
    }

    /// Left join swaps to fees on transaction hash; the first fee row per hash wins.
    pub fn join_fees(&self, swaps: &[NormalizedSwap], fees: &[NormalizedFee]) -> Result<Vec<SwapRecord>, PipelineError> {
        if swaps.is_empty() {
            return Err(PipelineError::data_shape("swaps", "no swaps to attribute"));
        }

        let mut fee_by_hash: AHashMap<&str, &NormalizedFee> = AHashMap::with_capacity(fees.len());
        let mut duplicates = 0usize;
        for fee in fees {
            if fee_by_hash.contains_key(fee.transaction_hash.as_str()) {
                duplicates += 1;
            } else {
                fee_by_hash.insert(fee.transaction_hash.as_str(), fee);
            }
        }
        if duplicates > 0 {
            warn!("⚠️ {} fee rows share a transaction hash with an earlier row; keeping the first", duplicates);
        }

        let mut records: Vec<SwapRecord> = swaps
            .iter()
            .map(|swap| {
                let fee = fee_by_hash.get(swap.transaction_hash.as_str());
                let fee0_usd = fee.map(|f| f.fee0_usd);
                let fee1_usd = fee.map(|f| f.fee1_usd);
                SwapRecord {
                    timestamp: swap.timestamp,
                    date: swap.date,
                    pool: swap.pool.clone(),
                    token0: swap.token0.clone(),
                    token1: swap.token1.clone(),
                    user: swap.user.clone(),
                    amount0_in_usd: swap.amount0_in_usd,
                    amount0_out_usd: swap.amount0_out_usd,
                    amount1_in_usd: swap.amount1_in_usd,
                    amount1_out_usd: swap.amount1_out_usd,
                    fee0_usd,
                    fee1_usd,
                    total_volume_usd: select_volume_leg(
                        &swap.token0,
                        &swap.token1,
                        swap.amount0_in_usd,
                        swap.amount1_in_usd,
                    ),
                    total_inflow_usd: swap.amount0_in_usd + swap.amount1_in_usd,
                    total_outflow_usd: swap.amount0_out_usd + swap.amount1_out_usd,
                    total_fees_usd: fee0_usd.zip(fee1_usd).map(|(a, b)| a + b),
                    transaction_hash: swap.transaction_hash.clone(),
                }
            })
            .collect();

        records.sort_by(|a, b| a.pool.cmp(&b.pool).then_with(|| a.timestamp.cmp(&b.timestamp)));

        let unmatched = records.iter().filter(|r| r.total_fees_usd.is_none()).count();
        info!("🔗 Joined {} swaps with fees ({} without a fee row)", records.len(), unmatched);
        Ok(records)
    }

    /// Every registry pool appears, sorted by volume descending.
    pub fn by_pool(&self, records: &[SwapRecord], registry_pools: &[String]) -> Vec<PoolSwapMetric> {
        let mut groups: BTreeMap<&str, GroupAccumulator> = BTreeMap::new();
        for record in records {
            groups.entry(record.pool.as_str()).or_default().push(record);
        }

        let mut metrics: Vec<PoolSwapMetric> = groups
            .iter()
            .map(|(pool, acc)| PoolSwapMetric {
                pool: pool.to_string(),
                total_volume_usd: acc.volume(),
                total_fees_usd: acc.fees(),
                swap_count: acc.volumes.len() as i64,
                unique_traders: acc.users.len() as i64,
                avg_swap_size_usd: mean(&acc.volumes).unwrap_or(0.0),
            })
            .collect();

        for pool in registry_pools {
            if !groups.contains_key(pool.as_str()) {
                debug!("📭 {} has no swaps, adding zero row", pool);
                metrics.push(PoolSwapMetric {
                    pool: pool.clone(),
                    total_volume_usd: 0.0,
                    total_fees_usd: Some(0.0),
                    swap_count: 0,
                    unique_traders: 0,
                    avg_swap_size_usd: 0.0,
                });
            }
        }

        metrics.sort_by(|a, b| b.total_volume_usd.total_cmp(&a.total_volume_usd));
        metrics
    }

    pub fn by_date(&self, records: &[SwapRecord]) -> Vec<DailySwapMetric> {
        let mut groups: BTreeMap<NaiveDate, GroupAccumulator> = BTreeMap::new();
        for record in records {
            groups.entry(record.date).or_default().push(record);
        }

        let volumes: Vec<f64> = groups.values().map(GroupAccumulator::volume).collect();
        let fees: Vec<Option<f64>> = groups.values().map(GroupAccumulator::fees).collect();
        let cumulative_volume = cumulative_sum(&volumes);
        let cumulative_fees = cumulative_sum_skipping_none(&fees);
        let ma7 = rolling_mean(&volumes, SHORT_MA_WINDOW);
        let ma30 = rolling_mean(&volumes, LONG_MA_WINDOW);

        groups
            .iter()
            .enumerate()
            .map(|(i, (date, acc))| DailySwapMetric {
                date: *date,
                daily_volume_usd: volumes[i],
                daily_fees_usd: fees[i],
                swap_count: acc.volumes.len() as i64,
                unique_traders: acc.users.len() as i64,
                avg_swap_size_usd: mean(&acc.volumes).unwrap_or(0.0),
                cumulative_volume_usd: cumulative_volume[i],
                cumulative_fees_usd: cumulative_fees[i],
                volume_ma7: ma7[i],
                volume_ma30: ma30[i],
            })
            .collect()
    }

    pub fn by_pool_date(&self, records: &[SwapRecord]) -> Vec<PoolDailySwapMetric> {
        let mut groups: BTreeMap<(String, NaiveDate), GroupAccumulator> = BTreeMap::new();
        for record in records {
            groups
                .entry((record.pool.clone(), record.date))
                .or_default()
                .push(record);
        }

        let mut metrics = Vec::with_capacity(groups.len());
        let mut running: Option<(String, f64, Option<f64>)> = None;
        for ((pool, date), acc) in groups {
            let volume = acc.volume();
            let fees = acc.fees();
            // keys are ordered by pool then date, so running sums reset on pool change
            let (cum_volume, cum_fees) = match running.take() {
                Some((prev_pool, v, f)) if prev_pool == pool => (v + volume, add_optional(f, fees)),
                _ => (volume, fees),
            };
            running = Some((pool.clone(), cum_volume, cum_fees));
            metrics.push(PoolDailySwapMetric {
                date,
                pool,
                daily_volume_usd: volume,
                daily_fees_usd: fees,
                swap_count: acc.volumes.len() as i64,
                unique_traders: acc.users.len() as i64,
                cumulative_volume_usd: cum_volume,
                cumulative_fees_usd: cum_fees,
            });
        }

        metrics.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pool.cmp(&b.pool)));
        metrics
    }

    pub fn summary(&self, records: &[SwapRecord], daily: &[DailySwapMetric], as_of: NaiveDate) -> SwapSummary {
        let volumes: Vec<f64> = records.iter().map(|r| r.total_volume_usd).collect();
        let users: AHashSet<&str> = records.iter().filter_map(|r| r.user.as_deref()).collect();
        let pools: AHashSet<&str> = records.iter().map(|r| r.pool.as_str()).collect();
        let daily_volumes: Vec<f64> = daily.iter().map(|d| d.daily_volume_usd).collect();

        let window_start = self
            .bucket_calculator
            .trailing_window_start(as_of, SUMMARY_TRAILING_DAYS);
        let trailing: Vec<&SwapRecord> = records
            .iter()
            .filter(|r| r.date >= window_start && r.date <= as_of)
            .collect();

        SwapSummary {
            updated_on: as_of,
            total_volume_usd: volumes.iter().sum(),
            total_fees_usd: sum_present(records.iter().map(|r| r.total_fees_usd)),
            total_swaps: records.len() as i64,
            unique_traders: users.len() as i64,
            avg_swap_size_usd: mean(&volumes).unwrap_or(0.0),
            median_swap_size_usd: median(&volumes).unwrap_or(0.0),
            total_pools: pools.len() as i64,
            avg_daily_volume_usd: mean(&daily_volumes).unwrap_or(0.0),
            max_daily_volume_usd: daily_volumes.iter().copied().fold(0.0, f64::max),
            days_with_activity: daily.len() as i64,
            volume_7d_usd: trailing.iter().map(|r| r.total_volume_usd).sum(),
            fees_7d_usd: sum_present(trailing.iter().map(|r| r.total_fees_usd)),
            swaps_7d: trailing.len() as i64,
        }
    }
}

fn add_optional(running: Option<f64>, value: Option<f64>) -> Option<f64> {
    match (running, value) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(a), None) => Some(a),
        (None, b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY1: i64 = 1_735_689_600; // 2025-01-01 00:00:00 UTC
    const DAY: i64 = 86_400;

    fn swap(pool: &str, token0: &str, token1: &str, ts: i64, in0: f64, in1: f64, user: &str, hash: &str) -> NormalizedSwap {
        NormalizedSwap {
            timestamp: ts,
            date: BucketCalculator::new().bucket_date(ts).unwrap(),
            pool: pool.to_string(),
            token0: token0.to_string(),
            token1: token1.to_string(),
            user: Some(user.to_string()),
            amount0_in: in0,
            amount0_out: 0.0,
            amount1_in: in1,
            amount1_out: 0.0,
            amount0_in_usd: in0,
            amount0_out_usd: 0.0,
            amount1_in_usd: in1,
            amount1_out_usd: in1 / 2.0,
            transaction_hash: hash.to_string(),
            block_number: None,
        }
    }

    fn fee(hash: &str, fee0: f64, fee1: f64) -> NormalizedFee {
        NormalizedFee {
            timestamp: DAY1,
            pool: "MUSD/BTC".to_string(),
            token0: "MUSD".to_string(),
            token1: "BTC".to_string(),
            amount0: fee0,
            amount1: fee1,
            fee0_usd: fee0,
            fee1_usd: fee1,
            transaction_hash: hash.to_string(),
        }
    }

    #[test]
    fn test_tie_break_priorities() {
        // MUSD first, even against a stable
        assert_eq!(select_volume_leg("USDC", "MUSD", 5.0, 7.0), 7.0);
        assert_eq!(select_volume_leg("MUSD", "BTC", 5.0, 7.0), 5.0);
        // lone stable side
        assert_eq!(select_volume_leg("USDC", "BTC", 100.0, 0.0), 100.0);
        assert_eq!(select_volume_leg("BTC", "USDT", 80.0, 3.0), 3.0);
        // both stable falls through to max
        assert_eq!(select_volume_leg("USDC", "USDT", 2.0, 9.0), 9.0);
        // BTC against a derivative
        assert_eq!(select_volume_leg("BTC", "SolvBTC", 1.0, 50.0), 1.0);
        assert_eq!(select_volume_leg("tBTC", "BTC", 50.0, 1.0), 1.0);
        // otherwise the larger leg
        assert_eq!(select_volume_leg("T", "BTC", 4.0, 6.0), 6.0);
    }

    #[test]
    fn test_stable_input_is_counted_once() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![swap("USDC/BTC", "USDC", "BTC", DAY1, 100.0, 0.0, "u1", "0x1")];
        let records = calculator.join_fees(&swaps, &[]).unwrap();
        assert_eq!(records[0].total_volume_usd, 100.0);
        assert_eq!(records[0].total_inflow_usd, 100.0);
    }

    #[test]
    fn test_normalized_stable_swap_counts_input_leg_only() {
        use crate::{
            config::pool_registry::test_registry,
            processors::events::{
                normalizer::{PriceTable, TokenNormalizer},
                raw_events::{parse_records, RawSwap},
            },
        };

        let mut prices = AHashMap::new();
        prices.insert("usd-coin".to_string(), 0.9998);
        prices.insert("bitcoin".to_string(), 100_000.0);
        let prices = PriceTable::new(prices);
        let registry = test_registry();

        // 100 mUSDC in, 0.001 BTC (about 100 USD) out on the mUSDC/BTC pool
        let raw: Vec<RawSwap> = parse_records(
            "swaps",
            &[serde_json::json!({
                "timestamp_": DAY1.to_string(),
                "contractId_": "0xddd",
                "to": "0xtrader",
                "amount0In": "100000000",
                "amount0Out": "0",
                "amount1In": "0",
                "amount1Out": "1000000000000000",
                "transactionHash_": "0xstable",
            })],
        )
        .unwrap();
        let swaps = TokenNormalizer::new(&registry, &prices).normalize_swaps(&raw).unwrap();
        assert!((swaps[0].amount1_out_usd - 100.0).abs() < 1e-9);

        let records = VolumeCalculator::new().join_fees(&swaps, &[]).unwrap();

        assert!((records[0].total_volume_usd - 99.98).abs() < 1e-9);
        assert!((records[0].total_inflow_usd - 99.98).abs() < 1e-9);
    }

    #[test]
    fn test_fee_join_keeps_none_and_first_duplicate() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![
            swap("MUSD/BTC", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa"),
            swap("MUSD/BTC", "MUSD", "BTC", DAY1 + 1, 20.0, 0.0, "u2", "0xb"),
        ];
        let fees = vec![fee("0xa", 0.1, 0.0), fee("0xa", 5.0, 5.0)];

        let records = calculator.join_fees(&swaps, &fees).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].total_fees_usd, Some(0.1));
        assert_eq!(records[1].fee0_usd, None);
        assert_eq!(records[1].total_fees_usd, None);

        let daily = calculator.by_date(&records);
        assert_eq!(daily[0].daily_fees_usd, Some(0.1));
    }

    #[test]
    fn test_group_without_fees_yields_none() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![swap("MUSD/BTC", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa")];
        let records = calculator.join_fees(&swaps, &[]).unwrap();
        let daily = calculator.by_date(&records);
        assert_eq!(daily[0].daily_fees_usd, None);
        assert_eq!(daily[0].cumulative_fees_usd, None);
    }

    #[test]
    fn test_registry_pools_appear_with_zero_rows() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![
            swap("MUSD/BTC", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa"),
            swap("MUSD/USDC", "MUSD", "USDC", DAY1, 30.0, 0.0, "u1", "0xb"),
        ];
        let records = calculator.join_fees(&swaps, &[]).unwrap();
        let registry = vec!["MUSD/BTC".to_string(), "MUSD/USDC".to_string(), "MUSD/T".to_string()];

        let by_pool = calculator.by_pool(&records, &registry);

        assert_eq!(by_pool.len(), 3);
        assert_eq!(by_pool[0].pool, "MUSD/USDC");
        assert_eq!(by_pool[1].pool, "MUSD/BTC");
        assert_eq!(by_pool[2].pool, "MUSD/T");
        assert_eq!(by_pool[2].swap_count, 0);
        assert_eq!(by_pool[2].total_volume_usd, 0.0);
    }

    #[test]
    fn test_daily_rollup_cumulative_and_moving_averages() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![
            swap("MUSD/BTC", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa"),
            swap("MUSD/BTC", "MUSD", "BTC", DAY1 + 60, 30.0, 0.0, "u2", "0xb"),
            swap("MUSD/BTC", "MUSD", "BTC", DAY1 + DAY, 60.0, 0.0, "u1", "0xc"),
        ];
        let fees = vec![fee("0xc", 1.0, 0.5)];
        let records = calculator.join_fees(&swaps, &fees).unwrap();

        let daily = calculator.by_date(&records);

        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].daily_volume_usd, 40.0);
        assert_eq!(daily[0].unique_traders, 2);
        assert_eq!(daily[0].avg_swap_size_usd, 20.0);
        assert_eq!(daily[1].cumulative_volume_usd, 100.0);
        assert_eq!(daily[1].volume_ma7, 50.0);
        assert_eq!(daily[1].volume_ma30, 50.0);
        assert_eq!(daily[0].cumulative_fees_usd, None);
        assert_eq!(daily[1].cumulative_fees_usd, Some(1.5));
    }

    #[test]
    fn test_pool_date_cumulative_resets_per_pool() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![
            swap("A", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa"),
            swap("A", "MUSD", "BTC", DAY1 + DAY, 5.0, 0.0, "u1", "0xb"),
            swap("B", "MUSD", "BTC", DAY1 + DAY, 7.0, 0.0, "u2", "0xc"),
        ];
        let records = calculator.join_fees(&swaps, &[]).unwrap();

        let rows = calculator.by_pool_date(&records);

        let a_day2 = rows.iter().find(|r| r.pool == "A" && r.date.to_string() == "2025-01-02").unwrap();
        let b_day2 = rows.iter().find(|r| r.pool == "B").unwrap();
        assert_eq!(a_day2.cumulative_volume_usd, 15.0);
        assert_eq!(b_day2.cumulative_volume_usd, 7.0);
        assert_eq!(rows[0].date.to_string(), "2025-01-01");
    }

    #[test]
    fn test_summary_trailing_window() {
        let calculator = VolumeCalculator::new();
        let swaps = vec![
            swap("A", "MUSD", "BTC", DAY1, 10.0, 0.0, "u1", "0xa"),
            swap("A", "MUSD", "BTC", DAY1 + 10 * DAY, 20.0, 0.0, "u2", "0xb"),
            swap("B", "MUSD", "BTC", DAY1 + 10 * DAY, 40.0, 0.0, "u2", "0xc"),
        ];
        let records = calculator.join_fees(&swaps, &[fee("0xb", 1.0, 1.0)]).unwrap();
        let daily = calculator.by_date(&records);
        let as_of = BucketCalculator::new().bucket_date(DAY1 + 12 * DAY).unwrap();

        let summary = calculator.summary(&records, &daily, as_of);

        assert_eq!(summary.total_volume_usd, 70.0);
        assert_eq!(summary.total_swaps, 3);
        assert_eq!(summary.unique_traders, 2);
        assert_eq!(summary.median_swap_size_usd, 20.0);
        assert_eq!(summary.total_pools, 2);
        assert_eq!(summary.days_with_activity, 2);
        assert_eq!(summary.max_daily_volume_usd, 60.0);
        assert_eq!(summary.volume_7d_usd, 60.0);
        assert_eq!(summary.swaps_7d, 2);
        assert_eq!(summary.fees_7d_usd, Some(2.0));
        assert_eq!(summary.total_fees_usd, Some(2.0));
    }

    #[test]
    fn test_no_swaps_is_rejected() {
        assert!(VolumeCalculator::new().join_fees(&[], &[]).is_err());
    }
}
