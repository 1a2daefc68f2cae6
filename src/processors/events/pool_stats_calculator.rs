use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::constants::TIGRIS_BTC_DERIVATIVE_SYMBOLS;
use super::normalizer::NormalizedPoolStat;
use super::rolling::{cumulative_sum, rolling_mean};
use super::volume_calculator::{select_volume_leg_among, LONG_MA_WINDOW, SHORT_MA_WINDOW};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPoolVolume {
    pub date: NaiveDate,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub daily_volume0_usd: f64,
    pub daily_volume1_usd: f64,
    pub daily_total_volume_usd: f64,
    pub volume_ma7: f64,
    pub volume_ma30: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyPoolFees {
    pub date: NaiveDate,
    pub pool: String,
    pub daily_fees0_usd: f64,
    pub daily_fees1_usd: f64,
    pub daily_total_fees_usd: f64,
    pub cumulative_fees_usd: f64,
    pub fees_ma7: f64,
    pub fees_ma30: f64,
}

/// Pool values summed per day across all pools.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyProtocolTotal {
    pub date: NaiveDate,
    pub total_usd: f64,
    pub active_pools: i64,
    pub ma7: f64,
    pub ma30: f64,
}

/// One pool-day of differenced legs.
#[derive(Debug, Clone)]
struct DailyLegs {
    date: NaiveDate,
    pool: String,
    token0: String,
    token1: String,
    leg0_usd: f64,
    leg1_usd: f64,
}

/// Turns Tigris cumulative pool statistics into per-day values.
#[derive(Debug, Default)]
pub struct PoolStatsCalculator;

impl PoolStatsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Per-pool differences of cumulative legs, summed per day.
    ///
    /// The first record of a pool contributes its full cumulative value.
    fn daily_legs(&self, stats: &[NormalizedPoolStat]) -> Vec<DailyLegs> {
        let mut sorted: Vec<&NormalizedPoolStat> = stats.iter().collect();
        sorted.sort_by(|a, b| a.pool.cmp(&b.pool).then_with(|| a.timestamp.cmp(&b.timestamp)));

        let mut days: BTreeMap<(String, NaiveDate), DailyLegs> = BTreeMap::new();
        let mut previous: Option<&NormalizedPoolStat> = None;
        for stat in sorted {
            let (d0, d1) = match previous {
                Some(prev) if prev.pool == stat.pool => (stat.total0_usd - prev.total0_usd, stat.total1_usd - prev.total1_usd),
                _ => (stat.total0_usd, stat.total1_usd),
            };
            previous = Some(stat);

            let day = days
                .entry((stat.pool.clone(), stat.date))
                .or_insert_with(|| DailyLegs {
                    date: stat.date,
                    pool: stat.pool.clone(),
                    token0: stat.token0.clone(),
                    token1: stat.token1.clone(),
                    leg0_usd: 0.0,
                    leg1_usd: 0.0,
                });
            day.leg0_usd += d0;
            day.leg1_usd += d1;
        }
        // ordered by pool then date
        days.into_values().collect()
    }

    pub fn daily_volume(&self, stats: &[NormalizedPoolStat]) -> Vec<DailyPoolVolume> {
        let legs = self.daily_legs(stats);
        let mut out: Vec<DailyPoolVolume> = Vec::with_capacity(legs.len());

        for series in split_by_pool(&legs) {
            let totals: Vec<f64> = series
                .iter()
                .map(|d| {
                    select_volume_leg_among(&d.token0, &d.token1, d.leg0_usd, d.leg1_usd, &TIGRIS_BTC_DERIVATIVE_SYMBOLS)
                })
                .collect();
            let ma7 = rolling_mean(&totals, SHORT_MA_WINDOW);
            let ma30 = rolling_mean(&totals, LONG_MA_WINDOW);
            for (i, d) in series.iter().enumerate() {
                out.push(DailyPoolVolume {
                    date: d.date,
                    pool: d.pool.clone(),
                    token0: d.token0.clone(),
                    token1: d.token1.clone(),
                    daily_volume0_usd: d.leg0_usd,
                    daily_volume1_usd: d.leg1_usd,
                    daily_total_volume_usd: totals[i],
                    volume_ma7: ma7[i],
                    volume_ma30: ma30[i],
                });
            }
        }

        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pool.cmp(&b.pool)));
        info!("📈 Differenced volume into {} pool-days", out.len());
        out
    }

    pub fn daily_fees(&self, stats: &[NormalizedPoolStat]) -> Vec<DailyPoolFees> {
        let legs = self.daily_legs(stats);
        let mut out: Vec<DailyPoolFees> = Vec::with_capacity(legs.len());

        for series in split_by_pool(&legs) {
            let totals: Vec<f64> = series.iter().map(|d| d.leg0_usd + d.leg1_usd).collect();
            let cumulative = cumulative_sum(&totals);
            let ma7 = rolling_mean(&totals, SHORT_MA_WINDOW);
            let ma30 = rolling_mean(&totals, LONG_MA_WINDOW);
            for (i, d) in series.iter().enumerate() {
                out.push(DailyPoolFees {
                    date: d.date,
                    pool: d.pool.clone(),
                    daily_fees0_usd: d.leg0_usd,
                    daily_fees1_usd: d.leg1_usd,
                    daily_total_fees_usd: totals[i],
                    cumulative_fees_usd: cumulative[i],
                    fees_ma7: ma7[i],
                    fees_ma30: ma30[i],
                });
            }
        }

        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pool.cmp(&b.pool)));
        info!("💸 Differenced fees into {} pool-days", out.len());
        out
    }

    /// Sum per-pool daily values across pools.
    pub fn protocol_totals<T, F>(&self, rows: &[T], key: F) -> Vec<DailyProtocolTotal>
    where
        F: Fn(&T) -> (NaiveDate, f64),
    {
        let mut by_date: BTreeMap<NaiveDate, (f64, i64)> = BTreeMap::new();
        for row in rows {
            let (date, value) = key(row);
            let entry = by_date.entry(date).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
        let totals: Vec<f64> = by_date.values().map(|(v, _)| *v).collect();
        let ma7 = rolling_mean(&totals, SHORT_MA_WINDOW);
        let ma30 = rolling_mean(&totals, LONG_MA_WINDOW);
        by_date
            .into_iter()
            .enumerate()
            .map(|(i, (date, (total, pools)))| DailyProtocolTotal {
                date,
                total_usd: total,
                active_pools: pools,
                ma7: ma7[i],
                ma30: ma30[i],
            })
            .collect()
    }
}

fn split_by_pool(legs: &[DailyLegs]) -> Vec<&[DailyLegs]> {
    legs.chunk_by(|a, b| a.pool == b.pool).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::events::bucket_calculator::BucketCalculator;

    const DAY1: i64 = 1_735_689_600; // 2025-01-01 00:00:00 UTC
    const DAY: i64 = 86_400;

    fn stat(pool: &str, token0: &str, token1: &str, ts: i64, total0: f64, total1: f64) -> NormalizedPoolStat {
        NormalizedPoolStat {
            id: format!("{}-{}", pool, ts),
            timestamp: ts,
            date: BucketCalculator::new().bucket_date(ts).unwrap(),
            pool: pool.to_string(),
            token0: token0.to_string(),
            token1: token1.to_string(),
            total0,
            total1,
            total0_usd: total0,
            total1_usd: total1,
        }
    }

    #[test]
    fn test_daily_volume_is_differenced() {
        let stats = vec![
            stat("MUSD/BTC", "MUSD", "BTC", DAY1 + 2 * DAY, 250.0, 300.0),
            stat("MUSD/BTC", "MUSD", "BTC", DAY1, 100.0, 120.0),
            stat("MUSD/BTC", "MUSD", "BTC", DAY1 + DAY, 160.0, 200.0),
        ];

        let volume = PoolStatsCalculator::new().daily_volume(&stats);

        let totals: Vec<f64> = volume.iter().map(|v| v.daily_total_volume_usd).collect();
        // MUSD leg is chosen: 100, then 60, then 90
        assert_eq!(totals, vec![100.0, 60.0, 90.0]);
        assert_eq!(volume[1].daily_volume1_usd, 80.0);
        assert_eq!(volume[2].volume_ma7, (100.0 + 60.0 + 90.0) / 3.0);
    }

    #[test]
    fn test_first_record_per_pool_contributes_full_value() {
        let stats = vec![
            stat("A", "MUSD", "BTC", DAY1, 10.0, 0.0),
            stat("B", "MUSD", "BTC", DAY1, 5.0, 0.0),
            stat("B", "MUSD", "BTC", DAY1 + DAY, 8.0, 0.0),
        ];

        let volume = PoolStatsCalculator::new().daily_volume(&stats);

        let b: Vec<f64> = volume.iter().filter(|v| v.pool == "B").map(|v| v.daily_total_volume_usd).collect();
        assert_eq!(b, vec![5.0, 3.0]);
        let a: Vec<f64> = volume.iter().filter(|v| v.pool == "A").map(|v| v.daily_total_volume_usd).collect();
        assert_eq!(a, vec![10.0]);
    }

    #[test]
    fn test_same_day_records_are_summed() {
        let stats = vec![
            stat("A", "USDC", "BTC", DAY1, 10.0, 1.0),
            stat("A", "USDC", "BTC", DAY1 + 3600, 25.0, 2.0),
        ];

        let volume = PoolStatsCalculator::new().daily_volume(&stats);

        assert_eq!(volume.len(), 1);
        // 10 + (25 - 10) on the stable leg
        assert_eq!(volume[0].daily_total_volume_usd, 25.0);
    }

    #[test]
    fn test_only_solv_wrappers_take_the_btc_leg() {
        let stats = vec![
            stat("BTC/SolvBTC", "BTC", "SolvBTC", DAY1, 40.0, 60.0),
            stat("BTC/tBTC", "BTC", "tBTC", DAY1, 40.0, 60.0),
        ];

        let volume = PoolStatsCalculator::new().daily_volume(&stats);

        let total = |pool: &str| volume.iter().find(|v| v.pool == pool).unwrap().daily_total_volume_usd;
        assert_eq!(total("BTC/SolvBTC"), 40.0);
        // tBTC is not a derivative here, so the larger leg wins
        assert_eq!(total("BTC/tBTC"), 60.0);
    }

    #[test]
    fn test_daily_fees_and_cumulative() {
        let stats = vec![
            stat("A", "MUSD", "BTC", DAY1, 1.0, 0.5),
            stat("A", "MUSD", "BTC", DAY1 + DAY, 3.0, 1.0),
        ];

        let fees = PoolStatsCalculator::new().daily_fees(&stats);

        assert_eq!(fees[0].daily_total_fees_usd, 1.5);
        assert_eq!(fees[1].daily_total_fees_usd, 2.5);
        assert_eq!(fees[1].cumulative_fees_usd, 4.0);
    }

    #[test]
    fn test_protocol_totals() {
        let stats = vec![
            stat("A", "MUSD", "BTC", DAY1, 10.0, 0.0),
            stat("B", "MUSD", "BTC", DAY1, 5.0, 0.0),
            stat("B", "MUSD", "BTC", DAY1 + DAY, 8.0, 0.0),
        ];
        let calculator = PoolStatsCalculator::new();
        let volume = calculator.daily_volume(&stats);

        let totals = calculator.protocol_totals(&volume, |v| (v.date, v.daily_total_volume_usd));

        assert_eq!(totals.len(), 2);
        assert_eq!(totals[0].total_usd, 15.0);
        assert_eq!(totals[0].active_pools, 2);
        assert_eq!(totals[1].total_usd, 3.0);
        assert_eq!(totals[1].ma7, 9.0);
    }
}
