use ahash::AHashMap;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use super::pool_stats_calculator::{DailyPoolFees, DailyPoolVolume};
use super::rolling::{mean, rolling_std};
use super::tvl_calculator::DailyPoolMetric;

/// Score weights and caps for the efficiency score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthWeights {
    pub volume_weight: f64,
    pub fee_weight: f64,
    pub stability_weight: f64,
    pub volume_tvl_ratio_cap: f64,
    pub fee_apy_cap: f64,
    /// Fee APY is only computed above this TVL.
    pub min_tvl_for_apy: f64,
    pub stability_window: usize,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            volume_weight: 40.0,
            fee_weight: 30.0,
            stability_weight: 30.0,
            volume_tvl_ratio_cap: 10.0,
            fee_apy_cap: 10.0,
            min_tvl_for_apy: 1000.0,
            stability_window: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolHealthMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub tvl_usd: f64,
    pub daily_volume_usd: f64,
    pub daily_fees_usd: f64,
    pub daily_net_flow_usd: f64,
    pub volume_tvl_ratio: f64,
    pub fee_apy: f64,
    pub flow_stability: f64,
    pub flow_stability_normalized: f64,
    pub efficiency_score: f64,
    pub tvl_concentration: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedPool {
    pub pool: String,
    pub value: f64,
}

/// Latest-day view over the health table.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PoolsSummary {
    pub snapshot_date: NaiveDate,
    pub total_tvl_usd: f64,
    pub daily_volume_usd: f64,
    pub daily_fees_usd: f64,
    pub avg_fee_apy_pct: f64,
    pub avg_efficiency_score: f64,
    pub total_pools: i64,
    pub top_pools_by_tvl: Vec<RankedPool>,
    pub top_pools_by_volume: Vec<RankedPool>,
    pub top_pools_by_efficiency: Vec<RankedPool>,
}

#[derive(Default, Clone, Copy)]
struct JoinedDay {
    tvl: f64,
    net_flow: f64,
    volume: f64,
    fees: f64,
}

/// HealthCalculator scores pool-days on turnover, fee yield and flow stability
#[derive(Debug, Default)]
pub struct HealthCalculator {
    weights: HealthWeights,
}

impl HealthCalculator {
    pub fn new(weights: HealthWeights) -> Self {
        Self { weights }
    }

    /// Outer join on TVL and volume, left join on fees; missing values are zero.
    pub fn calculate(
        &self,
        tvl: &[DailyPoolMetric],
        volume: &[DailyPoolVolume],
        fees: &[DailyPoolFees],
    ) -> Vec<PoolHealthMetric> {
        let w = &self.weights;
        let mut joined: BTreeMap<(String, NaiveDate), JoinedDay> = BTreeMap::new();
        for m in tvl {
            let day = joined.entry((m.pool.clone(), m.date)).or_default();
            day.tvl = m.tvl_usd;
            day.net_flow = m.daily_net_flow_usd;
        }
        for v in volume {
            joined.entry((v.pool.clone(), v.date)).or_default().volume = v.daily_total_volume_usd;
        }
        for f in fees {
            if let Some(day) = joined.get_mut(&(f.pool.clone(), f.date)) {
                day.fees = f.daily_total_fees_usd;
            }
        }

        let mut tvl_by_date: AHashMap<NaiveDate, f64> = AHashMap::new();
        for ((_, date), day) in &joined {
            *tvl_by_date.entry(*date).or_insert(0.0) += day.tvl;
        }

        // flow stability per pool over its date-ordered series
        let mut stability: Vec<f64> = Vec::with_capacity(joined.len());
        let mut current_pool: Option<&str> = None;
        let mut series: Vec<f64> = Vec::new();
        for ((pool, _), day) in &joined {
            if current_pool != Some(pool.as_str()) {
                stability.extend(flush_stability(&series, w.stability_window));
                series.clear();
                current_pool = Some(pool.as_str());
            }
            series.push(day.net_flow);
        }
        stability.extend(flush_stability(&series, w.stability_window));

        let max_std = stability.iter().copied().fold(0.0, f64::max);
        let max_std = if max_std > 0.0 { max_std } else { 1.0 };

        let mut out: Vec<PoolHealthMetric> = joined
            .into_iter()
            .zip(stability)
            .map(|(((pool, date), day), flow_stability)| {
                let volume_tvl_ratio = if day.tvl > 0.0 { day.volume / day.tvl } else { 0.0 };
                let fee_apy = if day.tvl > w.min_tvl_for_apy {
                    (day.fees * 365.0 / day.tvl).clamp(0.0, w.fee_apy_cap)
                } else {
                    0.0
                };
                let flow_stability_normalized = 1.0 - flow_stability / (max_std + 1.0);
                let efficiency_score = w.volume_weight * volume_tvl_ratio.clamp(0.0, w.volume_tvl_ratio_cap)
                    / w.volume_tvl_ratio_cap
                    + w.fee_weight * fee_apy / w.fee_apy_cap
                    + w.stability_weight * flow_stability_normalized;
                let day_tvl = tvl_by_date.get(&date).copied().unwrap_or(0.0);
                let tvl_concentration = if day_tvl > 0.0 { day.tvl / day_tvl } else { 0.0 };

                PoolHealthMetric {
                    date,
                    pool,
                    tvl_usd: day.tvl,
                    daily_volume_usd: day.volume,
                    daily_fees_usd: day.fees,
                    daily_net_flow_usd: day.net_flow,
                    volume_tvl_ratio,
                    fee_apy,
                    flow_stability,
                    flow_stability_normalized,
                    efficiency_score,
                    tvl_concentration,
                }
            })
            .collect();

        out.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.pool.cmp(&b.pool)));
        info!("🩺 Scored {} pool-days", out.len());
        out
    }

    /// Latest-date summary. `None` when there are no rows.
    pub fn summarize(&self, health: &[PoolHealthMetric]) -> Option<PoolsSummary> {
        let latest = health.iter().map(|h| h.date).max()?;
        let rows: Vec<&PoolHealthMetric> = health.iter().filter(|h| h.date == latest).collect();
        let pools: BTreeSet<&str> = rows.iter().map(|h| h.pool.as_str()).collect();
        let apys: Vec<f64> = rows.iter().map(|h| h.fee_apy).collect();
        let scores: Vec<f64> = rows.iter().map(|h| h.efficiency_score).collect();

        Some(PoolsSummary {
            snapshot_date: latest,
            total_tvl_usd: rows.iter().map(|h| h.tvl_usd).sum(),
            daily_volume_usd: rows.iter().map(|h| h.daily_volume_usd).sum(),
            daily_fees_usd: rows.iter().map(|h| h.daily_fees_usd).sum(),
            avg_fee_apy_pct: mean(&apys).unwrap_or(0.0) * 100.0,
            avg_efficiency_score: mean(&scores).unwrap_or(0.0),
            total_pools: pools.len() as i64,
            top_pools_by_tvl: top_three(&rows, |h| h.tvl_usd),
            top_pools_by_volume: top_three(&rows, |h| h.daily_volume_usd),
            top_pools_by_efficiency: top_three(&rows, |h| h.efficiency_score),
        })
    }
}

fn flush_stability(series: &[f64], window: usize) -> Vec<f64> {
    rolling_std(series, window)
        .into_iter()
        .map(|s| s.unwrap_or(0.0))
        .collect()
}

fn top_three(rows: &[&PoolHealthMetric], value: fn(&PoolHealthMetric) -> f64) -> Vec<RankedPool> {
    let mut ranked: Vec<RankedPool> = rows
        .iter()
        .map(|h| RankedPool {
            pool: h.pool.clone(),
            value: value(h),
        })
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
    ranked.truncate(3);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, day).unwrap()
    }

    fn tvl_row(pool: &str, day: u32, tvl: f64, net_flow: f64) -> DailyPoolMetric {
        DailyPoolMetric {
            date: date(day),
            pool: pool.to_string(),
            token0: "MUSD".to_string(),
            token1: "BTC".to_string(),
            tvl_usd: tvl,
            tvl_token0_usd: tvl,
            tvl_token1_usd: 0.0,
            daily_net_flow_usd: net_flow,
            daily_deposits_usd: net_flow.max(0.0),
            daily_withdrawals_usd: (-net_flow).max(0.0),
            transaction_count: 1,
            deposit_count: 1,
            withdrawal_count: 0,
            unique_users: 1,
            tvl_change: None,
            tvl_change_pct: None,
            tvl_usd_ma7: tvl,
            daily_net_flow_ma7: net_flow,
            daily_deposits_ma7: 0.0,
            daily_withdrawals_ma7: 0.0,
        }
    }

    fn volume_row(pool: &str, day: u32, volume: f64) -> DailyPoolVolume {
        DailyPoolVolume {
            date: date(day),
            pool: pool.to_string(),
            token0: "MUSD".to_string(),
            token1: "BTC".to_string(),
            daily_volume0_usd: volume,
            daily_volume1_usd: 0.0,
            daily_total_volume_usd: volume,
            volume_ma7: volume,
            volume_ma30: volume,
        }
    }

    fn fee_row(pool: &str, day: u32, fees: f64) -> DailyPoolFees {
        DailyPoolFees {
            date: date(day),
            pool: pool.to_string(),
            daily_fees0_usd: fees,
            daily_fees1_usd: 0.0,
            daily_total_fees_usd: fees,
            cumulative_fees_usd: fees,
            fees_ma7: fees,
            fees_ma30: fees,
        }
    }

    #[test]
    fn test_ratio_apy_and_first_day_stability() {
        let calculator = HealthCalculator::default();
        let health = calculator.calculate(
            &[tvl_row("A", 1, 10_000.0, 10_000.0)],
            &[volume_row("A", 1, 5_000.0)],
            &[fee_row("A", 1, 10.0)],
        );

        assert_eq!(health.len(), 1);
        let h = &health[0];
        assert_eq!(h.volume_tvl_ratio, 0.5);
        assert!((h.fee_apy - 0.365).abs() < 1e-12);
        assert_eq!(h.flow_stability, 0.0);
        // max_std falls back to 1
        assert_eq!(h.flow_stability_normalized, 1.0);
        let expected = 40.0 * 0.5 / 10.0 + 30.0 * 0.365 / 10.0 + 30.0;
        assert!((h.efficiency_score - expected).abs() < 1e-9);
        assert_eq!(h.tvl_concentration, 1.0);
    }

    #[test]
    fn test_small_tvl_has_no_apy_and_caps_apply() {
        let calculator = HealthCalculator::default();
        let health = calculator.calculate(
            &[tvl_row("A", 1, 500.0, 500.0), tvl_row("B", 1, 2_000.0, 2_000.0)],
            &[volume_row("A", 1, 1_000_000.0)],
            &[fee_row("A", 1, 100.0), fee_row("B", 1, 1_000.0)],
        );

        let a = health.iter().find(|h| h.pool == "A").unwrap();
        let b = health.iter().find(|h| h.pool == "B").unwrap();
        assert_eq!(a.fee_apy, 0.0);
        assert_eq!(b.fee_apy, 10.0);
        assert!(a.efficiency_score <= 100.0);
        assert!((a.tvl_concentration - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_outer_join_fills_missing_with_zero() {
        let calculator = HealthCalculator::default();
        let health = calculator.calculate(
            &[tvl_row("A", 1, 1_000.0, 1_000.0)],
            &[volume_row("B", 1, 50.0)],
            // fees without a tvl or volume row are dropped
            &[fee_row("C", 1, 5.0)],
        );

        assert_eq!(health.len(), 2);
        let b = health.iter().find(|h| h.pool == "B").unwrap();
        assert_eq!(b.tvl_usd, 0.0);
        assert_eq!(b.volume_tvl_ratio, 0.0);
        assert_eq!(b.daily_fees_usd, 0.0);
    }

    #[test]
    fn test_flow_stability_uses_sample_std_per_pool() {
        let calculator = HealthCalculator::default();
        let health = calculator.calculate(
            &[
                tvl_row("A", 1, 100.0, 100.0),
                tvl_row("A", 2, 300.0, 200.0),
                tvl_row("B", 1, 50.0, 50.0),
            ],
            &[],
            &[],
        );

        let a2 = health.iter().find(|h| h.pool == "A" && h.date == date(2)).unwrap();
        let b1 = health.iter().find(|h| h.pool == "B").unwrap();
        let expected = (5000.0f64).sqrt();
        assert!((a2.flow_stability - expected).abs() < 1e-9);
        assert_eq!(b1.flow_stability, 0.0);
        assert!((a2.flow_stability_normalized - (1.0 - expected / (expected + 1.0))).abs() < 1e-12);
    }

    #[test]
    fn test_efficiency_score_bounds() {
        let calculator = HealthCalculator::default();
        let tvl: Vec<DailyPoolMetric> = (1..=10)
            .map(|d| tvl_row("A", d, 5_000.0 * d as f64, if d % 2 == 0 { 5_000.0 } else { -2_000.0 }))
            .collect();
        let volume: Vec<DailyPoolVolume> = (1..=10).map(|d| volume_row("A", d, 90_000.0)).collect();
        let fees: Vec<DailyPoolFees> = (1..=10).map(|d| fee_row("A", d, 400.0)).collect();

        for h in calculator.calculate(&tvl, &volume, &fees) {
            assert!(h.efficiency_score >= 0.0 && h.efficiency_score <= 100.0, "{:?}", h);
            assert!(h.fee_apy >= 0.0 && h.fee_apy <= 10.0);
        }
    }

    #[test]
    fn test_summarize_latest_day() {
        let calculator = HealthCalculator::default();
        let health = calculator.calculate(
            &[
                tvl_row("A", 1, 100.0, 100.0),
                tvl_row("A", 2, 300.0, 200.0),
                tvl_row("B", 2, 900.0, 900.0),
            ],
            &[volume_row("B", 2, 20.0)],
            &[],
        );

        let summary = calculator.summarize(&health).unwrap();
        assert_eq!(summary.snapshot_date, date(2));
        assert_eq!(summary.total_tvl_usd, 1200.0);
        assert_eq!(summary.total_pools, 2);
        assert_eq!(summary.top_pools_by_tvl[0].pool, "B");
        assert!(calculator.summarize(&[]).is_none());
    }
}
