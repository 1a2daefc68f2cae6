#![allow(clippy::extra_unused_lifetimes)]

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use diesel::prelude::*;
use field_count::FieldCount;
use serde::{Deserialize, Serialize};

use super::{to_decimal, to_decimal_opt};
use crate::db::postgres::schema::{daily_swap_metrics, swap_pool_metrics};
use crate::processors::events::volume_calculator::{DailySwapMetric, PoolSwapMetric};

#[derive(Debug, Deserialize, Serialize, Clone, FieldCount, Insertable)]
#[diesel(table_name = swap_pool_metrics)]
pub struct NewSwapPoolMetric {
    pub pool: String,
    pub total_volume_usd: BigDecimal,
    pub total_fees_usd: Option<BigDecimal>,
    pub swap_count: i64,
    pub unique_traders: i64,
    pub avg_swap_size_usd: BigDecimal,
}

impl From<&PoolSwapMetric> for NewSwapPoolMetric {
    fn from(m: &PoolSwapMetric) -> Self {
        Self {
            pool: m.pool.clone(),
            total_volume_usd: to_decimal(m.total_volume_usd),
            total_fees_usd: to_decimal_opt(m.total_fees_usd),
            swap_count: m.swap_count,
            unique_traders: m.unique_traders,
            avg_swap_size_usd: to_decimal(m.avg_swap_size_usd),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, FieldCount, Insertable)]
#[diesel(table_name = daily_swap_metrics)]
pub struct NewDailySwapMetric {
    pub date: NaiveDate,
    pub daily_volume_usd: BigDecimal,
    pub daily_fees_usd: Option<BigDecimal>,
    pub swap_count: i64,
    pub unique_traders: i64,
    pub avg_swap_size_usd: BigDecimal,
    pub cumulative_volume_usd: BigDecimal,
    pub cumulative_fees_usd: Option<BigDecimal>,
    pub volume_ma7: BigDecimal,
    pub volume_ma30: BigDecimal,
}

impl From<&DailySwapMetric> for NewDailySwapMetric {
    fn from(m: &DailySwapMetric) -> Self {
        Self {
            date: m.date,
            daily_volume_usd: to_decimal(m.daily_volume_usd),
            daily_fees_usd: to_decimal_opt(m.daily_fees_usd),
            swap_count: m.swap_count,
            unique_traders: m.unique_traders,
            avg_swap_size_usd: to_decimal(m.avg_swap_size_usd),
            cumulative_volume_usd: to_decimal(m.cumulative_volume_usd),
            cumulative_fees_usd: to_decimal_opt(m.cumulative_fees_usd),
            volume_ma7: to_decimal(m.volume_ma7),
            volume_ma30: to_decimal(m.volume_ma30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fees_stay_null() {
        let metric = PoolSwapMetric {
            pool: "MUSD/BTC".to_string(),
            total_volume_usd: 0.0,
            total_fees_usd: None,
            swap_count: 0,
            unique_traders: 0,
            avg_swap_size_usd: 0.0,
        };

        let row = NewSwapPoolMetric::from(&metric);

        assert!(row.total_fees_usd.is_none());
        assert_eq!(row.total_volume_usd, to_decimal(0.0));
    }

    #[test]
    fn test_rows_serialize_with_decimal_amounts() {
        let metric = PoolSwapMetric {
            pool: "MUSD/BTC".to_string(),
            total_volume_usd: 1500.25,
            total_fees_usd: Some(3.5),
            swap_count: 4,
            unique_traders: 2,
            avg_swap_size_usd: 375.0625,
        };

        let row = NewSwapPoolMetric::from(&metric);
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["pool"], "MUSD/BTC");
        assert!(!json["total_volume_usd"].is_null());

        let back: NewSwapPoolMetric = serde_json::from_value(json).unwrap();
        assert_eq!(back.total_volume_usd, row.total_volume_usd);
        assert_eq!(back.total_fees_usd, row.total_fees_usd);
    }
}
