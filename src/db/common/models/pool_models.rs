#![allow(clippy::extra_unused_lifetimes)]

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use field_count::FieldCount;
use serde::{Deserialize, Serialize};

use super::{to_decimal, to_decimal_opt};
use crate::db::postgres::schema::{daily_pool_metrics, pool_health_metrics, pool_tvl_snapshots};
use crate::processors::events::health_calculator::PoolHealthMetric;
use crate::processors::events::tvl_calculator::{DailyPoolMetric, PoolTvlSnapshot, ProtocolDailyMetric};

#[derive(Debug, Deserialize, Serialize, Clone, FieldCount, Insertable)]
#[diesel(table_name = pool_tvl_snapshots)]
pub struct NewPoolTvlSnapshot {
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub current_tvl_usd: BigDecimal,
    pub current_tvl_token0_usd: BigDecimal,
    pub current_tvl_token1_usd: BigDecimal,
    pub first_transaction: NaiveDateTime,
    pub last_transaction: NaiveDateTime,
    pub total_transactions: i64,
    pub unique_users: i64,
}

impl From<&PoolTvlSnapshot> for NewPoolTvlSnapshot {
    fn from(s: &PoolTvlSnapshot) -> Self {
        Self {
            pool: s.pool.clone(),
            token0: s.token0.clone(),
            token1: s.token1.clone(),
            current_tvl_usd: to_decimal(s.current_tvl_usd),
            current_tvl_token0_usd: to_decimal(s.current_tvl_token0_usd),
            current_tvl_token1_usd: to_decimal(s.current_tvl_token1_usd),
            first_transaction: s.first_transaction,
            last_transaction: s.last_transaction,
            total_transactions: s.total_transactions,
            unique_users: s.unique_users,
        }
    }
}

/// One pool-day, or a protocol-wide day when `pool` is `ALL_POOLS`.
#[derive(Debug, Deserialize, Serialize, Clone, FieldCount, Insertable)]
#[diesel(table_name = daily_pool_metrics)]
pub struct NewDailyPoolMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub tvl_usd: BigDecimal,
    pub tvl_token0_usd: BigDecimal,
    pub tvl_token1_usd: BigDecimal,
    pub daily_net_flow_usd: BigDecimal,
    pub daily_deposits_usd: BigDecimal,
    pub daily_withdrawals_usd: BigDecimal,
    pub transaction_count: i64,
    pub deposit_count: i64,
    pub withdrawal_count: i64,
    pub unique_users: i64,
    pub active_pools: Option<i64>,
    pub tvl_change: Option<BigDecimal>,
    pub tvl_change_pct: Option<BigDecimal>,
    pub tvl_usd_ma7: BigDecimal,
    pub daily_net_flow_ma7: BigDecimal,
}

impl From<&DailyPoolMetric> for NewDailyPoolMetric {
    fn from(m: &DailyPoolMetric) -> Self {
        Self {
            date: m.date,
            pool: m.pool.clone(),
            tvl_usd: to_decimal(m.tvl_usd),
            tvl_token0_usd: to_decimal(m.tvl_token0_usd),
            tvl_token1_usd: to_decimal(m.tvl_token1_usd),
            daily_net_flow_usd: to_decimal(m.daily_net_flow_usd),
            daily_deposits_usd: to_decimal(m.daily_deposits_usd),
            daily_withdrawals_usd: to_decimal(m.daily_withdrawals_usd),
            transaction_count: m.transaction_count,
            deposit_count: m.deposit_count,
            withdrawal_count: m.withdrawal_count,
            unique_users: m.unique_users,
            active_pools: None,
            tvl_change: to_decimal_opt(m.tvl_change),
            tvl_change_pct: to_decimal_opt(m.tvl_change_pct),
            tvl_usd_ma7: to_decimal(m.tvl_usd_ma7),
            daily_net_flow_ma7: to_decimal(m.daily_net_flow_ma7),
        }
    }
}

impl From<&ProtocolDailyMetric> for NewDailyPoolMetric {
    fn from(m: &ProtocolDailyMetric) -> Self {
        Self {
            date: m.date,
            pool: m.pool.clone(),
            tvl_usd: to_decimal(m.tvl_usd),
            tvl_token0_usd: to_decimal(m.tvl_token0_usd),
            tvl_token1_usd: to_decimal(m.tvl_token1_usd),
            daily_net_flow_usd: to_decimal(m.daily_net_flow_usd),
            daily_deposits_usd: to_decimal(m.daily_deposits_usd),
            daily_withdrawals_usd: to_decimal(m.daily_withdrawals_usd),
            transaction_count: m.transaction_count,
            deposit_count: m.deposit_count,
            withdrawal_count: m.withdrawal_count,
            unique_users: m.unique_users,
            active_pools: Some(m.active_pools),
            tvl_change: to_decimal_opt(m.tvl_change),
            tvl_change_pct: to_decimal_opt(m.tvl_change_pct),
            tvl_usd_ma7: to_decimal(m.tvl_usd_ma7),
            daily_net_flow_ma7: to_decimal(m.daily_net_flow_ma7),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, FieldCount, Insertable)]
#[diesel(table_name = pool_health_metrics)]
pub struct NewPoolHealthMetric {
    pub date: NaiveDate,
    pub pool: String,
    pub tvl_usd: BigDecimal,
    pub daily_volume_usd: BigDecimal,
    pub daily_fees_usd: BigDecimal,
    pub daily_net_flow_usd: BigDecimal,
    pub volume_tvl_ratio: BigDecimal,
    pub fee_apy: BigDecimal,
    pub flow_stability: BigDecimal,
    pub flow_stability_normalized: BigDecimal,
    pub efficiency_score: BigDecimal,
    pub tvl_concentration: BigDecimal,
}

impl From<&PoolHealthMetric> for NewPoolHealthMetric {
    fn from(h: &PoolHealthMetric) -> Self {
        Self {
            date: h.date,
            pool: h.pool.clone(),
            tvl_usd: to_decimal(h.tvl_usd),
            daily_volume_usd: to_decimal(h.daily_volume_usd),
            daily_fees_usd: to_decimal(h.daily_fees_usd),
            daily_net_flow_usd: to_decimal(h.daily_net_flow_usd),
            volume_tvl_ratio: to_decimal(h.volume_tvl_ratio),
            fee_apy: to_decimal(h.fee_apy),
            flow_stability: to_decimal(h.flow_stability),
            flow_stability_normalized: to_decimal(h.flow_stability_normalized),
            efficiency_score: to_decimal(h.efficiency_score),
            tvl_concentration: to_decimal(h.tvl_concentration),
        }
    }
}
