use ahash::AHashMap;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::str::FromStr;
use strum::{Display, EnumString};
use tracing::{debug, info};

use super::bucket_calculator::BucketCalculator;
use super::constants::{is_pegged, price_feed_id, standardize_symbol, token_decimals, PRICE_FEED_IDS};
use super::raw_events::{RawEvent, RawFee, RawPoolStat, RawSwap};
use crate::config::pool_registry::PoolRegistry;
use crate::errors::PipelineError;

/// Rescale a raw integer amount by the token's decimals.
pub fn normalize_token_amount(symbol: &str, raw_amount: &BigDecimal) -> BigDecimal {
    let divisor = BigDecimal::from(10_u64.pow(token_decimals(symbol)));
    raw_amount / divisor
}

/// Human units as `f64`. Null or empty input is zero; anything else must parse.
pub fn parse_token_amount(symbol: &str, raw: Option<&str>) -> Result<f64, String> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(0.0),
        Some(raw) => raw,
    };
    let raw_amount = BigDecimal::from_str(raw).map_err(|e| format!("invalid amount {:?}: {}", raw, e))?;
    normalize_token_amount(symbol, &raw_amount)
        .to_f64()
        .ok_or_else(|| format!("amount {:?} is not representable", raw))
}

/// Point-in-time USD prices keyed by feed id.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: AHashMap<String, f64>,
}

impl PriceTable {
    pub fn new(prices: AHashMap<String, f64>) -> Self {
        Self { prices }
    }

    /// Parse a `simple/price` body: `{<id>: {"usd": <float>}}`.
    pub fn from_feed_response(body: &Value) -> Result<Self, PipelineError> {
        let obj = body
            .as_object()
            .ok_or_else(|| PipelineError::data_shape("simple/price", "response is not an object"))?;
        let prices: AHashMap<String, f64> = obj
            .iter()
            .filter_map(|(id, quote)| quote.get("usd").and_then(Value::as_f64).map(|usd| (id.clone(), usd)))
            .collect();
        if prices.is_empty() {
            return Err(PipelineError::data_shape(
                "simple/price",
                "no token prices received from price feed",
            ));
        }
        Ok(Self { prices })
    }

    /// Comma-separated list of every feed id we price.
    pub fn feed_ids() -> String {
        PRICE_FEED_IDS.iter().map(|(_, id)| *id).collect::<Vec<_>>().join(",")
    }

    /// USD rate for a token symbol; Mezo stables are pegged at 1.0.
    pub fn usd_rate(&self, symbol: &str) -> Result<f64, PipelineError> {
        let symbol = standardize_symbol(symbol);
        if is_pegged(symbol) {
            return Ok(1.0);
        }
        price_feed_id(symbol)
            .and_then(|id| self.prices.get(id).copied())
            .ok_or_else(|| PipelineError::MissingPrice {
                symbol: symbol.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Swap,
}

/// Liquidity event in human units with USD values attached.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedTransaction {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub pool: String,
    pub contract_address: String,
    pub sender: Option<String>,
    pub token0: String,
    pub token1: String,
    pub amount0: f64,
    pub amount1: f64,
    pub token0_usd_rate: f64,
    pub token1_usd_rate: f64,
    pub amount0_usd: f64,
    pub amount1_usd: f64,
    pub transaction_type: TransactionType,
    pub transaction_hash: String,
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizedSwap {
    pub timestamp: i64,
    pub date: NaiveDate,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub user: Option<String>,
    pub amount0_in: f64,
    pub amount0_out: f64,
    pub amount1_in: f64,
    pub amount1_out: f64,
    pub amount0_in_usd: f64,
    pub amount0_out_usd: f64,
    pub amount1_in_usd: f64,
    pub amount1_out_usd: f64,
    pub transaction_hash: String,
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NormalizedFee {
    pub timestamp: i64,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub amount0: f64,
    pub amount1: f64,
    pub fee0_usd: f64,
    pub fee1_usd: f64,
    pub transaction_hash: String,
}

/// Tigris cumulative statistic in human units.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedPoolStat {
    pub id: String,
    pub timestamp: i64,
    pub date: NaiveDate,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub total0: f64,
    pub total1: f64,
    pub total0_usd: f64,
    pub total1_usd: f64,
}

/// Applies decimals and prices to raw subgraph rows.
pub struct TokenNormalizer<'a> {
    registry: &'a PoolRegistry,
    prices: &'a PriceTable,
    buckets: BucketCalculator,
}

impl<'a> TokenNormalizer<'a> {
    pub fn new(registry: &'a PoolRegistry, prices: &'a PriceTable) -> Self {
        Self {
            registry,
            prices,
            buckets: BucketCalculator::new(),
        }
    }

    fn amount(&self, pool: &str, timestamp: i64, symbol: &str, raw: Option<&str>) -> Result<f64, PipelineError> {
        parse_token_amount(symbol, raw).map_err(|message| PipelineError::Numeric {
            pool: pool.to_string(),
            timestamp,
            message,
        })
    }

    fn date(&self, pool: &str, timestamp: i64) -> Result<NaiveDate, PipelineError> {
        self.buckets
            .bucket_date(timestamp)
            .ok_or_else(|| PipelineError::Numeric {
                pool: pool.to_string(),
                timestamp,
                message: "timestamp out of range".to_string(),
            })
    }

    pub fn normalize_liquidity_events(
        &self,
        table: &str,
        events: &[RawEvent],
        transaction_type: TransactionType,
    ) -> Result<Vec<NormalizedTransaction>, PipelineError> {
        let mut out = Vec::with_capacity(events.len());
        for event in events {
            let pool = self.registry.resolve(table, &event.contract_address)?;
            let amount0 = self.amount(&pool.name, event.timestamp, &pool.token0, event.amount0.as_deref())?;
            let amount1 = self.amount(&pool.name, event.timestamp, &pool.token1, event.amount1.as_deref())?;
            let token0_usd_rate = self.prices.usd_rate(&pool.token0)?;
            let token1_usd_rate = self.prices.usd_rate(&pool.token1)?;

            out.push(NormalizedTransaction {
                timestamp: event.timestamp,
                date: self.date(&pool.name, event.timestamp)?,
                pool: pool.name.clone(),
                contract_address: event.contract_address.clone(),
                sender: event.sender.clone(),
                token0: standardize_symbol(&pool.token0).to_string(),
                token1: standardize_symbol(&pool.token1).to_string(),
                amount0,
                amount1,
                token0_usd_rate,
                token1_usd_rate,
                amount0_usd: amount0 * token0_usd_rate,
                amount1_usd: amount1 * token1_usd_rate,
                transaction_type,
                transaction_hash: event.transaction_hash.clone(),
                block_number: event.block_number.clone(),
            });
        }
        info!("🧮 Normalized {} {} events from {}", out.len(), transaction_type, table);
        Ok(out)
    }

    pub fn normalize_swaps(&self, swaps: &[RawSwap]) -> Result<Vec<NormalizedSwap>, PipelineError> {
        let mut out = Vec::with_capacity(swaps.len());
        for swap in swaps {
            let pool = self.registry.resolve("swaps", &swap.contract_address)?;
            let (name, ts) = (&pool.name, swap.timestamp);
            let amount0_in = self.amount(name, ts, &pool.token0, swap.amount0_in.as_deref())?;
            let amount0_out = self.amount(name, ts, &pool.token0, swap.amount0_out.as_deref())?;
            let amount1_in = self.amount(name, ts, &pool.token1, swap.amount1_in.as_deref())?;
            let amount1_out = self.amount(name, ts, &pool.token1, swap.amount1_out.as_deref())?;
            let rate0 = self.prices.usd_rate(&pool.token0)?;
            let rate1 = self.prices.usd_rate(&pool.token1)?;

            out.push(NormalizedSwap {
                timestamp: ts,
                date: self.date(name, ts)?,
                pool: name.clone(),
                token0: standardize_symbol(&pool.token0).to_string(),
                token1: standardize_symbol(&pool.token1).to_string(),
                user: swap.to.clone(),
                amount0_in,
                amount0_out,
                amount1_in,
                amount1_out,
                amount0_in_usd: amount0_in * rate0,
                amount0_out_usd: amount0_out * rate0,
                amount1_in_usd: amount1_in * rate1,
                amount1_out_usd: amount1_out * rate1,
                transaction_hash: swap.transaction_hash.clone(),
                block_number: swap.block_number.clone(),
            });
        }
        info!("🧮 Normalized {} swaps", out.len());
        Ok(out)
    }

    pub fn normalize_fees(&self, fees: &[RawFee]) -> Result<Vec<NormalizedFee>, PipelineError> {
        let mut out = Vec::with_capacity(fees.len());
        for fee in fees {
            let pool = self.registry.resolve("fees", &fee.contract_address)?;
            let amount0 = self.amount(&pool.name, fee.timestamp, &pool.token0, fee.amount0.as_deref())?;
            let amount1 = self.amount(&pool.name, fee.timestamp, &pool.token1, fee.amount1.as_deref())?;
            let rate0 = self.prices.usd_rate(&pool.token0)?;
            let rate1 = self.prices.usd_rate(&pool.token1)?;

            out.push(NormalizedFee {
                timestamp: fee.timestamp,
                pool: pool.name.clone(),
                token0: standardize_symbol(&pool.token0).to_string(),
                token1: standardize_symbol(&pool.token1).to_string(),
                amount0,
                amount1,
                fee0_usd: amount0 * rate0,
                fee1_usd: amount1 * rate1,
                transaction_hash: fee.transaction_hash.clone(),
            });
        }
        info!("🧮 Normalized {} swap fee events", out.len());
        Ok(out)
    }

    /// Tigris stats carry their own token symbols; decimals use the raw symbol.
    pub fn normalize_pool_stats(&self, table: &str, stats: &[RawPoolStat]) -> Result<Vec<NormalizedPoolStat>, PipelineError> {
        let mut out = Vec::with_capacity(stats.len());
        for stat in stats {
            let pool = self.registry.tigris_pool_name(&stat.pool.name);
            let raw0 = &stat.pool.token0.symbol;
            let raw1 = &stat.pool.token1.symbol;
            let total0 = self.amount(&pool, stat.timestamp, raw0, stat.total0.as_deref())?;
            let total1 = self.amount(&pool, stat.timestamp, raw1, stat.total1.as_deref())?;
            let rate0 = self.prices.usd_rate(raw0)?;
            let rate1 = self.prices.usd_rate(raw1)?;
            debug!("📈 {} stat {} for {}: {} / {}", table, stat.id, pool, total0, total1);

            out.push(NormalizedPoolStat {
                id: stat.id.clone(),
                timestamp: stat.timestamp,
                date: self.date(&pool, stat.timestamp)?,
                token0: standardize_symbol(raw0).to_string(),
                token1: standardize_symbol(raw1).to_string(),
                pool,
                total0,
                total1,
                total0_usd: total0 * rate0,
                total1_usd: total1 * rate1,
            });
        }
        info!("🧮 Normalized {} records from {}", out.len(), table);
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) fn test_prices() -> PriceTable {
    let mut prices = AHashMap::new();
    prices.insert("bitcoin".to_string(), 100_000.0);
    prices.insert("usd-coin".to_string(), 1.0);
    prices.insert("solv-btc".to_string(), 99_000.0);
    prices.insert("threshold-network-token".to_string(), 0.02);
    PriceTable::new(prices)
}
