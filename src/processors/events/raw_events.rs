use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::bucket_calculator::BucketCalculator;
use crate::errors::PipelineError;

/// Liquidity add/remove event from the pools subgraph (`mints` / `burns`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawEvent {
    #[serde(rename = "timestamp_", deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "contractId_")]
    pub contract_address: String,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub amount0: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub amount1: Option<String>,
    #[serde(rename = "transactionHash_")]
    pub transaction_hash: String,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSwap {
    #[serde(rename = "timestamp_", deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "contractId_")]
    pub contract_address: String,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(rename = "amount0In", default, deserialize_with = "de_opt_numeric_string")]
    pub amount0_in: Option<String>,
    #[serde(rename = "amount0Out", default, deserialize_with = "de_opt_numeric_string")]
    pub amount0_out: Option<String>,
    #[serde(rename = "amount1In", default, deserialize_with = "de_opt_numeric_string")]
    pub amount1_in: Option<String>,
    #[serde(rename = "amount1Out", default, deserialize_with = "de_opt_numeric_string")]
    pub amount1_out: Option<String>,
    #[serde(rename = "transactionHash_")]
    pub transaction_hash: String,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub block_number: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawFee {
    #[serde(rename = "timestamp_", deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    #[serde(rename = "contractId_")]
    pub contract_address: String,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub amount0: Option<String>,
    #[serde(default, deserialize_with = "de_opt_numeric_string")]
    pub amount1: Option<String>,
    #[serde(rename = "transactionHash_")]
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTokenRef {
    pub symbol: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPoolRef {
    pub name: String,
    pub token0: RawTokenRef,
    pub token1: RawTokenRef,
}

/// Cumulative Tigris pool statistic (`poolVolumes` or `feesStats`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawPoolStat {
    #[serde(deserialize_with = "de_string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: i64,
    pub pool: RawPoolRef,
    #[serde(rename = "totalVolume0", alias = "totalFees0", default, deserialize_with = "de_opt_numeric_string")]
    pub total0: Option<String>,
    #[serde(rename = "totalVolume1", alias = "totalFees1", default, deserialize_with = "de_opt_numeric_string")]
    pub total1: Option<String>,
}

/// Deserialize subgraph records into typed rows, naming the table on failure.
pub fn parse_records<T: DeserializeOwned>(table: &str, records: &[Value]) -> Result<Vec<T>, PipelineError> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            T::deserialize(record)
                .map_err(|e| PipelineError::data_shape(table, format!("record {}: {}", i, e)))
        })
        .collect()
}

fn de_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let raw = match &value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {}", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {:?}: {}", s, e)))?,
        other => return Err(serde::de::Error::custom(format!("invalid timestamp {}", other))),
    };
    Ok(BucketCalculator::normalize_timestamp(raw))
}

fn de_opt_numeric_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    })
}

fn de_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {}", other))),
    }
}
