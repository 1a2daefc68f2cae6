use ahash::AHashSet;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::http::{HttpResponse, HttpTransport};
use crate::errors::PipelineError;

pub const BIGQUERY_API: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Rows per `insertAll` request and per MERGE statement.
const BATCH_SIZE: usize = 500;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    Bool,
    Date,
    Datetime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "STRING",
            ColumnType::Int64 => "INT64",
            ColumnType::Float64 => "FLOAT64",
            ColumnType::Bool => "BOOL",
            ColumnType::Date => "DATE",
            ColumnType::Datetime => "DATETIME",
        }
    }

    /// Column type for a JSON value; `None` for null.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Bool),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Int64),
            Value::Number(_) => Some(ColumnType::Float64),
            Value::String(s) if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() => Some(ColumnType::Date),
            Value::String(s) if parse_datetime(s).is_some() => Some(ColumnType::Datetime),
            _ => Some(ColumnType::String),
        }
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Serialize typed records into flat JSON rows.
///
/// Nested objects become `parent_child` columns, so `pool.token0.symbol`
/// lands in `pool_token0_symbol`.
pub fn to_rows<T: Serialize>(table: &str, items: &[T]) -> Result<Vec<Row>, PipelineError> {
    items
        .iter()
        .map(|item| match serde_json::to_value(item) {
            Ok(Value::Object(map)) => {
                let mut row = Row::new();
                flatten_into(&mut row, None, map);
                Ok(row)
            },
            Ok(other) => Err(PipelineError::data_shape(table, format!("row is not an object: {}", other))),
            Err(e) => Err(PipelineError::data_shape(table, e)),
        })
        .collect()
}

fn flatten_into(row: &mut Row, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let column = match prefix {
            Some(p) => format!("{}_{}", p, key),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(row, Some(&column), inner),
            other => {
                row.insert(column, other);
            },
        }
    }
}

/// Column order from the first row; each type from the first non-null value.
pub fn infer_schema(rows: &[Row]) -> Vec<(String, ColumnType)> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .keys()
        .map(|column| {
            let ty = rows
                .iter()
                .filter_map(|row| row.get(column).and_then(ColumnType::of))
                .next()
                .unwrap_or(ColumnType::String);
            (column.clone(), ty)
        })
        .collect()
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n"))
}

fn sql_literal(value: &Value, ty: ColumnType) -> String {
    match (value, ty) {
        (Value::Null, _) => "NULL".to_string(),
        (Value::Bool(b), _) => b.to_string().to_uppercase(),
        (Value::Number(n), ColumnType::Float64) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.1}", f),
            _ => n.to_string(),
        },
        (Value::Number(n), _) => n.to_string(),
        (Value::String(s), ColumnType::Date) => format!("DATE {}", quote(s)),
        (Value::String(s), ColumnType::Datetime) => format!("DATETIME {}", quote(&s.replace('T', " "))),
        (Value::String(s), _) => quote(s),
        (other, _) => quote(&other.to_string()),
    }
}

/// One row key for id deduplication.
fn id_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// MERGE `rows` into `target` on `key_columns` from an inline UNNEST source.
pub fn build_merge_query(
    target: &str,
    schema: &[(String, ColumnType)],
    rows: &[Row],
    key_columns: &[&str],
) -> Result<String, PipelineError> {
    for key in key_columns {
        if !schema.iter().any(|(c, _)| c == key) {
            return Err(PipelineError::data_shape(target, format!("key column '{}' not in rows", key)));
        }
    }

    let struct_type = schema
        .iter()
        .map(|(c, ty)| format!("`{}` {}", c, ty.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    let tuples = rows
        .iter()
        .map(|row| {
            let values = schema
                .iter()
                .map(|(c, ty)| sql_literal(row.get(c).unwrap_or(&Value::Null), *ty))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({})", values)
        })
        .collect::<Vec<_>>();
    let source = format!("SELECT * FROM UNNEST([STRUCT<{}>{}])", struct_type, tuples.join(", "));

    let on = key_columns
        .iter()
        .map(|k| format!("target.`{0}` = source.`{0}`", k))
        .collect::<Vec<_>>()
        .join(" AND ");
    let columns: Vec<&str> = schema.iter().map(|(c, _)| c.as_str()).filter(|c| *c != "id").collect();
    let updates = columns
        .iter()
        .filter(|c| !key_columns.contains(c))
        .map(|c| format!("`{0}` = source.`{0}`", c))
        .collect::<Vec<_>>();
    let insert_columns = columns.iter().map(|c| format!("`{}`", c)).collect::<Vec<_>>().join(", ");
    let insert_values = columns.iter().map(|c| format!("source.`{}`", c)).collect::<Vec<_>>().join(", ");

    let mut sql = format!("MERGE `{}` AS target\nUSING ({}) AS source\nON {}\n", target, source, on);
    if !updates.is_empty() {
        sql.push_str(&format!("WHEN MATCHED THEN\n  UPDATE SET {}\n", updates.join(", ")));
    }
    sql.push_str(&format!(
        "WHEN NOT MATCHED THEN\n  INSERT ({})\n  VALUES ({})",
        insert_columns, insert_values
    ));
    Ok(sql)
}

/// BigQuery REST v2 warehouse sink.
#[derive(Clone)]
pub struct BigQueryClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    project_id: String,
    access_token: String,
    location: String,
}

impl BigQueryClient {
    pub fn new(transport: Arc<dyn HttpTransport>, project_id: &str, access_token: &str) -> Self {
        Self::with_base_url(transport, BIGQUERY_API, project_id, access_token)
    }

    pub fn with_base_url(transport: Arc<dyn HttpTransport>, base_url: &str, project_id: &str, access_token: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            access_token: access_token.to_string(),
            location: "US".to_string(),
        }
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![("Authorization".to_string(), format!("Bearer {}", self.access_token))]
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.base_url, self.project_id)
    }

    fn table_url(&self, dataset: &str, table: &str) -> String {
        format!("{}/datasets/{}/tables/{}", self.project_url(), dataset, table)
    }

    fn full_name(&self, dataset: &str, table: &str) -> String {
        format!("{}.{}.{}", self.project_id, dataset, table)
    }

    fn check(&self, table: &str, response: HttpResponse) -> Result<Value, PipelineError> {
        if !response.is_success() {
            return Err(PipelineError::sink(
                table,
                format!("HTTP {}: {}", response.status, response.excerpt()),
            ));
        }
        Ok(response.body)
    }

    pub async fn table_exists(&self, dataset: &str, table: &str) -> Result<bool, PipelineError> {
        let response = self.transport.get_json(&self.table_url(dataset, table), &self.headers(), &[]).await?;
        match response.status {
            404 => Ok(false),
            _ => self.check(table, response).map(|_| true),
        }
    }

    pub async fn ensure_dataset(&self, dataset: &str) -> Result<(), PipelineError> {
        let url = format!("{}/datasets/{}", self.project_url(), dataset);
        let response = self.transport.get_json(&url, &self.headers(), &[]).await?;
        if response.status != 404 {
            return self.check(dataset, response).map(|_| ());
        }

        info!("📁 Creating dataset {}", dataset);
        let body = json!({
            "datasetReference": { "projectId": self.project_id, "datasetId": dataset },
            "location": self.location,
        });
        let response = self
            .transport
            .post_json(&format!("{}/datasets", self.project_url()), &self.headers(), &body)
            .await?;
        self.check(dataset, response).map(|_| ())
    }

    pub async fn create_table(&self, dataset: &str, table: &str, schema: &[(String, ColumnType)]) -> Result<(), PipelineError> {
        let fields: Vec<Value> = schema
            .iter()
            .map(|(name, ty)| json!({ "name": name, "type": ty.as_str(), "mode": "NULLABLE" }))
            .collect();
        let body = json!({
            "tableReference": { "projectId": self.project_id, "datasetId": dataset, "tableId": table },
            "schema": { "fields": fields },
        });
        let url = format!("{}/datasets/{}/tables", self.project_url(), dataset);
        let response = self.transport.post_json(&url, &self.headers(), &body).await?;
        self.check(table, response)?;
        info!("📋 Created table {}.{}", dataset, table);
        Ok(())
    }

    /// Run a standard-SQL query and return every result row.
    pub async fn query(&self, table: &str, sql: &str) -> Result<Vec<Value>, PipelineError> {
        debug!("🧾 BigQuery: {}", sql);
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": 60_000,
            "location": self.location,
        });
        let url = format!("{}/queries", self.project_url());
        let response = self.transport.post_json(&url, &self.headers(), &body).await?;
        let mut page = self.check(table, response)?;

        if page.get("jobComplete").and_then(Value::as_bool) == Some(false) {
            return Err(PipelineError::sink(table, "query did not complete within timeout"));
        }
        let job_id = page
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut rows: Vec<Value> = Vec::new();
        loop {
            if let Some(page_rows) = page.get("rows").and_then(Value::as_array) {
                rows.extend(page_rows.iter().cloned());
            }
            let token = page.get("pageToken").and_then(Value::as_str).map(str::to_string);
            let (Some(token), Some(job_id)) = (token, job_id.as_deref()) else {
                break;
            };
            let query = vec![
                ("pageToken".to_string(), token),
                ("location".to_string(), self.location.clone()),
            ];
            let response = self
                .transport
                .get_json(&format!("{}/queries/{}", self.project_url(), job_id), &self.headers(), &query)
                .await?;
            page = self.check(table, response)?;
        }
        Ok(rows)
    }

    pub async fn existing_ids(&self, dataset: &str, table: &str, id_column: &str) -> Result<AHashSet<String>, PipelineError> {
        let sql = format!("SELECT DISTINCT `{}` FROM `{}`", id_column, self.full_name(dataset, table));
        let rows = self.query(table, &sql).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.pointer("/f/0/v"))
            .filter(|v| !v.is_null())
            .map(id_key)
            .collect())
    }

    /// Stream rows with `tabledata.insertAll`, in batches.
    pub async fn insert_rows(&self, dataset: &str, table: &str, rows: &[Row]) -> Result<(), PipelineError> {
        let url = format!("{}/insertAll", self.table_url(dataset, table));
        for batch in rows.chunks(BATCH_SIZE) {
            let body = json!({
                "skipInvalidRows": false,
                "ignoreUnknownValues": false,
                "rows": batch.iter().map(|row| json!({ "json": row })).collect::<Vec<_>>(),
            });
            let response = self.transport.post_json(&url, &self.headers(), &body).await?;
            let body = self.check(table, response)?;
            if let Some(errors) = body.get("insertErrors").and_then(Value::as_array) {
                if !errors.is_empty() {
                    return Err(PipelineError::sink(
                        table,
                        format!("{} rows rejected, first: {}", errors.len(), errors[0]),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn create_with_rows(&self, dataset: &str, table: &str, rows: &[Row]) -> Result<(), PipelineError> {
        info!("📋 Table {}.{} does not exist. Creating...", dataset, table);
        self.create_table(dataset, table, &infer_schema(rows)).await?;
        self.insert_rows(dataset, table, rows).await?;
        info!("📤 Uploaded {} rows to new table {}.{}", rows.len(), dataset, table);
        Ok(())
    }

    /// Create the table if absent, otherwise append only rows whose `id_column`
    /// is not yet present.
    pub async fn update_table<T: Serialize>(
        &self,
        dataset: &str,
        table: &str,
        items: &[T],
        id_column: &str,
    ) -> Result<usize, PipelineError> {
        let rows = to_rows(table, items)?;
        if rows.is_empty() {
            info!("📊 No rows for {}.{}", dataset, table);
            return Ok(0);
        }
        if let Some(row) = rows.iter().find(|row| !row.contains_key(id_column)) {
            let columns: Vec<&String> = row.keys().collect();
            return Err(PipelineError::data_shape(
                table,
                format!("id column '{}' not found. Available columns: {:?}", id_column, columns),
            ));
        }

        if !self.table_exists(dataset, table).await? {
            self.create_with_rows(dataset, table, &rows).await?;
            return Ok(rows.len());
        }

        let existing = self.existing_ids(dataset, table, id_column).await?;
        let new_rows: Vec<Row> = rows
            .into_iter()
            .filter(|row| row.get(id_column).map(|v| !existing.contains(&id_key(v))).unwrap_or(true))
            .collect();
        if new_rows.is_empty() {
            info!("✅ No new rows to upload to {}.{}", dataset, table);
            return Ok(0);
        }

        info!(
            "📊 Found {} new rows for {}.{} ({} already present)",
            new_rows.len(),
            dataset,
            table,
            existing.len()
        );
        self.insert_rows(dataset, table, &new_rows).await?;
        info!("📤 Uploaded {} new rows to {}.{}", new_rows.len(), dataset, table);
        Ok(new_rows.len())
    }

    /// Create the table if absent, otherwise MERGE rows on `key_columns`.
    pub async fn upsert_table<T: Serialize>(
        &self,
        dataset: &str,
        table: &str,
        items: &[T],
        key_columns: &[&str],
    ) -> Result<usize, PipelineError> {
        let rows = to_rows(table, items)?;
        if rows.is_empty() {
            warn!("⚠️ Nothing to upsert into {}.{}", dataset, table);
            return Ok(0);
        }
        if !self.table_exists(dataset, table).await? {
            self.create_with_rows(dataset, table, &rows).await?;
            return Ok(rows.len());
        }

        let schema = infer_schema(&rows);
        let target = self.full_name(dataset, table);
        for batch in rows.chunks(BATCH_SIZE) {
            let sql = build_merge_query(&target, &schema, batch, key_columns)?;
            self.query(table, &sql).await?;
        }
        info!("✅ Upserted {} rows into {}.{}", rows.len(), dataset, table);
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::http::fake::ScriptedTransport;

    #[derive(Serialize)]
    struct Snapshot {
        pool: String,
        tvl: f64,
        users: i64,
        date: NaiveDate,
        note: Option<String>,
    }

    fn snapshots() -> Vec<Snapshot> {
        vec![
            Snapshot {
                pool: "MUSD/BTC".to_string(),
                tvl: 1000.0,
                users: 3,
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                note: None,
            },
            Snapshot {
                pool: "O'Pool".to_string(),
                tvl: 2.5,
                users: 1,
                date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                note: Some("hi".to_string()),
            },
        ]
    }

    fn client(transport: Arc<ScriptedTransport>) -> BigQueryClient {
        BigQueryClient::with_base_url(transport, "https://bq.test/v2", "proj", "token")
    }

    #[test]
    fn test_infer_schema_keeps_order_and_types() {
        let rows = to_rows("t", &snapshots()).unwrap();
        let schema = infer_schema(&rows);
        assert_eq!(
            schema,
            vec![
                ("pool".to_string(), ColumnType::String),
                ("tvl".to_string(), ColumnType::Float64),
                ("users".to_string(), ColumnType::Int64),
                ("date".to_string(), ColumnType::Date),
                // first row is null, second decides
                ("note".to_string(), ColumnType::String),
            ]
        );
    }

    #[test]
    fn test_merge_query_shape() {
        let rows = to_rows("t", &snapshots()).unwrap();
        let schema = infer_schema(&rows);
        let sql = build_merge_query("proj.marts.m_pools_tvl_snapshot", &schema, &rows, &["pool"]).unwrap();
        println!("{}", sql);

        assert!(sql.starts_with("MERGE `proj.marts.m_pools_tvl_snapshot` AS target"));
        assert!(sql.contains("STRUCT<`pool` STRING, `tvl` FLOAT64, `users` INT64, `date` DATE, `note` STRING>"));
        assert!(sql.contains("('MUSD/BTC', 1000.0, 3, DATE '2025-01-01', NULL)"));
        assert!(sql.contains("'O\\'Pool'"));
        assert!(sql.contains("ON target.`pool` = source.`pool`"));
        assert!(sql.contains("UPDATE SET `tvl` = source.`tvl`"));
        assert!(!sql.contains("`pool` = source.`pool`,"));
    }

    #[test]
    fn test_nested_objects_are_flattened() {
        let record = json!({
            "id": "7",
            "pool": { "name": "MUSD/BTC", "token0": { "symbol": "MUSD" } },
            "totalVolume0": "10",
        });

        let rows = to_rows("pool_volume_raw", &[record]).unwrap();

        let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(columns, vec!["id", "pool_name", "pool_token0_symbol", "totalVolume0"]);
        assert_eq!(rows[0]["pool_token0_symbol"], "MUSD");
    }

    #[test]
    fn test_merge_query_rejects_unknown_key() {
        let rows = to_rows("t", &snapshots()).unwrap();
        let schema = infer_schema(&rows);
        assert!(build_merge_query("p.d.t", &schema, &rows, &["missing"]).is_err());
    }

    #[tokio::test]
    async fn test_update_table_creates_when_absent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_status(404, json!({ "error": { "code": 404 } }))
            .push_ok(json!({}))
            .push_ok(json!({}));

        let uploaded = client(transport.clone())
            .update_table("raw_data", "pool_tvl", &snapshots(), "pool")
            .await
            .unwrap();

        assert_eq!(uploaded, 2);
        let calls = transport.calls();
        assert_eq!(calls[1].url, "https://bq.test/v2/projects/proj/datasets/raw_data/tables");
        assert_eq!(calls[1].body.as_ref().unwrap()["schema"]["fields"][1]["type"], "FLOAT64");
        assert!(calls[2].url.ends_with("/tables/pool_tvl/insertAll"));
        assert!(calls[0].headers.contains(&("Authorization".to_string(), "Bearer token".to_string())));
    }

    #[tokio::test]
    async fn test_update_table_appends_only_new_ids() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_ok(json!({ "id": "raw_data.pool_tvl" }))
            .push_ok(json!({ "jobComplete": true, "rows": [{ "f": [{ "v": "MUSD/BTC" }] }] }))
            .push_ok(json!({}));

        let uploaded = client(transport.clone())
            .update_table("raw_data", "pool_tvl", &snapshots(), "pool")
            .await
            .unwrap();

        assert_eq!(uploaded, 1);
        let calls = transport.calls();
        assert!(calls[1].body.as_ref().unwrap()["query"]
            .as_str()
            .unwrap()
            .contains("SELECT DISTINCT `pool` FROM `proj.raw_data.pool_tvl`"));
        let inserted = calls[2].body.as_ref().unwrap()["rows"].as_array().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0]["json"]["pool"], "O'Pool");
    }

    #[tokio::test]
    async fn test_update_table_requires_id_column() {
        let transport = Arc::new(ScriptedTransport::new());
        let err = client(transport.clone())
            .update_table("raw_data", "pool_tvl", &snapshots(), "transactionHash_")
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::DataShape { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_merges_into_existing_table() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push_ok(json!({ "id": "marts.m_pools_tvl_snapshot" }))
            .push_ok(json!({ "jobComplete": true }));

        let upserted = client(transport.clone())
            .upsert_table("marts", "m_pools_tvl_snapshot", &snapshots(), &["pool"])
            .await
            .unwrap();

        assert_eq!(upserted, 2);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].body.as_ref().unwrap()["query"].as_str().unwrap().starts_with("MERGE"));
    }

    #[tokio::test]
    async fn test_insert_errors_are_sink_errors() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(json!({ "insertErrors": [{ "index": 0, "errors": [{ "reason": "invalid" }] }] }));
        let rows = to_rows("t", &snapshots()).unwrap();

        let err = client(transport).insert_rows("raw_data", "t", &rows).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sink { .. }));
    }
}
