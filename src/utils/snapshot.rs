use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOT_VERSION: &str = "1.0.0";

/// Writes per-run metrics files for report generation.
///
/// Each run produces `<pipeline>_metrics_<YYYYMMDD_HHMMSS>.json` and
/// overwrites `<pipeline>_metrics_latest.json` with the same content.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write(&self, pipeline: &str, metrics: Value) -> Result<PathBuf> {
        self.write_at(pipeline, metrics, Utc::now()).await
    }

    pub async fn write_at(&self, pipeline: &str, metrics: Value, now: DateTime<Utc>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create snapshot dir {}", self.dir.display()))?;

        let output = json!({
            "metadata": {
                "generated_at": now.to_rfc3339(),
                "script": pipeline,
                "version": SNAPSHOT_VERSION,
            },
            "metrics": metrics,
        });
        let body = serde_json::to_string_pretty(&output).context("Failed to serialize metrics snapshot")?;

        let stamped = self
            .dir
            .join(format!("{}_metrics_{}.json", pipeline, now.format("%Y%m%d_%H%M%S")));
        let latest = self.dir.join(format!("{}_metrics_latest.json", pipeline));
        for path in [&stamped, &latest] {
            tokio::fs::write(path, &body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        info!("📁 Metrics saved to {} and {}", stamped.display(), latest.display());
        Ok(stamped)
    }
}

/// Dump one intermediate table as a JSON array, for inspecting a run.
pub async fn dump_json<T: Serialize>(dir: &Path, name: &str, rows: &[T]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create dump dir {}", dir.display()))?;
    let path = dir.join(format!("{}.json", name));
    let body = serde_json::to_string_pretty(rows).with_context(|| format!("Failed to serialize {}", name))?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("💾 Dumped {} rows to {}", rows.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mezo-analytics-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_writes_stamped_and_latest() {
        let dir = scratch_dir("snapshot");
        let writer = SnapshotWriter::new(&dir);
        let now = Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap();

        let path = writer
            .write_at("pools", json!({"total_tvl_usd": 1250.5}), now)
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "pools_metrics_20250304_050607.json");
        let latest: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("pools_metrics_latest.json")).unwrap()).unwrap();
        assert_eq!(latest["metadata"]["script"], "pools");
        assert_eq!(latest["metadata"]["version"], SNAPSHOT_VERSION);
        assert_eq!(latest["metrics"]["total_tvl_usd"], 1250.5);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_dump_json_writes_array() {
        #[derive(Serialize)]
        struct Row {
            pool: &'static str,
        }

        let dir = scratch_dir("dump");
        let path = dump_json(&dir, "daily_pool_metrics", &[Row { pool: "MUSD/BTC" }]).await.unwrap();

        let body: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(body, json!([{"pool": "MUSD/BTC"}]));

        std::fs::remove_dir_all(&dir).ok();
    }
}
