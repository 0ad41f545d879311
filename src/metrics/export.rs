//! 指标导出

use async_trait::async_trait;
use moka::future::Cache;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use super::collector::MetricPoint;
use crate::error::Result;

/// 外部指标存储
#[async_trait]
pub trait MetricsExporter: Send + Sync + Debug {
    async fn export(&self, points: &[MetricPoint]) -> Result<()>;
}

/// 进程内指标存储：每个指标一张 秒 → 值 的表，整张表带 TTL
///
/// 每次导出时丢弃比该指标最新桶早 TTL 以上的桶，持续活跃的指标也不会无限增长。
#[derive(Debug, Clone)]
pub struct InMemoryMetricsStore {
    series: Cache<String, BTreeMap<i64, f64>>,
    retention_secs: i64,
}

impl InMemoryMetricsStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            series: Cache::builder().time_to_live(ttl).build(),
            retention_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }

    /// 某个指标已导出的全部桶
    pub async fn get(&self, metric: &str) -> Option<BTreeMap<i64, f64>> {
        self.series.get(metric).await
    }

    /// 某个指标最新一个桶的值
    pub async fn latest(&self, metric: &str) -> Option<(i64, f64)> {
        self.get(metric)
            .await
            .and_then(|buckets| buckets.last_key_value().map(|(k, v)| (*k, *v)))
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.iter().map(|(name, _)| name.to_string()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl MetricsExporter for InMemoryMetricsStore {
    async fn export(&self, points: &[MetricPoint]) -> Result<()> {
        let mut grouped: BTreeMap<&str, BTreeMap<i64, f64>> = BTreeMap::new();
        for point in points {
            grouped
                .entry(point.name.as_str())
                .or_default()
                .insert(point.timestamp, point.value);
        }

        for (name, buckets) in grouped {
            let mut merged = self.series.get(name).await.unwrap_or_default();
            merged.extend(buckets);
            if let Some(newest) = merged.last_key_value().map(|(ts, _)| *ts) {
                let cutoff = newest.saturating_sub(self.retention_secs);
                merged = merged.split_off(&cutoff);
            }
            // 重新写入会刷新 TTL
            self.series.insert(name.to_string(), merged).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(name: &str, timestamp: i64, value: f64) -> MetricPoint {
        MetricPoint {
            name: name.to_string(),
            timestamp,
            value,
        }
    }

    #[tokio::test]
    async fn test_export_merges_buckets() {
        let store = InMemoryMetricsStore::new(Duration::from_secs(3600));
        store
            .export(&[point("error_rate", 10, 1.0), point("log_level_info", 10, 4.0)])
            .await
            .unwrap();
        store
            .export(&[point("error_rate", 10, 2.0), point("error_rate", 11, 5.0)])
            .await
            .unwrap();

        let errors = store.get("error_rate").await.unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[&10], 2.0);
        assert_eq!(store.latest("error_rate").await, Some((11, 5.0)));
        assert_eq!(store.metric_names(), vec!["error_rate", "log_level_info"]);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_active_metric_drops_expired_buckets() {
        let store = InMemoryMetricsStore::new(Duration::from_secs(3600));
        for hour in 0..48 {
            store
                .export(&[point("error_rate", hour * 3600, 1.0)])
                .await
                .unwrap();
        }

        let errors = store.get("error_rate").await.unwrap();
        assert_eq!(errors.keys().copied().collect::<Vec<_>>(), vec![46 * 3600, 47 * 3600]);
        assert_eq!(store.latest("error_rate").await, Some((47 * 3600, 1.0)));
    }
}
