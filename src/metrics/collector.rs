//! 按秒分桶的指标计数
//!
//! 每条记录按其时间戳落入 `(指标名, unix 秒)` 桶。计数类指标累加，
//! 请求耗时、查询数与内存占用取每秒最大值。

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::record::LogRecord;

/// 单个导出点
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub name: String,
    /// unix 秒
    pub timestamp: i64,
    pub value: f64,
}

/// 指标收集器
#[derive(Debug, Default)]
pub struct MetricsCollector {
    series: BTreeMap<String, BTreeMap<i64, f64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, metric: &str, second: i64) {
        *self
            .series
            .entry(metric.to_string())
            .or_default()
            .entry(second)
            .or_insert(0.0) += 1.0;
    }

    pub fn record_max(&mut self, metric: &str, second: i64, value: f64) {
        let slot = self
            .series
            .entry(metric.to_string())
            .or_default()
            .entry(second)
            .or_insert(value);
        if value > *slot {
            *slot = value;
        }
    }

    /// 从一条记录提取全部指标
    pub fn observe(&mut self, record: &LogRecord) {
        let second = record.timestamp().timestamp();

        self.increment(
            &format!("log_level_{}", record.level().as_str().to_lowercase()),
            second,
        );
        self.increment(&format!("logger_{}", record.logger().replace('.', "_")), second);
        if record.level().is_error() {
            self.increment("error_rate", second);
        }

        if let Some(duration) = record.request_duration() {
            self.record_max("request_duration_ms", second, (duration * 1000.0).trunc());
        }
        if let Some(queries) = record.db_queries() {
            self.record_max("db_queries", second, queries as f64);
        }
        if let Some(memory) = record.memory_percent() {
            self.record_max("memory_usage_percent", second, memory.trunc());
        }

        if record.is_security_event() {
            self.increment("security_events", second);
            if let Some(threat) = record.threat_type() {
                self.increment(&format!("threat_{}", threat), second);
            }
        }

        let message = record.message().to_lowercase();
        if message.contains("authentication failed") || message.contains("login failed") {
            self.increment("auth_failures", second);
        }
    }

    /// 某个桶的值
    pub fn value(&self, metric: &str, second: i64) -> Option<f64> {
        self.series.get(metric)?.get(&second).copied()
    }

    /// 某个指标所有桶的合计
    pub fn total(&self, metric: &str) -> f64 {
        self.series
            .get(metric)
            .map(|buckets| buckets.values().sum())
            .unwrap_or(0.0)
    }

    pub fn metric_names(&self) -> Vec<&str> {
        self.series.keys().map(String::as_str).collect()
    }

    /// 不早于 `since` 的所有桶
    pub fn points_since(&self, since: i64) -> Vec<MetricPoint> {
        self.series
            .iter()
            .flat_map(|(name, buckets)| {
                buckets.range(since..).map(move |(second, value)| MetricPoint {
                    name: name.clone(),
                    timestamp: *second,
                    value: *value,
                })
            })
            .collect()
    }

    /// 删除早于 `cutoff` 的桶，返回删除数量
    pub fn prune_before(&mut self, cutoff: i64) -> usize {
        let mut removed = 0;
        self.series.retain(|_, buckets| {
            let kept = buckets.split_off(&cutoff);
            removed += buckets.len();
            *buckets = kept;
            !buckets.is_empty()
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{keys, LogLevel};
    use chrono::{TimeZone, Utc};

    fn at(second: i64, level: LogLevel, logger: &str, message: &str) -> LogRecord {
        LogRecord::new(level, logger, message).with_timestamp(Utc.timestamp_opt(second, 0).unwrap())
    }

    #[test]
    fn test_level_and_logger_counters() {
        let mut collector = MetricsCollector::new();
        collector.observe(&at(100, LogLevel::Error, "aura.db.pool", "query failed"));
        collector.observe(&at(100, LogLevel::Error, "aura.db.pool", "query failed"));
        collector.observe(&at(101, LogLevel::Info, "aura.api", "ok"));

        assert_eq!(collector.value("log_level_error", 100), Some(2.0));
        assert_eq!(collector.value("logger_aura_db_pool", 100), Some(2.0));
        assert_eq!(collector.value("error_rate", 100), Some(2.0));
        assert_eq!(collector.value("log_level_info", 101), Some(1.0));
        assert_eq!(collector.value("error_rate", 101), None);
    }

    #[test]
    fn test_max_per_second() {
        let mut collector = MetricsCollector::new();
        for duration in [0.25, 1.5, 0.75] {
            collector.observe(
                &at(200, LogLevel::Info, "aura.api", "request")
                    .with_attribute(keys::REQUEST_DURATION, duration)
                    .with_attribute(keys::DB_QUERIES, 3u64),
            );
        }
        collector.observe(
            &at(200, LogLevel::Info, "aura.api", "request").with_attribute(keys::MEMORY_PERCENT, 71.9),
        );

        assert_eq!(collector.value("request_duration_ms", 200), Some(1500.0));
        assert_eq!(collector.value("db_queries", 200), Some(3.0));
        assert_eq!(collector.value("memory_usage_percent", 200), Some(71.0));
    }

    #[test]
    fn test_security_and_auth_counters() {
        let mut collector = MetricsCollector::new();
        collector.observe(
            &at(300, LogLevel::Warning, "aura.auth", "Authentication failed for user")
                .with_attribute(keys::SECURITY_EVENT, true)
                .with_attribute(keys::THREAT_TYPE, "authentication_failed"),
        );
        collector.observe(&at(300, LogLevel::Warning, "aura.auth", "login failed"));

        assert_eq!(collector.value("security_events", 300), Some(1.0));
        assert_eq!(collector.value("threat_authentication_failed", 300), Some(1.0));
        assert_eq!(collector.value("auth_failures", 300), Some(2.0));
    }

    #[test]
    fn test_points_and_prune() {
        let mut collector = MetricsCollector::new();
        for second in [10, 20, 30] {
            collector.observe(&at(second, LogLevel::Info, "a", "m"));
        }

        let recent = collector.points_since(20);
        assert!(recent.iter().all(|p| p.timestamp >= 20));
        assert_eq!(
            recent.iter().filter(|p| p.name == "log_level_info").count(),
            2
        );

        let removed = collector.prune_before(30);
        assert_eq!(removed, 4);
        assert_eq!(collector.total("log_level_info"), 1.0);
        assert_eq!(collector.metric_names(), vec!["log_level_info", "logger_a"]);
    }
}
