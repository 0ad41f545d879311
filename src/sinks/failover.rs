//! 故障转移路由
//!
//! 按注册顺序持有多个输出，跟踪每个输出的健康状况。当前主输出失败时，
//! 依次尝试其余健康的输出；成功的输出成为新的主输出。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use super::traits::{Sink, SinkError, SinkKind, SinkMetadata, SinkResult};
use crate::config::FailoverConfig;
use crate::core::record::LogRecord;
use crate::emergency::EmergencyWriter;

/// 单个输出的健康状况
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinkHealth {
    pub failures: u32,
    pub successes: u64,
    pub total_records: u64,
    pub is_healthy: bool,
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(skip)]
    last_failure_at: Option<Instant>,
}

impl SinkHealth {
    fn new() -> Self {
        Self {
            failures: 0,
            successes: 0,
            total_records: 0,
            is_healthy: true,
            last_failure_time: None,
            last_failure_at: None,
        }
    }
}

/// 故障转移路由
#[derive(Debug)]
pub struct FailoverRouter {
    ids: Vec<String>,
    sinks: Vec<Arc<dyn Sink>>,
    health: Mutex<Vec<SinkHealth>>,
    current_primary: AtomicUsize,
    failover_threshold: u32,
    recovery_after: Duration,
    emergency: EmergencyWriter,
}

impl FailoverRouter {
    /// 按注册顺序创建路由；重复的标识会追加序号
    pub fn new(sinks: Vec<(String, Arc<dyn Sink>)>, config: &FailoverConfig) -> Self {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(sinks.len());
        let mut handles = Vec::with_capacity(sinks.len());
        for (id, sink) in sinks {
            let mut unique = id.clone();
            let mut n = 1;
            while !seen.insert(unique.clone()) {
                n += 1;
                unique = format!("{}#{}", id, n);
            }
            ids.push(unique);
            handles.push(sink);
        }
        let health = vec![SinkHealth::new(); handles.len()];

        Self {
            ids,
            sinks: handles,
            health: Mutex::new(health),
            current_primary: AtomicUsize::new(0),
            failover_threshold: config.failover_threshold.max(1),
            recovery_after: config.recovery_after(),
            emergency: EmergencyWriter::failover(),
        }
    }

    fn lock_health(&self) -> MutexGuard<'_, Vec<SinkHealth>> {
        self.health.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 当前主输出的标识
    pub fn current_primary(&self) -> Option<&str> {
        self.ids
            .get(self.current_primary.load(Ordering::Acquire))
            .map(String::as_str)
    }

    /// 所有输出的健康状况
    pub fn list_sink_health(&self) -> BTreeMap<String, SinkHealth> {
        let health = self.lock_health();
        self.ids
            .iter()
            .cloned()
            .zip(health.iter().cloned())
            .collect()
    }

    pub fn emergency_writes(&self) -> u64 {
        self.emergency.writes()
    }

    /// 输出是否可用；不健康的输出在最后一次失败超过恢复时间后自动恢复
    fn is_available(&self, index: usize, now: Instant) -> bool {
        let mut health = self.lock_health();
        let Some(entry) = health.get_mut(index) else {
            return false;
        };
        if !entry.is_healthy {
            let recovered = entry
                .last_failure_at
                .map(|t| now.saturating_duration_since(t) > self.recovery_after)
                .unwrap_or(true);
            if recovered {
                entry.is_healthy = true;
                entry.failures = 0;
                info!(sink = %self.ids[index], "Sink auto-recovered");
            }
        }
        entry.is_healthy
    }

    async fn try_sink(&self, index: usize, batch: &[LogRecord]) -> bool {
        let result = self.sinks[index].deliver(batch).await;

        let mut health = self.lock_health();
        let entry = &mut health[index];
        match result {
            Ok(()) => {
                entry.successes += 1;
                entry.total_records += batch.len() as u64;
                entry.is_healthy = true;
                true
            }
            Err(e) => {
                entry.failures = entry.failures.saturating_add(1);
                entry.last_failure_at = Some(Instant::now());
                entry.last_failure_time = Some(Utc::now());
                warn!(sink = %self.ids[index], failures = entry.failures, "Sink delivery failed: {}", e);
                if entry.is_healthy && entry.failures >= self.failover_threshold {
                    entry.is_healthy = false;
                    warn!(sink = %self.ids[index], "Sink marked unhealthy");
                }
                false
            }
        }
    }

    /// 依次尝试各输出投递一批记录
    pub async fn route(&self, batch: &[LogRecord]) -> SinkResult<()> {
        let now = Instant::now();
        let primary = self.current_primary.load(Ordering::Acquire);
        let mut attempted = 0;

        if primary < self.sinks.len() && self.is_available(primary, now) {
            attempted += 1;
            if self.try_sink(primary, batch).await {
                return Ok(());
            }
        }

        for index in 0..self.sinks.len() {
            if index == primary || !self.is_available(index, now) {
                continue;
            }
            attempted += 1;
            if self.try_sink(index, batch).await {
                let previous = self.current_primary.swap(index, Ordering::AcqRel);
                if previous != index {
                    info!(
                        from = self.ids.get(previous).map(String::as_str).unwrap_or("none"),
                        to = %self.ids[index],
                        "Failover switched primary sink"
                    );
                }
                return Ok(());
            }
        }

        Err(SinkError::AllSinksFailed { attempted })
    }

    /// 投递单条记录；所有输出都失败时写入紧急输出
    pub async fn emit(&self, record: LogRecord) {
        let batch = [record];
        if self.route(&batch).await.is_err() {
            self.emergency.write_all(&batch);
        }
    }
}

#[async_trait]
impl Sink for FailoverRouter {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        self.route(batch).await
    }

    async fn shutdown(&self) -> SinkResult<()> {
        let mut first_error = None;
        for (id, sink) in self.ids.iter().zip(&self.sinks) {
            if let Err(e) = sink.shutdown().await {
                warn!(sink = %id, "Sink shutdown failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "failover"
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::new("failover", SinkKind::Failover)
            .with_description(format!("Failover over [{}]", self.ids.join(", ")))
    }
}
