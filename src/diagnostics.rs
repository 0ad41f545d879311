//! 定义 AuraLog 日志管道的内部诊断与指标。
//!
//! 此模块提供了对管道入口过滤、清洗以及指标/告警旁路健康状况的可观测性。
//! 缓冲处理器自身的计数见 [`crate::handler::HealthStats`]。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 内部诊断与指标数据结构。
///
/// 使用原子操作确保线程安全。
#[derive(Debug)]
pub struct Diagnostics {
    /// 管道创建时间
    start_time: Instant,

    /// 提交到管道的记录总数
    records_submitted: AtomicU64,

    /// 通过过滤进入缓冲区的记录数
    records_accepted: AtomicU64,

    /// 因级别采样被过滤的记录数
    records_sampled_out: AtomicU64,

    /// 因令牌桶限流被过滤的记录数
    records_rate_limited: AtomicU64,

    /// 因来源熔断被过滤的记录数
    records_circuit_rejected: AtomicU64,

    /// 消息中包含敏感信息并被清洗的记录数
    records_scrubbed: AtomicU64,

    /// 检测到的安全事件数
    security_events: AtomicU64,

    /// 指标队列已满而丢弃的记录数
    metrics_dropped: AtomicU64,

    /// 指标导出失败次数
    metrics_export_failures: AtomicU64,

    /// 触发的告警数
    alerts_fired: AtomicU64,

    /// 告警通知失败次数
    alert_failures: AtomicU64,
}

/// 诊断数据的快照，用于外部查询。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub uptime: Duration,
    pub records_submitted: u64,
    pub records_accepted: u64,
    pub records_sampled_out: u64,
    pub records_rate_limited: u64,
    pub records_circuit_rejected: u64,
    pub records_scrubbed: u64,
    pub security_events: u64,
    pub metrics_dropped: u64,
    pub metrics_export_failures: u64,
    pub alerts_fired: u64,
    pub alert_failures: u64,

    /// 被过滤的记录总数
    pub total_filtered: u64,

    /// 记录通过率（百分比）
    pub acceptance_rate_percent: f64,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    /// 创建新的诊断实例。
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            records_submitted: AtomicU64::new(0),
            records_accepted: AtomicU64::new(0),
            records_sampled_out: AtomicU64::new(0),
            records_rate_limited: AtomicU64::new(0),
            records_circuit_rejected: AtomicU64::new(0),
            records_scrubbed: AtomicU64::new(0),
            security_events: AtomicU64::new(0),
            metrics_dropped: AtomicU64::new(0),
            metrics_export_failures: AtomicU64::new(0),
            alerts_fired: AtomicU64::new(0),
            alert_failures: AtomicU64::new(0),
        }
    }

    pub fn increment_submitted(&self) {
        self.records_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_accepted(&self) {
        self.records_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_sampled_out(&self) {
        self.records_sampled_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.records_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_circuit_rejected(&self) {
        self.records_circuit_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_scrubbed(&self) {
        self.records_scrubbed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_security_events(&self) {
        self.security_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_metrics_dropped(&self) {
        self.metrics_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_metrics_export_failures(&self) {
        self.metrics_export_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alerts_fired(&self) {
        self.alerts_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_alert_failures(&self) {
        self.alert_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取诊断数据的快照。
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let records_submitted = self.records_submitted.load(Ordering::Relaxed);
        let records_accepted = self.records_accepted.load(Ordering::Relaxed);
        let records_sampled_out = self.records_sampled_out.load(Ordering::Relaxed);
        let records_rate_limited = self.records_rate_limited.load(Ordering::Relaxed);
        let records_circuit_rejected = self.records_circuit_rejected.load(Ordering::Relaxed);
        let total_filtered = records_sampled_out + records_rate_limited + records_circuit_rejected;

        let acceptance_rate_percent = if records_submitted > 0 {
            (records_accepted as f64 / records_submitted as f64) * 100.0
        } else {
            100.0
        };

        DiagnosticsSnapshot {
            uptime: self.start_time.elapsed(),
            records_submitted,
            records_accepted,
            records_sampled_out,
            records_rate_limited,
            records_circuit_rejected,
            records_scrubbed: self.records_scrubbed.load(Ordering::Relaxed),
            security_events: self.security_events.load(Ordering::Relaxed),
            metrics_dropped: self.metrics_dropped.load(Ordering::Relaxed),
            metrics_export_failures: self.metrics_export_failures.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            alert_failures: self.alert_failures.load(Ordering::Relaxed),
            total_filtered,
            acceptance_rate_percent,
        }
    }
}
