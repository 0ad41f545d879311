//! 滑动窗口异常检测
//!
//! 每种模式维护一个有界的时间戳队列。每次追加时先剔除窗口外的时间戳，
//! 剩余数量达到阈值即产生告警；同一告警在冷却期内不会重复产生。

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};

use super::alerts::Alert;
use crate::config::MetricsConfig;
use crate::core::record::LogRecord;

/// 单个模式的滑动窗口
#[derive(Debug, Clone)]
pub struct AnomalyWindow {
    alert_type: &'static str,
    events: VecDeque<DateTime<Utc>>,
    capacity: usize,
    window: Duration,
    threshold: usize,
    cooldown: Duration,
    last_alert: Option<DateTime<Utc>>,
}

impl AnomalyWindow {
    pub fn new(
        alert_type: &'static str,
        capacity: usize,
        window: Duration,
        threshold: usize,
        cooldown: Duration,
    ) -> Self {
        Self {
            alert_type,
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            window,
            threshold,
            cooldown,
            last_alert: None,
        }
    }

    pub fn alert_type(&self) -> &'static str {
        self.alert_type
    }

    /// 窗口内的事件数
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let window_start = now - self.window;
        while self.events.front().is_some_and(|t| *t < window_start) {
            self.events.pop_front();
        }
    }

    /// 追加一次事件；达到阈值且不在冷却期时返回告警
    pub fn record(&mut self, now: DateTime<Utc>) -> Option<Alert> {
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(now);
        self.prune(now);

        let count = self.events.len();
        if count < self.threshold {
            return None;
        }
        if self.last_alert.is_some_and(|last| now - last < self.cooldown) {
            return None;
        }
        self.last_alert = Some(now);
        Some(Alert::new(self.alert_type, count, now, self.window))
    }
}

/// 异常检测器
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    /// 模式名 → 窗口
    windows: BTreeMap<&'static str, AnomalyWindow>,
    slow_request_secs: f64,
}

impl AnomalyDetector {
    pub fn new(config: &MetricsConfig) -> Self {
        let window = config.window();
        let cooldown = config.alert_cooldown();
        let capacity = config.window_capacity;

        let mut windows = BTreeMap::new();
        windows.insert(
            "errors",
            AnomalyWindow::new("error_spike", capacity, window, config.error_spike_threshold, cooldown),
        );
        windows.insert(
            "auth_failures",
            AnomalyWindow::new(
                "auth_failure_spike",
                capacity,
                window,
                config.auth_failure_threshold,
                cooldown,
            ),
        );
        windows.insert(
            "slow_requests",
            AnomalyWindow::new(
                "performance_degradation",
                capacity,
                window,
                config.slow_request_threshold,
                cooldown,
            ),
        );

        Self {
            windows,
            slow_request_secs: config.slow_request_secs,
        }
    }

    /// 记录命中的模式
    pub fn matching_patterns(&self, record: &LogRecord) -> Vec<&'static str> {
        let mut patterns = Vec::new();
        if record.level().is_error() {
            patterns.push("errors");
        }
        if record.message().to_lowercase().contains("authentication failed") {
            patterns.push("auth_failures");
        }
        if record
            .request_duration()
            .is_some_and(|duration| duration > self.slow_request_secs)
        {
            patterns.push("slow_requests");
        }
        patterns
    }

    /// 检查一条记录，返回产生的告警
    pub fn observe(&mut self, record: &LogRecord, now: DateTime<Utc>) -> Vec<Alert> {
        self.matching_patterns(record)
            .into_iter()
            .filter_map(|pattern| self.windows.get_mut(pattern)?.record(now))
            .collect()
    }

    pub fn window(&self, pattern: &str) -> Option<&AnomalyWindow> {
        self.windows.get(pattern)
    }
}
