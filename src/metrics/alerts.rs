//! 告警
//!
//! 告警通过 [`AlertNotifier`] 交给外部通知方（邮件、IM 等），同时写入带 TTL 的
//! 最近告警缓存供健康检查与看板读取。通知失败只计数，不影响日志投递。

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::fmt::Debug;
use tracing::warn;

use crate::error::Result;

/// 异常告警
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// 告警类型，如 `error_spike`
    pub alert_type: String,
    /// 窗口内的事件数
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    pub window_secs: i64,
}

impl Alert {
    pub fn new(alert_type: impl Into<String>, count: usize, timestamp: DateTime<Utc>, window: Duration) -> Self {
        Self {
            alert_type: alert_type.into(),
            count,
            timestamp,
            window_secs: window.num_seconds(),
        }
    }

    /// 告警标题，如 `[AURA ALERT] Error Spike Detected`
    pub fn subject(&self) -> String {
        let title = self
            .alert_type
            .split('_')
            .filter(|word| !word.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
        format!("[AURA ALERT] {} Detected", title)
    }

    pub fn body(&self) -> String {
        let window = if self.window_secs % 60 == 0 {
            format!("{} minutes", self.window_secs / 60)
        } else {
            format!("{} seconds", self.window_secs)
        };
        format!(
            "Detected {} occurrences of {} in the last {}.",
            self.count, self.alert_type, window
        )
    }

    /// 最近告警缓存中的键
    pub fn cache_key(&self) -> String {
        format!("alert:{}:{}", self.alert_type, self.timestamp.timestamp_millis())
    }
}

/// 告警通知方
#[async_trait]
pub trait AlertNotifier: Send + Sync + Debug {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// 以 `tracing` 警告输出告警的通知方
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl AlertNotifier for TracingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        warn!(
            alert_type = %alert.alert_type,
            count = alert.count,
            "{}: {}",
            alert.subject(),
            alert.body()
        );
        Ok(())
    }
}

/// 最近告警缓存
#[derive(Debug, Clone)]
pub struct AlertCache {
    cache: Cache<String, Alert>,
}

impl AlertCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).max_capacity(1_000).build(),
        }
    }

    pub async fn insert(&self, alert: Alert) {
        self.cache.insert(alert.cache_key(), alert).await;
    }

    /// 未过期的告警，按时间排序
    pub fn recent(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self.cache.iter().map(|(_, alert)| alert).collect();
        alerts.sort_by_key(|alert| alert.timestamp);
        alerts
    }
}
