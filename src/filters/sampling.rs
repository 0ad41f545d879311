//! 采样与限流过滤器
//!
//! 依次执行：按级别随机采样、检查来源熔断、按 (logger, level) 令牌桶限流。
//! 某个来源的限流违规次数超过阈值后，该来源在一段时间内被整体拒绝。
//! 过滤器自身出错时一律放行，日志不会因为过滤器故障而静默消失。

use rand::Rng;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::SamplingConfig;
use crate::core::record::{LogLevel, LogRecord};

/// 过滤结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accepted,
    /// 被级别采样丢弃
    SampledOut,
    /// 令牌不足
    RateLimited,
    /// 来源熔断中
    CircuitOpen,
}

impl FilterVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterVerdict::Accepted)
    }
}

/// 令牌桶
#[derive(Debug, Clone)]
pub struct RateLimitBucket {
    tokens: f64,
    last_update: Instant,
    capacity: f64,
    refill_rate: f64,
}

impl RateLimitBucket {
    /// 创建装满令牌的桶
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            tokens: capacity,
            last_update: now,
            capacity,
            refill_rate,
        }
    }

    /// 按上次观察以来的时间补充令牌，然后尝试消耗一个
    pub fn try_consume(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_update = now.max(self.last_update);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

#[derive(Debug)]
struct KeyState {
    bucket: RateLimitBucket,
    violations: u64,
    open_until: Option<Instant>,
}

type BucketKey = (String, LogLevel);

/// 采样与限流过滤器
#[derive(Debug)]
pub struct SamplingFilter {
    config: SamplingConfig,
    circuit_timeout: Duration,
    keys: Mutex<HashMap<BucketKey, KeyState>>,
}

impl SamplingFilter {
    pub fn new(config: &SamplingConfig) -> Self {
        Self {
            config: config.clone(),
            circuit_timeout: config.circuit_timeout(),
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// 记录是否应进入管道
    pub fn accept(&self, record: &LogRecord) -> bool {
        self.evaluate(record).is_accepted()
    }

    /// 评估一条记录并给出拒绝原因
    pub fn evaluate(&self, record: &LogRecord) -> FilterVerdict {
        let rate = self.config.sample_rate(record.level());
        // 采样率为 1.0 时不抽样
        let draw = if rate >= 1.0 {
            0.0
        } else {
            rand::thread_rng().gen::<f64>()
        };
        self.evaluate_at(record, Instant::now(), draw)
    }

    pub(crate) fn evaluate_at(&self, record: &LogRecord, now: Instant, draw: f64) -> FilterVerdict {
        if !self.config.enabled {
            return FilterVerdict::Accepted;
        }

        let rate = self.config.sample_rate(record.level());
        if rate < 1.0 && draw >= rate {
            return FilterVerdict::SampledOut;
        }

        let mut keys = match self.keys.lock() {
            Ok(keys) => keys,
            Err(_) => {
                warn!("Rate limit state unavailable, accepting record");
                return FilterVerdict::Accepted;
            }
        };

        let key = (record.logger().to_string(), record.level());
        let state = keys.entry(key).or_insert_with(|| KeyState {
            bucket: RateLimitBucket::new(
                self.config.rate_limit_capacity,
                self.config.rate_limit_refill,
                now,
            ),
            violations: 0,
            open_until: None,
        });

        if let Some(until) = state.open_until {
            if now < until {
                return FilterVerdict::CircuitOpen;
            }
            debug!(logger = %record.logger(), level = %record.level(), "Log source circuit closed");
            // 令牌桶保持原状，熔断结束不额外发放令牌
            state.open_until = None;
            state.violations = 0;
        }

        if state.bucket.try_consume(now) {
            return FilterVerdict::Accepted;
        }

        state.violations += 1;
        if state.violations > self.config.violation_threshold {
            state.open_until = Some(now + self.circuit_timeout);
            warn!(
                logger = %record.logger(),
                level = %record.level(),
                violations = state.violations,
                "Log storm detected, opening source circuit for {:?}",
                self.circuit_timeout
            );
        }
        FilterVerdict::RateLimited
    }

    /// 当前处于熔断状态的来源数
    pub fn open_circuits(&self) -> usize {
        let now = Instant::now();
        self.keys
            .lock()
            .map(|keys| {
                keys.values()
                    .filter(|s| s.open_until.is_some_and(|until| now < until))
                    .count()
            })
            .unwrap_or(0)
    }

    /// 已跟踪的 (logger, level) 数量
    pub fn tracked_keys(&self) -> usize {
        self.keys.lock().map(|keys| keys.len()).unwrap_or(0)
    }
}
