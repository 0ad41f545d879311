//! 熔断器
//!
//! 三态熔断器（Closed / Open / HalfOpen），包装任意可能失败的异步操作。
//! 状态转换在调用时惰性判定，所有转换与计数都在同一把锁内完成。

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// 熔断器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// 熔断器状态快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitState {
    pub state: BreakerState,
    pub failure_count: u32,
    pub last_failure_time: Option<Instant>,
    pub opened_at: Option<Instant>,
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl CircuitState {
    pub fn is_open(&self) -> bool {
        self.state != BreakerState::Closed
    }
}

/// 熔断器打开时拒绝调用的错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("circuit '{circuit_name}' is open after {failure_count} failures (open for {open_duration:?})")]
pub struct CircuitOpenError {
    pub circuit_name: String,
    pub failure_count: u32,
    pub open_duration: Duration,
}

/// 经由熔断器调用的错误
#[derive(Debug, thiserror::Error)]
pub enum CallError<E> {
    /// 熔断器打开，操作未执行
    #[error(transparent)]
    Open(CircuitOpenError),
    /// 操作本身失败
    #[error(transparent)]
    Inner(E),
}

impl<E> CallError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }
}

/// 调用的准入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Normal,
    Probe,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// 三态熔断器
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time: None,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> CircuitState {
        let inner = self.lock();
        CircuitState {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure_time: inner.last_failure_time,
            opened_at: inner.opened_at,
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// 经由熔断器执行异步操作，并记录其结果
    pub async fn call<T, E, F, Fut>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit_at(Instant::now()).map_err(CallError::Open)?;
        let mut guard = ProbeGuard {
            breaker: self,
            admission,
            finished: false,
        };

        let result = op().await;
        guard.finished = true;
        match result {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure_at(admission, Instant::now());
                Err(CallError::Inner(e))
            }
        }
    }

    /// 判定本次调用能否执行
    pub(crate) fn admit_at(&self, now: Instant) -> Result<Admission, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => Ok(Admission::Normal),
            BreakerState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    info!(circuit = %self.name, "Circuit breaker half-open, sending probe");
                    Ok(Admission::Probe)
                } else {
                    Err(self.open_error(&inner, now))
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(self.open_error(&inner, now))
                } else {
                    inner.probe_in_flight = true;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn open_error(&self, inner: &BreakerInner, now: Instant) -> CircuitOpenError {
        CircuitOpenError {
            circuit_name: self.name.clone(),
            failure_count: inner.failure_count,
            open_duration: inner
                .opened_at
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or_default(),
        }
    }

    pub(crate) fn record_success(&self, admission: Admission) {
        let mut inner = self.lock();
        match (admission, inner.state) {
            (Admission::Probe, _) => {
                inner.state = BreakerState::Closed;
                inner.failure_count = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
                info!(circuit = %self.name, "Circuit breaker closed");
            }
            (Admission::Normal, BreakerState::Closed) => {
                inner.failure_count = 0;
            }
            // 熔断器打开前放行的调用迟到的成功结果
            (Admission::Normal, _) => {}
        }
    }

    pub(crate) fn record_failure_at(&self, admission: Admission, now: Instant) {
        let mut inner = self.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        match (admission, inner.state) {
            (Admission::Probe, _) => {
                inner.state = BreakerState::Open;
                inner.last_failure_time = Some(now);
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
                warn!(
                    circuit = %self.name,
                    failures = inner.failure_count,
                    "Circuit breaker probe failed, reopening"
                );
            }
            (Admission::Normal, BreakerState::Closed) => {
                inner.last_failure_time = Some(now);
                if inner.failure_count >= self.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(now);
                    warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        "Circuit breaker opened"
                    );
                }
            }
            (Admission::Normal, _) => {}
        }
    }

    /// 探测调用被取消时释放探测位，熔断器回到打开状态
    fn abandon_probe(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen && inner.probe_in_flight {
            inner.state = BreakerState::Open;
            inner.probe_in_flight = false;
        }
    }
}

struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    finished: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if !self.finished && self.admission == Admission::Probe {
            self.breaker.abandon_probe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new("test", 3, Duration::from_secs(30))
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..2 {
            let admission = cb.admit_at(now).unwrap();
            cb.record_failure_at(admission, now);
        }
        assert_eq!(cb.state(), BreakerState::Closed);

        let admission = cb.admit_at(now).unwrap();
        cb.record_failure_at(admission, now);
        assert_eq!(cb.state(), BreakerState::Open);
        assert!(cb.admit_at(now + Duration::from_secs(29)).is_err());
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..2 {
            cb.record_failure_at(Admission::Normal, now);
        }
        cb.record_success(Admission::Normal);
        assert_eq!(cb.snapshot().failure_count, 0);

        for _ in 0..2 {
            cb.record_failure_at(Admission::Normal, now);
        }
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_single_probe() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(Admission::Normal, now);
        }

        let later = now + Duration::from_secs(30);
        assert_eq!(cb.admit_at(later).unwrap(), Admission::Probe);
        assert_eq!(cb.state(), BreakerState::HalfOpen);
        // 探测进行中，其余调用快速失败
        assert!(cb.admit_at(later).is_err());

        cb.record_success(Admission::Probe);
        assert_eq!(cb.state(), BreakerState::Closed);
        assert_eq!(cb.snapshot().failure_count, 0);
        assert_eq!(cb.admit_at(later).unwrap(), Admission::Normal);
    }

    #[test]
    fn test_failed_probe_reopens() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(Admission::Normal, now);
        }

        let later = now + Duration::from_secs(31);
        let admission = cb.admit_at(later).unwrap();
        cb.record_failure_at(admission, later);
        assert_eq!(cb.state(), BreakerState::Open);
        assert_eq!(cb.snapshot().last_failure_time, Some(later));
        assert!(cb.admit_at(later + Duration::from_secs(10)).is_err());
        assert!(cb.admit_at(later + Duration::from_secs(30)).is_ok());
    }

    #[test]
    fn test_late_failure_while_open() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..3 {
            cb.record_failure_at(Admission::Normal, now);
        }
        cb.record_failure_at(Admission::Normal, now + Duration::from_secs(20));
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.failure_count, 4);
        assert_eq!(snapshot.last_failure_time, Some(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_rejects_without_invoking() {
        let cb = CircuitBreaker::new("sink", 2, Duration::from_secs(5));
        let attempts = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let attempts = Arc::clone(&attempts);
            let result: Result<(), CallError<&str>> = cb
                .call(|| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err("down")
                })
                .await;
            assert!(matches!(result, Err(CallError::Inner("down"))));
        }
        assert_eq!(cb.state(), BreakerState::Open);

        let counter = Arc::clone(&attempts);
        let result: Result<(), CallError<&str>> = cb
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_circuit_open());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(5)).await;
        let result: Result<u32, CallError<&str>> = cb.call(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(cb.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_released() {
        let cb = CircuitBreaker::new("sink", 1, Duration::from_secs(1));
        let _: Result<(), CallError<&str>> = cb.call(|| async { Err("down") }).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let pending = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<(), &str>(())
        });
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(cb.state(), BreakerState::Open);

        // 再次调用成为新的探测
        let result: Result<(), CallError<&str>> = cb.call(|| async { Ok(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_error_messages() {
        let cb = CircuitBreaker::new("sink:tcp", 1, Duration::from_secs(30));
        let failed: Result<(), CallError<std::io::Error>> = cb
            .call(|| async { Err(std::io::Error::other("connection reset")) })
            .await;
        assert_eq!(failed.unwrap_err().to_string(), "connection reset");

        let rejected: Result<(), CallError<std::io::Error>> = cb.call(|| async { Ok(()) }).await;
        let message = rejected.unwrap_err().to_string();
        assert!(message.starts_with("circuit 'sink:tcp' is open after 1 failures"));
    }
}
