//! 缓冲异步处理器
//!
//! 生产者通过 `emit` 把记录非阻塞地放入有界队列；固定数量的工作任务从队列取出记录，
//! 追加到缓冲区，缓冲区满或过期时整批经熔断器交给输出。定时任务负责在低流量时
//! 刷新过期的缓冲区。输出失败只影响内部计数与熔断状态，不会传递给生产者。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::circuit_breaker::{CallError, CircuitBreaker};
use crate::config::HandlerConfig;
use crate::core::record::LogRecord;
use crate::emergency::EmergencyWriter;
use crate::error::{AuraLogError, Result};
use crate::shutdown::{ShutdownHandle, ShutdownListener, ShutdownSignal};
use crate::sinks::Sink;

const MIN_TIMER_TICK: Duration = Duration::from_millis(10);
const MAX_TIMER_TICK: Duration = Duration::from_millis(250);

/// 处理器健康统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthStats {
    /// 成功投递的记录数
    pub records_processed: u64,
    /// 队列已满或已停机时丢弃的记录数
    pub records_dropped: u64,
    /// 刷新次数
    pub flush_count: u64,
    /// 失败的刷新次数
    pub error_count: u64,
    pub circuit_open: bool,
    pub circuit_open_time: Option<DateTime<Utc>>,
    /// 失败批次中未写入紧急输出的记录数
    pub records_discarded: u64,
    pub emergency_writes: u64,
    /// 队列中等待的记录数
    pub queued: usize,
}

/// 刷新的触发原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushTrigger {
    Size,
    Interval,
    Manual,
    Shutdown,
}

impl FlushTrigger {
    fn as_str(&self) -> &'static str {
        match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Interval => "interval",
            FlushTrigger::Manual => "manual",
            FlushTrigger::Shutdown => "shutdown",
        }
    }
}

/// 当前批次的缓冲区
#[derive(Debug, Default)]
struct Buffer {
    records: Vec<LogRecord>,
    /// 本批次第一条记录到达的时间
    opened_at: Option<Instant>,
}

impl Buffer {
    fn push(&mut self, record: LogRecord, now: Instant) {
        if self.records.is_empty() {
            self.opened_at = Some(now);
        }
        self.records.push(record);
    }

    fn is_stale(&self, now: Instant, flush_interval: Duration) -> bool {
        self.opened_at
            .is_some_and(|opened| now.saturating_duration_since(opened) >= flush_interval)
    }

    fn take(&mut self) -> Vec<LogRecord> {
        self.opened_at = None;
        std::mem::take(&mut self.records)
    }
}

/// 一次出队的结果
enum Dequeue {
    /// 取到记录；附带需要刷新的批次
    Record(Option<Vec<LogRecord>>),
    /// 超时未取到记录；附带过期的批次
    Idle(Option<Vec<LogRecord>>),
    /// 队列已关闭
    Closed,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<LogRecord>>>;

#[derive(Debug)]
struct HandlerShared {
    config: HandlerConfig,
    sink: Arc<dyn Sink>,
    breaker: CircuitBreaker,
    buffer: Mutex<Buffer>,
    stats: Mutex<HealthStats>,
    emergency: EmergencyWriter,
    accepting: AtomicBool,
}

impl HandlerShared {
    fn lock_buffer(&self) -> MutexGuard<'_, Buffer> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_stats(&self) -> MutexGuard<'_, HealthStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_dropped(&self) {
        self.lock_stats().records_dropped += 1;
    }

    /// 追加记录；达到批次大小或过期时取出整批
    fn append(&self, record: LogRecord, now: Instant) -> Option<Vec<LogRecord>> {
        let mut buffer = self.lock_buffer();
        buffer.push(record, now);
        if buffer.records.len() >= self.config.buffer_size
            || buffer.is_stale(now, self.config.flush_interval())
        {
            Some(buffer.take())
        } else {
            None
        }
    }

    /// 取出过期的非空批次
    fn take_stale(&self, now: Instant) -> Option<Vec<LogRecord>> {
        let mut buffer = self.lock_buffer();
        if buffer.is_stale(now, self.config.flush_interval()) {
            Some(buffer.take())
        } else {
            None
        }
    }

    /// 经熔断器投递一批记录并更新统计
    async fn flush(&self, batch: &[LogRecord], trigger: FlushTrigger) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len();
        let result = self.breaker.call(|| self.sink.deliver(batch)).await;
        let circuit_open = self.breaker.snapshot().is_open();

        let failed = result.is_err();
        let emergency_count = if failed {
            count.min(self.config.emergency_limit)
        } else {
            0
        };

        {
            let mut stats = self.lock_stats();
            stats.flush_count += 1;
            if failed {
                stats.error_count += 1;
                stats.records_discarded += (count - emergency_count) as u64;
            } else {
                stats.records_processed += count as u64;
            }
            if circuit_open && !stats.circuit_open {
                stats.circuit_open_time = Some(Utc::now());
            } else if !circuit_open {
                stats.circuit_open_time = None;
            }
            stats.circuit_open = circuit_open;
        }

        match result {
            Ok(()) => {
                debug!(records = count, trigger = trigger.as_str(), "Flushed batch");
            }
            Err(CallError::Open(e)) => {
                debug!(records = count, "Batch not delivered: {}", e);
            }
            Err(CallError::Inner(e)) => {
                warn!(
                    sink = %self.sink.name(),
                    records = count,
                    trigger = trigger.as_str(),
                    "Batch delivery failed: {}",
                    e
                );
            }
        }

        if failed {
            self.emergency.write_all(&batch[..emergency_count]);
        }
    }
}

/// 缓冲异步处理器
#[derive(Debug)]
pub struct BufferedAsyncHandler {
    sender: mpsc::Sender<LogRecord>,
    receiver: SharedReceiver,
    shared: Arc<HandlerShared>,
    shutdown: ShutdownHandle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BufferedAsyncHandler {
    /// 在当前 tokio 运行时中启动工作任务与定时任务
    pub fn start(config: HandlerConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            AuraLogError::initialization("BufferedAsyncHandler requires a running tokio runtime")
        })?;
        if config.buffer_size == 0 {
            return Err(AuraLogError::validation("buffer_size must be greater than 0"));
        }
        if config.max_workers == 0 {
            return Err(AuraLogError::validation("max_workers must be greater than 0"));
        }

        let (sender, receiver) = mpsc::channel(config.queue_capacity());
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let shutdown = ShutdownHandle::new(config.shutdown_timeout());

        let shared = Arc::new(HandlerShared {
            breaker: CircuitBreaker::new(
                format!("sink:{}", sink.name()),
                config.failure_threshold,
                config.recovery_timeout(),
            ),
            buffer: Mutex::new(Buffer::default()),
            stats: Mutex::new(HealthStats::default()),
            emergency: EmergencyWriter::handler(),
            accepting: AtomicBool::new(true),
            config,
            sink,
        });

        let mut tasks = Vec::with_capacity(shared.config.max_workers + 1);
        for worker_id in 0..shared.config.max_workers {
            let listener = shutdown.create_listener(format!("worker-{}", worker_id));
            tasks.push(runtime.spawn(run_worker(
                Arc::clone(&shared),
                Arc::clone(&receiver),
                listener,
            )));
        }
        let listener = shutdown.create_listener("flush-timer");
        tasks.push(runtime.spawn(run_timer(Arc::clone(&shared), listener)));

        info!(
            sink = %shared.sink.name(),
            buffer_size = shared.config.buffer_size,
            workers = shared.config.max_workers,
            "Buffered handler started"
        );

        Ok(Self {
            sender,
            receiver,
            shared,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }

    /// 非阻塞提交；队列已满或已停机时丢弃并计数
    pub fn emit(&self, record: LogRecord) {
        if !self.shared.accepting.load(Ordering::Acquire) {
            self.shared.record_dropped();
            return;
        }
        if let Err(e) = self.sender.try_send(record) {
            self.shared.record_dropped();
            if let mpsc::error::TrySendError::Full(_) = e {
                debug!("Handler queue full, record dropped");
            }
        }
    }

    /// 健康统计快照
    pub fn get_health_stats(&self) -> HealthStats {
        let mut stats = self.shared.lock_stats().clone();
        stats.emergency_writes = self.shared.emergency.writes();
        stats.queued = self.sender.max_capacity() - self.sender.capacity();
        stats
    }

    /// 包装输出的熔断器
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.shared.breaker
    }

    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.shared.sink
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// 立即刷新：把队列中已有的记录并入缓冲区，按批次大小分段投递
    ///
    /// 返回本次交给输出的记录数。停机后调用不做任何事。
    pub async fn flush(&self) -> usize {
        if !self.is_accepting() {
            return 0;
        }
        let pending = {
            let mut receiver = self.receiver.lock().await;
            let now = Instant::now();
            let mut buffer = self.shared.lock_buffer();
            while let Ok(record) = receiver.try_recv() {
                buffer.push(record, now);
            }
            buffer.take()
        };
        for chunk in pending.chunks(self.shared.config.buffer_size) {
            self.shared.flush(chunk, FlushTrigger::Manual).await;
        }
        pending.len()
    }

    /// 优雅停机：停止接收，等待任务退出，排空队列并最后刷新一次，然后关闭输出
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.begin()?;
        self.shared.accepting.store(false, Ordering::Release);
        self.shutdown.signal(ShutdownSignal::Graceful);

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let joined = self.shutdown.join_tasks(tasks).await;
        debug!(
            joined = joined.joined,
            abandoned = joined.abandoned,
            "Handler tasks stopped"
        );

        let limit = self.shutdown.timeout();
        let mut timed_out = false;

        match timeout(limit, self.receiver.lock()).await {
            Ok(mut receiver) => {
                receiver.close();
                let now = Instant::now();
                let mut buffer = self.shared.lock_buffer();
                while let Ok(record) = receiver.try_recv() {
                    buffer.push(record, now);
                }
            }
            Err(_) => {
                warn!("Handler queue still locked, skipping drain");
                timed_out = true;
            }
        }

        let remaining = self.shared.lock_buffer().take();
        if !remaining.is_empty() {
            info!(records = remaining.len(), "Flushing remaining records");
            let final_flush = async {
                for chunk in remaining.chunks(self.shared.config.buffer_size) {
                    self.shared.flush(chunk, FlushTrigger::Shutdown).await;
                }
            };
            if timeout(limit, final_flush).await.is_err() {
                error!("Final flush did not complete within {:?}", limit);
                timed_out = true;
            }
        }

        match timeout(limit, self.shared.sink.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(sink = %self.shared.sink.name(), "Sink shutdown failed: {}", e),
            Err(_) => {
                warn!(sink = %self.shared.sink.name(), "Sink shutdown timed out");
                timed_out = true;
            }
        }

        self.shutdown.complete();
        if timed_out {
            Err(AuraLogError::ShutdownTimeout)
        } else {
            Ok(())
        }
    }
}

impl Drop for BufferedAsyncHandler {
    fn drop(&mut self) {
        if !self.shutdown.is_shutting_down() {
            self.shutdown.signal(ShutdownSignal::Immediate);
            for task in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
                task.abort();
            }
        }
    }
}

/// 出队并追加到缓冲区；出队与追加都在接收端锁内完成
async fn poll_record(shared: &HandlerShared, receiver: &SharedReceiver) -> Dequeue {
    let mut receiver = receiver.lock().await;
    match timeout(shared.config.poll_interval(), receiver.recv()).await {
        Ok(Some(record)) => Dequeue::Record(shared.append(record, Instant::now())),
        Ok(None) => Dequeue::Closed,
        Err(_) => Dequeue::Idle(shared.take_stale(Instant::now())),
    }
}

async fn run_worker(
    shared: Arc<HandlerShared>,
    receiver: SharedReceiver,
    mut listener: ShutdownListener,
) {
    debug!(worker = %listener.component_name(), "Worker started");
    loop {
        let poll = tokio::select! {
            _ = listener.wait_for_shutdown() => break,
            poll = poll_record(&shared, &receiver) => poll,
        };
        match poll {
            Dequeue::Record(Some(batch)) => shared.flush(&batch, FlushTrigger::Size).await,
            Dequeue::Idle(Some(batch)) => shared.flush(&batch, FlushTrigger::Interval).await,
            Dequeue::Record(None) | Dequeue::Idle(None) => {}
            Dequeue::Closed => break,
        }
    }
    debug!(worker = %listener.component_name(), "Worker stopped");
}

/// 定时任务的检查周期
fn timer_tick(flush_interval: Duration) -> Duration {
    (flush_interval / 20).clamp(MIN_TIMER_TICK, MAX_TIMER_TICK)
}

async fn run_timer(shared: Arc<HandlerShared>, mut listener: ShutdownListener) {
    let mut ticker = interval(timer_tick(shared.config.flush_interval()));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = listener.wait_for_shutdown() => break,
            _ = ticker.tick() => {
                if let Some(batch) = shared.take_stale(Instant::now()) {
                    shared.flush(&batch, FlushTrigger::Interval).await;
                }
            }
        }
    }
    debug!("Flush timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::LogLevel;
    use crate::sinks::traits::testing::MockSink;

    fn config(buffer_size: usize) -> HandlerConfig {
        HandlerConfig {
            buffer_size,
            ..HandlerConfig::default()
        }
    }

    fn record(i: usize) -> LogRecord {
        LogRecord::new(LogLevel::Info, "aura.handler", format!("record {}", i))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[test]
    fn test_start_requires_runtime() {
        let result = BufferedAsyncHandler::start(config(10), MockSink::new("mock"));
        assert!(matches!(result, Err(AuraLogError::InitializationError(_))));
    }

    #[test]
    fn test_timer_tick_clamped() {
        assert_eq!(timer_tick(Duration::from_secs(5)), Duration::from_millis(250));
        assert_eq!(timer_tick(Duration::from_millis(400)), Duration::from_millis(20));
        assert_eq!(timer_tick(Duration::ZERO), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_triggered_flushes() {
        let sink = MockSink::new("mock");
        let handler = BufferedAsyncHandler::start(config(10), sink.clone()).unwrap();

        for chunk in 0..4 {
            for i in 0..10 {
                handler.emit(record(chunk * 10 + i));
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        settle().await;

        let stats = handler.get_health_stats();
        assert_eq!(stats.flush_count, 4);
        assert_eq!(stats.records_processed, 40);
        assert_eq!(stats.records_dropped, 0);
        assert_eq!(sink.batch_sizes(), vec![10, 10, 10, 10]);

        let messages: Vec<String> = sink.records().iter().map(|r| r.message().to_string()).collect();
        assert_eq!(messages[0], "record 0");
        assert_eq!(messages[39], "record 39");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_forces_single_flush() {
        let sink = MockSink::new("mock");
        let handler = BufferedAsyncHandler::start(config(100), sink.clone()).unwrap();

        for i in 0..5 {
            handler.emit(record(i));
        }
        settle().await;
        assert_eq!(handler.get_health_stats().flush_count, 0);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handler.get_health_stats().flush_count, 1);
        assert_eq!(sink.batch_sizes(), vec![5]);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(handler.get_health_stats().flush_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_uses_emergency_writer() {
        let sink = MockSink::failing("mock");
        let handler = BufferedAsyncHandler::start(
            HandlerConfig {
                buffer_size: 5,
                emergency_limit: 3,
                ..HandlerConfig::default()
            },
            sink.clone(),
        )
        .unwrap();

        for i in 0..5 {
            handler.emit(record(i));
        }
        settle().await;

        let stats = handler.get_health_stats();
        assert_eq!(stats.flush_count, 1);
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.records_processed, 0);
        assert_eq!(stats.records_discarded, 2);
        assert_eq!(
            handler.shared.emergency.writes() + handler.shared.emergency.failures(),
            3
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_opens_and_recovers() {
        let sink = MockSink::failing("mock");
        let handler = BufferedAsyncHandler::start(
            HandlerConfig {
                buffer_size: 1,
                failure_threshold: 2,
                recovery_timeout_secs: 30.0,
                ..HandlerConfig::default()
            },
            sink.clone(),
        )
        .unwrap();

        handler.emit(record(0));
        settle().await;
        handler.emit(record(1));
        settle().await;
        let stats = handler.get_health_stats();
        assert!(stats.circuit_open);
        assert!(stats.circuit_open_time.is_some());
        assert_eq!(sink.attempts(), 2);

        // 熔断期间不再调用输出
        handler.emit(record(2));
        settle().await;
        assert_eq!(sink.attempts(), 2);
        assert_eq!(handler.get_health_stats().error_count, 3);

        tokio::time::sleep(Duration::from_secs(31)).await;
        sink.set_failing(false);
        handler.emit(record(3));
        settle().await;

        let stats = handler.get_health_stats();
        assert_eq!(sink.attempts(), 3);
        assert!(!stats.circuit_open);
        assert!(stats.circuit_open_time.is_none());
        assert_eq!(stats.records_processed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_delivers_pending_batch() {
        let sink = MockSink::new("mock");
        let handler = BufferedAsyncHandler::start(config(100), sink.clone()).unwrap();

        for i in 0..3 {
            handler.emit(record(i));
        }
        settle().await;
        handler.emit(record(3));

        assert_eq!(handler.flush().await, 4);
        let stats = handler.get_health_stats();
        assert_eq!(stats.flush_count, 1);
        assert_eq!(stats.records_processed, 4);
        assert_eq!(sink.batch_sizes(), vec![4]);

        // 缓冲区已清空，再次刷新不会调用输出
        assert_eq!(handler.flush().await, 0);
        assert_eq!(handler.get_health_stats().flush_count, 1);

        handler.shutdown().await.unwrap();
        assert_eq!(handler.flush().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_reports_failure() {
        let sink = MockSink::failing("mock");
        let handler = BufferedAsyncHandler::start(config(100), sink.clone()).unwrap();

        handler.emit(record(0));
        handler.emit(record(1));
        assert_eq!(handler.flush().await, 2);

        let stats = handler.get_health_stats();
        assert_eq!(stats.error_count, 1);
        assert_eq!(stats.records_processed, 0);
        assert_eq!(sink.attempts(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops() {
        let sink = MockSink::new("mock");
        let handler = BufferedAsyncHandler::start(config(2), sink.clone()).unwrap();

        // 工作任务尚未运行，队列容量为 4
        for i in 0..10 {
            handler.emit(record(i));
        }
        let stats = handler.get_health_stats();
        assert_eq!(stats.records_dropped, 6);
        assert_eq!(stats.queued, 4);

        handler.shutdown().await.unwrap();
        assert_eq!(sink.record_count(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_closes() {
        let sink = MockSink::new("mock");
        let handler = BufferedAsyncHandler::start(config(100), sink.clone()).unwrap();

        for i in 0..7 {
            handler.emit(record(i));
        }
        handler.shutdown().await.unwrap();

        assert_eq!(sink.record_count(), 7);
        assert!(sink.was_shut_down());
        assert!(!handler.is_accepting());

        handler.emit(record(8));
        assert_eq!(handler.get_health_stats().records_dropped, 1);
        assert!(matches!(
            handler.shutdown().await,
            Err(AuraLogError::AlreadyShutdown)
        ));
    }
}
