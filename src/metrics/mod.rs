//! 指标与异常检测管道
//!
//! 独立于缓冲处理器消费每条被接受的记录：生产者只做一次 `try_send`，
//! 后台任务负责分桶计数、异常窗口检测、告警分发与定期导出。
//! 这里的任何失败都只记入诊断计数，不会影响日志投递。

pub mod alerts;
pub mod anomaly;
pub mod collector;
pub mod export;

pub use alerts::{Alert, AlertCache, AlertNotifier, TracingNotifier};
pub use anomaly::{AnomalyDetector, AnomalyWindow};
pub use collector::{MetricPoint, MetricsCollector};
pub use export::{InMemoryMetricsStore, MetricsExporter};

use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::MetricsConfig;
use crate::core::record::LogRecord;
use crate::diagnostics::Diagnostics;
use crate::error::{AuraLogError, Result};
use crate::shutdown::{ShutdownHandle, ShutdownListener, ShutdownSignal};

const ALERT_TTL: Duration = Duration::from_secs(3600);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 后台任务独占的状态
struct MetricsTask {
    config: MetricsConfig,
    collector: MetricsCollector,
    detector: AnomalyDetector,
    notifier: Arc<dyn AlertNotifier>,
    exporter: Arc<dyn MetricsExporter>,
    alerts: AlertCache,
    diagnostics: Arc<Diagnostics>,
}

impl MetricsTask {
    async fn process(&mut self, record: LogRecord) {
        self.collector.observe(&record);
        for alert in self.detector.observe(&record, Utc::now()) {
            self.dispatch(alert).await;
        }
    }

    async fn dispatch(&self, alert: Alert) {
        self.diagnostics.increment_alerts_fired();
        info!(alert_type = %alert.alert_type, count = alert.count, "Anomaly detected");
        if let Err(e) = self.notifier.notify(&alert).await {
            self.diagnostics.increment_alert_failures();
            warn!(alert_type = %alert.alert_type, "Alert notification failed: {}", e);
        }
        self.alerts.insert(alert).await;
    }

    /// 导出最近窗口内的桶，并清理超过保留期的桶
    async fn export(&mut self) {
        let now = Utc::now().timestamp();
        let points = self
            .collector
            .points_since(now - self.config.export_window_secs());
        if !points.is_empty() {
            match self.exporter.export(&points).await {
                Ok(()) => debug!(points = points.len(), "Metrics exported"),
                Err(e) => {
                    self.diagnostics.increment_metrics_export_failures();
                    warn!("Metrics export failed: {}", e);
                }
            }
        }
        let pruned = self
            .collector
            .prune_before(now - self.config.retention_secs as i64);
        if pruned > 0 {
            debug!(buckets = pruned, "Pruned expired metric buckets");
        }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<LogRecord>, mut listener: ShutdownListener) {
        let period = self.config.export_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = listener.wait_for_shutdown() => {
                    receiver.close();
                    while let Some(record) = receiver.recv().await {
                        self.process(record).await;
                    }
                    break;
                }
                record = receiver.recv() => match record {
                    Some(record) => self.process(record).await,
                    None => break,
                },
                _ = ticker.tick() => self.export().await,
            }
        }

        self.export().await;
        debug!("Metrics task stopped");
    }
}

/// 指标与异常检测管道
#[derive(Debug)]
pub struct MetricsPipeline {
    sender: mpsc::Sender<LogRecord>,
    alerts: AlertCache,
    diagnostics: Arc<Diagnostics>,
    shutdown: ShutdownHandle,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MetricsPipeline {
    /// 在当前 tokio 运行时中启动后台任务
    pub fn start(
        config: &MetricsConfig,
        notifier: Arc<dyn AlertNotifier>,
        exporter: Arc<dyn MetricsExporter>,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            AuraLogError::initialization("MetricsPipeline requires a running tokio runtime")
        })?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let alerts = AlertCache::new(ALERT_TTL);
        let shutdown = ShutdownHandle::new(SHUTDOWN_TIMEOUT);

        let task = MetricsTask {
            config: config.clone(),
            collector: MetricsCollector::new(),
            detector: AnomalyDetector::new(config),
            notifier,
            exporter,
            alerts: alerts.clone(),
            diagnostics: Arc::clone(&diagnostics),
        };
        let handle = runtime.spawn(task.run(receiver, shutdown.create_listener("metrics")));

        Ok(Self {
            sender,
            alerts,
            diagnostics,
            shutdown,
            task: Mutex::new(Some(handle)),
        })
    }

    /// 非阻塞提交一条已接受的记录；队列满时丢弃并计数
    pub fn observe(&self, record: &LogRecord) {
        if self.sender.try_send(record.clone()).is_err() {
            self.diagnostics.increment_metrics_dropped();
        }
    }

    /// 最近一小时内的告警
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.alerts.recent()
    }

    /// 处理完已排队的记录后做最后一次导出并停止
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.begin()?;
        self.shutdown.signal(ShutdownSignal::Graceful);
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let stats = self.shutdown.join_tasks(task.into_iter().collect()).await;
        self.shutdown.complete();
        if stats.abandoned > 0 {
            return Err(AuraLogError::ShutdownTimeout);
        }
        Ok(())
    }
}

impl Drop for MetricsPipeline {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}
