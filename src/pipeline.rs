//! 日志管道
//!
//! [`LogPipeline`] 把采样限流、上下文补充、敏感信息清洗、缓冲异步处理器、
//! 故障转移路由以及指标旁路串成一条链路。整个进程通常只构造一个实例并通过
//! `Arc` 共享；crate 内部没有任何全局状态。
//!
//! ```text
//! submit → SamplingFilter → 上下文 → SecurityFilter → BufferedAsyncHandler → FailoverRouter → sinks
//!                                                   └→ MetricsPipeline → AlertNotifier / MetricsExporter
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{validate_config, PipelineConfig};
use crate::core::context::{RequestContext, ServiceContext};
use crate::core::record::LogRecord;
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::Result;
use crate::filters::{FilterVerdict, SamplingFilter, SecurityFilter};
use crate::handler::{BufferedAsyncHandler, HealthStats};
use crate::metrics::{
    Alert, AlertNotifier, InMemoryMetricsStore, MetricsExporter, MetricsPipeline, TracingNotifier,
};
use crate::sinks::{FailoverRouter, Sink, SinkHealth, SinkRegistry};

/// 日志管道
#[derive(Debug)]
pub struct LogPipeline {
    config: PipelineConfig,
    service: ServiceContext,
    sampling: SamplingFilter,
    security: SecurityFilter,
    handler: BufferedAsyncHandler,
    router: Arc<FailoverRouter>,
    metrics: Option<MetricsPipeline>,
    metrics_store: Option<InMemoryMetricsStore>,
    diagnostics: Arc<Diagnostics>,
}

impl LogPipeline {
    /// 创建构建器
    pub fn builder() -> LogPipelineBuilder {
        LogPipelineBuilder::new()
    }

    /// 按配置构建管道，输出全部来自配置中的 `sinks`
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// 从 TOML 文件加载配置，应用环境变量覆盖后构建管道
    pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let mut config = crate::config::load_config_from_file(path.as_ref())?;
        crate::env_config::EnvConfig::apply_overrides(&mut config)?;
        Self::from_config(config)
    }

    /// 提交一条记录，立即返回
    ///
    /// 没有关联 ID 的记录会得到一个 `system-` 前缀的关联 ID。
    pub fn submit(&self, record: LogRecord) {
        self.submit_inner(record, None);
    }

    /// 带请求上下文提交一条记录
    pub fn submit_with_context(&self, record: LogRecord, context: &RequestContext) {
        self.submit_inner(record, Some(context));
    }

    fn submit_inner(&self, mut record: LogRecord, context: Option<&RequestContext>) {
        self.diagnostics.increment_submitted();

        match self.sampling.evaluate(&record) {
            FilterVerdict::Accepted => {}
            FilterVerdict::SampledOut => {
                self.diagnostics.increment_sampled_out();
                return;
            }
            FilterVerdict::RateLimited => {
                self.diagnostics.increment_rate_limited();
                return;
            }
            FilterVerdict::CircuitOpen => {
                self.diagnostics.increment_circuit_rejected();
                return;
            }
        }

        match context {
            Some(context) => context.apply(&mut record),
            None if record.correlation_id().is_none() => RequestContext::system().apply(&mut record),
            None => {}
        }
        self.service.apply(&mut record);

        let outcome = self.security.inspect(&mut record);
        if outcome.scrubbed {
            self.diagnostics.increment_scrubbed();
        }
        if outcome.security_event {
            self.diagnostics.increment_security_events();
        }

        self.diagnostics.increment_accepted();
        if let Some(metrics) = &self.metrics {
            metrics.observe(&record);
        }
        self.handler.emit(record);
    }

    /// 立即把已接收但尚未投递的记录交给输出，返回投递的记录数
    pub async fn flush(&self) -> usize {
        self.handler.flush().await
    }

    /// 缓冲处理器的健康统计
    pub fn health_stats(&self) -> HealthStats {
        self.handler.get_health_stats()
    }

    /// 各输出的健康状况，按输出标识排序
    pub fn sink_health(&self) -> BTreeMap<String, SinkHealth> {
        self.router.list_sink_health()
    }

    /// 当前主输出
    pub fn current_sink(&self) -> Option<&str> {
        self.router.current_primary()
    }

    /// 管道入口的诊断计数
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// 最近一小时内的告警；指标旁路关闭时为空
    pub fn recent_alerts(&self) -> Vec<Alert> {
        self.metrics
            .as_ref()
            .map(MetricsPipeline::recent_alerts)
            .unwrap_or_default()
    }

    /// 内置的进程内指标存储；使用自定义导出方时为 None
    pub fn metrics_store(&self) -> Option<&InMemoryMetricsStore> {
        self.metrics_store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn service(&self) -> &ServiceContext {
        &self.service
    }

    /// 优雅关闭：先排空并刷新缓冲处理器，再停止指标旁路
    ///
    /// 两者都会尝试关闭；返回遇到的第一个错误。
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down log pipeline");
        let handler_result = self.handler.shutdown().await;
        let metrics_result = match &self.metrics {
            Some(metrics) => metrics.shutdown().await,
            None => Ok(()),
        };
        debug!(
            processed = self.handler.get_health_stats().records_processed,
            "Log pipeline stopped"
        );
        handler_result.and(metrics_result)
    }
}

/// [`LogPipeline`] 构建器
pub struct LogPipelineBuilder {
    config: PipelineConfig,
    registry: SinkRegistry,
    sinks: Vec<(String, Arc<dyn Sink>)>,
    notifier: Option<Arc<dyn AlertNotifier>>,
    exporter: Option<Arc<dyn MetricsExporter>>,
}

impl std::fmt::Debug for LogPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogPipelineBuilder")
            .field("config", &self.config)
            .field(
                "sinks",
                &self.sinks.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Default for LogPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LogPipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            registry: SinkRegistry::default(),
            sinks: Vec::new(),
            notifier: None,
            exporter: None,
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置缓冲区大小
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.config.handler.buffer_size = size;
        self
    }

    /// 设置刷新间隔（秒）
    pub fn flush_interval_secs(mut self, secs: f64) -> Self {
        self.config.handler.flush_interval_secs = secs;
        self
    }

    /// 替换输出注册表，用于注册自定义输出类型
    pub fn registry(mut self, registry: SinkRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// 追加一个已构造的输出，排在配置中的输出之后
    pub fn sink(mut self, id: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push((id.into(), sink));
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn AlertNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn exporter(mut self, exporter: Arc<dyn MetricsExporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// 构建并启动管道，必须在 tokio 运行时中调用
    pub fn build(self) -> Result<LogPipeline> {
        let Self {
            config,
            registry,
            sinks: extra,
            notifier,
            exporter,
        } = self;
        validate_config(&config)?;

        // 只有显式追加的输出时不需要兜底输出
        let mut sinks = if config.sinks.is_empty() && !extra.is_empty() {
            Vec::with_capacity(extra.len())
        } else {
            registry.build_all(&config.sinks)
        };
        sinks.extend(extra);
        let router = Arc::new(FailoverRouter::new(sinks, &config.failover));

        let handler = BufferedAsyncHandler::start(
            config.handler.clone(),
            Arc::clone(&router) as Arc<dyn Sink>,
        )?;

        let diagnostics = Arc::new(Diagnostics::new());
        let (metrics, metrics_store) = if config.metrics.enabled {
            let (exporter, store) = match exporter {
                Some(exporter) => (exporter, None),
                None => {
                    let store = InMemoryMetricsStore::new(Duration::from_secs(
                        config.metrics.retention_secs.max(1),
                    ));
                    (Arc::new(store.clone()) as Arc<dyn MetricsExporter>, Some(store))
                }
            };
            let notifier = notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
            let metrics =
                MetricsPipeline::start(&config.metrics, notifier, exporter, Arc::clone(&diagnostics))?;
            (Some(metrics), store)
        } else {
            (None, None)
        };

        let service = ServiceContext::new(
            config.environment.clone(),
            config.service_name.clone(),
            config.version.clone(),
        );

        info!(
            service = %service.service_name,
            environment = %service.environment,
            sinks = router.list_sink_health().len(),
            "Log pipeline started"
        );

        Ok(LogPipeline {
            sampling: SamplingFilter::new(&config.sampling),
            security: SecurityFilter::new(&config.security),
            service,
            handler,
            router,
            metrics,
            metrics_store,
            diagnostics,
            config,
        })
    }
}
