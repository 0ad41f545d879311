//! AuraLog - 弹性异步日志管道
//!
//! AuraLog 从任意数量的并发生产者接收日志记录，经过采样限流、上下文补充与敏感信息
//! 清洗后进入有界队列，由少量工作任务分批刷新到一个或多个输出。输出调用受熔断器
//! 保护，并由故障转移路由在输出之间切换；同一条记录流还驱动按秒分桶的指标与滑动
//! 窗口异常告警。生产者永远不会被阻塞，也不会看到输出端的错误。
//!
//! # 快速开始
//!
//! ```rust
//! use aura_log::{LogLevel, LogPipeline, LogRecord};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = LogPipeline::builder()
//!         .buffer_size(100)
//!         .flush_interval_secs(1.0)
//!         .build()?;
//!
//!     pipeline.submit(LogRecord::new(LogLevel::Error, "scheduler.api", "Appointment sync failed"));
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # 接入 tracing
//!
//! ```rust
//! use std::sync::Arc;
//! use aura_log::{LogPipeline, PipelineConfig, PipelineLayer};
//! use tracing_subscriber::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Arc::new(LogPipeline::from_config(PipelineConfig::default())?);
//!     let subscriber = tracing_subscriber::registry().with(PipelineLayer::new(Arc::clone(&pipeline)));
//!
//!     tracing::subscriber::with_default(subscriber, || {
//!         tracing::warn!(user_id = "u-7", "Password reset requested");
//!     });
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod emergency;
pub mod env_config;
pub mod error;
pub mod filters;
pub mod handler;
pub mod metrics;
pub mod pipeline;
pub mod shutdown;
pub mod sinks;

// 重新导出主要类型
pub use circuit_breaker::{BreakerState, CallError, CircuitBreaker, CircuitOpenError, CircuitState};
pub use config::{
    load_config_from_file, load_config_from_str, validate_config, PipelineConfig, SinkConfig,
};
pub use diagnostics::DiagnosticsSnapshot;
pub use env_config::EnvConfig;
pub use error::{AuraLogError, Result};
pub use shutdown::{ShutdownHandle, ShutdownListener, ShutdownSignal, ShutdownState};

pub use core::{LogLevel, LogRecord, OutputFormat, PipelineLayer, RequestContext, ServiceContext};
pub use filters::{SamplingFilter, SecurityFilter};
pub use handler::{BufferedAsyncHandler, HealthStats};
pub use metrics::{Alert, AlertNotifier, InMemoryMetricsStore, MetricsExporter};
pub use pipeline::{LogPipeline, LogPipelineBuilder};
pub use sinks::{FailoverRouter, Sink, SinkError, SinkHealth, SinkRegistry, SinkResult};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
