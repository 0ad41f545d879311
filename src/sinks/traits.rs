//! AuraLog Sink Traits
//!
//! 定义了统一的输出接口。缓冲处理器与故障转移路由只依赖此 trait，
//! 具体的输出（控制台、文件、网络或自定义实现）都通过它接入。
//!
//! # 使用示例
//!
//! ```rust
//! use aura_log::sinks::{Sink, SinkKind, SinkMetadata, SinkResult};
//! use aura_log::LogRecord;
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct SearchIndexSink;
//!
//! #[async_trait]
//! impl Sink for SearchIndexSink {
//!     async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
//!         // 将整批记录写入外部索引
//!         let _ = batch;
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &str {
//!         "search_index"
//!     }
//!
//!     fn metadata(&self) -> SinkMetadata {
//!         SinkMetadata::new("search_index", SinkKind::Custom)
//!     }
//! }
//! ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::core::record::LogRecord;

/// 输出 trait
///
/// 一次调用投递一整批记录；返回错误表示整批失败。
#[async_trait]
pub trait Sink: Send + Sync + Debug {
    /// 投递一批记录
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()>;

    /// 优雅关闭，刷新并释放资源
    async fn shutdown(&self) -> SinkResult<()> {
        Ok(())
    }

    /// 获取 sink 的名称
    fn name(&self) -> &str;

    /// 获取 sink 的元数据
    fn metadata(&self) -> SinkMetadata;
}

/// Sink 类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Console,
    File,
    Network,
    Failover,
    Custom,
}

/// Sink 元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkMetadata {
    /// Sink 名称
    pub name: String,
    /// Sink 类型
    pub kind: SinkKind,
    /// 描述信息
    pub description: Option<String>,
}

impl SinkMetadata {
    /// 创建新的 sink 元数据
    pub fn new(name: impl Into<String>, kind: SinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: None,
        }
    }

    /// 设置描述信息
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 通用 Sink 错误类型
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O 错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 网络错误
    #[error("Network error: {0}")]
    Network(String),

    /// 投递超时
    #[error("Delivery timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// 故障转移路由中的所有输出均失败
    #[error("All {attempted} sinks failed")]
    AllSinksFailed { attempted: usize },

    /// 通用错误
    #[error("Generic error: {0}")]
    Generic(String),

    /// Sink 已关闭
    #[error("Sink is closed")]
    Closed,
}

impl SinkError {
    /// 是否可能在重试后恢复
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SinkError::Io(_)
                | SinkError::Network(_)
                | SinkError::Timeout(_)
                | SinkError::AllSinksFailed { .. }
        )
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Serialization(e.to_string())
    }
}

/// Sink 结果类型
pub type SinkResult<T> = Result<T, SinkError>;


#[cfg(test)]
mod tests {
    use super::testing::MockSink;
    use super::*;
    use crate::core::record::LogLevel;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mock_sink_as_trait_object() {
        let mock = MockSink::new("mock");
        let sink: Arc<dyn Sink> = mock.clone();
        let batch = vec![LogRecord::new(LogLevel::Info, "a", "hello")];

        sink.deliver(&batch).await.unwrap();
        mock.set_failing(true);
        assert!(sink.deliver(&batch).await.is_err());

        assert_eq!(mock.attempts(), 2);
        assert_eq!(mock.record_count(), 1);
        assert_eq!(sink.name(), "mock");
        assert_eq!(sink.metadata().kind, SinkKind::Custom);
    }

    #[test]
    fn test_sink_error_display() {
        assert_eq!(SinkError::Closed.to_string(), "Sink is closed");
        assert_eq!(
            SinkError::AllSinksFailed { attempted: 3 }.to_string(),
            "All 3 sinks failed"
        );
        assert!(SinkError::Network("reset".into()).is_transient());
        assert!(!SinkError::Config("bad".into()).is_transient());
    }
}
