//! AuraLog Sinks 模块
//!
//! 提供日志输出目标的实现，包括控制台、文件和网络输出，
//! 以及在多个输出之间切换的故障转移路由。

pub mod console;
pub mod failover;
pub mod file;
pub mod network;
pub mod registry;
pub mod traits;

// 重新导出主要类型
pub use console::ConsoleSink;
pub use failover::{FailoverRouter, SinkHealth};
pub use file::FileSink;
pub use network::NetworkSink;
pub use registry::{SinkConstructor, SinkRegistry};
pub use traits::{Sink, SinkError, SinkKind, SinkMetadata, SinkResult};
