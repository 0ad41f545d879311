//! AuraLog 核心模块
//!
//! 本模块包含记录模型、上下文信息以及 tracing 桥接层。

pub mod context;
pub mod layer;
pub mod record;

pub use context::{RequestContext, ServiceContext};
pub use layer::PipelineLayer;
pub use record::{keys, LogLevel, LogRecord, OutputFormat};
