//! 输出注册表
//!
//! 将配置中的输出类型映射到构造函数。无法构造的输出降级为控制台兜底输出，
//! 不会中断管道的初始化。

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

use super::console::ConsoleSink;
use super::file::FileSink;
use super::network::NetworkSink;
use super::traits::{Sink, SinkError, SinkResult};
use crate::config::SinkConfig;

/// 输出构造函数
pub type SinkConstructor = fn(&SinkConfig) -> SinkResult<Arc<dyn Sink>>;

/// 输出注册表
#[derive(Clone)]
pub struct SinkRegistry {
    constructors: HashMap<&'static str, SinkConstructor>,
}

impl std::fmt::Debug for SinkRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&str> = self.constructors.keys().copied().collect();
        kinds.sort_unstable();
        f.debug_struct("SinkRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for SinkRegistry {
    fn default() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("console", build_console);
        registry.register("file", build_file);
        registry.register("network", build_network);
        registry
    }
}

fn build_console(config: &SinkConfig) -> SinkResult<Arc<dyn Sink>> {
    match config {
        SinkConfig::Console(c) => Ok(Arc::new(ConsoleSink::new(c.clone()))),
        _ => Err(SinkError::Config("expected console sink configuration".to_string())),
    }
}

fn build_file(config: &SinkConfig) -> SinkResult<Arc<dyn Sink>> {
    match config {
        SinkConfig::File(c) => Ok(Arc::new(FileSink::new(c.clone())?)),
        _ => Err(SinkError::Config("expected file sink configuration".to_string())),
    }
}

fn build_network(config: &SinkConfig) -> SinkResult<Arc<dyn Sink>> {
    match config {
        SinkConfig::Network(c) => Ok(Arc::new(NetworkSink::new(c.clone()))),
        _ => Err(SinkError::Config("expected network sink configuration".to_string())),
    }
}

/// 配置对应的类型名
fn kind_of(config: &SinkConfig) -> &'static str {
    match config {
        SinkConfig::Console(_) => "console",
        SinkConfig::File(_) => "file",
        SinkConfig::Network(_) => "network",
        SinkConfig::Unknown => "unknown",
    }
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或替换某个类型的构造函数
    pub fn register(&mut self, kind: &'static str, constructor: SinkConstructor) {
        self.constructors.insert(kind, constructor);
    }

    /// 构造单个输出
    pub fn build(&self, config: &SinkConfig) -> SinkResult<Arc<dyn Sink>> {
        let kind = kind_of(config);
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| SinkError::Config(format!("unknown sink type '{}'", kind)))?;
        constructor(config)
    }

    /// 按顺序构造所有输出；失败的输出替换为控制台兜底输出
    pub fn build_all(&self, configs: &[SinkConfig]) -> Vec<(String, Arc<dyn Sink>)> {
        let mut sinks: Vec<(String, Arc<dyn Sink>)> = Vec::with_capacity(configs.len().max(1));
        let mut fallback_added = false;

        for config in configs {
            let id = config.id();
            match self.build(config) {
                Ok(sink) => sinks.push((id, sink)),
                Err(e) => {
                    error!(sink = %id, "Failed to build sink, degrading to console fallback: {}", e);
                    if !fallback_added {
                        let fallback = ConsoleSink::fallback();
                        let id = fallback.name().to_string();
                        sinks.push((id, Arc::new(fallback) as Arc<dyn Sink>));
                        fallback_added = true;
                    }
                }
            }
        }

        if sinks.is_empty() {
            warn!("No sinks configured, using console fallback");
            let fallback = ConsoleSink::fallback();
            let id = fallback.name().to_string();
            sinks.push((id, Arc::new(fallback) as Arc<dyn Sink>));
        }
        sinks
    }
}
