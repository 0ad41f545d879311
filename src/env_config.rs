//! 环境变量配置模块
//!
//! 此模块提供以 `AURA_LOG_` 为前缀的环境变量覆盖配置文件取值的功能。

use std::env;
use std::str::FromStr;

use crate::config::PipelineConfig;
use crate::error::{AuraLogError, Result};

pub const BUFFER_SIZE: &str = "AURA_LOG_BUFFER_SIZE";
pub const FLUSH_INTERVAL: &str = "AURA_LOG_FLUSH_INTERVAL";
pub const MAX_WORKERS: &str = "AURA_LOG_MAX_WORKERS";
pub const ENVIRONMENT: &str = "AURA_LOG_ENVIRONMENT";
pub const SERVICE_NAME: &str = "AURA_LOG_SERVICE_NAME";
pub const VERSION: &str = "AURA_LOG_VERSION";

/// 环境变量配置管理器
pub struct EnvConfig;

impl EnvConfig {
    /// 读取非空的环境变量
    pub fn get(name: &str) -> Option<String> {
        env::var(name).ok().filter(|s| !s.is_empty())
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_overrides(config: &mut PipelineConfig) -> Result<()> {
        Self::apply_overrides_from(config, Self::get)
    }

    /// 使用给定的查找函数覆盖配置
    pub fn apply_overrides_from<F>(config: &mut PipelineConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(BUFFER_SIZE) {
            config.handler.buffer_size = parse(BUFFER_SIZE, &value)?;
        }
        if let Some(value) = lookup(FLUSH_INTERVAL) {
            config.handler.flush_interval_secs = parse(FLUSH_INTERVAL, &value)?;
        }
        if let Some(value) = lookup(MAX_WORKERS) {
            config.handler.max_workers = parse(MAX_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENVIRONMENT) {
            config.environment = value;
        }
        if let Some(value) = lookup(SERVICE_NAME) {
            config.service_name = value;
        }
        if let Some(value) = lookup(VERSION) {
            config.version = value;
        }
        Ok(())
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        AuraLogError::ConfigError(format!("环境变量 {} 的值无效: {}", name, value))
    })
}
