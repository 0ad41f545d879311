//! AuraLog 日志记录定义
//!
//! 此模块定义了在管道中流转的核心记录结构与日志级别。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::AuraLogError;

/// 常用属性键
pub mod keys {
    pub const REQUEST_DURATION: &str = "request_duration";
    pub const DB_QUERIES: &str = "db_queries";
    pub const MEMORY_PERCENT: &str = "memory_percent";
    pub const SECURITY_EVENT: &str = "security_event";
    pub const THREAT_TYPE: &str = "threat_type";
    pub const CORRELATION_ID: &str = "correlation_id";
    pub const USER_ID: &str = "user_id";
    pub const CLIENT_IP: &str = "client_ip";
    pub const METHOD: &str = "method";
    pub const PATH: &str = "path";
    pub const ENVIRONMENT: &str = "environment";
    pub const SERVICE_NAME: &str = "service_name";
    pub const VERSION: &str = "version";
    pub const HOSTNAME: &str = "hostname";
    pub const PID: &str = "pid";
}

/// 日志级别，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// 所有级别，从低到高
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }

    /// 是否达到错误级别
    pub fn is_error(&self) -> bool {
        *self >= LogLevel::Error
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = AuraLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" | "TRACE" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" | "WARN" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" | "FATAL" => Ok(LogLevel::Critical),
            _ => Err(AuraLogError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE | tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// 日志记录
///
/// 提交之后不可变；唯一的例外是进入缓冲区之前的敏感信息清洗。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    timestamp: DateTime<Utc>,
    level: LogLevel,
    logger: String,
    message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// 创建新的日志记录，时间戳取当前 UTC 时间
    pub fn new(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger: logger.into(),
            message: message.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 附加一个属性
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// 请求耗时（秒）
    pub fn request_duration(&self) -> Option<f64> {
        self.attribute(keys::REQUEST_DURATION).and_then(|v| v.as_f64())
    }

    pub fn db_queries(&self) -> Option<u64> {
        self.attribute(keys::DB_QUERIES).and_then(|v| v.as_u64())
    }

    pub fn memory_percent(&self) -> Option<f64> {
        self.attribute(keys::MEMORY_PERCENT).and_then(|v| v.as_f64())
    }

    pub fn is_security_event(&self) -> bool {
        self.attribute(keys::SECURITY_EVENT)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn threat_type(&self) -> Option<&str> {
        self.attribute(keys::THREAT_TYPE).and_then(|v| v.as_str())
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.attribute(keys::CORRELATION_ID).and_then(|v| v.as_str())
    }

    pub(crate) fn set_message(&mut self, message: String) {
        self.message = message;
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.attributes
    }

    /// 获取记录的 JSON 表示
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 获取记录的文本表示
    pub fn to_text(&self) -> String {
        let mut line = format!(
            "[{}] [{}] [{}]",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.logger,
        );
        if let Some(correlation_id) = self.correlation_id() {
            line.push_str(&format!(" [{}]", correlation_id));
        }
        line.push(' ');
        line.push_str(&self.message);
        line
    }

    /// 按指定格式输出
    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Json => self
                .to_json()
                .unwrap_or_else(|_| "<serialization error>".to_string()),
            OutputFormat::Text => self.to_text(),
        }
    }
}

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Text,
}
