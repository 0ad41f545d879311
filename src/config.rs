//! 定义 AuraLog 日志管道的所有配置结构体。

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::record::{LogLevel, OutputFormat};
use crate::error::{AuraLogError, Result};

// --- 辅助函数，用于提供配置项的默认值 ---
fn default_true() -> bool {
    true
}
fn default_environment() -> String {
    "development".to_string()
}
fn default_service_name() -> String {
    "aura".to_string()
}
fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// 缓冲处理器默认值
fn default_buffer_size() -> usize {
    1000
}
fn default_flush_interval_secs() -> f64 {
    5.0
}
fn default_max_workers() -> usize {
    2
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_secs() -> f64 {
    30.0
}
fn default_emergency_limit() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_shutdown_timeout_secs() -> f64 {
    5.0
}

// 采样与限流默认值
fn default_sample_rates() -> HashMap<LogLevel, f64> {
    HashMap::from([
        (LogLevel::Critical, 1.0),
        (LogLevel::Error, 1.0),
        (LogLevel::Warning, 0.8),
        (LogLevel::Info, 0.5),
        (LogLevel::Debug, 0.1),
    ])
}
fn default_rate_limit_capacity() -> f64 {
    10.0
}
fn default_rate_limit_refill() -> f64 {
    1.0
}
fn default_violation_threshold() -> u64 {
    100
}
fn default_circuit_timeout_secs() -> f64 {
    60.0
}

// 故障转移默认值
fn default_failover_threshold() -> u32 {
    5
}
fn default_recovery_after_secs() -> f64 {
    300.0
}

// 指标与异常检测默认值
fn default_window_secs() -> u64 {
    300
}
fn default_window_capacity() -> usize {
    100
}
fn default_error_spike_threshold() -> usize {
    10
}
fn default_auth_failure_threshold() -> usize {
    5
}
fn default_slow_request_threshold() -> usize {
    5
}
fn default_slow_request_secs() -> f64 {
    5.0
}
fn default_export_interval_secs() -> u64 {
    10
}
fn default_retention_secs() -> u64 {
    3600
}
fn default_metrics_queue_capacity() -> usize {
    10_000
}

// 输出默认值
fn default_network_timeout_ms() -> u64 {
    5000
}

/// AuraLog 管道的顶层配置结构体。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 按注册顺序排列的输出；为空时使用标准错误输出兜底
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            service_name: default_service_name(),
            version: default_version(),
            handler: HandlerConfig::default(),
            sampling: SamplingConfig::default(),
            security: SecurityConfig::default(),
            failover: FailoverConfig::default(),
            metrics: MetricsConfig::default(),
            sinks: Vec::new(),
        }
    }
}

/// 缓冲异步处理器配置。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: f64,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// 熔断器打开前允许的连续失败次数
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: f64,
    /// 刷新失败时写入紧急输出的最大记录数
    #[serde(default = "default_emergency_limit")]
    pub emergency_limit: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: f64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            flush_interval_secs: default_flush_interval_secs(),
            max_workers: default_max_workers(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            emergency_limit: default_emergency_limit(),
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl HandlerConfig {
    /// 队列容量为缓冲区大小的两倍
    pub fn queue_capacity(&self) -> usize {
        self.buffer_size.saturating_mul(2).max(1)
    }

    pub fn flush_interval(&self) -> Duration {
        secs(self.flush_interval_secs)
    }

    pub fn recovery_timeout(&self) -> Duration {
        secs(self.recovery_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        secs(self.shutdown_timeout_secs)
    }
}

/// 采样与限流配置。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SamplingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 各级别的保留概率；未列出的级别按 1.0 处理
    #[serde(default = "default_sample_rates")]
    pub sample_rates: HashMap<LogLevel, f64>,
    #[serde(default = "default_rate_limit_capacity")]
    pub rate_limit_capacity: f64,
    /// 每秒补充的令牌数
    #[serde(default = "default_rate_limit_refill")]
    pub rate_limit_refill: f64,
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u64,
    #[serde(default = "default_circuit_timeout_secs")]
    pub circuit_timeout_secs: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            sample_rates: default_sample_rates(),
            rate_limit_capacity: default_rate_limit_capacity(),
            rate_limit_refill: default_rate_limit_refill(),
            violation_threshold: default_violation_threshold(),
            circuit_timeout_secs: default_circuit_timeout_secs(),
        }
    }
}

impl SamplingConfig {
    pub fn sample_rate(&self, level: LogLevel) -> f64 {
        self.sample_rates.get(&level).copied().unwrap_or(1.0)
    }

    pub fn circuit_timeout(&self) -> Duration {
        secs(self.circuit_timeout_secs)
    }
}

/// 敏感信息清洗与安全事件检测配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(default = "default_true")]
    pub scrub_pii: bool,
    #[serde(default = "default_true")]
    pub detect_threats: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            scrub_pii: default_true(),
            detect_threats: default_true(),
        }
    }
}

/// 故障转移路由配置。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FailoverConfig {
    #[serde(default = "default_failover_threshold")]
    pub failover_threshold: u32,
    #[serde(default = "default_recovery_after_secs")]
    pub recovery_after_secs: f64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failover_threshold: default_failover_threshold(),
            recovery_after_secs: default_recovery_after_secs(),
        }
    }
}

impl FailoverConfig {
    pub fn recovery_after(&self) -> Duration {
        secs(self.recovery_after_secs)
    }
}

/// 指标与异常检测配置。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    #[serde(default = "default_error_spike_threshold")]
    pub error_spike_threshold: usize,
    #[serde(default = "default_auth_failure_threshold")]
    pub auth_failure_threshold: usize,
    #[serde(default = "default_slow_request_threshold")]
    pub slow_request_threshold: usize,
    /// 超过该耗时（秒）的请求计为慢请求
    #[serde(default = "default_slow_request_secs")]
    pub slow_request_secs: f64,
    /// 同类告警的冷却时间；缺省与窗口长度相同
    #[serde(default)]
    pub alert_cooldown_secs: Option<u64>,
    #[serde(default = "default_export_interval_secs")]
    pub export_interval_secs: u64,
    /// 每次导出覆盖的时间范围；缺省与窗口长度相同
    #[serde(default)]
    pub export_window_secs: Option<u64>,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_metrics_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            window_secs: default_window_secs(),
            window_capacity: default_window_capacity(),
            error_spike_threshold: default_error_spike_threshold(),
            auth_failure_threshold: default_auth_failure_threshold(),
            slow_request_threshold: default_slow_request_threshold(),
            slow_request_secs: default_slow_request_secs(),
            alert_cooldown_secs: None,
            export_interval_secs: default_export_interval_secs(),
            export_window_secs: None,
            retention_secs: default_retention_secs(),
            queue_capacity: default_metrics_queue_capacity(),
        }
    }
}

/// 异常检测窗口、告警冷却与导出窗口的上限（一天）
pub const MAX_METRICS_WINDOW_SECS: u64 = 86_400;

fn bounded_seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_METRICS_WINDOW_SECS) as i64)
}

impl MetricsConfig {
    pub fn window(&self) -> chrono::Duration {
        bounded_seconds(self.window_secs)
    }

    pub fn alert_cooldown(&self) -> chrono::Duration {
        bounded_seconds(self.alert_cooldown_secs.unwrap_or(self.window_secs))
    }

    pub fn export_interval(&self) -> Duration {
        Duration::from_secs(self.export_interval_secs.max(1))
    }

    pub fn export_window_secs(&self) -> i64 {
        self.export_window_secs
            .unwrap_or(self.window_secs)
            .min(MAX_METRICS_WINDOW_SECS) as i64
    }
}

/// 输出配置，按 `type` 字段区分。
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Console(ConsoleSinkConfig),
    File(FileSinkConfig),
    Network(NetworkSinkConfig),
    /// 无法识别的输出类型，构建时降级为控制台兜底输出
    #[serde(other)]
    Unknown,
}

impl SinkConfig {
    /// 输出标识；未命名时取类型名
    pub fn id(&self) -> String {
        match self {
            SinkConfig::Console(c) => c.name.clone().unwrap_or_else(|| "console".to_string()),
            SinkConfig::File(c) => c.name.clone().unwrap_or_else(|| "file".to_string()),
            SinkConfig::Network(c) => c.name.clone().unwrap_or_else(|| "network".to_string()),
            SinkConfig::Unknown => "unknown".to_string(),
        }
    }
}

/// 控制台输出流
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleStream {
    Stdout,
    #[default]
    Stderr,
}

/// 控制台输出配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConsoleSinkConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub stream: ConsoleStream,
    #[serde(default = "default_text_format")]
    pub format: OutputFormat,
    #[serde(default = "default_true")]
    pub colored: bool,
}

fn default_text_format() -> OutputFormat {
    OutputFormat::Text
}

impl Default for ConsoleSinkConfig {
    fn default() -> Self {
        Self {
            name: None,
            stream: ConsoleStream::default(),
            format: default_text_format(),
            colored: default_true(),
        }
    }
}

/// 日志文件轮转策略。
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Never,
    Minutely,
    Hourly,
    Daily,
}

/// 文件输出配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FileSinkConfig {
    pub name: Option<String>,
    pub directory: PathBuf,
    pub filename: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub rotation: RotationStrategy,
    /// 单个文件的大小上限（MB），仅在 `rotation = "never"` 时按大小轮转
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: Option<u64>,
    /// 保留的文件数量，包含正在写入的文件
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_max_size_mb() -> Option<u64> {
    Some(100)
}
fn default_max_files() -> usize {
    11
}

impl FileSinkConfig {
    /// 按默认的大小上限与保留数量创建配置
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            name: None,
            directory: directory.into(),
            filename: filename.into(),
            format: OutputFormat::default(),
            rotation: RotationStrategy::default(),
            max_size_mb: default_max_size_mb(),
            max_files: default_max_files(),
        }
    }

    /// 大小上限（字节）
    pub fn max_size_bytes(&self) -> Option<u64> {
        self.max_size_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }
}

/// 网络协议类型。
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkProtocol {
    #[default]
    Tcp,
    Udp,
}

/// 网络输出配置。
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSinkConfig {
    pub name: Option<String>,
    #[serde(default)]
    pub protocol: NetworkProtocol,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_network_timeout_ms")]
    pub timeout_ms: u64,
}

impl NetworkSinkConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

/// 用于从 TOML 文件加载 `PipelineConfig` 的辅助函数。
pub fn load_config_from_file(path: &std::path::Path) -> Result<PipelineConfig> {
    use std::fs;

    if !path.exists() {
        return Err(AuraLogError::ConfigFileMissing(
            path.to_string_lossy().into_owned(),
        ));
    }

    let config_str = fs::read_to_string(path)?;
    load_config_from_str(&config_str)
}

/// 用于从 TOML 字符串加载 `PipelineConfig` 的辅助函数。
pub fn load_config_from_str(config_str: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = toml::from_str(config_str)
        .map_err(|e| AuraLogError::ConfigError(format!("TOML解析失败: {}", e)))?;

    Ok(config)
}

fn check_positive_secs(value: f64, what: &str) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(AuraLogError::ConfigError(format!(
            "{}必须是大于0的有限数值: {}",
            what, value
        )));
    }
    Ok(())
}

/// 验证配置的有效性。
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    let handler = &config.handler;
    if handler.buffer_size == 0 {
        return Err(AuraLogError::ConfigError("缓冲区大小必须大于0".to_string()));
    }
    if handler.max_workers == 0 {
        return Err(AuraLogError::ConfigError("工作线程数必须大于0".to_string()));
    }
    if handler.failure_threshold == 0 {
        return Err(AuraLogError::ConfigError("熔断失败阈值必须大于0".to_string()));
    }
    check_positive_secs(handler.flush_interval_secs, "刷新间隔")?;
    check_positive_secs(handler.recovery_timeout_secs, "熔断恢复时间")?;
    check_positive_secs(handler.shutdown_timeout_secs, "停机超时")?;

    let sampling = &config.sampling;
    for (level, rate) in &sampling.sample_rates {
        if !(0.0..=1.0).contains(rate) {
            return Err(AuraLogError::ConfigError(format!(
                "{}级别的采样率必须在0到1之间: {}",
                level, rate
            )));
        }
    }
    if !sampling.rate_limit_capacity.is_finite() || sampling.rate_limit_capacity < 1.0 {
        return Err(AuraLogError::ConfigError("令牌桶容量必须不小于1".to_string()));
    }
    if !sampling.rate_limit_refill.is_finite() || sampling.rate_limit_refill < 0.0 {
        return Err(AuraLogError::ConfigError("令牌补充速率不能为负数".to_string()));
    }
    check_positive_secs(sampling.circuit_timeout_secs, "限流熔断时间")?;

    if config.failover.failover_threshold == 0 {
        return Err(AuraLogError::ConfigError("故障转移阈值必须大于0".to_string()));
    }
    check_positive_secs(config.failover.recovery_after_secs, "故障恢复时间")?;

    let metrics = &config.metrics;
    if metrics.window_secs == 0 || metrics.window_capacity == 0 {
        return Err(AuraLogError::ConfigError(
            "异常检测窗口长度和容量必须大于0".to_string(),
        ));
    }
    let longest = [
        Some(metrics.window_secs),
        metrics.alert_cooldown_secs,
        metrics.export_window_secs,
    ]
    .into_iter()
    .flatten()
    .max()
    .unwrap_or(0);
    if longest > MAX_METRICS_WINDOW_SECS {
        return Err(AuraLogError::ConfigError(format!(
            "指标窗口不能超过{}秒: {}",
            MAX_METRICS_WINDOW_SECS, longest
        )));
    }
    if metrics.error_spike_threshold == 0
        || metrics.auth_failure_threshold == 0
        || metrics.slow_request_threshold == 0
    {
        return Err(AuraLogError::ConfigError("告警阈值必须大于0".to_string()));
    }
    if metrics.queue_capacity == 0 {
        return Err(AuraLogError::ConfigError("指标队列容量必须大于0".to_string()));
    }

    for sink in &config.sinks {
        match sink {
            SinkConfig::File(file) => {
                if file.filename.trim().is_empty() {
                    return Err(AuraLogError::ConfigError("文件名不能为空".to_string()));
                }
                if file.max_files == 0 {
                    return Err(AuraLogError::ConfigError("保留文件数必须大于0".to_string()));
                }
                if file.max_size_mb == Some(0) {
                    return Err(AuraLogError::ConfigError("文件大小上限必须大于0".to_string()));
                }
            }
            SinkConfig::Network(network) => {
                if network.host.trim().is_empty() {
                    return Err(AuraLogError::ConfigError("网络输出主机不能为空".to_string()));
                }
                if network.port == 0 {
                    return Err(AuraLogError::ConfigError("网络输出端口必须大于0".to_string()));
                }
            }
            SinkConfig::Console(_) | SinkConfig::Unknown => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.handler.buffer_size, 1000);
        assert_eq!(config.handler.queue_capacity(), 2000);
        assert_eq!(config.handler.flush_interval(), Duration::from_secs(5));
        assert_eq!(config.handler.max_workers, 2);
        assert_eq!(config.handler.emergency_limit, 10);
        assert_eq!(config.failover.failover_threshold, 5);
        assert_eq!(config.failover.recovery_after(), Duration::from_secs(300));
        assert!(config.sinks.is_empty());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_sampling_defaults() {
        let config = SamplingConfig::default();
        assert_eq!(config.sample_rate(LogLevel::Critical), 1.0);
        assert_eq!(config.sample_rate(LogLevel::Error), 1.0);
        assert_eq!(config.sample_rate(LogLevel::Warning), 0.8);
        assert_eq!(config.sample_rate(LogLevel::Info), 0.5);
        assert_eq!(config.sample_rate(LogLevel::Debug), 0.1);
        assert_eq!(config.rate_limit_capacity, 10.0);
        assert_eq!(config.violation_threshold, 100);
        assert_eq!(config.circuit_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_metrics_defaults() {
        let config = MetricsConfig::default();
        assert_eq!(config.window(), chrono::Duration::seconds(300));
        assert_eq!(config.alert_cooldown(), chrono::Duration::seconds(300));
        assert_eq!(config.export_window_secs(), 300);
        assert_eq!(config.window_capacity, 100);
    }

    #[test]
    fn test_load_config_from_str_basic() {
        let toml_str = r#"
            environment = "production"
            service_name = "scheduler"

            [handler]
            buffer_size = 500
            flush_interval_secs = 2.5

            [sampling.sample_rates]
            INFO = 1.0
            WARN = 0.9

            [[sinks]]
            type = "file"
            name = "application"
            directory = "/var/log/aura"
            filename = "app.log"
            rotation = "daily"

            [[sinks]]
            type = "network"
            host = "127.0.0.1"
            port = 5140

            [[sinks]]
            type = "console"
            stream = "stdout"
            format = "json"
        "#;

        let config = load_config_from_str(toml_str).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.handler.buffer_size, 500);
        assert_eq!(config.handler.flush_interval(), Duration::from_millis(2500));
        assert_eq!(config.handler.max_workers, 2);
        assert_eq!(config.sampling.sample_rate(LogLevel::Warning), 0.9);
        // 未列出的级别按 1.0 处理
        assert_eq!(config.sampling.sample_rate(LogLevel::Debug), 1.0);
        assert_eq!(config.sinks.len(), 3);

        match &config.sinks[0] {
            SinkConfig::File(file) => {
                assert_eq!(file.rotation, RotationStrategy::Daily);
                assert_eq!(file.format, OutputFormat::Json);
            }
            other => panic!("unexpected sink: {:?}", other),
        }
        assert_eq!(config.sinks[0].id(), "application");
        assert_eq!(config.sinks[1].id(), "network");
        match &config.sinks[2] {
            SinkConfig::Console(console) => {
                assert_eq!(console.stream, ConsoleStream::Stdout);
                assert_eq!(console.format, OutputFormat::Json);
            }
            other => panic!("unexpected sink: {:?}", other),
        }
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_unknown_sink_type() {
        let toml_str = r#"
            [[sinks]]
            type = "elasticsearch"
        "#;
        let config = load_config_from_str(toml_str).unwrap();
        assert_eq!(config.sinks, vec![SinkConfig::Unknown]);
    }

    #[test]
    fn test_load_config_from_str_invalid_toml() {
        let result = load_config_from_str("[handler\nbuffer_size = ");
        assert!(matches!(result, Err(AuraLogError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = load_config_from_str("[handler]\nbuffer = 10\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let result = load_config_from_file(std::path::Path::new("/nonexistent/aura_log.toml"));
        assert!(matches!(result, Err(AuraLogError::ConfigFileMissing(_))));
    }

    #[test]
    fn test_validate_config_invalid_values() {
        let mut config = PipelineConfig::default();
        config.handler.buffer_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = PipelineConfig::default();
        config.handler.flush_interval_secs = -1.0;
        assert!(validate_config(&config).is_err());

        let mut config = PipelineConfig::default();
        config.sampling.sample_rates.insert(LogLevel::Info, 1.5);
        assert!(validate_config(&config).is_err());

        let mut config = PipelineConfig::default();
        config.sinks.push(SinkConfig::Network(NetworkSinkConfig {
            name: None,
            protocol: NetworkProtocol::Tcp,
            host: "localhost".to_string(),
            port: 0,
            timeout_ms: 100,
        }));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_metrics_window_upper_bound() {
        let mut config = PipelineConfig::default();
        config.metrics.window_secs = u64::MAX;
        assert!(validate_config(&config).is_err());
        // 未经验证的配置也不会溢出
        assert_eq!(config.metrics.window(), chrono::Duration::days(1));
        assert_eq!(config.metrics.alert_cooldown(), chrono::Duration::days(1));
        assert_eq!(config.metrics.export_window_secs(), 86_400);

        let mut config = PipelineConfig::default();
        config.metrics.alert_cooldown_secs = Some(MAX_METRICS_WINDOW_SECS + 1);
        assert!(validate_config(&config).is_err());

        let mut config = PipelineConfig::default();
        config.metrics.window_secs = MAX_METRICS_WINDOW_SECS;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_sink_rotation_defaults_and_limits() {
        let config = load_config_from_str(
            "[[sinks]]\ntype = \"file\"\ndirectory = \"/var/log/aura\"\nfilename = \"app.log\"\n",
        )
        .unwrap();
        match &config.sinks[0] {
            SinkConfig::File(file) => {
                assert_eq!(file.max_size_bytes(), Some(100 * 1024 * 1024));
                assert_eq!(file.max_files, 11);
            }
            other => panic!("unexpected sink: {:?}", other),
        }

        let mut config = PipelineConfig::default();
        config.sinks.push(SinkConfig::File(FileSinkConfig {
            max_files: 0,
            ..FileSinkConfig::new("/var/log/aura", "app.log")
        }));
        assert!(validate_config(&config).is_err());

        let mut config = PipelineConfig::default();
        config.sinks.push(SinkConfig::File(FileSinkConfig {
            max_size_mb: Some(0),
            ..FileSinkConfig::new("/var/log/aura", "app.log")
        }));
        assert!(validate_config(&config).is_err());
    }
}
