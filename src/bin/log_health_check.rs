//! 日志管道健康检查
//!
//! 用法：`log_health_check [config.toml]`
//!
//! 按配置构建管道，发送各级别的探测记录并立即刷新，然后以 JSON 输出处理器统计、
//! 各输出健康状况与诊断计数。熔断器打开、存在刷新错误、探测记录未送达或有不健康
//! 的输出时以非零状态退出。

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use aura_log::{load_config_from_file, EnvConfig, LogLevel, LogPipeline, LogRecord, PipelineConfig};

const PROBE_LOGGER: &str = "aura_health_check";

fn load_config(path: Option<PathBuf>) -> anyhow::Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => load_config_from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    EnvConfig::apply_overrides(&mut config).context("invalid environment override")?;
    // 探测记录必须全部进入管道
    config.sampling.enabled = false;
    Ok(config)
}

/// 一次健康检查的结论与报告
struct CheckOutcome {
    healthy: bool,
    report: serde_json::Value,
}

/// 发送探测记录并立即刷新，根据处理器与输出状态给出结论
async fn check(pipeline: &LogPipeline) -> CheckOutcome {
    for level in LogLevel::ALL {
        pipeline.submit(LogRecord::new(
            level,
            PROBE_LOGGER,
            format!("Health check probe at {} level", level),
        ));
    }
    let flushed = pipeline.flush().await;

    let stats = pipeline.health_stats();
    let sinks = pipeline.sink_health();
    let diagnostics = pipeline.diagnostics();

    let unhealthy: Vec<&str> = sinks
        .iter()
        .filter(|(_, health)| !health.is_healthy)
        .map(|(id, _)| id.as_str())
        .collect();
    let undelivered = diagnostics
        .records_accepted
        .saturating_sub(stats.records_processed);
    if !unhealthy.is_empty() {
        error!(sinks = ?unhealthy, "Unhealthy sinks detected");
    }
    if undelivered > 0 {
        error!(undelivered, flushed, "Probe records were not delivered");
    }
    let healthy = !stats.circuit_open
        && stats.error_count == 0
        && undelivered == 0
        && unhealthy.is_empty();

    let report = json!({
        "healthy": healthy,
        "undelivered": undelivered,
        "handler": stats,
        "sinks": &sinks,
        "current_sink": pipeline.current_sink(),
        "diagnostics": diagnostics,
        "alerts": pipeline.recent_alerts(),
    });
    CheckOutcome { healthy, report }
}

async fn run() -> anyhow::Result<bool> {
    let config = load_config(std::env::args_os().nth(1).map(PathBuf::from))?;
    let pipeline = LogPipeline::from_config(config).context("failed to build log pipeline")?;
    info!(sinks = pipeline.sink_health().len(), "Sending probe records");

    let outcome = check(&pipeline).await;
    println!("{}", serde_json::to_string_pretty(&outcome.report)?);

    if let Err(e) = pipeline.shutdown().await {
        error!("Pipeline shutdown did not complete cleanly: {}", e);
    }
    Ok(outcome.healthy)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("Health check failed: {:#}", e);
            ExitCode::from(2)
        }
    }
}
