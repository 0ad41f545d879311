//! 控制台输出 Sink 实现
//!
//! 提供将日志记录输出到标准输出或标准错误的功能，支持彩色级别与 JSON 格式。
//! 同时用作注册表在配置失败时的兜底输出。

use async_trait::async_trait;
use colored::{ColoredString, Colorize};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::traits::{Sink, SinkError, SinkKind, SinkMetadata, SinkResult};
use crate::config::{ConsoleSinkConfig, ConsoleStream};
use crate::core::record::{LogLevel, LogRecord, OutputFormat};

/// 控制台输出 Sink
#[derive(Debug)]
pub struct ConsoleSink {
    name: String,
    config: ConsoleSinkConfig,
    lines_written: AtomicU64,
    is_closed: AtomicBool,
}

impl ConsoleSink {
    /// 创建新的控制台 Sink
    pub fn new(config: ConsoleSinkConfig) -> Self {
        let name = config.name.clone().unwrap_or_else(|| "console".to_string());
        Self {
            name,
            config,
            lines_written: AtomicU64::new(0),
            is_closed: AtomicBool::new(false),
        }
    }

    /// 写入标准错误的兜底输出
    pub fn fallback() -> Self {
        Self::new(ConsoleSinkConfig {
            name: Some("console_fallback".to_string()),
            stream: ConsoleStream::Stderr,
            format: OutputFormat::Text,
            colored: false,
        })
    }

    pub fn config(&self) -> &ConsoleSinkConfig {
        &self.config
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    fn colorize(level: LogLevel) -> ColoredString {
        let label = level.as_str();
        match level {
            LogLevel::Debug => label.bright_black(),
            LogLevel::Info => label.green(),
            LogLevel::Warning => label.yellow(),
            LogLevel::Error => label.red(),
            LogLevel::Critical => label.red().bold(),
        }
    }

    /// 格式化单条记录
    pub fn format_record(&self, record: &LogRecord) -> String {
        match self.config.format {
            OutputFormat::Json => record.render(OutputFormat::Json),
            OutputFormat::Text if self.config.colored => {
                let mut line = format!(
                    "[{}] [{}] [{}]",
                    record.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"),
                    Self::colorize(record.level()),
                    record.logger()
                );
                if let Some(correlation_id) = record.correlation_id() {
                    line.push_str(&format!(" [{}]", correlation_id));
                }
                line.push(' ');
                line.push_str(record.message());
                line
            }
            OutputFormat::Text => record.to_text(),
        }
    }

    fn write_lines(&self, writer: &mut dyn Write, batch: &[LogRecord]) -> io::Result<()> {
        for record in batch {
            writeln!(writer, "{}", self.format_record(record))?;
        }
        writer.flush()
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        if self.is_closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        match self.config.stream {
            ConsoleStream::Stdout => {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                self.write_lines(&mut handle, batch)?;
            }
            ConsoleStream::Stderr => {
                let stderr = io::stderr();
                let mut handle = stderr.lock();
                self.write_lines(&mut handle, batch)?;
            }
        }

        self.lines_written
            .fetch_add(batch.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn shutdown(&self) -> SinkResult<()> {
        self.is_closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> SinkMetadata {
        let target = match self.config.stream {
            ConsoleStream::Stdout => "stdout",
            ConsoleStream::Stderr => "stderr",
        };
        SinkMetadata::new(self.name.clone(), SinkKind::Console)
            .with_description(format!("Console output to {}", target))
    }
}
