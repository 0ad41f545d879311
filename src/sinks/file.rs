//! 文件 Sink
//!
//! 每条记录写一行（JSON 或文本）。按时间轮转时由 `tracing-appender` 负责切换与清理
//! 旧文件；不按时间轮转时，当前文件超过大小上限即改名为 `<filename>.1`，更早的备份
//! 依次后移，超出保留数量的最旧备份被删除。

use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

use super::traits::{Sink, SinkError, SinkKind, SinkMetadata, SinkResult};
use crate::config::{FileSinkConfig, RotationStrategy};
use crate::core::record::LogRecord;

/// 正在写入的文件
#[derive(Debug)]
struct ActiveFile {
    appender: RollingFileAppender,
    /// 当前文件已写入的字节数
    written: u64,
}

/// 文件 Sink
#[derive(Debug)]
pub struct FileSink {
    name: String,
    config: Arc<FileSinkConfig>,
    /// 按大小轮转的上限；按时间轮转时为 None
    max_bytes: Option<u64>,
    /// 文件写入器；关闭后为 None
    writer: Arc<Mutex<Option<ActiveFile>>>,
}

fn build_appender(config: &FileSinkConfig) -> SinkResult<RollingFileAppender> {
    let rotation = match config.rotation {
        RotationStrategy::Never => Rotation::NEVER,
        RotationStrategy::Minutely => Rotation::MINUTELY,
        RotationStrategy::Hourly => Rotation::HOURLY,
        RotationStrategy::Daily => Rotation::DAILY,
    };
    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.filename.clone());
    if config.rotation != RotationStrategy::Never {
        builder = builder.max_log_files(config.max_files.max(1));
    }
    builder
        .build(&config.directory)
        .map_err(|e| SinkError::Config(format!("无法初始化日志文件: {}", e)))
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// 后移备份文件并把当前文件改名为 `.1`
fn shift_backups(config: &FileSinkConfig) -> std::io::Result<()> {
    let active = config.directory.join(&config.filename);
    let backup = |index: usize| {
        config
            .directory
            .join(format!("{}.{}", config.filename, index))
    };
    let backups = config.max_files.saturating_sub(1);
    if backups == 0 {
        return remove_if_exists(&active);
    }

    remove_if_exists(&backup(backups))?;
    for index in (1..backups).rev() {
        let from = backup(index);
        if from.exists() {
            std::fs::rename(&from, backup(index + 1))?;
        }
    }
    if active.exists() {
        std::fs::rename(&active, backup(1))?;
    }
    Ok(())
}

impl FileSink {
    /// 创建文件 sink；目录不存在时自动创建
    pub fn new(config: FileSinkConfig) -> SinkResult<Self> {
        std::fs::create_dir_all(&config.directory)?;

        let max_bytes = match config.rotation {
            RotationStrategy::Never => config.max_size_bytes(),
            _ => None,
        };
        // 追加到已有文件时从其当前大小开始计数
        let written = match max_bytes {
            Some(_) => std::fs::metadata(config.directory.join(&config.filename))
                .map(|meta| meta.len())
                .unwrap_or(0),
            None => 0,
        };
        let appender = build_appender(&config)?;

        let name = config.name.clone().unwrap_or_else(|| "file".to_string());
        Ok(Self {
            name,
            config: Arc::new(config),
            max_bytes,
            writer: Arc::new(Mutex::new(Some(ActiveFile { appender, written }))),
        })
    }

    pub fn config(&self) -> &FileSinkConfig {
        &self.config
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    fn render_batch(&self, batch: &[LogRecord]) -> String {
        let mut buffer = String::with_capacity(batch.len() * 256);
        for record in batch {
            buffer.push_str(&record.render(self.config.format));
            buffer.push('\n');
        }
        buffer
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let payload = self.render_batch(batch);
        let writer = Arc::clone(&self.writer);
        let config = Arc::clone(&self.config);
        let max_bytes = self.max_bytes;

        // 文件写入是阻塞操作，放到阻塞线程池中执行
        tokio::task::spawn_blocking(move || -> SinkResult<()> {
            let mut guard = writer.lock().map_err(|_| SinkError::Generic("file writer lock poisoned".to_string()))?;
            let active = guard.as_mut().ok_or(SinkError::Closed)?;
            let incoming = payload.len() as u64;

            if let Some(limit) = max_bytes {
                if active.written > 0 && active.written + incoming > limit {
                    active.appender.flush()?;
                    shift_backups(&config)?;
                    active.appender = build_appender(&config)?;
                    active.written = 0;
                    debug!(file = %config.filename, "Rotated log file by size");
                }
            }

            active.appender.write_all(payload.as_bytes())?;
            active.appender.flush()?;
            active.written += incoming;
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Generic(format!("file write task failed: {}", e)))?
    }

    async fn shutdown(&self) -> SinkResult<()> {
        let writer = Arc::clone(&self.writer);
        tokio::task::spawn_blocking(move || -> SinkResult<()> {
            let mut guard = writer.lock().map_err(|_| SinkError::Generic("file writer lock poisoned".to_string()))?;
            if let Some(mut active) = guard.take() {
                active.appender.flush()?;
            }
            Ok(())
        })
        .await
        .map_err(|e| SinkError::Generic(format!("file shutdown task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::new(self.name.clone(), SinkKind::File).with_description(format!(
            "File output {}",
            self.config.directory.join(&self.config.filename).display()
        ))
    }
}
