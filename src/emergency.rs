//! 紧急输出
//!
//! 所有输出都失败时的最后手段：同步写入标准错误输出。

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::record::LogRecord;

/// 同步的紧急日志写入器
#[derive(Debug)]
pub struct EmergencyWriter {
    prefix: &'static str,
    writes: AtomicU64,
    failures: AtomicU64,
}

impl EmergencyWriter {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            writes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// 缓冲处理器使用的写入器
    pub fn handler() -> Self {
        Self::new("[EMERGENCY]")
    }

    /// 故障转移路由使用的写入器
    pub fn failover() -> Self {
        Self::new("[FAILOVER EMERGENCY]")
    }

    pub fn format(&self, record: &LogRecord) -> String {
        format!(
            "{} {} {} {}: {}",
            self.prefix,
            record.timestamp().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.logger(),
            record.message()
        )
    }

    /// 写入一条记录；写入失败时只计数
    pub fn write(&self, record: &LogRecord) {
        let line = self.format(record);
        let stderr = std::io::stderr();
        let mut handle = stderr.lock();
        match writeln!(handle, "{}", line) {
            Ok(()) => {
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn write_all<'a, I>(&self, records: I)
    where
        I: IntoIterator<Item = &'a LogRecord>,
    {
        for record in records {
            self.write(record);
        }
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::LogLevel;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_emergency_format() {
        let writer = EmergencyWriter::handler();
        let record = LogRecord::new(LogLevel::Error, "aura.db", "connection lost")
            .with_timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert_eq!(
            writer.format(&record),
            "[EMERGENCY] 2024-01-02 03:04:05.000 ERROR aura.db: connection lost"
        );
        assert!(EmergencyWriter::failover().format(&record).starts_with("[FAILOVER EMERGENCY]"));
    }

    #[test]
    fn test_emergency_write_counts() {
        let writer = EmergencyWriter::handler();
        let records = vec![
            LogRecord::new(LogLevel::Error, "a", "one"),
            LogRecord::new(LogLevel::Error, "a", "two"),
        ];
        writer.write_all(&records);
        assert_eq!(writer.writes() + writer.failures(), 2);
    }
}
