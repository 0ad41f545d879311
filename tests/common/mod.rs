#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use aura_log::sinks::{SinkKind, SinkMetadata};
use aura_log::{LogRecord, Sink, SinkError, SinkResult};

/// 记录收到的每一批的输出，可切换为失败
#[derive(Debug, Default)]
pub struct CollectingSink {
    name: String,
    failing: AtomicBool,
    attempts: AtomicU64,
    batches: Mutex<Vec<Vec<LogRecord>>>,
    shut_down: AtomicBool,
}

impl CollectingSink {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            ..Default::default()
        })
    }

    pub fn failing(name: &str) -> Arc<Self> {
        let sink = Self::new(name);
        sink.set_failing(true);
        sink
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.batches.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.batches.lock().unwrap().iter().map(Vec::len).sum()
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for CollectingSink {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Generic(format!("{} unavailable", self.name)));
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }

    async fn shutdown(&self) -> SinkResult<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> SinkMetadata {
        SinkMetadata::new(self.name.clone(), SinkKind::Custom)
    }
}
