//! tracing 桥接层
//!
//! 将应用自身的 tracing 事件转换为 [`LogRecord`] 并提交到管道。

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::record::{LogLevel, LogRecord};
use crate::pipeline::LogPipeline;

/// 本 crate 内部诊断事件的 target 前缀，桥接层会跳过这些事件
const INTERNAL_TARGET: &str = "aura_log";

/// 将 tracing 事件转发到 [`LogPipeline`] 的层
#[derive(Clone)]
pub struct PipelineLayer {
    pipeline: Arc<LogPipeline>,
}

impl PipelineLayer {
    pub fn new(pipeline: Arc<LogPipeline>) -> Self {
        Self { pipeline }
    }
}

impl std::fmt::Debug for PipelineLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for PipelineLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if let Some(record) = event_to_record(event) {
            self.pipeline.submit(record);
        }
    }
}

/// 本 crate 自身的事件：目标为 `aura_log` 或 `aura_log::*`
fn is_internal_target(target: &str) -> bool {
    target
        .strip_prefix(INTERNAL_TARGET)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

/// 将 tracing 事件转换为日志记录；内部事件返回 None
pub(crate) fn event_to_record(event: &Event<'_>) -> Option<LogRecord> {
    let metadata = event.metadata();
    if is_internal_target(metadata.target()) {
        return None;
    }

    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);

    let mut record = LogRecord::new(
        LogLevel::from(*metadata.level()),
        metadata.target(),
        visitor.message.unwrap_or_default(),
    );
    for (key, value) in visitor.fields {
        record = record.with_attribute(key, value);
    }
    Some(record)
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: BTreeMap<String, serde_json::Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, format!("{:?}", value).into());
    }
}
