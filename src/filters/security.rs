//! 安全过滤器
//!
//! 在记录进入缓冲区之前清洗消息中的 PII（卡号、社保号、邮箱、电话），
//! 并根据威胁特征词为记录打上安全事件标记。

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SecurityConfig;
use crate::core::record::{keys, LogRecord};

/// 替换 PII 的占位符
pub const REDACTED: &str = "[REDACTED]";

static PII_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // 卡号
        r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
        // 社保号
        r"\b\d{3}-\d{2}-\d{4}\b",
        // 邮箱
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        // 电话
        r"\b\d{3}-\d{3}-\d{4}\b",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

const THREAT_INDICATORS: [&str; 6] = [
    "authentication failed",
    "unauthorized access",
    "sql injection",
    "xss attempt",
    "csrf token missing",
    "rate limit exceeded",
];

/// 单条记录的处理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityOutcome {
    /// 消息中有 PII 被替换
    pub scrubbed: bool,
    /// 检测到威胁特征
    pub security_event: bool,
}

/// 安全过滤器
#[derive(Debug, Clone)]
pub struct SecurityFilter {
    config: SecurityConfig,
}

impl SecurityFilter {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 替换文本中的 PII；无匹配时返回 None
    pub fn scrub(text: &str) -> Option<String> {
        let mut scrubbed: Option<String> = None;
        for pattern in PII_PATTERNS.iter() {
            let source = scrubbed.as_deref().unwrap_or(text);
            if pattern.is_match(source) {
                scrubbed = Some(pattern.replace_all(source, REDACTED).into_owned());
            }
        }
        scrubbed
    }

    /// 匹配到的第一个威胁特征，空格替换为下划线
    pub fn detect_threat(message: &str) -> Option<String> {
        let lowered = message.to_lowercase();
        THREAT_INDICATORS
            .iter()
            .find(|indicator| lowered.contains(*indicator))
            .map(|indicator| indicator.replace(' ', "_"))
    }

    /// 就地清洗记录并标记安全事件
    pub fn inspect(&self, record: &mut LogRecord) -> SecurityOutcome {
        let mut outcome = SecurityOutcome::default();

        if self.config.scrub_pii {
            if let Some(scrubbed) = Self::scrub(record.message()) {
                record.set_message(scrubbed);
                outcome.scrubbed = true;
            }
        }

        if self.config.detect_threats {
            if let Some(threat) = Self::detect_threat(record.message()) {
                let attributes = record.attributes_mut();
                attributes.insert(keys::SECURITY_EVENT.to_string(), true.into());
                attributes.insert(keys::THREAT_TYPE.to_string(), threat.into());
                outcome.security_event = true;
            }
        }

        outcome
    }
}
