//! 上下文信息
//!
//! 请求上下文以显式值的形式随记录一起提交，服务上下文在管道构建时采集一次。

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{keys, LogRecord};

/// 请求上下文
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub client_ip: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    /// 请求耗时（秒）
    pub request_duration: Option<f64>,
    pub db_queries: Option<u64>,
}

impl RequestContext {
    /// 使用新生成的关联 ID 创建请求上下文
    pub fn new() -> Self {
        Self {
            correlation_id: Uuid::new_v4().simple().to_string(),
            ..Default::default()
        }
    }

    /// 沿用上游传入的关联 ID；为空时重新生成
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        let correlation_id = correlation_id.into();
        if correlation_id.trim().is_empty() {
            return Self::new();
        }
        Self {
            correlation_id,
            ..Default::default()
        }
    }

    /// 从请求头中取关联 ID，依次尝试 x-correlation-id、x-request-id、x-trace-id
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut found: [Option<&str>; 3] = [None, None, None];
        for (name, value) in headers {
            let slot = match name.to_ascii_lowercase().as_str() {
                "x-correlation-id" => 0,
                "x-request-id" => 1,
                "x-trace-id" => 2,
                _ => continue,
            };
            if !value.trim().is_empty() {
                found[slot] = Some(value);
            }
        }
        match found.iter().flatten().next() {
            Some(id) => Self::with_correlation_id(*id),
            None => Self::new(),
        }
    }

    /// 请求之外的系统上下文
    pub fn system() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            correlation_id: format!("system-{}", &id[..8]),
            ..Default::default()
        }
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    pub fn request(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.request_duration = Some(seconds);
        self
    }

    pub fn queries(mut self, count: u64) -> Self {
        self.db_queries = Some(count);
        self
    }

    /// 将上下文写入记录属性，不覆盖记录中已有的同名属性
    pub(crate) fn apply(&self, record: &mut LogRecord) {
        let attrs = record.attributes_mut();
        attrs
            .entry(keys::CORRELATION_ID.to_string())
            .or_insert_with(|| self.correlation_id.clone().into());
        if let Some(user_id) = &self.user_id {
            attrs
                .entry(keys::USER_ID.to_string())
                .or_insert_with(|| user_id.clone().into());
        }
        if let Some(ip) = &self.client_ip {
            attrs
                .entry(keys::CLIENT_IP.to_string())
                .or_insert_with(|| ip.clone().into());
        }
        if let Some(method) = &self.method {
            attrs
                .entry(keys::METHOD.to_string())
                .or_insert_with(|| method.clone().into());
        }
        if let Some(path) = &self.path {
            attrs
                .entry(keys::PATH.to_string())
                .or_insert_with(|| path.clone().into());
        }
        if let Some(duration) = self.request_duration {
            attrs
                .entry(keys::REQUEST_DURATION.to_string())
                .or_insert_with(|| duration.into());
        }
        if let Some(queries) = self.db_queries {
            attrs
                .entry(keys::DB_QUERIES.to_string())
                .or_insert_with(|| queries.into());
        }
    }
}

/// 服务上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceContext {
    pub environment: String,
    pub service_name: String,
    pub version: String,
    pub hostname: Option<String>,
    pub pid: u32,
}

impl ServiceContext {
    /// 采集当前进程的服务信息
    pub fn new(
        environment: impl Into<String>,
        service_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            service_name: service_name.into(),
            version: version.into(),
            hostname: hostname::get().ok().and_then(|h| h.into_string().ok()),
            pid: std::process::id(),
        }
    }

    pub(crate) fn apply(&self, record: &mut LogRecord) {
        let attrs = record.attributes_mut();
        attrs
            .entry(keys::ENVIRONMENT.to_string())
            .or_insert_with(|| self.environment.clone().into());
        attrs
            .entry(keys::SERVICE_NAME.to_string())
            .or_insert_with(|| self.service_name.clone().into());
        attrs
            .entry(keys::VERSION.to_string())
            .or_insert_with(|| self.version.clone().into());
        if let Some(hostname) = &self.hostname {
            attrs
                .entry(keys::HOSTNAME.to_string())
                .or_insert_with(|| hostname.clone().into());
        }
        attrs
            .entry(keys::PID.to_string())
            .or_insert_with(|| self.pid.into());
    }
}
