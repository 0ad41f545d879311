//! 记录过滤模块
//!
//! 记录进入缓冲处理器之前的两道关口：按级别采样与限流，以及 PII 清洗与威胁检测。

pub mod sampling;
pub mod security;

pub use sampling::{FilterVerdict, RateLimitBucket, SamplingFilter};
pub use security::{SecurityFilter, SecurityOutcome};
