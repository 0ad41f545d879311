//! 缓冲处理器模块

pub mod buffered;

pub use buffered::{BufferedAsyncHandler, HealthStats};
