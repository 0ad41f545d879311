//! 优雅停机模块
//!
//! 此模块提供了后台任务的协作式停机机制：广播停机信号，并在超时时间内等待任务退出。

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::error::{AuraLogError, Result};

/// 停机句柄
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    /// 停机信号发送器
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
    /// 停机状态
    state: Arc<RwLock<ShutdownState>>,
    /// 停机超时时间
    timeout_duration: Duration,
}

/// 停机信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// 优雅停机：处理完当前批次后退出
    Graceful,
    /// 立即停机
    Immediate,
}

/// 停机状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownState {
    /// 运行中
    Running,
    /// 停机中
    Shutting,
    /// 已停机
    Shutdown,
}

/// 停机监听器
pub struct ShutdownListener {
    /// 停机信号接收器
    shutdown_rx: broadcast::Receiver<ShutdownSignal>,
    /// 组件名称
    component_name: String,
}

/// 停机统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownStats {
    /// 按时退出的任务数
    pub joined: usize,
    /// 超时后被放弃的任务数
    pub abandoned: usize,
    /// 停机耗时
    pub elapsed: Duration,
}

impl ShutdownHandle {
    /// 创建新的停机句柄
    pub fn new(timeout_duration: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            state: Arc::new(RwLock::new(ShutdownState::Running)),
            timeout_duration,
        }
    }

    /// 创建停机监听器
    pub fn create_listener(&self, component_name: impl Into<String>) -> ShutdownListener {
        ShutdownListener {
            shutdown_rx: self.shutdown_tx.subscribe(),
            component_name: component_name.into(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout_duration
    }

    /// 进入停机中状态；重复停机返回错误
    pub fn begin(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        match *state {
            ShutdownState::Running => {
                *state = ShutdownState::Shutting;
                info!("Starting graceful shutdown");
                Ok(())
            }
            ShutdownState::Shutting => {
                warn!("Shutdown already in progress");
                Err(AuraLogError::ShutdownInProgress)
            }
            ShutdownState::Shutdown => {
                warn!("Already shutdown");
                Err(AuraLogError::AlreadyShutdown)
            }
        }
    }

    /// 广播停机信号
    pub fn signal(&self, signal: ShutdownSignal) {
        // 没有监听器时发送失败，不影响停机
        if self.shutdown_tx.send(signal).is_err() {
            debug!("No shutdown listeners registered");
        }
    }

    /// 在超时时间内等待任务退出，超时的任务被中止
    pub async fn join_tasks(&self, tasks: Vec<JoinHandle<()>>) -> ShutdownStats {
        let start = Instant::now();
        let deadline = start + self.timeout_duration;
        let mut stats = ShutdownStats::default();

        for mut task in tasks {
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => stats.joined += 1,
                Ok(Err(e)) => {
                    warn!("Background task ended abnormally: {}", e);
                    stats.joined += 1;
                }
                Err(_) => {
                    task.abort();
                    stats.abandoned += 1;
                }
            }
        }

        if stats.abandoned > 0 {
            warn!(
                abandoned = stats.abandoned,
                "Background tasks did not stop within {:?}", self.timeout_duration
            );
        }
        stats.elapsed = start.elapsed();
        stats
    }

    /// 标记停机完成
    pub fn complete(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        *state = ShutdownState::Shutdown;
        info!("Shutdown completed");
    }

    /// 获取当前停机状态
    pub fn get_state(&self) -> ShutdownState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 检查是否正在停机或已停机
    pub fn is_shutting_down(&self) -> bool {
        !matches!(self.get_state(), ShutdownState::Running)
    }
}

impl ShutdownListener {
    /// 等待停机信号；发送端关闭视为立即停机
    pub async fn wait_for_shutdown(&mut self) -> ShutdownSignal {
        loop {
            match self.shutdown_rx.recv().await {
                Ok(signal) => {
                    debug!(
                        "Component '{}' received shutdown signal: {:?}",
                        self.component_name, signal
                    );
                    return signal;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Shutdown channel closed for component '{}'", self.component_name);
                    return ShutdownSignal::Immediate;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Component '{}' lagged behind, skipped {} signals",
                        self.component_name, skipped
                    );
                }
            }
        }
    }

    /// 非阻塞检查停机信号
    pub fn try_recv_shutdown(&mut self) -> Option<ShutdownSignal> {
        match self.shutdown_rx.try_recv() {
            Ok(signal) => Some(signal),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => Some(ShutdownSignal::Immediate),
            Err(broadcast::error::TryRecvError::Lagged(_)) => Some(ShutdownSignal::Graceful),
        }
    }

    /// 获取组件名称
    pub fn component_name(&self) -> &str {
        &self.component_name
    }
}
