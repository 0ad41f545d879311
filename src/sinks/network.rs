//! 网络 Sink
//!
//! 此模块实现通过网络发送日志的 sink：TCP 按行发送 JSON，UDP 每条记录一个数据报。
//! 连接按需建立，发送失败后丢弃连接，下一批次重新连接。

use async_trait::async_trait;
use futures_util::SinkExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{FramedWrite, LinesCodec};
use tracing::{debug, warn};

use super::traits::{Sink, SinkError, SinkKind, SinkMetadata, SinkResult};
use crate::config::{NetworkProtocol, NetworkSinkConfig};
use crate::core::record::LogRecord;

const CONNECTION_TIMEOUT_ERROR: &str = "Connection timeout";
const NO_CONNECTION_ERROR: &str = "No active connection";

/// 网络连接
#[derive(Debug)]
enum NetworkConnection {
    /// TCP 连接
    Tcp(FramedWrite<TcpStream, LinesCodec>),
    /// UDP 套接字（已 connect 到目标地址）
    Udp(UdpSocket),
}

/// 网络 Sink
#[derive(Debug)]
pub struct NetworkSink {
    name: String,
    config: NetworkSinkConfig,
    connection: Mutex<Option<NetworkConnection>>,
}

impl NetworkSink {
    /// 创建网络 sink，连接在首次投递时建立
    pub fn new(config: NetworkSinkConfig) -> Self {
        let name = config.name.clone().unwrap_or_else(|| "network".to_string());
        Self {
            name,
            config,
            connection: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &NetworkSinkConfig {
        &self.config
    }

    async fn connect(&self) -> SinkResult<NetworkConnection> {
        let address = self.config.address();
        let connection = match self.config.protocol {
            NetworkProtocol::Tcp => {
                let stream = timeout(self.config.timeout(), TcpStream::connect(&address))
                    .await
                    .map_err(|_| SinkError::Network(CONNECTION_TIMEOUT_ERROR.to_string()))?
                    .map_err(|e| SinkError::Network(format!("connect {}: {}", address, e)))?;
                NetworkConnection::Tcp(FramedWrite::new(stream, LinesCodec::new()))
            }
            NetworkProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket
                    .connect(&address)
                    .await
                    .map_err(|e| SinkError::Network(format!("connect {}: {}", address, e)))?;
                NetworkConnection::Udp(socket)
            }
        };
        debug!(sink = %self.name, %address, "Network sink connected");
        Ok(connection)
    }

    async fn send_batch(connection: &mut NetworkConnection, lines: Vec<String>) -> SinkResult<()> {
        match connection {
            NetworkConnection::Tcp(framed) => {
                for line in lines {
                    framed
                        .feed(line)
                        .await
                        .map_err(|e| SinkError::Network(e.to_string()))?;
                }
                SinkExt::<String>::flush(framed)
                    .await
                    .map_err(|e| SinkError::Network(e.to_string()))?;
            }
            NetworkConnection::Udp(socket) => {
                for line in lines {
                    socket.send(line.as_bytes()).await?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for NetworkSink {
    async fn deliver(&self, batch: &[LogRecord]) -> SinkResult<()> {
        let lines = batch
            .iter()
            .map(|record| record.to_json())
            .collect::<Result<Vec<_>, _>>()?;

        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let connection = guard
            .as_mut()
            .ok_or_else(|| SinkError::Network(NO_CONNECTION_ERROR.to_string()))?;

        let result = timeout(self.config.timeout(), Self::send_batch(connection, lines))
            .await
            .unwrap_or(Err(SinkError::Timeout(self.config.timeout())));
        if let Err(ref e) = result {
            warn!(sink = %self.name, "Network delivery failed, dropping connection: {}", e);
            *guard = None;
        }
        result
    }

    async fn shutdown(&self) -> SinkResult<()> {
        let mut guard = self.connection.lock().await;
        if let Some(NetworkConnection::Tcp(mut framed)) = guard.take() {
            if let Err(e) = SinkExt::<String>::close(&mut framed).await {
                debug!(sink = %self.name, "Closing network connection failed: {}", e);
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> SinkMetadata {
        let protocol = match self.config.protocol {
            NetworkProtocol::Tcp => "tcp",
            NetworkProtocol::Udp => "udp",
        };
        SinkMetadata::new(self.name.clone(), SinkKind::Network)
            .with_description(format!("{}://{}", protocol, self.config.address()))
    }
}
