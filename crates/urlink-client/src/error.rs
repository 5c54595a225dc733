//! 客户端错误类型
//!
//! 分层：下层 crate 的错误通过 `#[from]` 向上转换；
//! 反向连接建立失败是致命错误，单独列出。

use thiserror::Error;
use urlink_driver::DriverError;
use urlink_net::NetError;
use urlink_protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum ClientError {
    /// 通道错误（握手、连接、发送）
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 控制器未在超时内回连反向端口
    #[error("Controller did not connect back on port {port}: {source}")]
    ReverseAccept {
        port: u16,
        #[source]
        source: NetError,
    },

    /// 轨迹输入不合法（执行前检查）
    #[error("Invalid trajectory: {0}")]
    InvalidTrajectory(String),

    /// 已有轨迹在执行
    #[error("A trajectory is already executing")]
    Busy,

    /// 实时通道的三缓冲读端已被取走
    #[error("Realtime state reader already taken")]
    ReaderTaken,

    /// 配置文件读取或解析失败
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// 后台线程无法启动
    #[error("Thread error: {0}")]
    Thread(String),
}

impl From<toml::de::Error> for ClientError {
    fn from(e: toml::de::Error) -> Self {
        ClientError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_accept_message() {
        let err = ClientError::ReverseAccept {
            port: 50001,
            source: NetError::Timeout,
        };
        assert!(err.to_string().contains("50001"));
    }

    #[test]
    fn test_unsupported_version_passes_through() {
        let driver = DriverError::UnsupportedVersion(urlink_protocol::ProtocolVersion::new(1, 8));
        let err: ClientError = driver.into();
        assert!(err.to_string().contains("unsupported firmware version"));
    }
}
