//! 驱动层错误类型定义

use thiserror::Error;
use urlink_net::NetError;
use urlink_protocol::{ProtocolError, ProtocolVersion};

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 传输层错误
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 固件版本低于支持下限（构造时致命）
    #[error("unsupported firmware version {0}")]
    UnsupportedVersion(ProtocolVersion),

    /// 探测端口未返回版本消息
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// 通道不处于 Streaming 状态
    #[error("Channel not connected")]
    NotConnected,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 接收线程启动失败
    #[error("Receive thread error: {0}")]
    Thread(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_version_message() {
        let err = DriverError::UnsupportedVersion(ProtocolVersion::with_revision(1, 8, 123));
        assert_eq!(err.to_string(), "unsupported firmware version 1.8.123");
    }

    #[test]
    fn test_from_conversions() {
        let err: DriverError = NetError::Disconnected.into();
        assert!(matches!(err, DriverError::Net(NetError::Disconnected)));

        let err: DriverError = ProtocolError::InvalidLength {
            expected: 1044,
            actual: 1060,
        }
        .into();
        assert!(err.to_string().contains("Invalid frame length"));
    }
}
