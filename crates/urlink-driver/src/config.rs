//! 通道配置

use serde::{Deserialize, Serialize};
use std::time::Duration;
use urlink_protocol::{PORT_PRIMARY, PORT_REALTIME, PORT_SECONDARY};

/// 连接参数
///
/// 所有端口都可配置，测试中使用本地回环上由系统分配的端口。
///
/// # Example
///
/// ```
/// use urlink_driver::ChannelConfig;
///
/// let config = ChannelConfig {
///     host: "192.168.1.10".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.realtime_port, 30003);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// 控制器地址
    pub host: String,
    /// 版本探测端口
    pub primary_port: u16,
    /// 稳态配置通道端口
    pub secondary_port: u16,
    /// 实时通道端口
    pub realtime_port: u16,
    /// 连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 接收循环的可读等待超时（毫秒），也是 `halt()` 的最坏延迟
    pub poll_timeout_ms: u64,
    /// 握手后关闭探测连接前的等待（毫秒）
    pub handshake_settle_ms: u64,
    /// 连续多少帧未刷新速度命令后自动发送零速度
    pub safety_count_max: u32,
    /// 速度命令默认加速度（rad/s²）
    pub speed_acceleration: f64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            primary_port: PORT_PRIMARY,
            secondary_port: PORT_SECONDARY,
            realtime_port: PORT_REALTIME,
            connect_timeout_ms: 10_000,
            poll_timeout_ms: 500,
            handshake_settle_ms: 500,
            safety_count_max: 12,
            speed_acceleration: 100.0,
        }
    }
}

impl ChannelConfig {
    /// 以默认端口连接 `host`
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn handshake_settle(&self) -> Duration {
        Duration::from_millis(self.handshake_settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = ChannelConfig::default();
        assert_eq!(c.primary_port, 30001);
        assert_eq!(c.secondary_port, 30002);
        assert_eq!(c.poll_timeout(), Duration::from_millis(500));
        assert_eq!(c.safety_count_max, 12);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let c: ChannelConfig = toml::from_str("host = \"10.0.0.5\"\npoll_timeout_ms = 100\n").unwrap();
        assert_eq!(c.host, "10.0.0.5");
        assert_eq!(c.poll_timeout_ms, 100);
        assert_eq!(c.realtime_port, 30003);
        assert_eq!(c.speed_acceleration, 100.0);
    }
}
