//! Commander 配置
//!
//! 可从 TOML 文件加载，缺省字段取默认值：
//!
//! ```toml
//! reverse_port = 50001
//! servoj_time = 0.008
//!
//! [channel]
//! host = "192.168.1.10"
//! ```

use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use urlink_driver::ChannelConfig;
use urlink_protocol::ServoParams;

/// `servoj_time` 下限（秒）
pub const SERVOJ_TIME_MIN: f64 = 0.008;
/// `servoj_lookahead_time` 范围（秒）
pub const LOOKAHEAD_RANGE: (f64, f64) = (0.03, 0.2);
/// `servoj_gain` 范围
pub const GAIN_RANGE: (f64, f64) = (100.0, 2000.0);

/// 反向设定点端口默认值
pub const DEFAULT_REVERSE_PORT: u16 = 50001;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommanderConfig {
    /// 两个遥测通道的连接参数
    pub channel: ChannelConfig,
    /// 本机反向设定点端口（0 表示由系统分配）
    pub reverse_port: u16,
    pub servoj_time: f64,
    pub servoj_lookahead_time: f64,
    pub servoj_gain: f64,
    /// 负载下限（kg，开区间）
    pub min_payload: f64,
    /// 负载上限（kg，开区间）
    pub max_payload: f64,
    /// 等待控制器回连的超时（毫秒）
    pub accept_timeout_ms: u64,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        let servo = ServoParams::default();
        Self {
            channel: ChannelConfig::default(),
            reverse_port: DEFAULT_REVERSE_PORT,
            servoj_time: servo.time,
            servoj_lookahead_time: servo.lookahead_time,
            servoj_gain: servo.gain,
            min_payload: 0.0,
            max_payload: 1.0,
            accept_timeout_ms: 10_000,
        }
    }
}

impl CommanderConfig {
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            channel: ChannelConfig::for_host(host),
            ..Default::default()
        }
    }

    /// 从 TOML 文件加载
    ///
    /// # 错误
    /// - `ClientError::Io`: 文件无法读取
    /// - `ClientError::Config`: TOML 格式错误或字段类型不符
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ClientError> {
        let content = fs::read_to_string(path)?;
        let config: CommanderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    /// 经过范围限制的 servoj 参数
    pub fn servo_params(&self) -> ServoParams {
        ServoParams {
            time: clamp_servoj_time(self.servoj_time),
            lookahead_time: clamp_lookahead_time(self.servoj_lookahead_time),
            gain: clamp_gain(self.servoj_gain),
        }
    }
}

pub(crate) fn clamp_servoj_time(t: f64) -> f64 {
    if t > SERVOJ_TIME_MIN { t } else { SERVOJ_TIME_MIN }
}

pub(crate) fn clamp_lookahead_time(t: f64) -> f64 {
    if t.is_nan() {
        return LOOKAHEAD_RANGE.0;
    }
    t.clamp(LOOKAHEAD_RANGE.0, LOOKAHEAD_RANGE.1)
}

pub(crate) fn clamp_gain(g: f64) -> f64 {
    if g.is_nan() {
        return GAIN_RANGE.0;
    }
    g.clamp(GAIN_RANGE.0, GAIN_RANGE.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CommanderConfig::default();
        assert_eq!(config.reverse_port, 50001);
        assert_eq!(config.channel.realtime_port, 30003);
        let servo = config.servo_params();
        assert_eq!(servo.time, 0.016);
        assert_eq!(servo.lookahead_time, 0.03);
        assert_eq!(servo.gain, 300.0);
    }

    #[test]
    fn test_servo_params_clamped() {
        let config = CommanderConfig {
            servoj_time: 0.001,
            servoj_lookahead_time: 0.5,
            servoj_gain: 50.0,
            ..Default::default()
        };
        let servo = config.servo_params();
        assert_eq!(servo.time, SERVOJ_TIME_MIN);
        assert_eq!(servo.lookahead_time, 0.2);
        assert_eq!(servo.gain, 100.0);

        assert_eq!(clamp_gain(5000.0), 2000.0);
        assert_eq!(clamp_lookahead_time(0.01), 0.03);
        assert_eq!(clamp_servoj_time(0.02), 0.02);
    }

    #[test]
    fn test_load_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "reverse_port = 50007\nservoj_gain = 500.0\n\n[channel]\nhost = \"10.0.0.2\"\nsafety_count_max = 20"
        )
        .unwrap();

        let config = CommanderConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.reverse_port, 50007);
        assert_eq!(config.servoj_gain, 500.0);
        assert_eq!(config.channel.host, "10.0.0.2");
        assert_eq!(config.channel.safety_count_max, 20);
        assert_eq!(config.channel.secondary_port, 30002);
        assert_eq!(config.servoj_time, 0.016);
    }

    #[test]
    fn test_load_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "reverse_port = \"not a number\"").unwrap();
        let err = CommanderConfig::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
