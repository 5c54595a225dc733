//! # urlink Protocol
//!
//! 机械臂控制器 TCP 接口协议定义（无 IO 依赖）
//!
//! ## 模块
//!
//! - `ids`: 消息类型 / 数据包类型常量
//! - `constants`: 端口与定点缩放等协议常量
//! - `version`: 协议版本与按版本选择的字段布局表
//! - `secondary`: 配置通道（30001/30002）消息解析
//! - `realtime`: 实时通道（30003）定长帧解析
//! - `reverse`: 反向设定点通道帧编解码
//! - `script`: 控制脚本与命令片段生成
//!
//! ## 字节序
//!
//! 两个二进制通道的所有多字节数值字段均为大端字节序。
//! 解析统一经过 [`reader::FrameReader`]，逐字段读取，不做内存重解释。

pub mod constants;
pub mod ids;
pub mod reader;
pub mod realtime;
pub mod reverse;
pub mod script;
pub mod secondary;
pub mod version;

// 重新导出常用类型
pub use constants::*;
pub use realtime::{JointVector, RealtimeState, decode_realtime, expected_frame_len};
pub use reverse::SetpointFrame;
pub use secondary::{
    Euromap67, FrameHeader, MasterboardData, RobotModeData, RobotStatePackages, SecondaryMessage,
    Unpacked, VersionMessage, decode_frame_header, decode_message, find_version_message, unpack,
};
pub use script::ServoParams;
pub use version::{Capabilities, ProtocolVersion, RealtimeLayout, SecondaryLayout};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Truncated frame: need {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("unsupported firmware version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("Unexpected message type {kind} (expected {expected})")]
    UnexpectedMessage { kind: u8, expected: u8 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// 大端字节序转 i32
pub fn bytes_to_i32_be(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// i32 转大端字节序
pub fn i32_to_bytes_be(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}
