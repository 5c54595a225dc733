//! 反向设定点通道帧
//!
//! 由本端发往控制器内运行的脚本：6 × i32 定点关节角（×1e6）+ i32 keepalive，
//! 全部大端。`keepalive = 0` 表示让远端减速并退出读取循环。

use crate::constants::{JOINT_COUNT, MULT_JOINTSTATE};
use crate::reader::FrameReader;
use crate::{JointVector, ProtocolError};

/// 反向帧长度（字节）
pub const REVERSE_FRAME_LEN: usize = (JOINT_COUNT + 1) * 4;

/// 单个设定点帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetpointFrame {
    pub positions: JointVector,
    pub keepalive: i32,
}

impl SetpointFrame {
    pub fn new(positions: JointVector, keepalive: i32) -> Self {
        Self {
            positions,
            keepalive,
        }
    }

    /// 普通运动帧（keepalive = 1）
    pub fn hold(positions: JointVector) -> Self {
        Self::new(positions, 1)
    }

    /// 关闭帧（keepalive = 0）
    pub fn shutdown(positions: JointVector) -> Self {
        Self::new(positions, 0)
    }

    pub fn is_shutdown(&self) -> bool {
        self.keepalive == 0
    }

    /// 编码为线上字节
    ///
    /// 定点化采用四舍五入，往返误差不超过 0.5e-6 rad。
    pub fn encode(&self) -> [u8; REVERSE_FRAME_LEN] {
        let mut out = [0u8; REVERSE_FRAME_LEN];
        for (i, q) in self.positions.iter().enumerate() {
            let fixed = (q * MULT_JOINTSTATE as f64).round() as i32;
            out[i * 4..i * 4 + 4].copy_from_slice(&fixed.to_be_bytes());
        }
        out[JOINT_COUNT * 4..].copy_from_slice(&self.keepalive.to_be_bytes());
        out
    }

    /// 从线上字节解码（测试端与诊断工具使用）
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        if buf.len() != REVERSE_FRAME_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: REVERSE_FRAME_LEN,
                actual: buf.len(),
            });
        }
        let mut r = FrameReader::new(buf);
        let mut positions = [0.0; JOINT_COUNT];
        for q in positions.iter_mut() {
            *q = r.i32()? as f64 / MULT_JOINTSTATE as f64;
        }
        Ok(Self {
            positions,
            keepalive: r.i32()?,
        })
    }
}
