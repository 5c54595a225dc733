//! 实时通道（30003）定长帧解析
//!
//! 每个控制周期（~125Hz）一帧。帧长度完全由协议版本决定，
//! 长度不符的帧整体拒绝，且不修改任何已有状态。

use crate::reader::FrameReader;
use crate::version::{ProtocolVersion, RealtimeGeneration, RealtimeLayout};
use crate::ProtocolError;
use bytes::{BufMut, BytesMut};

/// 6 关节向量
pub type JointVector = [f64; 6];

/// 实时状态快照（单帧解码结果）
///
/// 不同版本缺失的字段保持默认值 0。
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RealtimeState {
    /// 控制器启动以来的时间（秒）
    pub time: f64,

    pub q_target: JointVector,
    pub qd_target: JointVector,
    pub qdd_target: JointVector,
    pub i_target: JointVector,
    pub m_target: JointVector,
    pub q_actual: JointVector,
    pub qd_actual: JointVector,
    pub i_actual: JointVector,
    /// 关节控制电流（3.x）
    pub i_control: JointVector,

    /// 工具位姿 [x, y, z, rx, ry, rz]（位置 + 旋转向量）
    pub tool_vector_actual: JointVector,
    pub tcp_speed_actual: JointVector,
    pub tcp_force: JointVector,
    pub tool_vector_target: JointVector,
    pub tcp_speed_target: JointVector,

    /// 数字输入位（线上为承载整数的 f64）
    pub digital_input_bits: u64,
    pub motor_temperatures: JointVector,
    pub controller_timer: f64,

    pub robot_mode: i32,
    pub joint_modes: [i32; 6],
    pub safety_mode: i32,

    pub tool_accelerometer: [f64; 3],
    pub speed_scaling: f64,
    pub linear_momentum_norm: f64,
    pub v_main: f64,
    pub v_robot: f64,
    pub i_robot: f64,
    pub v_actual: JointVector,

    /// 数字输出位（3.2 起）
    pub digital_output_bits: u64,
    /// 程序状态（3.2 起）
    pub program_state: i32,
}

impl RealtimeState {
    /// 按版本布局打包为完整帧（含长度前缀），保留字段填 0
    pub fn pack_to(&self, buf: &mut BytesMut, layout: &RealtimeLayout) {
        fn put_all(buf: &mut BytesMut, values: &[f64]) {
            for v in values {
                buf.put_f64(*v);
            }
        }
        fn put_zeros(buf: &mut BytesMut, n: usize) {
            for _ in 0..n {
                buf.put_f64(0.0);
            }
        }

        buf.reserve(layout.frame_len);
        buf.put_i32(layout.frame_len as i32);
        buf.put_f64(self.time);
        for v in [
            &self.q_target,
            &self.qd_target,
            &self.qdd_target,
            &self.i_target,
            &self.m_target,
            &self.q_actual,
            &self.qd_actual,
            &self.i_actual,
        ] {
            put_all(buf, v);
        }

        match layout.generation {
            RealtimeGeneration::Legacy => {
                if layout.legacy_accelerometer {
                    put_all(buf, &self.tool_accelerometer);
                    put_zeros(buf, 15);
                } else {
                    put_zeros(buf, 18);
                }
                put_all(buf, &self.tcp_force);
                put_all(buf, &self.tool_vector_actual);
                put_all(buf, &self.tcp_speed_actual);
            },
            RealtimeGeneration::Modern => {
                for v in [
                    &self.i_control,
                    &self.tool_vector_actual,
                    &self.tcp_speed_actual,
                    &self.tcp_force,
                    &self.tool_vector_target,
                    &self.tcp_speed_target,
                ] {
                    put_all(buf, v);
                }
            },
        }

        buf.put_f64(self.digital_input_bits as f64);
        put_all(buf, &self.motor_temperatures);
        buf.put_f64(self.controller_timer);
        put_zeros(buf, 1);
        if layout.robot_mode {
            buf.put_f64(self.robot_mode as f64);
        }
        if layout.joint_modes {
            put_all(buf, &self.joint_modes.map(|m| m as f64));
        }
        if layout.safety_block {
            buf.put_f64(self.safety_mode as f64);
            put_zeros(buf, 6);
            put_all(buf, &self.tool_accelerometer);
            put_zeros(buf, 6);
            buf.put_f64(self.speed_scaling);
            buf.put_f64(self.linear_momentum_norm);
            put_zeros(buf, 2);
            buf.put_f64(self.v_main);
            buf.put_f64(self.v_robot);
            buf.put_f64(self.i_robot);
            put_all(buf, &self.v_actual);
        }
        if layout.io_tail {
            buf.put_f64(self.digital_output_bits as f64);
            buf.put_f64(self.program_state as f64);
        }
    }
}

/// 版本对应的实时帧长度，不支持的版本返回 `None`
pub fn expected_frame_len(version: ProtocolVersion) -> Option<usize> {
    RealtimeLayout::for_version(version).map(|layout| layout.frame_len)
}

/// 解析一个完整实时帧（含 4 字节长度前缀）
///
/// # 错误
/// - `ProtocolError::InvalidLength`: 缓冲区长度或声明长度与版本要求不符
pub fn decode_realtime(
    buf: &[u8],
    layout: &RealtimeLayout,
) -> Result<RealtimeState, ProtocolError> {
    if buf.len() != layout.frame_len {
        return Err(ProtocolError::InvalidLength {
            expected: layout.frame_len,
            actual: buf.len(),
        });
    }

    let mut r = FrameReader::new(buf);
    let declared = r.i32()?;
    if declared < 0 || declared as usize != layout.frame_len {
        return Err(ProtocolError::InvalidLength {
            expected: layout.frame_len,
            actual: declared.max(0) as usize,
        });
    }

    let mut s = RealtimeState {
        time: r.f64()?,
        q_target: r.f64_array()?,
        qd_target: r.f64_array()?,
        qdd_target: r.f64_array()?,
        i_target: r.f64_array()?,
        m_target: r.f64_array()?,
        q_actual: r.f64_array()?,
        qd_actual: r.f64_array()?,
        i_actual: r.f64_array()?,
        ..Default::default()
    };

    match layout.generation {
        RealtimeGeneration::Legacy => {
            if layout.legacy_accelerometer {
                s.tool_accelerometer = r.f64_array()?;
                r.skip_f64(15)?;
            } else {
                r.skip_f64(18)?;
            }
            s.tcp_force = r.f64_array()?;
            s.tool_vector_actual = r.f64_array()?;
            s.tcp_speed_actual = r.f64_array()?;
        },
        RealtimeGeneration::Modern => {
            s.i_control = r.f64_array()?;
            s.tool_vector_actual = r.f64_array()?;
            s.tcp_speed_actual = r.f64_array()?;
            s.tcp_force = r.f64_array()?;
            s.tool_vector_target = r.f64_array()?;
            s.tcp_speed_target = r.f64_array()?;
        },
    }

    s.digital_input_bits = r.f64()? as u64;
    s.motor_temperatures = r.f64_array()?;
    s.controller_timer = r.f64()?;
    // 未使用的测试值
    r.skip_f64(1)?;

    if layout.robot_mode {
        s.robot_mode = r.f64()? as i32;
    }
    if layout.joint_modes {
        let modes: [f64; 6] = r.f64_array()?;
        s.joint_modes = modes.map(|m| m as i32);
    }
    if layout.safety_block {
        s.safety_mode = r.f64()? as i32;
        r.skip_f64(6)?;
        s.tool_accelerometer = r.f64_array()?;
        r.skip_f64(6)?;
        s.speed_scaling = r.f64()?;
        s.linear_momentum_norm = r.f64()?;
        r.skip_f64(2)?;
        s.v_main = r.f64()?;
        s.v_robot = r.f64()?;
        s.i_robot = r.f64()?;
        s.v_actual = r.f64_array()?;
    }
    if layout.io_tail {
        s.digital_output_bits = r.f64()? as u64;
        s.program_state = r.f64()? as i32;
    }

    Ok(s)
}
